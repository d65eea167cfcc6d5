//! TCP server implementation.

use crate::error::ServerError;
use crate::handler::CommandHandler;
use crate::service::BookService;
use crate::session::{Session, SessionState};
use bookshelf_protocol::message::{BookMessage, Request, Response, StreamItem};
use bookshelf_protocol::{Decoder, Encoder};
use bookshelf_storage::BookCursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], bookshelf_protocol::DEFAULT_PORT)),
            idle_timeout: Duration::from_secs(300),
            max_connections: 1000,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub requests_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// TCP server for bookshelf.
pub struct Server {
    config: ServerConfig,
    handler: Arc<CommandHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, service: Arc<BookService>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler: Arc::new(CommandHandler::new(service)),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
        }
    }

    /// Binds the configured address and runs the server.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Runs the server on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let mut shutdown_rx = self.shutdown.subscribe();
        tracing::info!("Server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let handler = self.handler.clone();
                            let stats = self.stats.clone();
                            let idle_timeout = self.config.idle_timeout;
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result = Self::handle_connection(
                                    tcp_stream,
                                    addr,
                                    handler,
                                    &stats,
                                    idle_timeout,
                                    &mut conn_shutdown,
                                )
                                .await;

                                if let Err(e) = result {
                                    tracing::debug!("Connection {} error: {}", addr, e);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Handles a single connection. Requests are processed in arrival order.
    async fn handle_connection(
        mut stream: TcpStream,
        addr: SocketAddr,
        handler: Arc<CommandHandler>,
        stats: &ServerStats,
        idle_timeout: Duration,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let mut session = Session::new(addr);
        tracing::info!("Client connected: {} (session {})", addr, session.id);

        let result =
            Self::serve_session(&mut stream, &mut session, handler, stats, idle_timeout, shutdown)
                .await;
        tracing::debug!(
            "[{}] Session {} ended after {} requests (client={}, protocol=v{})",
            addr,
            session.id,
            session.request_count(),
            session.client_name().unwrap_or("-"),
            session.protocol_version()
        );
        result
    }

    /// Reads and answers requests until the peer leaves, says BYE, idles
    /// out, or the server shuts down.
    async fn serve_session(
        stream: &mut TcpStream,
        session: &mut Session,
        handler: Arc<CommandHandler>,
        stats: &ServerStats,
        idle_timeout: Duration,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = session.remote_addr;
        let mut decoder = Decoder::new();
        let mut buf = [0u8; 8192];

        loop {
            tokio::select! {
                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            tracing::debug!("[{}] Connection closed by client", addr);
                            if decoder.buffered() > 0 {
                                tracing::debug!(
                                    "[{}] Discarding {} bytes of a partial frame",
                                    addr,
                                    decoder.buffered()
                                );
                            }
                            return Ok(());
                        }
                        Ok(n) => {
                            tracing::debug!("[{}] Received {} bytes", addr, n);
                            decoder.extend(&buf[..n]);
                        }
                        Err(e) => {
                            tracing::debug!("[{}] Read error: {}", addr, e);
                            return Err(ServerError::Io(e));
                        }
                    }
                }

                _ = tokio::time::sleep(idle_timeout) => {
                    if session.idle_duration() > idle_timeout {
                        tracing::debug!("[{}] Idle timeout", addr);
                        return Ok(());
                    }
                }

                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    return Err(ServerError::ShuttingDown);
                }
            }

            while let Some(request) = decoder.decode_request()? {
                tracing::info!(
                    "[{}] Request: {} (id={})",
                    addr,
                    request.op.name(),
                    request.id
                );
                stats.requests_total.fetch_add(1, Ordering::Relaxed);

                if request.op.is_streaming() {
                    match handler.open_list(session, &request).await {
                        Ok(cursor) => {
                            let count =
                                Self::stream_books(stream, addr, &request, cursor, shutdown)
                                    .await?;
                            tracing::info!(
                                "[{}] Response: stream of {} books (id={})",
                                addr,
                                count,
                                request.id
                            );
                        }
                        Err(response) => Self::send_response(stream, addr, &response).await?,
                    }
                    continue;
                }

                let response = handler.handle(session, &request).await;
                Self::send_response(stream, addr, &response).await?;

                if session.state() == SessionState::Closing {
                    tracing::debug!("[{}] Session closing", addr);
                    return Ok(());
                }
            }
        }
    }

    async fn send_response(
        stream: &mut TcpStream,
        addr: SocketAddr,
        response: &Response,
    ) -> Result<(), ServerError> {
        tracing::info!(
            "[{}] Response: {} (id={})",
            addr,
            if response.is_ok() { "OK" } else { "ERROR" },
            response.id
        );
        let response_bytes = Encoder::encode_response(response)?;
        tracing::debug!("[{}] Writing {} bytes", addr, response_bytes.len());
        stream.write_all(&response_bytes).await?;
        Ok(())
    }

    /// Streams every book from `cursor` as items, then the closing response.
    ///
    /// The cursor is dropped before returning on every path. A database error
    /// mid-stream ends the stream with an error response; write failures and
    /// shutdown abort the connection.
    async fn stream_books(
        stream: &mut TcpStream,
        addr: SocketAddr,
        request: &Request,
        mut cursor: BookCursor,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<u64, ServerError> {
        let mut seq = 0u64;
        let outcome = loop {
            let next = tokio::select! {
                next = cursor.next_book() => next,
                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown during stream (id={})", addr, request.id);
                    return Err(ServerError::ShuttingDown);
                }
            };

            match next {
                Some(Ok(book)) => {
                    let item = StreamItem::new(&request.id, seq, BookMessage::from(book));
                    stream.write_all(&Encoder::encode_stream_item(&item)?).await?;
                    seq += 1;
                }
                Some(Err(e)) => {
                    tracing::warn!("[{}] Stream failed after {} books: {}", addr, seq, e);
                    break Err(ServerError::Storage(e));
                }
                None => break Ok(seq),
            }
        };
        drop(cursor);

        let end = CommandHandler::list_end(&request.id, outcome);
        stream.write_all(&Encoder::encode_stream_end(&end)?).await?;
        Ok(seq)
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookshelf_core::Book;
    use bookshelf_protocol::message::Operation;
    use bookshelf_protocol::{ErrorCode, FrameFlags, Message};
    use bookshelf_storage::{BookCollection, MemoryCollection};
    use bson::doc;
    use serde_json::json;

    async fn start_server(collection: MemoryCollection) -> (Arc<Server>, SocketAddr) {
        let service = Arc::new(BookService::new(Arc::new(collection)));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(Server::new(ServerConfig::new(addr), service));

        let running = server.clone();
        tokio::spawn(async move { running.serve(listener).await });
        (server, addr)
    }

    async fn send(stream: &mut TcpStream, request: &Request) {
        let bytes = Encoder::encode_request(request).unwrap();
        stream.write_all(&bytes).await.unwrap();
    }

    async fn read_frame_messages(
        stream: &mut TcpStream,
        decoder: &mut Decoder,
        want: usize,
    ) -> Vec<(FrameFlags, Message)> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        while out.len() < want {
            while let Some(frame) = decoder.decode_frame().unwrap() {
                out.push((frame.flags, Message::from_frame(&frame).unwrap()));
            }
            if out.len() >= want {
                break;
            }
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "server closed connection");
            decoder.extend(&buf[..n]);
        }
        out
    }

    #[tokio::test]
    async fn test_list_books_stream_framing() {
        let collection = MemoryCollection::new();
        collection
            .insert(&Book::new("Elantris", "Brandon Sanderson", "0765311771"))
            .await
            .unwrap();
        collection
            .insert(&Book::new("The Martian", "Andy Weir", "0553418025"))
            .await
            .unwrap();
        let (server, addr) = start_server(collection).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        send(&mut stream, &Request::new("list-1", Operation::ListBooks)).await;

        let mut decoder = Decoder::new();
        let messages = read_frame_messages(&mut stream, &mut decoder, 3).await;

        for (i, (flags, message)) in messages[..2].iter().enumerate() {
            assert!(flags.is_stream());
            assert!(!flags.is_end_stream());
            match message {
                Message::Item(item) => {
                    assert_eq!(item.id, "list-1");
                    assert_eq!(item.seq, i as u64);
                }
                other => panic!("expected item, got {:?}", other),
            }
        }

        let (flags, message) = &messages[2];
        assert!(flags.is_stream() && flags.is_end_stream());
        match message {
            Message::Response(resp) => {
                assert!(resp.is_ok());
                assert_eq!(resp.result.as_ref().unwrap()["count"], 2);
            }
            other => panic!("expected response, got {:?}", other),
        }

        assert!(server.stats().requests_total.load(Ordering::Relaxed) >= 1);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_list_books_mid_stream_failure() {
        let collection = MemoryCollection::new();
        collection
            .insert(&Book::new("Eragon", "Christopher Paolini", "0-375-82668-8"))
            .await
            .unwrap();
        collection.insert_document(doc! { "isbn": "broken" });
        collection
            .insert(&Book::new("Elantris", "Brandon Sanderson", "0765311771"))
            .await
            .unwrap();
        let (server, addr) = start_server(collection).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        send(&mut stream, &Request::new("9", Operation::ListBooks)).await;

        let mut decoder = Decoder::new();
        let messages = read_frame_messages(&mut stream, &mut decoder, 2).await;
        assert!(matches!(messages[0].1, Message::Item(_)));
        match &messages[1].1 {
            Message::Response(resp) => {
                assert!(resp.is_error());
                assert_eq!(resp.error.as_ref().unwrap().code, ErrorCode::Unavailable);
            }
            other => panic!("expected response, got {:?}", other),
        }

        // The connection keeps serving after a failed stream.
        send(&mut stream, &Request::new("10", Operation::Ping)).await;
        let messages = read_frame_messages(&mut stream, &mut decoder, 1).await;
        match &messages[0].1 {
            Message::Response(resp) => assert!(resp.is_ok()),
            other => panic!("expected response, got {:?}", other),
        }

        server.shutdown();
    }

    #[tokio::test]
    async fn test_client_leaving_mid_stream() {
        let collection = MemoryCollection::new();
        for i in 0..20_000u32 {
            let book = Book::new(format!("Title {}", i), "Author", format!("{:010}", i));
            collection.insert(&book).await.unwrap();
        }
        let (server, addr) = start_server(collection).await;

        let mut leaving = TcpStream::connect(addr).await.unwrap();
        send(&mut leaving, &Request::new("1", Operation::ListBooks)).await;
        let mut decoder = Decoder::new();
        let first = read_frame_messages(&mut leaving, &mut decoder, 1).await;
        assert!(matches!(first[0].1, Message::Item(_)));
        drop(leaving);

        let mut staying = TcpStream::connect(addr).await.unwrap();
        let get = Request::new("2", Operation::GetBook).with_params(json!({"value": "0000000007"}));
        send(&mut staying, &get).await;
        let mut decoder = Decoder::new();
        let messages = read_frame_messages(&mut staying, &mut decoder, 1).await;
        match &messages[0].1 {
            Message::Response(resp) => {
                assert!(resp.is_ok());
                assert_eq!(resp.result.as_ref().unwrap()["isbn"], "0000000007");
            }
            other => panic!("expected response, got {:?}", other),
        }

        // The abandoned connection's task ends, releasing its cursor.
        tokio::time::timeout(Duration::from_secs(10), async {
            while server.stats().connections_active.load(Ordering::Relaxed) > 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("abandoned stream connection still open");

        server.shutdown();
    }

    #[tokio::test]
    async fn test_bye_closes_connection() {
        let (server, addr) = start_server(MemoryCollection::new()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        send(&mut stream, &Request::new("1", Operation::Bye)).await;

        let mut decoder = Decoder::new();
        let messages = read_frame_messages(&mut stream, &mut decoder, 1).await;
        assert!(matches!(&messages[0].1, Message::Response(r) if r.is_ok()));

        let mut buf = [0u8; 16];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
        server.shutdown();
    }
}
