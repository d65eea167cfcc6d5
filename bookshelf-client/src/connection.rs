//! Connection management.

use crate::error::ClientError;
use bookshelf_protocol::message::*;
use bookshelf_protocol::{Decoder, Encoder, Message, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address as `host:port`.
    pub addr: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Request timeout. Also bounds the wait between two stream items.
    pub request_timeout: Duration,
    /// Client name for HELLO.
    pub client_name: Option<String>,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            client_name: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

/// A message delivered to the consumer of an open stream.
#[derive(Debug)]
pub enum StreamMessage {
    Item(StreamItem),
    /// Closing response; no further messages follow.
    End(Response),
}

/// A connection to a bookshelf server.
pub struct Connection {
    config: ConnectionConfig,
    /// Write half of the stream (for sending requests).
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Read half, owned by the read loop once it starts.
    reader: Mutex<Option<OwnedReadHalf>>,
    /// Decoder for parsing server messages.
    decoder: Mutex<Decoder>,
    /// Pending unary requests waiting for responses.
    pending: Mutex<HashMap<String, oneshot::Sender<Response>>>,
    /// Open streams waiting for items. Unbounded so a slow consumer never
    /// stalls the read loop for other requests.
    streams: Mutex<HashMap<String, mpsc::UnboundedSender<StreamMessage>>>,
    /// Next request ID.
    next_id: AtomicU64,
    /// Is the connection established?
    connected: AtomicBool,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            decoder: Mutex::new(Decoder::new()),
            pending: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            connected: AtomicBool::new(false),
        }
    }

    /// Returns the connection configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Connects to the server and performs the HELLO handshake.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("Connecting to {}...", self.config.addr);

        let tcp_stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr.as_str()),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

        tcp_stream.set_nodelay(true).ok();

        let (read_half, write_half) = tcp_stream.into_split();
        *self.writer.lock().await = Some(write_half);
        *self.reader.lock().await = Some(read_half);
        self.decoder.lock().await.clear();

        // The read loop is not running yet; the handshake reads its own reply.
        tracing::debug!("Starting protocol handshake...");
        self.handshake().await?;
        tracing::debug!("Handshake complete");

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn handshake(&self) -> Result<(), ClientError> {
        let hello = HelloParams {
            protocol_version: PROTOCOL_VERSION,
            client_name: self.config.client_name.clone(),
        };

        let id = self.next_request_id();
        let request = Request::new(&id, Operation::Hello).with_params(serde_json::to_value(hello)?);
        self.send(&request).await?;

        let response = self.read_single_response().await?;
        tracing::debug!("HELLO response received: ok={}", response.is_ok());

        match response.error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Reads a single response from the stream with timeout.
    async fn read_single_response(&self) -> Result<Response, ClientError> {
        let buffer_size = self.config.read_buffer_size;
        let timeout = self.config.request_timeout;

        tokio::time::timeout(timeout, async {
            let mut buf = vec![0u8; buffer_size];

            loop {
                let n = {
                    let mut reader_guard = self.reader.lock().await;
                    let reader = reader_guard.as_mut().ok_or(ClientError::NotConnected)?;
                    reader.read(&mut buf).await.map_err(ClientError::Io)?
                };

                if n == 0 {
                    tracing::debug!("Connection closed (0 bytes)");
                    return Err(ClientError::ConnectionClosed);
                }

                let mut decoder = self.decoder.lock().await;
                decoder.extend(&buf[..n]);
                if let Some(response) = decoder.decode_response()? {
                    return Ok(response);
                }
            }
        })
        .await
        .map_err(|_| {
            tracing::debug!("Read timeout");
            ClientError::Timeout
        })?
    }

    fn next_request_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }

    async fn send(&self, request: &Request) -> Result<(), ClientError> {
        let encoded = Encoder::encode_request(request)?;
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(&encoded).await.map_err(ClientError::Io)?;
        tracing::debug!(
            "Request id={} op={} sent ({} bytes)",
            request.id,
            request.op.name(),
            encoded.len()
        );
        Ok(())
    }

    /// Sends a request and waits for response.
    pub async fn request(
        &self,
        op: Operation,
        params: serde_json::Value,
    ) -> Result<Response, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let id = self.next_request_id();
        let request = Request::new(&id, op).with_params(params);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if let Err(e) = self.send(&request).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.config.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                tracing::debug!("Request id={} channel closed", id);
                Err(ClientError::ConnectionClosed)
            }
            Err(_) => {
                tracing::debug!("Request id={} timed out", id);
                self.pending.lock().await.remove(&id);
                Err(ClientError::Timeout)
            }
        }
    }

    /// Sends a streaming request and returns the channel its messages arrive on.
    pub async fn open_stream(
        &self,
        op: Operation,
        params: serde_json::Value,
    ) -> Result<mpsc::UnboundedReceiver<StreamMessage>, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let id = self.next_request_id();
        let request = Request::new(&id, op).with_params(params);

        let (tx, rx) = mpsc::unbounded_channel();
        self.streams.lock().await.insert(id.clone(), tx);

        if let Err(e) = self.send(&request).await {
            self.streams.lock().await.remove(&id);
            return Err(e);
        }
        Ok(rx)
    }

    /// Reads and dispatches responses and stream items until the connection
    /// closes. Run this in a background task after [`Connection::connect`].
    pub async fn read_loop(&self) -> Result<(), ClientError> {
        let mut reader = self
            .reader
            .lock()
            .await
            .take()
            .ok_or(ClientError::NotConnected)?;
        let mut buf = vec![0u8; self.config.read_buffer_size];

        let result = loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => {
                    tracing::debug!("read_loop: connection closed");
                    break Err(ClientError::ConnectionClosed);
                }
                Ok(n) => n,
                Err(e) => break Err(ClientError::Io(e)),
            };
            tracing::debug!("read_loop: received {} bytes", n);

            if let Err(e) = self.dispatch(&buf[..n]).await {
                break Err(e);
            }
        };

        self.connected.store(false, Ordering::SeqCst);
        // Dropping the senders wakes every waiter with a closed channel.
        self.pending.lock().await.clear();
        self.streams.lock().await.clear();
        result
    }

    async fn dispatch(&self, data: &[u8]) -> Result<(), ClientError> {
        let messages = {
            let mut decoder = self.decoder.lock().await;
            decoder.extend(data);
            let mut messages = Vec::new();
            while let Some(message) = decoder.decode_message()? {
                messages.push(message);
            }
            messages
        };

        for message in messages {
            match message {
                Message::Response(response) => self.dispatch_response(response).await,
                Message::Item(item) => self.dispatch_item(item).await,
            }
        }
        Ok(())
    }

    async fn dispatch_response(&self, response: Response) {
        let id = response.id.clone();
        if let Some(tx) = self.pending.lock().await.remove(&id) {
            let _ = tx.send(response);
            return;
        }

        let stream = self.streams.lock().await.remove(&id);
        match stream {
            Some(tx) => {
                let _ = tx.send(StreamMessage::End(response));
            }
            None => tracing::debug!("read_loop: no pending request for id={}", id),
        }
    }

    async fn dispatch_item(&self, item: StreamItem) {
        let tx = self.streams.lock().await.get(&item.id).cloned();
        match tx {
            Some(tx) => {
                let id = item.id.clone();
                if tx.send(StreamMessage::Item(item)).is_err() {
                    // Consumer went away; discard the rest of this stream.
                    self.streams.lock().await.remove(&id);
                }
            }
            None => tracing::debug!("read_loop: dropping item for id={}", item.id),
        }
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Sends BYE and closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");

        if self.is_connected() {
            let bye = Request::new(self.next_request_id(), Operation::Bye);
            let _ = self.send(&bye).await;
        }
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        let _ = self.reader.lock().await.take();

        let mut pending = self.pending.lock().await;
        tracing::debug!("Clearing {} pending requests", pending.len());
        pending.clear();
        self.streams.lock().await.clear();

        tracing::debug!("Connection closed");
        Ok(())
    }

    /// Returns the number of pending requests.
    pub fn pending_count(&self) -> usize {
        self.pending.try_lock().map(|p| p.len()).unwrap_or(0)
    }
}
