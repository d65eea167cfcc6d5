//! Session management.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state, no HELLO received yet.
    Connected,
    /// Handshake complete.
    Ready,
    /// Session is closing.
    Closing,
}

/// A client session, one per TCP connection.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    state: SessionState,

    /// Negotiated protocol version.
    protocol_version: u16,

    /// Client name from HELLO.
    client_name: Option<String>,

    request_count: u64,

    last_activity: Mutex<Instant>,
}

impl Session {
    /// Creates a new session.
    pub fn new(remote_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            state: SessionState::Connected,
            protocol_version: 0,
            client_name: None,
            request_count: 0,
            last_activity: Mutex::new(Instant::now()),
        }
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Sets the session state.
    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Returns the protocol version.
    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    /// Returns the client name.
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// Completes the handshake.
    pub fn complete_handshake(&mut self, protocol_version: u16, client_name: Option<String>) {
        self.protocol_version = protocol_version;
        self.client_name = client_name;
        self.state = SessionState::Ready;
    }

    /// Records a request.
    pub fn record_request(&mut self) {
        self.request_count += 1;
        self.touch();
    }

    /// Marks the session as active without counting a request.
    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Returns the request count.
    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Returns the time since last activity.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}
