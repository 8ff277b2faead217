use std::fmt;

/// Errors surfaced by the remote chat service plumbing.
///
/// The streaming client and the gateways return these as values so the
/// session controller can pick a fallback per failure kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// Connection could not be established, timed out, or dropped mid-stream.
    Transport(String),
    /// The service answered with a well-formed failure.
    Server { status: u16, message: String },
    /// A response body could not be understood.
    Parse(String),
}

impl ChatError {
    /// True for failures of the connection itself rather than of the service.
    pub fn is_transport(&self) -> bool {
        matches!(self, ChatError::Transport(_))
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Transport(msg) => write!(f, "transport error: {msg}"),
            ChatError::Server { status, message } => {
                write!(f, "server error (HTTP {status}): {message}")
            }
            ChatError::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ChatError::Parse(e.to_string())
        } else {
            ChatError::Transport(e.to_string())
        }
    }
}
