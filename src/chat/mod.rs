//! # Chat Service Plumbing
//!
//! Everything that talks to the remote character chat service.
//!
//! ## Modules
//!
//! - [`frame`]: `FrameDecoder`, newline-delimited record reassembly
//! - [`stream`]: `StreamingClient`, a message in, a lazy stream of frames out
//! - [`gateway`]: history and greeting request/response wrappers
//! - [`types`]: wire shapes, normalized into core types at this boundary
//! - [`error`]: `ChatError`

pub mod error;
pub mod frame;
pub mod gateway;
pub mod stream;
pub mod types;

pub use error::ChatError;
pub use frame::{FrameDecoder, StreamFrame};
pub use gateway::{GreetingGateway, HistoryGateway, HttpGateway, SessionFilter};
pub use stream::{FrameStream, HttpStreamingClient, StreamingClient};
pub use types::{SessionSummary, StreamRequest, TranscriptEntry};
