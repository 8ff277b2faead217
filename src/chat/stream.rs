//! # Streaming Client
//!
//! Sends a message and exposes the reply as a lazy [`FrameStream`].
//!
//! ```text
//! send(request) ──► POST /chat/stream ──► body pieces ──► FrameDecoder ──► frames
//! ```
//!
//! Nothing happens until the stream is first polled. Each decoded frame is
//! yielded as soon as the read that completes it arrives; the body is never
//! buffered whole. Items are:
//!
//! - `Ok(StreamFrame::Text | Done | Error)`: what the service said
//! - `Err(ChatError::Transport)`: the connection failed or dropped
//!
//! A stream is single-use. Retrying means calling `send` again.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use futures::stream;
use log::{debug, info, warn};

use crate::chat::error::ChatError;
use crate::chat::frame::{FrameDecoder, StreamFrame};
use crate::chat::types::{StreamRequest, error_message};

/// Items of a streaming reply, in arrival order.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<StreamFrame, ChatError>> + Send>>;

/// Anything that can turn a message into a streamed reply.
pub trait StreamingClient: Send + Sync {
    /// Starts a reply. The request is issued lazily on first poll.
    fn send(&self, request: StreamRequest) -> FrameStream;
}

/// Streaming client backed by the chat service's `/chat/stream` endpoint.
pub struct HttpStreamingClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStreamingClient {
    /// Creates a client for the service at `base_url` (e.g. `http://localhost:8000/api/v1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Bounds only the connect phase; replies may stream for as long as they need.
    pub fn with_connect_timeout(
        base_url: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ChatError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }
}

impl StreamingClient for HttpStreamingClient {
    fn send(&self, request: StreamRequest) -> FrameStream {
        info!(
            "Chat stream request: document={}, character={}, history_len={}",
            request.document_id,
            request.character_id,
            request.conversation_history.len()
        );
        let builder = self
            .client
            .post(format!("{}/chat/stream", self.base_url))
            .json(&request);
        read_frames(builder)
    }
}

/// Where a reply is in its lifecycle.
enum Stage {
    Connect(reqwest::RequestBuilder),
    Body(reqwest::Response),
    Finished,
}

struct ReplyReader {
    stage: Stage,
    decoder: FrameDecoder,
    ready: VecDeque<Result<StreamFrame, ChatError>>,
    bytes_read: usize,
}

/// Drives one request to completion as a stream of frames.
fn read_frames(builder: reqwest::RequestBuilder) -> FrameStream {
    let reader = ReplyReader {
        stage: Stage::Connect(builder),
        decoder: FrameDecoder::new(),
        ready: VecDeque::new(),
        bytes_read: 0,
    };

    Box::pin(stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(item) = reader.ready.pop_front() {
                return Some((item, reader));
            }

            match std::mem::replace(&mut reader.stage, Stage::Finished) {
                Stage::Finished => return None,
                Stage::Connect(builder) => match builder.send().await {
                    Err(e) => {
                        warn!("Chat stream connection failed: {e}");
                        return Some((Err(ChatError::Transport(e.to_string())), reader));
                    }
                    Ok(response) if !response.status().is_success() => {
                        let status = response.status().as_u16();
                        let body = response.text().await.unwrap_or_default();
                        let message = error_message(status, &body);
                        warn!("Chat stream rejected: HTTP {status} - {message}");
                        return Some((Ok(StreamFrame::Error(message)), reader));
                    }
                    Ok(response) => {
                        debug!("Chat stream response status: {}", response.status());
                        reader.stage = Stage::Body(response);
                    }
                },
                Stage::Body(mut response) => match response.chunk().await {
                    Ok(Some(bytes)) => {
                        reader.bytes_read += bytes.len();
                        debug!("Chunk received: {} bytes", bytes.len());
                        reader.ready.extend(reader.decoder.push(&bytes).into_iter().map(Ok));
                        if reader.decoder.is_finished() {
                            info!("Chat stream finished after {} bytes", reader.bytes_read);
                        } else {
                            reader.stage = Stage::Body(response);
                        }
                    }
                    Ok(None) => {
                        reader.ready.extend(reader.decoder.finish().into_iter().map(Ok));
                        if !reader.decoder.is_finished() {
                            warn!(
                                "Chat stream closed after {} bytes without a terminal record",
                                reader.bytes_read
                            );
                            reader.ready.push_back(Err(ChatError::Transport(
                                "stream ended before a terminal record".to_string(),
                            )));
                        }
                    }
                    Err(e) => {
                        warn!("Chat stream dropped after {} bytes: {e}", reader.bytes_read);
                        return Some((Err(ChatError::Transport(e.to_string())), reader));
                    }
                },
            }
        }
    }))
}
