//! # Core Application Logic
//!
//! The conversation session manager. It knows nothing about any specific
//! UI technology.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │         CORE            │
//!                    │  (this module)          │
//!                    │                         │
//!                    │  • SessionController    │
//!                    │  • MessageStore         │
//!                    │  • Conversation         │
//!                    └───────────┬─────────────┘
//!                                │ chat::{StreamingClient, *Gateway}
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌────────────┐      ┌────────────┐      ┌────────────┐
//!     │    TUI     │      │  /chat/*   │      │   Tests    │
//!     │  Adapter   │      │  service   │      │  (fakes)   │
//!     │ (ratatui)  │      │   (HTTP)   │      │            │
//!     └────────────┘      └────────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`session`]: `SessionController` and its state machine
//! - [`message`]: `Message` and the ordered `MessageStore`
//! - [`conversation`]: which document and character are being talked to
//! - [`config`]: layered configuration

pub mod config;
pub mod conversation;
pub mod message;
pub mod session;
