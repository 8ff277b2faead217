//! # TUI Adapter
//!
//! The ratatui-specific layer. Renders the transcript, collects input, and
//! turns keystrokes into `SessionController` calls.
//!
//! This is the only module that knows about ratatui and crossterm.
//!
//! ## Reply pumping
//!
//! A reply stream is pumped on a spawned task that forwards every item over
//! a channel. The event loop drains that channel between key events and
//! hands each item to `SessionController::apply_frame`, so the controller is
//! only ever touched from the loop.

mod event;
mod ui;

use log::{debug, info, warn};
use std::io::stdout;
use std::sync::{Arc, mpsc};

use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::execute;
use futures::StreamExt;

use crate::chat::{ChatError, HttpGateway, HttpStreamingClient, StreamFrame};
use crate::core::config::ResolvedConfig;
use crate::core::conversation::Conversation;
use crate::core::session::{
    IgnoreReason, PendingReply, ReplyOutcome, ReplyProgress, SendOutcome, SessionController,
};
use crate::tui::event::{TuiEvent, poll_event_immediate, poll_event_timeout};

/// Lines moved per PageUp/PageDown.
const PAGE_LINES: usize = 10;

/// TUI-specific presentation state (not part of the session)
pub struct TuiState {
    pub input: String,
    /// Lines scrolled up from the newest message.
    pub scroll_from_bottom: usize,
    pub status_message: String,
}

impl TuiState {
    pub fn new() -> Self {
        Self {
            input: String::new(),
            scroll_from_bottom: 0,
            status_message: String::new(),
        }
    }
}

impl Default for TuiState {
    fn default() -> Self {
        Self::new()
    }
}

/// Items forwarded from a reply pump to the event loop.
#[derive(Debug)]
enum ReplyEvent {
    Item(u64, Result<StreamFrame, ChatError>),
    /// The stream ended without a terminal item.
    Closed(u64),
}

struct TerminalModeGuard;

impl TerminalModeGuard {
    fn new() -> std::io::Result<Self> {
        execute!(stdout(), EnableBracketedPaste)?;
        Ok(Self)
    }
}

impl Drop for TerminalModeGuard {
    fn drop(&mut self) {
        let _ = execute!(stdout(), DisableBracketedPaste);
    }
}

/// Build a session controller talking to the configured service.
pub fn build_controller(config: &ResolvedConfig) -> Result<SessionController, ChatError> {
    let gateway = Arc::new(HttpGateway::new(config.base_url.clone(), config.request_timeout));
    let streaming = Arc::new(HttpStreamingClient::with_connect_timeout(
        config.base_url.clone(),
        config.connect_timeout,
    )?);
    Ok(SessionController::new(
        gateway.clone(),
        gateway,
        streaming,
        config.session_options(),
    ))
}

pub async fn run(config: ResolvedConfig, conversation: Conversation) -> std::io::Result<()> {
    let mut session = build_controller(&config).map_err(std::io::Error::other)?;
    let mut tui = TuiState::new();
    let character_name = if conversation.character.name.trim().is_empty() {
        conversation.character_id().to_string()
    } else {
        conversation.character.name.clone()
    };

    let mut terminal = ratatui::init();
    let _terminal_mode_guard = TerminalModeGuard::new();

    // Channel for items from reply pumps
    let (tx, rx) = mpsc::channel::<ReplyEvent>();

    tui.status_message = "Connecting...".to_string();
    draw(&mut terminal, &session, &character_name, &mut tui)?;
    match session.select_character(conversation).await {
        Ok(seed) => {
            info!("Conversation seeded: {:?}", seed);
            tui.status_message.clear();
        }
        Err(e) => tui.status_message = e.to_string(),
    }

    let mut needs_redraw = true;
    loop {
        if needs_redraw {
            draw(&mut terminal, &session, &character_name, &mut tui)?;
            needs_redraw = false;
        }

        // Short timeout while a reply streams in so text appears promptly
        let timeout = if session.is_sending() {
            std::time::Duration::from_millis(30)
        } else {
            std::time::Duration::from_millis(250)
        };
        let first_event = poll_event_timeout(timeout);
        if first_event.is_some() {
            needs_redraw = true;
        }

        let mut should_quit = false;
        for event in first_event
            .into_iter()
            .chain(std::iter::from_fn(poll_event_immediate))
        {
            match event {
                TuiEvent::Quit => should_quit = true,
                TuiEvent::Resize => {}
                TuiEvent::InputChar(c) => tui.input.push(c),
                TuiEvent::Paste(text) => tui.input.push_str(&text),
                TuiEvent::Backspace => {
                    tui.input.pop();
                }
                TuiEvent::ScrollUp => tui.scroll_from_bottom += 1,
                TuiEvent::ScrollDown => {
                    tui.scroll_from_bottom = tui.scroll_from_bottom.saturating_sub(1)
                }
                TuiEvent::ScrollPageUp => tui.scroll_from_bottom += PAGE_LINES,
                TuiEvent::ScrollPageDown => {
                    tui.scroll_from_bottom = tui.scroll_from_bottom.saturating_sub(PAGE_LINES)
                }
                TuiEvent::ScrollToBottom => tui.scroll_from_bottom = 0,
                TuiEvent::Submit => match session.send_message(&tui.input) {
                    SendOutcome::Started(reply) => {
                        tui.input.clear();
                        tui.scroll_from_bottom = 0;
                        tui.status_message.clear();
                        spawn_reply_pump(reply, tx.clone());
                    }
                    // Input stays put so it can be sent once the reply lands
                    SendOutcome::Ignored(IgnoreReason::Busy) => {}
                    SendOutcome::Ignored(reason) => debug!("Send ignored: {:?}", reason),
                },
                TuiEvent::ClearHistory => {
                    tui.status_message = "Clearing history...".to_string();
                    draw(&mut terminal, &session, &character_name, &mut tui)?;
                    match session.clear_history().await {
                        Ok(_) => tui.status_message = "History cleared".to_string(),
                        Err(e) => {
                            warn!("Clear history failed: {e}");
                            tui.status_message = e.to_string();
                        }
                    }
                    tui.scroll_from_bottom = 0;
                }
            }
        }

        if should_quit {
            break;
        }

        // Apply reply items in arrival order
        while let Ok(reply_event) = rx.try_recv() {
            needs_redraw = true;
            let progress = match reply_event {
                ReplyEvent::Item(generation, item) => session.apply_frame(generation, item),
                ReplyEvent::Closed(generation) => session.end_of_stream(generation),
            };
            if let ReplyProgress::Finished(outcome) = progress {
                tui.status_message = match outcome {
                    ReplyOutcome::Completed => String::new(),
                    ReplyOutcome::ServerError(_) => "Service reported an error".to_string(),
                    ReplyOutcome::TransportError(_) => "Connection problem".to_string(),
                    ReplyOutcome::Abandoned => String::new(),
                };
            }
        }
    }

    ratatui::restore();
    Ok(())
}

fn draw(
    terminal: &mut ratatui::DefaultTerminal,
    session: &SessionController,
    character_name: &str,
    tui: &mut TuiState,
) -> std::io::Result<()> {
    let messages = session.snapshot();
    let view = ui::View {
        character_name,
        state: session.state(),
        messages: &messages,
    };
    terminal.draw(|f| ui::draw_ui(f, &view, tui))?;
    Ok(())
}

/// Forwards every item of `reply` to the event loop, stopping after a terminal one.
fn spawn_reply_pump(reply: PendingReply, tx: mpsc::Sender<ReplyEvent>) {
    let (generation, mut frames) = reply.into_parts();
    info!("Spawning reply pump for generation {generation}");

    tokio::spawn(async move {
        while let Some(item) = frames.next().await {
            let terminal = match &item {
                Ok(frame) => frame.is_terminal(),
                Err(_) => true,
            };
            if tx.send(ReplyEvent::Item(generation, item)).is_err() {
                warn!("Failed to forward reply item: receiver dropped");
                return;
            }
            if terminal {
                return;
            }
        }
        if tx.send(ReplyEvent::Closed(generation)).is_err() {
            warn!("Failed to forward stream close: receiver dropped");
        }
    });
}
