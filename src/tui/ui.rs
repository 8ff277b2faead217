use ratatui::Frame;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};

use crate::core::message::{Message, Role};
use crate::core::session::SessionState;
use crate::tui::TuiState;

/// What the UI needs from the session, captured once per frame.
pub struct View<'a> {
    pub character_name: &'a str,
    pub state: &'a SessionState,
    pub messages: &'a [Message],
}

pub fn draw_ui(frame: &mut Frame, view: &View<'_>, tui: &mut TuiState) {
    use Constraint::{Length, Min};
    let layout = Layout::vertical([Length(1), Min(0), Length(3)]);
    let [title_area, main_area, input_area] = layout.areas(frame.area());

    frame.render_widget(Span::raw(title_text(view, &tui.status_message)), title_area);
    draw_messages(frame, main_area, view, tui);

    let input_title = if matches!(view.state, SessionState::Sending) {
        "Input (waiting for reply)"
    } else {
        "Input (Enter send, Ctrl+L clear, Esc quit)"
    };
    let input = Paragraph::new(tui.input.as_str()).block(Block::bordered().title(input_title));
    frame.render_widget(input, input_area);
}

fn title_text(view: &View<'_>, status_message: &str) -> String {
    let state = state_label(view.state);
    if status_message.is_empty() {
        format!("Parley | {} | {}", view.character_name, state)
    } else {
        format!("Parley | {} | {} | {}", view.character_name, state, status_message)
    }
}

fn state_label(state: &SessionState) -> &str {
    match state {
        SessionState::Idle => "idle",
        SessionState::LoadingHistory => "loading history...",
        SessionState::AwaitingGreeting => "waiting for greeting...",
        SessionState::Ready => "ready",
        SessionState::Sending => "typing...",
        SessionState::Error(reason) => reason,
    }
}

fn draw_messages(frame: &mut Frame, area: Rect, view: &View<'_>, tui: &mut TuiState) {
    let width = area.width.saturating_sub(2) as usize;
    let lines = message_lines(view.messages, view.character_name, width);

    let visible = area.height.saturating_sub(2) as usize;
    let max_top = lines.len().saturating_sub(visible);
    tui.scroll_from_bottom = tui.scroll_from_bottom.min(max_top);
    let top = max_top - tui.scroll_from_bottom;

    let paragraph = Paragraph::new(lines)
        .block(Block::bordered())
        .scroll((top.min(u16::MAX as usize) as u16, 0));
    frame.render_widget(paragraph, area);
}

/// Wraps the transcript into styled lines for a column `width` wide.
pub fn message_lines<'a>(messages: &'a [Message], character_name: &'a str, width: usize) -> Vec<Line<'a>> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for message in messages {
        let (label, style) = match message.role {
            Role::User => ("you", Style::default().fg(Color::Cyan)),
            Role::Assistant => (character_name, Style::default().fg(Color::Green)),
        };
        lines.push(Line::from(Span::styled(
            label.to_string(),
            style.add_modifier(Modifier::BOLD),
        )));

        let mut content = message.content.trim().to_string();
        if message.in_progress {
            content.push_str(" ▌");
        }
        for wrapped in textwrap::wrap(&content, width) {
            lines.push(Line::from(Span::styled(wrapped.into_owned(), style)));
        }
        lines.push(Line::default());
    }
    lines
}
