use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Terminal,
};
use soulwave_types::{
    chat::{ChatMessage, Sender},
    events::{EventPayload, SystemEvent},
};
use tokio::sync::mpsc::UnboundedSender;

const MAX_LOG_ENTRIES: usize = 120;
const LOG_PANEL_HEIGHT: u16 = 7;

pub enum UiMessage {
    Event(SystemEvent),
    Shutdown,
}

/// Requests from the terminal back to the session loop.
#[derive(Debug)]
pub enum UiCommand {
    Send(String),
    Quit,
}

pub fn run(
    receiver: Receiver<UiMessage>,
    commands: UnboundedSender<UiCommand>,
    summary: String,
) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_loop(&mut terminal, receiver, &commands, summary.as_str());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    // The session loop may still be waiting on us.
    let _ = commands.send(UiCommand::Quit);
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<UiMessage>,
    commands: &UnboundedSender<UiCommand>,
    summary: &str,
) -> Result<()> {
    let mut thread: Vec<ChatMessage> = Vec::new();
    let mut logs: VecDeque<String> = VecDeque::with_capacity(MAX_LOG_ENTRIES);
    let mut input = String::new();
    let mut last_status = String::from("Starting");
    let mut should_close = false;

    loop {
        loop {
            match receiver.try_recv() {
                Ok(UiMessage::Event(event)) => {
                    if let EventPayload::Chat(chat) = &event.payload {
                        thread.push(chat.message.clone());
                    }
                    if let Some(status) = summarize_status(&event) {
                        last_status = status;
                    }
                    if logs.len() == MAX_LOG_ENTRIES {
                        logs.pop_front();
                    }
                    logs.push_back(format_event(&event));
                }
                Ok(UiMessage::Shutdown) => should_close = true,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    should_close = true;
                    break;
                }
            }
        }
        if should_close {
            break;
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints(
                    [
                        Constraint::Length(3),
                        Constraint::Min(3),
                        Constraint::Length(LOG_PANEL_HEIGHT),
                        Constraint::Length(3),
                    ]
                    .as_ref(),
                )
                .split(f.size());

            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    "Soulwave",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::raw(last_status.clone()),
                Span::raw("  "),
                Span::styled("config:", Style::default().fg(Color::Magenta)),
                Span::raw(" "),
                Span::raw(summary),
                Span::raw("  "),
                Span::styled("Esc", Style::default().fg(Color::Yellow)),
                Span::raw(" to quit"),
            ]))
            .block(Block::default().borders(Borders::ALL).title("Status"));
            f.render_widget(header, chunks[0]);

            let lines: Vec<Line> = thread.iter().map(message_line).collect();
            let conversation = Paragraph::new(lines).wrap(Wrap { trim: false });
            let offset = scroll_offset(
                conversation.line_count(chunks[1].width.saturating_sub(2)),
                chunks[1].height.saturating_sub(2),
            );
            let conversation = conversation
                .block(Block::default().borders(Borders::ALL).title("Chat"))
                .scroll((offset, 0));
            f.render_widget(conversation, chunks[1]);

            let items: Vec<ListItem> = logs
                .iter()
                .rev()
                .map(|entry| ListItem::new(entry.clone()))
                .collect();
            let list =
                List::new(items).block(Block::default().borders(Borders::ALL).title("Events"));
            f.render_widget(list, chunks[2]);

            let prompt = Paragraph::new(input.as_str())
                .block(Block::default().borders(Borders::ALL).title("Message"));
            f.render_widget(prompt, chunks[3]);
            f.set_cursor(
                input_cursor_x(chunks[3], input.chars().count()),
                chunks[3].y.saturating_add(1),
            );
        })?;

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Esc => break,
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => break,
                    KeyCode::Enter => {
                        let text = std::mem::take(&mut input);
                        if !text.trim().is_empty() && commands.send(UiCommand::Send(text)).is_err()
                        {
                            break;
                        }
                    }
                    KeyCode::Backspace => {
                        input.pop();
                    }
                    KeyCode::Char(c) => input.push(c),
                    _ => {}
                }
            }
        }
    }

    Ok(())
}

/// First wrapped row to show so the newest message stays in view.
fn scroll_offset(total_rows: usize, visible_rows: u16) -> u16 {
    let hidden = total_rows.saturating_sub(usize::from(visible_rows));
    u16::try_from(hidden).unwrap_or(u16::MAX)
}

/// Cursor column inside the bordered input box, pinned to its last cell.
fn input_cursor_x(area: Rect, typed_chars: usize) -> u16 {
    let typed = u16::try_from(typed_chars).unwrap_or(u16::MAX);
    area.x
        .saturating_add(1)
        .saturating_add(typed)
        .min(area.right().saturating_sub(2))
}

fn message_line(message: &ChatMessage) -> Line<'static> {
    match message.sender {
        Sender::User => Line::from(Span::styled(
            message.text.clone(),
            Style::default().fg(Color::Green),
        ))
        .alignment(Alignment::Right),
        Sender::Bot => Line::from(vec![
            Span::styled("bot ", Style::default().fg(Color::Cyan)),
            Span::raw(message.text.clone()),
        ])
        .alignment(Alignment::Left),
    }
}

fn summarize_status(event: &SystemEvent) -> Option<String> {
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => Some(format!("Lifecycle: {:?}", lifecycle.phase)),
        EventPayload::Chat(chat) => Some(match chat.message.sender {
            Sender::User => "Waiting for reply".to_string(),
            Sender::Bot if chat.fallback => "Chat service unavailable".to_string(),
            Sender::Bot => "Ready".to_string(),
        }),
        EventPayload::Emotion(emotion) => Some(format!("Mood: {}", emotion.label)),
        _ => None,
    }
}

fn format_event(event: &SystemEvent) -> String {
    let timestamp = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => format!(
            "[{}] Lifecycle::{:?} {}",
            timestamp,
            lifecycle.phase,
            lifecycle.details.clone().unwrap_or_default()
        ),
        EventPayload::Capture(capture) => match &capture.reason {
            Some(reason) => format!("[{}] Capture {} ({})", timestamp, capture.outcome, reason),
            None => format!(
                "[{}] Capture {} {}x{} {}B",
                timestamp, capture.outcome, capture.width, capture.height, capture.encoded_bytes
            ),
        },
        EventPayload::Emotion(emotion) => format!(
            "[{}] Emotion {}{}{}",
            timestamp,
            emotion.label,
            emotion
                .confidence
                .map(|c| format!(" ({:.0}%)", c * 100.0))
                .unwrap_or_default(),
            if emotion.fallback { " fallback" } else { "" }
        ),
        EventPayload::Chat(chat) => format!(
            "[{}] Chat {:?}{}",
            timestamp,
            chat.message.sender,
            if chat.fallback { " fallback" } else { "" }
        ),
        EventPayload::Telemetry(telemetry) => match &telemetry.latency {
            Some(latency) => format!(
                "[{}] Turn {}ms (capture {} / detect {} / chat {})",
                timestamp,
                latency.total_ms,
                latency.capture_ms,
                latency.detect_ms,
                latency.chat_ms
            ),
            None => format!("[{}] Telemetry update", timestamp),
        },
        EventPayload::Ops(ops) => format!(
            "[{}] Ops {} [{}]",
            timestamp,
            ops.message,
            ops.tags.join(", ")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bot(text: &str) -> ChatMessage {
        ChatMessage::bot(text)
    }

    #[test]
    fn long_reply_wraps_and_scrolls_to_newest_row() {
        let reply = "word ".repeat(40);
        let thread = vec![ChatMessage::user("hi"), bot(reply.trim_end())];
        let lines: Vec<Line> = thread.iter().map(message_line).collect();
        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false });

        let rows = paragraph.line_count(20);
        assert!(rows > thread.len(), "expected wrapped rows, got {rows}");
        assert_eq!(scroll_offset(rows, 4), (rows - 4) as u16);
    }

    #[test]
    fn short_thread_does_not_scroll() {
        assert_eq!(scroll_offset(3, 10), 0);
    }

    #[test]
    fn scroll_offset_saturates_on_huge_threads() {
        assert_eq!(scroll_offset(usize::MAX, 5), u16::MAX);
    }

    #[test]
    fn cursor_stays_inside_input_box_for_pasted_text() {
        let area = Rect::new(0, 20, 40, 3);
        assert_eq!(input_cursor_x(area, 5), 6);
        assert_eq!(input_cursor_x(area, 100_000), area.right() - 2);

        let edge = Rect::new(u16::MAX - 10, 0, 10, 3);
        assert_eq!(input_cursor_x(edge, usize::MAX), edge.right() - 2);
    }
}
