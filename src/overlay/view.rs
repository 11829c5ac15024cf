//! Overlay rendering — query line, entry list, status line.

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use super::state::OverlayState;

/// Draw one frame. Returns the inner list area used for mouse hit tests.
pub fn draw(frame: &mut Frame, state: &OverlayState, list_ui: &mut ListState) -> Rect {
    let area = frame.area();

    if !state.is_visible() {
        let placeholder = Paragraph::new("cliphistd overlay — waiting for hotkey")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(placeholder, area);
        return Rect::default();
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

    // Query input.
    let input = Paragraph::new(state.query())
        .block(Block::default().borders(Borders::ALL).title("search"));
    frame.render_widget(input, chunks[0]);

    // Entry list. ListState keeps the highlighted row in view with an
    // instant offset jump — no animation, safe under key repeat.
    let items: Vec<ListItem> = state
        .entries()
        .iter()
        .map(|e| ListItem::new(Line::from(preview(&e.content))))
        .collect();
    let list_block = Block::default().borders(Borders::ALL).title("history");
    let inner = list_block.inner(chunks[1]);
    let list = List::new(items)
        .block(list_block)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    list_ui.select(state.selected());
    frame.render_stateful_widget(list, chunks[1], list_ui);

    // Status line: flash message, else a hint.
    let status = match state.flash() {
        Some(msg) => Line::styled(msg.to_string(), Style::default().fg(Color::Red)),
        None => Line::styled(
            format!(
                "{} entries — enter/click copies, esc dismisses",
                state.entries().len()
            ),
            Style::default().fg(Color::DarkGray),
        ),
    };
    frame.render_widget(Paragraph::new(status), chunks[2]);

    inner
}

/// Map a mouse position to a list row index.
///
/// `inner` is the list's inner area (borders excluded) and `offset` the
/// first visible row. Returns `None` outside the area or past the end of
/// the list.
pub fn row_at(inner: Rect, offset: usize, column: u16, row: u16, len: usize) -> Option<usize> {
    if column < inner.x
        || column >= inner.x + inner.width
        || row < inner.y
        || row >= inner.y + inner.height
    {
        return None;
    }
    let index = offset + (row - inner.y) as usize;
    (index < len).then_some(index)
}

/// Single-line preview of entry content: control characters collapse to
/// spaces, long content is cut with an ellipsis.
pub fn preview(content: &str) -> String {
    const MAX: usize = 200;
    let mut line: String = content
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(MAX + 1)
        .collect();
    if line.chars().count() > MAX {
        line.truncate(line.chars().take(MAX).map(char::len_utf8).sum());
        line.push('…');
    }
    line
}
