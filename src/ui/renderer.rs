use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use tui_textarea::TextArea;

use crate::ui::view::ChatView;

const MAX_INPUT_LINES: u16 = 6;

pub fn ui(f: &mut Frame, view: &mut ChatView, textarea: &mut TextArea<'static>, log_status: &str) {
    let input_lines = (textarea.lines().len() as u16).clamp(1, MAX_INPUT_LINES);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),
            Constraint::Length(input_lines + 2), // +2 for borders
        ])
        .split(f.area());

    let available_height = chunks[0].height.saturating_sub(1); // Account for title
    let scroll_offset = view.effective_offset(chunks[0].width, available_height);

    let title = format!(
        "Palaver v{} • Logging: {}",
        env!("CARGO_PKG_VERSION"),
        log_status
    );

    let messages_paragraph = Paragraph::new(view.build_display_lines())
        .block(Block::default().title(title))
        .wrap(Wrap { trim: false })
        .scroll((scroll_offset, 0));
    f.render_widget(messages_paragraph, chunks[0]);

    let input_title = if view.busy {
        format!(
            "{} {} (Esc to stop waiting, Ctrl+C to quit)",
            pulse_symbol(view),
            view.status_text()
        )
    } else {
        "Type your message (Enter to send, Shift+Enter for new line, Ctrl+C to quit)".to_string()
    };
    let border_style = if view.busy {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };

    textarea.set_block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(input_title),
    );
    f.render_widget(&*textarea, chunks[1]);
}

fn pulse_symbol(view: &ChatView) -> &'static str {
    // Two pulses per second.
    let elapsed = view.pulse_start.elapsed().as_millis() as f32 / 1000.0;
    let phase = (elapsed * 2.0) % 2.0;
    let intensity = if phase < 1.0 { phase } else { 2.0 - phase };

    if intensity < 0.33 {
        "○"
    } else if intensity < 0.66 {
        "◐"
    } else {
        "●"
    }
}
