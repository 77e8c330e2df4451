//! Status bar: bottom line with input mode and keybindings.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::action::ComponentId;
use crate::theme::{C_MODE_CONFIRM, C_MODE_NORMAL, C_MODE_PROMPT, C_MUTED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// The one-line prompt owns the keyboard.
    Prompt,
    /// Waiting for y/n.
    Confirm,
}

impl InputMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Prompt => "INPUT",
            Self::Confirm => "CONFIRM",
        }
    }

    pub fn color(self) -> Color {
        match self {
            Self::Normal => C_MODE_NORMAL,
            Self::Prompt => C_MODE_PROMPT,
            Self::Confirm => C_MODE_CONFIRM,
        }
    }
}

const GLOBAL_KEYS: &str = "s start/stop  p post now  c clear  x export  i import  r reload  Tab/1-4 panes  ? help  q quit";

fn pane_keys(focused: Option<ComponentId>) -> &'static str {
    match focused {
        Some(ComponentId::PostConfig) => "↑↓ field  Enter edit  +/- delay ±1m",
        Some(ComponentId::Channels) => "↑↓ select  Space toggle  a add  e rename  d remove  S stock",
        Some(ComponentId::Logs) => "↑↓ scroll  g/G top/bottom",
        _ => "",
    }
}

/// Draw the keybindings footer bar (one row).
pub fn draw_keys_bar(frame: &mut Frame, area: Rect, mode: InputMode, focused: Option<ComponentId>) {
    let mut spans = vec![Span::styled(
        format!(" {} ", mode.label()),
        Style::default().fg(mode.color()).add_modifier(Modifier::BOLD),
    )];

    let keys = match mode {
        InputMode::Normal => {
            let local = pane_keys(focused);
            if local.is_empty() {
                format!(" {}", GLOBAL_KEYS)
            } else {
                format!(" {}  │  {}", local, GLOBAL_KEYS)
            }
        }
        InputMode::Prompt => " type value  Enter submit  Esc cancel".to_string(),
        InputMode::Confirm => " y confirm  n/Esc cancel".to_string(),
    };

    spans.push(Span::styled(keys, Style::default().fg(C_MUTED)));
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
