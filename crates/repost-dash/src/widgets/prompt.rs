//! Prompt: one-line text input (tui-input) for operator edits.

use ratatui::crossterm::event::{Event, KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};
use tui_input::{backend::crossterm::EventHandler, Input};

use crate::action::PromptKind;
use crate::theme::{style_prompt, C_PROMPT_BG, C_PROMPT_FG};

#[derive(Debug, PartialEq, Eq)]
pub enum PromptAction {
    Submitted(PromptKind, String),
    Cancelled,
    None,
}

#[derive(Default)]
pub struct Prompt {
    input: Input,
    kind: Option<PromptKind>,
}

impl Prompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, kind: PromptKind, initial: &str) {
        self.input = Input::new(initial.to_string());
        self.kind = Some(kind);
    }

    pub fn close(&mut self) {
        self.input = Input::default();
        self.kind = None;
    }

    pub fn is_active(&self) -> bool {
        self.kind.is_some()
    }

    pub fn text(&self) -> &str {
        self.input.value()
    }

    /// Enter submits the current text, Esc cancels; anything else edits.
    pub fn handle_key(&mut self, key: KeyEvent) -> PromptAction {
        let Some(kind) = self.kind.clone() else {
            return PromptAction::None;
        };
        match key.code {
            KeyCode::Esc => {
                self.close();
                PromptAction::Cancelled
            }
            KeyCode::Enter => {
                let text = self.input.value().to_string();
                self.close();
                PromptAction::Submitted(kind, text)
            }
            _ => {
                self.input.handle_event(&Event::Key(key));
                PromptAction::None
            }
        }
    }

    pub fn draw(&self, frame: &mut Frame, area: Rect) {
        let Some(kind) = &self.kind else {
            return;
        };
        let label = format!(" {}: ", kind.title());
        let label_w = unicode_width::UnicodeWidthStr::width(label.as_str()) as u16;
        let field_w = area.width.saturating_sub(label_w + 1) as usize;
        let scroll = self.input.visual_scroll(field_w);
        let visible: String = self.input.value().chars().skip(scroll).collect();

        let line = Line::from(vec![
            Span::styled(
                label,
                Style::default().fg(C_PROMPT_FG).add_modifier(Modifier::BOLD),
            ),
            Span::styled(visible, style_prompt()),
        ]);
        frame.render_widget(
            Paragraph::new(line).style(Style::default().bg(C_PROMPT_BG)),
            area,
        );

        let cursor_x = area.x + label_w + (self.input.visual_cursor().saturating_sub(scroll)) as u16;
        frame.set_cursor_position((cursor_x.min(area.x + area.width.saturating_sub(1)), area.y));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn typing_then_enter_submits() {
        let mut prompt = Prompt::new();
        prompt.open(PromptKind::AddDestination, "");
        for c in "-100 news".chars() {
            assert_eq!(prompt.handle_key(key(KeyCode::Char(c))), PromptAction::None);
        }
        assert_eq!(
            prompt.handle_key(key(KeyCode::Enter)),
            PromptAction::Submitted(PromptKind::AddDestination, "-100 news".into())
        );
        assert!(!prompt.is_active());
    }

    #[test]
    fn escape_discards_prefilled_text() {
        let mut prompt = Prompt::new();
        prompt.open(PromptKind::ButtonLabel, "Join");
        assert_eq!(prompt.text(), "Join");
        assert_eq!(prompt.handle_key(key(KeyCode::Esc)), PromptAction::Cancelled);
        assert_eq!(prompt.text(), "");
    }

    #[test]
    fn inactive_prompt_ignores_keys() {
        let mut prompt = Prompt::new();
        assert_eq!(prompt.handle_key(key(KeyCode::Enter)), PromptAction::None);
    }
}
