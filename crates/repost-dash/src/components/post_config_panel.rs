//! PostConfigPanel: template, button and delay settings.
//!
//! Enter opens the prompt for the selected field; `+`/`-` nudge a delay by a
//! minute.  Every edit is sent as a whole `PostConfig` and validated before it
//! leaves the dashboard.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Clear, Paragraph, Wrap},
    Frame,
};

use repost_proto::protocol::PostConfig;

use crate::{
    action::{Action, ComponentId, PromptKind},
    app_state::AppState,
    component::Component,
    control::Command,
    theme::{style_selected, style_selected_focused, C_MUTED, C_PRIMARY, C_SECONDARY},
    widgets::{pane_chrome::pane_chrome, progress_bar::fmt_hms},
};

const DELAY_STEP_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Template,
    ButtonLabel,
    ButtonUrl,
    DelayMin,
    DelayMax,
}

const FIELDS: [Field; 5] = [
    Field::Template,
    Field::ButtonLabel,
    Field::ButtonUrl,
    Field::DelayMin,
    Field::DelayMax,
];

impl Field {
    fn label(self) -> &'static str {
        match self {
            Field::Template => "template",
            Field::ButtonLabel => "button",
            Field::ButtonUrl => "url",
            Field::DelayMin => "min delay",
            Field::DelayMax => "max delay",
        }
    }

    fn prompt(self) -> PromptKind {
        match self {
            Field::Template => PromptKind::TemplateText,
            Field::ButtonLabel => PromptKind::ButtonLabel,
            Field::ButtonUrl => PromptKind::ButtonUrl,
            Field::DelayMin => PromptKind::DelayMin,
            Field::DelayMax => PromptKind::DelayMax,
        }
    }

    fn value(self, pc: &PostConfig) -> String {
        match self {
            Field::Template => pc.template_text.clone(),
            Field::ButtonLabel => pc.button_label.clone().unwrap_or_default(),
            Field::ButtonUrl => pc.button_url.clone().unwrap_or_default(),
            Field::DelayMin => pc.delay_min.to_string(),
            Field::DelayMax => pc.delay_max.to_string(),
        }
    }

    fn display(self, pc: &PostConfig) -> String {
        match self {
            Field::DelayMin => fmt_hms(pc.delay_min),
            Field::DelayMax => fmt_hms(pc.delay_max),
            _ => self.value(pc),
        }
    }
}

/// Candidate with the selected delay moved by `delta` seconds.  Validation
/// happens when the command is prepared.
fn nudge_delay(pc: &PostConfig, field: Field, delta: i64) -> Option<PostConfig> {
    let shift = |v: u64| v.saturating_add_signed(delta);
    match field {
        Field::DelayMin => Some(PostConfig {
            delay_min: shift(pc.delay_min),
            ..pc.clone()
        }),
        Field::DelayMax => Some(PostConfig {
            delay_max: shift(pc.delay_max),
            ..pc.clone()
        }),
        _ => None,
    }
}

pub struct PostConfigPanel {
    selected: usize,
}

impl PostConfigPanel {
    pub fn new() -> Self {
        Self { selected: 0 }
    }

    fn field(&self) -> Field {
        FIELDS[self.selected.min(FIELDS.len() - 1)]
    }
}

impl Component for PostConfigPanel {
    fn id(&self) -> ComponentId {
        ComponentId::PostConfig
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        let pc = &state.snap.config.post_config;
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                vec![]
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected = (self.selected + 1).min(FIELDS.len() - 1);
                vec![]
            }
            KeyCode::Enter | KeyCode::Char('e') => {
                let field = self.field();
                vec![Action::Prompt {
                    kind: field.prompt(),
                    initial: field.value(pc),
                }]
            }
            KeyCode::Char('+') | KeyCode::Char('=') => nudge_delay(pc, self.field(), DELAY_STEP_SECS as i64)
                .map(|c| vec![Action::Run(Command::SavePostConfig(c))])
                .unwrap_or_default(),
            KeyCode::Char('-') => nudge_delay(pc, self.field(), -(DELAY_STEP_SECS as i64))
                .map(|c| vec![Action::Run(Command::SavePostConfig(c))])
                .unwrap_or_default(),
            _ => vec![],
        }
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        frame.render_widget(Clear, area);
        let block = pane_chrome("post settings", Some('2'), focused, None);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let pc = &state.snap.config.post_config;
        let lines: Vec<Line> = FIELDS
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let value = field.display(pc);
                let value_span = if value.is_empty() {
                    Span::styled("(empty)", Style::default().fg(C_MUTED))
                } else {
                    Span::styled(value.replace('\n', " ⏎ "), Style::default().fg(C_PRIMARY))
                };
                let line = Line::from(vec![
                    Span::styled(format!(" {:<10}", field.label()), Style::default().fg(C_SECONDARY)),
                    value_span,
                ]);
                if i == self.selected {
                    line.style(if focused {
                        style_selected_focused()
                    } else {
                        style_selected()
                    })
                } else {
                    line
                }
            })
            .collect();

        frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
    }
}
