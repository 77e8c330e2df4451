//! ChannelList: destination channels with selection checkboxes and stats.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

use repost_proto::protocol::{ChannelRef, ChannelStatsSummary};

use crate::{
    action::{Action, ComponentId, PromptKind},
    app_state::AppState,
    component::Component,
    control::Command,
    theme::{
        style_selected, style_selected_focused, C_CHANNEL_ID, C_CHECKED, C_ERROR, C_MUTED,
        C_PRIMARY, C_SECONDARY,
    },
    widgets::pane_chrome::{pane_chrome, Badge},
};

/// `id name` as typed into the prompt.
pub fn channel_input(channel: &ChannelRef) -> String {
    if channel.name == channel.channel_id {
        channel.channel_id.clone()
    } else {
        format!("{} {}", channel.channel_id, channel.name)
    }
}

fn summary_line(summary: Option<&ChannelStatsSummary>) -> Line<'static> {
    let Some(s) = summary else {
        return Line::from(Span::styled(" stats pending", Style::default().fg(C_MUTED)));
    };
    let mut spans = vec![Span::styled(
        format!(
            " {} channels · {} active · {} posts · {:.1}% ok",
            s.total_channels, s.active_channels, s.total_posts, s.success_rate
        ),
        Style::default().fg(C_SECONDARY),
    )];
    if s.channels_with_errors > 0 {
        spans.push(Span::styled(
            format!(" · {} with errors", s.channels_with_errors),
            Style::default().fg(C_ERROR),
        ));
    }
    Line::from(spans)
}

pub struct ChannelList {
    list_state: ListState,
}

impl ChannelList {
    pub fn new() -> Self {
        Self {
            list_state: ListState::default().with_selected(Some(0)),
        }
    }

    fn cursor(&self, len: usize) -> Option<usize> {
        if len == 0 {
            None
        } else {
            Some(self.list_state.selected().unwrap_or(0).min(len - 1))
        }
    }

    fn current<'a>(&self, state: &'a AppState) -> Option<&'a ChannelRef> {
        let channels = state.snap.selection.channels();
        self.cursor(channels.len()).map(|i| &channels[i])
    }

    fn move_by(&mut self, delta: isize, len: usize) {
        let Some(cur) = self.cursor(len) else {
            return;
        };
        let next = cur.saturating_add_signed(delta).min(len - 1);
        self.list_state.select(Some(next));
    }
}

impl Component for ChannelList {
    fn id(&self) -> ComponentId {
        ComponentId::Channels
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        let len = state.snap.selection.channels().len();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_by(-1, len);
                vec![]
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_by(1, len);
                vec![]
            }
            KeyCode::Char(' ') => match self.current(state) {
                Some(ch) => vec![Action::Run(Command::ToggleDestination(ch.channel_id.clone()))],
                None => vec![],
            },
            KeyCode::Char('a') => vec![Action::Prompt {
                kind: PromptKind::AddDestination,
                initial: String::new(),
            }],
            KeyCode::Char('e') => match self.current(state) {
                Some(ch) => vec![Action::Prompt {
                    kind: PromptKind::RenameDestination(ch.channel_id.clone()),
                    initial: channel_input(ch),
                }],
                None => vec![],
            },
            KeyCode::Char('d') | KeyCode::Delete => match self.current(state) {
                Some(ch) => vec![Action::Confirm {
                    question: format!("Remove destination {}?", ch.name),
                    command: Command::RemoveDestination(ch.channel_id.clone()),
                }],
                None => vec![],
            },
            KeyCode::Char('S') => vec![Action::Prompt {
                kind: PromptKind::StockChannel,
                initial: state
                    .snap
                    .config
                    .stock_channel
                    .as_ref()
                    .map(channel_input)
                    .unwrap_or_default(),
            }],
            _ => vec![],
        }
    }

    fn handle_mouse(&mut self, event: MouseEvent, area: Rect, state: &AppState) -> Vec<Action> {
        let len = state.snap.selection.channels().len();
        match event.kind {
            MouseEventKind::ScrollUp => self.move_by(-1, len),
            MouseEventKind::ScrollDown => self.move_by(1, len),
            MouseEventKind::Down(_) => {
                // Rows start below the border; the offset tracks list scrolling.
                let row = event.row.saturating_sub(area.y + 1) as usize + self.list_state.offset();
                if row < len {
                    self.list_state.select(Some(row));
                }
            }
            _ => {}
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        frame.render_widget(Clear, area);
        let (selected, listed) = state.destination_counts();
        let badge_text = format!("{}/{}", selected, listed);
        let block = pane_chrome(
            "destinations",
            Some('3'),
            focused,
            Some(Badge {
                text: &badge_text,
                color: C_CHECKED,
            }),
        );
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(inner);

        let channels = state.snap.selection.channels();
        if channels.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled(
                    "  no destinations yet (a to add)",
                    Style::default().fg(C_MUTED),
                )),
                rows[0],
            );
        } else {
            let items: Vec<ListItem> = channels
                .iter()
                .map(|ch| {
                    let checked = state.snap.selection.is_selected(&ch.channel_id);
                    let mut spans = vec![
                        if checked {
                            Span::styled(" [x] ", Style::default().fg(C_CHECKED))
                        } else {
                            Span::styled(" [ ] ", Style::default().fg(C_MUTED))
                        },
                        Span::styled(ch.name.clone(), Style::default().fg(C_PRIMARY)),
                        Span::styled(format!(" {}", ch.channel_id), Style::default().fg(C_CHANNEL_ID)),
                    ];
                    if let Some(stats) = state.stats_for(&ch.channel_id) {
                        spans.push(Span::styled(
                            format!("  {} posts", stats.total_posts),
                            Style::default().fg(C_SECONDARY),
                        ));
                        if stats.total_failures > 0 {
                            spans.push(Span::styled(
                                format!(" {} failed", stats.total_failures),
                                Style::default().fg(C_ERROR),
                            ));
                        }
                        if !stats.is_active {
                            spans.push(Span::styled(" inactive", Style::default().fg(C_MUTED)));
                        }
                    }
                    ListItem::new(Line::from(spans))
                })
                .collect();

            let cursor = self.cursor(channels.len());
            self.list_state.select(cursor);
            let list = List::new(items).highlight_style(if focused {
                style_selected_focused()
            } else {
                style_selected()
            });
            frame.render_stateful_widget(list, rows[0], &mut self.list_state);
        }

        frame.render_widget(
            Paragraph::new(summary_line(state.snap.stats_summary.as_ref())),
            rows[1],
        );
    }
}
