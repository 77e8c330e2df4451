//! LogPanel: the worker's activity log, newest at the bottom.
//!
//! Follows the tail until the operator scrolls up; `G` (or scrolling back
//! to the bottom) resumes following.

use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind};
use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};

use repost_proto::protocol::LogEntry;

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{level_color, C_MUTED, C_SECONDARY},
    widgets::pane_chrome::{pane_chrome, Badge},
};

const PAGE: usize = 10;

pub struct LogPanel {
    /// Index of the first visible entry.
    scroll: usize,
    follow: bool,
    /// Visible rows at the last draw.
    height: usize,
}

impl LogPanel {
    pub fn new() -> Self {
        Self {
            scroll: 0,
            follow: true,
            height: 0,
        }
    }

    fn max_scroll(&self, len: usize) -> usize {
        len.saturating_sub(self.height.max(1))
    }

    fn scroll_up(&mut self, n: usize, len: usize) {
        let from = if self.follow { self.max_scroll(len) } else { self.scroll };
        self.scroll = from.saturating_sub(n);
        self.follow = false;
    }

    fn scroll_down(&mut self, n: usize, len: usize) {
        if self.follow {
            return;
        }
        self.scroll = (self.scroll + n).min(self.max_scroll(len));
        self.follow = self.scroll >= self.max_scroll(len);
    }
}

impl Component for LogPanel {
    fn id(&self) -> ComponentId {
        ComponentId::Logs
    }

    fn handle_key(&mut self, key: KeyEvent, state: &AppState) -> Vec<Action> {
        if key.kind == KeyEventKind::Release {
            return vec![];
        }
        let len = state.snap.logs.len();
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.scroll_up(1, len),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_down(1, len),
            KeyCode::PageUp => self.scroll_up(PAGE, len),
            KeyCode::PageDown => self.scroll_down(PAGE, len),
            KeyCode::Home | KeyCode::Char('g') => {
                self.scroll = 0;
                self.follow = false;
            }
            KeyCode::End | KeyCode::Char('G') => self.follow = true,
            _ => {}
        }
        vec![]
    }

    fn handle_mouse(&mut self, event: MouseEvent, _area: Rect, state: &AppState) -> Vec<Action> {
        let len = state.snap.logs.len();
        match event.kind {
            MouseEventKind::ScrollUp => self.scroll_up(3, len),
            MouseEventKind::ScrollDown => self.scroll_down(3, len),
            _ => {}
        }
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        frame.render_widget(Clear, area);
        let badge = (!self.follow).then_some(Badge {
            text: "paused",
            color: C_MUTED,
        });
        let block = pane_chrome("log", Some('4'), focused, badge);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        self.height = inner.height as usize;
        let logs = &state.snap.logs;
        if logs.is_empty() {
            frame.render_widget(
                Paragraph::new(Span::styled("  no log entries yet", Style::default().fg(C_MUTED))),
                inner,
            );
            return;
        }

        let max_scroll = self.max_scroll(logs.len());
        if self.follow || self.scroll > max_scroll {
            self.scroll = max_scroll;
        }

        let lines: Vec<Line> = logs
            .iter()
            .skip(self.scroll)
            .take(self.height)
            .map(log_line)
            .collect();
        frame.render_widget(Paragraph::new(lines), inner);
    }
}

fn log_line(entry: &LogEntry) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!(" {} ", compact_timestamp(&entry.timestamp)),
            Style::default().fg(C_SECONDARY),
        ),
        Span::styled(entry.message.clone(), Style::default().fg(level_color(entry.level))),
    ])
}

/// `HH:MM:SS` for today, `MM-DD HH:MM` otherwise; unparseable stamps pass through.
fn compact_timestamp(raw: &str) -> String {
    let local = if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        dt.with_timezone(&chrono::Local).naive_local()
    } else if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        naive
    } else {
        return raw.to_string();
    };
    let fmt = if local.date() == chrono::Local::now().date_naive() {
        "%H:%M:%S"
    } else {
        "%m-%d %H:%M"
    };
    local.format(fmt).to_string()
}
