//! ProgressPanel: the current run and the lifetime totals.

use ratatui::crossterm::event::KeyEvent;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};

use repost_proto::protocol::Status;

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{status_color, C_ERROR, C_MUTED, C_PRIMARY, C_RUNNING, C_SECONDARY},
    widgets::{
        pane_chrome::{pane_chrome, Badge},
        progress_bar::{draw_progress, fmt_hms},
    },
};

pub struct ProgressPanel;

impl ProgressPanel {
    pub fn new() -> Self {
        Self
    }
}

impl Component for ProgressPanel {
    fn id(&self) -> ComponentId {
        ComponentId::Progress
    }

    fn handle_key(&mut self, _key: KeyEvent, _state: &AppState) -> Vec<Action> {
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, focused: bool, state: &AppState) {
        let progress = &state.snap.progress;
        let status = progress.status;

        frame.render_widget(Clear, area);
        let block = pane_chrome(
            "progress",
            Some('1'),
            focused,
            Some(Badge {
                text: status.label(),
                color: status_color(status),
            }),
        );
        let inner = block.inner(area);
        frame.render_widget(block, area);
        if inner.height == 0 {
            return;
        }

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
            ])
            .split(inner);

        let count = format!("{}/{}", progress.current, progress.total);
        let remaining = (status == Status::Running).then(|| fmt_hms(progress.remaining_time));
        draw_progress(frame, rows[0], progress.ratio(), Some(&count), remaining.as_deref());

        let run_line = match status {
            Status::Running => Line::from(vec![
                Span::styled(" next batch in ", Style::default().fg(C_SECONDARY)),
                Span::styled(fmt_hms(progress.remaining_time), Style::default().fg(C_PRIMARY)),
            ]),
            Status::Completed => Line::from(Span::styled(
                " run completed; reload to start over",
                Style::default().fg(C_SECONDARY),
            )),
            _ => Line::from(Span::styled(" not running", Style::default().fg(C_MUTED))),
        };
        frame.render_widget(Paragraph::new(run_line), rows[1]);

        let totals = state.snap.totals;
        let totals_line = Line::from(vec![
            Span::styled(" lifetime ", Style::default().fg(C_SECONDARY)),
            Span::styled(format!("{} posts", totals.posts_ever), Style::default().fg(C_RUNNING)),
            Span::styled("  ", Style::default()),
            Span::styled(
                format!("{} failures", totals.failures_ever),
                Style::default().fg(if totals.failures_ever > 0 { C_ERROR } else { C_MUTED }),
            ),
        ]);
        frame.render_widget(Paragraph::new(totals_line), rows[2]);
    }
}
