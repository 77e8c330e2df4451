//! Header component: 2-row top bar.
//!
//! Row 1: title, run-status badge, destination count, stream dot, loading.
//! Row 2: backend URL and the stock channel.
//!
//! Not focusable.

use ratatui::crossterm::event::KeyEvent;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
    Frame,
};

use crate::{
    action::{Action, ComponentId},
    app_state::AppState,
    component::Component,
    theme::{
        status_color, C_ACCENT, C_BADGE_LIVE, C_BADGE_PENDING, C_CHANNEL_ID, C_MUTED, C_PRIMARY,
        C_SECONDARY,
    },
};

pub struct Header;

impl Header {
    pub fn new() -> Self {
        Self
    }
}

impl Component for Header {
    fn id(&self) -> ComponentId {
        ComponentId::Header
    }

    fn handle_key(&mut self, _key: KeyEvent, _state: &AppState) -> Vec<Action> {
        vec![]
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect, _focused: bool, state: &AppState) {
        frame.render_widget(Clear, area);
        if area.height < 2 {
            frame.render_widget(Paragraph::new(build_row1(state)), area);
            return;
        }

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Length(1)])
            .split(area);
        frame.render_widget(Paragraph::new(build_row1(state)), rows[0]);
        frame.render_widget(Paragraph::new(build_row2(state)), rows[1]);
    }
}

fn build_row1(state: &AppState) -> Line<'static> {
    let status = state.snap.progress.status;
    let (selected, listed) = state.destination_counts();

    let mut spans = vec![
        Span::styled(
            " repost ",
            Style::default().fg(C_ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("[{}]", status.label()),
            Style::default()
                .fg(status_color(status))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  {}/{} destinations", selected, listed),
            Style::default().fg(C_SECONDARY),
        ),
    ];

    if state.snap.stream_connected {
        spans.push(Span::styled("  ● live", Style::default().fg(C_BADGE_LIVE)));
    } else {
        spans.push(Span::styled("  ○ offline", Style::default().fg(C_MUTED)));
    }
    if state.snap.loading {
        spans.push(Span::styled(
            "  loading…",
            Style::default().fg(C_BADGE_PENDING),
        ));
    }
    Line::from(spans)
}

fn build_row2(state: &AppState) -> Line<'static> {
    let stock = match &state.snap.config.stock_channel {
        Some(ch) => vec![
            Span::styled(ch.name.clone(), Style::default().fg(C_PRIMARY)),
            Span::styled(format!(" ({})", ch.channel_id), Style::default().fg(C_CHANNEL_ID)),
        ],
        None => vec![Span::styled("not set", Style::default().fg(C_MUTED))],
    };

    let mut spans = vec![
        Span::styled(format!(" {}", state.api_url), Style::default().fg(C_MUTED)),
        Span::styled("  stock ", Style::default().fg(C_SECONDARY)),
    ];
    spans.extend(stock);
    Line::from(spans)
}
