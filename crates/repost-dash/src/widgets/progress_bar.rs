//! Smooth Unicode progress bar widget.

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::theme::{C_MUTED, C_RUNNING, C_SECONDARY};

/// Render a smooth progress bar in `area`.
/// `ratio` is 0.0..=1.0; the labels sit left and right of the bar.
pub fn draw_progress(
    frame: &mut Frame,
    area: Rect,
    ratio: f64,
    left_label: Option<&str>,
    right_label: Option<&str>,
) {
    if area.width < 4 || area.height == 0 {
        return;
    }

    let left_label = left_label.unwrap_or_default();
    let right_label = right_label.unwrap_or_default();
    let label_w = (left_label.chars().count() + right_label.chars().count() + 2) as u16;
    let bar_w = area.width.saturating_sub(label_w).max(4) as usize;

    let mut spans = Vec::new();
    if !left_label.is_empty() {
        spans.push(Span::styled(
            format!("{} ", left_label),
            Style::default().fg(C_SECONDARY),
        ));
    }
    spans.push(Span::styled(bar_cells(ratio, bar_w), Style::default().fg(C_RUNNING)));
    if !right_label.is_empty() {
        spans.push(Span::styled(
            format!(" {}", right_label),
            Style::default().fg(C_MUTED),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// `width` cells of bar; 8 eighths per cell.
fn bar_cells(ratio: f64, width: usize) -> String {
    const BLOCKS: [char; 9] = [' ', '▏', '▎', '▍', '▌', '▋', '▊', '▉', '█'];

    let eighths = (ratio.clamp(0.0, 1.0) * width as f64 * 8.0) as usize;
    let full_blocks = eighths / 8;
    let partial = eighths % 8;

    let mut bar = String::with_capacity(width * 3);
    for _ in 0..full_blocks {
        bar.push('█');
    }
    if full_blocks < width {
        bar.push(BLOCKS[partial]);
        for _ in (full_blocks + 1)..width {
            bar.push(' ');
        }
    }
    bar
}

/// `H:MM:SS`, hours unpadded.
pub fn fmt_hms(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{}:{:02}:{:02}", h, m, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hms_formatting() {
        assert_eq!(fmt_hms(0), "0:00:00");
        assert_eq!(fmt_hms(59), "0:00:59");
        assert_eq!(fmt_hms(3661), "1:01:01");
        assert_eq!(fmt_hms(36_000 * 3), "30:00:00");
    }

    #[test]
    fn bar_is_always_full_width() {
        for ratio in [0.0, 0.33, 0.5, 1.0, 7.0] {
            assert_eq!(bar_cells(ratio, 20).chars().count(), 20, "ratio {}", ratio);
        }
        assert_eq!(bar_cells(1.0, 4), "████");
        assert_eq!(bar_cells(0.5, 4), "██  ");
    }
}
