//! Text rendering of a [`SessionView`].

use pomodoro_server::view::SessionView;

/// Width of the progress bar in cells.
pub const BAR_WIDTH: usize = 20;

/// Draws `progress` (in `[0, 1]`) as a bar of `width` cells.
#[must_use]
pub fn progress_bar(progress: f64, width: usize) -> String {
    let filled = ((progress.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("{}{}", "#".repeat(filled), "-".repeat(width - filled))
}

/// Single-line status, e.g. `Focus 24:59 [#-------------------] Pause`.
#[must_use]
pub fn render_line(view: &SessionView) -> String {
    format!(
        "{} {} [{}] {}",
        view.phase.label(),
        view.clock,
        progress_bar(view.progress, BAR_WIDTH),
        view.button.as_str()
    )
}

/// Multi-line status panel.
#[must_use]
pub fn render_block(view: &SessionView) -> String {
    let state = if view.running { "running" } else { "paused" };
    format!(
        "{} ({} min, {})\n  {}\n  [{}] {:>3}%\n  < {} >",
        view.phase.label(),
        view.phase_minutes,
        state,
        view.clock,
        progress_bar(view.progress, BAR_WIDTH),
        (view.progress * 100.0).round() as u64,
        view.button.as_str()
    )
}
