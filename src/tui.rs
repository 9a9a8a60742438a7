use crate::driver::BatchSummary;
use crate::logging;
use crossterm::{
    cursor::MoveToPreviousLine,
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor, Stylize},
    terminal::{Clear, ClearType},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Saved,
    NotFound,
    Failed { kind: &'static str },
}

/// Operator-facing progress of a batch run. Every method has a no-op
/// default so drivers can run silently.
pub trait Progress {
    fn start(&mut self, _job: &str, _total: usize, _skipped: usize) {}

    /// Only reported by the sequential driver.
    fn item_started(&mut self, _label: &str) {}

    fn item_finished(&mut self, _label: &str, _status: ItemStatus) {}

    fn cooldown(&mut self, _consecutive: usize, _pause: Duration) {}

    fn finish(&mut self, _summary: &BatchSummary) {}
}

pub struct SilentProgress;

impl Progress for SilentProgress {}

/// Coloured per-item status lines on stdout. With a progress bar the
/// lines are printed above it as items complete, in any order.
pub struct BatchTUI {
    bar: Option<ProgressBar>,
    active_line: bool,
}

impl BatchTUI {
    pub fn new() -> Self {
        Self {
            bar: None,
            active_line: false,
        }
    }

    /// For the worker pool, where items finish out of order.
    pub fn with_progress_bar() -> Self {
        Self {
            bar: Some(ProgressBar::hidden()),
            active_line: false,
        }
    }

    pub fn for_workers(workers: usize) -> Self {
        if workers > 1 {
            Self::with_progress_bar()
        } else {
            Self::new()
        }
    }

    fn draw(result: io::Result<()>) {
        if let Err(e) = result {
            debug!("terminal output failed: {}", e);
        }
    }

    /// The 🔄 line can only be overwritten while it is still the last
    /// line on the terminal.
    fn take_active_line(&mut self) -> bool {
        let logged = logging::take_log_lines();
        std::mem::replace(&mut self.active_line, false) && !logged
    }

    fn status_line(label: &str, status: ItemStatus) -> (Color, String) {
        match status {
            ItemStatus::Saved => (Color::Green, format!("  ✅ {}", truncate(label))),
            ItemStatus::NotFound => (Color::DarkGrey, format!("  ∅ {} (not found)", truncate(label))),
            ItemStatus::Failed { kind } => (Color::Red, format!("  ❌ {} ({})", truncate(label), kind)),
        }
    }
}

impl Default for BatchTUI {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for BatchTUI {
    fn start(&mut self, job: &str, total: usize, skipped: usize) {
        Self::draw(execute!(
            io::stdout(),
            SetForegroundColor(Color::DarkGrey),
            Print(format!("📁 {}: {} already saved, skipping\n", job, skipped)),
            SetForegroundColor(Color::White),
            Print(format!("🔍 {} to scrape\n", total)),
            ResetColor
        ));

        if let Some(bar) = &mut self.bar {
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█░ ");
            *bar = ProgressBar::new(total as u64).with_style(style);
        }
    }

    fn item_started(&mut self, label: &str) {
        if self.bar.is_some() {
            return;
        }
        Self::draw(execute!(
            io::stdout(),
            SetForegroundColor(Color::White),
            Print(format!("  🔄 {}\n", truncate(label))),
            ResetColor
        ));
        logging::take_log_lines();
        self.active_line = true;
    }

    fn item_finished(&mut self, label: &str, status: ItemStatus) {
        let (color, line) = Self::status_line(label, status);

        if let Some(bar) = &self.bar {
            bar.println(line.with(color).to_string());
            bar.inc(1);
            return;
        }

        if self.take_active_line() {
            Self::draw(execute!(io::stdout(), MoveToPreviousLine(1), Clear(ClearType::CurrentLine)));
        }
        Self::draw(execute!(
            io::stdout(),
            SetForegroundColor(color),
            Print(line),
            Print("\n"),
            ResetColor
        ));
    }

    fn cooldown(&mut self, consecutive: usize, pause: Duration) {
        let line = format!(
            "⏸  {} consecutive failures, pausing {}s",
            consecutive,
            pause.as_secs()
        );
        match &self.bar {
            Some(bar) => bar.println(line.with(Color::Yellow).to_string()),
            None => Self::draw(execute!(
                io::stdout(),
                SetForegroundColor(Color::Yellow),
                Print(line),
                Print("\n"),
                ResetColor
            )),
        }
    }

    fn finish(&mut self, summary: &BatchSummary) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }

        Self::draw(execute!(
            io::stdout(),
            Print("─".repeat(80)),
            Print("\n"),
            SetForegroundColor(Color::Green),
            Print(format!("✅ Scraping completed: {} saved", summary.saved)),
            ResetColor
        ));

        if summary.failed > 0 {
            Self::draw(execute!(
                io::stdout(),
                SetForegroundColor(Color::Red),
                Print(format!(", {} failed", summary.failed)),
                ResetColor
            ));
        }

        let mut tail = format!(" | {} not found | {} skipped", summary.not_found, summary.skipped);
        if summary.cooldowns > 0 {
            tail.push_str(&format!(" | {} cooldowns", summary.cooldowns));
        }
        if summary.stopped_early {
            tail.push_str(" | stopped early");
        }
        Self::draw(execute!(
            io::stdout(),
            SetForegroundColor(Color::DarkGrey),
            Print(tail),
            Print("\n"),
            ResetColor
        ));
    }
}

fn truncate(label: &str) -> String {
    if label.chars().count() > 80 {
        format!("{}...", label.chars().take(77).collect::<String>())
    } else {
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_labels_on_char_boundaries() {
        let label = "スパイク".repeat(30);
        let out = truncate(&label);
        assert_eq!(out.chars().count(), 80);
        assert!(out.ends_with("..."));
        assert_eq!(truncate("short"), "short");
    }

    #[test]
    fn progress_line_is_kept_once_something_was_logged() {
        let mut tui = BatchTUI::new();

        logging::take_log_lines();
        tui.active_line = true;
        assert!(tui.take_active_line());
        assert!(!tui.take_active_line());

        tui.active_line = true;
        logging::note_log_line();
        assert!(!tui.take_active_line());
        assert!(!tui.active_line);
    }

    #[test]
    fn failed_lines_name_the_error_kind() {
        let (color, line) = BatchTUI::status_line("anime 1", ItemStatus::Failed { kind: "network" });
        assert_eq!(color, Color::Red);
        assert_eq!(line, "  ❌ anime 1 (network)");
    }
}
