use crate::themes::Theme;
use ratatui::text::{Line, Span};

/// Configuration controlling visual appearance of a progress bar.
pub struct ProgressBarConfig {
    /// Total width in terminal columns of the bar portion (excluding label).
    pub width: u16,
    /// Character used to fill the completed portion of the bar.
    pub filled_char: char,
    /// Character used to fill the empty portion of the bar.
    pub empty_char: char,
    /// Whether to append a percentage figure after the bar.
    pub show_percentage: bool,
    /// Whether to append a textual label (e.g. counts) after the bar.
    pub show_label: bool,
}

impl Default for ProgressBarConfig {
    fn default() -> Self {
        Self {
            width: 50,
            filled_char: '\u{2588}', // █  FULL BLOCK
            empty_char: '\u{2591}',  // ░  LIGHT SHADE
            show_percentage: true,
            show_label: true,
        }
    }
}

// ── TokenProgressBar ─────────────────────────────────────────────────────────

/// Horizontal progress bar that shows token usage relative to a token limit.
///
/// Renders as a coloured fill + empty portion followed by a label that shows
/// the percentage and the `current / limit` counts formatted with thousands
/// separators.
pub struct TokenProgressBar<'a> {
    /// Percentage of the limit consumed, clamped to `[0.0, 100.0]`.
    pub percentage: f64,
    /// Tokens consumed so far.
    pub current: u64,
    /// Maximum token limit.
    pub limit: u64,
    /// Theme from which colour styles are taken.
    pub theme: &'a Theme,
    /// Visual configuration.
    pub config: ProgressBarConfig,
}

impl<'a> TokenProgressBar<'a> {
    /// Construct a new bar, computing the percentage automatically.
    pub fn new(current: u64, limit: u64, theme: &'a Theme) -> Self {
        let percentage = if limit > 0 {
            ((current as f64 / limit as f64) * 100.0).min(100.0)
        } else {
            0.0
        };
        Self {
            percentage,
            current,
            limit,
            theme,
            config: ProgressBarConfig::default(),
        }
    }

    /// Render the progress bar as a [`Line`] suitable for embedding in any
    /// ratatui widget that accepts `Line` values.
    pub fn to_line(&self) -> Line<'a> {
        let filled = ((self.percentage / 100.0) * self.config.width as f64) as u16;
        let empty = self.config.width.saturating_sub(filled);

        let bar_style = self.theme.progress_style(self.percentage);

        let filled_str: String =
            std::iter::repeat_n(self.config.filled_char, filled as usize).collect();
        let empty_str: String =
            std::iter::repeat_n(self.config.empty_char, empty as usize).collect();

        let label = format!(
            " {:.1}% ({}/{})",
            self.percentage,
            monitor_core::formatting::format_number(self.current as f64, 0),
            monitor_core::formatting::format_number(self.limit as f64, 0),
        );

        Line::from(vec![
            Span::styled(filled_str, bar_style),
            Span::styled(empty_str, self.theme.progress_empty),
            Span::styled(label, self.theme.progress_label),
        ])
    }
}

// ── TimeProgressBar ──────────────────────────────────────────────────────────

/// Horizontal progress bar that shows elapsed time within a session window.
///
/// The label shows how much time remains, formatted via
/// [`monitor_core::formatting::format_time`].
pub struct TimeProgressBar<'a> {
    /// Minutes that have elapsed in the current session.
    pub elapsed_minutes: f64,
    /// Total duration of the session window in minutes.
    pub total_minutes: f64,
    /// Theme from which colour styles are taken.
    pub theme: &'a Theme,
    /// Visual configuration.
    pub config: ProgressBarConfig,
}

impl<'a> TimeProgressBar<'a> {
    /// Construct a new time bar.
    pub fn new(elapsed: f64, total: f64, theme: &'a Theme) -> Self {
        Self {
            elapsed_minutes: elapsed,
            total_minutes: total,
            theme,
            config: ProgressBarConfig::default(),
        }
    }

    /// Render the progress bar as a [`Line`].
    pub fn to_line(&self) -> Line<'a> {
        let percentage = if self.total_minutes > 0.0 {
            (self.elapsed_minutes / self.total_minutes * 100.0).min(100.0)
        } else {
            0.0
        };

        let filled = ((percentage / 100.0) * self.config.width as f64) as u16;
        let empty = self.config.width.saturating_sub(filled);

        let bar_style = self.theme.progress_style(percentage);

        let filled_str: String =
            std::iter::repeat_n(self.config.filled_char, filled as usize).collect();
        let empty_str: String =
            std::iter::repeat_n(self.config.empty_char, empty as usize).collect();

        let remaining = (self.total_minutes - self.elapsed_minutes).max(0.0);
        let label = format!(
            " {} remaining",
            monitor_core::formatting::format_time(remaining)
        );

        Line::from(vec![
            Span::styled(filled_str, bar_style),
            Span::styled(empty_str, self.theme.progress_empty),
            Span::styled(label, self.theme.progress_label),
        ])
    }
}

// ── ModelUsageBar ────────────────────────────────────────────────────────────

/// A proportional multi-coloured bar that visualises per-model token usage.
///
/// Each model is rendered as a contiguous coloured segment whose width is
/// proportional to its share of total usage.  Short text labels follow the bar.
pub struct ModelUsageBar<'a> {
    /// Ordered list of `(model_name, percentage)` pairs.  Percentages should
    /// sum to ≤ 100.
    pub model_percentages: Vec<(String, f64)>,
    /// Theme from which model colour styles are taken.
    pub theme: &'a Theme,
    /// Total width of the bar in terminal columns.
    pub width: u16,
}

impl<'a> ModelUsageBar<'a> {
    /// Construct a new model usage bar.
    pub fn new(model_percentages: Vec<(String, f64)>, theme: &'a Theme) -> Self {
        Self {
            model_percentages,
            theme,
            width: 50,
        }
    }

    /// Render the bar as a [`Line`].
    pub fn to_line(&self) -> Line<'a> {
        let mut spans: Vec<Span<'a>> = Vec::new();

        // Coloured segments proportional to each model's share.
        for (model, pct) in &self.model_percentages {
            let chars = ((*pct / 100.0) * self.width as f64).round() as usize;
            if chars > 0 {
                let segment = "█".repeat(chars);
                spans.push(Span::styled(segment, self.theme.model_style(model)));
            }
        }

        // Space between bar and labels.
        spans.push(Span::raw(" "));

        // Textual labels after the bar.
        for (model, pct) in &self.model_percentages {
            if *pct > 0.0 {
                spans.push(Span::styled(
                    format!("{}: {:.0}% ", model, pct),
                    self.theme.model_style(model),
                ));
            }
        }

        Line::from(spans)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
