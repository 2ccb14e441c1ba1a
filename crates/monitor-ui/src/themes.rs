use ratatui::style::{Color, Modifier, Style};

/// Terminal background type detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackgroundType {
    Dark,
    Light,
    Unknown,
}

/// Detect terminal background type from the `COLORFGBG` environment variable.
///
/// The variable has the format `"foreground;background"`.  Background values
/// 0–6 are considered dark; 7–15 are considered light.  If the variable is
/// absent or unparseable, `BackgroundType::Dark` is returned as the safe
/// default.
pub fn detect_background() -> BackgroundType {
    if let Ok(val) = std::env::var("COLORFGBG") {
        if let Some(bg) = val.split(';').next_back() {
            if let Ok(bg_num) = bg.parse::<u8>() {
                return if bg_num <= 6 {
                    BackgroundType::Dark
                } else {
                    BackgroundType::Light
                };
            }
        }
    }
    BackgroundType::Dark
}

/// Complete theme definition carrying all UI styles used by monitor-ui
/// components.
#[derive(Debug, Clone)]
pub struct Theme {
    // ── Header ───────────────────────────────────────────────────────────────
    pub header: Style,
    pub header_sparkle: Style,
    pub separator: Style,

    // ── Text ─────────────────────────────────────────────────────────────────
    pub text: Style,
    pub dim: Style,
    pub bold: Style,
    pub label: Style,
    pub value: Style,

    // ── Status ───────────────────────────────────────────────────────────────
    pub info: Style,
    pub success: Style,
    pub warning: Style,
    pub error: Style,

    // ── Progress bars ────────────────────────────────────────────────────────
    /// Filled portion when usage is below 50 %.
    pub progress_low: Style,
    /// Filled portion when usage is between 50 % and 80 %.
    pub progress_medium: Style,
    /// Filled portion when usage is at or above 80 %.
    pub progress_high: Style,
    /// Unfilled (empty) portion of a progress bar.
    pub progress_empty: Style,
    pub progress_label: Style,

    // ── Cost ─────────────────────────────────────────────────────────────────
    pub cost_low: Style,
    pub cost_medium: Style,
    pub cost_high: Style,

    // ── Models ───────────────────────────────────────────────────────────────
    pub model_opus: Style,
    pub model_sonnet: Style,
    pub model_haiku: Style,
    pub model_unknown: Style,

    // ── Table ────────────────────────────────────────────────────────────────
    pub table_header: Style,
    pub table_border: Style,
    pub table_row: Style,
    pub table_row_alt: Style,
    pub table_total: Style,

    // ── Notifications ────────────────────────────────────────────────────────
    pub notification_info: Style,
    pub notification_warning: Style,
    pub notification_error: Style,

    // ── Burn rate / velocity ─────────────────────────────────────────────────
    /// Snail – very low burn rate.
    pub velocity_slow: Style,
    /// Arrow – moderate burn rate.
    pub velocity_normal: Style,
    /// Rocket – high burn rate.
    pub velocity_fast: Style,
    /// Lightning – extreme burn rate.
    pub velocity_extreme: Style,
}

impl Theme {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Dark-background terminal theme (default).
    pub fn dark() -> Self {
        Self {
            header: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            header_sparkle: Style::default().fg(Color::Yellow),
            separator: Style::default().fg(Color::DarkGray),

            text: Style::default().fg(Color::White),
            dim: Style::default().fg(Color::DarkGray),
            bold: Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
            label: Style::default().fg(Color::Gray),
            value: Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),

            info: Style::default().fg(Color::Cyan),
            success: Style::default().fg(Color::Green),
            warning: Style::default().fg(Color::Yellow),
            error: Style::default().fg(Color::Red),

            progress_low: Style::default().fg(Color::Green),
            progress_medium: Style::default().fg(Color::Yellow),
            progress_high: Style::default().fg(Color::Red),
            progress_empty: Style::default().fg(Color::DarkGray),
            progress_label: Style::default().fg(Color::Gray),

            cost_low: Style::default().fg(Color::Green),
            cost_medium: Style::default().fg(Color::Yellow),
            cost_high: Style::default().fg(Color::Red),

            model_opus: Style::default().fg(Color::Magenta),
            model_sonnet: Style::default().fg(Color::Cyan),
            model_haiku: Style::default().fg(Color::Green),
            model_unknown: Style::default().fg(Color::Gray),

            table_header: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            table_border: Style::default().fg(Color::DarkGray),
            table_row: Style::default().fg(Color::White),
            table_row_alt: Style::default().fg(Color::Gray),
            table_total: Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),

            notification_info: Style::default().fg(Color::Cyan),
            notification_warning: Style::default().fg(Color::Yellow),
            notification_error: Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),

            velocity_slow: Style::default().fg(Color::Green),
            velocity_normal: Style::default().fg(Color::Cyan),
            velocity_fast: Style::default().fg(Color::Yellow),
            velocity_extreme: Style::default().fg(Color::Red),
        }
    }

    /// Light-background terminal theme.
    ///
    /// Uses dark colours for text and bright accent colours so that content
    /// remains legible against a white/light-grey terminal canvas.
    pub fn light() -> Self {
        Self {
            header: Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD),
            header_sparkle: Style::default().fg(Color::Magenta),
            separator: Style::default().fg(Color::Gray),

            text: Style::default().fg(Color::Black),
            dim: Style::default().fg(Color::Gray),
            bold: Style::default()
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
            label: Style::default().fg(Color::DarkGray),
            value: Style::default()
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),

            info: Style::default().fg(Color::Blue),
            success: Style::default().fg(Color::Green),
            warning: Style::default().fg(Color::Yellow),
            error: Style::default().fg(Color::Red),

            progress_low: Style::default().fg(Color::Green),
            progress_medium: Style::default().fg(Color::Yellow),
            progress_high: Style::default().fg(Color::Red),
            progress_empty: Style::default().fg(Color::Gray),
            progress_label: Style::default().fg(Color::DarkGray),

            cost_low: Style::default().fg(Color::Green),
            cost_medium: Style::default().fg(Color::Yellow),
            cost_high: Style::default().fg(Color::Red),

            model_opus: Style::default().fg(Color::Magenta),
            model_sonnet: Style::default().fg(Color::Blue),
            model_haiku: Style::default().fg(Color::Green),
            model_unknown: Style::default().fg(Color::DarkGray),

            table_header: Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD),
            table_border: Style::default().fg(Color::Gray),
            table_row: Style::default().fg(Color::Black),
            table_row_alt: Style::default().fg(Color::DarkGray),
            table_total: Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),

            notification_info: Style::default().fg(Color::Blue),
            notification_warning: Style::default().fg(Color::Yellow),
            notification_error: Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),

            velocity_slow: Style::default().fg(Color::Green),
            velocity_normal: Style::default().fg(Color::Blue),
            velocity_fast: Style::default().fg(Color::Yellow),
            velocity_extreme: Style::default().fg(Color::Red),
        }
    }

    /// Classic terminal theme using only the basic 8-colour ANSI palette.
    ///
    /// Avoids bold modifiers to maintain a retro aesthetic and maximise
    /// compatibility with minimal terminal emulators.
    pub fn classic() -> Self {
        Self {
            header: Style::default().fg(Color::Cyan),
            header_sparkle: Style::default().fg(Color::White),
            separator: Style::default().fg(Color::DarkGray),

            text: Style::default().fg(Color::White),
            dim: Style::default().fg(Color::DarkGray),
            bold: Style::default().fg(Color::White),
            label: Style::default().fg(Color::Gray),
            value: Style::default().fg(Color::White),

            info: Style::default().fg(Color::Cyan),
            success: Style::default().fg(Color::Green),
            warning: Style::default().fg(Color::Yellow),
            error: Style::default().fg(Color::Red),

            progress_low: Style::default().fg(Color::Green),
            progress_medium: Style::default().fg(Color::Yellow),
            progress_high: Style::default().fg(Color::Red),
            progress_empty: Style::default().fg(Color::DarkGray),
            progress_label: Style::default().fg(Color::White),

            cost_low: Style::default().fg(Color::Green),
            cost_medium: Style::default().fg(Color::Yellow),
            cost_high: Style::default().fg(Color::Red),

            model_opus: Style::default().fg(Color::Magenta),
            model_sonnet: Style::default().fg(Color::Cyan),
            model_haiku: Style::default().fg(Color::Green),
            model_unknown: Style::default().fg(Color::White),

            table_header: Style::default().fg(Color::Cyan),
            table_border: Style::default().fg(Color::DarkGray),
            table_row: Style::default().fg(Color::White),
            table_row_alt: Style::default().fg(Color::Gray),
            table_total: Style::default().fg(Color::Yellow),

            notification_info: Style::default().fg(Color::Cyan),
            notification_warning: Style::default().fg(Color::Yellow),
            notification_error: Style::default().fg(Color::Red),

            velocity_slow: Style::default().fg(Color::Green),
            velocity_normal: Style::default().fg(Color::Cyan),
            velocity_fast: Style::default().fg(Color::Yellow),
            velocity_extreme: Style::default().fg(Color::Red),
        }
    }

    /// Choose a theme automatically based on the detected terminal background.
    pub fn auto_detect() -> Self {
        match detect_background() {
            BackgroundType::Light => Self::light(),
            _ => Self::dark(),
        }
    }

    /// Construct a theme by name.  Falls back to `auto_detect` for unknown
    /// names.
    pub fn from_name(name: &str) -> Self {
        match name {
            "light" => Self::light(),
            "dark" => Self::dark(),
            "classic" => Self::classic(),
            _ => Self::auto_detect(),
        }
    }

    // ── Style helpers ────────────────────────────────────────────────────────

    /// Return the appropriate progress-bar fill style for a given percentage.
    ///
    /// * `< 50 %`  → `progress_low`
    /// * `50–80 %` → `progress_medium`
    /// * `≥ 80 %`  → `progress_high`
    pub fn progress_style(&self, percentage: f64) -> Style {
        if percentage >= 80.0 {
            self.progress_high
        } else if percentage >= 50.0 {
            self.progress_medium
        } else {
            self.progress_low
        }
    }

    /// Return the appropriate cost style for a given percentage of the limit.
    ///
    /// Uses the same thresholds as [`Self::progress_style`].
    pub fn cost_style(&self, percentage: f64) -> Style {
        if percentage >= 80.0 {
            self.cost_high
        } else if percentage >= 50.0 {
            self.cost_medium
        } else {
            self.cost_low
        }
    }

    /// Return the model-colour style that best matches a raw model name string.
    pub fn model_style(&self, model: &str) -> Style {
        let lower = model.to_lowercase();
        if lower.contains("opus") {
            self.model_opus
        } else if lower.contains("sonnet") {
            self.model_sonnet
        } else if lower.contains("haiku") {
            self.model_haiku
        } else {
            self.model_unknown
        }
    }

    /// Return the velocity style for a given tokens-per-minute burn rate.
    ///
    /// | Tokens / min | Tier     |
    /// |-------------|----------|
    /// | ≥ 1 000      | extreme  |
    /// | ≥ 500        | fast     |
    /// | ≥ 100        | normal   |
    /// | < 100        | slow     |
    pub fn velocity_style(&self, tokens_per_min: f64) -> Style {
        if tokens_per_min >= 1000.0 {
            self.velocity_extreme
        } else if tokens_per_min >= 500.0 {
            self.velocity_fast
        } else if tokens_per_min >= 100.0 {
            self.velocity_normal
        } else {
            self.velocity_slow
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
