use crate::themes::Theme;
use ratatui::text::{Line, Span};

// ── VelocityIndicator ────────────────────────────────────────────────────────

/// Displays the current token burn rate with a tiered emoji and colour.
///
/// | Tokens / min | Emoji | Tier     |
/// |-------------|-------|----------|
/// | ≥ 1 000      | ⚡    | extreme  |
/// | ≥ 500        | 🚀    | fast     |
/// | ≥ 100        | ➡️    | normal   |
/// | < 100        | 🐌    | slow     |
pub struct VelocityIndicator<'a> {
    /// Measured token consumption rate in tokens per minute.
    pub tokens_per_minute: f64,
    /// Theme providing colour styles.
    pub theme: &'a Theme,
}

impl<'a> VelocityIndicator<'a> {
    /// Construct a new indicator.
    pub fn new(tokens_per_minute: f64, theme: &'a Theme) -> Self {
        Self {
            tokens_per_minute,
            theme,
        }
    }

    /// Select the tier emoji for the current burn rate.
    pub fn emoji(&self) -> &'static str {
        if self.tokens_per_minute >= 1000.0 {
            "⚡"
        } else if self.tokens_per_minute >= 500.0 {
            "🚀"
        } else if self.tokens_per_minute >= 100.0 {
            "➡️"
        } else {
            "🐌"
        }
    }

    /// Render the indicator as a [`Line`].
    ///
    /// Format: `"🔥 Burn rate: 123.4 tok/min ➡️"`
    pub fn to_line(&self) -> Line<'a> {
        let style = self.theme.velocity_style(self.tokens_per_minute);
        Line::from(vec![
            Span::styled("🔥 Burn rate: ", self.theme.label),
            Span::styled(format!("{:.1} tok/min", self.tokens_per_minute), style),
            Span::raw(" "),
            Span::raw(self.emoji()),
        ])
    }
}

// ── CostIndicator ────────────────────────────────────────────────────────────

/// Displays the current session cost relative to a configured limit.
///
/// An optional hourly rate is shown in parentheses when provided.
pub struct CostIndicator<'a> {
    /// Cost accrued so far in USD.
    pub current_cost: f64,
    /// Configured cost limit in USD.
    pub cost_limit: f64,
    /// Optional cost-per-hour rate for the current burn velocity.
    pub cost_per_hour: Option<f64>,
    /// Theme providing colour styles.
    pub theme: &'a Theme,
}

impl<'a> CostIndicator<'a> {
    /// Construct a new cost indicator.
    pub fn new(current: f64, limit: f64, per_hour: Option<f64>, theme: &'a Theme) -> Self {
        Self {
            current_cost: current,
            cost_limit: limit,
            cost_per_hour: per_hour,
            theme,
        }
    }

    /// Render the indicator as a [`Line`].
    ///
    /// Format: `"💲 Cost: $1.23 / $10.00  ($0.45/hr)"`
    pub fn to_line(&self) -> Line<'a> {
        let pct = if self.cost_limit > 0.0 {
            (self.current_cost / self.cost_limit) * 100.0
        } else {
            0.0
        };

        let cost_style = self.theme.cost_style(pct);

        let mut spans = vec![
            Span::styled("💲 Cost: ", self.theme.label),
            Span::styled(
                monitor_core::formatting::format_currency(self.current_cost),
                cost_style,
            ),
            Span::styled(
                format!(
                    " / {}",
                    monitor_core::formatting::format_currency(self.cost_limit)
                ),
                self.theme.dim,
            ),
        ];

        if let Some(rate) = self.cost_per_hour {
            spans.push(Span::styled(
                format!("  ({}/hr)", monitor_core::formatting::format_currency(rate)),
                self.theme.dim,
            ));
        }

        Line::from(spans)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
