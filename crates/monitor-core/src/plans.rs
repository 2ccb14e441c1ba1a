use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Available Claude subscription plan types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    /// No active subscription; cost limit is zero.
    Free,
    /// Claude Pro plan (~$20/month).
    Pro,
    /// Claude Max plan at the $50/month tier (formerly "Max 5x").
    Max5,
    /// Claude Max plan at the $200/month tier (formerly "Max 20x").
    Max20,
    /// User-defined custom plan (limits computed at runtime).
    Custom,
}

impl FromStr for PlanType {
    type Err = MonitorError;

    /// Case-insensitive construction from a string slice.
    ///
    /// Accepts `"free"`, `"pro"`, `"max5"`, `"max20"`, and `"custom"`
    /// (case-insensitive). Returns [`MonitorError::InvalidPlan`] for
    /// unrecognised strings.
    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "free" => Ok(PlanType::Free),
            "pro" => Ok(PlanType::Pro),
            "max5" => Ok(PlanType::Max5),
            "max20" => Ok(PlanType::Max20),
            "custom" => Ok(PlanType::Custom),
            other => Err(MonitorError::InvalidPlan(other.to_string())),
        }
    }
}

impl PlanType {
    /// The canonical lowercase string identifier for this plan.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Free => "free",
            PlanType::Pro => "pro",
            PlanType::Max5 => "max5",
            PlanType::Max20 => "max20",
            PlanType::Custom => "custom",
        }
    }
}

/// Severity of a usage warning level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Info,
    Warn,
    Error,
    Critical,
}

/// A single usage threshold (percentage of the plan's cost limit) and the
/// action to take when crossed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningLevel {
    /// Percentage of the plan's cost limit (e.g. `75.0`).
    pub threshold_pct: f64,
    pub severity: WarningSeverity,
    pub message: String,
}

/// The standard four-tier warning ladder: 75% info, 90% warn, 95% error,
/// 100% critical.
pub fn default_warning_levels() -> Vec<WarningLevel> {
    vec![
        WarningLevel {
            threshold_pct: 75.0,
            severity: WarningSeverity::Info,
            message: "75% of plan limit reached".to_string(),
        },
        WarningLevel {
            threshold_pct: 90.0,
            severity: WarningSeverity::Warn,
            message: "90% of plan limit reached".to_string(),
        },
        WarningLevel {
            threshold_pct: 95.0,
            severity: WarningSeverity::Error,
            message: "95% of plan limit reached".to_string(),
        },
        WarningLevel {
            threshold_pct: 100.0,
            severity: WarningSeverity::Critical,
            message: "Plan limit reached".to_string(),
        },
    ]
}

/// Immutable configuration record for a single Claude subscription plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Canonical lowercase name that matches [`PlanType::as_str`].
    pub name: String,
    /// Maximum number of tokens per 5-hour session window.
    pub token_limit: u64,
    /// Maximum monetary cost (USD) per 5-hour session window.
    pub cost_limit: f64,
    /// Maximum number of user messages per 5-hour session window.
    pub message_limit: u32,
    /// Human-readable plan name for display purposes.
    pub display_name: String,
    /// Layered usage warning thresholds for this plan (75/90/95/100%).
    #[serde(default = "default_warning_levels")]
    pub warning_levels: Vec<WarningLevel>,
}

impl PlanConfig {
    /// Compact human-readable token limit string (e.g. `"19k"`, `"220k"`).
    pub fn formatted_token_limit(&self) -> String {
        if self.token_limit >= 1_000 {
            format!("{}k", self.token_limit / 1_000)
        } else {
            self.token_limit.to_string()
        }
    }
}

// ── Shared constants ──────────────────────────────────────────────────────────

/// Fallback token limit used when no plan is recognised (mirrors Pro limit).
pub const DEFAULT_TOKEN_LIMIT: u64 = 19_000;

/// Fallback cost limit used when no plan is recognised (mirrors Custom limit).
pub const DEFAULT_COST_LIMIT: f64 = 50.0;

/// Fallback message limit used when no plan is recognised (mirrors Pro limit).
pub const DEFAULT_MESSAGE_LIMIT: u32 = 250;

/// Well-known token limits, in ascending order, used for auto-detection.
pub const COMMON_TOKEN_LIMITS: &[u64] = &[19_000, 88_000, 220_000, 880_000];

/// Fraction of a limit at which the monitor considers it "reached".
pub const LIMIT_DETECTION_THRESHOLD: f64 = 0.95;

// ── Plan data ─────────────────────────────────────────────────────────────────

fn plan_configs() -> HashMap<PlanType, PlanConfig> {
    let mut map = HashMap::new();
    map.insert(
        PlanType::Free,
        PlanConfig {
            name: "free".to_string(),
            token_limit: 0,
            cost_limit: 0.0,
            message_limit: 0,
            display_name: "Free".to_string(),
            warning_levels: default_warning_levels(),
        },
    );
    map.insert(
        PlanType::Pro,
        PlanConfig {
            name: "pro".to_string(),
            token_limit: 19_000,
            cost_limit: 18.0,
            message_limit: 250,
            display_name: "Pro".to_string(),
            warning_levels: default_warning_levels(),
        },
    );
    map.insert(
        PlanType::Max5,
        PlanConfig {
            name: "max5".to_string(),
            token_limit: 88_000,
            cost_limit: 35.0,
            message_limit: 1_000,
            display_name: "Max5".to_string(),
            warning_levels: default_warning_levels(),
        },
    );
    map.insert(
        PlanType::Max20,
        PlanConfig {
            name: "max20".to_string(),
            token_limit: 220_000,
            cost_limit: 140.0,
            message_limit: 2_000,
            display_name: "Max20".to_string(),
            warning_levels: default_warning_levels(),
        },
    );
    map.insert(
        PlanType::Custom,
        PlanConfig {
            name: "custom".to_string(),
            token_limit: 44_000,
            cost_limit: 50.0,
            message_limit: 250,
            display_name: "Custom".to_string(),
            warning_levels: default_warning_levels(),
        },
    );
    map
}

/// Registry of all plan configurations with static helper methods.
pub struct Plans;

impl Plans {
    /// The default token limit (Pro plan value).
    pub const DEFAULT_TOKEN_LIMIT: u64 = DEFAULT_TOKEN_LIMIT;
    /// The default cost limit (Custom plan value).
    pub const DEFAULT_COST_LIMIT: f64 = DEFAULT_COST_LIMIT;
    /// The default message limit (Pro plan value).
    pub const DEFAULT_MESSAGE_LIMIT: u32 = DEFAULT_MESSAGE_LIMIT;
    /// Well-known token limit steps for limit auto-detection.
    pub const COMMON_TOKEN_LIMITS: &'static [u64] = COMMON_TOKEN_LIMITS;
    /// Fraction of limit at which a session is considered "at limit".
    pub const LIMIT_DETECTION_THRESHOLD: f64 = LIMIT_DETECTION_THRESHOLD;

    /// Return all plan configurations keyed by [`PlanType`].
    pub fn all_plans() -> HashMap<PlanType, PlanConfig> {
        plan_configs()
    }

    /// Return the configuration for a specific [`PlanType`].
    pub fn get_plan(plan_type: PlanType) -> PlanConfig {
        plan_configs()
            .remove(&plan_type)
            .expect("all PlanType variants are present in plan_configs")
    }

    /// Return the configuration for a plan identified by its string name.
    ///
    /// Returns `None` if the name is not recognised.
    pub fn get_plan_by_name(name: &str) -> Option<PlanConfig> {
        let pt = name.parse::<PlanType>().ok()?;
        Some(Self::get_plan(pt))
    }

    /// Token limit for the named plan, or [`DEFAULT_TOKEN_LIMIT`] if unknown.
    pub fn get_token_limit(plan: &str) -> u64 {
        Self::get_plan_by_name(plan)
            .map(|c| c.token_limit)
            .unwrap_or(DEFAULT_TOKEN_LIMIT)
    }

    /// Cost limit for the named plan, or [`DEFAULT_COST_LIMIT`] if unknown.
    pub fn get_cost_limit(plan: &str) -> f64 {
        Self::get_plan_by_name(plan)
            .map(|c| c.cost_limit)
            .unwrap_or(DEFAULT_COST_LIMIT)
    }

    /// Message limit for the named plan, or [`DEFAULT_MESSAGE_LIMIT`] if unknown.
    pub fn get_message_limit(plan: &str) -> u32 {
        Self::get_plan_by_name(plan)
            .map(|c| c.message_limit)
            .unwrap_or(DEFAULT_MESSAGE_LIMIT)
    }

    /// Returns `true` if `plan` is a recognised plan name.
    pub fn is_valid_plan(plan: &str) -> bool {
        Self::get_plan_by_name(plan).is_some()
    }
}

// ── Module-level free functions ─────────────────────────────────────────────

/// Token limit for the named plan, or [`DEFAULT_TOKEN_LIMIT`] if unknown.
///
/// Wraps [`Plans::get_token_limit`] as a free function for ergonomic use.
pub fn get_token_limit(plan: &str) -> u64 {
    Plans::get_token_limit(plan)
}

/// Cost limit for the named plan, or [`DEFAULT_COST_LIMIT`] if unknown.
///
/// Wraps [`Plans::get_cost_limit`] as a free function for ergonomic use.
pub fn get_cost_limit(plan: &str) -> f64 {
    Plans::get_cost_limit(plan)
}
