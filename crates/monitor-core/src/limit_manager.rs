//! Subscription-plan usage tracking, layered warnings, and P90-derived
//! custom-plan limits.
//!
//! Mirrors the percentage/threshold logic the pricing and plans modules
//! already apply to a single block, but keeps running state across an
//! entire billing cycle so that warnings fire at most once per
//! `(threshold, cycle)` pair and a custom plan's limit can be estimated
//! from historical cycle costs.

use chrono::{DateTime, Duration, Utc};

use crate::models::UsageEntry;
use crate::plans::{PlanConfig, WarningLevel, WarningSeverity};

/// A snapshot of usage totals for the currently open billing cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageTotals {
    pub cost_usd: f64,
    pub tokens: u64,
}

/// An archived, fully-closed billing cycle kept for P90 estimation.
#[derive(Debug, Clone)]
pub struct UsageCycle {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub cost_usd: f64,
    pub tokens: u64,
}

/// Point-in-time view of usage against the active plan, returned by
/// [`LimitManager::check_usage`].
#[derive(Debug, Clone)]
pub struct LimitStatus {
    pub plan_name: String,
    pub cost_limit: f64,
    pub token_limit: u64,
    pub current_cost: f64,
    pub current_tokens: u64,
    /// `current_cost / cost_limit * 100`; `0.0` when `cost_limit` is `0`.
    pub percentage: f64,
    /// Highest warning level whose threshold is `<= percentage`, if any.
    pub warning_level: Option<WarningLevel>,
    pub time_to_reset: Duration,
}

/// Minimum number of historical cycles required before [`LimitManager::
/// calculate_p90_limit`] trusts the sample instead of falling back to the
/// plan's configured default.
pub const MIN_P90_SAMPLES: usize = 3;

/// Tracks accumulated usage against a subscription plan across billing
/// cycles, firing layered warnings and estimating a custom-plan limit.
pub struct LimitManager {
    plan: PlanConfig,
    cycle_start: DateTime<Utc>,
    current: UsageTotals,
    history: Vec<UsageCycle>,
    /// Thresholds (as integer percent) already fired in the current cycle;
    /// cleared on [`LimitManager::reset_usage`].
    fired_this_cycle: Vec<u32>,
}

impl LimitManager {
    /// Start tracking usage for `plan`, with the current cycle beginning now.
    pub fn new(plan: PlanConfig) -> Self {
        Self {
            plan,
            cycle_start: Utc::now(),
            current: UsageTotals::default(),
            history: Vec::new(),
            fired_this_cycle: Vec::new(),
        }
    }

    /// The plan this manager is currently tracking.
    pub fn plan(&self) -> &PlanConfig {
        &self.plan
    }

    /// Replace the tracked plan, e.g. after the user switches subscriptions.
    /// Does not reset accumulated usage.
    pub fn set_plan(&mut self, plan: PlanConfig) {
        self.plan = plan;
    }

    /// Closed, archived billing cycles (most recent last).
    pub fn history(&self) -> &[UsageCycle] {
        &self.history
    }

    /// Fold one entry's cost and tokens into the current cycle and return
    /// the resulting [`LimitStatus`].
    ///
    /// A warning transition is recorded internally the first time its
    /// threshold is crossed in this cycle; repeated calls at the same
    /// percentage do not re-fire it, but [`LimitStatus::warning_level`]
    /// always reports the current highest-applicable level regardless of
    /// whether it already fired (callers distinguish via
    /// [`LimitManager::is_new_warning`]).
    pub fn check_usage(&mut self, entry: &UsageEntry) -> LimitStatus {
        self.current.cost_usd += entry.cost_usd;
        self.current.tokens += entry.total_tokens();
        self.status_now()
    }

    /// Overwrite the current cycle's totals directly, for callers (such as
    /// the orchestrator) that already hold a fully aggregated usage figure
    /// rather than a stream of individual entries to fold one at a time.
    pub fn set_current_usage(&mut self, cost_usd: f64, tokens: u64) -> LimitStatus {
        self.current.cost_usd = cost_usd;
        self.current.tokens = tokens;
        self.status_now()
    }

    /// Compute the current [`LimitStatus`] without folding in a new entry.
    pub fn status_now(&self) -> LimitStatus {
        let percentage = if self.plan.cost_limit > 0.0 {
            (self.current.cost_usd / self.plan.cost_limit) * 100.0
        } else {
            0.0
        };
        let warning_level = highest_applicable(&self.plan.warning_levels, percentage);

        LimitStatus {
            plan_name: self.plan.name.clone(),
            cost_limit: self.plan.cost_limit,
            token_limit: self.plan.token_limit,
            current_cost: self.current.cost_usd,
            current_tokens: self.current.tokens,
            percentage,
            warning_level,
            time_to_reset: self.time_to_reset(),
        }
    }

    /// `true` the first time `status.warning_level`'s threshold is reached
    /// in the current cycle; records it as fired as a side effect.
    pub fn is_new_warning(&mut self, status: &LimitStatus) -> bool {
        let Some(level) = &status.warning_level else {
            return false;
        };
        let threshold = level.threshold_pct.round() as u32;
        if self.fired_this_cycle.contains(&threshold) {
            false
        } else {
            self.fired_this_cycle.push(threshold);
            true
        }
    }

    /// Time remaining until the monthly billing cycle boundary (30 days
    /// from `cycle_start`; never negative).
    pub fn time_to_reset(&self) -> Duration {
        let cycle_end = self.cycle_start + Duration::days(30);
        let remaining = cycle_end - Utc::now();
        if remaining < Duration::zero() {
            Duration::zero()
        } else {
            remaining
        }
    }

    /// Archive the current cycle into history and zero the running totals.
    /// The new cycle starts at the moment of the call.
    pub fn reset_usage(&mut self) {
        let now = Utc::now();
        self.history.push(UsageCycle {
            start: self.cycle_start,
            end: now,
            cost_usd: self.current.cost_usd,
            tokens: self.current.tokens,
        });
        self.cycle_start = now;
        self.current = UsageTotals::default();
        self.fired_this_cycle.clear();
    }

    /// Estimate a custom-plan cost limit as the 90th percentile of
    /// historical per-cycle costs, using the nearest-rank method: the
    /// value at sorted index `ceil(0.9 * n) - 1`.
    ///
    /// Requires at least [`MIN_P90_SAMPLES`] archived cycles; otherwise
    /// returns the plan's current configured `cost_limit` unchanged.
    pub fn calculate_p90_limit(&self) -> f64 {
        if self.history.len() < MIN_P90_SAMPLES {
            return self.plan.cost_limit;
        }
        let mut costs: Vec<f64> = self.history.iter().map(|c| c.cost_usd).collect();
        costs.sort_by(|a, b| a.partial_cmp(b).unwrap());
        nearest_rank_p90(&costs)
    }

    /// Estimate a token limit for the custom plan as
    /// `cost_limit / avg_token_cost`, where `avg_token_cost` is the mean
    /// cost-per-token across archived cycles. Returns the plan's current
    /// `token_limit` if there is no historical data to average.
    pub fn estimate_custom_token_limit(&self, cost_limit: f64) -> u64 {
        let (total_cost, total_tokens): (f64, u64) = self
            .history
            .iter()
            .fold((0.0, 0u64), |(c, t), cycle| (c + cycle.cost_usd, t + cycle.tokens));

        if total_tokens == 0 || total_cost <= 0.0 {
            return self.plan.token_limit;
        }
        let avg_token_cost = total_cost / total_tokens as f64;
        if avg_token_cost <= 0.0 {
            return self.plan.token_limit;
        }
        (cost_limit / avg_token_cost).round() as u64
    }
}

/// Nearest-rank 90th percentile: the value at sorted index
/// `ceil(0.9 * n) - 1`, `n = sorted.len()`. Panics if `sorted` is empty
/// (callers must check length first).
fn nearest_rank_p90(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    let rank = ((0.9 * n as f64).ceil() as usize).saturating_sub(1);
    sorted[rank.min(n - 1)]
}

/// The highest warning level whose threshold is `<= percentage`, or `None`
/// if `percentage` is below every configured threshold.
fn highest_applicable(levels: &[WarningLevel], percentage: f64) -> Option<WarningLevel> {
    levels
        .iter()
        .filter(|lvl| percentage >= lvl.threshold_pct)
        .max_by(|a, b| a.threshold_pct.partial_cmp(&b.threshold_pct).unwrap())
        .cloned()
}

// ── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::{PlanType, Plans};

    fn pro_manager() -> LimitManager {
        LimitManager::new(Plans::get_plan(PlanType::Pro))
    }

    fn entry_with_cost(cost: f64) -> UsageEntry {
        UsageEntry {
            timestamp: Utc::now(),
            input_tokens: 0,
            output_tokens: 0,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            cost_usd: cost,
            model: "claude-3-5-sonnet".to_string(),
            message_id: String::new(),
            request_id: String::new(),
            project: String::new(),
            session_id: String::new(),
        }
    }

    // ── S3: cumulative percentages against a pro plan ($18 limit) ─────────

    #[test]
    fn test_s3_cumulative_percentages() {
        let mut mgr = pro_manager();
        let expected = [13.89, 27.78, 41.67, 55.56];
        for (cost, exp_pct) in [2.5, 5.0, 7.5, 10.0].into_iter().zip(expected) {
            let status = mgr.check_usage(&entry_with_cost(cost));
            assert!(
                (status.percentage - exp_pct).abs() < 0.01,
                "got {} want {}",
                status.percentage,
                exp_pct
            );
            assert!(status.warning_level.is_none());
        }
    }

    // ── S4: crossing the 75% threshold ─────────────────────────────────────

    #[test]
    fn test_s4_75_percent_threshold() {
        let mut mgr = pro_manager();
        let status = mgr.check_usage(&entry_with_cost(13.50));
        assert!((status.percentage - 75.0).abs() < 0.01);
        let level = status.warning_level.expect("warning level expected");
        assert_eq!(level.threshold_pct, 75.0);
        assert!(matches!(level.severity, WarningSeverity::Info));
    }

    // ── S6: P90 over a literal cost history ────────────────────────────────

    #[test]
    fn test_s6_p90_over_history() {
        let mut mgr = LimitManager::new(Plans::get_plan(PlanType::Custom));
        for cost in [15.0, 18.0, 12.0, 20.0, 16.0, 14.0, 19.0, 17.0, 13.0, 21.0] {
            mgr.history.push(UsageCycle {
                start: Utc::now(),
                end: Utc::now(),
                cost_usd: cost,
                tokens: 1_000,
            });
        }
        assert_eq!(mgr.calculate_p90_limit(), 20.0);
    }

    #[test]
    fn test_p90_below_minimum_samples_falls_back_to_plan_limit() {
        let mgr = LimitManager::new(Plans::get_plan(PlanType::Custom));
        assert_eq!(mgr.calculate_p90_limit(), mgr.plan().cost_limit);
    }

    // ── Warning monotonicity (P8) ───────────────────────────────────────────

    #[test]
    fn test_warning_severity_never_decreases_within_a_cycle() {
        let mut mgr = pro_manager();
        let mut last_threshold = -1.0;
        for cost in [2.0, 6.0, 10.0, 13.5, 16.2, 17.1, 18.0] {
            let status = mgr.check_usage(&entry_with_cost(cost));
            if let Some(level) = &status.warning_level {
                assert!(level.threshold_pct >= last_threshold);
                last_threshold = level.threshold_pct;
            }
        }
    }

    #[test]
    fn test_is_new_warning_fires_once_per_cycle() {
        let mut mgr = pro_manager();
        let status = mgr.check_usage(&entry_with_cost(13.5)); // 75%
        assert!(mgr.is_new_warning(&status));
        let status2 = mgr.check_usage(&entry_with_cost(0.01));
        // Still at the 75% tier; should not re-fire.
        assert_eq!(status2.warning_level.as_ref().unwrap().threshold_pct, 75.0);
        assert!(!mgr.is_new_warning(&status2));
    }

    #[test]
    fn test_is_new_warning_fires_again_after_reset() {
        let mut mgr = pro_manager();
        let status = mgr.check_usage(&entry_with_cost(13.5));
        assert!(mgr.is_new_warning(&status));
        mgr.reset_usage();
        let status2 = mgr.check_usage(&entry_with_cost(13.5));
        assert!(mgr.is_new_warning(&status2));
    }

    // ── reset_usage archival ────────────────────────────────────────────────

    #[test]
    fn test_reset_usage_archives_and_zeroes() {
        let mut mgr = pro_manager();
        mgr.check_usage(&entry_with_cost(5.0));
        mgr.reset_usage();
        assert_eq!(mgr.history().len(), 1);
        assert!((mgr.history()[0].cost_usd - 5.0).abs() < 1e-9);
        let status = mgr.status_now();
        assert_eq!(status.current_cost, 0.0);
        assert_eq!(status.percentage, 0.0);
    }

    #[test]
    fn test_zero_cost_limit_plan_has_zero_percentage() {
        let mut mgr = LimitManager::new(Plans::get_plan(PlanType::Free));
        let status = mgr.check_usage(&entry_with_cost(5.0));
        assert_eq!(status.percentage, 0.0);
        assert!(status.warning_level.is_none());
    }

    #[test]
    fn test_estimate_custom_token_limit_uses_historical_average() {
        let mut mgr = LimitManager::new(Plans::get_plan(PlanType::Custom));
        mgr.history.push(UsageCycle {
            start: Utc::now(),
            end: Utc::now(),
            cost_usd: 10.0,
            tokens: 100_000,
        });
        // avg_token_cost = 10.0 / 100_000 = 0.0001; cost_limit 20.0 -> 200_000 tokens.
        assert_eq!(mgr.estimate_custom_token_limit(20.0), 200_000);
    }

    #[test]
    fn test_estimate_custom_token_limit_falls_back_with_no_history() {
        let mgr = LimitManager::new(Plans::get_plan(PlanType::Custom));
        assert_eq!(mgr.estimate_custom_token_limit(20.0), mgr.plan().token_limit);
    }

    #[test]
    fn test_time_to_reset_is_non_negative() {
        let mgr = pro_manager();
        assert!(mgr.time_to_reset() >= Duration::zero());
    }
}
