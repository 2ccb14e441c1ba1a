//! Usage aggregation over daily and monthly time windows.

use std::collections::{BTreeMap, HashMap, HashSet};

use monitor_core::models::{normalize_model_name, SessionBlock, UsageEntry};

// ── AggregatedStats ───────────────────────────────────────────────────────────

/// Token and cost totals accumulated across multiple usage entries.
#[derive(Debug, Clone, Default)]
pub struct AggregatedStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub cost: f64,
    pub count: u32,
}

impl AggregatedStats {
    /// Add a single entry's counts to the running totals.
    pub fn add_entry(&mut self, entry: &UsageEntry) {
        self.input_tokens += entry.input_tokens;
        self.output_tokens += entry.output_tokens;
        self.cache_creation_tokens += entry.cache_creation_tokens;
        self.cache_read_tokens += entry.cache_read_tokens;
        self.cost += entry.cost_usd;
        self.count += 1;
    }

    /// Sum of all four token categories.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }
}

// ── AggregatedPeriod ──────────────────────────────────────────────────────────

/// All usage data within one period (one day or one month).
#[derive(Debug, Clone)]
pub struct AggregatedPeriod {
    /// The period key, e.g. `"2024-01-15"` (daily) or `"2024-01"` (monthly).
    pub period_key: String,
    /// Combined stats for the period.
    pub stats: AggregatedStats,
    /// Canonical model names seen in this period.
    pub models_used: HashSet<String>,
    /// Per-model breakdown.
    pub model_breakdowns: HashMap<String, AggregatedStats>,
}

impl AggregatedPeriod {
    fn new(period_key: impl Into<String>) -> Self {
        Self {
            period_key: period_key.into(),
            stats: AggregatedStats::default(),
            models_used: HashSet::new(),
            model_breakdowns: HashMap::new(),
        }
    }

    /// Accumulate `entry` into the period's aggregate.
    fn add_entry(&mut self, entry: &UsageEntry) {
        self.stats.add_entry(entry);

        let model = if entry.model.is_empty() {
            "unknown".to_string()
        } else {
            normalize_model_name(&entry.model)
        };

        self.models_used.insert(model.clone());
        self.model_breakdowns
            .entry(model)
            .or_default()
            .add_entry(entry);
    }
}

// ── UsageAggregator ───────────────────────────────────────────────────────────

/// Stateless helper that groups usage entries by time period.
pub struct UsageAggregator;

impl UsageAggregator {
    /// Aggregate `entries` by calendar day.  Key format: `"%Y-%m-%d"`.
    ///
    /// Returns periods sorted by key (ascending).
    pub fn aggregate_daily(entries: &[UsageEntry]) -> Vec<AggregatedPeriod> {
        Self::aggregate_by_period(entries, |ts| ts.format("%Y-%m-%d").to_string())
    }

    /// Aggregate `entries` by calendar month.  Key format: `"%Y-%m"`.
    ///
    /// Returns periods sorted by key (ascending).
    pub fn aggregate_monthly(entries: &[UsageEntry]) -> Vec<AggregatedPeriod> {
        Self::aggregate_by_period(entries, |ts| ts.format("%Y-%m").to_string())
    }

    /// Aggregate all entries from non-gap session blocks.
    ///
    /// `view_type` must be `"daily"` or `"monthly"`; anything else falls back
    /// to `"daily"`.
    pub fn aggregate_from_blocks(
        blocks: &[SessionBlock],
        view_type: &str,
    ) -> Vec<AggregatedPeriod> {
        let all_entries: Vec<&UsageEntry> = blocks
            .iter()
            .filter(|b| !b.is_gap)
            .flat_map(|b| b.entries.iter())
            .collect();

        // Build owned Vec<UsageEntry> to satisfy the slice signature.
        let owned: Vec<UsageEntry> = all_entries.into_iter().cloned().collect();

        if view_type == "monthly" {
            Self::aggregate_monthly(&owned)
        } else {
            Self::aggregate_daily(&owned)
        }
    }

    /// Sum up the stats from all periods into a single [`AggregatedStats`].
    pub fn calculate_totals(data: &[AggregatedPeriod]) -> AggregatedStats {
        let mut totals = AggregatedStats::default();
        for period in data {
            totals.input_tokens += period.stats.input_tokens;
            totals.output_tokens += period.stats.output_tokens;
            totals.cache_creation_tokens += period.stats.cache_creation_tokens;
            totals.cache_read_tokens += period.stats.cache_read_tokens;
            totals.cost += period.stats.cost;
            totals.count += period.stats.count;
        }
        totals
    }

    // ── Private ───────────────────────────────────────────────────────────────

    /// Generic aggregation driver.
    ///
    /// `key_fn` maps a UTC timestamp to the string period key.
    fn aggregate_by_period(
        entries: &[UsageEntry],
        key_fn: impl Fn(chrono::DateTime<chrono::Utc>) -> String,
    ) -> Vec<AggregatedPeriod> {
        // Use BTreeMap for automatically sorted keys.
        let mut map: BTreeMap<String, AggregatedPeriod> = BTreeMap::new();

        for entry in entries {
            let key = key_fn(entry.timestamp);
            map.entry(key.clone())
                .or_insert_with(|| AggregatedPeriod::new(key))
                .add_entry(entry);
        }

        map.into_values().collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
