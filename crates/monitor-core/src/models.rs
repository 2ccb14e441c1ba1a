use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Determines how usage cost is calculated for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostMode {
    /// Automatically select the most appropriate mode.
    Auto,
    /// Use the cached cost value already stored in the data.
    Cached,
    /// Recalculate cost from token counts and pricing tables.
    #[serde(rename = "calculate")]
    Calculated,
}

/// A single API call record read from a JSONL usage file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEntry {
    /// UTC timestamp when the request was made.
    pub timestamp: DateTime<Utc>,
    /// Number of input (prompt) tokens consumed.
    pub input_tokens: u64,
    /// Number of output (completion) tokens generated.
    pub output_tokens: u64,
    /// Tokens written into the prompt cache.
    #[serde(default)]
    pub cache_creation_tokens: u64,
    /// Tokens read from the prompt cache.
    #[serde(default)]
    pub cache_read_tokens: u64,
    /// Monetary cost in US dollars for this entry.
    #[serde(default)]
    pub cost_usd: f64,
    /// Raw model identifier string from the API response.
    #[serde(default)]
    pub model: String,
    /// Unique message identifier.
    #[serde(default)]
    pub message_id: String,
    /// Unique request identifier.
    #[serde(default)]
    pub request_id: String,
    /// Project name derived from the containing directory of the source file.
    #[serde(default)]
    pub project: String,
    /// Session identifier, correlating entries from the same assistant run.
    #[serde(default)]
    pub session_id: String,
}

impl UsageEntry {
    /// Sum of all four token categories (the `total_tokens` invariant).
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }

    /// Content hash identity used for deduplication: two entries with the
    /// same `(timestamp, model, four token counts)` are the same event
    /// regardless of source file, independent of `message_id`/`request_id`.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.timestamp.timestamp_nanos_opt().unwrap_or(0).hash(&mut hasher);
        self.model.hash(&mut hasher);
        self.input_tokens.hash(&mut hasher);
        self.output_tokens.hash(&mut hasher);
        self.cache_creation_tokens.hash(&mut hasher);
        self.cache_read_tokens.hash(&mut hasher);
        hasher.finish()
    }
}

/// Aggregated token counts across multiple usage entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenCounts {
    /// Accumulated input (prompt) tokens.
    #[serde(default)]
    pub input_tokens: u64,
    /// Accumulated output (completion) tokens.
    #[serde(default)]
    pub output_tokens: u64,
    /// Accumulated cache-creation tokens.
    #[serde(default)]
    pub cache_creation_tokens: u64,
    /// Accumulated cache-read tokens.
    #[serde(default)]
    pub cache_read_tokens: u64,
}

impl TokenCounts {
    /// Sum of all four token categories.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_creation_tokens + self.cache_read_tokens
    }
}

/// Instantaneous token consumption and cost burn rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnRate {
    /// Tokens consumed per minute.
    pub tokens_per_minute: f64,
    /// US dollar cost per hour.
    pub cost_per_hour: f64,
}

/// Forward projection of how many tokens / dollars a session will consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageProjection {
    /// Estimated total tokens by the end of the session.
    pub projected_total_tokens: u64,
    /// Estimated total cost (USD) by the end of the session.
    pub projected_total_cost: f64,
    /// Minutes remaining before the session window closes.
    pub remaining_minutes: f64,
}

/// Three-tier classification of how a session is tracking against its plan
/// limit, keyed on cost percentage with an overshoot override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// A single model's share of a session's token usage and cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDistributionEntry {
    pub token_count: u64,
    pub cost_usd: f64,
    /// Share of the session's total tokens, `0..100`.
    pub percentage: f64,
    /// Timestamp of the most recent entry seen for this model.
    pub last_used: DateTime<Utc>,
}

/// Immutable real-time metrics snapshot for the active session block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeMetrics {
    pub session_start: DateTime<Utc>,
    /// Minutes remaining before the session window closes (never negative).
    pub time_remaining_minutes: f64,
    /// Elapsed fraction of the 5-hour window, `0..100`.
    pub session_progress: f64,
    pub current_tokens: u64,
    pub current_cost: f64,
    pub tokens_per_minute: f64,
    pub cost_per_hour: f64,
    pub burn_rate: Option<BurnRate>,
    pub projected_tokens: u64,
    pub projected_cost: f64,
    pub predicted_end_time: Option<DateTime<Utc>>,
    /// Deterministic confidence score, `0..100`.
    pub confidence_level: f64,
    pub health_status: HealthStatus,
    /// Per-model breakdown, keyed by canonical model name.
    pub model_distribution: HashMap<String, ModelDistributionEntry>,
    pub last_updated: DateTime<Utc>,
    /// Wall-clock time this snapshot was computed.
    pub calculation_time: DateTime<Utc>,
}

/// Per-model breakdown of token usage within a session block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelStats {
    /// Input tokens attributed to this model.
    pub input_tokens: u64,
    /// Output tokens attributed to this model.
    pub output_tokens: u64,
    /// Cache-creation tokens attributed to this model.
    pub cache_creation_tokens: u64,
    /// Cache-read tokens attributed to this model.
    pub cache_read_tokens: u64,
    /// Cost in USD attributed to this model.
    pub cost_usd: f64,
    /// Number of individual usage entries for this model.
    pub entries_count: u32,
}

/// A structured representation of a rate-limit notification embedded in the data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitMessage {
    /// Category of the limit that was hit (e.g. "token", "message").
    pub limit_type: String,
    /// ISO-8601 timestamp string when the limit was encountered.
    pub timestamp: String,
    /// Human-readable content of the limit notification.
    pub content: String,
    /// ISO-8601 timestamp string when the limit will be lifted, if known.
    pub reset_time: Option<String>,
}

/// Per-model token/cost roll-up kept inside a time bucket of a [`FileSummary`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketModelStats {
    pub entry_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub cost_usd: f64,
}

/// One hourly or daily aggregation bucket inside a [`FileSummary`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeBucket {
    pub entry_count: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Per-model roll-up within this bucket, keyed by canonical model name.
    pub model_stats: HashMap<String, BucketModelStats>,
}

/// Content-addressed per-file cache record (see the Summary Cache).
///
/// Keyed by `absolute_path` in the on-disk store; validated for freshness by
/// `(mod_time, file_size)` before ever being trusted over re-parsing the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub path: String,
    pub absolute_path: String,
    /// Unix-epoch seconds of the file's last modification, at cache time.
    pub mod_time: i64,
    pub file_size: u64,
    /// Stable over `(mod_time, file_size, path)`; does not require reading
    /// file content.
    pub checksum: String,
    pub entry_count: u64,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub model_stats: HashMap<String, BucketModelStats>,
    /// Keyed `"YYYY-MM-DD HH"`.
    pub hourly_buckets: HashMap<String, TimeBucket>,
    /// Keyed `"YYYY-MM-DD"`.
    pub daily_buckets: HashMap<String, TimeBucket>,
    /// Negative-cache marker: the file was scanned and contained no
    /// assistant-typed messages, so it should not be rescanned.
    #[serde(default)]
    pub has_no_assistant_messages: bool,
}

impl FileSummary {
    /// Compute the stable freshness checksum from `(mod_time, file_size, path)`.
    pub fn compute_checksum(path: &str, mod_time: i64, file_size: u64) -> String {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        mod_time.hash(&mut hasher);
        file_size.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// `true` when `(mod_time, file_size)` still matches this summary.
    pub fn is_fresh(&self, mod_time: i64, file_size: u64) -> bool {
        self.mod_time == mod_time && self.file_size == file_size
    }
}

/// A 5-hour usage window aggregating all API calls within that period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBlock {
    /// Unique identifier for this block.
    pub id: String,
    /// Inclusive start of the 5-hour window (UTC).
    pub start_time: DateTime<Utc>,
    /// Exclusive end of the 5-hour window (UTC).
    pub end_time: DateTime<Utc>,
    /// Individual usage records that fall within this window.
    #[serde(default)]
    pub entries: Vec<UsageEntry>,
    /// Aggregated token counts for the block.
    #[serde(default)]
    pub token_counts: TokenCounts,
    /// Whether this block is currently open / in-progress.
    #[serde(default)]
    pub is_active: bool,
    /// Whether this block represents a gap with no activity.
    #[serde(default)]
    pub is_gap: bool,
    /// Current burn rate, if the block is active.
    #[serde(default)]
    pub burn_rate: Option<BurnRate>,
    /// Timestamp of the last entry in the block (may differ from `end_time`).
    #[serde(default)]
    pub actual_end_time: Option<DateTime<Utc>>,
    /// Token and cost statistics broken down by model name.
    #[serde(default)]
    pub per_model_stats: HashMap<String, ModelStats>,
    /// Ordered list of model names seen in this block.
    #[serde(default)]
    pub models: Vec<String>,
    /// Number of user-initiated messages in this block.
    #[serde(default)]
    pub sent_messages_count: u32,
    /// Total monetary cost in USD for this block.
    #[serde(default)]
    pub cost_usd: f64,
    /// Structured limit-hit notifications embedded in the block.
    #[serde(default)]
    pub limit_messages: Vec<LimitMessage>,
    /// Opaque projection data, serialised for downstream consumers.
    #[serde(default)]
    pub projection_data: Option<serde_json::Value>,
    /// Snapshot of the burn rate captured at block close time.
    #[serde(default)]
    pub burn_rate_snapshot: Option<BurnRate>,
}

impl SessionBlock {
    /// Delegates to `token_counts.total_tokens()`.
    pub fn total_tokens(&self) -> u64 {
        self.token_counts.total_tokens()
    }

    /// Alias for `cost_usd`.
    pub fn total_cost(&self) -> f64 {
        self.cost_usd
    }

    /// Duration of the block in minutes, minimum 1.0.
    ///
    /// Uses `actual_end_time` when present (the timestamp of the last real
    /// entry), otherwise falls back to the nominal `end_time`.
    pub fn duration_minutes(&self) -> f64 {
        let end = self.actual_end_time.unwrap_or(self.end_time);
        let secs = (end - self.start_time).num_seconds() as f64;
        f64::max(secs / 60.0, 1.0)
    }
}

/// Normalise a raw model name string into a canonical key.
///
/// * Claude 4 variants (any name containing `claude-*-4-` or `*-4-`) are
///   returned lowercased without further transformation.
/// * `opus` → `"claude-3-opus"` (unless a Claude 4 prefix is present).
/// * `sonnet` with `3.5`/`3-5` → `"claude-3-5-sonnet"`, otherwise
///   `"claude-3-sonnet"`.
/// * `haiku` with `3.5`/`3-5` → `"claude-3-5-haiku"`, otherwise
///   `"claude-3-haiku"`.
/// * Everything else is returned unchanged (original casing).
/// * Empty string → `""`.
///
/// # Examples
///
/// ```
/// use monitor_core::models::normalize_model_name;
///
/// assert_eq!(normalize_model_name("claude-3-opus-20240229"), "claude-3-opus");
/// assert_eq!(normalize_model_name("Claude 3.5 Sonnet"), "claude-3-5-sonnet");
/// assert_eq!(normalize_model_name("claude-sonnet-4-20250514"), "claude-sonnet-4-20250514");
/// ```
pub fn normalize_model_name(model: &str) -> String {
    if model.is_empty() {
        return String::new();
    }

    let lower = model.to_lowercase();

    // Claude 4 fast-path: any variant whose lowercased form already contains
    // one of the Claude-4 sub-strings is returned as-is (lowercased).
    if lower.contains("claude-opus-4-")
        || lower.contains("claude-sonnet-4-")
        || lower.contains("claude-haiku-4-")
        || lower.contains("sonnet-4-")
        || lower.contains("opus-4-")
        || lower.contains("haiku-4-")
    {
        return lower;
    }

    if lower.contains("opus") {
        // A second Claude-4 guard for names like "opus-4-..." without the "claude-" prefix
        if lower.contains("4-") {
            return lower;
        }
        return "claude-3-opus".to_string();
    }

    if lower.contains("sonnet") {
        if lower.contains("4-") {
            return lower;
        }
        if lower.contains("3.5") || lower.contains("3-5") {
            return "claude-3-5-sonnet".to_string();
        }
        return "claude-3-sonnet".to_string();
    }

    if lower.contains("haiku") {
        if lower.contains("3.5") || lower.contains("3-5") {
            return "claude-3-5-haiku".to_string();
        }
        return "claude-3-haiku".to_string();
    }

    // Unknown model – return original string unchanged.
    model.to_string()
}
