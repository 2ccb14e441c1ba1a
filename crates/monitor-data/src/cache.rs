//! Content-addressed per-file summary cache.
//!
//! Stores a [`FileSummary`] per absolute source path, keyed on the path
//! itself and validated for freshness by `(mod_time, file_size)` before it
//! is ever trusted over re-parsing the file. Persisted as a single JSON
//! document, rewritten atomically (temp file + rename) on every
//! [`SummaryCache::batch_set`], mirroring the pattern `LastUsedParams` uses
//! for its own persisted state.

use monitor_core::error::MonitorError;
use monitor_core::models::{BucketModelStats, FileSummary, TimeBucket, UsageEntry};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// In-memory view of the on-disk summary store, backed by a single JSON file.
#[derive(Debug, Default)]
pub struct SummaryCache {
    entries: HashMap<String, FileSummary>,
    store_path: Option<PathBuf>,
}

impl SummaryCache {
    /// An empty cache with no backing file; never persists.
    pub fn in_memory() -> Self {
        Self {
            entries: HashMap::new(),
            store_path: None,
        }
    }

    /// Load the cache from `path`. A missing or corrupt file yields an empty
    /// cache rather than an error — summary caching degrades to reprocessing.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Corrupt summary cache at {}: {}", path.display(), e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };

        Self {
            entries,
            store_path: Some(path.to_path_buf()),
        }
    }

    /// Default on-disk location: `~/.claude-monitor/cache/summaries.json`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".claude-monitor")
            .join("cache")
            .join("summaries.json")
    }

    /// `true` if a fresh summary exists for `absolute_path` given its current
    /// `(mod_time, file_size)`.
    pub fn has(&self, absolute_path: &str, mod_time: i64, file_size: u64) -> bool {
        self.entries
            .get(absolute_path)
            .is_some_and(|s| s.is_fresh(mod_time, file_size))
    }

    /// Return the cached summary for `absolute_path`, regardless of
    /// freshness — callers are expected to check [`Self::has`] first.
    pub fn get(&self, absolute_path: &str) -> Option<&FileSummary> {
        self.entries.get(absolute_path)
    }

    /// Insert or replace a single summary without touching disk.
    pub fn set(&mut self, summary: FileSummary) {
        self.entries.insert(summary.absolute_path.clone(), summary);
    }

    /// Drop the cached entry for `absolute_path`, forcing reprocessing.
    pub fn invalidate(&mut self, absolute_path: &str) {
        self.entries.remove(absolute_path);
    }

    /// Merge `summaries` into the in-memory map and persist in one write.
    /// A no-op on disk when this cache has no backing path (e.g. hot "watch"
    /// mode, which must only read).
    pub fn batch_set(&mut self, summaries: Vec<FileSummary>) -> Result<(), MonitorError> {
        for summary in summaries {
            self.entries.insert(summary.absolute_path.clone(), summary);
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), MonitorError> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MonitorError::Cache {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        }

        let json = serde_json::to_string(&self.entries).map_err(|e| MonitorError::Cache {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| MonitorError::Cache {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::rename(&tmp, path).map_err(|e| MonitorError::Cache {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        debug!("Summary cache persisted: {} entries", self.entries.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Summary construction ────────────────────────────────────────────────────

/// Build a [`FileSummary`] (or a negative summary) from a single file's
/// parsed entries.
pub fn build_summary(
    path: &str,
    absolute_path: &str,
    mod_time: i64,
    file_size: u64,
    entries: &[UsageEntry],
) -> FileSummary {
    let checksum = FileSummary::compute_checksum(absolute_path, mod_time, file_size);

    if entries.is_empty() {
        return FileSummary {
            path: path.to_string(),
            absolute_path: absolute_path.to_string(),
            mod_time,
            file_size,
            checksum,
            entry_count: 0,
            total_cost: 0.0,
            total_tokens: 0,
            model_stats: HashMap::new(),
            hourly_buckets: HashMap::new(),
            daily_buckets: HashMap::new(),
            has_no_assistant_messages: true,
        };
    }

    let mut model_stats: HashMap<String, BucketModelStats> = HashMap::new();
    let mut hourly_buckets: HashMap<String, TimeBucket> = HashMap::new();
    let mut daily_buckets: HashMap<String, TimeBucket> = HashMap::new();
    let mut total_cost = 0.0f64;
    let mut total_tokens = 0u64;

    for entry in entries {
        total_cost += entry.cost_usd;
        total_tokens += entry.total_tokens();

        let model_key = monitor_core::models::normalize_model_name(&entry.model);
        update_model_stats(model_stats.entry(model_key.clone()).or_default(), entry);

        let hour_key = entry.timestamp.format("%Y-%m-%d %H").to_string();
        update_bucket(hourly_buckets.entry(hour_key).or_default(), &model_key, entry);

        let day_key = entry.timestamp.format("%Y-%m-%d").to_string();
        update_bucket(daily_buckets.entry(day_key).or_default(), &model_key, entry);
    }

    FileSummary {
        path: path.to_string(),
        absolute_path: absolute_path.to_string(),
        mod_time,
        file_size,
        checksum,
        entry_count: entries.len() as u64,
        total_cost,
        total_tokens,
        model_stats,
        hourly_buckets,
        daily_buckets,
        has_no_assistant_messages: false,
    }
}

fn update_model_stats(stats: &mut BucketModelStats, entry: &UsageEntry) {
    stats.entry_count += 1;
    stats.input_tokens += entry.input_tokens;
    stats.output_tokens += entry.output_tokens;
    stats.cache_creation_tokens += entry.cache_creation_tokens;
    stats.cache_read_tokens += entry.cache_read_tokens;
    stats.cost_usd += entry.cost_usd;
}

fn update_bucket(bucket: &mut TimeBucket, model_key: &str, entry: &UsageEntry) {
    bucket.entry_count += 1;
    bucket.total_tokens += entry.total_tokens();
    bucket.total_cost += entry.cost_usd;
    update_model_stats(
        bucket.model_stats.entry(model_key.to_string()).or_default(),
        entry,
    );
}

// ── Summary reconstruction ──────────────────────────────────────────────────

/// Reconstruct synthetic [`UsageEntry`] records from a cached [`FileSummary`]
/// without ever having stored individual entries.
///
/// Prefers hourly buckets, falls back to daily, falls back to a single
/// aggregated entry per model if neither bucket map is present.
pub fn reconstruct_entries(summary: &FileSummary) -> Vec<UsageEntry> {
    if !summary.hourly_buckets.is_empty() {
        return reconstruct_from_buckets(&summary.hourly_buckets, "%Y-%m-%d %H", chrono::Duration::minutes(1));
    }
    if !summary.daily_buckets.is_empty() {
        return reconstruct_from_buckets(&summary.daily_buckets, "%Y-%m-%d", chrono::Duration::hours(1));
    }
    reconstruct_from_totals(summary)
}

fn reconstruct_from_buckets(
    buckets: &HashMap<String, TimeBucket>,
    key_format: &str,
    delta: chrono::Duration,
) -> Vec<UsageEntry> {
    let mut out = Vec::new();

    let mut keys: Vec<&String> = buckets.keys().collect();
    keys.sort();

    for key in keys {
        let bucket = &buckets[key];
        let start = parse_bucket_start(key, key_format);

        for (model, stats) in &bucket.model_stats {
            out.extend(synthesize_model_entries(model, stats, start, delta));
        }
    }

    out
}

fn parse_bucket_start(key: &str, key_format: &str) -> chrono::DateTime<chrono::Utc> {
    use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};

    if key_format == "%Y-%m-%d %H" {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&format!("{}:00:00", key), "%Y-%m-%d %H:%M:%S") {
            return Utc.from_utc_datetime(&naive);
        }
    } else if let Ok(date) = NaiveDate::parse_from_str(key, "%Y-%m-%d") {
        return Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap());
    }

    Utc::now()
}

fn synthesize_model_entries(
    model: &str,
    stats: &BucketModelStats,
    bucket_start: chrono::DateTime<chrono::Utc>,
    delta: chrono::Duration,
) -> Vec<UsageEntry> {
    let count = stats.entry_count;
    if count == 0 {
        return Vec::new();
    }

    let input_shares = distribute(stats.input_tokens, count);
    let output_shares = distribute(stats.output_tokens, count);
    let cache_creation_shares = distribute(stats.cache_creation_tokens, count);
    let cache_read_shares = distribute(stats.cache_read_tokens, count);
    let cost_share = stats.cost_usd / count as f64;

    (0..count)
        .map(|i| UsageEntry {
            timestamp: bucket_start + delta * i as i32,
            input_tokens: input_shares[i as usize],
            output_tokens: output_shares[i as usize],
            cache_creation_tokens: cache_creation_shares[i as usize],
            cache_read_tokens: cache_read_shares[i as usize],
            cost_usd: cost_share,
            model: model.to_string(),
            message_id: String::new(),
            request_id: String::new(),
            project: String::new(),
            session_id: String::new(),
        })
        .collect()
}

/// Split `total` into `count` shares of `⌊total/count⌋`, with the first
/// `total mod count` shares receiving +1 so the sum is exact.
fn distribute(total: u64, count: u64) -> Vec<u64> {
    let base = total / count;
    let remainder = (total % count) as usize;
    (0..count)
        .map(|i| if (i as usize) < remainder { base + 1 } else { base })
        .collect()
}

fn reconstruct_from_totals(summary: &FileSummary) -> Vec<UsageEntry> {
    let now = chrono::Utc::now();
    summary
        .model_stats
        .iter()
        .filter(|(_, stats)| stats.entry_count > 0)
        .map(|(model, stats)| UsageEntry {
            timestamp: now,
            input_tokens: stats.input_tokens,
            output_tokens: stats.output_tokens,
            cache_creation_tokens: stats.cache_creation_tokens,
            cache_read_tokens: stats.cache_read_tokens,
            cost_usd: stats.cost_usd,
            model: model.clone(),
            message_id: String::new(),
            request_id: String::new(),
            project: String::new(),
            session_id: String::new(),
        })
        .collect()
}

// ── Tests ───────────────────────────────────────────────────────────────────
