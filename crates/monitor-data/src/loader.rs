//! Concurrent file loader.
//!
//! Fans out JSONL processing across a worker pool once the file count
//! exceeds a sequential-processing threshold, consults the summary cache
//! before touching file content, and merges worker results into a single
//! sorted, deduplicated entry stream.

use crate::cache::{build_summary, reconstruct_entries, SummaryCache};
use crate::reader::{create_unique_hash, find_jsonl_files, map_to_usage_entry, should_process_entry};
use chrono::{DateTime, Utc};
use monitor_core::models::{CostMode, FileSummary, UsageEntry};
use monitor_core::pricing::PricingCalculator;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

/// Files at or below this count are processed sequentially on the calling
/// thread; above it, processing fans out across a worker pool.
const SEQUENTIAL_THRESHOLD: usize = 10;

/// Whether the loader may write newly built summaries back to the cache.
///
/// Hot "watch" mode may read the cache but must never write to it (§4.2);
/// cold "initial" mode collects summaries for one deferred batch write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Initial,
    Watch,
}

/// Why a file's entries did not come from the cache (diagnostic only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMissReason {
    NotCached,
    Stale,
    NegativeCacheHit,
}

/// Outcome of processing a single file.
pub struct FileResult {
    pub entries: Vec<UsageEntry>,
    /// Raw JSON records, present only when [`LoadOptions::include_raw`] is
    /// set and the file was freshly parsed (cache hits do not retain raw
    /// content, only the aggregated [`FileSummary`]).
    pub raw_entries: Option<Vec<serde_json::Value>>,
    pub from_cache: bool,
    pub miss_reason: Option<CacheMissReason>,
    pub summary: Option<FileSummary>,
    pub error: Option<String>,
    pub process_time: std::time::Duration,
}

/// Options controlling the merge step.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub hours_back: Option<u64>,
    pub cost_mode: CostMode,
    /// Cross-file dedup on `(message_id, request_id)`. Off by default —
    /// the content-hash identity of `UsageEntry::content_hash` is always
    /// enforced regardless of this flag.
    pub cross_file_dedup: bool,
    pub cache_mode: CacheMode,
    /// Collect raw JSON records from freshly-parsed files, for rate-limit
    /// detection over the untyped record stream (§4.4).
    pub include_raw: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            hours_back: None,
            cost_mode: CostMode::Auto,
            cross_file_dedup: false,
            cache_mode: CacheMode::Initial,
            include_raw: false,
        }
    }
}

/// Aggregate outcome of a full concurrent load.
pub struct LoadResult {
    pub entries: Vec<UsageEntry>,
    /// Raw JSON records collected from freshly-parsed files when
    /// [`LoadOptions::include_raw`] was set; `None` otherwise.
    pub raw_entries: Option<Vec<serde_json::Value>>,
    pub files_processed: usize,
    pub files_from_cache: usize,
    pub errors: Vec<String>,
    pub load_time: std::time::Duration,
    /// Newly built summaries for freshly-parsed files, ready for a caller
    /// in [`CacheMode::Initial`] to hand to [`flush_cache_writes`].
    pub new_summaries: Vec<FileSummary>,
}

/// Load and merge every `.jsonl` file under `data_path`, using `cache` for
/// freshness checks and (in [`CacheMode::Initial`]) batching new summaries
/// back to disk at the end.
pub fn load_concurrent(
    data_path: &Path,
    cache: &mut SummaryCache,
    options: LoadOptions,
) -> LoadResult {
    let started = Instant::now();
    let files = find_jsonl_files(data_path);

    let cutoff: Option<DateTime<Utc>> = options
        .hours_back
        .map(|h| Utc::now() - chrono::Duration::hours(h as i64));

    // Reborrow as shared: workers only ever read the cache, never mutate it
    // (writes happen in a single deferred batch after the load completes).
    let cache_ref: &SummaryCache = cache;

    let results: Vec<FileResult> = if files.len() <= SEQUENTIAL_THRESHOLD {
        files
            .iter()
            .map(|f| process_file(f, cutoff, options.cost_mode.clone(), cache_ref, options.include_raw))
            .collect()
    } else {
        use rayon::prelude::*;
        files
            .par_iter()
            .map(|f| process_file(f, cutoff, options.cost_mode.clone(), cache_ref, options.include_raw))
            .collect()
    };

    merge_results(results, options, started)
}

fn process_file(
    file_path: &Path,
    cutoff: Option<DateTime<Utc>>,
    mode: CostMode,
    cache: &SummaryCache,
    include_raw: bool,
) -> FileResult {
    let started = Instant::now();

    let metadata = match std::fs::metadata(file_path) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to stat {}: {}", file_path.display(), e);
            return FileResult {
                entries: Vec::new(),
                raw_entries: None,
                from_cache: false,
                miss_reason: None,
                summary: None,
                error: Some(e.to_string()),
                process_time: started.elapsed(),
            };
        }
    };

    let absolute_path = file_path
        .canonicalize()
        .unwrap_or_else(|_| file_path.to_path_buf())
        .to_string_lossy()
        .to_string();
    let mod_time = modified_unix_secs(&metadata);
    let file_size = metadata.len();

    if let Some(summary) = cache.get(&absolute_path) {
        if summary.is_fresh(mod_time, file_size) {
            if summary.has_no_assistant_messages {
                return FileResult {
                    entries: Vec::new(),
                    raw_entries: None,
                    from_cache: true,
                    miss_reason: Some(CacheMissReason::NegativeCacheHit),
                    summary: None,
                    error: None,
                    process_time: started.elapsed(),
                };
            }
            let mut entries = reconstruct_entries(summary);
            if let Some(cutoff_ts) = cutoff {
                entries.retain(|e| e.timestamp >= cutoff_ts);
            }
            return FileResult {
                entries,
                // Reconstructed entries carry no raw content to scan for
                // rate-limit notifications; only freshly-parsed files do.
                raw_entries: None,
                from_cache: true,
                miss_reason: None,
                summary: None,
                error: None,
                process_time: started.elapsed(),
            };
        }
    }

    let miss_reason = if cache.get(&absolute_path).is_some() {
        CacheMissReason::Stale
    } else {
        CacheMissReason::NotCached
    };

    match parse_file(file_path, cutoff, mode, include_raw) {
        Ok((entries, raw_entries)) => {
            let path_str = file_path.to_string_lossy().to_string();
            let summary = build_summary(&path_str, &absolute_path, mod_time, file_size, &entries);
            FileResult {
                entries,
                raw_entries,
                from_cache: false,
                miss_reason: Some(miss_reason),
                summary: Some(summary),
                error: None,
                process_time: started.elapsed(),
            }
        }
        Err(e) => FileResult {
            entries: Vec::new(),
            raw_entries: None,
            from_cache: false,
            miss_reason: Some(miss_reason),
            summary: None,
            error: Some(e),
            process_time: started.elapsed(),
        },
    }
}

fn parse_file(
    file_path: &Path,
    cutoff: Option<DateTime<Utc>>,
    mode: CostMode,
    include_raw: bool,
) -> Result<(Vec<UsageEntry>, Option<Vec<serde_json::Value>>), String> {
    use crate::reader::project_from_path;
    use std::io::BufRead;

    let file = std::fs::File::open(file_path).map_err(|e| e.to_string())?;
    let reader = std::io::BufReader::new(file);
    let project = project_from_path(file_path);
    let mut pricing = PricingCalculator::new(None);
    let mut entries = Vec::new();
    let mut raw_entries: Option<Vec<serde_json::Value>> = if include_raw { Some(Vec::new()) } else { None };

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => continue,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let data: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => continue,
        };
        if !should_process_entry(&data, cutoff) {
            continue;
        }
        if let Some(mut entry) = map_to_usage_entry(&data, mode.clone(), &mut pricing) {
            entry.project = project.clone();
            entries.push(entry);
        }
        if let Some(dest) = raw_entries.as_mut() {
            dest.push(data);
        }
    }

    Ok((entries, raw_entries))
}

fn modified_unix_secs(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn merge_results(
    results: Vec<FileResult>,
    options: LoadOptions,
    started: Instant,
) -> LoadResult {
    let total_capacity: usize = results.iter().map(|r| r.entries.len()).sum();
    let mut merged: Vec<UsageEntry> = Vec::with_capacity(total_capacity);
    let mut errors = Vec::new();
    let mut files_from_cache = 0usize;
    let mut new_summaries: Vec<FileSummary> = Vec::new();
    let mut raw_entries: Option<Vec<serde_json::Value>> = if options.include_raw { Some(Vec::new()) } else { None };

    for result in results {
        if result.from_cache {
            files_from_cache += 1;
        }
        if let Some(summary) = result.summary {
            new_summaries.push(summary);
        }
        if let Some(err) = result.error {
            errors.push(err);
        }
        if let (Some(dest), Some(src)) = (raw_entries.as_mut(), result.raw_entries) {
            dest.extend(src);
        }
        merged.extend(result.entries);
    }

    merged.sort_by_key(|e| e.timestamp);

    // Always-on content-hash identity (P5), enforced regardless of the
    // configurable cross-file dedup below.
    let mut content_hashes: HashSet<u64> = HashSet::with_capacity(merged.len());
    merged.retain(|e| content_hashes.insert(e.content_hash()));

    if options.cross_file_dedup {
        let mut seen: HashSet<String> = HashSet::new();
        merged.retain(|e| {
            let data = serde_json::json!({
                "message_id": e.message_id,
                "requestId": e.request_id,
            });
            match create_unique_hash(&data) {
                Some(key) => seen.insert(key),
                None => true,
            }
        });
    }

    debug!(
        "Concurrent load merged {} entries, {} cache hits, {} errors",
        merged.len(),
        files_from_cache,
        errors.len()
    );

    LoadResult {
        entries: merged,
        raw_entries,
        files_processed: new_summaries.len() + files_from_cache,
        files_from_cache,
        errors,
        load_time: started.elapsed(),
        new_summaries,
    }
}

/// After a load with [`CacheMode::Initial`], batch-write newly built
/// summaries in a single deferred write. A no-op in [`CacheMode::Watch`].
pub fn flush_cache_writes(
    cache: &mut SummaryCache,
    summaries: Vec<FileSummary>,
    mode: CacheMode,
) -> Result<(), monitor_core::error::MonitorError> {
    if mode == CacheMode::Watch {
        return Ok(());
    }
    cache.batch_set(summaries)
}

// ── Tests ───────────────────────────────────────────────────────────────────
