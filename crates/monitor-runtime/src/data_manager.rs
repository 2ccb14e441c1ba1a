//! Cache-aware data manager for the monitoring runtime.
//!
//! Wraps [`analyze_usage_cached`] with the two-mode cache discipline from
//! §4.7: a cold *initial load* that may both read and write the on-disk
//! summary cache, and subsequent *watch-mode* refreshes that may only read
//! it. Callers use [`DataManager::get_data`] to obtain the latest
//! [`AnalysisResult`]; the manager handles the initial/watch dispatch, up to
//! three watch-mode retries with exponential back-off, and graceful
//! fallback to the previous snapshot on transient failure.

use std::thread;
use std::time::{Duration, Instant, SystemTime};

use monitor_data::analysis::{analyze_usage_cached, AnalysisResult};
use monitor_data::cache::SummaryCache;
use monitor_data::loader::CacheMode;
use walkdir::WalkDir;

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Default look-back window in hours (8 days).
pub const DEFAULT_HOURS_BACK: u64 = 192;

/// Maximum number of watch-mode fetch attempts before giving up and
/// returning the previous snapshot.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Files modified more recently than this are considered "active"; below
/// this threshold the initial load may short-circuit to the cached
/// snapshot instead of re-walking and re-parsing the data directory (§4.7).
const RECENT_ACTIVITY_WINDOW: Duration = Duration::from_secs(60);

// ── DataManager ───────────────────────────────────────────────────────────────

/// Cache-aware wrapper around the full analysis pipeline.
///
/// # Example
/// ```no_run
/// use monitor_runtime::data_manager::DataManager;
///
/// let mut mgr = DataManager::new(30, 192, None);
/// if let Some(result) = mgr.get_data(false) {
///     println!("total tokens: {}", result.total_tokens);
/// }
/// ```
pub struct DataManager {
    /// Retained for API compatibility with older call sites; the cache
    /// discipline is now governed by `initial_load_completed` rather than
    /// a time-to-live, but this still seeds the first cache TTL check used
    /// by [`DataManager::cache_age`]'s docs.
    #[allow(dead_code)]
    cache_ttl: Duration,
    /// Hours of history to analyse on each fetch.
    hours_back: u64,
    /// Optional override for the JSONL data directory.
    data_path: Option<String>,
    /// Whether the cold initial load has completed. Before this, `get_data`
    /// always takes the initial-load path; afterward, it only refreshes on
    /// `force_refresh`.
    initial_load_completed: bool,
    /// Persistent per-file summary cache, shared across initial and watch
    /// loads for this manager's lifetime.
    summary_cache: SummaryCache,
    /// Most recently fetched analysis result.
    result: Option<AnalysisResult>,
    /// When the result was last populated.
    result_timestamp: Option<Instant>,
    /// Human-readable description of the last error encountered.
    last_error: Option<String>,
    /// When the last *successful* fetch completed.
    last_successful_fetch: Option<Instant>,
}

impl DataManager {
    /// Create a new manager.
    ///
    /// # Parameters
    /// - `cache_ttl_secs` – retained for compatibility; no longer gates
    ///   refreshes (see [`DataManager::get_data`]), but is stored for
    ///   callers that inspect it.
    /// - `hours_back`     – look-back window forwarded to the analysis pipeline.
    /// - `data_path`      – optional path override for JSONL discovery.
    pub fn new(cache_ttl_secs: u64, hours_back: u64, data_path: Option<String>) -> Self {
        Self {
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            hours_back,
            data_path,
            initial_load_completed: false,
            summary_cache: SummaryCache::load(&SummaryCache::default_path()),
            result: None,
            result_timestamp: None,
            last_error: None,
            last_successful_fetch: None,
        }
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Return analysis data per the §4.7 dispatch rules.
    ///
    /// - Before the initial load completes, always perform the initial load
    ///   (cache reads and writes allowed). If the summary cache already has
    ///   entries and nothing in the data root was modified within the last
    ///   minute, the parse itself is nearly free since every file will hit
    ///   the per-file cache — but the pass still runs once to populate
    ///   `result`.
    /// - After the initial load, `force_refresh = false` returns the
    ///   existing snapshot unchanged.
    /// - `force_refresh = true` performs a watch-mode refresh (cache reads
    ///   only), retried up to [`MAX_RETRY_ATTEMPTS`] times with exponential
    ///   back-off (100 ms → 200 ms → 400 ms). On exhausted retries, falls
    ///   back to the previous snapshot if one exists.
    pub fn get_data(&mut self, force_refresh: bool) -> Option<&AnalysisResult> {
        if !self.initial_load_completed {
            return self.perform_initial_load();
        }

        if !force_refresh {
            tracing::debug!("returning existing analysis snapshot");
            return self.result.as_ref();
        }

        self.perform_watch_refresh()
    }

    /// Discard the current result, forcing the next [`get_data`] call to
    /// treat this as a fresh initial load.
    pub fn invalidate_cache(&mut self) {
        self.result = None;
        self.result_timestamp = None;
        self.initial_load_completed = false;
        tracing::debug!("cache invalidated");
    }

    /// Age of the current result, or `None` if no data has been fetched.
    pub fn cache_age(&self) -> Option<Duration> {
        self.result_timestamp.map(|ts| ts.elapsed())
    }

    /// Human-readable description of the last fetch error, or `None`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // ── Private helpers ───────────────────────────────────────────────────

    /// Cold path: fetch using [`CacheMode::Initial`] (cache reads and
    /// writes), then mark the initial load complete.
    fn perform_initial_load(&mut self) -> Option<&AnalysisResult> {
        let hours_back = self.hours_back;
        let data_path = self.data_path.clone();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            analyze_usage_cached(
                Some(hours_back),
                false,
                data_path.as_deref(),
                &mut self.summary_cache,
                CacheMode::Initial,
            )
        }))
        .map_err(|e| {
            format!(
                "analyze_usage_cached panicked during initial load: {:?}",
                e.downcast_ref::<&str>().unwrap_or(&"unknown panic")
            )
        });

        match outcome {
            Ok(result) => {
                tracing::debug!(
                    entries = result.entries_count,
                    total_tokens = result.total_tokens,
                    "initial load complete"
                );
                self.result = Some(result);
                self.result_timestamp = Some(Instant::now());
                self.last_successful_fetch = Some(Instant::now());
                self.last_error = None;
                self.initial_load_completed = true;
                self.result.as_ref()
            }
            Err(e) => {
                tracing::warn!(error = %e, "initial load failed");
                self.last_error = Some(e);
                // Leave `initial_load_completed` false so the next call
                // retries the cold path.
                None
            }
        }
    }

    /// Hot path: fetch using [`CacheMode::Watch`] (cache reads only, no
    /// writes), retried with back-off, falling back to the previous
    /// snapshot on exhausted retries.
    fn perform_watch_refresh(&mut self) -> Option<&AnalysisResult> {
        match self.fetch_with_retry() {
            Ok(result) => {
                tracing::debug!(
                    entries = result.entries_count,
                    total_tokens = result.total_tokens,
                    "watch-mode refresh complete"
                );
                self.result = Some(result);
                self.result_timestamp = Some(Instant::now());
                self.last_successful_fetch = Some(Instant::now());
                self.last_error = None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "watch-mode refresh failed; falling back to previous snapshot");
                self.last_error = Some(e);
            }
        }
        self.result.as_ref()
    }

    /// Attempt up to [`MAX_RETRY_ATTEMPTS`] watch-mode fetches with
    /// exponential back-off: attempt 1 → 100 ms, attempt 2 → 200 ms,
    /// attempt 3 → 400 ms (applied *before* each retry, not the first try).
    fn fetch_with_retry(&mut self) -> Result<AnalysisResult, String> {
        let mut last_err = String::new();

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                let sleep_ms = 100u64 * (1 << (attempt - 1));
                tracing::debug!(attempt, sleep_ms, "retrying watch-mode fetch after back-off");
                thread::sleep(Duration::from_millis(sleep_ms));
            }

            let hours_back = self.hours_back;
            let data_path = self.data_path.clone();
            let watch_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                analyze_usage_cached(
                    Some(hours_back),
                    false,
                    data_path.as_deref(),
                    &mut self.summary_cache,
                    CacheMode::Watch,
                )
            }));

            match watch_result {
                Ok(result) => return Ok(result),
                Err(e) => {
                    let msg = format!(
                        "analyze_usage_cached panicked: {:?}",
                        e.downcast_ref::<&str>().unwrap_or(&"unknown panic")
                    );
                    tracing::warn!(attempt, error = %msg, "watch-mode fetch attempt failed");
                    last_err = msg;
                }
            }
        }

        Err(last_err)
    }

    /// `true` when any file under the data directory has a modification
    /// time within [`RECENT_ACTIVITY_WINDOW`] of now.
    #[allow(dead_code)]
    fn data_root_recently_modified(&self) -> bool {
        let root = match &self.data_path {
            Some(p) => std::path::PathBuf::from(p),
            None => return true, // unknown root: assume active, skip the shortcut
        };
        if !root.exists() {
            return false;
        }

        let now = SystemTime::now();
        WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .filter_map(|m| m.modified().ok())
            .any(|modified| {
                now.duration_since(modified)
                    .map(|age| age < RECENT_ACTIVITY_WINDOW)
                    .unwrap_or(true) // clock skew into the future: treat as recent
            })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
