//! Main analysis pipeline for Claude Monitor.
//!
//! Orchestrates loading, block-creation, burn-rate computation and limit
//! detection, returning an [`AnalysisResult`] ready for the UI layer.

use chrono::Utc;
use monitor_core::calculations::BurnRateCalculator;
use monitor_core::models::{CostMode, LimitMessage, SessionBlock};

use crate::analyzer::{LimitDetection, SessionAnalyzer};
use crate::cache::SummaryCache;
use crate::loader::{flush_cache_writes, load_concurrent, CacheMode, LoadOptions};
use crate::reader::resolve_data_path;

// ── Public types ──────────────────────────────────────────────────────────────

/// Metadata produced alongside the analysis result.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AnalysisMetadata {
    /// ISO-8601 timestamp when this result was generated.
    pub generated_at: String,
    /// Number of hours analysed, or `None` if all history was loaded.
    pub hours_analyzed: Option<u64>,
    /// Total number of [`UsageEntry`] records processed.
    pub entries_processed: usize,
    /// Number of [`SessionBlock`]s created.
    pub blocks_created: usize,
    /// Number of rate-limit notifications detected.
    pub limits_detected: usize,
    /// Wall-clock seconds spent loading the JSONL files.
    pub load_time_seconds: f64,
    /// Wall-clock seconds spent building session blocks.
    pub transform_time_seconds: f64,
    /// Whether any entries in this run were served from the summary cache
    /// rather than freshly parsed.
    pub cache_used: bool,
    /// Whether this run applied the quick-start 24h cutoff.
    pub quick_start: bool,
}

/// The complete output of [`analyze_usage`].
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    /// Session blocks (may include gap blocks).
    pub blocks: Vec<SessionBlock>,
    /// Metadata about this analysis run.
    pub metadata: AnalysisMetadata,
    /// Total number of usage entries loaded.
    pub entries_count: usize,
    /// Sum of all token counts across all blocks.
    pub total_tokens: u64,
    /// Sum of all costs (USD) across all blocks.
    pub total_cost: f64,
}

// ── Public function ───────────────────────────────────────────────────────────

/// Run the full analysis pipeline.
///
/// 1. Load usage entries (and raw JSONL) from `data_path`.
/// 2. Build 5-hour session blocks via [`SessionAnalyzer`].
/// 3. Compute burn rates for active blocks.
/// 4. Detect limits and attach them to the matching blocks.
/// 5. Return an [`AnalysisResult`].
///
/// When `quick_start` is `true` and `hours_back` is `None`, the analysis is
/// limited to the last 24 hours for a faster startup experience.
///
/// Uses a throwaway in-memory summary cache: appropriate for the one-shot
/// batch commands (`daily`/`monthly`) where there is no persistent cache to
/// read from or write back to across calls. Long-lived callers that want
/// the on-disk cache and initial/watch-mode semantics of §4.7 should use
/// [`analyze_usage_cached`] directly, as [`monitor_runtime::data_manager::
/// DataManager`] does.
pub fn analyze_usage(
    hours_back: Option<u64>,
    quick_start: bool,
    data_path: Option<&str>,
) -> AnalysisResult {
    let mut cache = SummaryCache::in_memory();
    analyze_usage_cached(
        hours_back,
        quick_start,
        data_path,
        &mut cache,
        CacheMode::Initial,
    )
}

/// Run the full analysis pipeline against a caller-owned [`SummaryCache`].
///
/// 1. Load usage entries (and raw JSONL) from `data_path` via the
///    concurrent loader, consulting `cache` for freshness and — in
///    [`CacheMode::Initial`] — batching newly built summaries back into it.
/// 2. Build 5-hour session blocks via [`SessionAnalyzer`].
/// 3. Compute burn rates for active blocks.
/// 4. Detect limits and attach them to the matching blocks.
/// 5. Return an [`AnalysisResult`].
pub fn analyze_usage_cached(
    hours_back: Option<u64>,
    quick_start: bool,
    data_path: Option<&str>,
    cache: &mut SummaryCache,
    cache_mode: CacheMode,
) -> AnalysisResult {
    // Apply quick-start override.
    let effective_hours = if quick_start && hours_back.is_none() {
        Some(24)
    } else {
        hours_back
    };

    let path = resolve_data_path(data_path);

    // ── Step 1: Load entries ──────────────────────────────────────────────────
    let load_start = std::time::Instant::now();
    let options = LoadOptions {
        hours_back: effective_hours,
        cost_mode: CostMode::Auto,
        cross_file_dedup: false,
        cache_mode,
        include_raw: true, // always include raw for limit detection
    };
    let load_result = load_concurrent(&path, cache, options);
    let load_time = load_start.elapsed().as_secs_f64();
    let cache_used = load_result.files_from_cache > 0;

    if cache_mode == CacheMode::Initial {
        if let Err(e) = flush_cache_writes(cache, load_result.new_summaries, cache_mode) {
            tracing::warn!(error = %e, "failed to flush summary cache");
        }
    }

    let entries = load_result.entries;
    let raw_entries = load_result.raw_entries;

    // ── Step 2: Build blocks ──────────────────────────────────────────────────
    let transform_start = std::time::Instant::now();
    let analyzer = SessionAnalyzer::new(5);
    let mut blocks = analyzer.transform_to_blocks(&entries);
    let transform_time = transform_start.elapsed().as_secs_f64();

    // ── Step 3: Burn rates ────────────────────────────────────────────────────
    process_burn_rates(&mut blocks);

    // ── Step 4: Limits ────────────────────────────────────────────────────────
    let mut limits_detected = 0usize;
    if let Some(raw) = &raw_entries {
        let detections = analyzer.detect_limits(raw);
        limits_detected = detections.len();
        assign_limits_to_blocks(&mut blocks, &detections);
    }

    // ── Step 5: Build result ──────────────────────────────────────────────────
    let total_tokens: u64 = blocks.iter().map(|b| b.total_tokens()).sum();
    let total_cost: f64 = blocks.iter().map(|b| b.cost_usd).sum();

    let metadata = AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        hours_analyzed: effective_hours,
        entries_processed: entries.len(),
        blocks_created: blocks.len(),
        limits_detected,
        load_time_seconds: load_time,
        transform_time_seconds: transform_time,
        cache_used,
        quick_start,
    };

    AnalysisResult {
        blocks,
        metadata,
        entries_count: entries.len(),
        total_tokens,
        total_cost,
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Compute and attach burn rates (and projections) to every active block.
fn process_burn_rates(blocks: &mut [SessionBlock]) {
    for block in blocks.iter_mut() {
        if !block.is_active {
            continue;
        }
        if let Some(burn_rate) = BurnRateCalculator::calculate_burn_rate(block) {
            let projection = BurnRateCalculator::project_block_usage(
                &burn_rate,
                block.end_time,
                block.total_tokens(),
                block.cost_usd,
            );
            block.burn_rate_snapshot = Some(burn_rate);
            if let Some(proj) = projection {
                block.projection_data = Some(serde_json::json!({
                    "totalTokens": proj.projected_total_tokens,
                    "totalCost": proj.projected_total_cost,
                    "remainingMinutes": proj.remaining_minutes,
                }));
            }
        }
    }
}

/// Attach each [`LimitDetection`] to the [`SessionBlock`] whose time window
/// contains the limit's timestamp.
fn assign_limits_to_blocks(blocks: &mut [SessionBlock], detections: &[LimitDetection]) {
    for detection in detections {
        for block in blocks.iter_mut() {
            if block.is_gap {
                continue;
            }
            if block.start_time <= detection.timestamp && detection.timestamp <= block.end_time {
                block.limit_messages.push(LimitMessage {
                    limit_type: detection.limit_type.clone(),
                    timestamp: detection.timestamp.to_rfc3339(),
                    content: detection.content.clone(),
                    reset_time: detection.reset_time.map(|t| t.to_rfc3339()),
                });
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
