use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{
    normalize_model_name, BurnRate, HealthStatus, ModelDistributionEntry, RealtimeMetrics,
    SessionBlock, UsageProjection,
};

/// Interface for any time-windowed usage block from which burn rate and
/// projection figures can be derived.
pub trait BlockLike {
    /// Whether the block is currently open / in-progress.
    fn is_active(&self) -> bool;
    /// Duration of the block in minutes (minimum 1.0).
    fn duration_minutes(&self) -> f64;
    /// Total token count across all categories.
    fn total_tokens(&self) -> u64;
    /// Total monetary cost (USD) for this block.
    fn cost_usd(&self) -> f64;
    /// Nominal or actual end time of the block.
    fn end_time(&self) -> DateTime<Utc>;
}

impl BlockLike for SessionBlock {
    fn is_active(&self) -> bool {
        self.is_active
    }

    fn duration_minutes(&self) -> f64 {
        self.duration_minutes()
    }

    fn total_tokens(&self) -> u64 {
        self.total_tokens()
    }

    fn cost_usd(&self) -> f64 {
        self.cost_usd
    }

    fn end_time(&self) -> DateTime<Utc> {
        self.actual_end_time.unwrap_or(self.end_time)
    }
}

// ── BurnRateCalculator ────────────────────────────────────────────────────────

/// Stateless collection of burn-rate and projection calculations.
pub struct BurnRateCalculator;

impl BurnRateCalculator {
    /// Compute the instantaneous burn rate for a block.
    ///
    /// Returns `None` when:
    /// * The block is not active.
    /// * Duration is less than 1.0 minute.
    /// * Total token count is 0.
    pub fn calculate_burn_rate<B: BlockLike>(block: &B) -> Option<BurnRate> {
        if !block.is_active() {
            return None;
        }
        let duration_minutes = block.duration_minutes();
        if duration_minutes < 1.0 {
            return None;
        }
        let total_tokens = block.total_tokens();
        if total_tokens == 0 {
            return None;
        }
        let tokens_per_minute = total_tokens as f64 / duration_minutes;
        let cost_per_hour = (block.cost_usd() / duration_minutes) * 60.0;
        Some(BurnRate {
            tokens_per_minute,
            cost_per_hour,
        })
    }

    /// Project how far a session will go given the current burn rate.
    ///
    /// Returns `None` when the block's end time has already passed.
    pub fn project_block_usage(
        burn_rate: &BurnRate,
        end_time: DateTime<Utc>,
        current_tokens: u64,
        current_cost: f64,
    ) -> Option<UsageProjection> {
        let now = Utc::now();
        let remaining_secs = (end_time - now).num_seconds();
        if remaining_secs <= 0 {
            return None;
        }
        let remaining_minutes = remaining_secs as f64 / 60.0;
        let remaining_hours = remaining_minutes / 60.0;

        let projected_total_tokens =
            current_tokens + (burn_rate.tokens_per_minute * remaining_minutes).round() as u64;
        let projected_total_cost = current_cost + burn_rate.cost_per_hour * remaining_hours;

        Some(UsageProjection {
            projected_total_tokens,
            projected_total_cost,
            remaining_minutes,
        })
    }

    /// Compute the rolling hourly burn rate (tokens / minute) by summing tokens
    /// from all blocks that overlap the last 60 minutes.
    ///
    /// Blocks that partially overlap the hour window contribute a proportional
    /// fraction of their tokens.
    pub fn calculate_hourly_burn_rate<B: BlockLike>(
        blocks: &[B],
        current_time: DateTime<Utc>,
    ) -> f64 {
        let window_start = current_time - chrono::Duration::hours(1);
        let mut total_tokens: f64 = 0.0;

        for block in blocks {
            let block_end = block.end_time();
            // Approximate block start from end time and duration.
            let block_start =
                block_end - chrono::Duration::seconds((block.duration_minutes() * 60.0) as i64);

            // Skip blocks entirely outside the window.
            if block_end <= window_start || block_start >= current_time {
                continue;
            }

            // Clamp overlap to [window_start, current_time].
            let overlap_start = block_start.max(window_start);
            let overlap_end = block_end.min(current_time);
            let overlap_secs = (overlap_end - overlap_start).num_seconds();
            let block_secs = (block_end - block_start).num_seconds();

            if block_secs <= 0 {
                continue;
            }

            let proportion = overlap_secs as f64 / block_secs as f64;
            total_tokens += block.total_tokens() as f64 * proportion;
        }

        // Normalise to tokens per minute over a 60-minute window.
        total_tokens / 60.0
    }

    /// Map a plan-limit percentage to §4.5's three-tier health status.
    ///
    /// `critical` at `>= 95%` **or** whenever `predicted_overshoot` is set
    /// (the session is projected to exceed its cost limit before the
    /// window closes); `warning` at `>= 75%`; `healthy` otherwise.
    pub fn health_status(percentage: f64, predicted_overshoot: bool) -> HealthStatus {
        if percentage >= 95.0 || predicted_overshoot {
            HealthStatus::Critical
        } else if percentage >= 75.0 {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }

    /// Deterministic confidence score in `[0, 100]`, monotone in
    /// `entries_last_hour` for a fixed variance (Q2: advisory, never a
    /// pinned value).
    ///
    /// More samples raise confidence along a saturating curve; uneven
    /// spacing between samples (`inter_arrival_variance_secs`, the
    /// variance of consecutive gaps in seconds) lowers it.
    pub fn calculate_confidence(entries_last_hour: usize, inter_arrival_variance_secs: f64) -> f64 {
        if entries_last_hour == 0 {
            return 0.0;
        }
        let sample_component = 100.0 * (1.0 - (-(entries_last_hour as f64) / 10.0).exp());
        let variance_penalty = (inter_arrival_variance_secs.max(0.0).sqrt() / 60.0).min(1.0) * 30.0;
        (sample_component - variance_penalty).clamp(0.0, 100.0)
    }

    /// Assemble the full real-time metrics snapshot for an active block,
    /// per §3 `RealtimeMetrics` / §4.5.
    pub fn compute_realtime_metrics(
        block: &SessionBlock,
        cost_limit: f64,
        now: DateTime<Utc>,
    ) -> RealtimeMetrics {
        let elapsed_minutes = (now - block.start_time).num_seconds().max(0) as f64 / 60.0;
        let window_minutes =
            (block.end_time - block.start_time).num_seconds().max(0) as f64 / 60.0;
        let session_progress = if window_minutes > 0.0 {
            (elapsed_minutes / window_minutes * 100.0).min(100.0)
        } else {
            100.0
        };
        let time_remaining_minutes = (block.end_time - now).num_seconds().max(0) as f64 / 60.0;

        let current_tokens = block.total_tokens();
        let current_cost = block.cost_usd;

        let window_start = now - Duration::hours(1);
        let recent: Vec<&crate::models::UsageEntry> = block
            .entries
            .iter()
            .filter(|e| e.timestamp >= window_start && e.timestamp <= now)
            .collect();
        let tokens_last_hour: u64 = recent.iter().map(|e| e.total_tokens()).sum();
        let cost_last_hour: f64 = recent.iter().map(|e| e.cost_usd).sum();

        let tokens_per_minute = tokens_last_hour as f64 / 60.0;
        let mean_cost_per_token = if tokens_last_hour > 0 {
            cost_last_hour / tokens_last_hour as f64
        } else {
            0.0
        };
        let cost_per_hour = tokens_per_minute * mean_cost_per_token * 60.0;
        let cost_per_minute = cost_per_hour / 60.0;

        let projected_tokens =
            current_tokens + (tokens_per_minute * time_remaining_minutes).round() as u64;
        let projected_cost = current_cost + cost_per_minute * time_remaining_minutes;

        let burn_rate = if tokens_last_hour > 0 {
            Some(BurnRate {
                tokens_per_minute,
                cost_per_hour,
            })
        } else {
            None
        };

        let predicted_end_time = if cost_per_minute > 0.0 {
            let minutes_to_limit = (cost_limit - current_cost) / cost_per_minute;
            Some(now + Duration::seconds((minutes_to_limit * 60.0) as i64))
        } else {
            None
        };

        let timestamps: Vec<DateTime<Utc>> = recent.iter().map(|e| e.timestamp).collect();
        let variance = inter_arrival_variance_secs(&timestamps);
        let confidence_level = Self::calculate_confidence(recent.len(), variance);

        let percentage = if cost_limit > 0.0 {
            current_cost / cost_limit * 100.0
        } else {
            0.0
        };
        let predicted_overshoot = cost_limit > 0.0 && projected_cost > cost_limit;
        let health = Self::health_status(percentage, predicted_overshoot);

        let mut model_distribution = HashMap::new();
        for (model, stats) in &block.per_model_stats {
            let model_tokens = stats.input_tokens
                + stats.output_tokens
                + stats.cache_creation_tokens
                + stats.cache_read_tokens;
            let percentage = if current_tokens > 0 {
                model_tokens as f64 / current_tokens as f64 * 100.0
            } else {
                0.0
            };
            let last_used = block
                .entries
                .iter()
                .rev()
                .find(|e| &normalize_model_name(&e.model) == model)
                .map(|e| e.timestamp)
                .unwrap_or(block.start_time);
            model_distribution.insert(
                model.clone(),
                ModelDistributionEntry {
                    token_count: model_tokens,
                    cost_usd: stats.cost_usd,
                    percentage,
                    last_used,
                },
            );
        }

        RealtimeMetrics {
            session_start: block.start_time,
            time_remaining_minutes,
            session_progress,
            current_tokens,
            current_cost,
            tokens_per_minute,
            cost_per_hour,
            burn_rate,
            projected_tokens,
            projected_cost,
            predicted_end_time,
            confidence_level,
            health_status: health,
            model_distribution,
            last_updated: now,
            calculation_time: now,
        }
    }
}

/// Variance (seconds²) of consecutive inter-arrival gaps in `timestamps`.
/// Returns `0.0` for fewer than two samples.
fn inter_arrival_variance_secs(timestamps: &[DateTime<Utc>]) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }
    let gaps: Vec<f64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds() as f64)
        .collect();
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64
}

// ── Tests ──────────────────────────────────────────────────────────────────────
