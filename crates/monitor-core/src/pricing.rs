use std::collections::HashMap;

use crate::models::normalize_model_name;
use crate::models::{CostMode, TokenCounts};

/// Per-model pricing rates in US dollars per million tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPricing {
    /// Price per million input (prompt) tokens.
    pub input: f64,
    /// Price per million output (completion) tokens.
    pub output: f64,
    /// Price per million cache-creation tokens.
    pub cache_creation: f64,
    /// Price per million cache-read tokens.
    pub cache_read: f64,
}

impl ModelPricing {
    fn new(input: f64, output: f64, cache_creation: f64, cache_read: f64) -> Self {
        Self {
            input,
            output,
            cache_creation,
            cache_read,
        }
    }
}

// ── Fallback pricing constants ($/million tokens) ─────────────────────────────

fn opus_pricing() -> ModelPricing {
    ModelPricing::new(15.0, 75.0, 18.75, 1.50)
}

fn sonnet_pricing() -> ModelPricing {
    ModelPricing::new(3.0, 15.0, 3.75, 0.30)
}

fn haiku_pricing() -> ModelPricing {
    ModelPricing::new(0.25, 1.25, 0.30, 0.03)
}

/// Build the default model pricing map keyed by canonical model name.
fn default_pricing_map() -> HashMap<String, ModelPricing> {
    let mut map = HashMap::new();
    map.insert("claude-3-opus".to_string(), opus_pricing());
    map.insert("claude-3-sonnet".to_string(), sonnet_pricing());
    map.insert("claude-3-haiku".to_string(), haiku_pricing());
    map.insert("claude-3-5-sonnet".to_string(), sonnet_pricing());
    map.insert("claude-3-5-haiku".to_string(), haiku_pricing());
    map.insert("claude-sonnet-4-20250514".to_string(), sonnet_pricing());
    map.insert("claude-opus-4-20250514".to_string(), opus_pricing());
    map
}

/// Calculator that resolves per-model pricing and computes costs from token
/// counts, with an optional result cache to avoid redundant recalculation.
pub struct PricingCalculator {
    /// Base pricing map: canonical model name → rates.
    pricing_map: HashMap<String, ModelPricing>,
    /// Memoisation cache keyed by `"{model}:{input}:{output}:{cache_create}:{cache_read}"`.
    cost_cache: HashMap<String, f64>,
}

impl PricingCalculator {
    /// Create a new calculator.
    ///
    /// Pass `Some(map)` to override individual model prices; entries not
    /// present in `custom_pricing` fall back to the built-in defaults.
    pub fn new(custom_pricing: Option<HashMap<String, ModelPricing>>) -> Self {
        let mut pricing_map = default_pricing_map();
        if let Some(overrides) = custom_pricing {
            for (k, v) in overrides {
                pricing_map.insert(k, v);
            }
        }
        Self {
            pricing_map,
            cost_cache: HashMap::new(),
        }
    }

    // ── Private helpers ──────────────────────────────────────────────────────

    /// Resolve the pricing for `model`, consulting the map in priority order:
    /// 1. Normalised name.
    /// 2. Original name.
    /// 3. Keyword fallback (opus / haiku / sonnet).
    /// 4. Haiku pricing as a last-resort default.
    fn get_pricing_for_model(&self, model: &str) -> ModelPricing {
        let normalised = normalize_model_name(model);

        // 1. Normalised name.
        if let Some(p) = self.pricing_map.get(&normalised) {
            return p.clone();
        }

        // 2. Original name (covers exact user-supplied keys).
        if let Some(p) = self.pricing_map.get(model) {
            return p.clone();
        }

        // 3. Keyword fallback.
        let lower = model.to_lowercase();
        if lower.contains("opus") {
            return opus_pricing();
        }
        if lower.contains("haiku") {
            return haiku_pricing();
        }
        if lower.contains("sonnet") {
            return sonnet_pricing();
        }

        // 4. Ultimate fallback: sonnet pricing is a reasonable middle ground.
        sonnet_pricing()
    }

    // ── Public API ───────────────────────────────────────────────────────────

    /// Calculate the cost (USD) for a single model invocation from raw token
    /// counts.  Returns `0.0` for the special `"<synthetic>"` model.
    ///
    /// Results are memoised so repeated calls with the same arguments are
    /// essentially free.
    pub fn calculate_cost(
        &mut self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        cache_creation_tokens: u64,
        cache_read_tokens: u64,
    ) -> f64 {
        // Skip synthetic entries.
        if model == "<synthetic>" {
            return 0.0;
        }

        // Check the cache first.
        let cache_key = format!(
            "{}:{}:{}:{}:{}",
            model, input_tokens, output_tokens, cache_creation_tokens, cache_read_tokens
        );
        if let Some(&cached) = self.cost_cache.get(&cache_key) {
            return cached;
        }

        let pricing = self.get_pricing_for_model(model);
        let per_m = 1_000_000.0_f64;

        let cost = (input_tokens as f64 / per_m) * pricing.input
            + (output_tokens as f64 / per_m) * pricing.output
            + (cache_creation_tokens as f64 / per_m) * pricing.cache_creation
            + (cache_read_tokens as f64 / per_m) * pricing.cache_read;

        // Round to 6 decimal places.
        let rounded = (cost * 1_000_000.0).round() / 1_000_000.0;

        self.cost_cache.insert(cache_key, rounded);
        rounded
    }

    /// Convenience wrapper that accepts a [`TokenCounts`] value.
    pub fn calculate_cost_with_tokens(&mut self, model: &str, tokens: &TokenCounts) -> f64 {
        self.calculate_cost(
            model,
            tokens.input_tokens,
            tokens.output_tokens,
            tokens.cache_creation_tokens,
            tokens.cache_read_tokens,
        )
    }

    /// Extract cost from a raw JSON entry, honouring the given [`CostMode`].
    ///
    /// * `CostMode::Cached` — try `entry["costUSD"]` then `entry["cost_usd"]`.
    ///   If neither is present/valid, fall through to calculation.
    /// * `CostMode::Calculated` — always recalculate from token counts.
    /// * `CostMode::Auto` — identical to `Calculated`.
    pub fn calculate_cost_for_entry(
        &mut self,
        entry_data: &serde_json::Value,
        mode: CostMode,
    ) -> f64 {
        if mode == CostMode::Cached {
            // Try the camelCase key first, then snake_case.
            let cached = entry_data
                .get("costUSD")
                .or_else(|| entry_data.get("cost_usd"))
                .and_then(|v| v.as_f64());

            if let Some(cost) = cached {
                return cost;
            }
        }

        // Extract model name.
        let model = entry_data
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("claude-3-5-sonnet")
            .to_string();

        // Helper: look up a u64 token count by trying multiple key names.
        let token_u64 = |data: &serde_json::Value, keys: &[&str]| -> u64 {
            for &key in keys {
                if let Some(v) = data.get(key).and_then(|v| v.as_u64()) {
                    return v;
                }
            }
            0
        };

        let input = token_u64(
            entry_data,
            &["input_tokens", "inputTokens", "prompt_tokens"],
        );
        let output = token_u64(
            entry_data,
            &["output_tokens", "outputTokens", "completion_tokens"],
        );
        let cache_create = token_u64(
            entry_data,
            &[
                "cache_creation_tokens",
                "cache_creation_input_tokens",
                "cacheCreationInputTokens",
            ],
        );
        let cache_read = token_u64(
            entry_data,
            &[
                "cache_read_input_tokens",
                "cache_read_tokens",
                "cacheReadInputTokens",
            ],
        );

        self.calculate_cost(&model, input, output, cache_create, cache_read)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
