use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Parses timestamps from the variety of formats found in JSONL usage files.
pub struct TimestampProcessor;

impl TimestampProcessor {
    /// Attempt to parse a [`serde_json::Value`] into a UTC [`DateTime`].
    ///
    /// Handles:
    /// * `null`       → `None`
    /// * JSON string  → ISO 8601 / RFC 3339 (including `Z`-suffix) or common
    ///   date-time patterns.
    /// * JSON number  → Unix timestamp (integer or float seconds).
    pub fn parse(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::Null => None,
            Value::String(s) => Self::parse_str(s.as_str()),
            Value::Number(n) => {
                if let Some(secs) = n.as_i64() {
                    DateTime::from_timestamp(secs, 0)
                } else if let Some(f) = n.as_f64() {
                    let secs = f.trunc() as i64;
                    let nanos = (f.fract() * 1_000_000_000.0).round() as u32;
                    DateTime::from_timestamp(secs, nanos)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    fn parse_str(s: &str) -> Option<DateTime<Utc>> {
        if s.is_empty() {
            return None;
        }

        // Replace trailing 'Z' with '+00:00' for RFC 3339 compatibility.
        let normalised = if let Some(stripped) = s.strip_suffix('Z') {
            format!("{}+00:00", stripped)
        } else {
            s.to_string()
        };

        // Try RFC 3339 / ISO 8601 with offset.
        if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
            return Some(dt.with_timezone(&Utc));
        }

        // Try RFC 2822 (email date format).
        if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
            return Some(dt.with_timezone(&Utc));
        }

        // Try a series of common strftime-like patterns.
        const FORMATS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%d",
            "%d/%m/%Y %H:%M:%S",
            "%m/%d/%Y %H:%M:%S",
        ];

        for fmt in FORMATS {
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Utc.from_utc_datetime(&naive));
            }
            // date-only patterns use NaiveDate.
            if let Ok(date) = chrono::NaiveDate::parse_from_str(s, fmt) {
                let naive = date.and_hms_opt(0, 0, 0)?;
                return Some(Utc.from_utc_datetime(&naive));
            }
        }

        warn!(
            "TimestampProcessor: could not parse timestamp string \"{}\"",
            s
        );
        None
    }
}

// ── ExtractedTokens ───────────────────────────────────────────────────────────

/// Token counts extracted from a raw JSON usage entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedTokens {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub total_tokens: u64,
}

// ── TokenExtractor ────────────────────────────────────────────────────────────

/// Extracts token counts from a raw JSON entry, handling the many different
/// key-name and nesting conventions used by the Claude API and its wrappers.
pub struct TokenExtractor;

impl TokenExtractor {
    /// Extract token counts from any shape of JSON entry.
    ///
    /// For `type == "assistant"` entries the lookup order is:
    ///   `message.usage` → `usage` → root object.
    ///
    /// For all other entries:
    ///   `usage` → `message.usage` → root object.
    ///
    /// Within each candidate object, the first alternative key that yields a
    /// non-zero value wins.
    pub fn extract(data: &Value) -> ExtractedTokens {
        let is_assistant = data
            .get("type")
            .and_then(|v| v.as_str())
            .map(|s| s == "assistant")
            .unwrap_or(false);

        // Build the ordered list of source objects to probe.
        let message_usage = data.get("message").and_then(|m| m.get("usage"));
        let usage = data.get("usage");

        let sources: Vec<Option<&Value>> = if is_assistant {
            vec![message_usage, usage, Some(data)]
        } else {
            vec![usage, message_usage, Some(data)]
        };

        for source_opt in sources {
            let Some(source) = source_opt else { continue };

            let input = Self::find_u64(source, &["input_tokens", "inputTokens", "prompt_tokens"]);
            let output = Self::find_u64(
                source,
                &["output_tokens", "outputTokens", "completion_tokens"],
            );

            if input > 0 || output > 0 {
                let cache_create = Self::find_u64(
                    source,
                    &[
                        "cache_creation_tokens",
                        "cache_creation_input_tokens",
                        "cacheCreationInputTokens",
                    ],
                );
                let cache_read = Self::find_u64(
                    source,
                    &[
                        "cache_read_input_tokens",
                        "cache_read_tokens",
                        "cacheReadInputTokens",
                    ],
                );
                let total = input + output + cache_create + cache_read;
                return ExtractedTokens {
                    input_tokens: input,
                    output_tokens: output,
                    cache_creation_input_tokens: cache_create,
                    cache_read_input_tokens: cache_read,
                    total_tokens: total,
                };
            }
        }

        ExtractedTokens::default()
    }

    fn find_u64(obj: &Value, keys: &[&str]) -> u64 {
        for &key in keys {
            if let Some(v) = obj.get(key).and_then(|v| v.as_u64()) {
                return v;
            }
        }
        0
    }
}

// ── DataConverter ─────────────────────────────────────────────────────────────

/// Utility helpers for transforming raw JSON entry data.
pub struct DataConverter;

impl DataConverter {
    /// Flatten a nested JSON object into a single-level map with dotted keys.
    ///
    /// For example, `{"a": {"b": 1}}` with prefix `""` becomes
    /// `{"a.b": 1}` (or `{"prefix.a.b": 1}` when `prefix` is non-empty).
    pub fn flatten_nested(data: &Value, prefix: &str) -> serde_json::Map<String, Value> {
        let mut result = serde_json::Map::new();
        Self::flatten_inner(data, prefix, &mut result);
        result
    }

    fn flatten_inner(value: &Value, prefix: &str, output: &mut serde_json::Map<String, Value>) {
        match value {
            Value::Object(map) => {
                for (key, val) in map {
                    let new_key = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten_inner(val, &new_key, output);
                }
            }
            Value::Array(arr) => {
                for (i, item) in arr.iter().enumerate() {
                    let new_key = if prefix.is_empty() {
                        i.to_string()
                    } else {
                        format!("{}.{}", prefix, i)
                    };
                    Self::flatten_inner(item, &new_key, output);
                }
            }
            _ => {
                output.insert(prefix.to_string(), value.clone());
            }
        }
    }

    /// Extract the model name from a JSON entry.
    ///
    /// Tries `data["model"]`, then `data["message"]["model"]`.
    /// Falls back to `"claude-3-5-sonnet"` if neither is present.
    pub fn extract_model_name(data: &Value) -> String {
        if let Some(s) = data.get("model").and_then(|v| v.as_str()) {
            if !s.is_empty() {
                return s.to_string();
            }
        }
        if let Some(s) = data
            .get("message")
            .and_then(|m| m.get("model"))
            .and_then(|v| v.as_str())
        {
            if !s.is_empty() {
                return s.to_string();
            }
        }
        "claude-3-5-sonnet".to_string()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────


// Re-export chrono items used in tests for brevity.
#[allow(unused_imports)]
use chrono::{Datelike, Timelike};
