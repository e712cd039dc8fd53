use std::path::PathBuf;

use crate::models::llm::LlmConfig;

/// Narrative tracker tuning. Thresholds are documented in DESIGN.md;
/// they are deliberate choices, not values dictated by the data model.
#[derive(Debug, Clone)]
pub struct NarrativeConfig {
    /// Rolling window of persisted clusters considered by a rollup.
    pub window_days: u32,
    /// Consecutive days without a matching cluster before a thread
    /// transitions to resolved.
    pub inactivity_days: u32,
    /// Minimum similarity score for a cluster to join a thread.
    pub match_threshold: f64,
    /// Absolute trailing-slope (per day) above which escalation leaves
    /// "stable".
    pub slope_threshold: f64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            window_days: 14,
            inactivity_days: 3,
            match_threshold: 0.2,
            slope_threshold: 0.08,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub narrative: NarrativeConfig,
    /// Articles per enrichment request.
    pub reader_batch_size: usize,
    /// Pause between enrichment batches, rate-limit courtesy only.
    pub reader_batch_delay_ms: u64,
    /// Reference instrument for the market-return series.
    pub benchmark_symbol: String,
    pub data_dir: PathBuf,
    pub bind_addr: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            narrative: NarrativeConfig::default(),
            reader_batch_size: 10,
            reader_batch_delay_ms: 500,
            benchmark_symbol: "^spx".to_string(),
            data_dir: PathBuf::from("./data"),
            bind_addr: "127.0.0.1:8090".to_string(),
        }
    }
}

impl AppConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            cfg.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            cfg.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            cfg.llm.model_name = v;
        }
        if let Ok(v) = std::env::var("LLM_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                cfg.llm.timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(n) = v.parse() {
                cfg.llm.temperature = n;
            }
        }
        if let Ok(v) = std::env::var("LLM_BRIEFING_TEMPERATURE") {
            if let Ok(n) = v.parse() {
                cfg.llm.briefing_temperature = n;
            }
        }
        if let Ok(v) = std::env::var("LLM_MAX_RETRIES") {
            if let Ok(n) = v.parse() {
                cfg.llm.max_retries = n;
            }
        }
        if let Ok(v) = std::env::var("INTEL_DATA_DIR") {
            cfg.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("INTEL_BIND_ADDR") {
            cfg.bind_addr = v;
        }
        if let Ok(v) = std::env::var("INTEL_BENCHMARK") {
            cfg.benchmark_symbol = v;
        }
        if let Ok(v) = std::env::var("INTEL_NARRATIVE_WINDOW_DAYS") {
            if let Ok(n) = v.parse() {
                cfg.narrative.window_days = n;
            }
        }
        if let Ok(v) = std::env::var("INTEL_NARRATIVE_INACTIVITY_DAYS") {
            if let Ok(n) = v.parse() {
                cfg.narrative.inactivity_days = n;
            }
        }
        if let Ok(v) = std::env::var("INTEL_NARRATIVE_MATCH_THRESHOLD") {
            if let Ok(n) = v.parse() {
                cfg.narrative.match_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("INTEL_NARRATIVE_SLOPE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                cfg.narrative.slope_threshold = n;
            }
        }
        if let Ok(v) = std::env::var("INTEL_BATCH_DELAY_MS") {
            if let Ok(n) = v.parse() {
                cfg.reader_batch_delay_ms = n;
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_apply() {
        std::env::set_var("LLM_TEMPERATURE", "0.1");
        std::env::set_var("LLM_BRIEFING_TEMPERATURE", "0.9");
        std::env::set_var("LLM_MAX_RETRIES", "5");
        std::env::set_var("INTEL_NARRATIVE_MATCH_THRESHOLD", "0.35");
        std::env::set_var("INTEL_NARRATIVE_SLOPE_THRESHOLD", "0.12");

        let cfg = AppConfig::from_env();
        assert_eq!(cfg.llm.temperature, 0.1);
        assert_eq!(cfg.llm.briefing_temperature, 0.9);
        assert_eq!(cfg.llm.max_retries, 5);
        assert_eq!(cfg.narrative.match_threshold, 0.35);
        assert_eq!(cfg.narrative.slope_threshold, 0.12);

        std::env::remove_var("LLM_TEMPERATURE");
        std::env::remove_var("LLM_BRIEFING_TEMPERATURE");
        std::env::remove_var("LLM_MAX_RETRIES");
        std::env::remove_var("INTEL_NARRATIVE_MATCH_THRESHOLD");
        std::env::remove_var("INTEL_NARRATIVE_SLOPE_THRESHOLD");

        let cfg = AppConfig::from_env();
        assert_eq!(cfg.llm.max_retries, LlmConfig::default().max_retries);
    }
}
