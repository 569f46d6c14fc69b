//! Engine tunables, loadable from a file with sane defaults.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

fn default_ttl_cache_ms() -> i64 {
    300_000
}

fn default_max_size() -> usize {
    10_000
}

fn default_flush_debounce_ms() -> u64 {
    100
}

fn default_semantic_threshold() -> f32 {
    0.85
}

fn default_rule_ttl_secs() -> u64 {
    86_400
}

fn default_synthesized_state_ttl_secs() -> u64 {
    86_400
}

/// Tunables named in `SPEC_FULL.md` §4.3/§4.4/§4.5/§10.3. `Default`
/// reproduces the literal constants the specification calls out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ttl_cache_ms: i64,
    pub max_size: usize,
    pub flush_debounce_ms: u64,
    pub default_semantic_threshold: f32,
    pub default_rule_ttl_secs: u64,
    pub synthesized_state_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ttl_cache_ms: default_ttl_cache_ms(),
            max_size: default_max_size(),
            flush_debounce_ms: default_flush_debounce_ms(),
            default_semantic_threshold: default_semantic_threshold(),
            default_rule_ttl_secs: default_rule_ttl_secs(),
            synthesized_state_ttl_secs: default_synthesized_state_ttl_secs(),
        }
    }
}

impl EngineConfig {
    /// Loads a JSON or TOML config file (dispatched on extension, mirroring
    /// the teacher's `ingest::config::load_whitelist_from` convention),
    /// falling back to defaults for any field the file omits, and clamping
    /// out-of-range values rather than rejecting the whole file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg: EngineConfig = match ext.as_str() {
            "toml" => toml::from_str(&data)?,
            _ => serde_json::from_str(&data)?,
        };

        if !(0.0..=1.0).contains(&cfg.default_semantic_threshold) {
            cfg.default_semantic_threshold = default_semantic_threshold();
        }
        if cfg.max_size == 0 {
            cfg.max_size = default_max_size();
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.ttl_cache_ms, 300_000);
        assert_eq!(cfg.max_size, 10_000);
        assert_eq!(cfg.flush_debounce_ms, 100);
        assert_eq!(cfg.default_semantic_threshold, 0.85);
        assert_eq!(cfg.default_rule_ttl_secs, 86_400);
        assert_eq!(cfg.synthesized_state_ttl_secs, 86_400);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!(
            "sentinel-rules-engine-cfg-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.json");
        std::fs::write(&path, r#"{"max_size": 500}"#).unwrap();
        let cfg = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(cfg.max_size, 500);
        assert_eq!(cfg.ttl_cache_ms, 300_000);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn toml_extension_is_parsed_as_toml() {
        let dir = std::env::temp_dir().join(format!(
            "sentinel-rules-engine-cfg-toml-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.toml");
        std::fs::write(&path, "max_size = 250\nflush_debounce_ms = 50\n").unwrap();
        let cfg = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(cfg.max_size, 250);
        assert_eq!(cfg.flush_debounce_ms, 50);
        assert_eq!(cfg.ttl_cache_ms, 300_000);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn out_of_range_semantic_threshold_falls_back_to_default() {
        let dir = std::env::temp_dir().join(format!(
            "sentinel-rules-engine-cfg-clamp-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.json");
        std::fs::write(&path, r#"{"default_semantic_threshold": 4.0}"#).unwrap();
        let cfg = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(cfg.default_semantic_threshold, 0.85);
        std::fs::remove_dir_all(&dir).ok();
    }
}
