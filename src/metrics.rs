//! Prometheus metrics wiring. Observability scaffolding only — never feeds
//! back into evaluation results or timing (`SPEC_FULL.md` §10.4).

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static DESCRIBED: OnceCell<()> = OnceCell::new();

/// Registers metric descriptions once so series show up on `/metrics`
/// before they're first recorded.
fn ensure_described() {
    DESCRIBED.get_or_init(|| {
        describe_counter!("engine_evaluations_total", "Evaluation calls handled.");
        describe_counter!("engine_rules_matched_total", "Rules that reached a match.");
        describe_counter!(
            "engine_rules_skipped_total",
            "Rules skipped by pre-filter, threshold gate, or regex error."
        );
        describe_counter!("engine_cache_hits_total", "State cache hits.");
        describe_counter!("engine_cache_misses_total", "State cache misses.");
        describe_counter!("engine_cache_evictions_total", "State cache evictions.");
        describe_counter!("engine_flush_batches_total", "Dirty-write flush batches run.");
        describe_gauge!("engine_cache_size", "Current state cache entry count.");
        describe_gauge!("engine_regex_cache_size", "Current regex cache entry count.");
    });
}

pub fn record_evaluation() {
    ensure_described();
    counter!("engine_evaluations_total").increment(1);
}

pub fn record_rule_matched() {
    counter!("engine_rules_matched_total").increment(1);
}

pub fn record_rule_skipped() {
    counter!("engine_rules_skipped_total").increment(1);
}

pub fn record_cache_hit() {
    counter!("engine_cache_hits_total").increment(1);
}

pub fn record_cache_miss() {
    counter!("engine_cache_misses_total").increment(1);
}

pub fn record_cache_eviction() {
    counter!("engine_cache_evictions_total").increment(1);
}

pub fn record_flush_batch() {
    counter!("engine_flush_batches_total").increment(1);
}

pub fn set_cache_size(size: usize) {
    gauge!("engine_cache_size").set(size as f64);
}

pub fn set_regex_cache_size(size: usize) {
    gauge!("engine_regex_cache_size").set(size as f64);
}

/// Installs the process-wide Prometheus recorder. Call once at startup.
pub fn install_recorder() -> PrometheusHandle {
    ensure_described();
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}
