// src/telemetry.rs
//! Logging and metric helpers.
//!
//! The library only emits `tracing` events and `metrics` counters; installing a
//! subscriber or an exporter is left to the binary.

use metrics::counter;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::decision::Directive;
use crate::location::ConfidenceBand;

pub const ENV_LOG_FILTER: &str = "CRISIS_LOG";
const DEFAULT_FILTER: &str = "crisis_decision_core=info,warn";

/// Short, stable id for a piece of user text. Raw text is never logged.
pub fn anon_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// Compact fmt subscriber (or JSON with `json = true`), filtered by
/// `CRISIS_LOG`, then `RUST_LOG`. Safe to call more than once.
pub fn init_tracing(json: bool) {
    let filter = std::env::var(ENV_LOG_FILTER)
        .ok()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

pub(crate) fn record_directive(d: Directive) {
    counter!("crisis_directive_total", "directive" => d.action_name()).increment(1);
}

pub(crate) fn record_band(band: ConfidenceBand) {
    counter!("crisis_location_resolution_total", "band" => band.as_str()).increment(1);
}

pub(crate) fn record_manual_fallback() {
    counter!("crisis_location_manual_fallback_total").increment(1);
}

pub(crate) fn record_escalation() {
    counter!("crisis_escalation_total").increment(1);
}
