// src/error.rs
//! Contract-violation errors.
//!
//! Expected domain conditions (unresolvable location, unclear status, GPS outside
//! the service area) are plain values and never show up here. These enums only
//! describe defects in what the caller handed us.

use thiserror::Error;

use crate::slots::SlotName;

/// A slot mutation batch that cannot be applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SlotError {
    #[error("unknown slot `{0}`")]
    UnknownSlot(String),

    #[error("slot `{slot}` does not accept {got}")]
    WrongType { slot: SlotName, got: &'static str },

    #[error("slot `{slot}` has invalid value `{value}`")]
    InvalidValue { slot: SlotName, value: String },

    #[error("location_validated=true requires a district")]
    ValidatedWithoutDistrict,

    #[error("escalation_required can only be cleared by a new emergency cycle")]
    EscalationCleared,
}

/// A turn the engine refuses to evaluate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecisionError {
    #[error("intent confidence must be a finite value in [0, 1], got {0}")]
    BadConfidence(f64),

    #[error("intent name is empty")]
    EmptyIntent,

    #[error(transparent)]
    Slot(#[from] SlotError),
}

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown fallback district `{0}`")]
    UnknownFallbackDistrict(String),

    #[error("invalid value `{value}` in env var {var}")]
    BadEnvValue { var: &'static str, value: String },
}
