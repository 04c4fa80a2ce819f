// src/lib.rs
// Decision core of a crisis-response conversational agent.
// Transport, NLU, reverse geocoding and rendering live outside this crate.

pub mod config;
pub mod decision;
pub mod emergency;
pub mod engine;
pub mod error;
pub mod history;
pub mod location;
pub mod retry;
pub mod session;
pub mod slots;
pub mod status;
pub mod telemetry;
pub mod turn;

// ---- Re-exports for a stable public API ----
pub use crate::config::EngineConfig;
pub use crate::decision::{Directive, LocationReport, Reason, ReasonKind, TurnDecision};
pub use crate::emergency::EmergencyType;
pub use crate::engine::DecisionEngine;
pub use crate::error::{ConfigError, DecisionError, SlotError};
pub use crate::history::{Event, EventLog};
pub use crate::location::{
    ConfidenceBand, District, DistrictResolver, LocationInput, Rejection, Resolution,
};
pub use crate::retry::{RetryOutcome, RetryPolicy};
pub use crate::session::{Session, SessionRegistry};
pub use crate::slots::{SlotMutation, SlotName, SlotValue, Slots};
pub use crate::status::{Classification, StatusLabel};
pub use crate::turn::{Coordinates, Entity, GeocodedAddress, Intent, Turn};
