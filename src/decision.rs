// src/decision.rs
//! Engine output: slot mutations, at most one directive, and the explainability
//! trail the caller can log or render.

use serde::Serialize;
use std::fmt;

use crate::location::{ConfidenceBand, District, MatchMethod, ResolveOutcome};
use crate::retry::RetryOutcome;
use crate::slots::{SlotMutation, SlotName};
use crate::status::Classification;
use crate::turn::Intent;

/// The single next action the engine recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    AskEmergencyType,
    AskLocation,
    AskStatus,
    ClarifyStatus,
    ProvideSafetyInstructions,
    FindShelters,
    Conclude,
    /// Automated location resolution gave up; show emergency contacts.
    ManualLocationFallback,
    EscalateEmergency,
}

impl Directive {
    /// Action name as it appears in the event log.
    pub fn action_name(self) -> &'static str {
        match self {
            Directive::AskEmergencyType => "utter_ask_emergency_type",
            Directive::AskLocation => "utter_ask_location",
            Directive::AskStatus => "action_ask_status",
            Directive::ClarifyStatus => "utter_clarify_status",
            Directive::ProvideSafetyInstructions => "action_provide_safety_instructions",
            Directive::FindShelters => "action_find_shelters",
            Directive::Conclude => "action_conclude",
            Directive::ManualLocationFallback => "action_manual_location_fallback",
            Directive::EscalateEmergency => "action_escalate_emergency",
        }
    }

    /// The at-most-once flag this directive sets when emitted.
    pub fn marks(self) -> Option<SlotName> {
        match self {
            Directive::AskStatus => Some(SlotName::StatusAsked),
            Directive::ProvideSafetyInstructions => Some(SlotName::InstructionsProvided),
            Directive::FindShelters => Some(SlotName::SheltersShown),
            _ => None,
        }
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    Reset,
    Idempotency,
    Location,
    Status,
    Retry,
    Escalation,
    Routing,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reason {
    pub kind: ReasonKind,
    pub message: String,
}

/// What happened on a location turn, for wording and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationReport {
    pub band: ConfidenceBand,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<District>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<District>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<MatchMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<&'static str>,
}

impl LocationReport {
    pub fn from_outcome(outcome: &ResolveOutcome, band: ConfidenceBand) -> Self {
        match outcome {
            Ok(r) => Self {
                band,
                district: Some(r.district),
                confidence: r.confidence,
                suggestions: r.suggestions.clone(),
                method: Some(r.method),
                rejection: None,
            },
            Err(rej) => Self {
                band,
                district: None,
                confidence: rej.confidence(),
                suggestions: rej.suggestions().to_vec(),
                method: None,
                rejection: Some(rej.reason_code()),
            },
        }
    }
}

/// Result of evaluating one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnDecision {
    /// Intent after button-payload and low-confidence handling.
    pub intent: Intent,
    /// A new emergency cycle starts with this turn.
    pub opens_cycle: bool,
    pub mutations: Vec<SlotMutation>,
    pub directive: Option<Directive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<Reason>,
}

impl TurnDecision {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent,
            opens_cycle: false,
            mutations: Vec::new(),
            directive: None,
            location: None,
            status: None,
            retry: None,
            reasons: Vec::new(),
        }
    }

    /// No mutation and no directive.
    pub fn is_noop(&self) -> bool {
        self.mutations.is_empty() && self.directive.is_none()
    }

    pub fn band(&self) -> Option<ConfidenceBand> {
        self.location.as_ref().map(|l| l.band)
    }

    pub fn with_reason(mut self, kind: ReasonKind, message: impl Into<String>) -> Self {
        self.reason(kind, message);
        self
    }

    pub fn reason(&mut self, kind: ReasonKind, message: impl Into<String>) {
        self.reasons.push(Reason {
            kind,
            message: message.into(),
        });
    }

    /// Value the batch leaves in `slot`, if the batch writes it.
    pub fn written(&self, slot: SlotName) -> Option<&SlotMutation> {
        self.mutations.iter().rev().find(|m| m.slot == slot)
    }
}
