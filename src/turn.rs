// src/turn.rs
//! Inbound turn as delivered by the NLU collaborator and the transport.

use serde::{Deserialize, Serialize};

/// Intent names the engine reacts to. Anything else is carried through as
/// `Other` and ends up as a no-op turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Intent {
    Greet,
    ReportEarthquake,
    ReportFlood,
    ReportFire,
    /// Generic report; the emergency type comes from an entity.
    ReportEmergency,
    StartNewReport,
    InformLocation,
    ShareGpsLocation,
    ReportSafe,
    ReportInjured,
    ReportTrapped,
    InformStatus,
    Affirm,
    Deny,
    RequestShelter,
    RequestInstructions,
    EscalateEmergency,
    NluFallback,
    Other(String),
}

impl Intent {
    pub fn parse(name: &str) -> Self {
        match name.trim().trim_start_matches('/') {
            "greet" => Intent::Greet,
            "report_earthquake" => Intent::ReportEarthquake,
            "report_flood" => Intent::ReportFlood,
            "report_fire" => Intent::ReportFire,
            "report_emergency" => Intent::ReportEmergency,
            "start_new_report" => Intent::StartNewReport,
            "inform_location" => Intent::InformLocation,
            "share_gps_location" => Intent::ShareGpsLocation,
            "report_safe" => Intent::ReportSafe,
            "report_injured" => Intent::ReportInjured,
            "report_trapped" => Intent::ReportTrapped,
            "inform_status" => Intent::InformStatus,
            "affirm" => Intent::Affirm,
            "deny" => Intent::Deny,
            "request_shelter" => Intent::RequestShelter,
            "request_instructions" => Intent::RequestInstructions,
            "escalate_emergency" => Intent::EscalateEmergency,
            "nlu_fallback" => Intent::NluFallback,
            other => Intent::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Intent::Greet => "greet",
            Intent::ReportEarthquake => "report_earthquake",
            Intent::ReportFlood => "report_flood",
            Intent::ReportFire => "report_fire",
            Intent::ReportEmergency => "report_emergency",
            Intent::StartNewReport => "start_new_report",
            Intent::InformLocation => "inform_location",
            Intent::ShareGpsLocation => "share_gps_location",
            Intent::ReportSafe => "report_safe",
            Intent::ReportInjured => "report_injured",
            Intent::ReportTrapped => "report_trapped",
            Intent::InformStatus => "inform_status",
            Intent::Affirm => "affirm",
            Intent::Deny => "deny",
            Intent::RequestShelter => "request_shelter",
            Intent::RequestInstructions => "request_instructions",
            Intent::EscalateEmergency => "escalate_emergency",
            Intent::NluFallback => "nlu_fallback",
            Intent::Other(s) => s.as_str(),
        }
    }

    pub fn is_location(&self) -> bool {
        matches!(self, Intent::InformLocation | Intent::ShareGpsLocation)
    }

    /// Intents that report a status without needing context.
    pub fn is_direct_status(&self) -> bool {
        matches!(
            self,
            Intent::ReportSafe | Intent::ReportInjured | Intent::ReportTrapped
        )
    }

    /// Intents that may carry a status answer when one is pending.
    pub fn may_answer_status(&self) -> bool {
        self.is_direct_status()
            || matches!(
                self,
                Intent::InformStatus | Intent::Affirm | Intent::Deny | Intent::NluFallback
            )
    }
}

impl From<String> for Intent {
    fn from(s: String) -> Self {
        Intent::parse(&s)
    }
}

impl From<Intent> for String {
    fn from(i: Intent) -> Self {
        i.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentRanking {
    pub name: Intent,
    #[serde(default = "full_confidence")]
    pub confidence: f64,
}

fn full_confidence() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub entity: String,
    pub value: String,
}

impl Entity {
    pub fn new(entity: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_coords: Option<Coordinates>,
}

/// Reverse-geocode fields, already fetched by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeocodedAddress {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub suburb: Option<String>,
    #[serde(default)]
    pub neighbourhood: Option<String>,
    #[serde(default)]
    pub city_district: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
}

impl GeocodedAddress {
    pub fn city_or_town(&self) -> Option<&str> {
        non_empty(&self.city).or_else(|| non_empty(&self.town))
    }

    pub fn suburb_like(&self) -> Option<&str> {
        non_empty(&self.suburb)
            .or_else(|| non_empty(&self.neighbourhood))
            .or_else(|| non_empty(&self.city_district))
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.trim().is_empty())
}

/// One inbound user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default)]
    pub text: String,
    pub intent: IntentRanking,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub metadata: TurnMetadata,
    /// Present only when coordinates were shared and the lookup succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geocode: Option<GeocodedAddress>,
}

impl Turn {
    pub fn new(text: impl Into<String>, intent: &str, confidence: f64) -> Self {
        Self {
            text: text.into(),
            intent: IntentRanking {
                name: Intent::parse(intent),
                confidence,
            },
            entities: Vec::new(),
            metadata: TurnMetadata::default(),
            geocode: None,
        }
    }

    pub fn with_entity(mut self, entity: &str, value: &str) -> Self {
        self.entities.push(Entity::new(entity, value));
        self
    }

    pub fn with_gps(mut self, coords: Coordinates, geocode: Option<GeocodedAddress>) -> Self {
        self.metadata.location_coords = Some(coords);
        self.geocode = geocode;
        self
    }

    pub fn entity(&self, kind: &str) -> Option<&str> {
        self.entities
            .iter()
            .find(|e| e.entity == kind)
            .map(|e| e.value.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn has_location_entity(&self) -> bool {
        self.entity("district").is_some() || self.entity("postcode").is_some()
    }

    /// Intent with button payloads (`/report_flood`) recognised and
    /// low-confidence classifications demoted to `nlu_fallback`.
    pub fn effective_intent(&self, fallback_threshold: f64) -> Intent {
        let text = self.text.trim();
        if let Some(payload) = text.strip_prefix('/') {
            let parsed = Intent::parse(payload);
            if !matches!(parsed, Intent::Other(_)) {
                return parsed;
            }
        }
        if self.intent.confidence < fallback_threshold {
            return Intent::NluFallback;
        }
        self.intent.name.clone()
    }
}
