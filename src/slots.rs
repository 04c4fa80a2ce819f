// src/slots.rs
//! Slot Store: the typed facts accumulated in one conversation.
//!
//! Mutations are applied all-or-nothing: a batch is applied to a copy, the
//! invariants are checked, and only then does the copy replace the live slots.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, str::FromStr};

use crate::emergency::EmergencyType;
use crate::error::SlotError;
use crate::location::District;
use crate::status::StatusLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    District,
    Postcode,
    EmergencyType,
    InjuryStatus,
    LocationValidated,
    LocationRetryCount,
    StatusAsked,
    InstructionsProvided,
    SheltersShown,
    EscalationRequired,
}

impl SlotName {
    pub const ALL: [SlotName; 10] = [
        SlotName::District,
        SlotName::Postcode,
        SlotName::EmergencyType,
        SlotName::InjuryStatus,
        SlotName::LocationValidated,
        SlotName::LocationRetryCount,
        SlotName::StatusAsked,
        SlotName::InstructionsProvided,
        SlotName::SheltersShown,
        SlotName::EscalationRequired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SlotName::District => "district",
            SlotName::Postcode => "postcode",
            SlotName::EmergencyType => "emergency_type",
            SlotName::InjuryStatus => "injury_status",
            SlotName::LocationValidated => "location_validated",
            SlotName::LocationRetryCount => "location_retry_count",
            SlotName::StatusAsked => "status_asked",
            SlotName::InstructionsProvided => "instructions_provided",
            SlotName::SheltersShown => "shelters_shown",
            SlotName::EscalationRequired => "escalation_required",
        }
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotName {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SlotName::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| SlotError::UnknownSlot(s.to_string()))
    }
}

/// A slot value. Serialises to plain JSON (`null`, `true`, `3`, `"Mitte"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SlotValue {
    Null,
    Bool(bool),
    Count(u32),
    Postcode(String),
    District(District),
    Emergency(EmergencyType),
    Status(StatusLabel),
}

impl SlotValue {
    fn kind(&self) -> &'static str {
        match self {
            SlotValue::Null => "null",
            SlotValue::Bool(_) => "a bool",
            SlotValue::Count(_) => "a count",
            SlotValue::Postcode(_) => "a postcode",
            SlotValue::District(_) => "a district",
            SlotValue::Emergency(_) => "an emergency type",
            SlotValue::Status(_) => "a status label",
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            SlotValue::Null => Value::Null,
            SlotValue::Bool(b) => Value::Bool(*b),
            SlotValue::Count(n) => Value::from(*n),
            SlotValue::Postcode(p) => Value::String(p.clone()),
            SlotValue::District(d) => Value::String(d.name().to_string()),
            SlotValue::Emergency(e) => Value::String(e.as_str().to_string()),
            SlotValue::Status(s) => Value::String(s.as_str().to_string()),
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

fn is_postcode(s: &str) -> bool {
    s.len() == 5 && s.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotMutation {
    pub slot: SlotName,
    pub value: SlotValue,
}

impl SlotMutation {
    pub fn new(slot: SlotName, value: SlotValue) -> Self {
        Self { slot, value }
    }

    pub fn flag(slot: SlotName, on: bool) -> Self {
        Self::new(slot, SlotValue::Bool(on))
    }

    /// Parse a `{name, value}` pair coming from outside (persisted events,
    /// caller-supplied batches). Unknown names and ill-typed values are defects.
    pub fn from_raw(name: &str, value: &Value) -> Result<Self, SlotError> {
        let slot: SlotName = name.parse()?;
        let bad = || SlotError::InvalidValue {
            slot,
            value: value.to_string(),
        };
        let wrong = |got: &'static str| SlotError::WrongType { slot, got };

        let parsed = match (slot, value) {
            (_, Value::Null) => SlotValue::Null,
            (
                SlotName::LocationValidated
                | SlotName::StatusAsked
                | SlotName::InstructionsProvided
                | SlotName::SheltersShown
                | SlotName::EscalationRequired,
                Value::Bool(b),
            ) => SlotValue::Bool(*b),
            (SlotName::LocationRetryCount, Value::Number(n)) => {
                let n = n.as_u64().and_then(|n| u32::try_from(n).ok()).ok_or_else(bad)?;
                SlotValue::Count(n)
            }
            (SlotName::District, Value::String(s)) => {
                SlotValue::District(s.parse().map_err(|_| bad())?)
            }
            (SlotName::Postcode, Value::String(s)) => SlotValue::Postcode(s.clone()),
            (SlotName::EmergencyType, Value::String(s)) => {
                SlotValue::Emergency(EmergencyType::parse(s).ok_or_else(bad)?)
            }
            (SlotName::InjuryStatus, Value::String(s)) => {
                SlotValue::Status(StatusLabel::parse(s).ok_or_else(bad)?)
            }
            (_, Value::Bool(_)) => return Err(wrong("a bool")),
            (_, Value::Number(_)) => return Err(wrong("a number")),
            (_, Value::String(_)) => return Err(wrong("a string")),
            (_, Value::Array(_)) => return Err(wrong("an array")),
            (_, Value::Object(_)) => return Err(wrong("an object")),
        };
        Ok(Self::new(slot, parsed))
    }
}

/// Per-session slots. `Default` is the session-start state: nothing known,
/// every flag false, no retries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Slots {
    pub district: Option<District>,
    pub postcode: Option<String>,
    pub emergency_type: Option<EmergencyType>,
    pub injury_status: Option<StatusLabel>,
    pub location_validated: bool,
    pub location_retry_count: u32,
    pub status_asked: bool,
    pub instructions_provided: bool,
    pub shelters_shown: bool,
    pub escalation_required: bool,
}

impl Slots {
    pub fn get(&self, slot: SlotName) -> SlotValue {
        fn opt<T>(v: Option<T>, f: impl FnOnce(T) -> SlotValue) -> SlotValue {
            v.map(f).unwrap_or(SlotValue::Null)
        }
        match slot {
            SlotName::District => opt(self.district, SlotValue::District),
            SlotName::Postcode => opt(self.postcode.clone(), SlotValue::Postcode),
            SlotName::EmergencyType => opt(self.emergency_type, SlotValue::Emergency),
            SlotName::InjuryStatus => opt(self.injury_status, SlotValue::Status),
            SlotName::LocationValidated => SlotValue::Bool(self.location_validated),
            SlotName::LocationRetryCount => SlotValue::Count(self.location_retry_count),
            SlotName::StatusAsked => SlotValue::Bool(self.status_asked),
            SlotName::InstructionsProvided => SlotValue::Bool(self.instructions_provided),
            SlotName::SheltersShown => SlotValue::Bool(self.shelters_shown),
            SlotName::EscalationRequired => SlotValue::Bool(self.escalation_required),
        }
    }

    /// Type-checked single write. `null` on a flag or counter means its default.
    fn set(&mut self, m: &SlotMutation) -> Result<(), SlotError> {
        let wrong = || SlotError::WrongType {
            slot: m.slot,
            got: m.value.kind(),
        };
        match (m.slot, &m.value) {
            (SlotName::District, SlotValue::Null) => self.district = None,
            (SlotName::District, SlotValue::District(d)) => self.district = Some(*d),
            (SlotName::Postcode, SlotValue::Null) => self.postcode = None,
            (SlotName::Postcode, SlotValue::Postcode(p)) => {
                if !is_postcode(p) {
                    return Err(SlotError::InvalidValue {
                        slot: m.slot,
                        value: p.clone(),
                    });
                }
                self.postcode = Some(p.clone());
            }
            (SlotName::EmergencyType, SlotValue::Null) => self.emergency_type = None,
            (SlotName::EmergencyType, SlotValue::Emergency(e)) => self.emergency_type = Some(*e),
            (SlotName::InjuryStatus, SlotValue::Null) => self.injury_status = None,
            (SlotName::InjuryStatus, SlotValue::Status(s)) => self.injury_status = Some(*s),
            (SlotName::LocationRetryCount, SlotValue::Null) => self.location_retry_count = 0,
            (SlotName::LocationRetryCount, SlotValue::Count(n)) => self.location_retry_count = *n,
            (flag, SlotValue::Null) => *self.flag_mut(flag).ok_or_else(wrong)? = false,
            (flag, SlotValue::Bool(b)) => *self.flag_mut(flag).ok_or_else(wrong)? = *b,
            _ => return Err(wrong()),
        }
        Ok(())
    }

    fn flag_mut(&mut self, slot: SlotName) -> Option<&mut bool> {
        match slot {
            SlotName::LocationValidated => Some(&mut self.location_validated),
            SlotName::StatusAsked => Some(&mut self.status_asked),
            SlotName::InstructionsProvided => Some(&mut self.instructions_provided),
            SlotName::SheltersShown => Some(&mut self.shelters_shown),
            SlotName::EscalationRequired => Some(&mut self.escalation_required),
            _ => None,
        }
    }

    /// Structural invariants of a slot set taken on its own.
    pub fn check(&self) -> Result<(), SlotError> {
        if self.location_validated && self.district.is_none() {
            return Err(SlotError::ValidatedWithoutDistrict);
        }
        if let Some(p) = &self.postcode {
            if !is_postcode(p) {
                return Err(SlotError::InvalidValue {
                    slot: SlotName::Postcode,
                    value: p.clone(),
                });
            }
        }
        Ok(())
    }

    /// Apply a batch atomically. `opens_cycle` is the only permission to clear
    /// `escalation_required`; on error `self` is left untouched.
    pub fn apply(&mut self, batch: &[SlotMutation], opens_cycle: bool) -> Result<(), SlotError> {
        let mut next = self.clone();
        for m in batch {
            next.set(m)?;
        }
        if self.escalation_required && !next.escalation_required && !opens_cycle {
            return Err(SlotError::EscalationCleared);
        }
        next.check()?;
        *self = next;
        Ok(())
    }

    /// Drop the mutations that would not change anything.
    pub fn changes_only(&self, batch: Vec<SlotMutation>) -> Vec<SlotMutation> {
        batch
            .into_iter()
            .filter(|m| self.get(m.slot) != m.value)
            .collect()
    }

    /// New emergency report: per-cycle flags and status cleared, type set,
    /// location untouched.
    pub fn cycle_reset_mutations(emergency: EmergencyType) -> Vec<SlotMutation> {
        vec![
            SlotMutation::new(SlotName::EmergencyType, SlotValue::Emergency(emergency)),
            SlotMutation::new(SlotName::InjuryStatus, SlotValue::Null),
            SlotMutation::flag(SlotName::StatusAsked, false),
            SlotMutation::flag(SlotName::InstructionsProvided, false),
            SlotMutation::flag(SlotName::SheltersShown, false),
            SlotMutation::flag(SlotName::EscalationRequired, false),
        ]
    }

    /// Brand-new report: back to the session-start state, location included.
    pub fn session_reset_mutations() -> Vec<SlotMutation> {
        let blank = Slots::default();
        SlotName::ALL
            .into_iter()
            .map(|n| SlotMutation::new(n, blank.get(n)))
            .collect()
    }

    pub fn location_known(&self) -> bool {
        self.location_validated && self.district.is_some()
    }

    /// A definite status answer (not unclear) is recorded.
    pub fn status_answered(&self) -> bool {
        self.injury_status.is_some_and(StatusLabel::is_answer)
    }

    /// Status question posed, no definite answer yet.
    pub fn status_pending(&self) -> bool {
        self.status_asked && !self.status_answered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slot_names_parse_and_reject_unknown() {
        assert_eq!("shelters_shown".parse::<SlotName>(), Ok(SlotName::SheltersShown));
        assert_eq!(
            "shelter_shown".parse::<SlotName>(),
            Err(SlotError::UnknownSlot("shelter_shown".into()))
        );
    }

    #[test]
    fn raw_mutations_are_type_checked() {
        let m = SlotMutation::from_raw("district", &json!("neukölln")).unwrap();
        assert_eq!(m.value, SlotValue::District(District::Neukoelln));
        assert!(matches!(
            SlotMutation::from_raw("status_asked", &json!("yes")),
            Err(SlotError::WrongType { .. })
        ));
        assert!(matches!(
            SlotMutation::from_raw("injury_status", &json!("dizzy")),
            Err(SlotError::InvalidValue { .. })
        ));
    }

    #[test]
    fn failed_batch_leaves_slots_untouched() {
        let mut s = Slots::default();
        let before = s.clone();
        let batch = vec![
            SlotMutation::new(SlotName::District, SlotValue::District(District::Mitte)),
            SlotMutation::new(SlotName::Postcode, SlotValue::Postcode("1011".into())),
        ];
        assert!(s.apply(&batch, false).is_err());
        assert_eq!(s, before);
    }

    #[test]
    fn validated_requires_district() {
        let mut s = Slots::default();
        let err = s
            .apply(&[SlotMutation::flag(SlotName::LocationValidated, true)], false)
            .unwrap_err();
        assert_eq!(err, SlotError::ValidatedWithoutDistrict);
        assert!(!s.location_validated);
    }

    #[test]
    fn escalation_only_clears_with_new_cycle() {
        let mut s = Slots {
            escalation_required: true,
            ..Default::default()
        };
        let clear = [SlotMutation::flag(SlotName::EscalationRequired, false)];
        assert_eq!(s.apply(&clear, false), Err(SlotError::EscalationCleared));
        assert!(s.escalation_required);

        s.apply(&Slots::cycle_reset_mutations(EmergencyType::Fire), true)
            .unwrap();
        assert!(!s.escalation_required);
        assert_eq!(s.emergency_type, Some(EmergencyType::Fire));
    }

    #[test]
    fn cycle_reset_keeps_location() {
        let mut s = Slots {
            district: Some(District::Pankow),
            location_validated: true,
            shelters_shown: true,
            status_asked: true,
            ..Default::default()
        };
        s.apply(&Slots::cycle_reset_mutations(EmergencyType::Flood), true)
            .unwrap();
        assert_eq!(s.district, Some(District::Pankow));
        assert!(s.location_validated);
        assert!(!s.shelters_shown && !s.status_asked);
    }

    #[test]
    fn session_reset_restores_defaults() {
        let mut s = Slots {
            district: Some(District::Wedding),
            postcode: Some("13347".into()),
            location_validated: true,
            location_retry_count: 2,
            escalation_required: true,
            ..Default::default()
        };
        s.apply(&Slots::session_reset_mutations(), true).unwrap();
        assert_eq!(s, Slots::default());
    }

    #[test]
    fn changes_only_drops_noops() {
        let s = Slots {
            status_asked: true,
            ..Default::default()
        };
        let kept = s.changes_only(vec![
            SlotMutation::flag(SlotName::StatusAsked, true),
            SlotMutation::flag(SlotName::SheltersShown, true),
        ]);
        assert_eq!(kept, vec![SlotMutation::flag(SlotName::SheltersShown, true)]);
    }

    #[test]
    fn status_pending_tracks_unclear() {
        let mut s = Slots {
            status_asked: true,
            ..Default::default()
        };
        assert!(s.status_pending());
        s.injury_status = Some(StatusLabel::Unclear);
        assert!(s.status_pending());
        s.injury_status = Some(StatusLabel::Safe);
        assert!(!s.status_pending());
    }

    #[test]
    fn values_serialise_as_plain_json() {
        let m = SlotMutation::new(SlotName::District, SlotValue::District(District::Koepenick));
        assert_eq!(
            serde_json::to_value(&m).unwrap(),
            json!({"slot": "district", "value": "Köpenick"})
        );
        assert_eq!(SlotValue::Null.to_json(), Value::Null);
    }
}
