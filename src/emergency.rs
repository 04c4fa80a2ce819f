// src/emergency.rs
//! Emergency category and how the current one is determined.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::history::{Event, EventLog};
use crate::slots::Slots;
use crate::turn::Intent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyType {
    Earthquake,
    Flood,
    Fire,
}

impl EmergencyType {
    /// Lenient parse for entity values; `wildfire` counts as fire.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "earthquake" => Some(EmergencyType::Earthquake),
            "flood" | "flooding" => Some(EmergencyType::Flood),
            "fire" | "wildfire" => Some(EmergencyType::Fire),
            _ => None,
        }
    }

    pub fn from_intent(intent: &Intent) -> Option<Self> {
        match intent {
            Intent::ReportEarthquake => Some(EmergencyType::Earthquake),
            Intent::ReportFlood => Some(EmergencyType::Flood),
            Intent::ReportFire => Some(EmergencyType::Fire),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmergencyType::Earthquake => "earthquake",
            EmergencyType::Flood => "flood",
            EmergencyType::Fire => "fire",
        }
    }
}

impl fmt::Display for EmergencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slot value if set, otherwise the latest report intent or `emergency_type`
/// entity among user messages of the current emergency cycle.
pub fn current_emergency_type(slots: &Slots, history: &EventLog) -> Option<EmergencyType> {
    if let Some(t) = slots.emergency_type {
        return Some(t);
    }
    history.current_cycle().rev().find_map(|e| match e {
        Event::UserMessage {
            intent, entities, ..
        } => EmergencyType::from_intent(&Intent::parse(intent)).or_else(|| {
            entities
                .iter()
                .filter(|en| en.entity == "emergency_type")
                .find_map(|en| EmergencyType::parse(&en.value))
        }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::Entity;

    #[test]
    fn wildfire_is_fire() {
        assert_eq!(EmergencyType::parse("Wildfire"), Some(EmergencyType::Fire));
        assert_eq!(EmergencyType::parse("tornado"), None);
    }

    #[test]
    fn slot_wins_over_history() {
        let mut log = EventLog::new();
        log.push(Event::user("help", "report_fire", 0.9, vec![]));
        let slots = Slots {
            emergency_type: Some(EmergencyType::Flood),
            ..Default::default()
        };
        assert_eq!(current_emergency_type(&slots, &log), Some(EmergencyType::Flood));
    }

    #[test]
    fn falls_back_to_latest_report_in_cycle() {
        let mut log = EventLog::new();
        log.push(Event::user("quake", "report_earthquake", 0.9, vec![]));
        log.push(Event::user(
            "there is a wildfire",
            "report_emergency",
            0.8,
            vec![Entity::new("emergency_type", "wildfire")],
        ));
        assert_eq!(
            current_emergency_type(&Slots::default(), &log),
            Some(EmergencyType::Fire)
        );
    }

    #[test]
    fn earlier_cycles_are_ignored() {
        let mut log = EventLog::new();
        log.push(Event::user("quake", "report_earthquake", 0.9, vec![]));
        log.push(Event::cycle_marker());
        assert_eq!(current_emergency_type(&Slots::default(), &log), None);
    }
}
