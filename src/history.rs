// src/history.rs
//! Event History: append-only, chronologically ordered conversation log.
//!
//! Nothing is ever removed or reordered. Readers look at a bounded recent suffix,
//! usually clipped to the current emergency cycle (everything after the latest
//! cycle marker).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SlotError;
use crate::slots::{SlotMutation, Slots};
use crate::turn::Entity;

/// Action recorded whenever a new emergency cycle opens.
pub const CYCLE_MARKER: &str = "action_reset_emergency_slots";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    UserMessage {
        text: String,
        intent: String,
        confidence: f64,
        #[serde(default)]
        entities: Vec<Entity>,
        ts: DateTime<Utc>,
    },
    BotMessage {
        text: String,
        ts: DateTime<Utc>,
    },
    ActionInvoked {
        name: String,
        ts: DateTime<Utc>,
    },
    SlotMutation {
        name: String,
        value: serde_json::Value,
        ts: DateTime<Utc>,
    },
}

impl Event {
    pub fn user(text: &str, intent: &str, confidence: f64, entities: Vec<Entity>) -> Self {
        Event::UserMessage {
            text: text.to_string(),
            intent: intent.to_string(),
            confidence,
            entities,
            ts: Utc::now(),
        }
    }

    pub fn bot(text: &str) -> Self {
        Event::BotMessage {
            text: text.to_string(),
            ts: Utc::now(),
        }
    }

    pub fn action(name: &str) -> Self {
        Event::ActionInvoked {
            name: name.to_string(),
            ts: Utc::now(),
        }
    }

    pub fn slot(m: &SlotMutation) -> Self {
        Event::SlotMutation {
            name: m.slot.as_str().to_string(),
            value: m.value.to_json(),
            ts: Utc::now(),
        }
    }

    pub fn cycle_marker() -> Self {
        Self::action(CYCLE_MARKER)
    }

    pub fn is_cycle_marker(&self) -> bool {
        matches!(self, Event::ActionInvoked { name, .. } if name == CYCLE_MARKER)
    }

    pub fn ts(&self) -> DateTime<Utc> {
        match self {
            Event::UserMessage { ts, .. }
            | Event::BotMessage { ts, .. }
            | Event::ActionInvoked { ts, .. }
            | Event::SlotMutation { ts, .. } => *ts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, e: Event) {
        self.events.push(e);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Event> {
        self.events.iter()
    }

    /// Last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(n);
        &self.events[start..]
    }

    fn cycle_start(&self) -> usize {
        self.events
            .iter()
            .rposition(Event::is_cycle_marker)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Everything after the latest cycle marker.
    pub fn current_cycle(&self) -> impl DoubleEndedIterator<Item = &Event> {
        self.events[self.cycle_start()..].iter()
    }

    /// Last `window` entries, clipped to the current cycle.
    pub fn recent_in_cycle(&self, window: usize) -> &[Event] {
        let start = self
            .cycle_start()
            .max(self.events.len().saturating_sub(window));
        &self.events[start..]
    }

    /// Was `action` invoked in the recent suffix of the current cycle?
    pub fn action_in_cycle(&self, action: &str, window: usize) -> bool {
        self.recent_in_cycle(window)
            .iter()
            .any(|e| matches!(e, Event::ActionInvoked { name, .. } if name == action))
    }

    /// Was `action` invoked anywhere in the current cycle?
    pub fn action_anywhere_in_cycle(&self, action: &str) -> bool {
        self.current_cycle()
            .any(|e| matches!(e, Event::ActionInvoked { name, .. } if name == action))
    }

    /// Did a bot message in the recent suffix of the current cycle contain any
    /// of `phrases` (case-insensitive)?
    pub fn bot_said_recently(&self, phrases: &[&str], window: usize) -> bool {
        self.recent_in_cycle(window).iter().any(|e| match e {
            Event::BotMessage { text, .. } => {
                let t = text.to_lowercase();
                phrases.iter().any(|p| t.contains(p))
            }
            _ => false,
        })
    }

    pub fn last_bot_text(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|e| match e {
            Event::BotMessage { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Rebuild slots by replaying recorded slot mutations from session start.
    /// Consecutive mutation entries form one atomic batch; a batch recorded
    /// after a cycle marker (and before the next user message) may clear the
    /// escalation flag.
    pub fn replay_slots(&self) -> Result<Slots, SlotError> {
        let mut slots = Slots::default();
        let mut batch: Vec<SlotMutation> = Vec::new();
        let mut opens_cycle = false;
        for e in &self.events {
            if let Event::SlotMutation { name, value, .. } = e {
                batch.push(SlotMutation::from_raw(name, value)?);
                continue;
            }
            if !batch.is_empty() {
                slots.apply(&batch, opens_cycle)?;
                batch.clear();
            }
            match e {
                Event::UserMessage { .. } => opens_cycle = false,
                _ if e.is_cycle_marker() => opens_cycle = true,
                _ => {}
            }
        }
        if !batch.is_empty() {
            slots.apply(&batch, opens_cycle)?;
        }
        Ok(slots)
    }
}
