// src/session.rs
//! Versioned conversation state and per-session serialization.
//!
//! A `Session` owns one Slot Store + Event History pair. `handle_turn` evaluates
//! the engine against the committed state, builds the next state on copies and
//! swaps it in only when everything succeeded, so a rejected turn leaves slots,
//! history and version exactly as they were.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::decision::TurnDecision;
use crate::engine::DecisionEngine;
use crate::error::{DecisionError, SlotError};
use crate::history::{Event, EventLog};
use crate::slots::Slots;
use crate::turn::Turn;

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: String,
    slots: Slots,
    history: EventLog,
    version: u64,
}

impl Session {
    /// Session start: every slot null/false/0, empty history.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            slots: Slots::default(),
            history: EventLog::new(),
            version: 0,
        }
    }

    /// Rebuild from a persisted history by replaying its slot mutations. The
    /// version counts committed turns and bot messages, as a live session does.
    pub fn restore(id: impl Into<String>, history: EventLog) -> Result<Self, SlotError> {
        let slots = history.replay_slots()?;
        let version = history
            .iter()
            .filter(|e| matches!(e, Event::UserMessage { .. } | Event::BotMessage { .. }))
            .count() as u64;
        Ok(Self {
            id: id.into(),
            slots,
            history,
            version,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    pub fn history(&self) -> &EventLog {
        &self.history
    }

    /// Bumped on every committed change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Record text the formatting layer sent to the user.
    pub fn record_bot_message(&mut self, text: &str) {
        self.history.push(Event::bot(text));
        self.version += 1;
    }

    /// Evaluate and commit one user turn.
    ///
    /// Appends, in order: the user message, the cycle marker (if the turn opens
    /// a cycle), one entry per slot mutation, and the directive's action.
    pub fn handle_turn(
        &mut self,
        engine: &DecisionEngine,
        turn: &Turn,
    ) -> Result<TurnDecision, DecisionError> {
        let decision = engine.decide(&self.slots, &self.history, turn)?;

        let mut slots = self.slots.clone();
        slots.apply(&decision.mutations, decision.opens_cycle)?;

        let mut history = self.history.clone();
        history.push(Event::user(
            &turn.text,
            decision.intent.as_str(),
            turn.intent.confidence,
            turn.entities.clone(),
        ));
        if decision.opens_cycle {
            history.push(Event::cycle_marker());
        }
        for m in &decision.mutations {
            history.push(Event::slot(m));
        }
        if let Some(d) = decision.directive {
            history.push(Event::action(d.action_name()));
        }

        self.slots = slots;
        self.history = history;
        self.version += 1;
        debug!(
            target: "crisis::session",
            session = %self.id, version = self.version, events = self.history.len(),
            "turn committed"
        );
        Ok(decision)
    }
}

/// Hands out one lock per session id: turns of the same session run one at a
/// time, different sessions never contend beyond the map lookup.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Mutex<Session>>>>,
}

/// A poisoned lock still holds a consistent session (state is only ever
/// replaced wholesale), so it is recovered rather than propagated.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, id: &str) -> Arc<Mutex<Session>> {
        let mut map = lock(&self.sessions);
        map.entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(id))))
            .clone()
    }

    /// Session end: drop the state. Returns it for callers that persist it.
    pub fn end(&self, id: &str) -> Option<Session> {
        let handle = lock(&self.sessions).remove(id)?;
        let session = lock(&*handle).clone();
        Some(session)
    }

    pub fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialized turn handling for `id`.
    pub fn handle_turn(
        &self,
        id: &str,
        engine: &DecisionEngine,
        turn: &Turn,
    ) -> Result<TurnDecision, DecisionError> {
        let handle = self.session(id);
        let mut session = lock(&*handle);
        session.handle_turn(engine, turn)
    }
}
