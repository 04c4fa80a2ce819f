// src/engine.rs
//! # Decision Engine
//! Pure function `(slots, history, turn)` → `TurnDecision`. No I/O, no clock
//! reads, no shared mutable state.
//!
//! Rules, first applicable governs:
//! 1. new emergency report → cycle reset, then routing (or the location step if
//!    the report names a place)
//! 2. `start_new_report` → session reset, ask emergency type
//! 3. `escalate_emergency` → escalate once
//! 4. location turn → resolve; success routes, failure goes through the retry policy.
//!    A location turn that also answers the status question stages the district
//!    and hands over to the status step.
//! 5. status turn → classify; unclear asks for clarification, anything else routes
//! 6. `request_shelter`, `request_instructions`, `greet`
//! 7. anything else is a no-op
//!
//! The `*_asked`/`*_provided`/`*_shown` flags are the source of truth for
//! at-most-once steps. A scan of the recent current-cycle history backs them up
//! and repairs the flag when the two disagree.

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::decision::{Directive, LocationReport, ReasonKind, TurnDecision};
use crate::emergency::{current_emergency_type, EmergencyType};
use crate::error::DecisionError;
use crate::history::EventLog;
use crate::location::{
    extract_postcode, ConfidenceBand, DistrictResolver, GpsFix, MatchMethod, Rejection,
    ResolveOutcome,
};
use crate::retry::RetryPolicy;
use crate::slots::{SlotMutation, SlotName, SlotValue, Slots};
use crate::status::{classify, has_status_cue, StatusLabel};
use crate::telemetry::{self, anon_hash};
use crate::turn::{Intent, Turn};

/// Bot phrases that count as having asked for the user's location.
const LOCATION_PROMPTS: &[&str] = &[
    "which district",
    "where are you",
    "your location",
    "your postcode",
    "postal code",
    "what area",
];

const ASK_LOCATION_ACTION: &str = "utter_ask_location";

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    cfg: EngineConfig,
    resolver: DistrictResolver,
    retry: RetryPolicy,
}

impl DecisionEngine {
    pub fn new(cfg: EngineConfig) -> Self {
        let resolver = DistrictResolver::new(&cfg.resolver);
        let retry = RetryPolicy::new(&cfg.retry);
        Self {
            cfg,
            resolver,
            retry,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn resolver(&self) -> &DistrictResolver {
        &self.resolver
    }

    /// Evaluate one turn. Domain outcomes (no match, unclear status, manual
    /// fallback) are part of the returned decision; `Err` means the caller
    /// handed in a malformed turn or inconsistent slots.
    pub fn decide(
        &self,
        slots: &Slots,
        history: &EventLog,
        turn: &Turn,
    ) -> Result<TurnDecision, DecisionError> {
        let confidence = turn.intent.confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(DecisionError::BadConfidence(confidence));
        }
        if turn.intent.name.as_str().trim().is_empty() {
            return Err(DecisionError::EmptyIntent);
        }
        slots.check()?;

        let intent = turn.effective_intent(self.cfg.nlu.fallback_threshold);
        let mut ev = Eval {
            engine: self,
            history,
            turn,
            id: anon_hash(&turn.text),
            slots: slots.clone(),
            out: TurnDecision::new(intent.clone()),
        };

        match &intent {
            Intent::ReportEarthquake | Intent::ReportFlood | Intent::ReportFire => {
                if let Some(t) = EmergencyType::from_intent(&intent) {
                    ev.new_emergency(t)?;
                }
            }
            Intent::ReportEmergency => {
                match turn.entity("emergency_type").and_then(EmergencyType::parse) {
                    Some(t) => ev.new_emergency(t)?,
                    None => ev.ask_emergency_type_if_unknown()?,
                }
            }
            Intent::StartNewReport => ev.start_new_report()?,
            Intent::EscalateEmergency => ev.escalate()?,
            _ if ev.is_location_turn(&intent) => {
                if ev.answers_status(&intent) {
                    ev.location_with_status_step(&intent)?
                } else {
                    ev.location_step()?
                }
            }
            _ if ev.is_status_turn(&intent) => ev.status_step(&intent)?,
            Intent::RequestShelter => ev.request_shelter()?,
            Intent::RequestInstructions => ev.request_instructions()?,
            Intent::Greet => ev.ask_emergency_type_if_unknown()?,
            other => {
                debug!(target: "crisis::engine", id = %ev.id, intent = other.as_str(), "no rule applies");
                ev.out.reason(ReasonKind::Ignored, "no rule applies");
            }
        }

        let Eval { out, id, .. } = ev;
        if let Some(d) = out.directive {
            telemetry::record_directive(d);
        }
        debug!(
            target: "crisis::engine",
            %id,
            intent = out.intent.as_str(),
            directive = ?out.directive,
            mutations = out.mutations.len(),
            "turn decided"
        );
        Ok(out)
    }
}

/// One evaluation. `slots` is a working copy that already reflects every
/// mutation staged so far, so later rules see earlier ones.
struct Eval<'a> {
    engine: &'a DecisionEngine,
    history: &'a EventLog,
    turn: &'a Turn,
    id: String,
    slots: Slots,
    out: TurnDecision,
}

impl Eval<'_> {
    fn stage(&mut self, batch: Vec<SlotMutation>) -> Result<(), DecisionError> {
        let batch = self.slots.changes_only(batch);
        if batch.is_empty() {
            return Ok(());
        }
        self.slots.apply(&batch, self.out.opens_cycle)?;
        self.out.mutations.extend(batch);
        Ok(())
    }

    /// History scans only see the current cycle; a cycle opened by this very
    /// turn has no history yet.
    fn already_ran(&self, action: &str) -> bool {
        !self.out.opens_cycle
            && self
                .history
                .action_in_cycle(action, self.engine.cfg.history.idempotency_window)
    }

    fn ran_this_cycle(&self, action: &str) -> bool {
        !self.out.opens_cycle && self.history.action_anywhere_in_cycle(action)
    }

    fn location_asked(&self) -> bool {
        let window = self.engine.cfg.history.location_window;
        !self.out.opens_cycle
            && (self.history.action_in_cycle(ASK_LOCATION_ACTION, window)
                || self.history.bot_said_recently(LOCATION_PROMPTS, window))
    }

    fn emit(&mut self, d: Directive) -> Result<(), DecisionError> {
        if let Some(flag) = d.marks() {
            if self.already_ran(d.action_name()) {
                warn!(
                    target: "crisis::engine",
                    action = d.action_name(), %flag,
                    "history shows step already ran but flag was unset, repairing"
                );
                self.stage(vec![SlotMutation::flag(flag, true)])?;
                self.out.reason(
                    ReasonKind::Idempotency,
                    format!("{} found in recent history", d.action_name()),
                );
                return Ok(());
            }
            self.stage(vec![SlotMutation::flag(flag, true)])?;
        }
        self.out.directive = Some(d);
        Ok(())
    }

    fn noop(&mut self, message: &str) {
        debug!(target: "crisis::engine", id = %self.id, note = message, "idempotent no-op");
        self.out.reason(ReasonKind::Idempotency, message);
    }

    // --- rules -------------------------------------------------------------

    fn new_emergency(&mut self, t: EmergencyType) -> Result<(), DecisionError> {
        self.out.opens_cycle = true;
        self.stage(Slots::cycle_reset_mutations(t))?;
        self.out
            .reason(ReasonKind::Reset, format!("new {t} report opens an emergency cycle"));
        info!(target: "crisis::engine", id = %self.id, emergency = %t, "new emergency cycle");

        if self.turn.has_location_entity() || extract_postcode(&self.turn.text).is_some() {
            self.location_step()
        } else {
            self.route()
        }
    }

    fn start_new_report(&mut self) -> Result<(), DecisionError> {
        self.out.opens_cycle = true;
        self.stage(Slots::session_reset_mutations())?;
        self.out
            .reason(ReasonKind::Reset, "new report: all slots back to session start");
        self.emit(Directive::AskEmergencyType)
    }

    fn escalate(&mut self) -> Result<(), DecisionError> {
        if self.slots.escalation_required {
            self.noop("escalation already recorded");
            return Ok(());
        }
        self.stage(vec![SlotMutation::flag(SlotName::EscalationRequired, true)])?;
        telemetry::record_escalation();
        info!(target: "crisis::engine", id = %self.id, "explicit escalation");
        self.out
            .reason(ReasonKind::Escalation, "user requested escalation");
        self.emit(Directive::EscalateEmergency)
    }

    fn ask_emergency_type_if_unknown(&mut self) -> Result<(), DecisionError> {
        if current_emergency_type(&self.slots, self.history).is_none() {
            self.emit(Directive::AskEmergencyType)
        } else {
            self.out.reason(ReasonKind::Ignored, "emergency type already known");
            Ok(())
        }
    }

    fn request_shelter(&mut self) -> Result<(), DecisionError> {
        if self.current_type()?.is_none() {
            return self.emit(Directive::AskEmergencyType);
        }
        if !self.slots.location_known() {
            return self.emit(Directive::AskLocation);
        }
        if self.slots.shelters_shown {
            self.noop("shelters already shown this cycle");
            return Ok(());
        }
        self.emit(Directive::FindShelters)
    }

    fn request_instructions(&mut self) -> Result<(), DecisionError> {
        if self.current_type()?.is_none() {
            return self.emit(Directive::AskEmergencyType);
        }
        if self.slots.instructions_provided {
            self.noop("instructions already provided this cycle");
            return Ok(());
        }
        self.emit(Directive::ProvideSafetyInstructions)
    }

    // --- location ----------------------------------------------------------

    fn is_location_turn(&self, intent: &Intent) -> bool {
        let turn = self.turn;
        if intent.is_location() || turn.has_location_entity() {
            return true;
        }
        let text = turn.text.trim();
        if text.is_empty() {
            return false;
        }
        // "I'm ok" while a status answer is pending is a status, not a place
        if self.slots.status_pending() && has_status_cue(text) {
            return false;
        }
        if extract_postcode(text).is_some() {
            return true;
        }
        let exact = matches!(
            self.engine.resolver.resolve_text(text),
            Ok(r) if matches!(r.method, MatchMethod::Alias | MatchMethod::CanonicalName | MatchMethod::Postcode)
        );
        if exact {
            return true;
        }
        matches!(intent, Intent::NluFallback | Intent::Other(_))
            && !self.slots.location_known()
            && self.location_asked()
    }

    /// Entity district, entity postcode, free text, GPS, then a district or
    /// postcode already in the slots but not yet validated. GPS goes first for
    /// the dedicated share intent.
    fn resolve_chain(&self) -> ResolveOutcome {
        let resolver = &self.engine.resolver;
        let turn = self.turn;
        let gps = turn.metadata.location_coords.map(|coords| GpsFix {
            coords,
            address: turn.geocode.clone(),
        });
        let is_share = matches!(self.out.intent, Intent::ShareGpsLocation);

        let mut attempts: Vec<Box<dyn Fn() -> ResolveOutcome + '_>> = Vec::new();
        if is_share {
            match &gps {
                Some(fix) => attempts.push(Box::new(move || resolver.resolve_gps(fix))),
                // the collaborator lost the fix or the lookup failed
                None => attempts.push(Box::new(|| Err(Rejection::GeocodeUnavailable))),
            }
        }
        if let Some(d) = turn.entity("district") {
            attempts.push(Box::new(move || resolver.resolve_text(d)));
        }
        if let Some(p) = turn.entity("postcode") {
            attempts.push(Box::new(move || resolver.resolve_postcode(p)));
        }
        if !is_share && !turn.text.trim().is_empty() {
            attempts.push(Box::new(move || resolver.resolve_text(&turn.text)));
        }
        if let (false, Some(fix)) = (is_share, &gps) {
            attempts.push(Box::new(move || resolver.resolve_gps(fix)));
        }
        if !self.slots.location_validated {
            if let Some(d) = self.slots.district {
                attempts.push(Box::new(move || resolver.resolve_text(d.name())));
            }
            if let Some(p) = self.slots.postcode.as_deref() {
                attempts.push(Box::new(move || resolver.resolve_postcode(p)));
            }
        }

        let mut best: ResolveOutcome = Err(Rejection::NoInput);
        for attempt in &attempts {
            match attempt() {
                Ok(r) => return Ok(r),
                Err(rej) => {
                    if more_useful(&rej, &best) {
                        best = Err(rej);
                    }
                }
            }
        }
        best
    }

    fn location_step(&mut self) -> Result<(), DecisionError> {
        match self.stage_location()? {
            None => self.route(),
            Some(why) => self.location_failure(why),
        }
    }

    /// The status answer drives the directive; an unresolved place in the same
    /// message does not count as a failed location attempt.
    fn location_with_status_step(&mut self, intent: &Intent) -> Result<(), DecisionError> {
        if let Some(why) = self.stage_location()? {
            self.out.reason(
                ReasonKind::Location,
                format!("unresolved ({why}) alongside a status answer"),
            );
        }
        self.status_step(intent)
    }

    /// Resolve and stage the district. Returns why nothing usable came out.
    fn stage_location(&mut self) -> Result<Option<String>, DecisionError> {
        let rcfg = self.engine.resolver.config();
        let outcome = self.resolve_chain();
        let band = ConfidenceBand::of(&outcome, rcfg);
        telemetry::record_band(band);
        self.out.location = Some(LocationReport::from_outcome(&outcome, band));

        let supplied_postcode = self
            .turn
            .entity("postcode")
            .or_else(|| extract_postcode(&self.turn.text))
            .filter(|p| p.len() == 5 && p.bytes().all(|b| b.is_ascii_digit()))
            .map(str::to_string);
        if let Some(p) = supplied_postcode {
            self.stage(vec![SlotMutation::new(SlotName::Postcode, SlotValue::Postcode(p))])?;
        }

        match outcome {
            Ok(r) if band.is_accepted() => {
                debug!(
                    target: "crisis::engine",
                    id = %self.id, district = %r.district, confidence = r.confidence, band = band.as_str(),
                    "location resolved"
                );
                if self.slots.location_known() && self.slots.district == Some(r.district) {
                    self.out
                        .reason(ReasonKind::Idempotency, "district unchanged");
                } else {
                    self.out.reason(
                        ReasonKind::Location,
                        format!("{} ({:.2}, {})", r.district, r.confidence, band.as_str()),
                    );
                }
                self.stage(vec![
                    SlotMutation::new(SlotName::District, SlotValue::District(r.district)),
                    SlotMutation::flag(SlotName::LocationValidated, true),
                    SlotMutation::new(SlotName::LocationRetryCount, SlotValue::Count(0)),
                ])?;
                Ok(None)
            }
            Ok(r) => Ok(Some(format!(
                "{} below confirm band ({:.2})",
                r.district, r.confidence
            ))),
            Err(rej) => Ok(Some(rej.reason_code().to_string())),
        }
    }

    fn location_failure(&mut self, why: String) -> Result<(), DecisionError> {
        if self.slots.location_known() {
            // a validated district stands; unparseable chatter does not count
            self.out.reason(
                ReasonKind::Location,
                format!("unresolved ({why}), keeping validated district"),
            );
            return Ok(());
        }

        let outcome = self
            .engine
            .retry
            .on_location_failure(self.slots.location_retry_count);
        self.stage(outcome.mutations())?;
        self.out.retry = Some(outcome);
        if outcome.escalate_to_manual {
            telemetry::record_manual_fallback();
            info!(
                target: "crisis::engine",
                id = %self.id, attempts = self.engine.retry.max_attempts(),
                "location unresolved, manual fallback"
            );
            self.out
                .reason(ReasonKind::Retry, format!("unresolved ({why}), manual fallback"));
            self.emit(Directive::ManualLocationFallback)
        } else {
            self.out.reason(
                ReasonKind::Retry,
                format!("unresolved ({why}), attempt {}", outcome.retry_count),
            );
            self.emit(Directive::AskLocation)
        }
    }

    // --- status ------------------------------------------------------------

    fn is_status_turn(&self, intent: &Intent) -> bool {
        if intent.is_direct_status() {
            return true;
        }
        if !self.slots.status_pending() {
            return false;
        }
        intent.may_answer_status()
            || (matches!(intent, Intent::Other(_)) && has_status_cue(&self.turn.text))
    }

    /// Direct status reports always answer; while the question is pending,
    /// yes/no and status-bearing text do too.
    fn answers_status(&self, intent: &Intent) -> bool {
        intent.is_direct_status()
            || (self.slots.status_pending()
                && (matches!(intent, Intent::InformStatus | Intent::Affirm | Intent::Deny)
                    || has_status_cue(&self.turn.text)))
    }

    fn status_step(&mut self, intent: &Intent) -> Result<(), DecisionError> {
        let c = classify(&self.turn.text, intent, self.history.last_bot_text());
        self.out.status = Some(c);
        debug!(
            target: "crisis::engine",
            id = %self.id, label = c.label.as_str(), cue = ?c.cue,
            "status classified"
        );

        if c.label == StatusLabel::Unclear {
            self.stage(vec![
                SlotMutation::new(SlotName::InjuryStatus, SlotValue::Status(StatusLabel::Unclear)),
                SlotMutation::flag(SlotName::StatusAsked, true),
            ])?;
            self.out
                .reason(ReasonKind::Status, "status unclear, asking again");
            return self.emit(Directive::ClarifyStatus);
        }

        if self.slots.injury_status == Some(c.label) {
            self.noop("status unchanged");
            return Ok(());
        }

        self.stage(vec![
            SlotMutation::new(SlotName::InjuryStatus, SlotValue::Status(c.label)),
            SlotMutation::flag(SlotName::StatusAsked, true),
        ])?;
        self.out
            .reason(ReasonKind::Status, format!("status {}", c.label));

        if c.label.needs_escalation() && !self.slots.escalation_required {
            self.stage(vec![SlotMutation::flag(SlotName::EscalationRequired, true)])?;
            telemetry::record_escalation();
            info!(target: "crisis::engine", id = %self.id, status = c.label.as_str(), "escalation required");
            self.out
                .reason(ReasonKind::Escalation, format!("{} reported", c.label));
        }
        self.route()
    }

    // --- routing -----------------------------------------------------------

    /// Emergency type from the slot, else from history; a history hit is
    /// written back to the slot.
    fn current_type(&mut self) -> Result<Option<EmergencyType>, DecisionError> {
        let found = current_emergency_type(&self.slots, self.history);
        if let (None, Some(t)) = (self.slots.emergency_type, found) {
            self.stage(vec![SlotMutation::new(
                SlotName::EmergencyType,
                SlotValue::Emergency(t),
            )])?;
        }
        Ok(found)
    }

    fn route(&mut self) -> Result<(), DecisionError> {
        let Some(t) = self.current_type()? else {
            return self.emit(Directive::AskEmergencyType);
        };
        if !self.slots.location_known() {
            return self.emit(Directive::AskLocation);
        }

        let next = match t {
            EmergencyType::Earthquake => match self.slots.injury_status {
                _ if !self.slots.status_asked => Some(Directive::AskStatus),
                Some(StatusLabel::Safe) => {
                    if self.ran_this_cycle(Directive::Conclude.action_name()) {
                        None
                    } else {
                        Some(Directive::Conclude)
                    }
                }
                Some(StatusLabel::Injured | StatusLabel::Trapped) if !self.slots.shelters_shown => {
                    Some(Directive::FindShelters)
                }
                _ => None,
            },
            EmergencyType::Flood | EmergencyType::Fire => {
                if !self.slots.instructions_provided {
                    Some(Directive::ProvideSafetyInstructions)
                } else if !self.slots.shelters_shown {
                    Some(Directive::FindShelters)
                } else {
                    None
                }
            }
        };

        match next {
            Some(d) => {
                self.out
                    .reason(ReasonKind::Routing, format!("{t}: next {d}"));
                self.emit(d)
            }
            None => {
                self.out
                    .reason(ReasonKind::Routing, format!("{t}: nothing left to do"));
                Ok(())
            }
        }
    }
}

/// Out-of-area beats a near miss with suggestions, which beats a bare miss,
/// which beats having had no input at all.
fn more_useful(candidate: &Rejection, current: &ResolveOutcome) -> bool {
    fn rank(r: &Rejection) -> u8 {
        match r {
            Rejection::OutsideServiceArea { .. } => 3,
            Rejection::NoMatch { suggestions, .. } if !suggestions.is_empty() => 2,
            Rejection::NoMatch { .. } | Rejection::GeocodeUnavailable => 1,
            Rejection::NoInput => 0,
        }
    }
    match current {
        Ok(_) => false,
        Err(cur) => rank(candidate) > rank(cur),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Event;
    use crate::location::District;
    use crate::turn::{Coordinates, GeocodedAddress};

    fn engine() -> DecisionEngine {
        DecisionEngine::new(EngineConfig::default())
    }

    fn located(t: EmergencyType, d: District) -> Slots {
        Slots {
            emergency_type: Some(t),
            district: Some(d),
            location_validated: true,
            ..Default::default()
        }
    }

    #[test]
    fn rejects_malformed_turns() {
        let e = engine();
        let log = EventLog::new();
        let bad = Turn::new("hi", "greet", f64::NAN);
        assert!(matches!(
            e.decide(&Slots::default(), &log, &bad),
            Err(DecisionError::BadConfidence(_))
        ));
        let empty = Turn::new("hi", "", 0.9);
        assert_eq!(
            e.decide(&Slots::default(), &log, &empty),
            Err(DecisionError::EmptyIntent)
        );
        let inconsistent = Slots {
            location_validated: true,
            ..Default::default()
        };
        assert!(matches!(
            e.decide(&inconsistent, &log, &Turn::new("hi", "greet", 0.9)),
            Err(DecisionError::Slot(_))
        ));
    }

    #[test]
    fn report_without_location_asks_for_it() {
        let d = engine()
            .decide(&Slots::default(), &EventLog::new(), &Turn::new("earthquake!", "report_earthquake", 0.95))
            .unwrap();
        assert!(d.opens_cycle);
        assert_eq!(d.directive, Some(Directive::AskLocation));
        assert!(d.mutations.contains(&SlotMutation::new(
            SlotName::EmergencyType,
            SlotValue::Emergency(EmergencyType::Earthquake)
        )));
    }

    #[test]
    fn report_with_district_entity_resolves_in_same_turn() {
        let turn = Turn::new("flood in kreuzberg", "report_flood", 0.9).with_entity("district", "kreuzberg");
        let d = engine().decide(&Slots::default(), &EventLog::new(), &turn).unwrap();
        assert_eq!(d.band(), Some(ConfidenceBand::Accepted));
        assert_eq!(d.directive, Some(Directive::ProvideSafetyInstructions));
        assert!(d
            .mutations
            .contains(&SlotMutation::flag(SlotName::InstructionsProvided, true)));
    }

    #[test]
    fn new_cycle_ignores_previous_cycle_history() {
        let mut log = EventLog::new();
        log.push(Event::action("action_ask_status"));
        let slots = Slots {
            status_asked: true,
            ..located(EmergencyType::Earthquake, District::Mitte)
        };
        let d = engine()
            .decide(&slots, &log, &Turn::new("another quake", "report_earthquake", 0.9))
            .unwrap();
        assert_eq!(d.directive, Some(Directive::AskStatus));
    }

    #[test]
    fn unclear_status_keeps_escalation_and_clarifies() {
        let slots = Slots {
            status_asked: true,
            escalation_required: true,
            ..located(EmergencyType::Earthquake, District::Spandau)
        };
        let d = engine()
            .decide(&slots, &EventLog::new(), &Turn::new("hmm dunno", "inform_status", 0.8))
            .unwrap();
        assert_eq!(d.directive, Some(Directive::ClarifyStatus));
        assert!(d.written(SlotName::EscalationRequired).is_none());
    }

    #[test]
    fn status_cue_is_not_taken_as_location() {
        let slots = Slots {
            status_asked: true,
            ..located(EmergencyType::Earthquake, District::Mitte)
        };
        let d = engine()
            .decide(&slots, &EventLog::new(), &Turn::new("I'm fine", "nlu_fallback", 0.2))
            .unwrap();
        assert!(d.location.is_none());
        assert_eq!(d.status.map(|c| c.label), Some(StatusLabel::Safe));
        assert_eq!(d.directive, Some(Directive::Conclude));
    }

    #[test]
    fn trapped_escalates_and_routes_to_shelters() {
        let slots = Slots {
            status_asked: true,
            ..located(EmergencyType::Earthquake, District::Mitte)
        };
        let d = engine()
            .decide(&slots, &EventLog::new(), &Turn::new("I'm stuck", "report_trapped", 0.9))
            .unwrap();
        assert!(d
            .mutations
            .contains(&SlotMutation::flag(SlotName::EscalationRequired, true)));
        assert_eq!(d.directive, Some(Directive::FindShelters));
    }

    #[test]
    fn affirm_after_danger_question_means_injured() {
        let mut log = EventLog::new();
        log.push(Event::bot("Are you injured or in immediate danger?"));
        let slots = Slots {
            status_asked: true,
            ..located(EmergencyType::Earthquake, District::Pankow)
        };
        let d = engine()
            .decide(&slots, &log, &Turn::new("yes", "affirm", 0.9))
            .unwrap();
        assert_eq!(d.status.map(|c| c.label), Some(StatusLabel::Injured));
    }

    #[test]
    fn free_text_after_location_prompt_goes_to_resolver() {
        let mut log = EventLog::new();
        log.push(Event::action("utter_ask_location"));
        let slots = Slots {
            emergency_type: Some(EmergencyType::Fire),
            ..Default::default()
        };
        let d = engine()
            .decide(&slots, &log, &Turn::new("somewhere near schoenberg", "nlu_fallback", 0.1))
            .unwrap();
        assert_eq!(
            d.location.as_ref().and_then(|l| l.district),
            Some(District::Schoeneberg)
        );
    }

    #[test]
    fn location_prompt_from_previous_cycle_does_not_capture_chatter() {
        let mut log = EventLog::new();
        log.push(Event::bot("Which district are you in?"));
        log.push(Event::user("start over", "start_new_report", 0.9, vec![]));
        log.push(Event::cycle_marker());
        log.push(Event::action("utter_ask_emergency_type"));
        let d = engine()
            .decide(&Slots::default(), &log, &Turn::new("whatever", "nlu_fallback", 0.1))
            .unwrap();
        assert!(d.location.is_none());
        assert!(d.retry.is_none());
        assert!(d.is_noop());
    }

    #[test]
    fn gps_outside_berlin_counts_as_failure_with_reason() {
        let turn = Turn::new("/share_gps_location", "share_gps_location", 1.0).with_gps(
            Coordinates { lat: 53.55, lng: 9.99 },
            Some(GeocodedAddress {
                city: Some("Hamburg".into()),
                ..Default::default()
            }),
        );
        let slots = Slots {
            emergency_type: Some(EmergencyType::Flood),
            ..Default::default()
        };
        let d = engine().decide(&slots, &EventLog::new(), &turn).unwrap();
        let loc = d.location.unwrap();
        assert_eq!(loc.rejection, Some("outside_service_area"));
        assert_eq!(loc.band, ConfidenceBand::Rejected);
        assert_eq!(d.directive, Some(Directive::AskLocation));
        assert_eq!(d.retry.map(|r| r.retry_count), Some(1));
    }

    #[test]
    fn gps_default_district_is_confirm_band() {
        let turn = Turn::new("/share_gps_location", "share_gps_location", 1.0).with_gps(
            Coordinates { lat: 52.5, lng: 13.4 },
            Some(GeocodedAddress {
                city: Some("Berlin".into()),
                ..Default::default()
            }),
        );
        let slots = Slots {
            emergency_type: Some(EmergencyType::Fire),
            ..Default::default()
        };
        let d = engine().decide(&slots, &EventLog::new(), &turn).unwrap();
        assert_eq!(d.band(), Some(ConfidenceBand::Confirm));
        assert_eq!(
            d.location.and_then(|l| l.method),
            Some(MatchMethod::GpsDefault)
        );
    }

    #[test]
    fn postcode_is_stored_raw() {
        let slots = Slots {
            emergency_type: Some(EmergencyType::Fire),
            ..Default::default()
        };
        let d = engine()
            .decide(&slots, &EventLog::new(), &Turn::new("we are at 12043", "inform_location", 0.9))
            .unwrap();
        assert!(d.mutations.contains(&SlotMutation::new(
            SlotName::Postcode,
            SlotValue::Postcode("12043".into())
        )));
        assert_eq!(
            d.written(SlotName::District).map(|m| &m.value),
            Some(&SlotValue::District(District::Neukoelln))
        );
    }

    #[test]
    fn history_desync_repairs_flag_instead_of_repeating() {
        let mut log = EventLog::new();
        log.push(Event::action("action_provide_safety_instructions"));
        let slots = located(EmergencyType::Fire, District::Wedding);
        let d = engine()
            .decide(&slots, &log, &Turn::new("what do I do", "request_instructions", 0.9))
            .unwrap();
        assert_eq!(d.directive, None);
        assert_eq!(
            d.mutations,
            vec![SlotMutation::flag(SlotName::InstructionsProvided, true)]
        );
    }

    #[test]
    fn explicit_escalation_once() {
        let e = engine();
        let slots = located(EmergencyType::Flood, District::Mitte);
        let first = e
            .decide(&slots, &EventLog::new(), &Turn::new("get me a human", "escalate_emergency", 0.9))
            .unwrap();
        assert_eq!(first.directive, Some(Directive::EscalateEmergency));

        let mut after = slots.clone();
        after.apply(&first.mutations, first.opens_cycle).unwrap();
        let second = e
            .decide(&after, &EventLog::new(), &Turn::new("get me a human", "escalate_emergency", 0.9))
            .unwrap();
        assert!(second.is_noop());
    }

    #[test]
    fn emergency_type_from_history_is_written_back() {
        let mut log = EventLog::new();
        log.push(Event::user("fire!", "report_fire", 0.9, vec![]));
        let slots = Slots {
            district: Some(District::Mitte),
            location_validated: true,
            ..Default::default()
        };
        let d = engine()
            .decide(&slots, &log, &Turn::new("shelters?", "request_shelter", 0.9))
            .unwrap();
        assert_eq!(
            d.written(SlotName::EmergencyType).map(|m| &m.value),
            Some(&SlotValue::Emergency(EmergencyType::Fire))
        );
        assert_eq!(d.directive, Some(Directive::FindShelters));
    }
}
