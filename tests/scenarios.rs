// tests/scenarios.rs
//! End-to-end conversation flows through `Session`.

use crisis_decision_core::{
    ConfidenceBand, DecisionEngine, Directive, District, EmergencyType, EngineConfig,
    SlotMutation, SlotName, SlotValue, Slots, Session, StatusLabel, Turn,
};
use crisis_decision_core::history::EventLog;

fn engine() -> DecisionEngine {
    DecisionEngine::new(EngineConfig::default())
}

fn turn(text: &str, intent: &str) -> Turn {
    Turn::new(text, intent, 0.9)
}

#[test]
fn earthquake_safe_concludes_without_shelters() {
    let slots = Slots {
        emergency_type: Some(EmergencyType::Earthquake),
        district: Some(District::Mitte),
        location_validated: true,
        status_asked: true,
        ..Default::default()
    };
    let d = engine()
        .decide(&slots, &EventLog::new(), &turn("I'm safe", "report_safe"))
        .unwrap();

    assert!(d.mutations.contains(&SlotMutation::new(
        SlotName::InjuryStatus,
        SlotValue::Status(StatusLabel::Safe)
    )));
    assert!(d.written(SlotName::EscalationRequired).is_none());
    assert_eq!(d.directive, Some(Directive::Conclude));
}

#[test]
fn flood_gives_instructions_then_shelters() {
    let e = engine();
    let slots = Slots {
        emergency_type: Some(EmergencyType::Flood),
        district: Some(District::Kreuzberg),
        location_validated: true,
        ..Default::default()
    };
    let mut log = EventLog::new();

    let first = e
        .decide(&slots, &log, &turn("Kreuzberg", "inform_location"))
        .unwrap();
    assert_eq!(first.directive, Some(Directive::ProvideSafetyInstructions));

    let mut after = slots.clone();
    after.apply(&first.mutations, first.opens_cycle).unwrap();
    assert!(after.instructions_provided);
    log.push(crisis_decision_core::Event::action(
        Directive::ProvideSafetyInstructions.action_name(),
    ));

    let second = e
        .decide(&after, &log, &turn("yes Kreuzberg", "inform_location"))
        .unwrap();
    assert_eq!(second.directive, Some(Directive::FindShelters));
}

#[test]
fn full_earthquake_flow_with_injury() {
    let e = engine();
    let mut s = Session::new("quake");

    let d = s.handle_turn(&e, &turn("/report_earthquake", "nlu_fallback")).unwrap();
    assert_eq!(d.directive, Some(Directive::AskLocation));
    s.record_bot_message("Which district are you in?");

    let d = s.handle_turn(&e, &turn("Prenzlauer Berg", "inform_location")).unwrap();
    assert_eq!(d.band(), Some(ConfidenceBand::Accepted));
    assert_eq!(d.directive, Some(Directive::AskStatus));
    s.record_bot_message("Are you injured or in danger?");

    let d = s.handle_turn(&e, &turn("yes", "affirm")).unwrap();
    assert_eq!(d.directive, Some(Directive::FindShelters));
    assert!(s.slots().escalation_required);
    assert_eq!(s.slots().injury_status, Some(StatusLabel::Injured));

    // shelters already shown, nothing left to do
    let d = s.handle_turn(&e, &turn("shelters please", "request_shelter")).unwrap();
    assert!(d.is_noop());
}

#[test]
fn unresolvable_location_escalates_to_manual_fallback() {
    let e = engine();
    let mut s = Session::new("lost");
    s.handle_turn(&e, &turn("fire!", "report_fire")).unwrap();

    let mut directives = Vec::new();
    for _ in 0..3 {
        let d = s
            .handle_turn(&e, &turn("qqqq zzzz", "inform_location"))
            .unwrap();
        directives.push(d.directive);
    }
    assert_eq!(
        directives,
        vec![
            Some(Directive::AskLocation),
            Some(Directive::AskLocation),
            Some(Directive::ManualLocationFallback),
        ]
    );
    assert_eq!(s.slots().location_retry_count, 0);
    assert!(!s.slots().location_validated);

    // the user recovers with a postcode
    let d = s.handle_turn(&e, &turn("13347", "inform_location")).unwrap();
    assert_eq!(s.slots().district, Some(District::Wedding));
    assert_eq!(d.directive, Some(Directive::ProvideSafetyInstructions));
}

#[test]
fn new_report_keeps_location_but_resets_cycle_flags() {
    let e = engine();
    let mut s = Session::new("two");
    s.handle_turn(&e, &turn("flood", "report_flood")).unwrap();
    s.handle_turn(&e, &turn("Neukölln", "inform_location")).unwrap();
    s.handle_turn(&e, &turn("shelters", "request_shelter")).unwrap();
    assert!(s.slots().instructions_provided && s.slots().shelters_shown);

    let d = s.handle_turn(&e, &turn("now a fire", "report_fire")).unwrap();
    assert!(d.opens_cycle);
    assert_eq!(s.slots().district, Some(District::Neukoelln));
    assert!(s.slots().location_validated);
    assert!(!s.slots().shelters_shown);
    assert_eq!(d.directive, Some(Directive::ProvideSafetyInstructions));
}

#[test]
fn start_new_report_forgets_everything() {
    let e = engine();
    let mut s = Session::new("fresh");
    s.handle_turn(&e, &turn("quake", "report_earthquake")).unwrap();
    s.handle_turn(&e, &turn("Spandau", "inform_location")).unwrap();
    s.handle_turn(&e, &turn("I'm trapped", "report_trapped")).unwrap();
    assert!(s.slots().escalation_required);

    let d = s.handle_turn(&e, &turn("new report", "start_new_report")).unwrap();
    assert_eq!(d.directive, Some(Directive::AskEmergencyType));
    assert_eq!(s.slots(), &Slots::default());
}

#[test]
fn generic_report_with_wildfire_entity_is_fire() {
    let t = turn("there is a wildfire", "report_emergency").with_entity("emergency_type", "wildfire");
    let mut s = Session::new("wild");
    s.handle_turn(&engine(), &t).unwrap();
    assert_eq!(s.slots().emergency_type, Some(EmergencyType::Fire));
}

#[test]
fn greeting_asks_for_emergency_type_once_known_is_quiet() {
    let e = engine();
    let mut s = Session::new("hi");
    let d = s.handle_turn(&e, &turn("hello", "greet")).unwrap();
    assert_eq!(d.directive, Some(Directive::AskEmergencyType));

    s.handle_turn(&e, &turn("flood", "report_flood")).unwrap();
    let d = s.handle_turn(&e, &turn("hello again", "greet")).unwrap();
    assert!(d.is_noop());
}

#[test]
fn trapped_report_naming_the_district_still_escalates() {
    let e = engine();
    let mut s = Session::new("trapped");
    s.handle_turn(&e, &turn("earthquake", "report_earthquake")).unwrap();
    let d = s.handle_turn(&e, &turn("Mitte", "inform_location")).unwrap();
    assert_eq!(d.directive, Some(Directive::AskStatus));
    assert!(s.slots().status_asked);

    let d = s
        .handle_turn(
            &e,
            &Turn::new("I'm trapped in Mitte", "report_trapped", 0.95)
                .with_entity("district", "Mitte"),
        )
        .unwrap();
    assert_eq!(d.status.map(|c| c.label), Some(StatusLabel::Trapped));
    assert_eq!(d.directive, Some(Directive::FindShelters));
    assert_eq!(s.slots().injury_status, Some(StatusLabel::Trapped));
    assert!(s.slots().escalation_required);
    assert_eq!(s.slots().district, Some(District::Mitte));
}

#[test]
fn injured_report_with_postcode_before_status_question() {
    let e = engine();
    let mut s = Session::new("injured");
    s.handle_turn(&e, &turn("earthquake", "report_earthquake")).unwrap();

    let d = s
        .handle_turn(&e, &Turn::new("I'm injured, 10115", "report_injured", 0.95))
        .unwrap();
    assert_eq!(d.band(), Some(ConfidenceBand::Accepted));
    assert_eq!(d.status.map(|c| c.label), Some(StatusLabel::Injured));
    assert_ne!(d.directive, Some(Directive::AskStatus));
    assert_eq!(d.directive, Some(Directive::FindShelters));

    let slots = s.slots();
    assert_eq!(slots.district, Some(District::Mitte));
    assert!(slots.location_validated);
    assert_eq!(slots.postcode.as_deref(), Some("10115"));
    assert_eq!(slots.injury_status, Some(StatusLabel::Injured));
    assert!(slots.status_asked);
    assert!(slots.escalation_required);
}

#[test]
fn unresolved_place_in_a_status_report_costs_no_retry() {
    let e = engine();
    let mut s = Session::new("nowhere");
    s.handle_turn(&e, &turn("fire", "report_fire")).unwrap();

    let d = s
        .handle_turn(
            &e,
            &Turn::new("I'm hurt", "report_injured", 0.9).with_entity("district", "xyzqqq"),
        )
        .unwrap();
    assert!(d.retry.is_none());
    assert_eq!(d.directive, Some(Directive::AskLocation));
    assert_eq!(s.slots().location_retry_count, 0);
    assert!(s.slots().escalation_required);
}
