// src/status.rs
//! Status classifier: free text + intent → safe / injured / trapped / unclear.
//!
//! Priority:
//! 1. direct status intents (`report_safe`, `report_injured`, `report_trapped`, `deny`)
//! 2. `affirm`, read against the most recent bot message (danger/injury → injured)
//! 3. lexical cues: trapped, negated injury (safe), negated safety (injured),
//!    injury, safety
//!
//! Negation is a presence test over the whole message, not scoped to the phrase
//! it negates. "I'm not sure, but I'm hurt" therefore reads as "not hurt".

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::turn::Intent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusLabel {
    Safe,
    Injured,
    Trapped,
    Unclear,
}

impl StatusLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusLabel::Safe => "safe",
            StatusLabel::Injured => "injured",
            StatusLabel::Trapped => "trapped",
            StatusLabel::Unclear => "unclear",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "safe" => Some(StatusLabel::Safe),
            "injured" => Some(StatusLabel::Injured),
            "trapped" => Some(StatusLabel::Trapped),
            "unclear" => Some(StatusLabel::Unclear),
            _ => None,
        }
    }

    /// Injured or trapped.
    pub fn needs_escalation(self) -> bool {
        matches!(self, StatusLabel::Injured | StatusLabel::Trapped)
    }

    /// A definite answer (anything but unclear).
    pub fn is_answer(self) -> bool {
        !matches!(self, StatusLabel::Unclear)
    }
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What produced the label; kept for explainability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCue {
    Intent,
    AffirmAfterDanger,
    AffirmDefault,
    TrappedPhrase,
    NegatedInjury,
    NegatedSafety,
    InjuryPhrase,
    SafetyPhrase,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub label: StatusLabel,
    pub cue: StatusCue,
}

impl Classification {
    fn new(label: StatusLabel, cue: StatusCue) -> Self {
        Self { label, cue }
    }
}

fn word_set(words: &[&str]) -> Regex {
    let alts = words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)(?:^|[^\w'])(?:{alts})(?:$|[^\w'])")).expect("status cue regex")
}

static NEGATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^\w'])(?:not|no|never|aren't|isn't|don't|\w+n't)(?:$|[^\w'])")
        .expect("negation regex")
});
static TRAPPED: Lazy<Regex> = Lazy::new(|| {
    word_set(&[
        "trapped",
        "stuck",
        "can't get out",
        "cannot get out",
        "buried",
        "pinned",
    ])
});
static INJURY: Lazy<Regex> =
    Lazy::new(|| word_set(&["injured", "hurt", "bleeding", "wounded", "broken", "injury"]));
static SAFETY: Lazy<Regex> = Lazy::new(|| {
    word_set(&[
        "safe",
        "fine",
        "okay",
        "ok",
        "good",
        "well",
        "alright",
        "all right",
        "all set",
    ])
});
static DANGER_PROMPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)injur|danger|hurt|trapped").expect("danger prompt regex"));

fn normalize(text: &str) -> String {
    text.replace(['’', '‘', '`'], "'").to_lowercase()
}

/// Lexical scan only (no intent, no context).
pub fn classify_text(text: &str) -> Classification {
    let t = normalize(text);
    let negated = NEGATION.is_match(&t);
    let injury = INJURY.is_match(&t);
    let safety = SAFETY.is_match(&t);

    if TRAPPED.is_match(&t) {
        Classification::new(StatusLabel::Trapped, StatusCue::TrappedPhrase)
    } else if negated && injury {
        Classification::new(StatusLabel::Safe, StatusCue::NegatedInjury)
    } else if negated && safety {
        Classification::new(StatusLabel::Injured, StatusCue::NegatedSafety)
    } else if injury {
        Classification::new(StatusLabel::Injured, StatusCue::InjuryPhrase)
    } else if safety {
        Classification::new(StatusLabel::Safe, StatusCue::SafetyPhrase)
    } else {
        Classification::new(StatusLabel::Unclear, StatusCue::Nothing)
    }
}

/// True if the text carries any status cue at all.
pub fn has_status_cue(text: &str) -> bool {
    classify_text(text).label.is_answer()
}

/// Full classification. `last_bot_text` is the most recent bot-authored message.
pub fn classify(text: &str, intent: &Intent, last_bot_text: Option<&str>) -> Classification {
    match intent {
        Intent::ReportSafe | Intent::Deny => {
            Classification::new(StatusLabel::Safe, StatusCue::Intent)
        }
        Intent::ReportInjured => Classification::new(StatusLabel::Injured, StatusCue::Intent),
        Intent::ReportTrapped => Classification::new(StatusLabel::Trapped, StatusCue::Intent),
        Intent::Affirm => {
            if last_bot_text.is_some_and(|b| DANGER_PROMPT.is_match(b)) {
                Classification::new(StatusLabel::Injured, StatusCue::AffirmAfterDanger)
            } else {
                Classification::new(StatusLabel::Safe, StatusCue::AffirmDefault)
            }
        }
        _ => classify_text(text),
    }
}
