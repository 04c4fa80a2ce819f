// src/location/resolver.rs
//! District resolution: free text, postcode, or an already reverse-geocoded GPS fix
//! → one canonical district with a confidence score.
//!
//! Text resolution order (first success wins):
//! 1. exact alias or known postcode (confidence 1.0)
//! 2. exact canonical name, case-insensitive (1.0)
//! 3. a `1[0-4]ddd` postcode token anywhere in the text (1.0)
//! 4. fuzzy match against every alias; all districts tied at the top score
//!    (>= `min_score`) become suggestions, the alphabetically first one wins
//! 5. otherwise a `NoMatch` rejection, carrying near misses (>= `suggestion_floor`)
//!    as suggestions when there are any
//!
//! Nothing here performs I/O. A failed or timed-out geocode reaches us as a fix
//! without an address and is rejected like unparseable text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::districts::{normalize, District, DistrictTable};
use super::similarity::{best_window_ratio, TopMatches};
use crate::config::ResolverConfig;
use crate::telemetry::anon_hash;
use crate::turn::{Coordinates, GeocodedAddress};

static POSTCODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(1[0-4]\d{3})\b").expect("postcode regex"));

/// Extract the first Berlin-shaped postcode token from free text.
pub fn extract_postcode(text: &str) -> Option<&str> {
    POSTCODE_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// What the caller knows about the user's location this turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationInput {
    pub free_text: Option<String>,
    pub postcode: Option<String>,
    pub gps: Option<GpsFix>,
}

impl LocationInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            free_text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn postcode(code: impl Into<String>) -> Self {
        Self {
            postcode: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn gps(coords: Coordinates, address: Option<GeocodedAddress>) -> Self {
        Self {
            gps: Some(GpsFix { coords, address }),
            ..Default::default()
        }
    }
}

/// Coordinates plus the collaborator's reverse-geocode result, if it produced one.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsFix {
    pub coords: Coordinates,
    pub address: Option<GeocodedAddress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Alias,
    CanonicalName,
    Postcode,
    Fuzzy,
    GpsSuburb,
    GpsPostcode,
    /// Berlin fix that matched nothing; low confidence, must be confirmed.
    GpsDefault,
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub district: District,
    pub confidence: f64,
    /// Districts tied at the top fuzzy score (empty for exact matches).
    pub suggestions: Vec<District>,
    pub method: MatchMethod,
}

impl Resolution {
    fn exact(district: District, method: MatchMethod) -> Self {
        Self {
            district,
            confidence: 1.0,
            suggestions: Vec::new(),
            method,
        }
    }
}

/// Why no district came out. Values, not errors: the engine routes all of them
/// through the retry policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    NoInput,
    NoMatch {
        best_score: f64,
        suggestions: Vec<District>,
    },
    OutsideServiceArea {
        city: String,
    },
    GeocodeUnavailable,
}

impl Rejection {
    pub fn suggestions(&self) -> &[District] {
        match self {
            Rejection::NoMatch { suggestions, .. } => suggestions,
            _ => &[],
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Rejection::NoMatch {
                best_score,
                suggestions,
            } if !suggestions.is_empty() => *best_score,
            _ => 0.0,
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Rejection::NoInput => "no_input",
            Rejection::NoMatch { .. } => "no_match",
            Rejection::OutsideServiceArea { .. } => "outside_service_area",
            Rejection::GeocodeUnavailable => "geocode_unavailable",
        }
    }
}

pub type ResolveOutcome = Result<Resolution, Rejection>;

/// `(district, confidence, suggestions)` view of an outcome.
pub fn as_triple(outcome: &ResolveOutcome) -> (Option<District>, f64, Vec<District>) {
    match outcome {
        Ok(r) => (Some(r.district), r.confidence, r.suggestions.clone()),
        Err(rej) => (None, rej.confidence(), rej.suggestions().to_vec()),
    }
}

/// How the caller should word the outcome of a location turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    Accepted,
    Confirm,
    RejectedWithSuggestions,
    Rejected,
}

impl ConfidenceBand {
    /// Band for a raw score and whether suggestions exist.
    pub fn from_score(score: f64, has_suggestions: bool, cfg: &ResolverConfig) -> Self {
        if score >= cfg.accept_score {
            ConfidenceBand::Accepted
        } else if score >= cfg.confirm_score {
            ConfidenceBand::Confirm
        } else if has_suggestions {
            ConfidenceBand::RejectedWithSuggestions
        } else {
            ConfidenceBand::Rejected
        }
    }

    pub fn of(outcome: &ResolveOutcome, cfg: &ResolverConfig) -> Self {
        match outcome {
            // a resolved district is always its own suggestion
            Ok(r) => Self::from_score(r.confidence, true, cfg),
            Err(rej @ Rejection::NoMatch { .. }) => {
                if rej.suggestions().is_empty() {
                    ConfidenceBand::Rejected
                } else {
                    ConfidenceBand::RejectedWithSuggestions
                }
            }
            Err(_) => ConfidenceBand::Rejected,
        }
    }

    /// Accepted or Confirm: the district is taken.
    pub fn is_accepted(self) -> bool {
        matches!(self, ConfidenceBand::Accepted | ConfidenceBand::Confirm)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConfidenceBand::Accepted => "accepted",
            ConfidenceBand::Confirm => "confirm",
            ConfidenceBand::RejectedWithSuggestions => "rejected_with_suggestions",
            ConfidenceBand::Rejected => "rejected",
        }
    }
}

/// Stateless resolver over the shared, read-only district table.
#[derive(Debug, Clone)]
pub struct DistrictResolver {
    table: &'static DistrictTable,
    cfg: ResolverConfig,
    fallback: District,
}

impl DistrictResolver {
    pub fn new(cfg: &ResolverConfig) -> Self {
        Self::with_table(DistrictTable::berlin(), cfg)
    }

    pub fn with_table(table: &'static DistrictTable, cfg: &ResolverConfig) -> Self {
        Self {
            table,
            cfg: cfg.clone(),
            fallback: cfg.fallback_district(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.cfg
    }

    /// Free text first, then the GPS fix, then a bare postcode.
    pub fn resolve(&self, input: &LocationInput) -> ResolveOutcome {
        let mut last = Err(Rejection::NoInput);

        if let Some(text) = input.free_text.as_deref() {
            last = self.resolve_text(text);
            if last.is_ok() {
                return last;
            }
        }
        if let Some(fix) = &input.gps {
            last = match (self.resolve_gps(fix), last) {
                (Ok(r), _) => return Ok(r),
                // a text near-miss is more useful to the caller than a bare GPS failure,
                // except for the out-of-area reason which must reach the user
                (Err(gps @ Rejection::OutsideServiceArea { .. }), _) => Err(gps),
                (Err(gps), Err(Rejection::NoInput)) => Err(gps),
                (Err(_), prev) => prev,
            };
        }
        if let Some(code) = input.postcode.as_deref() {
            match self.resolve_postcode(code) {
                Ok(r) => return Ok(r),
                Err(rej) => {
                    if matches!(last, Err(Rejection::NoInput)) {
                        last = Err(rej);
                    }
                }
            }
        }
        last
    }

    /// Steps 1–5 over a single piece of text.
    pub fn resolve_text(&self, text: &str) -> ResolveOutcome {
        let n = normalize(text);
        if n.is_empty() {
            return Err(Rejection::NoInput);
        }

        // 1) exact alias / known postcode
        if let Some(d) = self.table.alias(&n) {
            return Ok(Resolution::exact(d, MatchMethod::Alias));
        }
        if n.len() == 5 && n.chars().all(|c| c.is_ascii_digit()) {
            if let Some(d) = self.table.postcode(&n) {
                return Ok(Resolution::exact(d, MatchMethod::Postcode));
            }
        }

        // 2) canonical name
        if let Ok(d) = n.parse::<District>() {
            return Ok(Resolution::exact(d, MatchMethod::CanonicalName));
        }

        // 3) postcode token inside the text
        if let Some(code) = extract_postcode(&n) {
            if let Some(d) = self.table.postcode(code) {
                return Ok(Resolution::exact(d, MatchMethod::Postcode));
            }
        }

        // 4) fuzzy
        let mut top = TopMatches::default();
        let mut near: BTreeMap<District, f64> = BTreeMap::new();
        for (alias, district) in self.table.aliases() {
            let score = best_window_ratio(&n, alias, self.cfg.min_window_alias_len);
            if score >= self.cfg.min_score {
                top.offer(district, score);
            }
            if score >= self.cfg.suggestion_floor {
                let slot = near.entry(district).or_insert(0.0);
                if score > *slot {
                    *slot = score;
                }
            }
        }

        let best = top.best_score();
        let ranked = top.into_ranked();
        if let Some(&district) = ranked.first() {
            debug!(
                target: "crisis::resolver",
                id = %anon_hash(text), %district, score = best, ties = ranked.len(),
                "fuzzy district match"
            );
            return Ok(Resolution {
                district,
                confidence: best,
                suggestions: ranked,
                method: MatchMethod::Fuzzy,
            });
        }

        // 5) no match; keep near misses for the caller
        let mut misses: Vec<(District, f64)> = near.into_iter().collect();
        misses.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.name().cmp(b.0.name())));
        misses.truncate(self.cfg.max_suggestions);
        let best_score = misses.first().map(|m| m.1).unwrap_or(0.0);
        debug!(
            target: "crisis::resolver",
            id = %anon_hash(text), near_misses = misses.len(),
            "no district match"
        );
        Err(Rejection::NoMatch {
            best_score,
            suggestions: misses.into_iter().map(|m| m.0).collect(),
        })
    }

    pub fn resolve_postcode(&self, code: &str) -> ResolveOutcome {
        let code = code.trim();
        if code.is_empty() {
            return Err(Rejection::NoInput);
        }
        self.table
            .postcode(code)
            .map(|d| Resolution::exact(d, MatchMethod::Postcode))
            .ok_or(Rejection::NoMatch {
                best_score: 0.0,
                suggestions: Vec::new(),
            })
    }

    /// City gate, then suburb (fuzzy, then containment), then postcode, then the
    /// configured fallback district at low confidence.
    pub fn resolve_gps(&self, fix: &GpsFix) -> ResolveOutcome {
        let Some(addr) = &fix.address else {
            return Err(Rejection::GeocodeUnavailable);
        };

        let city = addr.city_or_town().unwrap_or_default();
        if !city.to_lowercase().contains("berlin") {
            return Err(Rejection::OutsideServiceArea {
                city: city.to_string(),
            });
        }

        if let Some(suburb) = addr.suburb_like() {
            if let Ok(r) = self.resolve_text(suburb) {
                if r.confidence >= self.cfg.confirm_score {
                    return Ok(Resolution {
                        method: MatchMethod::GpsSuburb,
                        ..r
                    });
                }
            }
            let s = suburb.to_lowercase();
            if !s.trim().is_empty() {
                for d in District::ALL {
                    let canon = d.name().to_lowercase();
                    if s.contains(&canon) || canon.contains(s.trim()) {
                        return Ok(Resolution {
                            district: d,
                            confidence: self.cfg.accept_score,
                            suggestions: Vec::new(),
                            method: MatchMethod::GpsSuburb,
                        });
                    }
                }
            }
        }

        if let Some(code) = addr.postcode.as_deref() {
            if let Some(d) = self.table.postcode(code) {
                return Ok(Resolution::exact(d, MatchMethod::GpsPostcode));
            }
        }

        debug!(
            target: "crisis::resolver",
            district = %self.fallback,
            "berlin fix without usable suburb/postcode, using fallback district"
        );
        Ok(Resolution {
            district: self.fallback,
            confidence: self.cfg.gps_fallback_confidence,
            suggestions: vec![self.fallback],
            method: MatchMethod::GpsDefault,
        })
    }
}
