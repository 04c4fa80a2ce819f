// src/location/districts.rs
//! Canonical Berlin districts and their reference data.
//!
//! The alias and postcode tables are embedded from `data/berlin_districts.json`
//! and parsed once. They are immutable and shared by every session.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// One of the 20 districts the service covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum District {
    Charlottenburg,
    Friedrichshain,
    Hellersdorf,
    Kreuzberg,
    Koepenick,
    Lichtenberg,
    Marzahn,
    Mitte,
    Neukoelln,
    Pankow,
    PrenzlauerBerg,
    Reinickendorf,
    Schoeneberg,
    Spandau,
    Steglitz,
    Tempelhof,
    Treptow,
    Wedding,
    Wilmersdorf,
    Zehlendorf,
}

impl District {
    /// All districts, ordered by canonical name (byte order, so `Kreuzberg` < `Köpenick`).
    pub const ALL: [District; 20] = [
        District::Charlottenburg,
        District::Friedrichshain,
        District::Hellersdorf,
        District::Kreuzberg,
        District::Koepenick,
        District::Lichtenberg,
        District::Marzahn,
        District::Mitte,
        District::Neukoelln,
        District::Pankow,
        District::PrenzlauerBerg,
        District::Reinickendorf,
        District::Schoeneberg,
        District::Spandau,
        District::Steglitz,
        District::Tempelhof,
        District::Treptow,
        District::Wedding,
        District::Wilmersdorf,
        District::Zehlendorf,
    ];

    /// Canonical display name.
    pub fn name(self) -> &'static str {
        match self {
            District::Charlottenburg => "Charlottenburg",
            District::Friedrichshain => "Friedrichshain",
            District::Hellersdorf => "Hellersdorf",
            District::Koepenick => "Köpenick",
            District::Kreuzberg => "Kreuzberg",
            District::Lichtenberg => "Lichtenberg",
            District::Marzahn => "Marzahn",
            District::Mitte => "Mitte",
            District::Neukoelln => "Neukölln",
            District::Pankow => "Pankow",
            District::PrenzlauerBerg => "Prenzlauer Berg",
            District::Reinickendorf => "Reinickendorf",
            District::Schoeneberg => "Schöneberg",
            District::Spandau => "Spandau",
            District::Steglitz => "Steglitz",
            District::Tempelhof => "Tempelhof",
            District::Treptow => "Treptow",
            District::Wedding => "Wedding",
            District::Wilmersdorf => "Wilmersdorf",
            District::Zehlendorf => "Zehlendorf",
        }
    }
}

impl fmt::Display for District {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDistrict(pub String);

impl fmt::Display for UnknownDistrict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown district `{}`", self.0)
    }
}

impl std::error::Error for UnknownDistrict {}

impl FromStr for District {
    type Err = UnknownDistrict;

    /// Case-insensitive match against canonical names only (no aliases).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        District::ALL
            .iter()
            .copied()
            .find(|d| d.name().to_lowercase() == needle)
            .ok_or_else(|| UnknownDistrict(s.to_string()))
    }
}

impl Serialize for District {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for District {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Alias and postcode lookup tables.
#[derive(Debug)]
pub struct DistrictTable {
    /// (normalized alias, district), sorted by alias so iteration is deterministic.
    aliases: Vec<(String, District)>,
    alias_index: HashMap<String, District>,
    postcodes: HashMap<String, District>,
}

#[derive(Deserialize)]
struct RawTable {
    aliases: BTreeMap<String, District>,
    postcodes: BTreeMap<String, District>,
}

static TABLE: Lazy<DistrictTable> = Lazy::new(|| {
    let raw = include_str!("../../data/berlin_districts.json");
    DistrictTable::from_json(raw).expect("valid berlin district table")
});

impl DistrictTable {
    /// The embedded Berlin table.
    pub fn berlin() -> &'static DistrictTable {
        &TABLE
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        let parsed: RawTable = serde_json::from_str(raw)?;

        let mut aliases: Vec<(String, District)> = parsed
            .aliases
            .into_iter()
            .map(|(alias, d)| (normalize(&alias), d))
            .collect();
        // Canonical names are aliases of themselves.
        for d in District::ALL {
            let canon = normalize(d.name());
            if !aliases.iter().any(|(a, _)| *a == canon) {
                aliases.push((canon, d));
            }
        }
        aliases.sort();
        aliases.dedup_by(|a, b| a.0 == b.0);

        let alias_index = aliases.iter().cloned().collect();
        let postcodes = parsed
            .postcodes
            .into_iter()
            .map(|(p, d)| (p.trim().to_string(), d))
            .collect();

        Ok(Self {
            aliases,
            alias_index,
            postcodes,
        })
    }

    /// Exact lookup of an already-normalized alias.
    pub fn alias(&self, normalized: &str) -> Option<District> {
        self.alias_index.get(normalized).copied()
    }

    /// Exact lookup of a 5-digit postcode.
    pub fn postcode(&self, code: &str) -> Option<District> {
        self.postcodes.get(code.trim()).copied()
    }

    /// Every alias with its district, sorted by alias.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, District)> {
        self.aliases.iter().map(|(a, d)| (a.as_str(), *d))
    }

    /// Postcodes mapped to `district`, sorted.
    pub fn postcodes_of(&self, district: District) -> Vec<&str> {
        let mut out: Vec<&str> = self
            .postcodes
            .iter()
            .filter(|(_, d)| **d == district)
            .map(|(p, _)| p.as_str())
            .collect();
        out.sort_unstable();
        out
    }
}

/// Lowercase, trim, collapse inner whitespace. Umlauts are kept as-is; the alias
/// table carries the transliterated spellings explicitly.
pub fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
