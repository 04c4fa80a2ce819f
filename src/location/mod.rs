// src/location/mod.rs
//! Location domain: canonical districts, similarity scoring and the resolver.

pub mod districts;
pub mod resolver;
pub mod similarity;

pub use districts::{District, DistrictTable};
pub use resolver::{
    as_triple, extract_postcode, ConfidenceBand, DistrictResolver, GpsFix, LocationInput,
    MatchMethod, Rejection, Resolution, ResolveOutcome,
};
