// src/config/mod.rs
pub mod engine;

pub use engine::{EngineConfig, HistoryConfig, NluConfig, ResolverConfig, RetryConfig};
