//! Core library for the WeatherWise planner.
//!
//! This crate defines:
//! - Shared domain models (queries, per-condition results, summaries)
//! - Configuration & credentials handling
//! - Climate sources (bundled demo fixture, live NASA POWER)
//! - Probability tiers and friendly summaries
//! - Geocoding, AI insights and chat intent parsing
//! - CSV/JSON export and plain-text reports
//!
//! It is used by `weatherwise-cli`, both for the command line and for the HTTP backend.

pub mod chat;
pub mod config;
pub mod error;
pub mod export;
pub mod geocode;
pub mod insights;
pub mod intent;
pub mod model;
pub mod planner;
pub mod probability;
pub mod report;
pub mod source;

pub use chat::{ChatClient, ChatCompletion, ChatProviderId};
pub use config::{Config, DataConfig, GeocodingConfig, ProviderConfig, ServerConfig};
pub use error::PlannerError;
pub use model::{
    ConditionKey, ConditionResult, ConditionSet, DayOfYear, Location, QueryMetadata, Threshold,
    WeatherQuery, WeatherQueryResponse, WeatherSummary,
};
pub use planner::{Planner, PlannerState, QueryOutcome};
pub use source::{ClimateSource, source_from_config};
