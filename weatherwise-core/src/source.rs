use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

use crate::{Config, WeatherQuery, WeatherQueryResponse};

pub mod demo;
pub mod nasa_power;

pub use demo::DemoSource;
pub use nasa_power::NasaPowerSource;

/// Anything that can turn a query into historical risk probabilities.
#[async_trait]
pub trait ClimateSource: Send + Sync + Debug {
    async fn query(&self, query: &WeatherQuery) -> Result<WeatherQueryResponse>;

    /// Short name for logs and health output.
    fn name(&self) -> &'static str;
}

/// Demo mode reads the bundled fixture, otherwise NASA POWER is queried live.
pub fn source_from_config(config: &Config) -> Result<Box<dyn ClimateSource>> {
    let boxed: Box<dyn ClimateSource> = if config.data.demo_mode {
        Box::new(DemoSource::new()?)
    } else {
        Box::new(NasaPowerSource::from_config(&config.data)?)
    };

    tracing::info!(source = boxed.name(), "climate source selected");
    Ok(boxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_flag_selects_fixture_source() {
        let mut cfg = Config::default();
        cfg.data.demo_mode = true;
        assert_eq!(source_from_config(&cfg).unwrap().name(), "demo");

        cfg.data.demo_mode = false;
        assert_eq!(source_from_config(&cfg).unwrap().name(), "nasa-power");
    }

    #[test]
    fn inverted_year_range_is_rejected() {
        let mut cfg = Config::default();
        cfg.data.start_year = 2020;
        cfg.data.end_year = 2010;
        assert!(source_from_config(&cfg).is_err());
    }
}
