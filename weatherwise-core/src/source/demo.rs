use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::{WeatherQuery, WeatherQueryResponse};

use super::ClimateSource;

const FIXTURE: &str = include_str!("../../data/mock_response.json");

/// Serves a canned response so the planner works without network access.
#[derive(Debug, Clone)]
pub struct DemoSource {
    fixture: WeatherQueryResponse,
}

impl DemoSource {
    pub fn new() -> Result<Self> {
        Self::from_json(FIXTURE)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let fixture = serde_json::from_str(json).context("Failed to parse demo fixture JSON")?;
        Ok(Self { fixture })
    }
}

#[async_trait]
impl ClimateSource for DemoSource {
    async fn query(&self, query: &WeatherQuery) -> Result<WeatherQueryResponse> {
        let mut response = self.fixture.clone();
        response.query = query.clone();
        response.results.retain(|key, _| query.conditions.contains(*key));

        tracing::debug!(kept = response.results.len(), "served demo fixture");
        Ok(response)
    }

    fn name(&self) -> &'static str {
        "demo"
    }
}
