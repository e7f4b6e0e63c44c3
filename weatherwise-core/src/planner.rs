use anyhow::Result;
use serde::Serialize;

use crate::{
    ConditionKey, ConditionSet, DayOfYear, Location, WeatherQuery, WeatherQueryResponse,
    WeatherSummary,
    geocode::Geocoder,
    intent::{ParsedIntent, QueryType},
    probability::build_summaries,
    source::ClimateSource,
};

const FALLBACK_DATA_SOURCE: &str = "NASA POWER / MERRA-2";
const FALLBACK_TIME_RANGE: &str = "2001-01-01 to 2023-12-31";

/// What the user currently has selected.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerState {
    pub location: Option<Location>,
    pub date_of_year: DayOfYear,
    pub conditions: ConditionSet,
}

impl Default for PlannerState {
    fn default() -> Self {
        Self {
            location: None,
            date_of_year: DayOfYear::today(),
            conditions: ConditionSet::all(),
        }
    }
}

/// Which parts of the state an intent touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntentOutcome {
    pub location_changed: bool,
    pub date_changed: bool,
    pub conditions_changed: bool,
    /// Place the model named but the geocoder could not find.
    pub unresolved_location: Option<String>,
}

impl IntentOutcome {
    pub fn changed(&self) -> bool {
        self.location_changed || self.date_changed || self.conditions_changed
    }
}

impl PlannerState {
    /// The query this state describes, or `None` while it is incomplete.
    pub fn to_query(&self) -> Option<WeatherQuery> {
        let location = self.location.clone()?;
        if self.conditions.is_empty() {
            return None;
        }
        Some(WeatherQuery {
            location,
            date_of_year: self.date_of_year,
            conditions: self.conditions.clone(),
        })
    }

    /// Re-geocode, re-date and re-filter from a parsed chat message.
    ///
    /// A place that cannot be resolved, for whatever reason, leaves the
    /// location untouched and is reported in `unresolved_location`.
    pub async fn apply_intent(
        &mut self,
        intent: &ParsedIntent,
        geocoder: &Geocoder,
    ) -> IntentOutcome {
        let mut outcome = IntentOutcome::default();

        if intent.query_type != QueryType::WeatherQuery {
            return outcome;
        }

        let place = intent.location.as_deref().map(str::trim);
        if let Some(place) = place.filter(|p| !p.is_empty()) {
            match geocoder.lookup(place).await {
                Ok(Some(location)) => {
                    tracing::info!(
                        place,
                        resolved = %location.label(),
                        "location updated from chat"
                    );
                    outcome.location_changed = self.location.as_ref() != Some(&location);
                    self.location = Some(location);
                }
                Ok(None) => outcome.unresolved_location = Some(place.to_string()),
                Err(err) => {
                    tracing::warn!(place, "geocoding failed: {:#}", err);
                    outcome.unresolved_location = Some(place.to_string());
                }
            }
        }

        if let Some(date) = intent.start_date() {
            let day = DayOfYear::from_date(date);
            outcome.date_changed = day != self.date_of_year;
            self.date_of_year = day;
        } else if let Some(raw) = &intent.date_start {
            tracing::debug!(%raw, "ignoring malformed dateStart");
        }

        if let Some(names) = &intent.conditions {
            let mapped: ConditionSet = names
                .iter()
                .filter_map(|name| match ConditionKey::try_from(name.as_str()) {
                    Ok(key) => Some(key),
                    Err(_) => {
                        tracing::debug!(%name, "ignoring unknown condition from chat");
                        None
                    }
                })
                .collect();

            if !mapped.is_empty() {
                outcome.conditions_changed = mapped != self.conditions;
                self.conditions = mapped;
            }
        }

        outcome
    }
}

/// A completed query and its friendly summaries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOutcome {
    pub response: WeatherQueryResponse,
    pub summaries: Vec<WeatherSummary>,
}

/// Ties selection state to a climate source and remembers the last result.
#[derive(Debug)]
pub struct Planner {
    source: Box<dyn ClimateSource>,
    pub state: PlannerState,
    last: Option<QueryOutcome>,
}

impl Planner {
    pub fn new(source: Box<dyn ClimateSource>) -> Self {
        Self::with_state(source, PlannerState::default())
    }

    pub fn with_state(source: Box<dyn ClimateSource>, state: PlannerState) -> Self {
        Self {
            source,
            state,
            last: None,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// `Ok(None)` while no location or no condition is selected.
    pub async fn run_query(&mut self) -> Result<Option<&QueryOutcome>> {
        let Some(query) = self.state.to_query() else {
            tracing::debug!("query skipped: location or conditions missing");
            return Ok(None);
        };

        let outcome = run_query(self.source.as_ref(), &query).await?;
        self.last = Some(outcome);
        Ok(self.last.as_ref())
    }

    pub fn last(&self) -> Option<&QueryOutcome> {
        self.last.as_ref()
    }
}

/// Validate, query, fill metadata gaps, summarise.
pub async fn run_query(source: &dyn ClimateSource, query: &WeatherQuery) -> Result<QueryOutcome> {
    query.validate()?;

    let mut response = source.query(query).await?;
    response
        .metadata
        .fill_defaults(FALLBACK_DATA_SOURCE, FALLBACK_TIME_RANGE);

    let summaries = build_summaries(&response);
    tracing::info!(
        source = source.name(),
        results = response.results.len(),
        "weather risk query complete"
    );

    Ok(QueryOutcome { response, summaries })
}
