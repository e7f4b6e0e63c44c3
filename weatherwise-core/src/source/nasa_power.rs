//! Live climate odds from the NASA POWER daily point API.
//!
//! For every year in the configured range the days around the requested
//! day-of-year are pooled, and each condition's probability is the share of
//! those days that cross its threshold. Per-year rates are kept as the
//! condition's `historical_values` so callers can plot a distribution.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::{
    ConditionKey, ConditionResult, DayOfYear, QueryMetadata, Threshold, WeatherQuery,
    WeatherQueryResponse,
    config::DataConfig,
    error::PlannerError,
    probability::{Direction, exceedance, heat_index, trend},
};

use super::ClimateSource;

const PARAMETERS: &str = "T2M_MAX,T2M_MIN,PRECTOTCORR,WS10M_MAX,RH2M,T2M";
const DEFAULT_FILL_VALUE: f64 = -999.0;
// Below ~80 °F the Rothfusz regression is not meaningful; the air temperature is used.
const HEAT_INDEX_FLOOR_C: f64 = 26.7;

/// Half-width above which neighbouring years' windows would overlap.
const MAX_WINDOW_DAYS: u32 = 182;

#[derive(Debug, Clone)]
pub struct NasaPowerSource {
    base_url: String,
    start_year: i32,
    end_year: i32,
    window_days: u32,
    http: Client,
}

impl NasaPowerSource {
    pub fn from_config(data: &DataConfig) -> Result<Self> {
        if data.start_year > data.end_year {
            return Err(anyhow!(
                "Invalid data year range {}..{}: start_year must not exceed end_year",
                data.start_year,
                data.end_year
            ));
        }
        if data.window_days > MAX_WINDOW_DAYS {
            return Err(anyhow!(
                "Invalid window_days {}: must be at most {MAX_WINDOW_DAYS} so yearly windows \
                 do not overlap",
                data.window_days
            ));
        }

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to build NASA POWER HTTP client")?;

        Ok(Self {
            base_url: data.power_base_url.trim_end_matches('/').to_string(),
            start_year: data.start_year,
            end_year: data.end_year,
            window_days: data.window_days,
            http,
        })
    }

    fn windows(&self, day: DayOfYear) -> Vec<YearWindow> {
        let half = Duration::days(i64::from(self.window_days));
        (self.start_year..=self.end_year)
            .filter_map(|year| {
                let center = day.in_year(year)?;
                Some(YearWindow {
                    year,
                    start: center - half,
                    end: center + half,
                })
            })
            .collect()
    }

    async fn fetch_daily(
        &self,
        query: &WeatherQuery,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, DailyRecord>> {
        let url = format!("{}/api/temporal/daily/point", self.base_url);
        let lat = query.location.lat.to_string();
        let lon = query.location.lon.to_string();
        let start = start.format("%Y%m%d").to_string();
        let end = end.format("%Y%m%d").to_string();

        let res = self
            .http
            .get(&url)
            .query(&[
                ("parameters", PARAMETERS),
                ("community", "AG"),
                ("latitude", lat.as_str()),
                ("longitude", lon.as_str()),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("format", "JSON"),
            ])
            .send()
            .await
            .context("Failed to send request to NASA POWER")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read NASA POWER response body")?;

        if !status.is_success() {
            return Err(PlannerError::upstream("NASA POWER", status, &body).into());
        }

        let parsed: PowerResponse =
            serde_json::from_str(&body).context("Failed to parse NASA POWER JSON")?;

        Ok(parsed.into_records())
    }
}

#[async_trait]
impl ClimateSource for NasaPowerSource {
    async fn query(&self, query: &WeatherQuery) -> Result<WeatherQueryResponse> {
        query.validate()?;

        let windows = self.windows(query.date_of_year);
        let (Some(first), Some(last)) = (windows.first(), windows.last()) else {
            return Err(anyhow!("No years available in the configured data range"));
        };

        tracing::info!(
            lat = query.location.lat,
            lon = query.location.lon,
            day = %query.date_of_year,
            years = windows.len(),
            "querying NASA POWER"
        );

        let records = self.fetch_daily(query, first.start, last.end).await?;
        let results = compute_results(&records, &windows, query.conditions.iter());

        Ok(WeatherQueryResponse {
            query: query.clone(),
            results,
            metadata: QueryMetadata {
                data_source: "NASA POWER daily point API (MERRA-2 / GEOS), community AG".into(),
                time_range: format!("{}-01-01 to {}-12-31", self.start_year, self.end_year),
                units: "°C, mm/day, m/s".into(),
                generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            },
        })
    }

    fn name(&self) -> &'static str {
        "nasa-power"
    }
}

/// Days around the requested date in one sample year.
#[derive(Debug, Clone, Copy)]
struct YearWindow {
    year: i32,
    start: NaiveDate,
    end: NaiveDate,
}

/// One day of POWER values with fill values already removed.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct DailyRecord {
    pub t2m_max: Option<f64>,
    pub t2m_min: Option<f64>,
    pub precipitation: Option<f64>,
    pub wind_max: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub t2m: Option<f64>,
}

struct Rule {
    threshold: f64,
    unit: &'static str,
    direction: Direction,
    sample: fn(&DailyRecord) -> Option<f64>,
}

fn rule_for(key: ConditionKey) -> Rule {
    match key {
        ConditionKey::VeryHot => Rule {
            threshold: 32.2,
            unit: "°C",
            direction: Direction::AtOrAbove,
            sample: |r| r.t2m_max,
        },
        ConditionKey::VeryCold => Rule {
            threshold: 0.0,
            unit: "°C",
            direction: Direction::AtOrBelow,
            sample: |r| r.t2m_min,
        },
        ConditionKey::VeryWet => Rule {
            threshold: 25.4,
            unit: "mm/day",
            direction: Direction::AtOrAbove,
            sample: |r| r.precipitation,
        },
        ConditionKey::VeryWindy => Rule {
            threshold: 10.8,
            unit: "m/s",
            direction: Direction::AtOrAbove,
            sample: |r| r.wind_max,
        },
        ConditionKey::VeryUncomfortable => Rule {
            threshold: 40.6,
            unit: "°C heat index",
            direction: Direction::AtOrAbove,
            sample: |r| {
                let t = r.t2m?;
                let rh = r.relative_humidity?;
                Some(if t < HEAT_INDEX_FLOOR_C { t } else { heat_index(t, rh) })
            },
        },
    }
}

fn compute_results(
    records: &BTreeMap<NaiveDate, DailyRecord>,
    windows: &[YearWindow],
    conditions: impl Iterator<Item = ConditionKey>,
) -> BTreeMap<ConditionKey, ConditionResult> {
    let mut results = BTreeMap::new();

    for key in conditions {
        let rule = rule_for(key);
        let mut pooled = Vec::new();
        let mut yearly = Vec::new();

        for window in windows {
            let samples: Vec<f64> = records
                .range(window.start..=window.end)
                .filter_map(|(_, record)| (rule.sample)(record))
                .collect();

            if samples.is_empty() {
                tracing::debug!(year = window.year, condition = %key, "no samples in window");
                continue;
            }

            yearly.push(exceedance(&samples, rule.threshold, rule.direction));
            pooled.extend(samples);
        }

        results.insert(
            key,
            ConditionResult {
                probability_percent: exceedance(&pooled, rule.threshold, rule.direction),
                threshold: Threshold {
                    value: rule.threshold,
                    unit: rule.unit.to_string(),
                },
                trend: Some(trend(&yearly)),
                historical_values: yearly,
            },
        );
    }

    results
}

#[derive(Debug, Deserialize)]
struct PowerResponse {
    #[serde(default)]
    header: Option<PowerHeader>,
    properties: PowerProperties,
}

#[derive(Debug, Deserialize)]
struct PowerHeader {
    fill_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PowerProperties {
    parameter: HashMap<String, BTreeMap<String, f64>>,
}

impl PowerResponse {
    fn into_records(self) -> BTreeMap<NaiveDate, DailyRecord> {
        let fill = self
            .header
            .and_then(|h| h.fill_value)
            .unwrap_or(DEFAULT_FILL_VALUE);

        let mut records: BTreeMap<NaiveDate, DailyRecord> = BTreeMap::new();

        for (name, series) in self.properties.parameter {
            for (stamp, value) in series {
                let Ok(date) = NaiveDate::parse_from_str(&stamp, "%Y%m%d") else {
                    tracing::warn!(%stamp, "skipping unparseable NASA POWER date");
                    continue;
                };
                if value <= fill {
                    continue;
                }

                let record = records.entry(date).or_default();
                let slot = match name.as_str() {
                    "T2M_MAX" => &mut record.t2m_max,
                    "T2M_MIN" => &mut record.t2m_min,
                    "PRECTOTCORR" => &mut record.precipitation,
                    "WS10M_MAX" => &mut record.wind_max,
                    "RH2M" => &mut record.relative_humidity,
                    "T2M" => &mut record.t2m,
                    _ => continue,
                };
                *slot = Some(value);
            }
        }

        records
    }
}
