use chrono::{Datelike, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::error::PlannerError;

/// The five weather-stress categories a planner can watch.
///
/// Declaration order is the display order everywhere (results, CSV rows,
/// summaries), which `Ord` picks up for the `BTreeMap` in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKey {
    VeryHot,
    VeryCold,
    VeryWet,
    VeryWindy,
    VeryUncomfortable,
}

impl ConditionKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKey::VeryHot => "very_hot",
            ConditionKey::VeryCold => "very_cold",
            ConditionKey::VeryWet => "very_wet",
            ConditionKey::VeryWindy => "very_windy",
            ConditionKey::VeryUncomfortable => "very_uncomfortable",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConditionKey::VeryHot => "Extreme Heat",
            ConditionKey::VeryCold => "Hard Freeze",
            ConditionKey::VeryWet => "Heavy Rain",
            ConditionKey::VeryWindy => "High Winds",
            ConditionKey::VeryUncomfortable => "Muggy Heat",
        }
    }

    pub const fn all() -> &'static [ConditionKey] {
        &[
            ConditionKey::VeryHot,
            ConditionKey::VeryCold,
            ConditionKey::VeryWet,
            ConditionKey::VeryWindy,
            ConditionKey::VeryUncomfortable,
        ]
    }
}

impl fmt::Display for ConditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ConditionKey {
    type Error = anyhow::Error;

    /// Accepts the wire key, the display label, and the loose names the
    /// intent model tends to produce.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();

        let key = match normalized.as_str() {
            "veryhot" | "extremeheat" | "heat" | "hot" => ConditionKey::VeryHot,
            "verycold" | "hardfreeze" | "frost" | "freeze" | "cold" => ConditionKey::VeryCold,
            "verywet" | "heavyrain" | "rain" | "flooding" | "wet" => ConditionKey::VeryWet,
            "verywindy" | "highwinds" | "highwind" | "strongwind" | "wind" | "windy" => {
                ConditionKey::VeryWindy
            }
            "veryuncomfortable" | "muggyheat" | "muggy" | "humid" | "heatindex" => {
                ConditionKey::VeryUncomfortable
            }
            _ => {
                return Err(PlannerError::InvalidQuery(format!(
                    "Unknown condition '{value}'. Supported conditions: very_hot, very_cold, \
                     very_wet, very_windy, very_uncomfortable."
                ))
                .into());
            }
        };

        Ok(key)
    }
}

/// Ordered, duplicate-free selection of conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionSet(Vec<ConditionKey>);

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self(ConditionKey::all().to_vec())
    }

    pub fn insert(&mut self, key: ConditionKey) -> bool {
        if self.contains(key) {
            return false;
        }
        self.0.push(key);
        true
    }

    /// Flip a condition on or off; returns whether it is now selected.
    pub fn toggle(&mut self, key: ConditionKey) -> bool {
        if let Some(pos) = self.0.iter().position(|k| *k == key) {
            self.0.remove(pos);
            false
        } else {
            self.0.push(key);
            true
        }
    }

    pub fn contains(&self, key: ConditionKey) -> bool {
        self.0.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ConditionKey> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ConditionKey> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = ConditionKey>>(iter: I) -> Self {
        let mut set = ConditionSet::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Location {
    pub fn new(lat: f64, lon: f64, name: Option<String>) -> anyhow::Result<Self> {
        let location = Self { lat, lon, name };
        location.validate()?;
        Ok(location)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(PlannerError::InvalidQuery(format!(
                "latitude {} is outside -90..=90",
                self.lat
            ))
            .into());
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(PlannerError::InvalidQuery(format!(
                "longitude {} is outside -180..=180",
                self.lon
            ))
            .into());
        }
        Ok(())
    }

    /// Name when known, otherwise the coordinates.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("lat {:.2}, lon {:.2}", self.lat, self.lon),
        }
    }
}

/// Calendar day without a year, written `MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayOfYear {
    month: u32,
    day: u32,
}

impl DayOfYear {
    // Leap year, so 02-29 is a valid day-of-year.
    const REFERENCE_YEAR: i32 = 2000;

    pub fn new(month: u32, day: u32) -> anyhow::Result<Self> {
        if NaiveDate::from_ymd_opt(Self::REFERENCE_YEAR, month, day).is_none() {
            return Err(PlannerError::InvalidQuery(format!(
                "{month:02}-{day:02} is not a valid day of the year"
            ))
            .into());
        }
        Ok(Self { month, day })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }

    pub fn today() -> Self {
        Self::from_date(Utc::now().date_naive())
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    /// Same day in a given year. Feb 29 falls back to Feb 28 outside leap years.
    pub fn in_year(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
            .or_else(|| NaiveDate::from_ymd_opt(year, self.month, self.day.saturating_sub(1)))
    }

    /// `MMDD`, used in export file names.
    pub fn compact(&self) -> String {
        format!("{:02}{:02}", self.month, self.day)
    }
}

impl fmt::Display for DayOfYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl FromStr for DayOfYear {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            || PlannerError::InvalidQuery("date_of_year must be formatted as MM-DD".to_string());

        let (month, day) = s.trim().split_once('-').ok_or_else(invalid)?;
        if month.len() != 2 || day.len() != 2 {
            return Err(invalid().into());
        }
        let month: u32 = month.parse().map_err(|_| invalid())?;
        let day: u32 = day.parse().map_err(|_| invalid())?;

        Self::new(month, day)
    }
}

impl TryFrom<String> for DayOfYear {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayOfYear> for String {
    fn from(value: DayOfYear) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherQuery {
    pub location: Location,
    pub date_of_year: DayOfYear,
    pub conditions: ConditionSet,
}

impl WeatherQuery {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.location.validate()?;
        if self.conditions.is_empty() {
            return Err(PlannerError::NoConditions.into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionResult {
    pub probability_percent: f64,
    pub threshold: Threshold,
    #[serde(default)]
    pub historical_values: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    #[serde(default)]
    pub data_source: String,
    #[serde(default)]
    pub time_range: String,
    #[serde(default)]
    pub units: String,
    #[serde(default)]
    pub generated_at: String,
}

impl QueryMetadata {
    /// Fill blank fields, leaving anything the source already set.
    pub fn fill_defaults(&mut self, data_source: &str, time_range: &str) {
        if self.generated_at.is_empty() {
            self.generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        }
        if self.data_source.is_empty() {
            self.data_source = data_source.to_string();
        }
        if self.time_range.is_empty() {
            self.time_range = time_range.to_string();
        }
        if self.units.is_empty() {
            self.units = "SI with conversions applied".to_string();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherQueryResponse {
    pub query: WeatherQuery,
    #[serde(default)]
    pub results: BTreeMap<ConditionKey, ConditionResult>,
    #[serde(default)]
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSummary {
    pub label: String,
    pub probability: f64,
    #[serde(rename = "friendlyMessage", alias = "friendly_message")]
    pub friendly_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<String>,
}
