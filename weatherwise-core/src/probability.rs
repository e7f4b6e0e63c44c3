//! Probability tiers, friendly summaries and the small amount of climate math
//! the live source needs (unit conversions, heat index, exceedance rates).

use crate::model::{ConditionKey, WeatherQueryResponse, WeatherSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskTier {
    High,
    Medium,
    Low,
}

impl RiskTier {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 40.0 {
            RiskTier::High
        } else if probability >= 15.0 {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::High => "high",
            RiskTier::Medium => "medium",
            RiskTier::Low => "low",
        }
    }

    fn friendly_message(&self, label: &str, probability: f64) -> String {
        let p = format_number(probability);
        match self {
            RiskTier::High => format!(
                "{p}% odds of {} for this date window, build contingencies.",
                label.to_lowercase()
            ),
            RiskTier::Medium => {
                format!("{label} shows up about {p}% of the time across the record.")
            }
            RiskTier::Low => format!("{label} is historically uncommon here (~{p}%)."),
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One summary per result present in the response, in condition order.
pub fn build_summaries(response: &WeatherQueryResponse) -> Vec<WeatherSummary> {
    response
        .results
        .iter()
        .map(|(key, result)| summarize(*key, result.probability_percent, result.trend.clone()))
        .collect()
}

pub fn summarize(key: ConditionKey, probability: f64, trend: Option<String>) -> WeatherSummary {
    let label = key.label();
    let tier = RiskTier::from_probability(probability);
    WeatherSummary {
        label: label.to_string(),
        probability,
        friendly_message: tier.friendly_message(label, probability),
        trend,
    }
}

/// `18` -> `"18%"`, `18.25` -> `"18.3%"`.
pub fn format_probability(probability: f64) -> String {
    format!("{}%", format_number(probability))
}

fn format_number(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        format!("{rounded:.1}")
    }
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - 273.15
}

pub fn kelvin_to_fahrenheit(kelvin: f64) -> f64 {
    kelvin_to_celsius(kelvin) * 9.0 / 5.0 + 32.0
}

pub fn precipitation_rate_to_mm_per_day(kg_per_m2_per_s: f64) -> f64 {
    kg_per_m2_per_s * 86_400.0
}

pub fn mps_to_kmh(meters_per_second: f64) -> f64 {
    meters_per_second * 3.6
}

/// NWS Rothfusz regression. Temperature in °C, relative humidity in percent,
/// result in °C.
pub fn heat_index(temperature_c: f64, relative_humidity: f64) -> f64 {
    let t = temperature_c * 1.8 + 32.0;
    let rh = relative_humidity;
    let hi = -42.379 + 2.049_015_23 * t + 10.143_331_27 * rh
        - 0.224_755_41 * t * rh
        - 6.837_83e-3 * t * t
        - 5.481_717e-2 * rh * rh
        + 1.228_74e-3 * t * t * rh
        + 8.5282e-4 * t * rh * rh
        - 1.99e-6 * t * t * rh * rh;

    (hi - 32.0) * 5.0 / 9.0
}

/// Which side of the threshold counts as an exceedance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    AtOrAbove,
    AtOrBelow,
}

impl Direction {
    fn hits(&self, sample: f64, threshold: f64) -> bool {
        match self {
            Direction::AtOrAbove => sample >= threshold,
            Direction::AtOrBelow => sample <= threshold,
        }
    }
}

/// Percentage of samples that reach the threshold, rounded to one decimal.
pub fn exceedance(samples: &[f64], threshold: f64, direction: Direction) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let hits = samples.iter().filter(|s| direction.hits(**s, threshold)).count();
    let pct = hits as f64 * 100.0 / samples.len() as f64;
    (pct * 10.0).round() / 10.0
}

/// Compare the later half of a yearly series with the earlier half.
pub fn trend(yearly_rates: &[f64]) -> String {
    const MIN_YEARS: usize = 4;
    const STABLE_BAND: f64 = 5.0;

    if yearly_rates.len() < MIN_YEARS {
        return "insufficient data".to_string();
    }

    let mid = yearly_rates.len() / 2;
    let (early, late) = yearly_rates.split_at(mid);
    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len() as f64;
    let delta = mean(late) - mean(early);

    if delta > STABLE_BAND {
        "rising".to_string()
    } else if delta < -STABLE_BAND {
        "falling".to_string()
    } else {
        "stable".to_string()
    }
}
