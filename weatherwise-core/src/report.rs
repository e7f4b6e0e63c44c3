//! Plain-text rendering of a query result: probability cards, a risk gauge
//! and a histogram of per-year rates.

use std::fmt::Write as _;

use crate::{
    ConditionKey, WeatherQueryResponse, WeatherSummary,
    probability::{RiskTier, format_probability},
};

const GAUGE_CELLS: usize = 20;
const BUCKETS: usize = 10;

/// Tips are listed in this order, after the lead summary.
const TIP_ORDER: [ConditionKey; 5] = [
    ConditionKey::VeryWet,
    ConditionKey::VeryHot,
    ConditionKey::VeryUncomfortable,
    ConditionKey::VeryWindy,
    ConditionKey::VeryCold,
];

/// A short, fixed piece of preparation advice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tip {
    pub title: String,
    pub body: String,
}

/// Fixed-width bar for a 0..=100 value.
pub fn gauge(probability: f64) -> String {
    let filled = ((probability.clamp(0.0, 100.0) / 100.0) * GAUGE_CELLS as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(GAUGE_CELLS - filled))
}

/// Counts of values in 10-point buckets; 100 lands in the last bucket.
pub fn histogram(values: &[f64]) -> [usize; BUCKETS] {
    let mut counts = [0; BUCKETS];
    for value in values {
        let idx = ((value.clamp(0.0, 100.0) / 10.0).floor() as usize).min(BUCKETS - 1);
        counts[idx] += 1;
    }
    counts
}

pub fn render(response: &WeatherQueryResponse) -> String {
    let mut out = String::new();
    let query = &response.query;

    let _ = writeln!(out, "{} on {}", query.location.label(), query.date_of_year);
    let _ = writeln!(
        out,
        "Source: {} ({})",
        response.metadata.data_source, response.metadata.time_range
    );

    if response.results.is_empty() {
        out.push_str("\nNo results for the selected conditions.\n");
        return out;
    }

    out.push('\n');
    for (key, result) in &response.results {
        let tier = RiskTier::from_probability(result.probability_percent);
        let _ = writeln!(
            out,
            "{:<12} {:>6}  {:<6}  threshold {} {}{}",
            key.label(),
            format_probability(result.probability_percent),
            tier.as_str(),
            result.threshold.value,
            result.threshold.unit,
            result
                .trend
                .as_deref()
                .map(|t| format!(", trend {t}"))
                .unwrap_or_default(),
        );
    }

    if let Some((key, worst)) = response
        .results
        .iter()
        .max_by(|a, b| a.1.probability_percent.total_cmp(&b.1.probability_percent))
    {
        let _ = writeln!(
            out,
            "\nHighest risk: {} {} {}",
            key.label(),
            gauge(worst.probability_percent),
            format_probability(worst.probability_percent)
        );
    }

    if let Some((key, calmest)) = response
        .results
        .iter()
        .min_by(|a, b| a.1.probability_percent.total_cmp(&b.1.probability_percent))
    {
        let _ = writeln!(
            out,
            "Most stable:  {} {} {}",
            key.label(),
            gauge(calmest.probability_percent),
            format_probability(calmest.probability_percent)
        );
    }

    for (key, result) in &response.results {
        if result.historical_values.is_empty() {
            continue;
        }
        let _ = writeln!(out, "\n{} by year (% of days):", key.label());
        for (i, count) in histogram(&result.historical_values).iter().enumerate() {
            if *count == 0 {
                continue;
            }
            let _ = writeln!(
                out,
                "  {:>3}-{:<3} {} {}",
                i * 10,
                (i + 1) * 10,
                "*".repeat(*count),
                count
            );
        }
    }

    out
}

fn condition_tip(key: ConditionKey, probability: f64) -> Option<Tip> {
    let label = key.label();

    let (title, body) = if probability >= 40.0 {
        let body = match key {
            ConditionKey::VeryHot => {
                "Shift headline activities to cooler hours and expand hydration support."
            }
            ConditionKey::VeryCold => {
                "Secure heating, cover plumbing, and brief vendors on freeze protocols."
            }
            ConditionKey::VeryWet => {
                "Book covered staging, reinforce drainage routes, and warn crews of slick surfaces."
            }
            ConditionKey::VeryWindy => {
                "Anchor signage, avoid tall staging, and prep wind-rated canopies."
            }
            ConditionKey::VeryUncomfortable => {
                "Increase shaded lounges, add fans/misters, and lighten dress expectations."
            }
        };
        (format!("{label} is the top risk"), body)
    } else if probability >= 20.0 {
        let body = match key {
            ConditionKey::VeryHot => {
                "Plan hydration checkpoints and message guests about sun protection."
            }
            ConditionKey::VeryCold => "Schedule warm-up shelters and monitor overnight icing.",
            ConditionKey::VeryWet => {
                "Stage ponchos and flexible indoor options for passing showers."
            }
            ConditionKey::VeryWindy => "Swap delicate décor for wind-resilient fixtures.",
            ConditionKey::VeryUncomfortable => {
                "Add airflow and break areas to keep guests comfortable."
            }
        };
        (format!("{label} is a recurring factor"), body)
    } else if probability >= 5.0 {
        let body = match key {
            ConditionKey::VeryHot => "Keep contingency shade on standby; heat spikes still occur.",
            ConditionKey::VeryCold => "Monitor overnight lows in case of surprise chills.",
            ConditionKey::VeryWet => "Have towels and drying stations ready just in case.",
            ConditionKey::VeryWindy => "Brief crew on securing loose items if gusts pick up.",
            ConditionKey::VeryUncomfortable => "Prepare cooling towels for high humidity moments.",
        };
        (format!("{label} occasionally appears"), body)
    } else {
        return None;
    };

    Some(Tip {
        title,
        body: body.to_string(),
    })
}

/// Deterministic preparation advice: the lead summary, one tip per condition
/// at 5 % or more, then where the numbers come from.
pub fn tips(response: &WeatherQueryResponse, summaries: &[WeatherSummary]) -> Vec<Tip> {
    let mut tips = Vec::new();

    if let Some(lead) = summaries.first() {
        tips.push(Tip {
            title: lead.label.clone(),
            body: lead.friendly_message.clone(),
        });
    }

    tips.extend(TIP_ORDER.iter().filter_map(|key| {
        let result = response.results.get(key)?;
        condition_tip(*key, result.probability_percent)
    }));

    tips.push(Tip {
        title: "Climate baseline".to_string(),
        body: format!(
            "Analysis spans {}. Cite {} when sharing.",
            response.metadata.time_range, response.metadata.data_source
        ),
    });

    tips
}

pub fn render_tips(tips: &[Tip]) -> String {
    let mut out = String::from("Planner tips:\n");
    for tip in tips {
        let _ = writeln!(out, "* {}: {}", tip.title, tip.body);
    }
    out
}
