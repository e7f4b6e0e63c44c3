//! Natural-language planning advice generated from a query result.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Write as _};

use crate::{
    ConditionKey, ConditionResult, DayOfYear, QueryMetadata, WeatherQuery, WeatherQueryResponse,
    WeatherSummary,
    chat::{ChatCompletion, ChatMessage, CompletionParams},
    probability::{build_summaries, format_probability},
};

const SYSTEM_PROMPT: &str = "You are a friendly planning advisor helping people understand NASA \
weather data. Use simple language, avoid jargon, focus on practical actions.";

const HEADER: &str = "You are a planning assistant using NASA-derived historical climate \
probabilities. Provide practical, easy-to-understand advice (3-4 sentences) for farming, travel, \
outdoor events or holiday planning as appropriate. Always mention the location name. Do not make \
deterministic forecasts: these values describe what typically happened in the historical record.";

/// Body of an insight request; matches what the query endpoint returned plus
/// an optional question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightRequest {
    pub query: WeatherQuery,
    #[serde(default)]
    pub results: BTreeMap<ConditionKey, ConditionResult>,
    #[serde(default)]
    pub metadata: QueryMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries: Option<Vec<WeatherSummary>>,
    #[serde(
        default,
        rename = "userPrompt",
        alias = "user_prompt",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_prompt: Option<String>,
}

impl InsightRequest {
    pub fn from_response(response: &WeatherQueryResponse, user_prompt: Option<String>) -> Self {
        Self {
            query: response.query.clone(),
            results: response.results.clone(),
            metadata: response.metadata.clone(),
            summaries: Some(build_summaries(response)),
            user_prompt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightResponse {
    pub insight: String,
}

fn season(day: DayOfYear) -> &'static str {
    // Northern hemisphere.
    match day.month() {
        12 | 1 | 2 => "winter",
        3..=5 => "spring",
        6..=8 => "summer",
        _ => "fall",
    }
}

fn condition_lines(results: &BTreeMap<ConditionKey, ConditionResult>) -> String {
    results
        .iter()
        .map(|(key, result)| {
            let mut line = format!(
                "- {}: {} of days historically",
                key.label(),
                format_probability(result.probability_percent)
            );
            let _ = write!(
                line,
                "; threshold {} {}",
                result.threshold.value, result.threshold.unit
            );
            if let Some(trend) = &result.trend {
                let _ = write!(line, "; trend {trend}");
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn summary_lines(summaries: Option<&[WeatherSummary]>) -> String {
    match summaries {
        Some(list) if !list.is_empty() => list
            .iter()
            .map(|s| match &s.trend {
                Some(trend) => format!("* {}: {} (trend: {trend})", s.label, s.friendly_message),
                None => format!("* {}: {}", s.label, s.friendly_message),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => "None provided".to_string(),
    }
}

fn or_fallback<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() { fallback } else { value }
}

pub fn build_prompt(request: &InsightRequest) -> String {
    let conditions = condition_lines(&request.results);
    let conditions = if conditions.is_empty() {
        "No hazard probabilities provided.".to_string()
    } else {
        conditions
    };

    let mut prompt = format!(
        "{HEADER}\n\n\
         Location: {location}\n\
         Date window: around {day} (typically {season} season)\n\
         Historical period: {range}\n\
         Data source: {source}\n\n\
         Hazard probabilities:\n{conditions}\n\n\
         Summaries:\n{summaries}\n",
        location = request.query.location.label(),
        day = request.query.date_of_year,
        season = season(request.query.date_of_year),
        range = or_fallback(&request.metadata.time_range, "Unknown range"),
        source = or_fallback(&request.metadata.data_source, "NASA datasets"),
        summaries = summary_lines(request.summaries.as_deref()),
    );

    let question = request.user_prompt.as_deref().map(str::trim);
    if let Some(question) = question.filter(|q| !q.is_empty()) {
        let _ = write!(prompt, "\nUser question: {question}\n");
    }

    prompt.push_str("\nRespond with planning recommendations that acknowledge uncertainty.");
    prompt
}

/// Ask the chat model for advice about one query result.
pub async fn generate_insight(
    client: &dyn ChatCompletion,
    request: &InsightRequest,
) -> Result<InsightResponse> {
    let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(build_prompt(request))];
    let params = CompletionParams {
        model: None,
        temperature: 0.5,
        max_tokens: 300,
        top_p: Some(0.9),
        json_response: false,
    };

    let insight = client.complete(&messages, &params).await?;
    tracing::info!(chars = insight.len(), "generated planner insight");

    Ok(InsightResponse { insight })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConditionSet, Location, Threshold};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingChat {
        seen: Mutex<Vec<(Vec<ChatMessage>, f32)>>,
    }

    #[async_trait]
    impl ChatCompletion for RecordingChat {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            params: &CompletionParams,
        ) -> Result<String> {
            self.seen.lock().unwrap().push((messages.to_vec(), params.temperature));
            Ok("Bring shade tents.".to_string())
        }
    }

    fn request(user_prompt: Option<&str>) -> InsightRequest {
        let mut results = BTreeMap::new();
        results.insert(
            ConditionKey::VeryHot,
            ConditionResult {
                probability_percent: 42.0,
                threshold: Threshold {
                    value: 32.2,
                    unit: "°C".into(),
                },
                historical_values: vec![40.0, 44.0],
                trend: Some("rising".into()),
            },
        );

        InsightRequest {
            query: WeatherQuery {
                location: Location::new(39.74, -104.99, Some("Denver".into())).unwrap(),
                date_of_year: "07-04".parse().unwrap(),
                conditions: [ConditionKey::VeryHot].into_iter().collect::<ConditionSet>(),
            },
            results,
            metadata: QueryMetadata {
                time_range: "2001-01-01 to 2023-12-31".into(),
                ..Default::default()
            },
            summaries: None,
            user_prompt: user_prompt.map(str::to_string),
        }
    }

    #[test]
    fn prompt_includes_location_hazards_and_season() {
        let prompt = build_prompt(&request(Some("Is a picnic a good idea?")));

        assert!(prompt.contains("Location: Denver"));
        assert!(prompt.contains("around 07-04 (typically summer season)"));
        assert!(prompt.contains(
            "- Extreme Heat: 42% of days historically; threshold 32.2 °C; trend rising"
        ));
        assert!(prompt.contains("Historical period: 2001-01-01 to 2023-12-31"));
        assert!(prompt.contains("Data source: NASA datasets"));
        assert!(prompt.contains("Summaries:\nNone provided"));
        assert!(prompt.contains("User question: Is a picnic a good idea?"));
    }

    #[test]
    fn prompt_without_results_or_question() {
        let mut req = request(Some("   "));
        req.results.clear();
        req.query.location.name = None;

        let prompt = build_prompt(&req);
        assert!(prompt.contains("No hazard probabilities provided."));
        assert!(prompt.contains("Location: lat 39.74, lon -104.99"));
        assert!(!prompt.contains("User question"));
    }

    #[test]
    fn request_accepts_camel_case_prompt_and_summaries() {
        let json = serde_json::json!({
            "query": {
                "location": {"lat": 1.0, "lon": 2.0},
                "date_of_year": "01-15",
                "conditions": ["very_cold"]
            },
            "results": {},
            "metadata": {"data_source": "x"},
            "summaries": [{"label": "Hard Freeze", "probability": 60.0, "friendlyMessage": "cold"}],
            "userPrompt": "Frost?"
        });
        let req: InsightRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.user_prompt.as_deref(), Some("Frost?"));
        assert_eq!(req.summaries.as_ref().unwrap()[0].friendly_message, "cold");
        assert!(build_prompt(&req).contains("(typically winter season)"));
    }

    #[tokio::test]
    async fn generate_insight_sends_system_and_user_messages() {
        let chat = RecordingChat::default();
        let out = generate_insight(&chat, &request(None)).await.unwrap();

        assert_eq!(out.insight, "Bring shade tents.");
        let seen = chat.seen.lock().unwrap();
        let (messages, temperature) = &seen[0];
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert!(messages[1].content.contains("Extreme Heat"));
        assert!((temperature - 0.5).abs() < f32::EPSILON);
    }
}
