//! Free-text chat input to structured planner updates.
//!
//! Extraction is delegated to a hosted model; this module owns the prompt,
//! the strict shape check on the reply and the fallbacks.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::chat::{ChatCompletion, ChatMessage, CompletionParams};

/// Small, fast model; extraction does not need the large one.
pub const INTENT_MODEL: &str = "llama-3.1-8b-instant";

const INTENT_PROMPT: &str = r#"You are an intent parser for a weather planning application. Extract structured data from user queries.

Extract:
1. location: City, state, or place name (e.g., "Delaware", "Boston", "New York")
2. dateStart: Start date in YYYY-MM-DD format
3. dateEnd: End date for ranges (e.g., "last 10 years")
4. conditions: Weather conditions mentioned, using these names: extremeHeat, frost, heavyRain, strongWind, muggyHeat
5. query_type: One of weather_query, general_chat, clarification

Examples:
- "Weather in Delaware for last 10 years" -> {"location": "Delaware", "dateStart": "2015-01-01", "dateEnd": "2025-01-01", "query_type": "weather_query"}
- "Show me Boston on July 4th 2024" -> {"location": "Boston", "dateStart": "2024-07-04", "query_type": "weather_query"}
- "Extreme heat risk in Arizona" -> {"location": "Arizona", "conditions": ["extremeHeat"], "query_type": "weather_query"}
- "What is this app about?" -> {"query_type": "general_chat"}

Return ONLY valid JSON matching this schema. No markdown, no code blocks."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    WeatherQuery,
    GeneralChat,
    Clarification,
}

/// What the model pulled out of one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedIntent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, rename = "dateStart", skip_serializing_if = "Option::is_none")]
    pub date_start: Option<String>,
    #[serde(default, rename = "dateEnd", skip_serializing_if = "Option::is_none")]
    pub date_end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
    pub query_type: QueryType,
}

impl ParsedIntent {
    pub fn general_chat() -> Self {
        Self {
            location: None,
            date_start: None,
            date_end: None,
            conditions: None,
            query_type: QueryType::GeneralChat,
        }
    }

    /// `dateStart` as a date, when the model produced a well-formed one.
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.date_start
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct RawDateRange {
    start: Option<String>,
    end: Option<String>,
}

/// Models sometimes wrap JSON in a fenced block despite being told not to.
fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

pub fn parse_intent_reply(reply: &str) -> Result<ParsedIntent> {
    serde_json::from_str(strip_code_fences(reply))
        .context("Intent reply did not match the expected shape")
}

pub struct IntentParser<'a> {
    chat: &'a dyn ChatCompletion,
}

impl<'a> IntentParser<'a> {
    pub fn new(chat: &'a dyn ChatCompletion) -> Self {
        Self { chat }
    }

    /// Never fails: anything unexpected degrades to a general-chat intent.
    pub async fn parse(&self, message: &str) -> ParsedIntent {
        match self.try_parse(message).await {
            Ok(intent) => {
                tracing::debug!(?intent, "parsed intent");
                intent
            }
            Err(err) => {
                tracing::warn!("Intent parsing failed: {:#}", err);
                ParsedIntent::general_chat()
            }
        }
    }

    async fn try_parse(&self, message: &str) -> Result<ParsedIntent> {
        let messages = [ChatMessage::system(INTENT_PROMPT), ChatMessage::user(message)];
        let params = CompletionParams {
            model: Some(INTENT_MODEL.to_string()),
            temperature: 0.1,
            max_tokens: 200,
            top_p: None,
            json_response: true,
        };

        let reply = self.chat.complete(&messages, &params).await?;
        parse_intent_reply(&reply)
    }

    /// Turn "last 10 years" and friends into absolute dates; `today..today` on failure.
    pub async fn parse_date_range(&self, expression: &str, today: NaiveDate) -> DateRange {
        let fallback = DateRange {
            start: today,
            end: today,
        };

        let system = format!(
            "Convert relative date expressions to absolute dates. Today is {today}.\n\n\
             Return JSON with {{\"start\": \"YYYY-MM-DD\", \"end\": \"YYYY-MM-DD\"}}\n\n\
             Examples:\n\
             - \"past 5 years\" -> \
             {{\"start\": \"{five_back}-01-01\", \"end\": \"{year}-01-01\"}}\n\
             - \"this year\" -> {{\"start\": \"{year}-01-01\", \"end\": \"{year}-12-31\"}}\n\n\
             Return ONLY valid JSON. No markdown.",
            today = today.format("%Y-%m-%d"),
            year = today.year(),
            five_back = today.year() - 5,
        );
        let messages = [ChatMessage::system(system), ChatMessage::user(expression)];
        let params = CompletionParams {
            model: Some(INTENT_MODEL.to_string()),
            temperature: 0.1,
            max_tokens: 100,
            top_p: None,
            json_response: true,
        };

        let reply = match self.chat.complete(&messages, &params).await {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!("Date parsing failed: {:#}", err);
                return fallback;
            }
        };

        let raw: RawDateRange = match serde_json::from_str(strip_code_fences(&reply)) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!("Date parsing returned invalid JSON: {}", err);
                return fallback;
            }
        };

        let parse = |s: Option<String>| {
            s.and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
                .unwrap_or(today)
        };

        DateRange {
            start: parse(raw.start),
            end: parse(raw.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct CannedChat(Result<String, String>);

    #[async_trait]
    impl ChatCompletion for CannedChat {
        async fn complete(&self, _: &[ChatMessage], params: &CompletionParams) -> Result<String> {
            assert!(params.json_response);
            assert_eq!(params.model.as_deref(), Some(INTENT_MODEL));
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[tokio::test]
    async fn weather_query_reply_is_parsed() {
        let reply = serde_json::json!({
            "location": "Boston",
            "dateStart": "2024-07-04",
            "conditions": ["extremeHeat"],
            "query_type": "weather_query"
        });
        let chat = CannedChat(Ok(reply.to_string()));
        let intent = IntentParser::new(&chat).parse("Boston heat on July 4th 2024").await;

        assert_eq!(intent.query_type, QueryType::WeatherQuery);
        assert_eq!(intent.location.as_deref(), Some("Boston"));
        assert_eq!(intent.start_date(), NaiveDate::from_ymd_opt(2024, 7, 4));
        assert_eq!(intent.conditions, Some(vec!["extremeHeat".to_string()]));
    }

    #[tokio::test]
    async fn fenced_reply_is_accepted() {
        let chat = CannedChat(Ok("```json\n{\"query_type\": \"clarification\"}\n```".into()));
        let intent = IntentParser::new(&chat).parse("hmm").await;
        assert_eq!(intent.query_type, QueryType::Clarification);
    }

    #[tokio::test]
    async fn malformed_or_failed_replies_fall_back_to_general_chat() {
        for canned in [
            Ok("not json".to_string()),
            Ok(r#"{"location": "Paris"}"#.to_string()),
            Ok(r#"{"query_type": "forecast"}"#.to_string()),
            Err("timeout".to_string()),
        ] {
            let chat = CannedChat(canned);
            let intent = IntentParser::new(&chat).parse("anything").await;
            assert_eq!(intent, ParsedIntent::general_chat());
        }
    }

    #[test]
    fn bad_start_date_is_ignored() {
        let intent = parse_intent_reply(r#"{"dateStart": "July 4", "query_type": "weather_query"}"#)
            .unwrap();
        assert_eq!(intent.start_date(), None);
    }

    #[tokio::test]
    async fn date_range_parsing_and_fallbacks() {
        let chat = CannedChat(Ok(r#"{"start": "2020-01-01", "end": "2025-01-01"}"#.into()));
        let range = IntentParser::new(&chat).parse_date_range("past 5 years", today()).await;
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());

        let chat = CannedChat(Ok(r#"{"start": "2024-06-21"}"#.into()));
        let range = IntentParser::new(&chat).parse_date_range("summer", today()).await;
        assert_eq!(range.end, today());

        let chat = CannedChat(Err("down".into()));
        let range = IntentParser::new(&chat).parse_date_range("whenever", today()).await;
        let expected = DateRange {
            start: today(),
            end: today(),
        };
        assert_eq!(range, expected);
    }
}
