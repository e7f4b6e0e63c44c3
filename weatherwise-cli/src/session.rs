use anyhow::{Context, Result};
use chrono::Utc;
use inquire::InquireError;

use weatherwise_core::{
    ChatCompletion, Planner,
    geocode::Geocoder,
    insights::{InsightRequest, generate_insight},
    intent::IntentParser,
    planner::IntentOutcome,
    report,
};

const SUGGESTIONS: &[&str] = &[
    "What are the main weather risks for this location?",
    "Is this suitable for outdoor events?",
    "Heavy rain risk in London on November 5th",
];

/// What one chat turn produced.
#[derive(Debug, Default)]
pub struct Turn {
    pub outcome: IntentOutcome,
    /// Set when the turn loaded new data.
    pub report: Option<String>,
    pub insight: Option<String>,
    pub notice: Option<String>,
    /// A failure that cut the turn short; the session stays usable.
    pub error: Option<String>,
}

pub struct ChatSession<'a> {
    planner: Planner,
    geocoder: Geocoder,
    chat: &'a dyn ChatCompletion,
}

impl<'a> ChatSession<'a> {
    pub fn new(planner: Planner, geocoder: Geocoder, chat: &'a dyn ChatCompletion) -> Self {
        Self {
            planner,
            geocoder,
            chat,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        println!(
            "WeatherWise assistant ({} data). Type 'exit' to leave.",
            self.planner.source_name()
        );
        println!("Try: {}", SUGGESTIONS.join(" | "));

        match self.planner.run_query().await {
            Ok(Some(_)) => self.print_loaded(),
            Ok(None) => {}
            Err(e) => eprintln!("Error: could not load climate data: {e:#}"),
        }

        loop {
            let line = match inquire::Text::new(">").prompt() {
                Ok(line) => line,
                Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => break,
                Err(e) => return Err(e).context("Failed to read chat input"),
            };

            let message = line.trim();
            if message.is_empty() {
                continue;
            }
            if matches!(message, "exit" | "quit") {
                break;
            }

            let turn = self.handle(message).await;
            if let Some(notice) = &turn.notice {
                println!("{notice}");
            }
            if let Some(report) = &turn.report {
                println!("{report}");
            }
            if let Some(insight) = &turn.insight {
                println!("\n{insight}\n");
            }
            if let Some(error) = &turn.error {
                eprintln!("Error: {error}");
            }
        }

        Ok(())
    }

    fn print_loaded(&self) {
        if let Some(outcome) = self.planner.last() {
            let query = &outcome.response.query;
            println!(
                "NASA data loaded for {} on {}.",
                query.location.label(),
                query.date_of_year
            );
        }
    }

    /// Parse the message, update the selection, re-query when it changed,
    /// then ask for advice about whatever data is loaded.
    ///
    /// Failures end up in [`Turn::error`] instead of ending the session.
    pub async fn handle(&mut self, message: &str) -> Turn {
        let parser = IntentParser::new(self.chat);
        let mut intent = parser.parse(message).await;

        // Relative expressions ("last 10 years") come back verbatim in dateStart.
        if intent.start_date().is_none() {
            if let Some(raw) = intent.date_start.clone() {
                let today = Utc::now().date_naive();
                let range = parser.parse_date_range(&raw, today).await;
                if range.start != today || range.end != today {
                    intent.date_start = Some(range.start.format("%Y-%m-%d").to_string());
                }
            }
        }

        let outcome = self.planner.state.apply_intent(&intent, &self.geocoder).await;

        let mut turn = Turn::default();

        if let Some(place) = &outcome.unresolved_location {
            turn.notice = Some(format!(
                "Could not find '{place}'; keeping the current location."
            ));
        }

        if outcome.changed() || self.planner.last().is_none() {
            match self.planner.run_query().await {
                Ok(Some(loaded)) => {
                    let tips = report::tips(&loaded.response, &loaded.summaries);
                    turn.report = Some(format!(
                        "{}\n{}",
                        report::render(&loaded.response),
                        report::render_tips(&tips)
                    ));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("chat query failed: {:#}", e);
                    turn.error = Some(format!("Could not load climate data: {e:#}"));
                    turn.outcome = outcome;
                    return turn;
                }
            }
        }

        match self.planner.last() {
            Some(loaded) => {
                let request =
                    InsightRequest::from_response(&loaded.response, Some(message.to_string()));
                match generate_insight(self.chat, &request).await {
                    Ok(response) => turn.insight = Some(response.insight),
                    Err(e) => {
                        tracing::warn!("chat insight failed: {:#}", e);
                        turn.error = Some(format!("Could not generate advice: {e:#}"));
                    }
                }
            }
            None => {
                turn.notice.get_or_insert_with(|| {
                    "Tell me a place to start, e.g. 'extreme heat in Denver on July 4th'."
                        .to_string()
                });
            }
        }

        turn.outcome = outcome;
        turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use weatherwise_core::{
        ConditionKey, GeocodingConfig, PlannerError, PlannerState,
        chat::{ChatMessage, CompletionParams},
        source::DemoSource,
    };

    /// Answers intent calls with a canned JSON reply and everything else with advice.
    #[derive(Debug)]
    struct ScriptedChat {
        intent_reply: String,
        prompts: Mutex<Vec<String>>,
        rate_limited: AtomicBool,
    }

    impl ScriptedChat {
        fn new(intent_reply: &str) -> Self {
            Self {
                intent_reply: intent_reply.to_string(),
                prompts: Mutex::new(vec![]),
                rate_limited: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ChatCompletion for ScriptedChat {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            params: &CompletionParams,
        ) -> anyhow::Result<String> {
            if params.json_response {
                let is_date_prompt = messages
                    .first()
                    .is_some_and(|m| m.content.starts_with("Convert relative"));
                if is_date_prompt {
                    return Ok(r#"{"start": "2015-08-01", "end": "2025-08-01"}"#.to_string());
                }
                return Ok(self.intent_reply.clone());
            }
            if self.rate_limited.load(Ordering::SeqCst) {
                return Err(PlannerError::Upstream {
                    service: "Groq",
                    status: 429,
                    body: "rate limited".into(),
                }
                .into());
            }
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().unwrap().push(last);
            Ok("Plan for shade.".to_string())
        }
    }

    fn session(chat: &ScriptedChat) -> ChatSession<'_> {
        let geocoder = Geocoder::from_config(&GeocodingConfig {
            base_url: "http://127.0.0.1:9".into(),
            user_agent: "test".into(),
        })
        .unwrap();
        let source = Box::new(DemoSource::new().unwrap());
        let planner = Planner::with_state(source, PlannerState::default());
        ChatSession::new(planner, geocoder, chat)
    }

    #[tokio::test]
    async fn weather_message_loads_data_and_answers() {
        let chat = ScriptedChat::new(
            r#"{"location": "Denver", "dateStart": "2024-07-04",
                "conditions": ["extremeHeat"], "query_type": "weather_query"}"#,
        );
        let mut session = session(&chat);

        let turn = session.handle("Extreme heat in Denver on July 4th 2024?").await;

        assert!(turn.outcome.location_changed);
        assert!(turn.report.as_deref().unwrap().contains("Denver, CO, USA on 07-04"));
        assert_eq!(turn.insight.as_deref(), Some("Plan for shade."));

        let prompts = chat.prompts.lock().unwrap();
        assert!(prompts[0].contains("User question: Extreme heat in Denver on July 4th 2024?"));
        assert!(prompts[0].contains("Extreme Heat"));
        assert_eq!(
            session.planner.state.conditions.iter().collect::<Vec<_>>(),
            vec![ConditionKey::VeryHot]
        );
    }

    #[tokio::test]
    async fn general_chat_without_location_asks_for_one() {
        let chat = ScriptedChat::new(r#"{"query_type": "general_chat"}"#);
        let mut session = session(&chat);

        let turn = session.handle("What is this app about?").await;

        assert!(turn.report.is_none());
        assert!(turn.insight.is_none());
        assert!(turn.notice.unwrap().starts_with("Tell me a place"));
    }

    #[tokio::test]
    async fn relative_date_is_resolved_before_applying() {
        let chat = ScriptedChat::new(
            r#"{"location": "Boston", "dateStart": "last 10 years",
                "query_type": "weather_query"}"#,
        );
        let mut session = session(&chat);

        let turn = session.handle("Boston over the last 10 years").await;

        assert!(turn.report.is_some());
        assert_eq!(session.planner.state.date_of_year.to_string(), "08-01");
    }

    #[tokio::test]
    async fn failed_turn_reports_error_and_session_keeps_going() {
        let chat = ScriptedChat::new(
            r#"{"location": "Denver", "conditions": ["heat"], "query_type": "weather_query"}"#,
        );
        chat.rate_limited.store(true, Ordering::SeqCst);
        let mut session = session(&chat);

        let turn = session.handle("heat in Denver").await;

        assert!(turn.report.is_some());
        assert!(turn.insight.is_none());
        assert!(turn.error.as_deref().unwrap().contains("status 429"));
        assert!(session.planner.last().is_some());

        chat.rate_limited.store(false, Ordering::SeqCst);
        let turn = session.handle("Is it still hot?").await;

        assert!(turn.error.is_none());
        assert_eq!(turn.insight.as_deref(), Some("Plan for shade."));
    }
}
