use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use weatherwise_core::{
    ChatProviderId, ConditionKey, ConditionSet, Config, DayOfYear, Location, Planner, PlannerState,
    chat::default_client_from_config,
    export::{self, ExportFormat},
    geocode::Geocoder,
    insights::{InsightRequest, generate_insight},
    report, source_from_config,
};

use crate::{server, session};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "weatherwise",
    version,
    about = "Historical weather-risk odds and AI planning advice"
)]
pub struct Cli {
    /// Use the bundled demo data instead of NASA POWER.
    #[arg(long, global = true)]
    pub demo: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a chat provider.
    Configure {
        /// Provider short name, e.g. "groq" or "together".
        provider: String,
    },

    /// Show risk probabilities for a place and date.
    Query {
        #[command(flatten)]
        target: TargetArgs,

        /// Print the raw JSON payload instead of the text report.
        #[arg(long)]
        json: bool,
    },

    /// Ask the AI for planning advice about a place and date.
    Insight {
        #[command(flatten)]
        target: TargetArgs,

        /// Optional question to steer the advice.
        #[arg(long)]
        prompt: Option<String>,
    },

    /// Interactive chat: free text updates the place, date and conditions.
    Chat {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Save the query result as CSV or JSON.
    Export {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, value_enum, default_value_t = FormatArg::Csv)]
        format: FormatArg,

        /// Directory to write into; defaults to the current one.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Resolve a place name, or coordinates with --reverse.
    Geocode {
        /// Place name to look up.
        #[arg(required_unless_present = "reverse")]
        place: Option<String>,

        /// Reverse-geocode LAT LON instead.
        #[arg(long, num_args = 2, value_names = ["LAT", "LON"], allow_negative_numbers = true)]
        reverse: Option<Vec<f64>>,
    },

    /// Run the HTTP backend.
    Serve {
        /// Address to listen on; defaults to the configured `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Where and when to look, and what to look for.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Place name (geocoded); alternative to --lat/--lon.
    #[arg(long, conflicts_with_all = ["lat", "lon"])]
    pub place: Option<String>,

    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    pub lat: Option<f64>,

    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Day of year as MM-DD; defaults to today.
    #[arg(long)]
    pub date: Option<String>,

    /// Condition to include (repeatable); defaults to all five.
    #[arg(long = "condition", short = 'c', value_parser = parse_condition)]
    pub conditions: Vec<ConditionKey>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    Csv,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Csv => ExportFormat::Csv,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

fn parse_condition(s: &str) -> Result<ConditionKey, String> {
    ConditionKey::try_from(s).map_err(|e| e.to_string())
}

impl TargetArgs {
    /// Build planner state; a place name is resolved through the geocoder,
    /// bare coordinates are reverse-geocoded for a friendly label.
    pub async fn resolve(&self, geocoder: &Geocoder) -> Result<PlannerState> {
        let mut state = PlannerState::default();

        if let Some(date) = &self.date {
            state.date_of_year = date.parse::<DayOfYear>()?;
        }

        if !self.conditions.is_empty() {
            state.conditions = self.conditions.iter().copied().collect::<ConditionSet>();
        }

        state.location = match (&self.place, self.lat, self.lon) {
            (Some(place), _, _) => Some(geocoder.require(place).await?),
            (None, Some(lat), Some(lon)) => {
                let name = geocoder.reverse(lat, lon).await;
                Some(Location::new(lat, lon, name)?)
            }
            _ => None,
        };

        Ok(state)
    }

    fn has_location(&self) -> bool {
        self.place.is_some() || (self.lat.is_some() && self.lon.is_some())
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut config = Config::load()?;
        if self.demo {
            config.data.demo_mode = true;
        }

        match self.command {
            Command::Configure { provider } => configure(&provider),
            Command::Query { target, json } => {
                let planner = query_planner(&config, &target).await?;
                let outcome = planner
                    .last()
                    .ok_or_else(|| anyhow!("No query result produced"))?;

                if json {
                    println!("{}", export::to_json(&outcome.response)?);
                } else {
                    print!("{}", report::render(&outcome.response));
                    println!();
                    let tips = report::tips(&outcome.response, &outcome.summaries);
                    print!("{}", report::render_tips(&tips));
                }
                Ok(())
            }
            Command::Insight { target, prompt } => {
                let client = default_client_from_config(&config)?;
                let planner = query_planner(&config, &target).await?;
                let outcome = planner
                    .last()
                    .ok_or_else(|| anyhow!("No query result produced"))?;

                let request = InsightRequest::from_response(&outcome.response, prompt);
                let insight = generate_insight(&client, &request).await?;
                println!("{}", insight.insight);
                Ok(())
            }
            Command::Chat { target } => {
                let geocoder = Geocoder::from_config(&config.geocoding)?;
                let state = target.resolve(&geocoder).await?;
                let client = default_client_from_config(&config)?;
                let planner = Planner::with_state(source_from_config(&config)?, state);

                session::ChatSession::new(planner, geocoder, &client).run().await
            }
            Command::Export { target, format, out } => {
                let planner = query_planner(&config, &target).await?;
                let outcome = planner
                    .last()
                    .ok_or_else(|| anyhow!("No query result produced"))?;

                let dir = match out {
                    Some(dir) => dir,
                    None => std::env::current_dir().context("Failed to read current directory")?,
                };
                let path = export::write_export(
                    &outcome.response,
                    format.into(),
                    &dir,
                    Utc::now().date_naive(),
                )?;
                println!("Saved {}", path.display());
                Ok(())
            }
            Command::Geocode { place, reverse } => {
                let geocoder = Geocoder::from_config(&config.geocoding)?;
                match (reverse.as_deref(), place) {
                    (Some([lat, lon]), _) => match geocoder.reverse(*lat, *lon).await {
                        Some(name) => println!("{name}"),
                        None => println!("No place name found for {lat}, {lon}"),
                    },
                    (_, Some(place)) => {
                        let location = geocoder.require(&place).await?;
                        println!("{}: {:.4}, {:.4}", location.label(), location.lat, location.lon);
                    }
                    _ => return Err(anyhow!("Provide a place name or --reverse LAT LON")),
                }
                Ok(())
            }
            Command::Serve { bind } => {
                let bind = bind.unwrap_or_else(|| config.server.bind.clone());
                server::serve(config, &bind).await
            }
        }
    }
}

fn configure(provider: &str) -> Result<()> {
    let id = ChatProviderId::try_from(provider)?;

    let api_key = inquire::Password::new(&format!("{id} API key:"))
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let path = Config::config_file_path()?;
    store_api_key(&path, id, &api_key, |id| {
        inquire::Confirm::new(&format!("Use {id} as the default provider?"))
            .with_default(false)
            .prompt()
            .context("Failed to read answer")
    })?;

    println!("Saved credentials for {id} to {}", path.display());
    Ok(())
}

/// Add a key to the config file. Only the file's own contents are rewritten:
/// environment overrides and command-line flags never reach the disk.
fn store_api_key<F>(path: &Path, id: ChatProviderId, api_key: &str, make_default: F) -> Result<()>
where
    F: FnOnce(ChatProviderId) -> Result<bool>,
{
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }

    let mut config = Config::load_from(path)?;
    config.upsert_provider_api_key(id, api_key.to_string());

    if config.default_provider_id().ok() != Some(id) && make_default(id)? {
        config.set_default_provider(id);
    }

    config.save_to(path)
}

/// Resolve the target, run one query, and hand back the planner holding the result.
async fn query_planner(config: &Config, target: &TargetArgs) -> Result<Planner> {
    if !target.has_location() {
        return Err(anyhow!("Provide a location with --place or --lat/--lon"));
    }

    let geocoder = Geocoder::from_config(&config.geocoding)?;
    let state = target.resolve(&geocoder).await?;
    let mut planner = Planner::with_state(source_from_config(config)?, state);
    planner.run_query().await?;
    Ok(planner)
}
