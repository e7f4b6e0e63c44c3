//! Download formats for the last fetched payload.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::WeatherQueryResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(anyhow!("Unknown export format '{s}'. Supported formats: csv, json.")),
        }
    }
}

pub fn to_json(response: &WeatherQueryResponse) -> Result<String> {
    serde_json::to_string_pretty(response).context("Failed to serialize response to JSON")
}

/// One row per condition, a blank line, then `key,value` metadata lines.
pub fn to_csv(response: &WeatherQueryResponse) -> Result<String> {
    let mut rows = csv::Writer::from_writer(Vec::new());
    rows.write_record([
        "condition",
        "probability_percent",
        "threshold_value",
        "threshold_unit",
        "trend",
        "historical_values",
    ])?;

    for (key, result) in &response.results {
        let history = result
            .historical_values
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(";");

        rows.write_record([
            key.as_str().to_string(),
            result.probability_percent.to_string(),
            result.threshold.value.to_string(),
            result.threshold.unit.clone(),
            result.trend.clone().unwrap_or_default(),
            history,
        ])?;
    }

    let mut out = rows
        .into_inner()
        .map_err(csv::IntoInnerError::into_error)
        .context("Failed to flush CSV rows")?;
    out.push(b'\n');

    let query = &response.query;
    let metadata = &response.metadata;
    let mut meta = csv::Writer::from_writer(out);
    for (key, value) in [
        ("source", metadata.data_source.clone()),
        ("time_range", metadata.time_range.clone()),
        ("units", metadata.units.clone()),
        ("generated_at", metadata.generated_at.clone()),
        ("query_location_lat", query.location.lat.to_string()),
        ("query_location_lon", query.location.lon.to_string()),
        ("query_date_of_year", query.date_of_year.to_string()),
    ] {
        meta.write_record([key, value.as_str()])?;
    }

    let bytes = meta
        .into_inner()
        .map_err(csv::IntoInnerError::into_error)
        .context("Failed to flush CSV metadata")?;
    String::from_utf8(bytes).context("CSV output was not valid UTF-8")
}

pub fn render(response: &WeatherQueryResponse, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => to_csv(response),
        ExportFormat::Json => to_json(response),
    }
}

/// `weatherwise_{MMDD}_{YYYY-MM-DD}.{ext}`
pub fn export_file_name(
    response: &WeatherQueryResponse,
    format: ExportFormat,
    today: NaiveDate,
) -> String {
    format!(
        "weatherwise_{}_{}.{}",
        response.query.date_of_year.compact(),
        today.format("%Y-%m-%d"),
        format.extension()
    )
}

/// Write the export into `dir` and return the file's path.
pub fn write_export(
    response: &WeatherQueryResponse,
    format: ExportFormat,
    dir: &Path,
    today: NaiveDate,
) -> Result<PathBuf> {
    let path = dir.join(export_file_name(response, format, today));
    let contents = render(response, format)?;

    fs::write(&path, contents)
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;

    tracing::info!(path = %path.display(), "exported query result");
    Ok(path)
}
