use crate::cli::traits::Exportable;
use anyhow::Result;
use chrono::{DateTime, NaiveDate};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::{File, create_dir_all},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::info;

/// Unified output format for all CLI commands
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    #[value(name = "csv")]
    Csv,
    #[value(name = "json")]
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Json => write!(f, "json"),
            Self::JsonPretty => write!(f, "json-pretty"),
        }
    }
}

/// Common output options for CLI commands
#[derive(Args, Debug, Clone)]
pub struct OutputOptions {
    /// Output format for exports
    #[arg(short = 'f', long, default_value = "json-pretty")]
    pub output_format: OutputFormat,

    /// Directory to export files
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Specific output file path
    #[arg(long, value_name = "FILE")]
    pub output_file: Option<PathBuf>,
}

impl OutputOptions {
    /// Use `dir` when neither an output directory nor a file was given
    pub fn or_dir(mut self, dir: &Path) -> Self {
        if self.output_dir.is_none() && self.output_file.is_none() {
            self.output_dir = Some(dir.to_path_buf());
        }
        self
    }

    /// Write exportable data to file or stdout
    pub fn write<T: Exportable>(&self, data: &T, default_filename: &str) -> Result<()> {
        let content = data.export(self.output_format)?;

        if let Some(ref path) = self.output_file {
            if let Some(parent) = path.parent() {
                create_dir_all(parent)?;
            }
            let mut file = File::create(path)?;
            file.write_all(content.as_bytes())?;
            info!("Exported to: {}", path.display());
        } else if let Some(ref dir) = self.output_dir {
            create_dir_all(dir)?;

            let extension = match self.output_format {
                OutputFormat::Csv => "csv",
                OutputFormat::Json | OutputFormat::JsonPretty => "json",
            };

            let file_path = dir.join(format!("{default_filename}.{extension}"));
            let mut file = File::create(&file_path)?;
            file.write_all(content.as_bytes())?;
            info!("Exported to: {}", file_path.display());
        } else {
            println!("{content}");
        }

        Ok(())
    }
}

/// Helper function to convert a collection to CSV format
pub fn collection_to_csv<T: Serialize>(records: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    let data = wtr.into_inner()?;
    Ok(String::from_utf8(data)?)
}

/// Helper function to convert data to JSON format
pub fn to_json_string<T: Serialize>(data: &T, pretty: bool) -> Result<String> {
    if pretty {
        Ok(serde_json::to_string_pretty(data)?)
    } else {
        Ok(serde_json::to_string(data)?)
    }
}

/// Accepts unix seconds, RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC)
pub fn parse_timestamp(value: &str) -> std::result::Result<i64, String> {
    if let Ok(seconds) = value.parse::<i64>() {
        return Ok(seconds);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.timestamp());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc().timestamp())
        .ok_or_else(|| format!("invalid timestamp: {value}"))
}
