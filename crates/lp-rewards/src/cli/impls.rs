use crate::cli::{
    common::{OutputFormat, collection_to_csv, to_json_string},
    inspect::{PeriodRow, StackRow},
    traits::Exportable,
};
use anyhow::Result;
use lp_rewards::{ingestor::types::ValuePoint, report::PayoutReport};

impl Exportable for PayoutReport {
    fn export(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Csv => PayoutReport::to_csv(self),
            OutputFormat::Json => PayoutReport::to_json(self, false),
            OutputFormat::JsonPretty => PayoutReport::to_json(self, true),
        }
    }
}

impl Exportable for Vec<ValuePoint> {
    fn export(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Csv => collection_to_csv(self),
            OutputFormat::Json => to_json_string(self, false),
            OutputFormat::JsonPretty => to_json_string(self, true),
        }
    }
}

impl Exportable for Vec<StackRow> {
    fn export(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Csv => collection_to_csv(self),
            OutputFormat::Json => to_json_string(self, false),
            OutputFormat::JsonPretty => to_json_string(self, true),
        }
    }
}

impl Exportable for Vec<PeriodRow> {
    fn export(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Csv => collection_to_csv(self),
            OutputFormat::Json => to_json_string(self, false),
            OutputFormat::JsonPretty => to_json_string(self, true),
        }
    }
}
