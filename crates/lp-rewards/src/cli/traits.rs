use crate::cli::common::OutputFormat;
use anyhow::Result;

/// Trait for types that can be exported to various formats
pub trait Exportable {
    fn export(&self, format: OutputFormat) -> Result<String>;
}
