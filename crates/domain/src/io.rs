use serde::{Deserialize, Serialize};

use crate::{error::DomainError, summary::ConversionSummary};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Yaml,
}

pub trait SummaryExporter {
    fn export(
        &self,
        summary: &ConversionSummary,
        format: ExportFormat,
    ) -> Result<Vec<u8>, DomainError>;
}

pub struct JsonExporter;

impl SummaryExporter for JsonExporter {
    fn export(
        &self,
        summary: &ConversionSummary,
        format: ExportFormat,
    ) -> Result<Vec<u8>, DomainError> {
        match format {
            ExportFormat::Json => serde_json::to_vec_pretty(summary)
                .map_err(|err| DomainError::Serialization(err.to_string())),
            other => Err(DomainError::validation(format!(
                "JsonExporter cannot handle {:?}",
                other
            ))),
        }
    }
}

pub struct YamlExporter;

impl SummaryExporter for YamlExporter {
    fn export(
        &self,
        summary: &ConversionSummary,
        format: ExportFormat,
    ) -> Result<Vec<u8>, DomainError> {
        match format {
            ExportFormat::Yaml => serde_yaml::to_string(summary)
                .map(String::into_bytes)
                .map_err(|err| DomainError::Serialization(err.to_string())),
            other => Err(DomainError::validation(format!(
                "YamlExporter cannot handle {:?}",
                other
            ))),
        }
    }
}
