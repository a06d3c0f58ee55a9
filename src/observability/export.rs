//! Request log export (JSON and CSV).

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::request_log::LogEntry;

pub const CSV_HEADER: &str = "id,timestamp,method,path,statusCode,responseTime,ip,userAgent,error";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::Csv => "text/csv; charset=utf-8",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

pub fn export(entries: &[LogEntry], format: ExportFormat) -> Result<String, ExportError> {
    match format {
        ExportFormat::Json => to_json(entries),
        ExportFormat::Csv => Ok(to_csv(entries)),
    }
}

/// Pretty-printed JSON array of full entries.
pub fn to_json(entries: &[LogEntry]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(entries)?)
}

/// One header line plus one line per entry.
pub fn to_csv(entries: &[LogEntry]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + entries.len() * 128);
    out.push_str(CSV_HEADER);
    for e in entries {
        let ctx = &e.context;
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "\n{},{},{},{},{},{},{},{},{}",
            ctx.id,
            ctx.timestamp.to_rfc3339(),
            ctx.method,
            quote(&ctx.path),
            e.status_code.map(|s| s.to_string()).unwrap_or_default(),
            e.response_time.map(|t| format!("{t:.3}")).unwrap_or_default(),
            ctx.ip,
            quote(&ctx.user_agent),
            quote(e.error.as_deref().unwrap_or_default()),
        );
    }
    out
}

fn quote(field: &str) -> String {
    let cleaned = field.replace(['\r', '\n'], " ");
    format!("\"{}\"", cleaned.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::context::RequestContext;
    use crate::observability::request_log::{Completion, RequestLogger};
    use std::collections::BTreeMap;

    fn logger_with(n: usize) -> RequestLogger {
        let logger = RequestLogger::new(10);
        for i in 0..n {
            let id = format!("id-{i}");
            logger.open(RequestContext {
                id: id.clone(),
                timestamp: chrono::Utc::now(),
                method: "GET".into(),
                url: "http://localhost/a".into(),
                path: "/a,b".into(),
                query: BTreeMap::new(),
                headers: BTreeMap::new(),
                ip: "10.0.0.1".into(),
                user_agent: "Mozilla \"quoted\"".into(),
                referer: None,
            });
            logger.close(
                &id,
                Completion {
                    status: 200,
                    response_time_ms: 5.0,
                    response_size: None,
                    error: None,
                },
            );
        }
        logger
    }

    #[test]
    fn test_csv_has_header_plus_one_line_per_entry() {
        let logger = logger_with(3);
        let csv = to_csv(&logger.entries());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("id-0,"));
        assert!(lines[1].contains("\"/a,b\""));
        assert!(lines[1].contains("\"Mozilla \"\"quoted\"\"\""));
        assert!(lines[1].ends_with(",\"\""));
    }

    #[test]
    fn test_csv_empty_log_is_header_only() {
        assert_eq!(to_csv(&[]), CSV_HEADER);
    }

    #[test]
    fn test_json_array_of_entries() {
        let logger = logger_with(2);
        let json = logger.export(ExportFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let items = parsed.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], "id-0");
        assert_eq!(items[0]["statusCode"], 200);
        assert_eq!(items[0]["state"], "closed");
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!(matches!(
            "xml".parse::<ExportFormat>(),
            Err(ExportError::UnsupportedFormat(_))
        ));
    }
}
