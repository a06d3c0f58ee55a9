use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::observability::export::ExportFormat;
use crate::observability::request_log::{LogEntry, LogFilter, LogQuery, MetricsSnapshot};

const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub retained_entries: usize,
    pub log_capacity: usize,
}

#[derive(Debug, Deserialize)]
pub struct LogsParams {
    pub limit: Option<usize>,
    pub path: Option<String>,
    pub filter: Option<LogFilter>,
}

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    pub format: Option<String>,
}

#[derive(Serialize)]
pub struct Cleared {
    pub cleared: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
        retained_entries: state.logger.len(),
        log_capacity: state.logger.capacity(),
    })
}

pub async fn get_metrics(State(state): State<AdminState>) -> Json<MetricsSnapshot> {
    Json(state.logger.metrics())
}

pub async fn get_logs(
    State(state): State<AdminState>,
    Query(params): Query<LogsParams>,
) -> Json<Vec<LogEntry>> {
    let query = LogQuery {
        limit: params.limit.unwrap_or(DEFAULT_LOG_LIMIT),
        path: params.path,
        filter: params.filter,
    };
    Json(state.logger.query(&query))
}

pub async fn export_logs(
    State(state): State<AdminState>,
    Query(params): Query<ExportParams>,
) -> Response {
    let format = match params.format.as_deref().map(str::parse::<ExportFormat>) {
        None => ExportFormat::Json,
        Some(Ok(format)) => format,
        Some(Err(e)) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match state.logger.export(format) {
        Ok(body) => {
            let disposition = format!(
                "attachment; filename=\"request-log.{}\"",
                format.extension()
            );
            let mut response = body.into_response();
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(format.content_type()),
            );
            if let Ok(value) = HeaderValue::from_str(&disposition) {
                headers.insert(header::CONTENT_DISPOSITION, value);
            }
            response
        }
        Err(e) => {
            tracing::error!(error = %e, "Log export failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "export failed").into_response()
        }
    }
}

pub async fn clear_logs(State(state): State<AdminState>) -> Json<Cleared> {
    let cleared = state.logger.len();
    state.logger.clear();
    tracing::info!(cleared, "Request log cleared via admin API");
    Json(Cleared { cleared })
}
