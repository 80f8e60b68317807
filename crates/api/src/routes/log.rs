//! Log Routes

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;
use storage::LogRow;

/// Query parameters for the log endpoint
#[derive(Debug, Deserialize)]
pub struct LogQuery {
    /// Maximum number of rows to return
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Return rows since this timestamp (Unix ms)
    pub since: Option<u64>,
}

fn default_limit() -> usize {
    100
}

/// Response for the log endpoint
#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub header: Vec<String>,
    pub data: Vec<LogRow>,
    pub meta: LogMeta,
}

#[derive(Debug, Serialize)]
pub struct LogMeta {
    pub count: usize,
    pub limit: usize,
    pub total: usize,
}

/// Recent log rows, oldest first
pub async fn get_log(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LogQuery>,
) -> Json<LogResponse> {
    let limit = params.limit.min(1000);

    let mut data = match params.since {
        Some(since) => state.repository.since(since).unwrap_or_default(),
        None => state.repository.recent(limit).unwrap_or_default(),
    };
    if data.len() > limit {
        data.drain(..data.len() - limit);
    }

    Json(LogResponse {
        header: state.header.clone(),
        meta: LogMeta {
            count: data.len(),
            limit,
            total: state.repository.row_count(),
        },
        data,
    })
}
