//! Snapshot Route

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::{AppState, DashboardSnapshot};

/// Latest dashboard snapshot
pub async fn get_snapshot(State(state): State<Arc<AppState>>) -> Json<DashboardSnapshot> {
    let snapshot = state.snapshot.borrow().clone();
    Json(snapshot)
}
