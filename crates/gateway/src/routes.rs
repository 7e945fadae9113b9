use std::sync::Arc;

use axum::{extract::State, Json};
use parley_enrichment::{TextFilter, TEXT_FILTERS};
use serde::Serialize;

use crate::state::GatewayState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connections: usize,
}

pub async fn health_check(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.hub.registry().len().await,
    })
}

#[derive(Debug, Serialize)]
pub struct TextFiltersResponse {
    pub textfilters: &'static [TextFilter],
}

pub async fn list_text_filters() -> Json<TextFiltersResponse> {
    Json(TextFiltersResponse {
        textfilters: &TEXT_FILTERS,
    })
}
