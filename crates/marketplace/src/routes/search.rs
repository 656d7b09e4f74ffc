//! Event search handler.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use crate::error::Result;
use crate::state::AppState;
use crate::supabase::EventSummary;

/// Queries shorter than this return no results without a lookup.
pub const MIN_QUERY_CHARS: usize = 2;

/// Maximum number of suggestions returned.
pub const MAX_RESULTS: usize = 8;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Search published events by title.
#[instrument(skip(state))]
pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<EventSummary>>> {
    let term = query.q.trim();
    if term.chars().count() < MIN_QUERY_CHARS {
        return Ok(Json(Vec::new()));
    }
    let events = state.rest().search_events(term, MAX_RESULTS).await?;
    Ok(Json(events))
}
