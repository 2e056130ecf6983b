use axum::{
    extract::{Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use storefront_core::catalog::{CatalogQuery, CatalogSearchView};
use tracing::info;

use crate::error::{correlation_id, WebError};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/catalog", get(search))
}

/// `GET /catalog?searchTerm=&hideOutOfStock=`
///
/// Read as raw pairs: an unrecognised flag value leaves the filter off and never rejects.
pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<CatalogSearchView>, WebError> {
    let correlation_id = correlation_id(&headers);
    let query = CatalogQuery::from_pairs(pairs);
    let view = state
        .catalog
        .query(&query)
        .await
        .map_err(|error| WebError::repository(error, &correlation_id))?;

    info!(
        event_name = "catalog.query.served",
        correlation_id = %correlation_id,
        search_term = %view.search_term,
        hide_out_of_stock = view.hide_out_of_stock,
        result_count = view.products.len(),
        "catalog query served"
    );
    Ok(Json(view))
}
