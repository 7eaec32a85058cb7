use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::debug;

use crate::charts::Chart;
use crate::error::{ApiError, ApiResult, SalesError};
use crate::features::derive_features;
use crate::models::DerivedFeatures;
use crate::models::columns;
use crate::{render, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct ChartQuery {
    /// `png` (default) or, for the interactive plot, `html`
    pub format: Option<String>,
}

/// GET /api/{chart name}
pub async fn chart_image(chart: Chart, state: AppState, query: ChartQuery) -> ApiResult<Response> {
    let html = match query.format.as_deref() {
        None | Some("png") => false,
        Some("html") if chart == Chart::InteractivePlot => true,
        Some(other) => {
            return Err(ApiError::BadRequest(format!(
                "unsupported format {other:?} for {}",
                chart.name()
            )))
        }
    };

    let table = state.load_table().await?;
    let rendered = tokio::task::spawn_blocking(move || {
        if html {
            render::interactive_html(&table).map(|page| ("text/html; charset=utf-8", page.into_bytes()))
        } else {
            render::render_png(chart, &table).map(|png| ("image/png", png))
        }
    })
    .await
    .map_err(|e| SalesError::Chart(format!("render task failed: {e}")))?;
    let (content_type, bytes) = rendered?;

    debug!(chart = chart.name(), bytes = bytes.len(), "Chart rendered");
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// GET /api/charts/:name
pub async fn chart_data(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let chart: Chart = name.parse()?;
    let table = state.load_table().await?;
    Ok(Json(chart.data(&table)?))
}

/// GET /api/revenue_features
pub async fn revenue_features(State(state): State<AppState>) -> ApiResult<Json<Vec<DerivedFeatures>>> {
    let table = state.load_table().await?;
    Ok(Json(derive_features(&table, columns::REVENUE_CONFIRMED)?))
}

pub fn chart_routes() -> Router<AppState> {
    let mut router = Router::new()
        .route("/api/charts/:name", get(chart_data))
        .route("/api/revenue_features", get(revenue_features));
    for chart in Chart::ALL {
        router = router.route(
            &format!("/api/{}", chart.name()),
            get(
                move |State(state): State<AppState>, Query(query): Query<ChartQuery>| {
                    chart_image(chart, state, query)
                },
            ),
        );
    }
    router
}
