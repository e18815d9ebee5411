use axum::{
    Router,
    extract::Path,
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use http_metrics::Middleware;
use http_metrics::layer::{MetricsState, track_metrics};
use tower_http::trace::TraceLayer;

/// Demo API, every route measured by `mdlw`.
///
/// The trace layer wraps the metrics layer so each recorder call runs
/// inside the request span.
pub fn router(mdlw: Middleware) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/brands", get(list_brands))
        .route("/api/v1/brands/{id}", get(get_brand))
        .route("/api/v1/orders/{id}/claim", post(claim_order))
        .route("/api/v1/wallet/txs-history/{address}", get(wallet_history))
        .layer(middleware::from_fn_with_state(
            MetricsState::new(mdlw),
            track_metrics,
        ))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn list_brands() -> &'static str {
    "acme,globex,initech"
}

async fn get_brand(Path(id): Path<u64>) -> String {
    format!("brand {id}")
}

async fn claim_order(Path(id): Path<u64>) -> StatusCode {
    tracing::debug!(order_id = id, "Order claimed");
    StatusCode::ACCEPTED
}

async fn wallet_history(Path(address): Path<String>) -> String {
    format!("no transactions for {address}")
}
