// Routes module - assembles every HTTP endpoint into one router

pub mod currency;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app_state::SharedState;
use crate::handlers::*;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        // ===== MARKET ENDPOINTS =====
        .route("/markets", get(list_markets).post(create_market))
        .route("/markets/:id", get(get_market))
        .route("/markets/:id/quote/:amount", get(quote_buy))
        .route("/markets/:id/buy", post(buy))
        .route("/markets/:id/sell", post(sell))
        .route("/markets/:id/swap", post(swap))
        .route("/markets/:id/refunds", post(retry_refund))

        // ===== SETTLEMENT ENDPOINTS =====
        .route("/markets/:id/outcome", post(declare_outcome))
        .route("/markets/:id/resolve", post(resolve_market))
        .route("/markets/:id/rewards", post(collect_reward))
        .route("/markets/:id/rewards/:participant", get(preview_reward))

        // ===== VIEWS =====
        .route("/markets/:id/holders/:side", get(get_holders))
        .route("/markets/:id/positions/:participant", get(get_position))
        .route("/markets/:id/events", get(get_events))
        .route("/telemetry/:participant", get(get_telemetry))

        // ===== CURRENCY ENDPOINTS =====
        .route("/currency/mint", post(currency::mint))
        .route("/currency/approve", post(currency::approve))
        .route("/currency/balance/:account", get(currency::get_balance))

        // ===== HEALTH CHECK =====
        .route("/", get(health_check))
        .route("/health", get(health_check))

        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
