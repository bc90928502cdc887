pub mod errors;
pub mod payments;
pub mod shop;
pub mod telegram;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::database_connection::PurchaseStore;
use crate::external_services::telegram::Notifier;
use crate::purchase_handler::PaymentHandler;
use crate::rate_limit::RateLimiter;
use crate::secret::Secret;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PurchaseStore>,
    pub payments: Arc<PaymentHandler>,
    pub notifier: Arc<dyn Notifier>,
    pub limiter: Arc<RateLimiter>,
    /// Bearer token for the cancel endpoint. The endpoint is not mounted without it.
    pub admin_token: Option<Secret<String>>,
}

pub fn router(state: AppState) -> Router {
    let mut payment_routes = Router::new()
        .route("/create", post(payments::create_payment))
        .route("/notify", post(payments::payment_notification));

    if state.admin_token.is_some() {
        payment_routes = payment_routes.route("/cancel", post(payments::cancel_payment));
    }

    let telegram_routes = Router::new()
        .route("/feedback", post(telegram::feedback))
        .route("/team-application", post(telegram::team_application))
        .route("/health", get(telegram::health));

    Router::new()
        .route("/shopitems", get(shop::shop_items))
        .route("/purchases", post(shop::create_purchase))
        .route("/purchases/:id", get(shop::purchase))
        .nest("/api/payment", payment_routes)
        .nest("/telegram", telegram_routes)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_headers(Any)
                    .allow_methods(Any),
            ),
        )
        .with_state(state)
}
