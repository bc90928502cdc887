use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared::{Purchase, PurchaseRequest, ShopItem};
use tracing::info;

use crate::api::errors::ApiError;
use crate::api::AppState;
use crate::database_connection::NewPurchase;

pub async fn shop_items(State(state): State<AppState>) -> Result<Json<Vec<ShopItem>>, ApiError> {
    Ok(Json(state.store.active_shop_items().await?))
}

pub async fn create_purchase(
    State(state): State<AppState>,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;

    let Some(item) = state.store.shop_item(request.service_id).await? else {
        return Err(ApiError::NotFound("Услуга не найдена".to_string()));
    };

    let purchase = state
        .store
        .create_purchase(NewPurchase {
            email: request.email,
            nickname: request.nickname,
            shop_item_id: item.id,
            amount: item.price,
        })
        .await?;

    info!(purchase_id = purchase.id, shop_item_id = item.id, "Purchase created");

    let location = format!("/purchases/{}", purchase.id);

    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(purchase)).into_response())
}

pub async fn purchase(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Purchase>, ApiError> {
    match state.store.purchase(id).await? {
        Some(purchase) => Ok(Json(purchase)),
        None => Err(ApiError::NotFound(format!("Purchase {id} not found"))),
    }
}
