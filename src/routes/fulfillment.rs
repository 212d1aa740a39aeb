use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::shipments::{
        AdvanceSubOrderRequest, CreateShipmentRequest, SubOrderList, UpdateShipmentStatusRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Shipment, SubOrder},
    response::ApiResponse,
    routes::params::SubOrderListQuery,
    services::fulfillment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sub-orders", get(list_sub_orders))
        .route("/sub-orders/{id}/status", patch(advance_sub_order))
        .route("/sub-orders/{id}/shipment", post(create_shipment))
        .route("/shipments/{id}/status", patch(update_shipment_status))
}

#[utoipa::path(
    get,
    path = "/api/fulfillment/sub-orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("store_id" = Option<Uuid>, Query, description = "Filter by store")
    ),
    responses(
        (status = 200, description = "Sub-orders routed to the caller's stores", body = ApiResponse<SubOrderList>),
        (status = 403, description = "Forbidden"),
    ),
    security(("bearer_auth" = [])),
    tag = "Fulfillment"
)]
pub async fn list_sub_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SubOrderListQuery>,
) -> AppResult<Json<ApiResponse<SubOrderList>>> {
    let resp = fulfillment_service::list_store_sub_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/fulfillment/sub-orders/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Sub-order ID")
    ),
    request_body = AdvanceSubOrderRequest,
    responses(
        (status = 200, description = "Sub-order advanced; order status re-derived", body = ApiResponse<SubOrder>),
        (status = 403, description = "Not the seller"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Invalid transition or concurrent update"),
    ),
    security(("bearer_auth" = [])),
    tag = "Fulfillment"
)]
pub async fn advance_sub_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceSubOrderRequest>,
) -> AppResult<Json<ApiResponse<SubOrder>>> {
    let resp = fulfillment_service::advance_sub_order(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/fulfillment/sub-orders/{id}/shipment",
    params(
        ("id" = Uuid, Path, description = "Sub-order ID")
    ),
    request_body = CreateShipmentRequest,
    responses(
        (status = 201, description = "Shipment created as preparing", body = ApiResponse<Shipment>),
        (status = 403, description = "Not the seller"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Already shipped or sub-order not ready"),
    ),
    security(("bearer_auth" = [])),
    tag = "Fulfillment"
)]
pub async fn create_shipment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateShipmentRequest>,
) -> AppResult<Json<ApiResponse<Shipment>>> {
    let resp = fulfillment_service::create_shipment(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/fulfillment/shipments/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Shipment ID")
    ),
    request_body = UpdateShipmentStatusRequest,
    responses(
        (status = 200, description = "Shipment status updated", body = ApiResponse<Shipment>),
        (status = 403, description = "Not the seller"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Invalid transition or concurrent update"),
    ),
    security(("bearer_auth" = [])),
    tag = "Fulfillment"
)]
pub async fn update_shipment_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateShipmentStatusRequest>,
) -> AppResult<Json<ApiResponse<Shipment>>> {
    let resp = fulfillment_service::update_shipment_status(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
