use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use orderflow_core::OrderId;
use orderflow_infra::{CreateOrderRequest, OrderDetail, ShipmentRequest, WorkflowResult};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/status", put(update_status))
        .route("/:id/ship", post(ship_order))
        .route("/:id/confirm", post(confirm_delivery))
        .route("/:id/after-sale", post(apply_after_sale))
        .route("/:id/after-sale/complete", post(complete_after_sale))
        .route("/:id/delivery", get(get_delivery).put(update_delivery))
}

fn detail_response(status: StatusCode, result: WorkflowResult<OrderDetail>) -> axum::response::Response {
    match result {
        Ok(detail) => (status, Json(dto::OrderResponse::from(&detail))).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

/// Create an order. Resending a request with the same `order_no` returns the
/// order created the first time.
pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<CreateOrderRequest>,
) -> axum::response::Response {
    detail_response(StatusCode::CREATED, services.workflow.create_order(body).await)
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Query(params): Query<dto::ListOrdersParams>,
) -> axum::response::Response {
    match services.workflow.list_orders(&params.into_query()).await {
        Ok(page) => Json(dto::OrderPageResponse::from(&page)).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    detail_response(StatusCode::OK, services.workflow.get_order_detail(order_id).await)
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    detail_response(StatusCode::OK, services.workflow.cancel_order(order_id).await)
}

pub async fn update_status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateOrderStatusRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    detail_response(
        StatusCode::OK,
        services.workflow.update_order_status(order_id, body.status).await,
    )
}

pub async fn ship_order(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<ShipmentRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    detail_response(StatusCode::OK, services.workflow.ship_order(order_id, body).await)
}

/// The consignee received the goods: completes the order and turns its locks
/// into deductions.
pub async fn confirm_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    detail_response(StatusCode::OK, services.workflow.confirm_delivery(order_id).await)
}

pub async fn apply_after_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    detail_response(StatusCode::OK, services.workflow.apply_after_sale(order_id).await)
}

pub async fn complete_after_sale(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    detail_response(StatusCode::OK, services.workflow.complete_after_sale(order_id).await)
}

pub async fn get_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.workflow.get_delivery(order_id).await {
        Ok(delivery) => Json(dto::DeliveryResponse::from(&delivery)).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn update_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<ShipmentRequest>,
) -> axum::response::Response {
    let order_id: OrderId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.workflow.update_delivery_details(order_id, body).await {
        Ok(detail) => Json(dto::DeliveryResponse::from(&detail.delivery)).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}
