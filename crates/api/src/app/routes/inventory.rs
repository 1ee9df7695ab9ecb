use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use orderflow_core::ProductId;
use orderflow_infra::{StockAdjustment, WorkflowResult};
use orderflow_inventory::Inventory;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_inventory))
        .route("/low-stock", get(list_low_stock))
        .route("/batch-adjust", post(batch_adjust))
        .route("/:product_id", get(get_inventory).delete(delete_inventory))
        .route("/:product_id/check", get(check_stock))
        .route("/:product_id/lock", post(lock_stock))
        .route("/:product_id/release", post(release_stock))
        .route("/:product_id/deduct", post(deduct_stock))
        .route("/:product_id/adjust", post(adjust_stock))
        .route("/:product_id/threshold", put(update_threshold))
}

fn inventory_response(status: StatusCode, result: WorkflowResult<Inventory>) -> axum::response::Response {
    match result {
        Ok(inv) => (status, Json(dto::InventoryResponse::from(&inv))).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

fn inventories_response(result: WorkflowResult<Vec<Inventory>>) -> axum::response::Response {
    match result {
        Ok(list) => Json(
            list.iter()
                .map(dto::InventoryResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn create_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateInventoryRequest>,
) -> axum::response::Response {
    inventory_response(
        StatusCode::CREATED,
        services
            .ledger()
            .create_inventory(body.product_id, body.stock, body.low_stock_threshold)
            .await,
    )
}

pub async fn list_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    inventories_response(services.ledger().list_low_stock().await)
}

/// All-or-nothing: a failing line reverts the lines already applied.
pub async fn batch_adjust(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<Vec<StockAdjustment>>,
) -> axum::response::Response {
    inventories_response(services.ledger().batch_adjust(&body).await)
}

pub async fn get_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    inventory_response(
        StatusCode::OK,
        services.ledger().get_availability(product_id).await,
    )
}

pub async fn delete_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.ledger().delete_inventory(product_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn check_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
    Query(params): Query<dto::CheckStockParams>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.ledger().check_stock(product_id, params.quantity).await {
        Ok(available) => Json(dto::CheckStockResponse {
            product_id,
            quantity: params.quantity,
            available,
        })
        .into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}

pub async fn lock_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::QuantityRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    inventory_response(
        StatusCode::OK,
        services.ledger().lock_stock(product_id, body.quantity).await,
    )
}

pub async fn release_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::QuantityRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    inventory_response(
        StatusCode::OK,
        services.ledger().release_stock(product_id, body.quantity).await,
    )
}

pub async fn deduct_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::QuantityRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    inventory_response(
        StatusCode::OK,
        services.ledger().deduct_stock(product_id, body.quantity).await,
    )
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    inventory_response(
        StatusCode::OK,
        services.ledger().adjust_stock(product_id, body.delta).await,
    )
}

pub async fn update_threshold(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::ThresholdRequest>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    inventory_response(
        StatusCode::OK,
        services
            .ledger()
            .update_low_stock_threshold(product_id, body.low_stock_threshold)
            .await,
    )
}
