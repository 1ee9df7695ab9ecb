use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use orderflow_catalog::Product;
use orderflow_core::{DomainError, ProductId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(upsert_product))
        .route("/:id", get(get_product))
}

/// Insert or replace a catalog entry. Orders already placed keep their prices.
pub async fn upsert_product(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    let product = match Product::new(body.id.unwrap_or_default(), body.name, body.unit_price) {
        Ok(p) if body.active => p,
        Ok(p) => p.deactivated(),
        Err(e) => return errors::domain_error_to_response(e),
    };

    if let Err(e) = services.catalog.upsert_product(&product).await {
        return errors::workflow_error_to_response(e.into());
    }

    (StatusCode::CREATED, Json(product)).into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog.get_product(product_id).await {
        Ok(Some(product)) => Json(product).into_response(),
        Ok(None) => errors::domain_error_to_response(DomainError::not_found("product", product_id)),
        Err(e) => errors::workflow_error_to_response(e.into()),
    }
}
