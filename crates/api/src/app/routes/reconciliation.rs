use std::sync::Arc;

use axum::{Json, extract::Extension, response::IntoResponse};

use crate::app::errors;
use crate::app::services::AppServices;

/// Counter changes that failed after their order was committed and need manual repair.
pub async fn list_gaps(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.workflow.reconciliation_gaps().await {
        Ok(gaps) => Json(gaps).into_response(),
        Err(e) => errors::workflow_error_to_response(e),
    }
}
