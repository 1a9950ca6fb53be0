//! Document server webhook.

use axum::Json;
use axum::body::Bytes;
use tracing::debug;

use crate::models::CallbackResponse;

/// `POST /api/callback`: acknowledge every status notification.
///
/// Documents live on the platform, so there is nothing to save here.
pub async fn callback(body: Bytes) -> Json<CallbackResponse> {
    debug!(bytes = body.len(), "document server callback");
    Json(CallbackResponse { error: 0 })
}
