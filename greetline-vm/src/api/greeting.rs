//! Current greeting of the service line, for operators

use axum::{extract::State, Json};
use greetline_common::db::Track;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct GreetingResponse {
    pub phone: String,
    pub track: Track,
}

/// GET /api/greeting
///
/// 404 when the service line has no greeting track yet.
pub async fn get_greeting(State(state): State<AppState>) -> ApiResult<Json<GreetingResponse>> {
    let phone = state.config.phone.service_phone_number.clone();
    let track = state
        .store
        .current_greeting_track(&phone)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No greeting track for {}", phone)))?;

    Ok(Json(GreetingResponse { phone, track }))
}
