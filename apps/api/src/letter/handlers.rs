use axum::{extract::State, Json};

use crate::errors::AppError;
use crate::models::letter::{CoverLetter, GenerationRequest};
use crate::state::AppState;

/// POST /letter/from-url
pub async fn handle_from_url(
    State(state): State<AppState>,
    Json(req): Json<GenerationRequest>,
) -> Result<Json<CoverLetter>, AppError> {
    if req.job_url.trim().is_empty() {
        return Err(AppError::Validation("job_url must not be empty".to_string()));
    }
    let letter = state.pipeline.generate_letter(req).await?;
    Ok(Json(letter))
}
