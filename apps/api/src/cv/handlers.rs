use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::{Bytes, BytesMut};

use crate::errors::AppError;
use crate::extract::{DocumentType, ExtractError};
use crate::models::letter::Language;
use crate::models::profile::Profile;
use crate::pipeline::PipelineError;
use crate::state::AppState;

/// An uploaded résumé as read off the multipart stream.
struct Upload {
    bytes: Bytes,
    declared_type: String,
}

/// POST /cv/auto-fill
/// Multipart fields: `file` (pdf, docx or txt) and optional `language`.
pub async fn handle_auto_fill(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Profile>, AppError> {
    let limit = state.pipeline.max_upload_bytes();
    let mut upload: Option<Upload> = None;
    let mut language = Language::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let declared_type = declared_type(field.file_name(), field.content_type());

                // Count bytes as they arrive; stop reading once over the ceiling.
                let mut buf = BytesMut::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| AppError::Validation(format!("upload interrupted: {e}")))?
                {
                    if buf.len() + chunk.len() > limit {
                        return Err(PipelineError::from(ExtractError::TooLarge {
                            size: buf.len() + chunk.len(),
                            limit,
                        })
                        .into());
                    }
                    buf.extend_from_slice(&chunk);
                }

                upload = Some(Upload {
                    bytes: buf.freeze(),
                    declared_type,
                });
            }
            Some("language") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("unreadable language field: {e}")))?;
                if !value.trim().is_empty() {
                    language = value.parse().map_err(AppError::Validation)?;
                }
            }
            _ => {}
        }
    }

    let upload = upload.ok_or_else(|| AppError::Validation("missing 'file' field".to_string()))?;
    let profile = state
        .pipeline
        .extract_profile(upload.bytes, &upload.declared_type, language)
        .await?;
    Ok(Json(profile))
}

/// The file name decides when its extension is recognised; browsers often
/// send `application/octet-stream` for perfectly good documents.
fn declared_type(file_name: Option<&str>, content_type: Option<&str>) -> String {
    match file_name {
        Some(name) if DocumentType::from_declared(name).is_some() => name.to_string(),
        _ => content_type
            .or(file_name)
            .unwrap_or("application/octet-stream")
            .to_string(),
    }
}
