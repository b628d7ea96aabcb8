//! HTTP handlers.

use std::path::Component;
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, Path, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Serialize;
use tracing::info;

use super::AppState;
use super::error::ApiError;
use crate::config::{IssuerProfile, Settings, SettingsUpdate};
use crate::core::RechnungError;
use crate::extract::SourceDocument;
use crate::pipeline::{ARTIFACT_FILES, JobResult};

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<Settings> {
    Json(state.store.settings().await)
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SettingsUpdate>, JsonRejection>,
) -> Result<Json<Settings>, ApiError> {
    let Json(update) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let settings = state.store.update_settings(update).await?;
    info!(model = %settings.llm_model_path, "settings updated");
    Ok(Json(settings))
}

pub async fn get_issuer(State(state): State<Arc<AppState>>) -> Json<IssuerProfile> {
    Json(state.store.issuer().await)
}

pub async fn update_issuer(
    State(state): State<Arc<AppState>>,
    body: Result<Json<IssuerProfile>, JsonRejection>,
) -> Result<Json<IssuerProfile>, ApiError> {
    let Json(profile) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let profile = state.store.update_issuer(profile).await?;
    info!(name = %profile.name, "firm data updated");
    Ok(Json(profile))
}

/// Runs one job on the uploaded `file` field.
pub async fn process(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<JobResult>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let limit = state.orchestrator.config().extractor.max_document_bytes;
    let mut document = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error(e, limit))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let media_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| upload_error(e, limit))?;

        let mut doc = SourceDocument::new(bytes.to_vec());
        doc.file_name = file_name;
        doc.media_type = media_type;
        document = Some(doc);
        break;
    }
    let document =
        document.ok_or_else(|| ApiError::BadRequest("multipart field `file` is missing".into()))?;

    let result = state.orchestrator.process(document).await?;
    Ok(Json(result))
}

/// An upload cut off by the body limit is an oversized document.
fn upload_error(err: MultipartError, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RechnungError::UnsupportedDocument(format!("document exceeds the limit of {limit} bytes"))
            .into()
    } else {
        ApiError::BadRequest(format!("malformed multipart body: {}", err.body_text()))
    }
}

/// Serves one artifact of a finished job.
pub async fn output_file(
    State(state): State<Arc<AppState>>,
    Path((job, file)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_plain_name(&job) || !ARTIFACT_FILES.contains(&file.as_str()) {
        return Err(ApiError::NotFound(format!("{job}/{file}")));
    }
    let path = state.orchestrator.output_root().join(&job).join(&file);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("{job}/{file}")))?;

    Ok(([(header::CONTENT_TYPE, content_type(&file))], Bytes::from(bytes)))
}

/// One normal path component that is not hidden.
fn is_plain_name(name: &str) -> bool {
    let mut components = std::path::Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.starts_with('.')
        && !name.contains(['/', '\\'])
}

fn content_type(file: &str) -> &'static str {
    match file.rsplit('.').next() {
        Some("pdf") => "application/pdf",
        Some("xml") => "application/xml",
        Some("json") => "application/json",
        _ => "text/plain; charset=utf-8",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_names_must_be_plain() {
        assert!(is_plain_name("RE-1_4b7c"));
        assert!(!is_plain_name(".."));
        assert!(!is_plain_name(".RE-1.partial"));
        assert!(!is_plain_name("a/b"));
        assert!(!is_plain_name("..\\etc"));
        assert!(!is_plain_name(""));
    }

    #[test]
    fn artifacts_have_content_types() {
        assert_eq!(content_type("zugferd.pdf"), "application/pdf");
        assert_eq!(content_type("xrechnung.xml"), "application/xml");
        assert_eq!(content_type("raw_text.txt"), "text/plain; charset=utf-8");
    }
}
