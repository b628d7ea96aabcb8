//! Document extraction: raw bytes to raw text plus a structured draft.
//!
//! The [`Extractor`] detects the document format, decodes what the document
//! carries itself (PDF text layer, page images), and asks one extraction
//! model for the transcription and the structured parse in a single pass.
//! Model access is serialized through a single-slot semaphore; waiting for
//! the slot counts against the extraction timeout.

mod decode;
mod draft;
mod llama;
mod media;
mod model;
mod office;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub use decode::{DecodedDocument, MIN_TEXT_LAYER_ALNUM, decode_document, sanitize_text};
pub use draft::{
    DraftField, DraftInvoice, DraftLine, DraftParty, DraftTotals, ExtractionDraft, ModelAnswer,
    Provenance, key_field_coverage, parse_amount, parse_date, parse_model_output, recover_json,
};
pub use llama::{LlamaServerConfig, LlamaServerLoader};
pub use media::{MediaKind, detect_media_kind};
pub use model::{ExtractionModel, ModelLoader, ModelRequest, PageImage, build_request};

use crate::core::{JobWarning, RechnungError};

/// Extractor limits.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Larger uploads are rejected before decoding.
    pub max_document_bytes: usize,
    /// Bound on queue wait plus model load plus inference.
    pub timeout: Duration,
    /// Below this confidence the job carries a warning.
    pub min_confidence: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: 20 * 1024 * 1024,
            timeout: Duration::from_secs(300),
            min_confidence: 0.5,
        }
    }
}

/// An uploaded document; owned by one job and dropped after extraction.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub bytes: Vec<u8>,
    pub media_type: Option<String>,
    pub file_name: Option<String>,
}

impl SourceDocument {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: None,
            file_name: None,
        }
    }

    pub fn media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Turns uploaded documents into drafts using one shared model.
pub struct Extractor {
    config: ExtractorConfig,
    loader: Arc<dyn ModelLoader>,
    slot: Semaphore,
}

impl Extractor {
    pub fn new(config: ExtractorConfig, loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            config,
            loader,
            slot: Semaphore::new(1),
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract a draft from `document` with the model at `model_path`.
    ///
    /// Format problems fail with [`RechnungError::UnsupportedDocument`]
    /// before the model is touched.
    pub async fn extract(
        &self,
        document: SourceDocument,
        model_path: &Path,
    ) -> Result<ExtractionDraft, RechnungError> {
        if document.bytes.len() > self.config.max_document_bytes {
            return Err(RechnungError::UnsupportedDocument(format!(
                "document has {} bytes, limit is {}",
                document.bytes.len(),
                self.config.max_document_bytes
            )));
        }
        let kind = detect_media_kind(
            document.media_type.as_deref(),
            document.file_name.as_deref(),
            &document.bytes,
        )?;
        debug!(?kind, bytes = document.bytes.len(), "detected document format");

        let bytes = document.bytes;
        let decoded = tokio::task::spawn_blocking(move || decode_document(kind, &bytes))
            .await
            .map_err(|e| RechnungError::UnsupportedDocument(format!("decoder failed: {e}")))??;

        let request = build_request(decoded.text.as_deref(), decoded.images);
        let output = tokio::time::timeout(self.config.timeout, self.infer(model_path, &request))
            .await
            .map_err(|_| RechnungError::ExtractionTimeout(self.config.timeout))??;

        let answer = parse_model_output(&output);
        if !answer.parsed {
            warn!("model answer contained no JSON object");
        }
        let confidence = answer.confidence();
        let raw_text = match decoded.text {
            Some(text) => text,
            None => answer
                .transcription
                .as_deref()
                .map(sanitize_text)
                .unwrap_or_default(),
        };
        info!(
            confidence,
            lines = answer.invoice.lines.len(),
            "extraction finished"
        );

        Ok(ExtractionDraft {
            raw_text,
            invoice: answer.invoice,
            confidence,
        })
    }

    /// A warning when the draft's confidence is below the threshold.
    pub fn confidence_warning(&self, draft: &ExtractionDraft) -> Option<JobWarning> {
        (draft.confidence < self.config.min_confidence).then(|| {
            warn!(
                confidence = draft.confidence,
                threshold = self.config.min_confidence,
                "low extraction confidence"
            );
            JobWarning::ExtractionLowConfidence {
                confidence: draft.confidence,
                threshold: self.config.min_confidence,
            }
        })
    }

    /// Holds the model slot for load and inference.
    async fn infer(&self, model_path: &Path, request: &ModelRequest) -> Result<String, RechnungError> {
        let _permit = self
            .slot
            .acquire()
            .await
            .map_err(|_| RechnungError::ExtractionUnavailable("model slot closed".into()))?;
        let model = self.loader.load(model_path).await?;
        model.complete(request).await
    }
}
