//! JobOrchestrator: one upload end-to-end.
//!
//! snapshot config → extract → normalize → (UBL ‖ CII) → PDF/A-3 →
//! persist → record `last_output_path`. Artifacts are produced in memory
//! and written through a hidden staging directory that is renamed into
//! place, so a job directory either holds all five files or does not exist.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ConfigStore;
use crate::core::{CanonicalInvoice, JobWarning, RechnungError};
use crate::extract::{Extractor, ExtractorConfig, ModelLoader, SourceDocument};
use crate::normalize::normalize;
use crate::xrechnung::{to_ubl_xml, validate_xrechnung};
use crate::zugferd::{PackagerConfig, ZugferdPdfPackager, to_cii_xml};

pub const RAW_TEXT_FILE: &str = "raw_text.txt";
pub const CANONICAL_JSON_FILE: &str = "canonical.json";
pub const XRECHNUNG_FILE: &str = "xrechnung.xml";
pub const ZUGFERD_XML_FILE: &str = "zugferd.xml";
pub const ZUGFERD_PDF_FILE: &str = "zugferd.pdf";

/// The five artifact names of a job directory.
pub const ARTIFACT_FILES: [&str; 5] = [
    RAW_TEXT_FILE,
    CANONICAL_JSON_FILE,
    XRECHNUNG_FILE,
    ZUGFERD_XML_FILE,
    ZUGFERD_PDF_FILE,
];

/// Orchestrator settings fixed at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Job directories are created below this directory.
    pub output_root: PathBuf,
    pub extractor: ExtractorConfig,
    pub packager: PackagerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("output"),
            extractor: ExtractorConfig::default(),
            packager: PackagerConfig::default(),
        }
    }
}

/// Artifact paths relative to the output root (`<job-dir>/<file>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactFiles {
    pub raw_text: String,
    pub canonical_json: String,
    pub xrechnung_xml: String,
    pub zugferd_xml: String,
    pub zugferd_pdf: String,
}

/// Response of a finished job.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub files: ArtifactFiles,
    /// Absolute path of the job directory.
    pub output_directory: String,
    pub warnings: Vec<JobWarning>,
}

/// Artifacts of one job, still in memory.
struct OutputArtifactSet {
    raw_text: String,
    canonical_json: String,
    xrechnung_xml: String,
    zugferd_xml: String,
    zugferd_pdf: Vec<u8>,
}

impl OutputArtifactSet {
    fn entries(&self) -> [(&'static str, &[u8]); 5] {
        [
            (RAW_TEXT_FILE, self.raw_text.as_bytes()),
            (CANONICAL_JSON_FILE, self.canonical_json.as_bytes()),
            (XRECHNUNG_FILE, self.xrechnung_xml.as_bytes()),
            (ZUGFERD_XML_FILE, self.zugferd_xml.as_bytes()),
            (ZUGFERD_PDF_FILE, &self.zugferd_pdf),
        ]
    }
}

/// Drives processing jobs; cheap to share behind an `Arc`.
pub struct JobOrchestrator {
    config: PipelineConfig,
    store: Arc<ConfigStore>,
    extractor: Extractor,
    packager: OnceCell<Arc<ZugferdPdfPackager>>,
}

impl JobOrchestrator {
    pub fn new(config: PipelineConfig, store: Arc<ConfigStore>, loader: Arc<dyn ModelLoader>) -> Self {
        let extractor = Extractor::new(config.extractor.clone(), loader);
        Self {
            config,
            store,
            extractor,
            packager: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn output_root(&self) -> &Path {
        &self.config.output_root
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Run one job. Any failure aborts it; nothing is left on disk then.
    #[instrument(skip_all, fields(job = %job_id))]
    pub async fn process_with_id(
        &self,
        job_id: Uuid,
        document: SourceDocument,
    ) -> Result<JobResult, RechnungError> {
        let snapshot = self.store.snapshot().await;
        info!(
            file = document.file_name.as_deref().unwrap_or("-"),
            bytes = document.bytes.len(),
            "job started"
        );

        let model_path = PathBuf::from(&snapshot.settings.llm_model_path);
        let draft = self.extractor.extract(document, &model_path).await?;
        let mut warnings: Vec<JobWarning> = self.extractor.confidence_warning(&draft).into_iter().collect();

        let normalized = normalize(&draft, &snapshot.issuer)?;
        warnings.extend(normalized.warnings);
        let canonical = Arc::new(normalized.canonical);
        info!(invoice = %canonical.invoice().number, "invoice validated");

        for advisory in validate_xrechnung(canonical.invoice()) {
            warn!(%advisory, "XRechnung advisory");
            warnings.push(JobWarning::Advisory(advisory));
        }

        let packager = self.packager().await?;
        let (xrechnung_xml, zugferd_xml) = generate_xml(&canonical, packager.profile()).await?;
        info!("XML generated");

        let logo = Some(snapshot.settings.logo_path.trim())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let zugferd_pdf = {
            let canonical = canonical.clone();
            let cii = zugferd_xml.clone();
            tokio::task::spawn_blocking(move || packager.package(&canonical, &cii, logo.as_deref()))
                .await
                .map_err(|e| RechnungError::Packaging(format!("packager task failed: {e}")))??
        };
        info!(bytes = zugferd_pdf.len(), "PDF/A-3 packaged");

        let artifacts = OutputArtifactSet {
            raw_text: draft.raw_text,
            canonical_json: canonical.to_json()?,
            xrechnung_xml,
            zugferd_xml,
            zugferd_pdf,
        };
        let dir_name = format!("{}_{job_id}", sanitize_dir_name(&canonical.invoice().number));
        let job_dir = self.persist(&dir_name, &artifacts).await?;
        let output_directory = tokio::fs::canonicalize(&job_dir)
            .await
            .map_err(|e| RechnungError::storage(&job_dir, e))?;

        if let Err(e) = self.store.record_output_path(&output_directory).await {
            error!(error = %e, "cannot record last output path");
        }
        info!(dir = %output_directory.display(), warnings = warnings.len(), "job finished");

        let rel = |file: &str| format!("{dir_name}/{file}");
        Ok(JobResult {
            job_id,
            files: ArtifactFiles {
                raw_text: rel(RAW_TEXT_FILE),
                canonical_json: rel(CANONICAL_JSON_FILE),
                xrechnung_xml: rel(XRECHNUNG_FILE),
                zugferd_xml: rel(ZUGFERD_XML_FILE),
                zugferd_pdf: rel(ZUGFERD_PDF_FILE),
            },
            output_directory: output_directory.display().to_string(),
            warnings,
        })
    }

    /// [`process_with_id`](Self::process_with_id) with a fresh UUID v4.
    pub async fn process(&self, document: SourceDocument) -> Result<JobResult, RechnungError> {
        self.process_with_id(Uuid::new_v4(), document).await
    }

    /// The font is loaded on first use so a missing font fails jobs, not startup.
    async fn packager(&self) -> Result<Arc<ZugferdPdfPackager>, RechnungError> {
        let config = self.config.packager.clone();
        self.packager
            .get_or_try_init(|| async move {
                tokio::task::spawn_blocking(move || ZugferdPdfPackager::new(&config))
                    .await
                    .map_err(|e| RechnungError::Packaging(format!("font loading failed: {e}")))?
                    .map(Arc::new)
            })
            .await
            .cloned()
    }

    /// Write into `.<name>.partial`, then rename to `<name>`.
    async fn persist(
        &self,
        dir_name: &str,
        artifacts: &OutputArtifactSet,
    ) -> Result<PathBuf, RechnungError> {
        let root = &self.config.output_root;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| RechnungError::storage(root, e))?;

        let staging = root.join(format!(".{dir_name}.partial"));
        let final_dir = root.join(dir_name);
        let result = async {
            tokio::fs::create_dir(&staging)
                .await
                .map_err(|e| RechnungError::storage(&staging, e))?;
            for (file, bytes) in artifacts.entries() {
                let path = staging.join(file);
                tokio::fs::write(&path, bytes)
                    .await
                    .map_err(|e| RechnungError::storage(&path, e))?;
            }
            tokio::fs::rename(&staging, &final_dir)
                .await
                .map_err(|e| RechnungError::storage(&final_dir, e))
        }
        .await;

        if let Err(e) = result {
            error!(error = %e, "persisting artifacts failed");
            if let Err(cleanup) = tokio::fs::remove_dir_all(&staging).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %staging.display(), error = %cleanup, "staging directory left behind");
                }
            }
            return Err(e);
        }
        Ok(final_dir)
    }
}

/// UBL and CII generated concurrently on the blocking pool.
async fn generate_xml(
    canonical: &Arc<CanonicalInvoice>,
    profile: crate::zugferd::ZugferdProfile,
) -> Result<(String, String), RechnungError> {
    let ubl_input = canonical.clone();
    let cii_input = canonical.clone();
    let ubl = tokio::task::spawn_blocking(move || to_ubl_xml(&ubl_input));
    let cii = tokio::task::spawn_blocking(move || to_cii_xml(&cii_input, profile));
    let (ubl, cii) = tokio::join!(ubl, cii);
    let joined = |e: tokio::task::JoinError| RechnungError::Generation(format!("generator task failed: {e}"));
    Ok((ubl.map_err(joined)??, cii.map_err(joined)??))
}

/// File-system safe form of an invoice number.
pub fn sanitize_dir_name(number: &str) -> String {
    let cleaned: String = number
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "rechnung".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_names_are_sanitized() {
        assert_eq!(sanitize_dir_name("RE-2024/001"), "RE-2024_001");
        assert_eq!(sanitize_dir_name("../../etc"), "_.._etc");
        assert_eq!(sanitize_dir_name("  "), "rechnung");
        assert_eq!(sanitize_dir_name("Nr. 7 ü"), "Nr._7__");
        assert_eq!(sanitize_dir_name(&"9".repeat(100)).len(), 64);
    }
}
