use std::path::PathBuf;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Errors that abort a processing job.
///
/// Every failure of the pipeline maps onto exactly one of these variants;
/// the HTTP layer turns the variant into a status code via [`RechnungError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RechnungError {
    /// The uploaded document has an unsupported format or is too large.
    #[error("unsupported document: {0}")]
    UnsupportedDocument(String),

    /// The extraction model is missing, unloadable, or its backend is unreachable.
    #[error("extraction unavailable: {0}")]
    ExtractionUnavailable(String),

    /// Waiting for the model plus inference exceeded the configured limit.
    #[error("extraction timed out after {}s", .0.as_secs())]
    ExtractionTimeout(Duration),

    /// One or more invoice invariants failed.
    #[error("validation failed: {}", join_violations(.0))]
    Validation(Vec<ValidationError>),

    /// An XML generator hit a canonical model it cannot express.
    #[error("generation error: {0}")]
    Generation(String),

    /// PDF rendering or PDF/A-3 packaging failed.
    #[error("packaging error: {0}")]
    Packaging(String),

    /// Reading or writing persisted state or artifacts failed.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RechnungError {
    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedDocument(_) => "unsupported_document",
            Self::ExtractionUnavailable(_) => "extraction_unavailable",
            Self::ExtractionTimeout(_) => "extraction_timeout",
            Self::Validation(_) => "validation_error",
            Self::Generation(_) => "generation_error",
            Self::Packaging(_) => "packaging_error",
            Self::Storage { .. } => "storage_error",
        }
    }

    /// Itemized violations, empty for every variant but `Validation`.
    pub fn violations(&self) -> &[ValidationError] {
        match self {
            Self::Validation(errors) => errors,
            _ => &[],
        }
    }

    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Wrap a non-empty list of violations, `Ok(())` otherwise.
    pub fn check(errors: Vec<ValidationError>) -> Result<(), Self> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Self::Validation(errors))
        }
    }
}

fn join_violations(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "seller.address.country_code").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
    /// EN 16931 business rule ID if applicable (e.g. "BR-01").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "[{}] {}: {}", rule, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl ValidationError {
    /// Create a validation error without a rule ID.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: None,
        }
    }

    /// Create a validation error with an EN 16931 rule ID.
    pub fn with_rule(
        field: impl Into<String>,
        message: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: Some(rule.into()),
        }
    }
}

/// Non-fatal findings attached to a successful job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobWarning {
    /// Extraction confidence fell below the configured threshold.
    ExtractionLowConfidence { confidence: f32, threshold: f32 },
    /// A stated aggregate disagreed with the line items and was replaced.
    TotalsRepaired {
        field: String,
        #[serde(with = "rust_decimal::serde::str")]
        stated: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        computed: Decimal,
    },
    /// A rule that the target format recommends but that does not block output.
    Advisory(ValidationError),
}

impl std::fmt::Display for JobWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtractionLowConfidence {
                confidence,
                threshold,
            } => write!(
                f,
                "extraction confidence {confidence:.2} below threshold {threshold:.2}"
            ),
            Self::TotalsRepaired {
                field,
                stated,
                computed,
            } => write!(f, "{field}: stated {stated} replaced by computed {computed}"),
            Self::Advisory(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_joins_items() {
        let err = RechnungError::Validation(vec![
            ValidationError::with_rule("number", "invoice number must not be empty", "BR-02"),
            ValidationError::new("lines[0].unit", "unknown unit"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: [BR-02] number: invoice number must not be empty; lines[0].unit: unknown unit"
        );
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn check_passes_on_empty() {
        assert!(RechnungError::check(Vec::new()).is_ok());
        let err = RechnungError::check(vec![ValidationError::new("a", "b")]).unwrap_err();
        assert!(matches!(err, RechnungError::Validation(ref v) if v.len() == 1));
    }

    #[test]
    fn timeout_display() {
        let err = RechnungError::ExtractionTimeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "extraction timed out after 30s");
        assert!(err.violations().is_empty());
    }

    #[test]
    fn warning_serializes_with_kind_tag() {
        let w = JobWarning::ExtractionLowConfidence {
            confidence: 0.25,
            threshold: 0.5,
        };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["kind"], "extraction_low_confidence");
    }
}
