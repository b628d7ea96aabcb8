use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::RechnungError;

/// A raster page sent to a vision-capable model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub mime: &'static str,
    pub data: Vec<u8>,
}

impl PageImage {
    pub fn new(mime: &'static str, data: Vec<u8>) -> Self {
        Self { mime, data }
    }
}

/// One transcription-and-parse request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub prompt: String,
    pub images: Vec<PageImage>,
}

/// A loaded model answering extraction requests with free-form text that
/// should contain a JSON object.
#[async_trait]
pub trait ExtractionModel: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<String, RechnungError>;
}

/// Produces the model for a configured artifact path.
///
/// Implementations may cache the loaded model across calls; the extractor
/// serializes calls, so at most one load or inference runs at a time.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, model_path: &Path) -> Result<Arc<dyn ExtractionModel>, RechnungError>;
}

pub(crate) const SYSTEM_PROMPT: &str = "Du bist ein Parser für deutsche Rechnungen.\n\
Antworte ausschließlich mit einem gültigen JSON-Objekt.\n\
Kein Text außerhalb des JSON.";

const RULES: &str = "REGELN:\n\
- Gib ausschließlich ein einzelnes JSON-Objekt zurück, ohne Einleitung oder Erklärung.\n\
- Verwende exakt die deutschen Feldnamen wie im Schema.\n\
- Wenn ein Feld nicht erkennbar ist, lasse es weg.\n\
- Berechne keine Summen, Steuern oder andere Werte; übernimm nur, was im Dokument steht.\n\
- Erfinde keine Daten.\n\
- Beträge als Zahl mit Punkt als Dezimaltrennzeichen, Datumsangaben als JJJJ-MM-TT.\n\
- \"rohtext\" enthält den vollständigen Text des Dokuments.\n\
- \"konfidenz\" ist deine Sicherheit zwischen 0 und 1.";

/// Shape of the answer, embedded in every prompt.
pub(crate) const DRAFT_SCHEMA: &str = r#"{
  "rohtext": "string",
  "konfidenz": "number",
  "rechnung": {
    "dokument": {
      "rechnungsnummer": "string",
      "rechnungsart": "RECHNUNG | GUTSCHRIFT",
      "rechnungsdatum": "JJJJ-MM-TT",
      "leistungsdatum": "JJJJ-MM-TT",
      "faelligkeitsdatum": "JJJJ-MM-TT",
      "waehrung": "EUR",
      "leitweg_id": "string"
    },
    "verkaeufer": {
      "name": "string",
      "umsatzsteuer_id": "string",
      "steuernummer": "string",
      "anschrift": { "strasse": "string", "plz": "string", "ort": "string", "land": "DE" }
    },
    "kaeufer": {
      "name": "string",
      "umsatzsteuer_id": "string",
      "anschrift": { "strasse": "string", "plz": "string", "ort": "string", "land": "DE" }
    },
    "positionen": [
      {
        "positionsnummer": "string",
        "beschreibung": "string",
        "menge": "number",
        "einheit": "string",
        "einzelpreis_netto": "number",
        "positionsbetrag_netto": "number",
        "umsatzsteuer": { "kategorie": "S | Z | E | AE | K | G | O", "satz": "number" }
      }
    ],
    "summen": {
      "gesamt_netto": "number",
      "gesamt_umsatzsteuer": "number",
      "gesamt_brutto": "number",
      "zahlbetrag": "number"
    },
    "zahlungsbedingungen": "string",
    "bemerkungen": [ { "text": "string" } ]
  }
}"#;

/// Build the request for a document with an optional text layer.
pub fn build_request(text: Option<&str>, images: Vec<PageImage>) -> ModelRequest {
    let task = match text {
        Some(_) => "AUFGABE:\nAnalysiere den folgenden Rechnungstext und extrahiere alle relevanten Rechnungsdaten.",
        None => "AUFGABE:\nLies die beigefügten Seitenbilder, transkribiere den Text und extrahiere alle relevanten Rechnungsdaten.",
    };
    let mut prompt = format!("{task}\n\n{RULES}\n\nSCHEMA:\n{DRAFT_SCHEMA}\n");
    if let Some(text) = text {
        prompt.push_str("\nRECHNUNGSTEXT:\n");
        prompt.push_str(text);
        prompt.push('\n');
    }
    ModelRequest {
        system: SYSTEM_PROMPT.to_string(),
        prompt,
        images,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_requests_embed_the_document() {
        let request = build_request(Some("Rechnung 2024-001"), Vec::new());
        assert!(request.prompt.contains("RECHNUNGSTEXT:\nRechnung 2024-001"));
        assert!(request.prompt.contains("\"positionen\""));
        assert!(request.images.is_empty());
    }

    #[test]
    fn scan_requests_ask_for_transcription() {
        let request = build_request(None, vec![PageImage::new("image/png", vec![1, 2, 3])]);
        assert!(request.prompt.contains("Seitenbilder"));
        assert!(!request.prompt.contains("RECHNUNGSTEXT"));
        assert_eq!(request.images.len(), 1);
    }

    #[test]
    fn schema_is_valid_json() {
        let value: serde_json::Value = serde_json::from_str(DRAFT_SCHEMA).unwrap();
        assert!(value["rechnung"]["positionen"].is_array());
    }
}
