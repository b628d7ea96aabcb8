//! Fixtures shared by the pipeline and HTTP tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rechnungswerk::RechnungError;
use rechnungswerk::config::{ConfigStore, IssuerProfile, SettingsUpdate};
use rechnungswerk::extract::{ExtractionModel, ModelLoader, ModelRequest};
use rechnungswerk::pipeline::{JobOrchestrator, PipelineConfig};
use rechnungswerk::zugferd::resolve_font_path;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Answers with the first canned reply whose marker occurs in the prompt.
pub struct StubModel {
    replies: Vec<(String, String)>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ExtractionModel for StubModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, RechnungError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .iter()
            .find(|(marker, _)| request.prompt.contains(marker.as_str()))
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| RechnungError::ExtractionUnavailable("no canned reply".into()))
    }
}

/// Hands out the stub model when the configured file exists.
pub struct StubLoader {
    pub model: Arc<StubModel>,
}

impl StubLoader {
    pub fn new(replies: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            model: Arc::new(StubModel {
                replies: replies
                    .iter()
                    .map(|(m, r)| (m.to_string(), r.to_string()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }),
        })
    }
}

#[async_trait]
impl ModelLoader for StubLoader {
    async fn load(&self, model_path: &Path) -> Result<Arc<dyn ExtractionModel>, RechnungError> {
        if !model_path.is_file() {
            return Err(RechnungError::ExtractionUnavailable(format!(
                "model {} not found",
                model_path.display()
            )));
        }
        Ok(self.model.clone())
    }
}

pub const ISSUER_JSON: &str = r#"{
    "name": "ACME GmbH",
    "umsatzsteuer_id": "DE123456789",
    "steuernummer": "30/123/45678",
    "anschrift": {"strasse": "Hauptstraße 1", "plz": "10115", "ort": "Berlin", "land": "DE"},
    "zahlung": {"zahlungsart": "SEPA", "iban": "DE89370400440532013000", "bic": "COBADEFFXXX"},
    "kontakt": {"name": "Erika Muster", "telefon": "+49 30 123456", "email": "rechnung@acme.example"}
}"#;

/// Model reply for one invoice; `summen` is the stated totals object.
pub fn reply(number: &str, buyer: &str, summen: &str) -> String {
    format!(
        r#"Hier die Daten:
{{"rohtext": "Rechnung {number}", "konfidenz": 0.92,
  "rechnung": {{
    "dokument": {{"rechnungsnummer": "{number}", "rechnungsart": "RECHNUNG",
                  "rechnungsdatum": "2024-06-15", "leistungsdatum": "2024-06-10",
                  "faelligkeitsdatum": "2024-07-15", "waehrung": "EUR"}},
    "verkaeufer": {{"name": "Irgendwer", "umsatzsteuer_id": "DE999999999"}},
    "kaeufer": {{"name": "{buyer}",
                "anschrift": {{"strasse": "Marienplatz 1", "plz": "80331", "ort": "München", "land": "DE"}}}},
    "positionen": [
      {{"positionsnummer": "1", "beschreibung": "Beratung", "menge": 10, "einheit": "Std",
        "einzelpreis_netto": 150, "positionsbetrag_netto": 1500,
        "umsatzsteuer": {{"kategorie": "S", "satz": 19}}}},
      {{"positionsnummer": "2", "beschreibung": "Fachbuch", "menge": 2, "einheit": "Stk",
        "einzelpreis_netto": 24.95, "positionsbetrag_netto": 49.90,
        "umsatzsteuer": {{"kategorie": "S", "satz": 7}}}}
    ],
    "summen": {summen},
    "zahlungsbedingungen": "Zahlbar innerhalb von 30 Tagen"
  }}}}"#
    )
}

pub const CONSISTENT_TOTALS: &str = r#"{"gesamt_netto": 1549.90, "gesamt_umsatzsteuer": 288.49,
    "gesamt_brutto": 1838.39, "zahlbetrag": 1838.39}"#;

/// Net and gross both off: not repairable.
pub const BROKEN_TOTALS: &str = r#"{"gesamt_netto": 1500.00, "gesamt_umsatzsteuer": 288.49,
    "gesamt_brutto": 1788.49, "zahlbetrag": 1838.39}"#;

/// A text document the stub recognizes by its invoice number.
pub fn document_text(number: &str) -> String {
    format!("ACME GmbH\nRechnung {number}\nBeratung 10 Std à 150,00 EUR\nFachbuch 2 Stk\n")
}

pub struct Harness {
    pub data_dir: TempDir,
    pub output_dir: TempDir,
    pub store: Arc<ConfigStore>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub loader: Arc<StubLoader>,
}

impl Harness {
    /// Data dir with firm data and a model file, empty output root.
    pub async fn new(replies: &[(&str, &str)]) -> Self {
        Self::with_document_limit(replies, PipelineConfig::default().extractor.max_document_bytes)
            .await
    }

    pub async fn with_document_limit(replies: &[(&str, &str)], max_document_bytes: usize) -> Self {
        let data_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let model = data_dir.path().join("model.gguf");
        std::fs::write(&model, b"GGUF").unwrap();

        let store = Arc::new(ConfigStore::load(data_dir.path()).await.unwrap());
        let issuer: IssuerProfile = serde_json::from_str(ISSUER_JSON).unwrap();
        store.update_issuer(issuer).await.unwrap();
        store
            .update_settings(SettingsUpdate {
                llm_model_path: Some(model.display().to_string()),
                logo_path: None,
            })
            .await
            .unwrap();

        let loader = StubLoader::new(replies);
        let mut config = PipelineConfig {
            output_root: output_dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        config.extractor.max_document_bytes = max_document_bytes;
        let orchestrator = Arc::new(JobOrchestrator::new(config, store.clone(), loader.clone()));
        Self {
            data_dir,
            output_dir,
            store,
            orchestrator,
            loader,
        }
    }

    /// Entries of the output root, hidden staging directories included.
    pub fn output_entries(&self) -> Vec<PathBuf> {
        let mut entries: Vec<_> = std::fs::read_dir(self.output_dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        entries
    }
}

/// PDF packaging needs a TrueType font on the host.
pub fn font_available() -> bool {
    let available = resolve_font_path(None).is_ok();
    if !available {
        eprintln!("skipping: no system TrueType font found");
    }
    available
}

fn zip_archive(entries: &[(&str, String)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A Word document with one paragraph per line of `text`.
pub fn docx_bytes(text: &str) -> Vec<u8> {
    let paragraphs: String = text
        .lines()
        .map(|line| format!("<w:p><w:r><w:t xml:space=\"preserve\">{line}</w:t></w:r></w:p>"))
        .collect();
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{paragraphs}</w:body></w:document>"#
    );
    zip_archive(&[("word/document.xml", document)])
}

/// A workbook with a single sheet `Rechnung` of inline string cells.
pub fn xlsx_bytes(rows: &[[&str; 2]]) -> Vec<u8> {
    let sheet_rows: String = rows
        .iter()
        .enumerate()
        .map(|(i, [a, b])| {
            let r = i + 1;
            format!(
                r#"<row r="{r}"><c r="A{r}" t="inlineStr"><is><t>{a}</t></is></c><c r="B{r}" t="inlineStr"><is><t>{b}</t></is></c></row>"#
            )
        })
        .collect();
    zip_archive(&[
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Rechnung" sheetId="1" r:id="rId1"/></sheets></workbook>"#
                .to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#
                .to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{sheet_rows}</sheetData></worksheet>"#
            ),
        ),
    ])
}
