//! Text layers of Office Open XML documents.
//!
//! DOCX: paragraphs in document order; a table row becomes one line with
//! its cells joined by `"; "`. XLSX: every sheet starts with a
//! `# Tabelle: <name>` line followed by its non-empty rows, cells joined by
//! `"; "`.

use std::io::{Cursor, Read};

use calamine::{DataType, Reader, Xlsx};
use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use zip::ZipArchive;

use crate::core::RechnungError;

pub fn docx_text(bytes: &[u8]) -> Result<String, RechnungError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| RechnungError::UnsupportedDocument(format!("unreadable DOCX: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| RechnungError::UnsupportedDocument(format!("DOCX without body: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| RechnungError::UnsupportedDocument(format!("unreadable DOCX body: {e}")))?;
    document_text(&xml)
        .map_err(|e| RechnungError::UnsupportedDocument(format!("malformed DOCX body: {e}")))
}

/// Walk `word/document.xml`.
fn document_text(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = XmlReader::from_str(xml);
    let mut lines = Vec::new();
    let mut paragraph = String::new();
    // open rows and cells; nested tables push another level
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut in_run = false;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"r" => in_run = true,
                b"t" if in_run => in_text = true,
                b"tr" => rows.push(Vec::new()),
                b"tc" => cells.push(String::new()),
                _ => {}
            },
            Event::Empty(e) if in_run => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" | b"cr" => paragraph.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => paragraph.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"r" => in_run = false,
                b"t" => in_text = false,
                b"p" => {
                    let text = std::mem::take(&mut paragraph);
                    match cells.last_mut() {
                        Some(cell) => append(cell, &text, " "),
                        None => lines.push(text),
                    }
                }
                b"tc" => {
                    if let (Some(cell), Some(row)) = (cells.pop(), rows.last_mut()) {
                        row.push(cell.trim().to_string());
                    }
                }
                b"tr" => {
                    if let Some(row) = rows.pop() {
                        let line = row.join("; ");
                        match cells.last_mut() {
                            Some(cell) => append(cell, &line, " "),
                            None => lines.push(line),
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(lines.join("\n"))
}

fn append(target: &mut String, text: &str, separator: &str) {
    if !target.is_empty() && !text.is_empty() {
        target.push_str(separator);
    }
    target.push_str(text);
}

pub fn xlsx_text(bytes: &[u8]) -> Result<String, RechnungError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| RechnungError::UnsupportedDocument(format!("unreadable XLSX: {e}")))?;

    let mut lines = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name).map_err(|e| {
            RechnungError::UnsupportedDocument(format!("unreadable sheet '{name}': {e}"))
        })?;
        lines.push(format!("# Tabelle: {name}"));
        for row in range.rows() {
            if row.iter().all(DataType::is_empty) {
                continue;
            }
            let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
            lines.push(cells.join("; "));
        }
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::{Cursor, Write};

    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    pub fn zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    pub fn docx(body: &str) -> Vec<u8> {
        let document = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        );
        zip(&[
            ("[Content_Types].xml", CONTENT_TYPES),
            ("word/document.xml", &document),
        ])
    }

    /// One sheet per `(name, sheetData rows)`.
    pub fn xlsx(sheets: &[(&str, &str)]) -> Vec<u8> {
        let mut workbook = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
        );
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        let mut parts = Vec::new();
        for (i, (name, rows)) in sheets.iter().enumerate() {
            let n = i + 1;
            workbook.push_str(&format!(r#"<sheet name="{name}" sheetId="{n}" r:id="rId{n}"/>"#));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            ));
            parts.push((
                format!("xl/worksheets/sheet{n}.xml"),
                format!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{rows}</sheetData></worksheet>"#
                ),
            ));
        }
        workbook.push_str("</sheets></workbook>");
        rels.push_str("</Relationships>");

        let mut entries: Vec<(&str, &str)> = vec![
            ("[Content_Types].xml", CONTENT_TYPES),
            ("xl/workbook.xml", &workbook),
            ("xl/_rels/workbook.xml.rels", &rels),
        ];
        entries.extend(parts.iter().map(|(n, c)| (n.as_str(), c.as_str())));
        zip(&entries)
    }

    const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#;
}

#[cfg(test)]
mod tests {
    use super::fixtures::{docx, xlsx, zip};
    use super::*;

    #[test]
    fn docx_paragraphs_and_table_rows_in_order() {
        let body = r#"
<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr>
  <w:r><w:t>Rechnung Nr. </w:t></w:r><w:r><w:t>RE-2024-017</w:t></w:r></w:p>
<w:tbl>
  <w:tr><w:tc><w:p><w:r><w:t>Beratung</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>1.500,00</w:t></w:r></w:p></w:tc></w:tr>
  <w:tr><w:tc><w:p><w:r><w:t>Fahrt &amp; Spesen</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>49,90</w:t></w:r></w:p></w:tc></w:tr>
</w:tbl>
<w:p><w:r><w:t>Summe</w:t><w:tab/><w:t>1.549,90</w:t></w:r></w:p>"#;
        let text = docx_text(&docx(body)).unwrap();
        assert_eq!(
            text,
            "Rechnung Nr. RE-2024-017\nBeratung; 1.500,00\nFahrt & Spesen; 49,90\nSumme\t1.549,90"
        );
    }

    #[test]
    fn multi_paragraph_cells_are_joined() {
        let body = r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>Kunde AG</w:t></w:r></w:p><w:p><w:r><w:t>München</w:t></w:r></w:p></w:tc><w:tc><w:p/></w:tc></w:tr></w:tbl>"#;
        assert_eq!(docx_text(&docx(body)).unwrap(), "Kunde AG München; ");
    }

    #[test]
    fn docx_without_body_is_unsupported() {
        let bytes = zip(&[("word/styles.xml", "<w:styles/>")]);
        let err = docx_text(&bytes).unwrap_err();
        assert_eq!(err.kind(), "unsupported_document");

        let err = docx_text(b"PK\x03\x04 kaputt").unwrap_err();
        assert_eq!(err.kind(), "unsupported_document");
    }

    #[test]
    fn xlsx_sheets_become_semicolon_rows() {
        let positions = r#"
<row r="1"><c r="A1" t="inlineStr"><is><t>Position</t></is></c><c r="B1" t="inlineStr"><is><t>Betrag</t></is></c></row>
<row r="3"><c r="A3" t="inlineStr"><is><t>Beratung</t></is></c><c r="B3"><v>1500.5</v></c></row>"#;
        let meta = r#"<row r="1"><c r="A1" t="inlineStr"><is><t>Rechnungsnummer</t></is></c><c r="B1" t="inlineStr"><is><t>RE-9</t></is></c></row>"#;
        let text = xlsx_text(&xlsx(&[("Positionen", positions), ("Kopf", meta)])).unwrap();
        assert_eq!(
            text,
            "# Tabelle: Positionen\nPosition; Betrag\nBeratung; 1500.5\n# Tabelle: Kopf\nRechnungsnummer; RE-9"
        );
    }

    #[test]
    fn broken_xlsx_is_unsupported() {
        let err = xlsx_text(b"PK\x03\x04 kaputt").unwrap_err();
        assert_eq!(err.kind(), "unsupported_document");
    }
}
