//! DOCX extraction: body paragraphs plus core document properties.
//!
//! A `.docx` file is a ZIP archive; the body lives in `word/document.xml`
//! and the document properties in `docProps/core.xml`. Both are parsed with
//! `quick-xml` in streaming mode. Extraction never panics: every failure is
//! returned as an [`ExtractError`] so the aggregation run can skip the file.

use std::io::Read;
use std::path::Path;

use crate::models::{DocMetadata, DocumentContent, DocumentRecord};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction failure. `NotFound` and `Ooxml` are both non-fatal to the
/// aggregation caller, which reports and skips the document.
#[derive(Debug)]
pub enum ExtractError {
    NotFound(String),
    Ooxml(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::NotFound(path) => write!(f, "file not found: {}", path),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts a [`DocumentRecord`] from a `.docx` file on disk.
pub fn extract_document(path: &Path) -> Result<DocumentRecord, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::NotFound(path.display().to_string()));
    }
    let bytes =
        std::fs::read(path).map_err(|e| ExtractError::Ooxml(format!("read failed: {}", e)))?;
    extract_from_bytes(&bytes)
}

/// Extracts a [`DocumentRecord`] from in-memory DOCX bytes.
pub fn extract_from_bytes(bytes: &[u8]) -> Result<DocumentRecord, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;

    let doc_xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    let paragraphs = extract_paragraphs(&doc_xml)?;

    // docProps/core.xml is optional; a document without properties yields an
    // all-empty metadata map.
    let metadata = if archive.by_name("docProps/core.xml").is_ok() {
        let core_xml = read_zip_entry_bounded(&mut archive, "docProps/core.xml")?;
        extract_core_properties(&core_xml)?
    } else {
        DocMetadata::default()
    };

    Ok(DocumentRecord {
        metadata,
        content: DocumentContent { paragraphs },
        indice_rag: None,
    })
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Collects the text of every `w:p` element, one string per paragraph.
/// Paragraphs are trimmed; empty or whitespace-only paragraphs are dropped.
fn extract_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut paragraphs = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    // Whitespace inside runs is significant, so no trim_text here.
    let mut buf = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push('\n'),
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(t)) => {
                if in_text {
                    current.push_str(t.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = current.trim();
                    if !text.is_empty() {
                        paragraphs.push(text.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

/// Reads the fixed core-property set, keeping only truthy values.
///
/// Mapping from OOXML element names: `dc:creator` is the author and
/// `dc:description` holds the comments field. The three date properties are
/// W3CDTF strings; they are re-serialized as RFC 3339 when they parse, and
/// kept verbatim otherwise.
fn extract_core_properties(xml: &[u8]) -> Result<DocMetadata, ExtractError> {
    let mut meta = DocMetadata::default();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut field: Option<Vec<u8>> = None;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                field = Some(e.local_name().as_ref().to_vec());
            }
            Ok(quick_xml::events::Event::Text(t)) => {
                if let Some(name) = field.as_deref() {
                    let value = t.unescape().unwrap_or_default().trim().to_string();
                    assign_property(&mut meta, name, value);
                }
            }
            Ok(quick_xml::events::Event::End(_)) => field = None,
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(meta)
}

fn assign_property(meta: &mut DocMetadata, element: &[u8], value: String) {
    match element {
        b"title" => meta.title = non_empty(value),
        b"subject" => meta.subject = non_empty(value),
        b"creator" => meta.author = non_empty(value),
        b"category" => meta.category = non_empty(value),
        b"keywords" => meta.keywords = non_empty(value),
        b"description" => meta.comments = non_empty(value),
        b"lastModifiedBy" => meta.last_modified_by = non_empty(value),
        b"revision" => meta.revision = non_zero(value),
        b"version" => meta.version = non_empty(value),
        b"created" => meta.created = non_empty(value).map(|v| normalize_date(&v)),
        b"modified" => meta.modified = non_empty(value).map(|v| normalize_date(&v)),
        b"lastPrinted" => meta.last_printed = non_empty(value).map(|v| normalize_date(&v)),
        _ => {}
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// The revision property is numeric; an unset revision serializes as `0`.
fn non_zero(value: String) -> Option<String> {
    match value.trim_start_matches('0') {
        "" => None,
        _ => non_empty(value),
    }
}

fn normalize_date(raw: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt.to_rfc3339(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOCUMENT_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>Rapport d'Activité Mai 2025</w:t></w:r></w:p>
    <w:p><w:r><w:t>Ceci est le récapitulatif </w:t></w:r><w:r><w:t>des performances.</w:t></w:r></w:p>
    <w:p><w:r><w:t>   </w:t></w:r></w:p>
    <w:p/>
    <w:p><w:r><w:t xml:space="preserve">  Les ventes ont augmenté de 15%.  </w:t></w:r></w:p>
  </w:body>
</w:document>"#;

    const CORE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties"
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmlns:dcterms="http://purl.org/dc/terms/"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <dc:title>Rapport Mensuel</dc:title>
  <dc:subject>Analyse des ventes</dc:subject>
  <dc:creator>Jean Dupont</dc:creator>
  <cp:keywords>ventes, rapport, mensuel</cp:keywords>
  <dc:description>Ce rapport couvre les ventes de Mai 2025.</dc:description>
  <cp:lastModifiedBy>Jane Doe</cp:lastModifiedBy>
  <cp:revision>3</cp:revision>
  <dcterms:created xsi:type="dcterms:W3CDTF">2025-05-01T10:00:00Z</dcterms:created>
  <dcterms:modified xsi:type="dcterms:W3CDTF">2025-05-20T08:30:00Z</dcterms:modified>
</cp:coreProperties>"#;

    const EMPTY_CORE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties"
    xmlns:dc="http://purl.org/dc/elements/1.1/">
  <dc:title></dc:title>
  <dc:creator></dc:creator>
  <cp:revision>0</cp:revision>
</cp:coreProperties>"#;

    fn docx_bytes(document_xml: &str, core_xml: Option<&str>) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            if let Some(core) = core_xml {
                writer.start_file("docProps/core.xml", options).unwrap();
                writer.write_all(core.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn paragraphs_are_trimmed_and_non_empty() {
        let record = extract_from_bytes(&docx_bytes(DOCUMENT_XML, Some(CORE_XML))).unwrap();
        assert_eq!(
            record.content.paragraphs,
            vec![
                "Rapport d'Activité Mai 2025",
                "Ceci est le récapitulatif des performances.",
                "Les ventes ont augmenté de 15%.",
            ]
        );
        assert!(record
            .content
            .paragraphs
            .iter()
            .all(|p| !p.trim().is_empty()));
    }

    #[test]
    fn metadata_keeps_only_truthy_fields() {
        let record = extract_from_bytes(&docx_bytes(DOCUMENT_XML, Some(CORE_XML))).unwrap();
        let meta = &record.metadata;
        assert_eq!(meta.title.as_deref(), Some("Rapport Mensuel"));
        assert_eq!(meta.author.as_deref(), Some("Jean Dupont"));
        assert_eq!(meta.last_modified_by.as_deref(), Some("Jane Doe"));
        assert_eq!(meta.revision.as_deref(), Some("3"));
        // Unset properties must be absent, not empty.
        assert_eq!(meta.category, None);
        assert_eq!(meta.version, None);
        assert_eq!(meta.last_printed, None);
    }

    #[test]
    fn empty_and_zero_properties_are_omitted() {
        let record = extract_from_bytes(&docx_bytes(DOCUMENT_XML, Some(EMPTY_CORE_XML))).unwrap();
        assert_eq!(record.metadata, DocMetadata::default());
    }

    #[test]
    fn dates_are_iso_8601() {
        let record = extract_from_bytes(&docx_bytes(DOCUMENT_XML, Some(CORE_XML))).unwrap();
        let created = record.metadata.created.unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(&created).is_ok());
        let modified = record.metadata.modified.unwrap();
        assert!(modified.starts_with("2025-05-20T08:30:00"));
    }

    #[test]
    fn missing_core_properties_yield_empty_metadata() {
        let record = extract_from_bytes(&docx_bytes(DOCUMENT_XML, None)).unwrap();
        assert_eq!(record.metadata, DocMetadata::default());
        assert_eq!(record.content.paragraphs.len(), 3);
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = extract_document(Path::new("/nonexistent/rapport.docx")).unwrap_err();
        assert!(matches!(err, ExtractError::NotFound(_)));
    }

    #[test]
    fn invalid_zip_is_a_parse_error() {
        let err = extract_from_bytes(b"not a zip archive").unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn docx_without_document_xml_is_a_parse_error() {
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/other.xml", options).unwrap();
            writer.write_all(b"<x/>").unwrap();
            writer.finish().unwrap();
        }
        let err = extract_from_bytes(&cursor.into_inner()).unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }
}
