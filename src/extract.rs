//! Content extractor registry.
//!
//! Turns field bytes into normalized UTF-8 text. Two entry points:
//!
//! - [`ExtractorRegistry::extract_declared`] for columns whose type an
//!   administrator declared (`TXT`, `JSON`, `XLSX`, ...);
//! - [`ExtractorRegistry::extract_sniffed`] for `BLOB` columns, dispatched on
//!   the MIME type assigned by the [`Classifier`].
//!
//! Both resolve to a closed [`Strategy`] through exhaustive matches. A type
//! with no strategy yields `Ok(None)`: the row is skipped, not failed.
//! Malformed content yields an [`ExtractError`] that the row processor
//! reports and skips.
//!
//! Binary formats (PDF, DOCX, XLSX, PPTX) go through [`FormatExtractor`]
//! implementations that can be swapped per registry.

use std::io::Read;
use std::sync::Arc;

use serde_json::Value;

use crate::classify::{Classifier, MagicSniffer, SignatureSniffer};
use crate::error::ExtractError;
use crate::models::{ClassifiedContent, ContentType, FieldType};
use crate::structured;

/// Maximum cells to process per sheet (avoids unbounded memory).
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Column `XFD`, the widest sheet Excel can write.
const XLSX_MAX_COLUMNS: usize = 16_384;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Caller-supplied extraction options.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Dotted paths to project out of XML/JSON content. Empty means the
    /// whole document.
    pub paths: Vec<String>,
}

/// Extracted text plus, for structured formats, the parsed tree.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub tree: Option<Value>,
}

impl Extraction {
    fn text(text: String) -> Self {
        Self { text, tree: None }
    }
}

/// Extraction strategy. Every declared or sniffed type maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    PlainText,
    Csv,
    Json { pretty: bool },
    Xml,
    Html,
    Rtf,
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    Unsupported,
}

impl Strategy {
    pub fn for_field_type(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Txt => Strategy::PlainText,
            FieldType::Csv => Strategy::Csv,
            FieldType::Json => Strategy::Json { pretty: false },
            FieldType::Xml => Strategy::Xml,
            FieldType::Html => Strategy::Html,
            FieldType::Xlsx => Strategy::Xlsx,
            FieldType::Pdf => Strategy::Pdf,
            FieldType::Doc | FieldType::Docx => Strategy::Docx,
            FieldType::Blob | FieldType::Unsupported(_) => Strategy::Unsupported,
        }
    }

    pub fn for_content_type(content_type: &ContentType) -> Self {
        match content_type {
            ContentType::Pdf => Strategy::Pdf,
            ContentType::Docx | ContentType::Doc => Strategy::Docx,
            ContentType::Xlsx | ContentType::Xls | ContentType::Cfb => Strategy::Xlsx,
            ContentType::Pptx | ContentType::Ppt => Strategy::Pptx,
            ContentType::Csv => Strategy::Csv,
            ContentType::Xml | ContentType::TextXml => Strategy::Xml,
            ContentType::Rtf => Strategy::Rtf,
            ContentType::Json => Strategy::Json { pretty: true },
            ContentType::Html => Strategy::Html,
            ContentType::PlainText => Strategy::PlainText,
            ContentType::Zip
            | ContentType::Gzip
            | ContentType::Png
            | ContentType::Jpeg
            | ContentType::Gif
            | ContentType::OctetStream
            | ContentType::Other(_) => Strategy::Unsupported,
        }
    }
}

/// A format-specific `bytes -> text` capability.
pub trait FormatExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError>;
}

impl<F> FormatExtractor for F
where
    F: Fn(&[u8]) -> Result<String, ExtractError> + Send + Sync,
{
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        self(bytes)
    }
}

/// Maps strategies to extractors and runs them.
pub struct ExtractorRegistry<S = MagicSniffer> {
    classifier: Classifier<S>,
    pdf: Arc<dyn FormatExtractor>,
    docx: Arc<dyn FormatExtractor>,
    xlsx: Arc<dyn FormatExtractor>,
    pptx: Arc<dyn FormatExtractor>,
}

impl Default for ExtractorRegistry<MagicSniffer> {
    fn default() -> Self {
        Self::new(Classifier::default())
    }
}

impl<S: SignatureSniffer> ExtractorRegistry<S> {
    /// Registry with the built-in binary extractors.
    pub fn new(classifier: Classifier<S>) -> Self {
        Self {
            classifier,
            pdf: Arc::new(extract_pdf),
            docx: Arc::new(extract_docx),
            xlsx: Arc::new(extract_xlsx),
            pptx: Arc::new(extract_pptx),
        }
    }

    pub fn with_pdf(mut self, extractor: Arc<dyn FormatExtractor>) -> Self {
        self.pdf = extractor;
        self
    }

    pub fn with_docx(mut self, extractor: Arc<dyn FormatExtractor>) -> Self {
        self.docx = extractor;
        self
    }

    pub fn with_xlsx(mut self, extractor: Arc<dyn FormatExtractor>) -> Self {
        self.xlsx = extractor;
        self
    }

    pub fn with_pptx(mut self, extractor: Arc<dyn FormatExtractor>) -> Self {
        self.pptx = extractor;
        self
    }

    pub fn classify(&self, bytes: Vec<u8>) -> ClassifiedContent {
        ClassifiedContent {
            content_type: self.classifier.classify(&bytes),
            bytes,
        }
    }

    /// Extract a column of declared type.
    pub fn extract_declared(
        &self,
        field_type: &FieldType,
        bytes: &[u8],
        options: &ExtractOptions,
    ) -> Result<Option<Extraction>, ExtractError> {
        let strategy = Strategy::for_field_type(field_type);
        if strategy == Strategy::Unsupported {
            tracing::warn!(field_type = field_type.as_str(), "unsupported field type");
        }
        self.run(strategy, bytes, options)
    }

    /// Extract classified BLOB content.
    pub fn extract_sniffed(
        &self,
        content: &ClassifiedContent,
        options: &ExtractOptions,
    ) -> Result<Option<Extraction>, ExtractError> {
        let strategy = Strategy::for_content_type(&content.content_type);
        if strategy == Strategy::Unsupported {
            tracing::info!(
                content_type = %content.content_type,
                "no extraction strategy for content type"
            );
        }
        self.run(strategy, &content.bytes, options)
    }

    fn run(
        &self,
        strategy: Strategy,
        bytes: &[u8],
        options: &ExtractOptions,
    ) -> Result<Option<Extraction>, ExtractError> {
        let extraction = match strategy {
            Strategy::PlainText | Strategy::Csv | Strategy::Rtf => {
                Extraction::text(String::from_utf8_lossy(bytes).into_owned())
            }
            Strategy::Json { pretty } => extract_json(bytes, pretty, &options.paths)?,
            Strategy::Xml => extract_xml(bytes, &options.paths)?,
            Strategy::Html => Extraction::text(extract_html_body(&String::from_utf8_lossy(
                bytes,
            ))?),
            Strategy::Pdf => Extraction::text(self.pdf.extract(bytes)?),
            Strategy::Docx => Extraction::text(self.docx.extract(bytes)?),
            Strategy::Xlsx => Extraction::text(self.xlsx.extract(bytes)?),
            Strategy::Pptx => Extraction::text(self.pptx.extract(bytes)?),
            Strategy::Unsupported => return Ok(None),
        };
        Ok(Some(extraction))
    }
}

fn extract_json(bytes: &[u8], pretty: bool, paths: &[String]) -> Result<Extraction, ExtractError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ExtractError::Json(e.to_string()))?;
    let text = if !paths.is_empty() {
        structured::project(&value, paths)
    } else if pretty {
        serde_json::to_string_pretty(&value).map_err(|e| ExtractError::Json(e.to_string()))?
    } else {
        value.to_string()
    };
    Ok(Extraction {
        text,
        tree: Some(value),
    })
}

fn extract_xml(bytes: &[u8], paths: &[String]) -> Result<Extraction, ExtractError> {
    let value = structured::xml_to_value(&String::from_utf8_lossy(bytes))?;
    let text = if paths.is_empty() {
        value.to_string()
    } else {
        structured::project(&value, paths)
    };
    Ok(Extraction {
        text,
        tree: Some(value),
    })
}

/// Text content of `<body>`, tags stripped and trimmed.
pub fn extract_html_body(html: &str) -> Result<String, ExtractError> {
    let document = scraper::Html::parse_document(html);
    let selector =
        scraper::Selector::parse("body").map_err(|e| ExtractError::Html(format!("{:?}", e)))?;
    let text = document
        .select(&selector)
        .next()
        .map(|body| body.text().collect::<String>())
        .unwrap_or_default();
    Ok(text.trim().to_string())
}

pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>, ExtractError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ExtractError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut Archive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Entry names under `prefix` ending in `.xml`, ordered by their numeric suffix.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    collect_text_runs(&xml, b"p")
}

pub fn extract_pptx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let mut out = String::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let text = collect_text_runs(&xml, b"p")?;
        if !out.is_empty() && !text.is_empty() {
            out.push('\n');
        }
        out.push_str(&text);
    }
    Ok(out)
}

/// Concatenate `<*:t>` runs, one line per `<*:{paragraph}>`.
fn collect_text_runs(xml: &[u8], paragraph: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::Text(te)) if in_t => {
                out.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    in_t = false;
                } else if name.as_ref() == paragraph && !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

/// First worksheet rendered as CSV.
pub fn extract_xlsx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };
    let first_sheet = numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .next()
        .ok_or_else(|| ExtractError::Ooxml("workbook has no worksheets".to_string()))?;
    let sheet_xml = read_zip_entry_bounded(&mut archive, &first_sheet, MAX_XML_ENTRY_BYTES)?;
    sheet_to_csv(&sheet_xml, &shared_strings)
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Default)]
struct CellState {
    column: Option<usize>,
    kind: Vec<u8>,
    value: String,
    in_value: bool,
}

fn sheet_to_csv(xml: &[u8], shared_strings: &[String]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut lines: Vec<String> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = CellState::default();
    let mut cell_count = 0usize;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        if cell_count >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    cell = CellState::default();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"r" => cell.column = column_index(&attr.value)?,
                            b"t" => cell.kind = attr.value.to_vec(),
                            _ => {}
                        }
                    }
                }
                b"v" | b"t" => cell.in_value = true,
                _ => {}
            },
            Ok(Event::Text(te)) if cell.in_value => {
                cell.value.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => cell.in_value = false,
                b"c" => {
                    let text = cell_text(&cell, shared_strings);
                    let col = cell.column.unwrap_or(row.len());
                    if row.len() <= col {
                        row.resize(col + 1, String::new());
                    }
                    row[col] = text;
                    cell_count += 1;
                }
                b"row" => lines.push(
                    row.iter()
                        .map(|v| csv_field(v))
                        .collect::<Vec<_>>()
                        .join(","),
                ),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(lines.join("\n"))
}

fn cell_text(cell: &CellState, shared_strings: &[String]) -> String {
    let raw = cell.value.trim();
    match cell.kind.as_slice() {
        b"s" => raw
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i).cloned())
            .unwrap_or_default(),
        b"b" => match raw {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        _ => cell.value.clone(),
    }
}

/// Zero-based column index from a cell reference such as `AB12`.
/// References past `XFD` are rejected.
fn column_index(reference: &[u8]) -> Result<Option<usize>, ExtractError> {
    let out_of_range = || {
        ExtractError::Ooxml(format!(
            "cell reference out of range: {}",
            String::from_utf8_lossy(reference)
        ))
    };
    let mut col = 0usize;
    let mut seen = false;
    for &b in reference {
        if !b.is_ascii_alphabetic() {
            break;
        }
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as usize;
        col = col
            .checked_mul(26)
            .and_then(|c| c.checked_add(digit))
            .filter(|c| *c <= XLSX_MAX_COLUMNS)
            .ok_or_else(out_of_range)?;
        seen = true;
    }
    Ok(seen.then(|| col - 1))
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            for (name, body) in entries {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    fn registry() -> ExtractorRegistry {
        ExtractorRegistry::default()
    }

    #[test]
    fn every_field_type_has_a_strategy() {
        assert_eq!(Strategy::for_field_type(&FieldType::Doc), Strategy::Docx);
        assert_eq!(Strategy::for_field_type(&FieldType::Blob), Strategy::Unsupported);
        assert_eq!(
            Strategy::for_content_type(&ContentType::Cfb),
            Strategy::Xlsx
        );
        assert_eq!(
            Strategy::for_content_type(&ContentType::Other("video/mp4".into())),
            Strategy::Unsupported
        );
    }

    #[test]
    fn unsupported_declared_type_is_no_content() {
        let out = registry()
            .extract_declared(
                &FieldType::Unsupported("PARQUET".into()),
                b"data",
                &ExtractOptions::default(),
            )
            .unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn unknown_sniffed_type_is_no_content() {
        let reg = registry();
        let content = reg.classify(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0]);
        assert_eq!(content.content_type, ContentType::Png);
        assert!(reg
            .extract_sniffed(&content, &ExtractOptions::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn declared_text_and_csv_pass_through() {
        let reg = registry();
        let opts = ExtractOptions::default();
        let out = reg.extract_declared(&FieldType::Txt, b"hello world", &opts).unwrap();
        assert_eq!(out.unwrap().text, "hello world");
        let out = reg.extract_declared(&FieldType::Csv, b"a,b\n1,2", &opts).unwrap();
        assert_eq!(out.unwrap().text, "a,b\n1,2");
    }

    #[test]
    fn declared_json_is_compact_sniffed_json_is_pretty() {
        let reg = registry();
        let opts = ExtractOptions::default();
        let declared = reg
            .extract_declared(&FieldType::Json, br#"{ "a" : 1 }"#, &opts)
            .unwrap()
            .unwrap();
        assert_eq!(declared.text, r#"{"a":1}"#);

        let content = ClassifiedContent {
            content_type: ContentType::Json,
            bytes: br#"{"a":1}"#.to_vec(),
        };
        let sniffed = reg.extract_sniffed(&content, &opts).unwrap().unwrap();
        assert_eq!(sniffed.text, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = registry()
            .extract_declared(&FieldType::Json, b"{nope", &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(err, ExtractError::Json(_)));
    }

    #[test]
    fn xml_projection_through_registry() {
        let opts = ExtractOptions {
            paths: vec!["note.to".into(), "note.cc".into(), "note.body".into()],
        };
        let out = registry()
            .extract_declared(
                &FieldType::Xml,
                b"<note><to>Tove</to><body>Don't forget me</body></note>",
                &opts,
            )
            .unwrap()
            .unwrap();
        assert_eq!(out.text, "Tove Don't forget me");
        assert!(out.tree.is_some());
    }

    #[test]
    fn html_body_text_only() {
        let text = extract_html_body(
            "<!DOCTYPE html><html><head><title>Nope</title></head>\
             <body><h1>Hello</h1><p>world</p></body></html>",
        )
        .unwrap();
        assert_eq!(text, "Helloworld");
    }

    #[test]
    fn rtf_is_passed_through() {
        let reg = registry();
        let content = reg.classify(b"{\\rtf1 hi}".to_vec());
        let out = reg
            .extract_sniffed(&content, &ExtractOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(out.text, "{\\rtf1 hi}");
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_pdf(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = registry()
            .extract_declared(&FieldType::Docx, b"not a zip", &ExtractOptions::default())
            .unwrap_err();
        assert!(matches!(err, ExtractError::Ooxml(_)));
    }

    #[test]
    fn docx_paragraphs_and_runs() {
        let xml = r#"<?xml version="1.0"?><w:document xmlns:w="w"><w:body>
            <w:p><w:r><w:t>Hello</w:t></w:r><w:r><w:t xml:space="preserve"> world</w:t></w:r></w:p>
            <w:p><w:r><w:t>Second &amp; last</w:t></w:r></w:p>
            </w:body></w:document>"#;
        let docx = zip_of(&[("word/document.xml", xml)]);
        assert_eq!(extract_docx(&docx).unwrap(), "Hello world\nSecond & last");
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let slide = |t: &str| format!("<p:sld xmlns:a=\"a\" xmlns:p=\"p\"><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:sld>", t);
        let s1 = slide("first");
        let s2 = slide("second");
        let s10 = slide("tenth");
        let pptx = zip_of(&[
            ("ppt/slides/slide10.xml", &s10),
            ("ppt/slides/slide2.xml", &s2),
            ("ppt/slides/slide1.xml", &s1),
        ]);
        assert_eq!(extract_pptx(&pptx).unwrap(), "first\nsecond\ntenth");
    }

    #[test]
    fn xlsx_first_sheet_as_csv() {
        let shared = r#"<sst><si><t>Name</t></si><si><r><t>Ada </t></r><r><t>Lovelace</t></r></si><si><t>a,b</t></si></sst>"#;
        let sheet1 = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>Age</t></is></c></row>
            <row r="2"><c r="A2" t="s"><v>1</v></c><c r="C2"><v>36</v></c></row>
            <row r="3"><c r="A3" t="s"><v>2</v></c><c r="B3" t="b"><v>1</v></c></row>
            </sheetData></worksheet>"#;
        let sheet2 = r#"<worksheet><sheetData><row><c t="inlineStr"><is><t>ignored</t></is></c></row></sheetData></worksheet>"#;
        let xlsx = zip_of(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet2.xml", sheet2),
            ("xl/worksheets/sheet1.xml", sheet1),
        ]);
        assert_eq!(
            extract_xlsx(&xlsx).unwrap(),
            "Name,Age\nAda Lovelace,,36\n\"a,b\",TRUE"
        );
    }

    #[test]
    fn column_references() {
        assert_eq!(column_index(b"A1").unwrap(), Some(0));
        assert_eq!(column_index(b"Z9").unwrap(), Some(25));
        assert_eq!(column_index(b"AA3").unwrap(), Some(26));
        assert_eq!(column_index(b"XFD1").unwrap(), Some(16_383));
        assert_eq!(column_index(b"12").unwrap(), None);
    }

    #[test]
    fn oversized_column_references_are_errors() {
        assert!(matches!(column_index(b"XFE1"), Err(ExtractError::Ooxml(_))));
        assert!(matches!(
            column_index(b"ZZZZZZZZZZZZZZ1"),
            Err(ExtractError::Ooxml(_))
        ));

        let sheet = r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZ1"><v>7</v></c></row></sheetData></worksheet>"#;
        let xlsx = zip_of(&[("xl/worksheets/sheet1.xml", sheet)]);
        let err = extract_xlsx(&xlsx).unwrap_err();
        assert!(err.to_string().contains("ZZZZZZZZ1"));
    }

    #[test]
    fn custom_pdf_extractor_is_used() {
        let reg = registry().with_pdf(Arc::new(|_: &[u8]| Ok::<_, ExtractError>("from fake".to_string())));
        let content = reg.classify(b"%PDF-1.7 whatever".to_vec());
        let out = reg
            .extract_sniffed(&content, &ExtractOptions::default())
            .unwrap()
            .unwrap();
        assert_eq!(out.text, "from fake");
    }
}
