//! Content-type classification from raw bytes.
//!
//! Column values declared as `BLOB` carry no usable metadata, so their type
//! is inferred in a fixed order:
//!
//! 1. empty buffer → `application/octet-stream`;
//! 2. signature sniffing (magic numbers, ZIP entry names);
//! 3. HTML prologue (`<!DOCTYPE html`, `<html`) on the decoded text;
//! 4. printable-ASCII text → `text/plain`, only if sniffing was inconclusive;
//! 5. whatever the sniffer produced, else `application/octet-stream`.
//!
//! Text heuristics run after sniffing so that, e.g., a PDF whose body holds
//! long ASCII runs is still a PDF.

use crate::models::ContentType;

/// A capability that recognizes binary formats by their signature.
///
/// Returns `None` when nothing matched.
pub trait SignatureSniffer: Send + Sync {
    fn sniff(&self, bytes: &[u8]) -> Option<ContentType>;
}

/// Built-in magic-number sniffer.
///
/// | Signature | Type |
/// |-----------|------|
/// | `%PDF-` | `application/pdf` |
/// | `PK\x03\x04` + `word/` entry | DOCX |
/// | `PK\x03\x04` + `xl/` entry | XLSX |
/// | `PK\x03\x04` + `ppt/` entry | PPTX |
/// | `PK\x03\x04` otherwise | `application/zip` |
/// | `D0 CF 11 E0 A1 B1 1A E1` | `application/x-cfb` |
/// | `{\rtf` | `application/rtf` |
/// | `<?xml` | `application/xml` |
/// | PNG / JPEG / GIF / GZIP magic | image and archive types |
#[derive(Debug, Default, Clone, Copy)]
pub struct MagicSniffer;

const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const CFB_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

impl SignatureSniffer for MagicSniffer {
    fn sniff(&self, bytes: &[u8]) -> Option<ContentType> {
        if bytes.starts_with(b"%PDF-") {
            return Some(ContentType::Pdf);
        }
        if bytes.starts_with(ZIP_LOCAL_HEADER) {
            return Some(sniff_zip_container(bytes));
        }
        if bytes.starts_with(b"PK\x05\x06") {
            return Some(ContentType::Zip);
        }
        if bytes.starts_with(CFB_MAGIC) {
            return Some(ContentType::Cfb);
        }
        if bytes.starts_with(b"{\\rtf") {
            return Some(ContentType::Rtf);
        }
        if bytes.starts_with(PNG_MAGIC) {
            return Some(ContentType::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ContentType::Jpeg);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(ContentType::Gif);
        }
        if bytes.starts_with(&[0x1F, 0x8B]) {
            return Some(ContentType::Gzip);
        }
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        if body.starts_with(b"<?xml ") || body.starts_with(b"<?xml\n") {
            return Some(ContentType::Xml);
        }
        None
    }
}

/// Refine a ZIP archive into an OOXML type by walking local file headers.
///
/// Reads entry names straight from the headers, so truncated archives and
/// trailing bytes after the archive do not matter.
fn sniff_zip_container(bytes: &[u8]) -> ContentType {
    let mut pos = 0;
    while let Some(offset) = find(&bytes[pos..], ZIP_LOCAL_HEADER) {
        let header = pos + offset;
        pos = header + ZIP_LOCAL_HEADER.len();
        if header + 30 > bytes.len() {
            break;
        }
        let name_len = u16::from_le_bytes([bytes[header + 26], bytes[header + 27]]) as usize;
        let name_start = header + 30;
        let Some(name) = bytes.get(name_start..name_start + name_len) else {
            break;
        };
        if name.starts_with(b"word/") {
            return ContentType::Docx;
        }
        if name.starts_with(b"xl/") {
            return ContentType::Xlsx;
        }
        if name.starts_with(b"ppt/") {
            return ContentType::Pptx;
        }
    }
    ContentType::Zip
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Classifier over a pluggable [`SignatureSniffer`].
#[derive(Debug, Default, Clone)]
pub struct Classifier<S = MagicSniffer> {
    sniffer: S,
}

impl<S: SignatureSniffer> Classifier<S> {
    pub fn with_sniffer(sniffer: S) -> Self {
        Self { sniffer }
    }

    /// Assign a content type to `bytes`. Never fails.
    pub fn classify(&self, bytes: &[u8]) -> ContentType {
        if bytes.is_empty() {
            return ContentType::OctetStream;
        }

        let sniffed = self.sniffer.sniff(bytes);
        if let Some(ct) = &sniffed {
            if *ct != ContentType::OctetStream {
                return ct.clone();
            }
        }

        let text = String::from_utf8_lossy(bytes);
        let trimmed = text.trim();

        if looks_like_html(trimmed) {
            return ContentType::Html;
        }
        if is_printable_ascii(trimmed) {
            return ContentType::PlainText;
        }

        sniffed.unwrap_or(ContentType::OctetStream)
    }
}

/// Classify with the built-in sniffer.
pub fn classify(bytes: &[u8]) -> ContentType {
    Classifier::<MagicSniffer>::default().classify(bytes)
}

/// `<html` or `<!DOCTYPE html`, case-insensitive.
fn looks_like_html(text: &str) -> bool {
    let head: String = text
        .chars()
        .take(64)
        .collect::<String>()
        .to_ascii_lowercase();
    if head.starts_with("<html") {
        return true;
    }
    match head.strip_prefix("<!doctype") {
        Some(rest) => {
            rest.starts_with(char::is_whitespace) && rest.trim_start().starts_with("html")
        }
        None => false,
    }
}

fn is_printable_ascii(text: &str) -> bool {
    text.bytes()
        .all(|b| (0x20..=0x7E).contains(&b) || matches!(b, b'\t' | b'\r' | b'\n'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip_with_entry(name: &str) -> Vec<u8> {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("[Content_Types].xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<Types/>").unwrap();
            zip.start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn empty_is_octet_stream() {
        assert_eq!(classify(b""), ContentType::OctetStream);
    }

    #[test]
    fn pdf_signature_wins_over_ascii_body() {
        let mut bytes = b"%PDF-1.4\nplain ascii body that looks like text".to_vec();
        bytes.extend_from_slice(&[0x00, 0xFF, 0x13, 0x37]);
        assert_eq!(classify(&bytes), ContentType::Pdf);
    }

    #[test]
    fn ooxml_containers_are_refined() {
        assert_eq!(classify(&zip_with_entry("word/document.xml")), ContentType::Docx);
        assert_eq!(classify(&zip_with_entry("xl/workbook.xml")), ContentType::Xlsx);
        assert_eq!(classify(&zip_with_entry("ppt/slides/slide1.xml")), ContentType::Pptx);
        assert_eq!(classify(&zip_with_entry("readme.txt")), ContentType::Zip);
    }

    #[test]
    fn ooxml_with_trailing_garbage() {
        let mut bytes = zip_with_entry("word/document.xml");
        bytes.extend_from_slice(&[0xAB; 300]);
        assert_eq!(classify(&bytes), ContentType::Docx);
    }

    #[test]
    fn legacy_office_is_cfb() {
        let mut bytes = CFB_MAGIC.to_vec();
        bytes.extend_from_slice(&[0u8; 504]);
        assert_eq!(classify(&bytes), ContentType::Cfb);
    }

    #[test]
    fn html_with_leading_whitespace() {
        assert_eq!(
            classify(b"\n   \t<!DOCTYPE html><html><body>hi</body></html>"),
            ContentType::Html
        );
        assert_eq!(classify(b"<HTML><BODY>x</BODY></HTML>"), ContentType::Html);
    }

    #[test]
    fn printable_ascii_is_plain_text() {
        assert_eq!(classify(b"hello world\r\n\tsecond line"), ContentType::PlainText);
    }

    #[test]
    fn non_ascii_text_without_signature_is_octet_stream() {
        assert_eq!(classify("héllo".as_bytes()), ContentType::OctetStream);
        assert_eq!(classify(&[0x00, 0x01, 0x02, 0xFE]), ContentType::OctetStream);
    }

    #[test]
    fn xml_and_rtf_signatures() {
        assert_eq!(classify(b"<?xml version=\"1.0\"?><a/>"), ContentType::Xml);
        assert_eq!(classify(b"{\\rtf1\\ansi hello}"), ContentType::Rtf);
    }

    struct GenericSniffer;

    impl SignatureSniffer for GenericSniffer {
        fn sniff(&self, _bytes: &[u8]) -> Option<ContentType> {
            Some(ContentType::OctetStream)
        }
    }

    #[test]
    fn generic_sniff_result_falls_through_to_text_heuristics() {
        let classifier = Classifier::with_sniffer(GenericSniffer);
        assert_eq!(classifier.classify(b"just text"), ContentType::PlainText);
        assert_eq!(classifier.classify(&[0xFF, 0x00]), ContentType::OctetStream);
    }
}
