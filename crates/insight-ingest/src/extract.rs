//! Raw bytes to text, dispatched on the file extension.

use lopdf::Document;
use tracing::{debug, warn};

/// Why a file could not be turned into text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    /// The extension (lower-cased, without the dot; possibly empty) has no extractor.
    #[error("unsupported file type: .{0}")]
    UnsupportedFormat(String),

    #[error("corrupt input: {0}")]
    CorruptInput(String),
}

/// File types with a text extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    PlainText,
    Pdf,
}

impl FileType {
    /// Detect file type from the extension of `file_name`, case-insensitively.
    pub fn from_file_name(file_name: &str) -> Result<Self, ExtractError> {
        match extension_of(file_name).as_str() {
            "txt" => Ok(Self::PlainText),
            "pdf" => Ok(Self::Pdf),
            other => Err(ExtractError::UnsupportedFormat(other.to_string())),
        }
    }

    /// MIME type recorded with the stored blob.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::PlainText => "text/plain; charset=utf-8",
            Self::Pdf => "application/pdf",
        }
    }
}

/// Lower-cased extension of the last path component, without the dot.
fn extension_of(file_name: &str) -> String {
    let base = base_file_name(file_name);
    match base.rfind('.') {
        Some(idx) if idx > 0 => base[idx + 1..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Final path component of a client-supplied file name. Both `/` and `\`
/// count as separators.
pub fn base_file_name(file_name: &str) -> &str {
    file_name.rsplit(['/', '\\']).next().unwrap_or(file_name)
}

/// Extract text from `bytes`, choosing the strategy by `file_name`'s extension.
pub fn extract_text(bytes: &[u8], file_name: &str) -> Result<String, ExtractError> {
    match FileType::from_file_name(file_name)? {
        FileType::PlainText => Ok(decode_text(bytes)),
        FileType::Pdf => extract_pdf_text(bytes),
    }
}

fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            debug!("Text upload is not valid UTF-8 ({}), decoding lossily", e);
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Extract text page by page. A page that fails is skipped; a document that
/// cannot be parsed, or whose catalog has no page tree, is `CorruptInput`.
/// A page tree with no pages yields empty text.
fn extract_pdf_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = Document::load_mem(bytes).map_err(|e| {
        warn!("Failed to parse PDF: {}", e);
        ExtractError::CorruptInput(e.to_string())
    })?;

    let pages = doc.get_pages();
    if pages.is_empty() {
        doc.catalog()
            .and_then(|catalog| catalog.get(b"Pages"))
            .map_err(|e| {
                warn!("PDF has no page tree: {}", e);
                ExtractError::CorruptInput(format!("missing page tree: {}", e))
            })?;
        debug!("PDF has no pages");
        return Ok(String::new());
    }

    let mut text = String::new();
    for page_number in pages.keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push_str("\n\n");
            }
            Err(e) => {
                warn!("Skipping PDF page {}: {}", page_number, e);
            }
        }
    }

    debug!("Extracted {} chars from {} PDF pages", text.chars().count(), pages.len());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn pdf_with_pages(texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => texts.len() as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_file_type_detection() {
        assert_eq!(FileType::from_file_name("notes.txt").unwrap(), FileType::PlainText);
        assert_eq!(FileType::from_file_name("Report.PDF").unwrap(), FileType::Pdf);
        assert_eq!(
            FileType::from_file_name("image.png").unwrap_err(),
            ExtractError::UnsupportedFormat("png".into())
        );
        assert_eq!(
            FileType::from_file_name("README").unwrap_err(),
            ExtractError::UnsupportedFormat(String::new())
        );
        assert!(FileType::from_file_name("dir.txt/archive").is_err());
    }

    #[test]
    fn test_base_file_name() {
        assert_eq!(base_file_name("report.pdf"), "report.pdf");
        assert_eq!(base_file_name("a/b/report.pdf"), "report.pdf");
        assert_eq!(base_file_name(r"C:\docs\report.pdf"), "report.pdf");
    }

    #[test]
    fn test_plain_text_is_identity() {
        let text = "Quarterly revenue grew 12%.\nMargins held.";
        assert_eq!(extract_text(text.as_bytes(), "q3.txt").unwrap(), text);
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let text = extract_text(&[b'o', b'k', 0xff], "bad.txt").unwrap();
        assert_eq!(text, "ok\u{FFFD}");
    }

    #[test]
    fn test_unsupported_extension() {
        let err = extract_text(b"PK\x03\x04", "slides.docx").unwrap_err();
        assert_eq!(err, ExtractError::UnsupportedFormat("docx".into()));
    }

    #[test]
    fn test_corrupt_pdf() {
        let err = extract_text(b"definitely not a pdf", "broken.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::CorruptInput(_)));
    }

    #[test]
    fn test_pdf_without_pages_is_empty_text() {
        let bytes = pdf_with_pages(&[]);
        assert_eq!(extract_text(&bytes, "blank.pdf").unwrap(), "");
    }

    #[test]
    fn test_pdf_without_page_tree_is_corrupt() {
        let mut doc = Document::with_version("1.5");
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog" });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let err = extract_text(&bytes, "no-tree.pdf").unwrap_err();
        assert!(matches!(err, ExtractError::CorruptInput(_)));
    }

    #[test]
    fn test_pdf_pages_joined_with_blank_line() {
        let bytes = pdf_with_pages(&["Alpha", "Omega"]);
        let text = extract_text(&bytes, "two-pages.pdf").unwrap();

        let alpha = text.find("Alpha").expect("first page text");
        let omega = text.find("Omega").expect("second page text");
        assert!(alpha < omega);
        assert!(text[alpha..omega].contains("\n\n"));
        assert!(text.ends_with("\n\n"));
    }
}
