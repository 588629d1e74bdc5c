use crate::error::IngestError;
use crate::traits::TextExtractor;
use lopdf::Document;
use std::fs;
use std::path::Path;

pub const PDF_EXTENSIONS: [&str; 1] = ["pdf"];
pub const PLAIN_TEXT_EXTENSIONS: [&str; 2] = ["txt", "md"];

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<String, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for page_no in document.get_pages().into_keys() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(text.trim().to_string());
            }
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(pages.join("\n"))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, IngestError> {
        Ok(fs::read_to_string(path)?)
    }
}

/// Picks an extractor from the file extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTextExtractor {
    pdf: LopdfExtractor,
    plain: PlainTextExtractor,
}

impl FileTextExtractor {
    pub fn supports(path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| {
            PDF_EXTENSIONS.contains(&ext.as_str()) || PLAIN_TEXT_EXTENSIONS.contains(&ext.as_str())
        })
    }
}

impl TextExtractor for FileTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, IngestError> {
        match extension_of(path) {
            Some(ext) if PDF_EXTENSIONS.contains(&ext.as_str()) => self.pdf.extract(path),
            Some(ext) if PLAIN_TEXT_EXTENSIONS.contains(&ext.as_str()) => self.plain.extract(path),
            _ => Err(IngestError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
