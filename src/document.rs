//! Document loading: raw upload bytes into ordered per-page text.

use crate::error::DocumentError;
use crate::schema::Page;
use tracing::{info, warn};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Turn an uploaded file into pages.
///
/// PDFs are read with lopdf; anything else is treated as UTF-8 text where a
/// form feed separates pages.
pub fn load_document(data: &[u8]) -> Result<Vec<Page>, DocumentError> {
    let pages = if data.starts_with(PDF_MAGIC) {
        load_pdf(data)?
    } else {
        load_text(data)
    };

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(DocumentError::NoText);
    }

    Ok(pages)
}

fn load_pdf(data: &[u8]) -> Result<Vec<Page>, DocumentError> {
    use lopdf::Document;

    let doc = Document::load_mem(data).map_err(|e| DocumentError::Corrupt(e.to_string()))?;

    if doc.is_encrypted() {
        return Err(DocumentError::Encrypted);
    }

    let page_map = doc.get_pages();
    info!("Processing {} pages from PDF", page_map.len());

    let mut pages = Vec::with_capacity(page_map.len());
    for (page_num, _) in page_map {
        match doc.extract_text(&[page_num]) {
            Ok(text) => pages.push(Page::new(page_num, normalize_line_endings(&text))),
            Err(e) => {
                warn!("Could not extract text from page {}: {}", page_num, e);
                pages.push(Page::new(page_num, String::new()));
            }
        }
    }

    Ok(pages)
}

fn load_text(data: &[u8]) -> Vec<Page> {
    let text = normalize_line_endings(&String::from_utf8_lossy(data));
    text.split('\u{c}')
        .enumerate()
        .map(|(i, chunk)| Page::new(i as u32 + 1, chunk))
        .collect()
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
