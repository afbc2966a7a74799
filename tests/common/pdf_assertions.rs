//! Text-level assertions over produced PDF bytes.

use lopdf::Document;

/// Extracts the text of every page, one string per page.
pub fn page_texts(pdf_bytes: &[u8]) -> Vec<String> {
    let doc = Document::load_mem(pdf_bytes).unwrap_or_else(|e| panic!("output not a PDF: {e}"));
    let pages = doc.get_pages();
    (1..=pages.len() as u32)
        .map(|page| doc.extract_text(&[page]).unwrap_or_default())
        .collect()
}

pub fn page_count(pdf_bytes: &[u8]) -> usize {
    Document::load_mem(pdf_bytes)
        .unwrap_or_else(|e| panic!("output not a PDF: {e}"))
        .get_pages()
        .len()
}

pub fn assert_page_contains(pdf_bytes: &[u8], page_index: usize, needle: &str) {
    let texts = page_texts(pdf_bytes);
    let text = texts
        .get(page_index)
        .unwrap_or_else(|| panic!("page {page_index} missing; document has {}", texts.len()));
    assert!(
        text.contains(needle),
        "page {page_index} does not contain {needle:?}: {text:?}"
    );
}
