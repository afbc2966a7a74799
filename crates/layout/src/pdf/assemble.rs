//! Ordered merge of rendered single-page PDFs into one artifact.

use super::importer::ObjectImporter;
use crate::LayoutError;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::io::Cursor;

/// Resolves an attribute on the page or its Parent chain.
fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = page_id;
    for _ in 0..32 {
        let dict = doc.get_object(current).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

/// Incremental page-merge builder: append page 0 of each input in order, then
/// serialize once. Inheritable attributes (Resources, MediaBox) are
/// materialized onto every imported page so nothing depends on the source
/// page tree.
pub struct PdfAssembler {
    out: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfAssembler {
    pub fn new() -> Self {
        let mut out = Document::with_version("1.7");
        let pages_id = out.new_object_id();
        Self { out, pages_id, kids: Vec::new() }
    }

    /// Number of pages appended so far.
    pub fn len(&self) -> usize {
        self.kids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kids.is_empty()
    }

    /// Copies page 0 of `bytes` into the output as the next page.
    pub fn append_page(&mut self, bytes: &[u8]) -> Result<(), LayoutError> {
        let index = self.kids.len();
        let source = Document::load_mem(bytes)?;
        let first_page_id = source
            .get_pages()
            .into_iter()
            .next()
            .map(|(_, id)| id)
            .ok_or(LayoutError::MissingPage(index))?;

        let mut importer = ObjectImporter::new(&source);
        let page_dict = source.get_object(first_page_id)?.as_dict()?.clone();

        let mut imported = Dictionary::new();
        for (key, value) in page_dict.iter() {
            if key == b"Parent" {
                continue;
            }
            imported.set(key.clone(), importer.import(&mut self.out, value)?);
        }
        for key in [b"Resources".as_slice(), b"MediaBox".as_slice()] {
            if !imported.has(key) {
                if let Some(value) = inherited(&source, first_page_id, key) {
                    let value = value.clone();
                    imported.set(key, importer.import(&mut self.out, &value)?);
                }
            }
        }
        imported.set("Parent", Object::Reference(self.pages_id));

        let page_id = self.out.add_object(Object::Dictionary(imported));
        self.kids.push(Object::Reference(page_id));
        Ok(())
    }

    /// Serializes the merged document.
    pub fn finish(mut self) -> Result<Vec<u8>, LayoutError> {
        if self.kids.is_empty() {
            return Err(LayoutError::MissingPage(0));
        }
        let count = self.kids.len() as i32;
        self.out.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.out.add_object(Object::Dictionary(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        }));
        self.out.trailer.set("Root", catalog_id);

        let mut cursor = Cursor::new(Vec::new());
        self.out.save_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

impl Default for PdfAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot convenience over [`PdfAssembler`].
pub fn merge_pages<I>(pages: I) -> Result<Vec<u8>, LayoutError>
where
    I: IntoIterator<Item = Vec<u8>>,
{
    let mut assembler = PdfAssembler::new();
    for bytes in pages {
        assembler.append_page(&bytes)?;
    }
    assembler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::composer::test_support::text_page_pdf;

    #[test]
    fn merge_preserves_page_order() {
        let merged = merge_pages(vec![
            text_page_pdf(595.28, 841.89, "PAGE-ONE"),
            text_page_pdf(595.28, 841.89, "PAGE-TWO"),
            text_page_pdf(595.28, 841.89, "PAGE-THREE"),
        ])
        .unwrap();

        assert!(merged.starts_with(b"%PDF-"));
        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
        assert!(doc.extract_text(&[1]).unwrap().contains("PAGE-ONE"));
        assert!(doc.extract_text(&[2]).unwrap().contains("PAGE-TWO"));
        assert!(doc.extract_text(&[3]).unwrap().contains("PAGE-THREE"));
    }

    #[test]
    fn single_page_merge_still_produces_a_document() {
        let merged = merge_pages(vec![text_page_pdf(595.28, 841.89, "ONLY")]).unwrap();
        let doc = Document::load_mem(&merged).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(merge_pages(Vec::new()), Err(LayoutError::MissingPage(0))));
    }
}
