//! Embeds a cropped source page as a reusable form XObject.
//!
//! The form's BBox clips to the crop rectangle, so drawing the same XObject in
//! every slot costs one copy of the source content per page, not one per slot.

use super::importer::ObjectImporter;
use crate::LayoutError;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

/// Follows at most one level of indirection.
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, LayoutError> {
    match object {
        Object::Reference(id) => Ok(doc.get_object(*id)?),
        other => Ok(other),
    }
}

fn as_f64(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(v) => Some(*v as f64),
        Object::Real(v) => Some(*v as f64),
        _ => None,
    }
}

/// Walks the page's Parent chain for an inheritable attribute.
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

fn page_object_id(doc: &Document, page_index: u32) -> Result<ObjectId, LayoutError> {
    let pages = doc.get_pages();
    let count = pages.len();
    pages
        .get(&(page_index + 1))
        .copied()
        .ok_or(LayoutError::PageOutOfRange { page: page_index, pages: count })
}

pub fn page_count(doc: &Document) -> usize {
    doc.get_pages().len()
}

/// The media box of one page as `(x, y, width, height)` in source points.
pub fn page_box(doc: &Document, page_index: u32) -> Result<(f64, f64, f64, f64), LayoutError> {
    let page_id = page_object_id(doc, page_index)?;
    let media_box = inherited(doc, page_id, b"MediaBox")
        .ok_or_else(|| LayoutError::SvgPath("page has no MediaBox".to_string()))?;
    let media_box = resolve(doc, media_box)?;
    let values: Vec<f64> = media_box
        .as_array()
        .map_err(LayoutError::from)?
        .iter()
        .filter_map(as_f64)
        .collect();
    match values.as_slice() {
        [x1, y1, x2, y2] => Ok((*x1, *y1, x2 - x1, y2 - y1)),
        _ => Err(LayoutError::SvgPath("malformed MediaBox".to_string())),
    }
}

/// Copies one source page into `target` as a form XObject clipped to `bbox`
/// (`[left, bottom, right, top]` in the source page's coordinate space).
/// Returns the XObject's id in `target`.
pub fn embed_page_as_form(
    target: &mut Document,
    source: &Document,
    page_index: u32,
    bbox: [f64; 4],
) -> Result<ObjectId, LayoutError> {
    let page_id = page_object_id(source, page_index)?;
    let content = source.get_page_content(page_id)?;

    let mut importer = ObjectImporter::new(source);
    let resources = match inherited(source, page_id, b"Resources") {
        Some(object) => {
            let object = object.clone();
            importer.import(target, &object)?
        }
        None => Object::Dictionary(lopdf::Dictionary::new()),
    };

    let form_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "FormType" => 1,
        "BBox" => bbox.iter().map(|v| (*v as f32).into()).collect::<Vec<Object>>(),
        "Resources" => resources,
    };
    Ok(target.add_object(Object::Stream(Stream::new(form_dict, content))))
}
