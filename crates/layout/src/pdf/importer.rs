//! Deep-copies object graphs between lopdf documents.
//!
//! References are remapped to freshly allocated ids in the target document.
//! The visited map is populated before recursion, so reference cycles (page
//! trees, shared resources) terminate.

use crate::LayoutError;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;

pub struct ObjectImporter<'a> {
    source: &'a Document,
    mapped: HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectImporter<'a> {
    pub fn new(source: &'a Document) -> Self {
        Self { source, mapped: HashMap::new() }
    }

    /// Rewrites one object for the target document, importing everything it
    /// references transitively.
    pub fn import(&mut self, target: &mut Document, object: &Object) -> Result<Object, LayoutError> {
        match object {
            Object::Reference(id) => Ok(Object::Reference(self.import_ref(target, *id)?)),
            Object::Dictionary(dict) => Ok(Object::Dictionary(self.import_dict(target, dict)?)),
            Object::Array(items) => {
                let mut imported = Vec::with_capacity(items.len());
                for item in items {
                    imported.push(self.import(target, item)?);
                }
                Ok(Object::Array(imported))
            }
            Object::Stream(stream) => {
                let dict = self.import_dict(target, &stream.dict)?;
                Ok(Object::Stream(Stream::new(dict, stream.content.clone())))
            }
            other => Ok(other.clone()),
        }
    }

    pub fn import_dict(
        &mut self,
        target: &mut Document,
        dict: &Dictionary,
    ) -> Result<Dictionary, LayoutError> {
        let mut imported = Dictionary::new();
        for (key, value) in dict.iter() {
            imported.set(key.clone(), self.import(target, value)?);
        }
        Ok(imported)
    }

    fn import_ref(&mut self, target: &mut Document, id: ObjectId) -> Result<ObjectId, LayoutError> {
        if let Some(mapped) = self.mapped.get(&id) {
            return Ok(*mapped);
        }
        let new_id = target.new_object_id();
        // Registered before recursing so cycles resolve to the reserved id.
        self.mapped.insert(id, new_id);
        let source_object = self.source.get_object(id)?.clone();
        let imported = self.import(target, &source_object)?;
        target.objects.insert(new_id, imported);
        Ok(new_id)
    }
}
