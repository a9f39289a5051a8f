use std::collections::hash_map::Entry;

use rabex::objects::pptr::PathId;
use rustc_hash::FxHashMap;

use crate::object::{FieldTree, SceneObject, TypeTag};
use crate::pptr::ObjRef;

/// All loaded objects, addressable by their local id.
///
/// Built once per run and read-only afterwards.
/// Local ids are only unique per container, on collision the first loaded object wins.
pub struct ObjectIndex<O> {
    objects: Vec<O>,
    by_path_id: FxHashMap<PathId, usize>,
}

/// A dereferenced object together with its materialized fields.
#[derive(Debug)]
pub struct Resolved<'a, O> {
    pub object: &'a O,
    pub tree: FieldTree,
}

impl<O> Resolved<'_, O> {
    pub fn name(&self) -> String {
        crate::fields::name_of(&self.tree)
    }
}

impl<O: SceneObject> ObjectIndex<O> {
    pub fn new(objects: impl IntoIterator<Item = O>) -> Self {
        let objects: Vec<O> = objects.into_iter().collect();

        let mut by_path_id = FxHashMap::default();
        by_path_id.reserve(objects.len());
        for (i, object) in objects.iter().enumerate() {
            match by_path_id.entry(object.local_id()) {
                Entry::Vacant(entry) => {
                    entry.insert(i);
                }
                Entry::Occupied(entry) => tracing::debug!(
                    "path id {} is used by more than one container, keeping the first ({})",
                    entry.key(),
                    objects[*entry.get()].type_tag(),
                ),
            }
        }

        ObjectIndex {
            objects,
            by_path_id,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Objects in load order, including ones shadowed by a path id collision.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &O> {
        self.objects.iter()
    }

    pub fn get(&self, path_id: PathId) -> Option<&O> {
        self.by_path_id.get(&path_id).map(|&i| &self.objects[i])
    }

    /// Dereferences a pointer. Null pointers, unknown ids and unreadable objects all yield `None`.
    #[must_use]
    pub fn deref(&self, pptr: ObjRef) -> Option<Resolved<'_, O>> {
        let pptr = pptr.optional()?;
        let Some(object) = self.get(pptr.path_id) else {
            tracing::trace!("{pptr} is not loaded");
            return None;
        };
        match object.field_tree() {
            Ok(tree) => Some(Resolved { object, tree }),
            Err(e) => {
                tracing::trace!("{pptr} could not be read: {e}");
                None
            }
        }
    }

    /// Like [`ObjectIndex::deref`], but only accepts objects of the given type.
    #[must_use]
    pub fn deref_typed(&self, pptr: ObjRef, type_tag: &TypeTag) -> Option<Resolved<'_, O>> {
        let pptr = pptr.optional()?;
        let object = self.get(pptr.path_id)?;
        if object.type_tag() != *type_tag {
            tracing::trace!(
                "{pptr} is a {}, expected {type_tag}",
                object.type_tag()
            );
            return None;
        }
        self.deref(pptr)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::object::MemoryObject;

    fn index() -> ObjectIndex<MemoryObject> {
        ObjectIndex::new([
            MemoryObject::new(0, "Material", json!({ "m_Name": "zero" })),
            MemoryObject::new(42, "Material", json!({ "m_Name": "mat" })),
            MemoryObject::unreadable(43, "Material"),
            MemoryObject::new(42, "Texture2D", json!({ "m_Name": "shadowed" })),
        ])
    }

    #[test]
    fn null_pointer_is_absent() {
        let index = index();
        assert!(index.deref(ObjRef::NULL).is_none());
        assert!(index.deref(ObjRef::new(3, 0)).is_none());
        assert!(index.deref_typed(ObjRef::NULL, &TypeTag::Material).is_none());
    }

    #[test]
    fn first_loaded_object_wins() {
        let index = index();
        assert_eq!(index.len(), 4);
        let resolved = index.deref(ObjRef::local(42)).unwrap();
        assert_eq!(resolved.name(), "mat");
        assert_eq!(resolved.object.type_tag, TypeTag::Material);
    }

    #[test]
    fn misses_degrade_to_absent() {
        let index = index();
        assert!(index.deref(ObjRef::local(7)).is_none());
        assert!(index.deref(ObjRef::local(43)).is_none());
        assert!(index.deref_typed(ObjRef::local(42), &TypeTag::Shader).is_none());
        assert!(index.deref_typed(ObjRef::local(42), &TypeTag::Material).is_some());
    }
}
