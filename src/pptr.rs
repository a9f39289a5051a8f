use std::fmt::Display;

use rabex::objects::pptr::PathId;
use rabex::objects::{PPtr, TypedPPtr};
use serde_derive::Serialize;
use serde_json::Value;

/// A normalized object pointer.
///
/// `path_id == 0` means the reference is absent. Pointers show up either as
/// raw field-tree mappings (`{"m_FileID": 0, "m_PathID": 42}`) or as
/// [`PPtr`]s read through `rabex`; both end up here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ObjRef {
    pub file_id: i32,
    pub path_id: PathId,
}

impl ObjRef {
    pub const NULL: ObjRef = ObjRef {
        file_id: 0,
        path_id: 0,
    };

    pub fn new(file_id: i32, path_id: PathId) -> Self {
        ObjRef { file_id, path_id }
    }

    pub fn local(path_id: PathId) -> Self {
        ObjRef::new(0, path_id)
    }

    pub fn is_null(&self) -> bool {
        self.path_id == 0
    }

    pub fn optional(self) -> Option<ObjRef> {
        (!self.is_null()).then_some(self)
    }

    /// Normalizes a field-tree pointer.
    /// Anything that doesn't look like a pointer with integer ids becomes [`ObjRef::NULL`].
    pub fn from_value(value: &Value) -> ObjRef {
        let Some(map) = value.as_object() else {
            return ObjRef::NULL;
        };

        let file_id = map.get("m_FileID").or_else(|| map.get("file_id"));
        let path_id = map.get("m_PathID").or_else(|| map.get("path_id"));
        let (Some(file_id), Some(path_id)) = (file_id, path_id) else {
            return ObjRef::NULL;
        };

        let file_id = file_id.as_i64().and_then(|id| i32::try_from(id).ok());
        match (file_id, path_id.as_i64()) {
            (Some(file_id), Some(path_id)) => ObjRef::new(file_id, path_id),
            _ => ObjRef::NULL,
        }
    }

    pub fn from_optional_value(value: Option<&Value>) -> ObjRef {
        value.map_or(ObjRef::NULL, ObjRef::from_value)
    }
}

impl From<PPtr> for ObjRef {
    fn from(pptr: PPtr) -> Self {
        let file_id = match pptr.m_FileID.get_externals_index() {
            None => 0,
            Some(index) => match i32::try_from(index + 1) {
                Ok(file_id) => file_id,
                Err(_) => return ObjRef::NULL,
            },
        };
        ObjRef::new(file_id, pptr.m_PathID)
    }
}

impl<T> From<TypedPPtr<T>> for ObjRef {
    fn from(pptr: TypedPPtr<T>) -> Self {
        ObjRef::from(pptr.untyped())
    }
}

impl Display for ObjRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(file={} pid={})", self.file_id, self.path_id)
    }
}

#[cfg(test)]
mod tests {
    use rabex::objects::pptr::FileId;
    use serde_json::json;

    use super::*;
    use crate::unity::types::MonoScript;

    #[test]
    fn normalizes_unity_style_pointer() {
        let ptr = ObjRef::from_value(&json!({ "m_FileID": 1, "m_PathID": 42 }));
        assert_eq!(ptr, ObjRef::new(1, 42));
    }

    #[test]
    fn normalizes_attribute_style_pointer() {
        let ptr = ObjRef::from_value(&json!({ "file_id": 0, "path_id": -7 }));
        assert_eq!(ptr, ObjRef::local(-7));
        assert!(!ptr.is_null());
    }

    #[test]
    fn malformed_pointers_are_null() {
        for value in [
            json!(null),
            json!(42),
            json!("m_PathID"),
            json!([0, 42]),
            json!({ "m_PathID": 42 }),
            json!({ "m_FileID": 0 }),
            json!({ "m_FileID": 0, "m_PathID": "42" }),
            json!({ "m_FileID": 0, "m_PathID": 4.5 }),
            json!({ "m_FileID": i64::MAX, "m_PathID": 3 }),
        ] {
            assert_eq!(ObjRef::from_value(&value), ObjRef::NULL, "{value}");
        }
        assert_eq!(ObjRef::from_optional_value(None), ObjRef::NULL);
    }

    #[test]
    fn zero_path_id_is_absent() {
        let ptr = ObjRef::from_value(&json!({ "m_FileID": 2, "m_PathID": 0 }));
        assert!(ptr.is_null());
        assert_eq!(ptr.optional(), None);
        assert_eq!(ptr.to_string(), "(file=2 pid=0)");
    }

    #[test]
    fn converts_rabex_pointers() {
        let external = PPtr::new(FileId::from_externals_index(0), 42);
        assert_eq!(ObjRef::from(external), ObjRef::new(1, 42));

        let third = PPtr::new(FileId::from_externals_index(2), -5);
        assert_eq!(ObjRef::from(third), ObjRef::new(3, -5));

        let local = PPtr::new(FileId::from_externals_index(0), 42).make_local();
        assert_eq!(ObjRef::from(local), ObjRef::local(42));

        let null = ObjRef::from(PPtr::new(FileId::from_externals_index(0), 0).make_local());
        assert!(null.is_null());
        assert_eq!(null, ObjRef::NULL);

        let typed = PPtr::new(FileId::from_externals_index(1), 7).typed::<MonoScript>();
        assert_eq!(ObjRef::from(typed), ObjRef::new(2, 7));
    }
}
