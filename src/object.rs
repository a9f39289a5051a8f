use std::fmt::Display;

use anyhow::{Result, bail};
use rabex::objects::ClassId;
use rabex::objects::pptr::PathId;
use serde_json::Value;

/// The materialized fields of an object.
pub type FieldTree = Value;

/// The runtime category of an object, as far as font chains care.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    MonoBehaviour,
    MonoScript,
    Material,
    Shader,
    Texture2D,
    Other(String),
}

impl From<ClassId> for TypeTag {
    fn from(class_id: ClassId) -> Self {
        match class_id {
            ClassId::MonoBehaviour => TypeTag::MonoBehaviour,
            ClassId::MonoScript => TypeTag::MonoScript,
            ClassId::Material => TypeTag::Material,
            ClassId::Shader => TypeTag::Shader,
            ClassId::Texture2D => TypeTag::Texture2D,
            other => TypeTag::Other(format!("{other:?}")),
        }
    }
}

impl From<&str> for TypeTag {
    fn from(name: &str) -> Self {
        match name {
            "MonoBehaviour" => TypeTag::MonoBehaviour,
            "MonoScript" => TypeTag::MonoScript,
            "Material" => TypeTag::Material,
            "Shader" => TypeTag::Shader,
            "Texture2D" => TypeTag::Texture2D,
            other => TypeTag::Other(other.to_owned()),
        }
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TypeTag::MonoBehaviour => "MonoBehaviour",
            TypeTag::MonoScript => "MonoScript",
            TypeTag::Material => "Material",
            TypeTag::Shader => "Shader",
            TypeTag::Texture2D => "Texture2D",
            TypeTag::Other(name) => name,
        };
        f.write_str(name)
    }
}

/// An object living in some loaded container.
///
/// Implementations are views; nothing in this crate mutates them.
pub trait SceneObject {
    fn local_id(&self) -> PathId;

    fn type_tag(&self) -> TypeTag;

    /// Reads the object's fields. An error means "no data available" and is never fatal to callers.
    fn field_tree(&self) -> Result<FieldTree>;

    /// Reads `size` bytes at `offset` from a resource file referenced by this object,
    /// e.g. the `.resS` file holding streamed texture data.
    fn read_resource(&self, path: &str, _offset: u64, _size: usize) -> Result<Vec<u8>> {
        bail!(
            "object {} cannot read external resource '{path}'",
            self.local_id()
        )
    }
}

impl<T: SceneObject + ?Sized> SceneObject for &T {
    fn local_id(&self) -> PathId {
        (**self).local_id()
    }

    fn type_tag(&self) -> TypeTag {
        (**self).type_tag()
    }

    fn field_tree(&self) -> Result<FieldTree> {
        (**self).field_tree()
    }

    fn read_resource(&self, path: &str, offset: u64, size: usize) -> Result<Vec<u8>> {
        (**self).read_resource(path, offset, size)
    }
}

/// An owned object with an already known field tree.
#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub path_id: PathId,
    pub type_tag: TypeTag,
    pub fields: Option<FieldTree>,
    pub resources: Vec<(String, Vec<u8>)>,
}

impl MemoryObject {
    pub fn new(path_id: PathId, type_tag: impl Into<TypeTag>, fields: FieldTree) -> Self {
        MemoryObject {
            path_id,
            type_tag: type_tag.into(),
            fields: Some(fields),
            resources: Vec::new(),
        }
    }

    /// An object whose fields cannot be read.
    pub fn unreadable(path_id: PathId, type_tag: impl Into<TypeTag>) -> Self {
        MemoryObject {
            path_id,
            type_tag: type_tag.into(),
            fields: None,
            resources: Vec::new(),
        }
    }

    pub fn with_resource(mut self, path: &str, data: Vec<u8>) -> Self {
        self.resources.push((path.to_owned(), data));
        self
    }
}

impl SceneObject for MemoryObject {
    fn local_id(&self) -> PathId {
        self.path_id
    }

    fn type_tag(&self) -> TypeTag {
        self.type_tag.clone()
    }

    fn field_tree(&self) -> Result<FieldTree> {
        match &self.fields {
            Some(fields) => Ok(fields.clone()),
            None => bail!("no typetree available for object {}", self.path_id),
        }
    }

    fn read_resource(&self, path: &str, offset: u64, size: usize) -> Result<Vec<u8>> {
        let Some((_, data)) = self.resources.iter().find(|(name, _)| name == path) else {
            bail!("resource '{path}' does not exist");
        };
        let start = usize::try_from(offset)?;
        let range = start.checked_add(size).map(|end| start..end);
        match range.and_then(|range| data.get(range)) {
            Some(slice) => Ok(slice.to_vec()),
            None => bail!(
                "resource '{path}' is {} bytes, cannot read {size} bytes at {offset}",
                data.len()
            ),
        }
    }
}
