use std::io::{Cursor, Read as _, Seek as _, SeekFrom};
use std::path::Path;

use anyhow::{Context as _, Result};
use rabex::files::SerializedFile;
use rabex::files::serializedfile::ObjectRef;
use rabex::objects::ClassId;
use rabex::objects::pptr::PathId;
use rabex::tpk::TpkTypeTreeBlob;
use rabex::typetree::TypeTreeProvider;
use rabex::typetree::typetree_cache::sync::TypeTreeCache;
use serde::Deserialize;
use serde_json::Value;

use crate::container_files::ContainerFiles;
use crate::env::{Environment, LoadedFile};
use crate::object::{FieldTree, SceneObject, TypeTag};
use crate::resolver::EnvResolver;

pub struct SerializedFileHandle<'a, R = ContainerFiles, P = TypeTreeCache<TpkTypeTreeBlob>> {
    pub file: &'a SerializedFile,
    pub data: &'a [u8],
    pub path: &'a Path,
    pub env: &'a Environment<R, P>,
}
pub struct ObjectRefHandle<'a, T, R = ContainerFiles, P = TypeTreeCache<TpkTypeTreeBlob>> {
    pub object: ObjectRef<'a, T>,
    pub file: SerializedFileHandle<'a, R, P>,
}

impl<'a, T, R, P> std::fmt::Debug for ObjectRefHandle<'a, T, R, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectRefHandle")
            .field("object", &self.object.info)
            .field("file", &self.file.path)
            .finish()
    }
}

impl<'a, R, P> SerializedFileHandle<'a, R, P> {
    pub fn reborrow(&self) -> SerializedFileHandle<'a, R, P> {
        SerializedFileHandle {
            file: self.file,
            data: self.data,
            path: self.path,
            env: self.env,
        }
    }

    pub(crate) fn new(env: &'a Environment<R, P>, loaded: &'a LoadedFile) -> Self {
        SerializedFileHandle {
            file: &loaded.file,
            data: loaded.data.as_ref(),
            path: &loaded.path,
            env,
        }
    }

    pub fn reader(&self) -> Cursor<&'a [u8]> {
        Cursor::new(self.data)
    }
}

impl<'a, R: EnvResolver, P: TypeTreeProvider> SerializedFileHandle<'a, R, P> {
    pub fn objects<T>(&self) -> impl ExactSizeIterator<Item = ObjectRefHandle<'a, T, R, P>> {
        self.file.objects().map(|o| {
            let tt = self.file.get_typetree_for(o, &self.env.tpk);
            ObjectRefHandle::new(ObjectRef::new(self.file, o, tt), self.reborrow())
        })
    }

    /// Reads `size` bytes at `offset` from a resource file stored next to this file.
    ///
    /// `path` is the path as stored in the object, e.g. `archive:/CAB-.../CAB-....resS`
    /// or `sharedassets0.assets.resS`. Only its file name is used.
    pub fn read_resource(&self, path: &str, offset: u64, size: usize) -> Result<Vec<u8>> {
        let file_name = Path::new(path)
            .file_name()
            .with_context(|| format!("invalid resource path '{path}'"))?;
        let resource_path = self.path.parent().unwrap_or(Path::new("")).join(file_name);

        let mut file = std::fs::File::open(&resource_path)
            .with_context(|| format!("Cannot open resource '{}'", resource_path.display()))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0; size];
        file.read_exact(&mut data).with_context(|| {
            format!(
                "'{}' is too short for {size} bytes at {offset}",
                resource_path.display()
            )
        })?;
        Ok(data)
    }
}

impl<'a, T, R: EnvResolver, P: TypeTreeProvider> ObjectRefHandle<'a, T, R, P> {
    pub fn new(object: ObjectRef<'a, T>, file: SerializedFileHandle<'a, R, P>) -> Self {
        ObjectRefHandle { object, file }
    }

    pub fn read(&self) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let data = self.object.read(&mut self.file.reader())?;
        Ok(data)
    }
}

impl<'a, T, R, P> ObjectRefHandle<'a, T, R, P> {
    pub fn path_id(&self) -> PathId {
        self.object.info.m_PathID
    }

    pub fn class_id(&self) -> ClassId {
        self.object.info.m_ClassID
    }
}

impl<'a, R: EnvResolver, P: TypeTreeProvider> SceneObject for ObjectRefHandle<'a, Value, R, P> {
    fn local_id(&self) -> PathId {
        self.path_id()
    }

    fn type_tag(&self) -> TypeTag {
        self.class_id().into()
    }

    fn field_tree(&self) -> Result<FieldTree> {
        self.read().with_context(|| {
            format!(
                "could not read {:?} {} in '{}'",
                self.class_id(),
                self.path_id(),
                self.file.path.display()
            )
        })
    }

    fn read_resource(&self, path: &str, offset: u64, size: usize) -> Result<Vec<u8>> {
        self.file.read_resource(path, offset, size)
    }
}
