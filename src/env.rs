use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use elsa::sync::FrozenMap;
use rabex::files::SerializedFile;
use rabex::tpk::TpkTypeTreeBlob;
use rabex::typetree::TypeTreeProvider;
use rabex::typetree::typetree_cache::sync::TypeTreeCache;
use serde_json::Value;

use crate::container_files::ContainerFiles;
use crate::handle::{ObjectRefHandle, SerializedFileHandle};
use crate::index::ObjectIndex;
use crate::resolver::EnvResolver;

/// Memory map of a container file.
pub struct Data(pub memmap2::Mmap);
impl AsRef<[u8]> for Data {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

pub(crate) struct LoadedFile {
    pub file: SerializedFile,
    pub data: Data,
    pub path: PathBuf,
}

pub struct Environment<R = ContainerFiles, P = TypeTreeCache<TpkTypeTreeBlob>> {
    pub containers: R,
    pub tpk: P,
    serialized_files: FrozenMap<PathBuf, Box<LoadedFile>>,
}

impl<R, P> Environment<R, P> {
    pub fn new(containers: R, tpk: P) -> Self {
        Environment {
            containers,
            tpk,
            serialized_files: Default::default(),
        }
    }
}

impl Environment<ContainerFiles> {
    /// Uses the type trees embedded into the binary.
    pub fn open(containers: ContainerFiles) -> Self {
        Environment::new(containers, TypeTreeCache::new(TpkTypeTreeBlob::embedded()))
    }
}

impl<R: EnvResolver, P: TypeTreeProvider> Environment<R, P> {
    pub fn load_leaf(&self, path: impl AsRef<Path>) -> Result<(SerializedFile, Data)> {
        let path = path.as_ref();
        let data = self
            .containers
            .read_path(path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        let file = SerializedFile::from_reader(&mut Cursor::new(data.as_ref()))
            .with_context(|| format!("'{}' is not a serialized file", path.display()))?;
        Ok((file, data))
    }

    pub fn load_cached(&self, path: impl AsRef<Path>) -> Result<SerializedFileHandle<'_, R, P>> {
        let path = path.as_ref();
        Ok(match self.serialized_files.get(path) {
            Some(loaded) => SerializedFileHandle::new(self, loaded),
            None => {
                let (file, data) = self.load_leaf(path)?;
                self.insert_cache(path.to_owned(), file, data)
            }
        })
    }

    pub fn insert_cache(
        &self,
        path: PathBuf,
        file: SerializedFile,
        data: Data,
    ) -> SerializedFileHandle<'_, R, P> {
        let loaded = LoadedFile {
            file,
            data,
            path: path.clone(),
        };
        let loaded = self.serialized_files.insert(path, Box::new(loaded));
        SerializedFileHandle::new(self, loaded)
    }

    /// Loads every container. The primary file has to load, dependencies that
    /// fail to parse are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<SerializedFileHandle<'_, R, P>>> {
        let mut paths = self.containers.container_paths().into_iter();
        let primary = paths.next().context("no asset file to load")?;
        let primary = self.load_cached(&primary)?;
        let unity_version = primary.file.m_UnityVersion.clone();

        let mut files = vec![primary];
        for path in paths {
            if let Some(loaded) = self.serialized_files.get(path.as_path()) {
                files.push(SerializedFileHandle::new(self, loaded));
                continue;
            }
            match self.load_leaf(&path) {
                Ok((mut file, data)) => {
                    if let Some(unity_version) = &unity_version {
                        file.m_UnityVersion.get_or_insert_with(|| unity_version.clone());
                    }
                    files.push(self.insert_cache(path, file, data));
                }
                Err(e) => tracing::warn!("Skipping dependency: {e:#}"),
            }
        }
        Ok(files)
    }

    /// Indexes the objects of every container, in load order.
    pub fn object_index(&self) -> Result<ObjectIndex<ObjectRefHandle<'_, Value, R, P>>> {
        let files = self.load_all()?;
        let index = ObjectIndex::new(files.iter().flat_map(|file| file.objects::<Value>()));
        tracing::info!(
            "Loaded {} objects from {} files",
            index.len(),
            files.len()
        );
        Ok(index)
    }
}
