use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::env::Data;

/// A trait abstracting where the serialized files are read from.
pub trait EnvResolver {
    fn read_path(&self, path: &Path) -> Result<Data, std::io::Error>;

    /// Files to load into the environment, the primary file first.
    fn container_paths(&self) -> Vec<PathBuf>;
}

impl<T: EnvResolver> EnvResolver for &T {
    fn read_path(&self, path: &Path) -> Result<Data, std::io::Error> {
        (**self).read_path(path)
    }

    fn container_paths(&self) -> Vec<PathBuf> {
        (**self).container_paths()
    }
}

/// `levelN`, `*.assets` and `globalgamemanagers`.
pub fn is_serialized_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    let is_level = name
        .strip_prefix("level")
        .and_then(|x| x.parse::<usize>().ok())
        .is_some();

    is_level || path.extension().is_some_and(|e| e == "assets") || name == "globalgamemanagers"
}
