use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, ensure};
use memmap2::Mmap;
use walkdir::WalkDir;

use crate::env::Data;
use crate::resolver::{self, EnvResolver};

/// The asset file to analyze, plus the dependency files loaded next to it.
#[derive(Debug, Clone)]
pub struct ContainerFiles {
    pub primary: PathBuf,
    /// Only files that exist. Missing dependencies are skipped when constructing.
    pub dependencies: Vec<PathBuf>,
}

impl ContainerFiles {
    pub fn new(
        primary: impl Into<PathBuf>,
        dependencies: impl IntoIterator<Item = PathBuf>,
    ) -> Result<ContainerFiles> {
        let primary = primary.into();
        ensure!(
            primary.is_file(),
            "Asset file '{}' does not exist",
            primary.display()
        );

        let mut files = ContainerFiles {
            primary,
            dependencies: Vec::new(),
        };
        for dependency in dependencies {
            files.add_dependency(dependency);
        }
        Ok(files)
    }

    fn add_dependency(&mut self, dependency: PathBuf) {
        if !dependency.is_file() {
            tracing::debug!("Skipping missing dependency '{}'", dependency.display());
            return;
        }
        if dependency == self.primary || self.dependencies.contains(&dependency) {
            return;
        }
        self.dependencies.push(dependency);
    }

    /// Adds every serialized file directly inside `dir`, sorted by name.
    pub fn with_dependency_dir(mut self, dir: &Path) -> Result<ContainerFiles> {
        ensure!(
            dir.is_dir(),
            "Dependency directory '{}' does not exist",
            dir.display()
        );

        for entry in WalkDir::new(dir).max_depth(1).sort_by_file_name() {
            let entry = entry
                .with_context(|| format!("Could not list '{}'", dir.display()))?;
            if entry.file_type().is_dir() || !resolver::is_serialized_file(entry.path()) {
                continue;
            }
            self.add_dependency(entry.into_path());
        }
        Ok(self)
    }
}

impl EnvResolver for ContainerFiles {
    fn read_path(&self, path: &Path) -> Result<Data, std::io::Error> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Data(mmap))
    }

    fn container_paths(&self) -> Vec<PathBuf> {
        std::iter::once(&self.primary)
            .chain(&self.dependencies)
            .cloned()
            .collect()
    }
}
