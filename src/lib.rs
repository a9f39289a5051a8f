pub mod chain;
pub mod classify;
pub mod container_files;
pub mod dump;
pub mod env;
pub mod fields;
pub mod handle;
pub mod index;
pub mod object;
pub mod patch;
pub mod pptr;
pub mod records;
pub mod report;
pub mod resolver;
pub mod texture;
pub mod unity;

pub use rabex;

pub use container_files::ContainerFiles;
pub use dump::{Analysis, Diagnostics, DumpOptions, dump};
pub use env::Environment;
pub use index::ObjectIndex;
pub use object::{MemoryObject, SceneObject, TypeTag};
pub use pptr::ObjRef;
pub use report::{Report, WriteOptions};
pub use resolver::EnvResolver;
