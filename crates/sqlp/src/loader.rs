//! Template document sources.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use crate::error::Result;

/// Resolves a template document name to its source text.
pub trait Loader {
    fn load(&self, name: &str) -> Result<String>;
}

/// Reads documents from the filesystem, optionally relative to a root
/// directory.
#[derive(Clone, Debug, Default)]
pub struct FileLoader {
    root: Option<PathBuf>,
}

impl FileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rooted<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(name),
            None => PathBuf::from(name),
        }
    }
}

impl Loader for FileLoader {
    fn load(&self, name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.path(name))?)
    }
}

/// Serves documents from memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryLoader {
    documents: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.documents.insert(name.into(), source.into());
    }
}

impl Loader for MemoryLoader {
    fn load(&self, name: &str) -> Result<String> {
        self.documents.get(name).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("template document '{name}' not found"),
            )
            .into()
        })
    }
}

impl<F> Loader for F
where
    F: Fn(&str) -> io::Result<String>,
{
    fn load(&self, name: &str) -> Result<String> {
        Ok(self(name)?)
    }
}
