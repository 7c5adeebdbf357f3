//! Require Loader (C5): the only way a [`crate::context::ProfileContext`]
//! reaches code outside the control file currently being evaluated. A
//! module must be registered (typically from the profile's `libraries/`
//! tree) before it can be `require`d; loading twice is idempotent and
//! returns the same content.

use std::path::PathBuf;

use indexmap::IndexMap;

#[derive(Clone, Debug)]
pub struct Module {
    pub bytes: Vec<u8>,
    pub source_ref: String,
    pub start_line: u32,
    loaded: bool,
}

#[derive(Debug, Default)]
pub struct RequireLoader {
    modules: IndexMap<String, Module>,
}

impl RequireLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        logical_path: impl Into<String>,
        bytes: Vec<u8>,
        source_ref: impl Into<String>,
        start_line: u32,
    ) {
        self.modules.insert(
            logical_path.into(),
            Module {
                bytes,
                source_ref: source_ref.into(),
                start_line,
                loaded: false,
            },
        );
    }

    pub fn exists(&self, logical_path: &str) -> bool {
        self.modules.contains_key(logical_path)
    }

    pub fn is_loaded(&self, logical_path: &str) -> bool {
        self.modules.get(logical_path).map(|m| m.loaded).unwrap_or(false)
    }

    /// Marks the module loaded and returns its contents. Returns `None`
    /// for an unregistered path; loading an already-loaded module is a
    /// no-op that still returns its contents (idempotent).
    pub fn load(&mut self, logical_path: &str) -> Option<&Module> {
        let module = self.modules.get_mut(logical_path)?;
        module.loaded = true;
        Some(&*module)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_module_cannot_be_loaded() {
        let mut loader = RequireLoader::new();
        assert!(loader.load("missing").is_none());
    }

    #[test]
    fn loading_is_idempotent() {
        let mut loader = RequireLoader::new();
        loader.add("helpers", b"module Helpers; end".to_vec(), "libraries/helpers.rb", 1);
        assert!(loader.load("helpers").is_some());
        assert!(loader.is_loaded("helpers"));
        assert!(loader.load("helpers").is_some());
    }
}
