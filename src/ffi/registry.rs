//! FFI Registry
//!
//! Named, shared libraries and qualified `library:symbol` calls.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use super::loader::LibraryLoader;
use super::types::{RawTag, TypeTag};
use super::{LibraryHandle, Value};
use crate::config::TagcallConfig;

/// Error type for FFI operations
#[derive(Debug, Error)]
pub enum FfiError {
    /// The OS loader refused the library
    #[error("Failed to load library '{}': {source}", path.display())]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// No library by that name on the search paths or the system linker path
    #[error("Library not found: {name}: {source}")]
    NotFound {
        name: String,
        #[source]
        source: libloading::Error,
    },

    /// Symbol not found in library
    #[error("Symbol '{name}' not found in '{library}'")]
    SymbolNotFound { name: String, library: String },

    /// Symbol name cannot be passed to the OS loader
    #[error("Invalid symbol name: {0:?}")]
    InvalidSymbolName(String),

    /// The OS loader failed to unmap the library
    #[error("Failed to close library '{}': {source}", path.display())]
    CloseFailed {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// Value and tag vectors differ in length
    #[error("Argument arity mismatch: {values} values, {tags} tags")]
    ArityMismatch { values: usize, tags: usize },

    /// Argument tag is `unknown` or out of range
    #[error("Unsupported argument type {tag} at index {index}")]
    UnsupportedArgType { index: usize, tag: RawTag },

    /// Too many arguments
    #[error("Too many arguments: {0}")]
    TooManyArgs(usize),

    /// String argument contains a NUL byte
    #[error("String argument at index {index} contains a NUL byte")]
    InvalidString { index: usize },

    /// Result tag is `unknown` or out of range
    #[error("Unsupported return type: {0}")]
    UnsupportedReturnType(RawTag),

    /// Non-void result with a null value
    #[error("Null {0} result")]
    NullResult(TypeTag),

    /// The library exports no releaser for this kind of result
    #[error("No release symbol for {0} result")]
    NoReleaser(TypeTag),

    /// Type name not recognized
    #[error("Unknown type tag: {0:?}")]
    UnknownTypeTag(String),

    /// Literal does not parse as the given type
    #[error("Invalid {tag} literal: {literal:?}")]
    InvalidLiteral { tag: TypeTag, literal: String },

    /// No library registered under that name
    #[error("Library not registered: {0}")]
    LibraryNotFound(String),

    /// Qualified name is malformed
    #[error("Function not found: {0}")]
    FunctionNotFound(String),
}

/// FFI Registry - named libraries shared across callers
pub struct FfiRegistry {
    /// Library loader
    loader: LibraryLoader,
    /// Loaded libraries (name -> handle)
    libraries: HashMap<String, Arc<LibraryHandle>>,
}

impl FfiRegistry {
    /// Create a new FFI registry
    pub fn new() -> Self {
        Self::with_loader(LibraryLoader::new())
    }

    /// Create a registry around a configured loader
    pub fn with_loader(loader: LibraryLoader) -> Self {
        Self {
            loader,
            libraries: HashMap::new(),
        }
    }

    /// Build a registry from configuration and load its `[libraries]`
    pub fn from_config(config: &TagcallConfig) -> Result<Self, FfiError> {
        let mut registry = Self::with_loader(config.library_loader());
        let mut names: Vec<_> = config.libraries.iter().collect();
        names.sort();
        for (name, path) in names {
            registry.load_library(name, Some(path.as_str()))?;
        }
        Ok(registry)
    }

    /// Add a search path for libraries
    pub fn add_search_path(&mut self, path: impl AsRef<std::path::Path>) {
        self.loader.add_search_path(path);
    }

    /// Load a library from a path, or search for it by name
    ///
    /// Loading a name that is already registered returns the existing handle.
    pub fn load_library(
        &mut self,
        name: &str,
        path: Option<&str>,
    ) -> Result<Arc<LibraryHandle>, FfiError> {
        if let Some(lib) = self.libraries.get(name) {
            return Ok(Arc::clone(lib));
        }

        let lib = Arc::new(self.loader.load(path.unwrap_or(name))?);
        tracing::debug!(name, path = %lib.path().display(), "registered library");
        self.libraries.insert(name.to_string(), Arc::clone(&lib));
        Ok(lib)
    }

    /// Get a loaded library
    pub fn get(&self, name: &str) -> Option<Arc<LibraryHandle>> {
        self.libraries.get(name).cloned()
    }

    /// Unregister a library
    ///
    /// The library is closed once the last outstanding `Arc` is dropped.
    pub fn unload(&mut self, name: &str) -> bool {
        self.libraries.remove(name).is_some()
    }

    /// List loaded libraries, sorted by name
    pub fn list_libraries(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.libraries.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Call a function by qualified name (`library:symbol`)
    ///
    /// # Safety
    ///
    /// See [`LibraryHandle::call`].
    pub unsafe fn call(&self, qualified_name: &str, args: &[Value]) -> Result<Value, FfiError> {
        let (library_name, symbol) = qualified_name
            .split_once(':')
            .filter(|(lib, sym)| !lib.is_empty() && !sym.is_empty())
            .ok_or_else(|| FfiError::FunctionNotFound(qualified_name.to_string()))?;

        let library = self
            .libraries
            .get(library_name)
            .ok_or_else(|| FfiError::LibraryNotFound(library_name.to_string()))?;

        library.call(symbol, args)
    }
}

impl Default for FfiRegistry {
    fn default() -> Self {
        Self::new()
    }
}
