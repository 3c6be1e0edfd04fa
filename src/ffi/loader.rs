//! Dynamic Library Loader
//!
//! Platform loaders behind one trait, and a search-path based library
//! finder on top of them.

use std::ffi::{c_void, CStr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{FfiError, LibraryHandle, ReleasePolicy};

/// When the OS linker binds a library's undefined symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingMode {
    /// Bind on first use (`RTLD_LAZY`)
    #[default]
    Lazy,
    /// Bind everything at open time (`RTLD_NOW`)
    Now,
}

/// Options passed to the platform loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoaderOptions {
    /// Symbol binding mode (ignored on Windows)
    pub binding: BindingMode,
    /// Make the library's symbols available to later loads (ignored on Windows)
    pub global: bool,
}

/// A platform's way of mapping a library and looking up its symbols
pub trait NativeLoader: Sized + Send + Sync {
    /// Short name for logs
    const NAME: &'static str;

    /// Map the library at `path`
    ///
    /// # Safety
    ///
    /// Loading runs the library's initialization routines, which may do
    /// anything.
    unsafe fn open(path: &Path, options: &LoaderOptions) -> Result<Self, libloading::Error>;

    /// Look up `name`; may return null if the symbol's value is null
    fn symbol(&self, name: &CStr) -> Result<*mut c_void, libloading::Error>;

    /// Unmap the library
    fn close(self) -> Result<(), libloading::Error>;
}

/// POSIX loader (`dlopen`/`dlsym`/`dlclose`)
#[cfg(unix)]
pub struct PosixLoader(libloading::os::unix::Library);

#[cfg(unix)]
impl NativeLoader for PosixLoader {
    const NAME: &'static str = "dlopen";

    unsafe fn open(path: &Path, options: &LoaderOptions) -> Result<Self, libloading::Error> {
        use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_LAZY, RTLD_LOCAL, RTLD_NOW};

        let mut flags = match options.binding {
            BindingMode::Lazy => RTLD_LAZY,
            BindingMode::Now => RTLD_NOW,
        };
        flags |= if options.global { RTLD_GLOBAL } else { RTLD_LOCAL };
        Library::open(Some(path), flags).map(PosixLoader)
    }

    fn symbol(&self, name: &CStr) -> Result<*mut c_void, libloading::Error> {
        // Safety: the symbol is read as an untyped address, never called here.
        unsafe {
            let symbol = self.0.get::<*mut c_void>(name.to_bytes_with_nul())?;
            Ok(*symbol)
        }
    }

    fn close(self) -> Result<(), libloading::Error> {
        self.0.close()
    }
}

/// Windows loader (`LoadLibraryW`/`GetProcAddress`/`FreeLibrary`)
#[cfg(windows)]
pub struct WindowsLoader(libloading::os::windows::Library);

#[cfg(windows)]
impl NativeLoader for WindowsLoader {
    const NAME: &'static str = "LoadLibrary";

    unsafe fn open(path: &Path, _options: &LoaderOptions) -> Result<Self, libloading::Error> {
        libloading::os::windows::Library::new(path).map(WindowsLoader)
    }

    fn symbol(&self, name: &CStr) -> Result<*mut c_void, libloading::Error> {
        // Safety: the symbol is read as an untyped address, never called here.
        unsafe {
            let symbol = self.0.get::<*mut c_void>(name.to_bytes_with_nul())?;
            Ok(*symbol)
        }
    }

    fn close(self) -> Result<(), libloading::Error> {
        self.0.close()
    }
}

/// Loader for targets without dynamic linking; every open fails
pub struct UnsupportedLoader {
    _private: (),
}

impl NativeLoader for UnsupportedLoader {
    const NAME: &'static str = "unsupported";

    unsafe fn open(_path: &Path, _options: &LoaderOptions) -> Result<Self, libloading::Error> {
        Err(libloading::Error::DlOpenUnknown)
    }

    fn symbol(&self, _name: &CStr) -> Result<*mut c_void, libloading::Error> {
        Err(libloading::Error::DlSymUnknown)
    }

    fn close(self) -> Result<(), libloading::Error> {
        Ok(())
    }
}

/// The loader for the target platform
#[cfg(unix)]
pub type HostLoader = PosixLoader;

/// The loader for the target platform
#[cfg(windows)]
pub type HostLoader = WindowsLoader;

/// The loader for the target platform
#[cfg(not(any(unix, windows)))]
pub type HostLoader = UnsupportedLoader;

/// Library loader with search paths
pub struct LibraryLoader {
    /// Search paths for libraries
    search_paths: Vec<PathBuf>,
    /// Options used for every load
    options: LoaderOptions,
    /// Release policy given to every loaded library
    release: ReleasePolicy,
}

impl LibraryLoader {
    /// Create a new library loader with the platform's default search paths
    pub fn new() -> Self {
        Self {
            search_paths: default_search_paths(),
            options: LoaderOptions::default(),
            release: ReleasePolicy::default(),
        }
    }

    /// Use these loader options
    pub fn with_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Use this release policy
    pub fn with_release_policy(mut self, release: ReleasePolicy) -> Self {
        self.release = release;
        self
    }

    /// Add a search path; later paths are searched after earlier ones
    pub fn add_search_path(&mut self, path: impl AsRef<Path>) {
        self.search_paths.push(path.as_ref().to_path_buf());
    }

    /// Search paths in lookup order
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Find a library by path or name
    ///
    /// An existing path wins; otherwise the platform file name for `name`
    /// (`libNAME.so`, `libNAME.dylib`, `NAME.dll`) is looked up in each
    /// search path, as is `name` itself.
    pub fn find_library(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        let lib_name = libloading::library_filename(name);
        for search_path in &self.search_paths {
            for candidate in [search_path.join(&lib_name), search_path.join(name)] {
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }

        None
    }

    /// Load a library by path or name
    ///
    /// Bare names not found on the search paths are handed to the OS linker,
    /// which applies its own search rules; its refusal is `NotFound`. Paths
    /// are opened as given and fail with `LoadFailed`.
    pub fn load(&self, name: &str) -> Result<LibraryHandle, FfiError> {
        if let Some(path) = self.find_library(name) {
            return LibraryHandle::open_with(&path, &self.options, self.release.clone());
        }

        let path = Path::new(name);
        if path.components().count() > 1 {
            return LibraryHandle::open_with(path, &self.options, self.release.clone());
        }

        tracing::debug!(library = name, "not on search paths, deferring to system linker");
        LibraryHandle::open_with(path, &self.options, self.release.clone()).map_err(|e| match e {
            FfiError::LoadFailed { source, .. } => FfiError::NotFound {
                name: name.to_string(),
                source,
            },
            other => other,
        })
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the default library search paths for this platform
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // Current directory
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(ld_path) = std::env::var("LD_LIBRARY_PATH") {
            paths.extend(std::env::split_paths(&ld_path));
        }
        for p in ["/usr/local/lib", "/usr/lib", "/lib", "/usr/lib64", "/lib64"] {
            paths.push(PathBuf::from(p));
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(dyld_path) = std::env::var("DYLD_LIBRARY_PATH") {
            paths.extend(std::env::split_paths(&dyld_path));
        }
        for p in ["/usr/local/lib", "/usr/lib", "/opt/homebrew/lib"] {
            paths.push(PathBuf::from(p));
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(path) = std::env::var("PATH") {
            paths.extend(std::env::split_paths(&path));
        }
        paths.push(PathBuf::from("C:\\Windows\\System32"));
    }

    paths
}
