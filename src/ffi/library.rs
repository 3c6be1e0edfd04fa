//! Library Handles
//!
//! An open library: symbol resolution with a per-handle cache, tagged
//! invocation, and the value-level `call` that marshals, invokes, decodes
//! and releases in one step.

use std::collections::HashMap;
use std::ffi::CString;
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use super::bridge;
use super::{
    ArgumentList, FfiError, HostLoader, LoaderOptions, NativeLoader, OwnedValue, ReleasePolicy,
    SymbolAddress, Value,
};

/// An open dynamic library
///
/// Closed exactly once, either by [`LibraryHandle::close`] or on drop.
/// Addresses and owned results borrow the handle, so it cannot be closed
/// while any of them is alive.
pub struct LibraryHandle<L: NativeLoader = HostLoader> {
    /// Path the library was opened from
    path: PathBuf,
    /// Platform handle
    inner: L,
    /// Resolved addresses (name -> address)
    symbols: RwLock<HashMap<String, usize>>,
    /// How owned results are handed back
    release: ReleasePolicy,
}

impl<L: NativeLoader> LibraryHandle<L> {
    /// Open a library with default options
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FfiError> {
        Self::open_with(path, &LoaderOptions::default(), ReleasePolicy::default())
    }

    /// Open a library with explicit loader options and release policy
    pub fn open_with(
        path: impl AsRef<Path>,
        options: &LoaderOptions,
        release: ReleasePolicy,
    ) -> Result<Self, FfiError> {
        let path = path.as_ref().to_path_buf();

        // Safety: loading runs the library's initializers. We trust the
        // caller to have chosen the library.
        let inner = unsafe { L::open(&path, options) }.map_err(|source| FfiError::LoadFailed {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), loader = L::NAME, "opened library");

        Ok(Self {
            path,
            inner,
            symbols: RwLock::new(HashMap::new()),
            release,
        })
    }

    /// Get the path to this library
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release policy for results of this library
    pub fn release_policy(&self) -> &ReleasePolicy {
        &self.release
    }

    /// Resolve a symbol by name
    ///
    /// The same name always yields the same address while the handle lives.
    pub fn resolve(&self, name: &str) -> Result<SymbolAddress<'_>, FfiError> {
        if let Some(&addr) = self.symbols.read().get(name) {
            // Safety: cached addresses are non-null and tied to self.
            return unsafe { SymbolAddress::from_raw(addr as *mut _) }
                .ok_or_else(|| self.symbol_not_found(name));
        }

        let c_name =
            CString::new(name).map_err(|_| FfiError::InvalidSymbolName(name.to_string()))?;

        let ptr = self.inner.symbol(&c_name).map_err(|e| {
            tracing::debug!(symbol = name, error = %e, "symbol lookup failed");
            self.symbol_not_found(name)
        })?;

        // Safety: the address lives as long as the mapping, which `self` owns.
        let address =
            unsafe { SymbolAddress::from_raw(ptr) }.ok_or_else(|| self.symbol_not_found(name))?;

        self.symbols.write().insert(name.to_string(), address.addr());
        tracing::debug!(symbol = name, address = ?address, "resolved symbol");
        Ok(address)
    }

    /// Check whether the library exports `name`
    pub fn has_symbol(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Invoke a trampoline by name
    ///
    /// # Safety
    ///
    /// `symbol` must have the trampoline shape and must understand the
    /// tags in `args`. A mismatch is undefined behavior, not an error.
    pub unsafe fn invoke(
        &self,
        symbol: &str,
        args: &ArgumentList,
    ) -> Result<OwnedValue<'_, L>, FfiError> {
        let address = self.resolve(symbol)?;
        tracing::debug!(symbol, args = args.len(), "invoking trampoline");
        let result = bridge::invoke_args(address, args);
        Ok(OwnedValue::new(result, self))
    }

    /// Call a trampoline with host values and get a host value back
    ///
    /// The returned value is always released, even when decoding it fails.
    ///
    /// # Safety
    ///
    /// Same as [`LibraryHandle::invoke`]; the trampoline's result must also
    /// have the layout its tag names.
    pub unsafe fn call(&self, symbol: &str, args: &[Value]) -> Result<Value, FfiError> {
        let args = ArgumentList::from_values(args)?;
        let owned = self.invoke(symbol, &args)?;
        let value = owned.value();
        owned.release()?;
        value
    }

    /// Close the library
    pub fn close(self) -> Result<(), FfiError> {
        let Self { path, inner, .. } = self;
        tracing::debug!(path = %path.display(), "closing library");
        inner
            .close()
            .map_err(|source| FfiError::CloseFailed { path, source })
    }

    fn symbol_not_found(&self, name: &str) -> FfiError {
        FfiError::SymbolNotFound {
            name: name.to_string(),
            library: self.path.display().to_string(),
        }
    }
}

impl<L: NativeLoader> fmt::Debug for LibraryHandle<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryHandle")
            .field("path", &self.path)
            .field("loader", &L::NAME)
            .field("cached_symbols", &self.symbols.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::UnsupportedLoader;

    #[test]
    fn test_open_invalid_path_fails() {
        let err = LibraryHandle::<HostLoader>::open("/nonexistent/dir/libnothing.so").unwrap_err();
        match err {
            FfiError::LoadFailed { path, .. } => {
                assert_eq!(path, PathBuf::from("/nonexistent/dir/libnothing.so"))
            }
            other => panic!("expected LoadFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_loader_never_opens() {
        let err = LibraryHandle::<UnsupportedLoader>::open("anything").unwrap_err();
        assert!(matches!(err, FfiError::LoadFailed { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_libc_resolution() {
        // libc.so.6 is always mapped on glibc systems
        if let Ok(lib) = LibraryHandle::<HostLoader>::open("libc.so.6") {
            let first = lib.resolve("getpid").expect("getpid");
            let second = lib.resolve("getpid").expect("getpid");
            assert_eq!(first, second);

            assert!(matches!(
                lib.resolve("tagcall_no_such_symbol"),
                Err(FfiError::SymbolNotFound { .. })
            ));
            assert!(matches!(
                lib.resolve("get\0pid"),
                Err(FfiError::InvalidSymbolName(_))
            ));
            assert!(format!("{lib:?}").contains("dlopen"));

            lib.close().expect("close");
        }
    }
}
