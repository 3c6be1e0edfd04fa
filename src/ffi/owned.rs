//! Owned Call Results
//!
//! A non-void result belongs to the caller until it is handed back to the
//! library that allocated it. [`OwnedValue`] carries that obligation and
//! discharges it exactly once.

use std::mem::ManuallyDrop;

use serde::{Deserialize, Serialize};

use super::bridge;
use super::{CallResult, FfiError, HostLoader, LibraryHandle, NativeLoader, TypeTag, Value};

/// Which library symbol releases which kind of result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePolicy {
    /// Releaser for int32 and int64 results
    #[serde(default = "default_int")]
    pub int: String,

    /// Releaser for float32 and float64 results
    #[serde(default = "default_float")]
    pub float: String,

    /// Releaser for string results
    #[serde(default = "default_string")]
    pub string: String,

    /// Releaser for bool results
    #[serde(default = "default_bool")]
    pub bool: String,

    /// Fall back to the C allocator's `free` when the library has no releaser
    #[serde(default = "default_true")]
    pub libc_fallback: bool,
}

fn default_int() -> String {
    "free_int".to_string()
}

fn default_float() -> String {
    "free_float".to_string()
}

fn default_string() -> String {
    "free_string".to_string()
}

fn default_bool() -> String {
    "free_bool".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ReleasePolicy {
    fn default() -> Self {
        Self {
            int: default_int(),
            float: default_float(),
            string: default_string(),
            bool: default_bool(),
            libc_fallback: true,
        }
    }
}

impl ReleasePolicy {
    /// Releaser symbol for a tag; `None` for tags that own nothing
    pub fn symbol_for(&self, tag: TypeTag) -> Option<&str> {
        match tag {
            t if t.is_integer() => Some(self.int.as_str()),
            t if t.is_float() => Some(self.float.as_str()),
            TypeTag::String => Some(self.string.as_str()),
            TypeTag::Bool => Some(self.bool.as_str()),
            _ => None,
        }
    }
}

/// A call result the caller owns
///
/// Dropping it releases the value; use [`OwnedValue::release`] to observe
/// release errors, or [`OwnedValue::into_raw`] to take over the obligation.
pub struct OwnedValue<'lib, L: NativeLoader = HostLoader> {
    result: CallResult,
    library: &'lib LibraryHandle<L>,
}

impl<'lib, L: NativeLoader> OwnedValue<'lib, L> {
    pub(crate) fn new(result: CallResult, library: &'lib LibraryHandle<L>) -> Self {
        Self { result, library }
    }

    /// Tag of the held value
    pub fn tag(&self) -> TypeTag {
        self.result.type_tag()
    }

    /// The raw result, still owned by `self`
    pub fn as_raw(&self) -> &CallResult {
        &self.result
    }

    /// Decode the held value
    pub fn value(&self) -> Result<Value, FfiError> {
        // Safety: the invocation that produced this result was made under the
        // contract that its value matches its tag.
        unsafe { self.result.read() }
    }

    /// Give up ownership without releasing
    pub fn into_raw(self) -> CallResult {
        let this = ManuallyDrop::new(self);
        this.result
    }

    /// Hand the value back to its library
    pub fn release(self) -> Result<(), FfiError> {
        let this = ManuallyDrop::new(self);
        // Safety: the result came from an invocation on `library` and the
        // guard is consumed, so it is released at most once.
        unsafe { release_result(this.library, this.result) }
    }
}

impl<L: NativeLoader> Drop for OwnedValue<'_, L> {
    fn drop(&mut self) {
        // Safety: as in `release`; drop runs at most once.
        if let Err(e) = unsafe { release_result(self.library, self.result) } {
            tracing::warn!(error = %e, "failed to release call result");
        }
    }
}

/// Release a raw result through `library`'s releaser for its tag
///
/// Missing releasers fall back to `libc::free` when the policy allows it.
///
/// # Safety
///
/// `result` must come from an invocation on a trampoline of `library` and
/// must not have been released already. Any other pointer is handed to a
/// deallocator.
///
/// ```compile_fail
/// use tagcall::ffi::{release_result, CallResult, LibraryHandle, TypeTag};
///
/// fn free_anything(lib: &LibraryHandle, mut n: i32) {
///     let result = CallResult::new(&mut n as *mut i32 as *mut _, TypeTag::Int32);
///     let _ = release_result(lib, result);
/// }
/// ```
pub unsafe fn release_result<L: NativeLoader>(
    library: &LibraryHandle<L>,
    result: CallResult,
) -> Result<(), FfiError> {
    let tag = result.type_tag();
    let symbol = match library.release_policy().symbol_for(tag) {
        Some(symbol) => symbol,
        None => return Ok(()),
    };
    if result.value.is_null() {
        return Ok(());
    }

    match library.resolve(symbol) {
        Ok(releaser) => {
            // Safety: the releaser symbol is part of the same protocol as the
            // trampoline that produced the value.
            bridge::release(releaser, result.value);
            Ok(())
        }
        Err(_) if library.release_policy().libc_fallback => {
            tracing::warn!(
                symbol,
                library = %library.path().display(),
                "release symbol not found, freeing with the C allocator"
            );
            // Safety: libraries without a releaser are expected to allocate
            // results with malloc.
            libc::free(result.value);
            Ok(())
        }
        Err(_) => {
            tracing::warn!(
                symbol,
                library = %library.path().display(),
                "release symbol not found, leaking result"
            );
            Err(FfiError::NoReleaser(tag))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_symbols() {
        let policy = ReleasePolicy::default();
        assert_eq!(policy.symbol_for(TypeTag::Int32), Some("free_int"));
        assert_eq!(policy.symbol_for(TypeTag::Int64), Some("free_int"));
        assert_eq!(policy.symbol_for(TypeTag::Float32), Some("free_float"));
        assert_eq!(policy.symbol_for(TypeTag::Float64), Some("free_float"));
        assert_eq!(policy.symbol_for(TypeTag::String), Some("free_string"));
        assert_eq!(policy.symbol_for(TypeTag::Bool), Some("free_bool"));
        assert_eq!(policy.symbol_for(TypeTag::Void), None);
        assert_eq!(policy.symbol_for(TypeTag::Unknown), None);
        assert!(policy.libc_fallback);
    }

    #[test]
    fn test_policy_partial_toml() {
        let policy: ReleasePolicy = toml::from_str(
            r#"
string = "my_free_string"
libc_fallback = false
"#,
        )
        .unwrap();
        assert_eq!(policy.string, "my_free_string");
        assert_eq!(policy.int, "free_int");
        assert!(!policy.libc_fallback);
    }
}
