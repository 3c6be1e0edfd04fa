//! FFI Module for tagcall
//!
//! Loads shared libraries at runtime and calls their exported trampolines
//! through one uniform, type-tagged calling convention.
//!
//! # Architecture
//!
//! ```text
//! Caller
//!       │  Value[]
//!       ▼
//! ArgumentList (boxed values + parallel tags)
//!       │
//!       ▼
//! LibraryHandle::resolve (dlopen / LoadLibrary via libloading)
//!       │  SymbolAddress
//!       ▼
//! bridge::invoke ──► trampoline(values, tags, count) -> CallResult
//!       │
//!       ▼
//! OwnedValue ──► decode ──► bridge::release ──► free_<kind>(ptr)
//! ```
//!
//! # Trampoline Protocol
//!
//! A bridgeable library exports functions of the shape
//!
//! ```c
//! typedef struct { void* value; int tag; } call_result;
//!
//! call_result add_ints(void** values, const int* tags, int count);
//! void* free_int(void* owned);
//! ```
//!
//! The callee reads each `values[i]` according to `tags[i]` and returns a
//! heap value plus its tag. Tags use the [`TypeTag`] wire values.
//!
//! # Example
//!
//! ```ignore
//! let lib = LibraryHandle::<HostLoader>::open("./libmath.so")?;
//! let sum = unsafe { lib.call("add_ints", &[Value::Int32(2), Value::Int32(3)])? };
//! assert_eq!(sum, Value::Int32(5));
//! lib.close()?;
//! ```

pub mod bridge;
mod library;
mod loader;
mod owned;
mod registry;
mod types;
mod value;

pub use bridge::{Releaser, Trampoline};
pub use library::LibraryHandle;
#[cfg(unix)]
pub use loader::PosixLoader;
#[cfg(windows)]
pub use loader::WindowsLoader;
pub use loader::{
    BindingMode, HostLoader, LibraryLoader, LoaderOptions, NativeLoader, UnsupportedLoader,
};
pub use owned::{release_result, OwnedValue, ReleasePolicy};
pub use registry::{FfiError, FfiRegistry};
pub use types::{CallResult, RawTag, SymbolAddress, TypeTag};
pub use value::{ArgumentList, Value};
