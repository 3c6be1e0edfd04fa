//! tagcall - Type-Tagged Calls into Runtime-Loaded Libraries
//!
//! Opens a shared library at runtime, resolves symbols in it, and invokes
//! them through one uniform calling convention instead of a statically
//! known native signature per function.
//!
//! # Features
//!
//! - **Uniform call shape**: every bridgeable entry point is a trampoline
//!   `(values, tags, count) -> (value, tag)`
//! - **Closed type tags**: void, int32, float32, int64, float64, string,
//!   bool and unknown, checked exhaustively
//! - **Scoped ownership**: results release themselves through the
//!   library's own `free_*` symbols
//! - **Platform loaders**: `dlopen` on POSIX, `LoadLibrary` on Windows,
//!   selected at build time
//!
//! # Example
//!
//! ```no_run
//! use tagcall::{HostLoader, LibraryHandle, TypeTag, Value};
//!
//! let lib = LibraryHandle::<HostLoader>::open("./libmath.so")?;
//! let sum = unsafe { lib.call("add_ints", &[Value::Int32(2), Value::Int32(3)])? };
//! assert_eq!(sum, Value::Int32(5));
//! assert_eq!(sum.tag(), TypeTag::Int32);
//! lib.close()?;
//! # Ok::<(), tagcall::FfiError>(())
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod ffi;

pub use config::{ConfigError, ConfigResult, TagcallConfig};
pub use ffi::{
    bridge, ArgumentList, BindingMode, CallResult, FfiError, FfiRegistry, HostLoader,
    LibraryHandle, LibraryLoader, LoaderOptions, NativeLoader, OwnedValue, RawTag,
    ReleasePolicy, SymbolAddress, TypeTag, Value,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
