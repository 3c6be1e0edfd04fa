//! FFI Type System
//!
//! Type tags, the raw call result, and symbol addresses shared by the
//! loader and the call bridge.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::os::raw::c_int;
use std::ptr::NonNull;
use std::str::FromStr;

use super::FfiError;

/// Type tag as it crosses the native boundary (a C `enum`, i.e. an `int`).
pub type RawTag = c_int;

/// Semantic type of one argument or one return value
///
/// The discriminants are the wire values shared with native trampolines.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// No value; the paired pointer is null and must not be dereferenced
    Void = 0,
    /// 32-bit signed integer
    Int32 = 1,
    /// 32-bit floating point
    Float32 = 2,
    /// 64-bit signed integer ("long")
    Int64 = 3,
    /// 64-bit floating point ("double")
    Float64 = 4,
    /// Null-terminated C string
    String = 5,
    /// One-byte boolean
    Bool = 6,
    /// Unrecognized or unsupported type
    Unknown = 7,
}

impl TypeTag {
    /// Every tag, in wire order
    pub const ALL: [TypeTag; 8] = [
        TypeTag::Void,
        TypeTag::Int32,
        TypeTag::Float32,
        TypeTag::Int64,
        TypeTag::Float64,
        TypeTag::String,
        TypeTag::Bool,
        TypeTag::Unknown,
    ];

    /// Map a wire value to a tag; anything out of range is `Unknown`
    pub fn from_raw(raw: RawTag) -> Self {
        match raw {
            0 => TypeTag::Void,
            1 => TypeTag::Int32,
            2 => TypeTag::Float32,
            3 => TypeTag::Int64,
            4 => TypeTag::Float64,
            5 => TypeTag::String,
            6 => TypeTag::Bool,
            _ => TypeTag::Unknown,
        }
    }

    /// The wire value of this tag
    pub fn to_raw(self) -> RawTag {
        self as RawTag
    }

    /// Canonical name, as printed and parsed
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Void => "void",
            TypeTag::Int32 => "int32",
            TypeTag::Float32 => "float32",
            TypeTag::Int64 => "int64",
            TypeTag::Float64 => "float64",
            TypeTag::String => "string",
            TypeTag::Bool => "bool",
            TypeTag::Unknown => "unknown",
        }
    }

    /// Check if this tag is an integer type
    pub fn is_integer(self) -> bool {
        matches!(self, TypeTag::Int32 | TypeTag::Int64)
    }

    /// Check if this tag is a floating point type
    pub fn is_float(self) -> bool {
        matches!(self, TypeTag::Float32 | TypeTag::Float64)
    }

    /// Whether a value carrying this tag may appear in an argument list
    pub fn is_valid_argument(self) -> bool {
        self != TypeTag::Unknown
    }
}

impl FromStr for TypeTag {
    type Err = FfiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "void" => Ok(TypeTag::Void),
            "int32" | "int" | "i32" => Ok(TypeTag::Int32),
            "float32" | "float" | "f32" => Ok(TypeTag::Float32),
            "int64" | "long" | "i64" => Ok(TypeTag::Int64),
            "float64" | "double" | "f64" => Ok(TypeTag::Float64),
            "string" | "str" | "cstr" => Ok(TypeTag::String),
            "bool" | "boolean" => Ok(TypeTag::Bool),
            _ => Err(FfiError::UnknownTypeTag(s.to_string())),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tagged value returned by a trampoline
///
/// Layout-compatible with `struct { void* value; int tag; }`. Unless the tag
/// is `void`, ownership of `value` passes to whoever receives this.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CallResult {
    /// Pointer to the returned value
    pub value: *mut c_void,
    /// Wire tag describing `value`
    pub tag: RawTag,
}

impl CallResult {
    /// Build a result from a pointer and a tag
    pub fn new(value: *mut c_void, tag: TypeTag) -> Self {
        Self {
            value,
            tag: tag.to_raw(),
        }
    }

    /// The void result
    pub fn void() -> Self {
        Self::new(std::ptr::null_mut(), TypeTag::Void)
    }

    /// Decoded tag; out-of-range wire values become `Unknown`
    pub fn type_tag(&self) -> TypeTag {
        TypeTag::from_raw(self.tag)
    }

    /// Check if this is a void result
    pub fn is_void(&self) -> bool {
        self.type_tag() == TypeTag::Void
    }
}

/// Address of a resolved symbol
///
/// Non-owning and never null. The lifetime ties it to the library it was
/// resolved from, so it cannot outlive that library's mapping.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress<'lib> {
    ptr: NonNull<c_void>,
    _library: PhantomData<&'lib ()>,
}

impl<'lib> SymbolAddress<'lib> {
    /// Wrap a raw address, returning `None` for null
    ///
    /// # Safety
    ///
    /// `ptr` must stay valid for `'lib`. Used for trampolines that were not
    /// loaded from a library, such as functions linked into the host.
    pub unsafe fn from_raw(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self {
            ptr,
            _library: PhantomData,
        })
    }

    /// The raw address
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr.as_ptr()
    }

    /// The address as an integer
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }
}

impl fmt::Debug for SymbolAddress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolAddress({:#x})", self.addr())
    }
}

impl fmt::Pointer for SymbolAddress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}
