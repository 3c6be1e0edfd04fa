//! Host Values and Argument Marshaling
//!
//! Converts host values into the parallel `(values, tags)` vectors a
//! trampoline receives, and decodes a tagged result back into a host value.

use std::ffi::{c_void, CStr, CString};
use std::fmt;
use std::os::raw::{c_char, c_int};

use serde::Serialize;

use super::{CallResult, FfiError, RawTag, TypeTag};

/// A value that can be passed to or returned from a trampoline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag", content = "value", rename_all = "lowercase")]
pub enum Value {
    /// No value
    Void,
    /// 32-bit signed integer
    Int32(i32),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit floating point
    Float64(f64),
    /// Owned string
    String(String),
    /// Boolean
    Bool(bool),
}

impl Value {
    /// Get the tag of this value
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::Void => TypeTag::Void,
            Value::Int32(_) => TypeTag::Int32,
            Value::Float32(_) => TypeTag::Float32,
            Value::Int64(_) => TypeTag::Int64,
            Value::Float64(_) => TypeTag::Float64,
            Value::String(_) => TypeTag::String,
            Value::Bool(_) => TypeTag::Bool,
        }
    }

    /// Check if this is a void value
    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    /// Parse a literal of the given type
    pub fn parse(tag: TypeTag, literal: &str) -> Result<Self, FfiError> {
        let invalid = || FfiError::InvalidLiteral {
            tag,
            literal: literal.to_string(),
        };
        let value = match tag {
            TypeTag::Void => {
                if !literal.is_empty() {
                    return Err(invalid());
                }
                Value::Void
            }
            TypeTag::Int32 => Value::Int32(literal.trim().parse().map_err(|_| invalid())?),
            TypeTag::Float32 => Value::Float32(literal.trim().parse().map_err(|_| invalid())?),
            TypeTag::Int64 => Value::Int64(literal.trim().parse().map_err(|_| invalid())?),
            TypeTag::Float64 => Value::Float64(literal.trim().parse().map_err(|_| invalid())?),
            TypeTag::String => Value::String(literal.to_string()),
            TypeTag::Bool => match literal.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Value::Bool(true),
                "false" | "0" | "no" => Value::Bool(false),
                _ => return Err(invalid()),
            },
            TypeTag::Unknown => return Err(invalid()),
        };
        Ok(value)
    }

    /// Parse `tag:literal` text, e.g. `int32:5`, `string:hello` or `void`
    pub fn parse_tagged(s: &str) -> Result<Self, FfiError> {
        match s.split_once(':') {
            Some((tag, literal)) => Self::parse(tag.parse()?, literal),
            None => Self::parse(s.parse()?, ""),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => write!(f, "void"),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Owned, positionally aligned argument vectors for one call
///
/// Every non-void value is boxed so its address stays fixed while the list
/// lives; `values[i]` is always described by `tags[i]`.
pub struct ArgumentList {
    values: Vec<*mut c_void>,
    tags: Vec<RawTag>,
}

impl ArgumentList {
    /// Create an empty argument list
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Marshal a slice of host values
    pub fn from_values(values: &[Value]) -> Result<Self, FfiError> {
        let mut args = Self::new();
        args.values.reserve(values.len());
        args.tags.reserve(values.len());
        for value in values {
            args.push(value)?;
        }
        Ok(args)
    }

    /// Append one value
    pub fn push(&mut self, value: &Value) -> Result<(), FfiError> {
        if self.values.len() >= c_int::MAX as usize {
            return Err(FfiError::TooManyArgs(self.values.len() + 1));
        }
        let ptr = match value {
            Value::Void => std::ptr::null_mut(),
            Value::Int32(v) => Box::into_raw(Box::new(*v)) as *mut c_void,
            Value::Float32(v) => Box::into_raw(Box::new(*v)) as *mut c_void,
            Value::Int64(v) => Box::into_raw(Box::new(*v)) as *mut c_void,
            Value::Float64(v) => Box::into_raw(Box::new(*v)) as *mut c_void,
            Value::String(s) => {
                let c_str = CString::new(s.as_str()).map_err(|_| FfiError::InvalidString {
                    index: self.values.len(),
                })?;
                c_str.into_raw() as *mut c_void
            }
            Value::Bool(b) => Box::into_raw(Box::new(u8::from(*b))) as *mut c_void,
        };
        self.values.push(ptr);
        self.tags.push(value.tag().to_raw());
        Ok(())
    }

    /// Number of arguments
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the list is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value pointers, one per argument
    pub fn values(&self) -> &[*mut c_void] {
        &self.values
    }

    /// Wire tags, one per argument
    pub fn tags(&self) -> &[RawTag] {
        &self.tags
    }

    /// Argument count in the form trampolines receive it
    pub fn count(&self) -> c_int {
        // push() keeps len within c_int
        self.values.len() as c_int
    }
}

impl Default for ArgumentList {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ArgumentList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tags: Vec<TypeTag> = self.tags.iter().map(|&t| TypeTag::from_raw(t)).collect();
        f.debug_struct("ArgumentList").field("tags", &tags).finish()
    }
}

impl Drop for ArgumentList {
    fn drop(&mut self) {
        for (&ptr, &tag) in self.values.iter().zip(&self.tags) {
            if ptr.is_null() {
                continue;
            }
            // Safety: every pointer was produced by push() for this tag.
            unsafe {
                match TypeTag::from_raw(tag) {
                    TypeTag::Int32 => drop(Box::from_raw(ptr as *mut i32)),
                    TypeTag::Float32 => drop(Box::from_raw(ptr as *mut f32)),
                    TypeTag::Int64 => drop(Box::from_raw(ptr as *mut i64)),
                    TypeTag::Float64 => drop(Box::from_raw(ptr as *mut f64)),
                    TypeTag::String => drop(CString::from_raw(ptr as *mut c_char)),
                    TypeTag::Bool => drop(Box::from_raw(ptr as *mut u8)),
                    TypeTag::Void | TypeTag::Unknown => {}
                }
            }
        }
    }
}

impl CallResult {
    /// Decode the pointed-to value according to the tag
    ///
    /// A void result is never dereferenced.
    ///
    /// # Safety
    ///
    /// Unless the tag is void or unknown, `value` must be null or point to a
    /// live value with the wire layout the tag names.
    pub unsafe fn read(&self) -> Result<Value, FfiError> {
        let tag = self.type_tag();
        match tag {
            TypeTag::Void => return Ok(Value::Void),
            TypeTag::Unknown => return Err(FfiError::UnsupportedReturnType(self.tag)),
            _ => {}
        }
        if self.value.is_null() {
            return Err(FfiError::NullResult(tag));
        }
        let ptr = self.value;
        let value = match tag {
            TypeTag::Int32 => Value::Int32(std::ptr::read_unaligned(ptr as *const i32)),
            TypeTag::Float32 => Value::Float32(std::ptr::read_unaligned(ptr as *const f32)),
            TypeTag::Int64 => Value::Int64(std::ptr::read_unaligned(ptr as *const i64)),
            TypeTag::Float64 => Value::Float64(std::ptr::read_unaligned(ptr as *const f64)),
            TypeTag::String => Value::String(
                CStr::from_ptr(ptr as *const c_char)
                    .to_string_lossy()
                    .into_owned(),
            ),
            TypeTag::Bool => Value::Bool(*(ptr as *const u8) != 0),
            TypeTag::Void | TypeTag::Unknown => unreachable!(),
        };
        Ok(value)
    }
}
