//! Call and Release Bridges
//!
//! Any resolved symbol that speaks the tagged-argument protocol can be
//! called through one fixed function shape:
//!
//! ```text
//! CallResult trampoline(void** values, const int* tags, int count);
//! void*      releaser(void* owned);
//! ```
//!
//! The bridge only re-types the address and calls it. Tags are never read
//! here; true ABI marshaling is the callee's job. A symbol that does not
//! have this shape cannot be detected and will corrupt the stack or crash.

use std::ffi::c_void;
use std::os::raw::c_int;

use super::{ArgumentList, CallResult, FfiError, RawTag, SymbolAddress, TypeTag};

/// Fixed shape of every callable entry point
pub type Trampoline = unsafe extern "C" fn(
    values: *const *mut c_void,
    tags: *const RawTag,
    count: c_int,
) -> CallResult;

/// Fixed shape of every release entry point
pub type Releaser = unsafe extern "C" fn(owned: *mut c_void) -> *mut c_void;

/// Invoke a trampoline and return its result unmodified
///
/// # Safety
///
/// `address` must point to a function with the [`Trampoline`] shape, and
/// `values`/`tags` must point to `count` elements each, laid out as that
/// function expects.
#[inline]
pub unsafe fn invoke(
    address: SymbolAddress<'_>,
    values: *const *mut c_void,
    tags: *const RawTag,
    count: c_int,
) -> CallResult {
    let trampoline: Trampoline = std::mem::transmute(address.as_ptr());
    trampoline(values, tags, count)
}

/// Hand an owned value back to the library that produced it
///
/// # Safety
///
/// `address` must point to a function with the [`Releaser`] shape, and
/// `owned` must come from a prior invocation whose result has not been
/// released yet.
#[inline]
pub unsafe fn release(address: SymbolAddress<'_>, owned: *mut c_void) -> *mut c_void {
    let releaser: Releaser = std::mem::transmute(address.as_ptr());
    releaser(owned)
}

/// Validate caller-built raw argument vectors
///
/// Returns the count to pass to [`invoke`].
pub fn check_arguments(values: &[*mut c_void], tags: &[RawTag]) -> Result<c_int, FfiError> {
    if values.len() != tags.len() {
        return Err(FfiError::ArityMismatch {
            values: values.len(),
            tags: tags.len(),
        });
    }
    for (index, &raw) in tags.iter().enumerate() {
        // Out-of-range wire values decode as Unknown
        if !TypeTag::from_raw(raw).is_valid_argument() {
            return Err(FfiError::UnsupportedArgType { index, tag: raw });
        }
    }
    c_int::try_from(values.len()).map_err(|_| FfiError::TooManyArgs(values.len()))
}

/// Invoke with raw vectors after checking them
///
/// # Safety
///
/// Same as [`invoke`], except that length and tag validity are checked.
pub unsafe fn invoke_checked(
    address: SymbolAddress<'_>,
    values: &[*mut c_void],
    tags: &[RawTag],
) -> Result<CallResult, FfiError> {
    let count = check_arguments(values, tags)?;
    Ok(invoke(address, values.as_ptr(), tags.as_ptr(), count))
}

/// Invoke with a marshaled argument list
///
/// # Safety
///
/// `address` must point to a function with the [`Trampoline`] shape.
pub unsafe fn invoke_args(address: SymbolAddress<'_>, args: &ArgumentList) -> CallResult {
    invoke(
        address,
        args.values().as_ptr(),
        args.tags().as_ptr(),
        args.count(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static RELEASED: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn echo_int32(
        values: *const *mut c_void,
        tags: *const RawTag,
        count: c_int,
    ) -> CallResult {
        if count != 1 || *tags != TypeTag::Int32.to_raw() {
            return CallResult::new(std::ptr::null_mut(), TypeTag::Unknown);
        }
        let v = *(*values as *const i32);
        CallResult::new(Box::into_raw(Box::new(v)) as *mut c_void, TypeTag::Int32)
    }

    unsafe extern "C" fn count_args(
        _values: *const *mut c_void,
        _tags: *const RawTag,
        count: c_int,
    ) -> CallResult {
        CallResult::new(Box::into_raw(Box::new(count)) as *mut c_void, TypeTag::Int32)
    }

    unsafe extern "C" fn nothing(
        _values: *const *mut c_void,
        _tags: *const RawTag,
        _count: c_int,
    ) -> CallResult {
        CallResult::void()
    }

    unsafe extern "C" fn free_boxed_i32(owned: *mut c_void) -> *mut c_void {
        drop(Box::from_raw(owned as *mut i32));
        RELEASED.fetch_add(1, Ordering::SeqCst);
        std::ptr::null_mut()
    }

    fn trampoline_addr(f: Trampoline) -> SymbolAddress<'static> {
        unsafe { SymbolAddress::from_raw(f as *mut c_void).unwrap() }
    }

    fn releaser() -> SymbolAddress<'static> {
        let f: Releaser = free_boxed_i32;
        unsafe { SymbolAddress::from_raw(f as *mut c_void).unwrap() }
    }

    #[test]
    fn test_int32_echo_round_trip() {
        let echo = trampoline_addr(echo_int32);
        let before = RELEASED.load(Ordering::SeqCst);

        for input in [0, 1, -1, i32::MIN, i32::MAX] {
            let args = ArgumentList::from_values(&[Value::Int32(input)]).unwrap();
            let result = unsafe { invoke_args(echo, &args) };
            assert_eq!(result.type_tag(), TypeTag::Int32);
            assert_eq!(unsafe { result.read() }.unwrap(), Value::Int32(input));
            unsafe { release(releaser(), result.value) };
        }

        assert!(RELEASED.load(Ordering::SeqCst) >= before + 5);
    }

    #[test]
    fn test_void_result() {
        let result = unsafe {
            invoke(
                trampoline_addr(nothing),
                std::ptr::null(),
                std::ptr::null(),
                0,
            )
        };
        assert!(result.is_void());
        assert!(result.value.is_null());
    }

    #[test]
    fn test_count_passes_through() {
        let args =
            ArgumentList::from_values(&[Value::Bool(true), Value::Void, Value::Float64(1.0)])
                .unwrap();
        let result = unsafe { invoke_args(trampoline_addr(count_args), &args) };
        assert_eq!(unsafe { result.read() }.unwrap(), Value::Int32(3));
        unsafe { release(releaser(), result.value) };
    }

    #[test]
    fn test_check_arguments() {
        let mut n = 1i32;
        let p = &mut n as *mut i32 as *mut c_void;

        assert_eq!(check_arguments(&[], &[]).unwrap(), 0);
        assert_eq!(check_arguments(&[p], &[TypeTag::Int32.to_raw()]).unwrap(), 1);

        assert!(matches!(
            check_arguments(&[p, p], &[TypeTag::Int32.to_raw()]),
            Err(FfiError::ArityMismatch { values: 2, tags: 1 })
        ));
        assert!(matches!(
            check_arguments(&[p], &[TypeTag::Unknown.to_raw()]),
            Err(FfiError::UnsupportedArgType { index: 0, .. })
        ));
        assert!(matches!(
            check_arguments(&[p, p], &[TypeTag::Int32.to_raw(), 99]),
            Err(FfiError::UnsupportedArgType { index: 1, tag: 99 })
        ));
    }

    #[test]
    fn test_invoke_checked_rejects_before_calling() {
        let tags = [TypeTag::Int32.to_raw()];
        let err = unsafe { invoke_checked(trampoline_addr(echo_int32), &[], &tags) };
        assert!(err.is_err());

        let mut n = 9i32;
        let values = [&mut n as *mut i32 as *mut c_void];
        let result =
            unsafe { invoke_checked(trampoline_addr(echo_int32), &values, &tags) }.unwrap();
        assert_eq!(unsafe { result.read() }.unwrap(), Value::Int32(9));
        unsafe { release(releaser(), result.value) };
    }
}
