//! Allocator indirection.
//!
//! Every allocation made by this crate goes through the process-wide
//! [`MemVTable`]. The default entries are the platform C allocator; a test
//! harness may install one override at a time to inject allocation failures.
//!
//! Installing is an acquisition: [`install`] returns a [`VTableGuard`] that
//! restores the default allocator when dropped. [`set_vtable`] and
//! [`restore_vtable`] are the unscoped pair used by the C ABI.
//!
//! The override must not be swapped while loader operations are running on
//! other threads: memory is always released through the entry that is active
//! at release time.

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_void};
use std::fmt;
use std::mem::{align_of, size_of};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use libloader_core::LoaderError;
use parking_lot::RwLock;

/// `allocate(size) -> pointer-or-null`.
pub type AllocFn = unsafe extern "C" fn(usize) -> *mut c_void;
/// `reallocate(pointer, size) -> pointer-or-null`; must accept a null pointer
/// (behaving as allocate) and a zero size.
pub type ReallocFn = unsafe extern "C" fn(*mut c_void, usize) -> *mut c_void;
/// `free(pointer)`; must accept a null pointer.
pub type FreeFn = unsafe extern "C" fn(*mut c_void);

/// Strictest alignment this crate requests from an allocator entry. Every
/// `malloc`-compatible allocator satisfies it.
pub const MIN_ALIGN: usize = 2 * size_of::<usize>();

/// Allocate/reallocate/free triple.
#[derive(Clone, Copy)]
pub struct MemVTable {
    pub malloc: AllocFn,
    pub realloc: ReallocFn,
    pub free: FreeFn,
}

impl MemVTable {
    /// The platform C allocator.
    #[must_use]
    pub const fn system() -> Self {
        Self {
            malloc: libc::malloc,
            realloc: libc::realloc,
            free: libc::free,
        }
    }

    /// An allocator whose allocate and reallocate entries always return null
    /// and whose free entry ignores its argument. Used to drive
    /// out-of-memory paths deterministically.
    #[must_use]
    pub const fn failing() -> Self {
        Self {
            malloc: failing_malloc,
            realloc: failing_realloc,
            free: ignoring_free,
        }
    }
}

impl fmt::Debug for MemVTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemVTable")
            .field("malloc", &(self.malloc as *const c_void))
            .field("realloc", &(self.realloc as *const c_void))
            .field("free", &(self.free as *const c_void))
            .finish()
    }
}

extern "C" fn failing_malloc(_size: usize) -> *mut c_void {
    std::ptr::null_mut()
}

extern "C" fn failing_realloc(_ptr: *mut c_void, _size: usize) -> *mut c_void {
    std::ptr::null_mut()
}

extern "C" fn ignoring_free(_ptr: *mut c_void) {}

static OVERRIDE: RwLock<Option<MemVTable>> = parking_lot::const_rwlock(None);

/// Snapshot of the active entries. The lock is released before any entry is
/// called, so an installed allocator may itself call back into this module.
#[inline]
fn active() -> MemVTable {
    (*OVERRIDE.read()).unwrap_or(MemVTable::system())
}

/// Install `vtable` as the process-wide allocator.
///
/// All three entries are replaced together. Returns `false` and leaves the
/// current state untouched if an override is already installed.
pub fn set_vtable(vtable: MemVTable) -> bool {
    let mut slot = OVERRIDE.write();
    if slot.is_some() {
        return false;
    }
    *slot = Some(vtable);
    true
}

/// Revert to the platform C allocator. Safe to call with no override active.
pub fn restore_vtable() {
    *OVERRIDE.write() = None;
}

/// Returns `true` while an override is installed.
#[must_use]
pub fn is_overridden() -> bool {
    OVERRIDE.read().is_some()
}

/// Install `vtable` for the lifetime of the returned guard.
pub fn install(vtable: MemVTable) -> Result<VTableGuard, LoaderError> {
    if set_vtable(vtable) {
        Ok(VTableGuard { _private: () })
    } else {
        Err(LoaderError::AllocatorBusy)
    }
}

/// Restores the default allocator on drop.
#[must_use = "the override is removed as soon as the guard is dropped"]
#[derive(Debug)]
pub struct VTableGuard {
    _private: (),
}

impl Drop for VTableGuard {
    fn drop(&mut self) {
        restore_vtable();
    }
}

/// Allocate `size` bytes through the active entry. May return null.
#[must_use]
pub fn malloc(size: usize) -> *mut c_void {
    // SAFETY: allocate entries accept any size and report failure as null.
    unsafe { (active().malloc)(size) }
}

/// Allocate `size` zeroed bytes. May return null.
#[must_use]
pub fn malloc0(size: usize) -> *mut c_void {
    let ptr = malloc(size);
    if !ptr.is_null() {
        // SAFETY: `ptr` is a fresh allocation of at least `size` bytes.
        unsafe { std::ptr::write_bytes(ptr.cast::<u8>(), 0, size) };
    }
    ptr
}

/// Resize a block through the active entry. May return null, in which case
/// `ptr` is left untouched.
///
/// # Safety
///
/// `ptr` must be null or a live block obtained from this module under the
/// same active allocator.
#[must_use]
pub unsafe fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    // SAFETY: caller contract.
    unsafe { (active().realloc)(ptr, size) }
}

/// Release a block through the active entry. Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or a live block obtained from this module under the
/// same active allocator, and must not be used afterwards.
pub unsafe fn free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    // SAFETY: caller contract.
    unsafe { (active().free)(ptr) }
}

// ---------------------------------------------------------------------------
// MemString
// ---------------------------------------------------------------------------

/// NUL-terminated byte string owned by the active allocator.
pub struct MemString {
    ptr: NonNull<c_char>,
    len: usize,
}

// SAFETY: the buffer is uniquely owned and carries no thread affinity.
unsafe impl Send for MemString {}
// SAFETY: shared access is read-only.
unsafe impl Sync for MemString {}

impl MemString {
    /// Copy `bytes` and append a NUL terminator.
    ///
    /// Fails with `InvalidArgument` if `bytes` contains a NUL byte and with
    /// `AllocationFailure` if the allocator returns null.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoaderError> {
        if bytes.contains(&0) {
            return Err(LoaderError::InvalidArgument);
        }
        let len = bytes.len();
        let total = len.checked_add(1).ok_or(LoaderError::AllocationFailure)?;
        let raw = malloc(total).cast::<c_char>();
        let ptr = NonNull::new(raw).ok_or(LoaderError::AllocationFailure)?;
        // SAFETY: `ptr` has room for `len + 1` bytes and does not overlap `bytes`.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr().cast::<u8>(), len);
            *ptr.as_ptr().add(len) = 0;
        }
        Ok(Self { ptr, len })
    }

    /// Copy a C string.
    pub fn from_c_str(s: &CStr) -> Result<Self, LoaderError> {
        Self::from_bytes(s.to_bytes())
    }

    #[must_use]
    pub fn as_c_str(&self) -> &CStr {
        // SAFETY: `ptr` holds `len` non-NUL bytes followed by a NUL.
        unsafe { CStr::from_bytes_with_nul_unchecked(self.as_bytes_with_nul()) }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` bytes for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().cast::<u8>(), self.len) }
    }

    fn as_bytes_with_nul(&self) -> &[u8] {
        // SAFETY: the terminator sits at `len`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().cast::<u8>(), self.len + 1) }
    }

    #[must_use]
    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hand the buffer to a C caller, who releases it with [`free`].
    #[must_use]
    pub fn into_raw(self) -> *mut c_char {
        let ptr = self.ptr.as_ptr();
        std::mem::forget(self);
        ptr
    }

    /// Retake ownership of a buffer produced by [`MemString::into_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from `into_raw` and not have been freed.
    pub unsafe fn from_raw(ptr: *mut c_char) -> Option<Self> {
        let ptr = NonNull::new(ptr)?;
        // SAFETY: caller contract guarantees a NUL-terminated buffer.
        let len = unsafe { CStr::from_ptr(ptr.as_ptr()) }.to_bytes().len();
        Some(Self { ptr, len })
    }
}

impl Drop for MemString {
    fn drop(&mut self) {
        // SAFETY: the buffer came from `malloc` and is released exactly once.
        unsafe { free(self.ptr.as_ptr().cast::<c_void>()) };
    }
}

impl fmt::Debug for MemString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_c_str(), f)
    }
}

impl fmt::Display for MemString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

// ---------------------------------------------------------------------------
// MemWideString
// ---------------------------------------------------------------------------

/// NUL-terminated UTF-16 string owned by the active allocator, for wide
/// native APIs.
pub struct MemWideString {
    ptr: NonNull<u16>,
    len: usize,
}

// SAFETY: the buffer is uniquely owned and carries no thread affinity.
unsafe impl Send for MemWideString {}
// SAFETY: shared access is read-only.
unsafe impl Sync for MemWideString {}

impl MemWideString {
    /// Re-encode UTF-8 `bytes` as UTF-16 and append a NUL terminator.
    ///
    /// Fails with `InvalidArgument` for invalid UTF-8 or an interior NUL and
    /// with `AllocationFailure` if the allocator returns null.
    pub fn from_utf8(bytes: &[u8]) -> Result<Self, LoaderError> {
        let text = std::str::from_utf8(bytes).map_err(|_| LoaderError::InvalidArgument)?;
        if text.contains('\0') {
            return Err(LoaderError::InvalidArgument);
        }
        let len = text.encode_utf16().count();
        let total = len
            .checked_add(1)
            .and_then(|n| n.checked_mul(size_of::<u16>()))
            .ok_or(LoaderError::AllocationFailure)?;
        let ptr = NonNull::new(malloc(total).cast::<u16>()).ok_or(LoaderError::AllocationFailure)?;
        // SAFETY: `ptr` has room for `len + 1` units; `encode_utf16` yields
        // exactly `len` of them.
        unsafe {
            for (i, unit) in text.encode_utf16().enumerate() {
                ptr.as_ptr().add(i).write(unit);
            }
            ptr.as_ptr().add(len).write(0);
        }
        Ok(Self { ptr, len })
    }

    /// Pointer to the NUL-terminated buffer.
    #[must_use]
    pub fn as_ptr(&self) -> *const u16 {
        self.ptr.as_ptr()
    }

    /// The code units, without the terminator.
    #[must_use]
    pub fn as_units(&self) -> &[u16] {
        // SAFETY: `ptr` is valid for `len` units for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MemWideString {
    fn drop(&mut self) {
        // SAFETY: the buffer came from `malloc` and is released exactly once.
        unsafe { free(self.ptr.as_ptr().cast::<c_void>()) };
    }
}

impl fmt::Debug for MemWideString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&String::from_utf16_lossy(self.as_units()), f)
    }
}

// ---------------------------------------------------------------------------
// MemBox
// ---------------------------------------------------------------------------

/// A single value stored in memory from the active allocator.
pub struct MemBox<T> {
    ptr: NonNull<T>,
}

// SAFETY: ownership semantics match `Box<T>`.
unsafe impl<T: Send> Send for MemBox<T> {}
// SAFETY: ownership semantics match `Box<T>`.
unsafe impl<T: Sync> Sync for MemBox<T> {}

impl<T> MemBox<T> {
    /// Move `value` into a fresh allocation. On allocation failure `value` is
    /// dropped and `AllocationFailure` is returned.
    pub fn try_new(value: T) -> Result<Self, LoaderError> {
        const { assert!(align_of::<T>() <= MIN_ALIGN) };
        let raw = malloc(size_of::<T>().max(1)).cast::<T>();
        let ptr = NonNull::new(raw).ok_or(LoaderError::AllocationFailure)?;
        // SAFETY: `ptr` is a fresh, suitably sized and aligned allocation.
        unsafe { ptr.as_ptr().write(value) };
        Ok(Self { ptr })
    }

    #[must_use]
    pub fn into_raw(self) -> *mut T {
        let ptr = self.ptr.as_ptr();
        std::mem::forget(self);
        ptr
    }

    /// # Safety
    ///
    /// `ptr` must come from [`MemBox::into_raw`] and not have been reclaimed.
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Self { ptr }
    }
}

impl<T> Deref for MemBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: `ptr` holds an initialized `T` for the lifetime of `self`.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T> DerefMut for MemBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: `self` owns the value exclusively.
        unsafe { self.ptr.as_mut() }
    }
}

impl<T> Drop for MemBox<T> {
    fn drop(&mut self) {
        // SAFETY: the value is initialized and dropped exactly once, then its
        // storage is returned to the allocator.
        unsafe {
            std::ptr::drop_in_place(self.ptr.as_ptr());
            free(self.ptr.as_ptr().cast::<c_void>());
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MemBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::TEST_LOCK;

    static COUNTING_ALLOCS: AtomicUsize = AtomicUsize::new(0);
    static COUNTING_FREES: AtomicUsize = AtomicUsize::new(0);

    unsafe extern "C" fn counting_malloc(size: usize) -> *mut c_void {
        COUNTING_ALLOCS.fetch_add(1, Ordering::SeqCst);
        unsafe { libc::malloc(size) }
    }

    unsafe extern "C" fn counting_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
        unsafe { libc::realloc(ptr, size) }
    }

    unsafe extern "C" fn counting_free(ptr: *mut c_void) {
        if !ptr.is_null() {
            COUNTING_FREES.fetch_add(1, Ordering::SeqCst);
        }
        unsafe { libc::free(ptr) }
    }

    fn counting() -> MemVTable {
        MemVTable {
            malloc: counting_malloc,
            realloc: counting_realloc,
            free: counting_free,
        }
    }

    #[test]
    fn default_allocator_round_trip() {
        let _lock = TEST_LOCK.lock();
        let p = malloc(32);
        assert!(!p.is_null());
        // SAFETY: `p` is a live 32-byte block from this module.
        let p = unsafe { realloc(p, 128) };
        assert!(!p.is_null());
        unsafe { free(p) };
    }

    #[test]
    fn realloc_null_behaves_as_malloc() {
        let _lock = TEST_LOCK.lock();
        let p = unsafe { realloc(std::ptr::null_mut(), 16) };
        assert!(!p.is_null());
        unsafe { free(p) };
    }

    #[test]
    fn free_null_is_noop() {
        let _lock = TEST_LOCK.lock();
        unsafe {
            free(std::ptr::null_mut());
            free(std::ptr::null_mut());
        }
    }

    #[test]
    fn malloc0_zeroes() {
        let _lock = TEST_LOCK.lock();
        let p = malloc0(64).cast::<u8>();
        assert!(!p.is_null());
        let bytes = unsafe { std::slice::from_raw_parts(p, 64) };
        assert!(bytes.iter().all(|&b| b == 0));
        unsafe { free(p.cast()) };
    }

    #[test]
    fn second_override_is_rejected() {
        let _lock = TEST_LOCK.lock();
        assert!(set_vtable(MemVTable::failing()));
        assert!(is_overridden());
        assert!(!set_vtable(counting()));
        // The first override is still the active one.
        assert!(malloc(8).is_null());
        restore_vtable();
        assert!(!is_overridden());
    }

    #[test]
    fn restore_is_idempotent() {
        let _lock = TEST_LOCK.lock();
        restore_vtable();
        restore_vtable();
        assert!(!is_overridden());
        let p = malloc(8);
        assert!(!p.is_null());
        unsafe { free(p) };
    }

    #[test]
    fn guard_restores_on_drop() {
        let _lock = TEST_LOCK.lock();
        {
            let _guard = install(MemVTable::failing()).unwrap();
            assert!(malloc(1).is_null());
            assert_eq!(install(counting()).unwrap_err(), LoaderError::AllocatorBusy);
        }
        assert!(!is_overridden());
        let p = malloc(1);
        assert!(!p.is_null());
        unsafe { free(p) };
    }

    #[test]
    fn failing_allocator_surfaces_as_allocation_failure() {
        let _lock = TEST_LOCK.lock();
        let _guard = install(MemVTable::failing()).unwrap();
        assert_eq!(
            MemString::from_bytes(b"hello").unwrap_err(),
            LoaderError::AllocationFailure
        );
        assert_eq!(MemBox::try_new(7_u64).unwrap_err(), LoaderError::AllocationFailure);
        assert!(malloc0(16).is_null());
    }

    #[test]
    fn mem_string_goes_through_override() {
        let _lock = TEST_LOCK.lock();
        let allocs = COUNTING_ALLOCS.load(Ordering::SeqCst);
        let frees = COUNTING_FREES.load(Ordering::SeqCst);
        {
            let _guard = install(counting()).unwrap();
            let s = MemString::from_bytes(b"libfoo.so").unwrap();
            assert_eq!(s.as_bytes(), b"libfoo.so");
            assert_eq!(s.as_c_str().to_bytes_with_nul(), b"libfoo.so\0");
            assert_eq!(s.len(), 9);
        }
        assert_eq!(COUNTING_ALLOCS.load(Ordering::SeqCst), allocs + 1);
        assert_eq!(COUNTING_FREES.load(Ordering::SeqCst), frees + 1);
    }

    #[test]
    fn mem_string_rejects_interior_nul() {
        let _lock = TEST_LOCK.lock();
        assert_eq!(
            MemString::from_bytes(b"a\0b").unwrap_err(),
            LoaderError::InvalidArgument
        );
    }

    #[test]
    fn mem_string_raw_round_trip_preserves_text() {
        let _lock = TEST_LOCK.lock();
        let raw = MemString::from_bytes(b"undefined symbol").unwrap().into_raw();
        let back = unsafe { MemString::from_raw(raw) }.unwrap();
        assert_eq!(back.to_string_lossy(), "undefined symbol");
        assert!(unsafe { MemString::from_raw(std::ptr::null_mut()) }.is_none());
    }

    #[test]
    fn wide_string_encodes_non_ascii() {
        let _lock = TEST_LOCK.lock();
        let wide = MemWideString::from_utf8("C:\\tmp\\biblioth\u{e8}que.dll".as_bytes()).unwrap();
        let expected: Vec<u16> = "C:\\tmp\\biblioth\u{e8}que.dll".encode_utf16().collect();
        assert_eq!(wide.as_units(), &expected[..]);
        assert!(wide.as_units().contains(&0x00e8));
        // SAFETY: the terminator sits right after the units.
        assert_eq!(unsafe { *wide.as_ptr().add(expected.len()) }, 0);
    }

    #[test]
    fn wide_string_rejects_bad_input_and_reports_oom() {
        let _lock = TEST_LOCK.lock();
        assert_eq!(
            MemWideString::from_utf8(b"\xc3(").unwrap_err(),
            LoaderError::InvalidArgument
        );
        assert_eq!(
            MemWideString::from_utf8(b"a\0b").unwrap_err(),
            LoaderError::InvalidArgument
        );
        let _guard = install(MemVTable::failing()).unwrap();
        assert_eq!(
            MemWideString::from_utf8(b"lib.dll").unwrap_err(),
            LoaderError::AllocationFailure
        );
    }

    #[test]
    fn mem_box_drops_contents() {
        let _lock = TEST_LOCK.lock();
        let frees = COUNTING_FREES.load(Ordering::SeqCst);
        {
            let _guard = install(counting()).unwrap();
            let mut b = MemBox::try_new(MemString::from_bytes(b"x").unwrap()).unwrap();
            assert_eq!(b.as_bytes(), b"x");
            *b = MemString::from_bytes(b"yz").unwrap();
            assert_eq!(b.len(), 2);
        }
        // "x" on reassignment, then "yz" and the box itself.
        assert_eq!(COUNTING_FREES.load(Ordering::SeqCst), frees + 3);
    }
}
