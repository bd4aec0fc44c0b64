//! ABI layer for the allocator indirection.

use std::ffi::c_void;

use libloader::mem::{self, AllocFn, FreeFn, MemVTable, ReallocFn};

/// C layout of an allocator table. Every entry must be present.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawMemVTable {
    pub malloc: Option<AllocFn>,
    pub realloc: Option<ReallocFn>,
    pub free: Option<FreeFn>,
}

impl RawMemVTable {
    /// The table as a complete [`MemVTable`], or `None` if any entry is null.
    #[must_use]
    pub fn complete(&self) -> Option<MemVTable> {
        Some(MemVTable {
            malloc: self.malloc?,
            realloc: self.realloc?,
            free: self.free?,
        })
    }
}

/// Install `table` as the process-wide allocator.
///
/// Returns `false` for a null table, a table with a missing entry, or when an
/// override is already installed. Nothing is changed on failure.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn libloader_mem_set_vtable(table: *const RawMemVTable) -> bool {
    // SAFETY: non-null table from a C caller points at a readable struct.
    let Some(table) = (unsafe { table.as_ref() }) else {
        return false;
    };
    match table.complete() {
        Some(vtable) => mem::set_vtable(vtable),
        None => false,
    }
}

/// Revert to the platform allocator. Idempotent.
#[unsafe(no_mangle)]
pub extern "C" fn libloader_mem_restore_vtable() {
    mem::restore_vtable();
}

#[unsafe(no_mangle)]
pub extern "C" fn libloader_mem_malloc(size: usize) -> *mut c_void {
    mem::malloc(size)
}

/// Zero-initialized allocation.
#[unsafe(no_mangle)]
pub extern "C" fn libloader_mem_malloc0(size: usize) -> *mut c_void {
    mem::malloc0(size)
}

/// `realloc` through the active allocator; null `ptr` allocates.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn libloader_mem_realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    // SAFETY: forwarded caller contract.
    unsafe { mem::realloc(ptr, size) }
}

/// Release memory from this allocator, including strings returned by
/// `libloader_get_last_error`. Null is a no-op.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn libloader_mem_free(ptr: *mut c_void) {
    // SAFETY: forwarded caller contract.
    unsafe { mem::free(ptr) }
}
