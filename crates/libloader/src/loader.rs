//! The loader handle.
//!
//! A [`LibraryLoader`] owns one native OS handle together with a copy of the
//! path it was opened from and the handle's latest diagnostic. All three, and
//! the handle structure itself, live in memory from the active allocator.
//!
//! # Reference counting
//!
//! On ref-counted backends every handle owns one reference of the OS-level
//! mapping: opening the same path twice yields two handles that resolve the
//! same addresses, closing one leaves the other fully usable, and only the
//! last close unmaps the image. HP-UX hands out independent handles.

use std::ffi::{CStr, c_void};
use std::path::Path;
use std::ptr::NonNull;

use libloader_core::{LoaderError, Platform, path};

use crate::backend::{self, NativeHandle};
use crate::diag::Diagnostic;
use crate::mem::{MemBox, MemString};

/// Handle state as laid out in allocator memory. Opaque outside this crate;
/// C callers see it only as a pointer.
pub struct LoaderState {
    native: Option<NativeHandle>,
    source_path: MemString,
    last_error: Diagnostic,
}

// SAFETY: OS loader handles are process-wide and not tied to a thread.
unsafe impl Send for LoaderState {}

impl Drop for LoaderState {
    fn drop(&mut self) {
        if let Some(native) = self.native.take() {
            // SAFETY: `native` came from a successful open and is closed once.
            unsafe { backend::close(native) };
        }
    }
}

/// A resolved, non-null exported address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol {
    addr: NonNull<c_void>,
}

impl Symbol {
    #[must_use]
    pub fn as_ptr(self) -> *mut c_void {
        self.addr.as_ptr()
    }

    /// Reinterpret the address as a function pointer type `F`.
    ///
    /// # Safety
    ///
    /// `F` must be a function pointer type matching the export's real
    /// signature and ABI, and the library must stay loaded while it is used.
    #[must_use]
    pub unsafe fn cast_fn<F: Copy>(self) -> F {
        const { assert!(size_of::<F>() == size_of::<*mut c_void>()) };
        // SAFETY: sizes match; validity is the caller's contract.
        unsafe { std::mem::transmute_copy(&self.addr.as_ptr()) }
    }
}

/// A loaded shared library.
#[derive(Debug)]
pub struct LibraryLoader {
    state: MemBox<LoaderState>,
}

impl std::fmt::Debug for LoaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderState")
            .field("native", &self.native)
            .field("source_path", &self.source_path)
            .field("last_error", &self.last_error.peek())
            .finish()
    }
}

impl LibraryLoader {
    /// Load the shared library at `path`.
    ///
    /// Bare names are resolved through the native loader's search rules. On
    /// AIX, `archive(member)` paths are accepted.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument`: empty path, interior NUL, or a path the platform
    ///   loader cannot express.
    /// - `AllocationFailure`: the active allocator returned null; the native
    ///   loader is not called in that case.
    /// - `NotFound` / `InvalidImage`: the native loader refused the path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        Self::from_bytes(path_bytes(path.as_ref())?)
    }

    /// Load from a C string path.
    pub fn from_c_str(path: &CStr) -> Result<Self, LoaderError> {
        Self::from_bytes(path.to_bytes())
    }

    /// Load from raw path bytes (no trailing NUL).
    pub fn from_bytes(path: &[u8]) -> Result<Self, LoaderError> {
        path::validate_path(path)?;

        let source_path = MemString::from_bytes(path)?;
        let mut state = MemBox::try_new(LoaderState {
            native: None,
            source_path,
            last_error: Diagnostic::default(),
        })?;

        // SAFETY: the path is NUL-terminated; loading is what the caller asked for.
        match unsafe { backend::open(state.source_path.as_c_str()) }? {
            Some(native) => {
                state.native = Some(native);
                Ok(Self { state })
            }
            None => {
                // Consume the thread-local loader error; there is no handle to
                // attach it to.
                drop(backend::diagnostic());
                Err(classify_open_failure(path))
            }
        }
    }

    /// Load `path`, and on AIX retry a failed plain path as the archive
    /// member `"<path>(lib<lib_name>.so.<major>)"`.
    ///
    /// Other backends return the plain result unchanged.
    pub fn with_aix_member_fallback(
        path: &str,
        lib_name: &str,
        major: u32,
    ) -> Result<Self, LoaderError> {
        let retry =
            backend::PLATFORM == Platform::Aix && !path::is_archive_member(path.as_bytes());
        match Self::new(path) {
            Err(_) if retry => Self::new(path::aix_member_path(path, lib_name, major)),
            other => other,
        }
    }

    /// Resolve the exported symbol `name`.
    ///
    /// On a miss the handle's diagnostic is replaced with the backend's
    /// description of the failure. An empty name is rejected without
    /// touching the diagnostic.
    pub fn get_symbol(&mut self, name: &CStr) -> Result<Symbol, LoaderError> {
        path::validate_symbol_name(name.to_bytes())?;
        let native = self.state.native.ok_or(LoaderError::InvalidArgument)?;

        // SAFETY: `native` is live for as long as `self`.
        match unsafe { backend::symbol(native, name) } {
            Some(addr) => Ok(Symbol { addr }),
            None => {
                self.state
                    .last_error
                    .record_failure(LoaderError::SymbolNotFound);
                Err(LoaderError::SymbolNotFound)
            }
        }
    }

    /// A fresh, caller-owned copy of the latest diagnostic, or `None` if no
    /// operation on this handle has failed (or the copy could not be
    /// allocated).
    #[must_use]
    pub fn last_error(&self) -> Option<MemString> {
        self.state.last_error.copy_out()
    }

    /// The path this handle was opened from.
    #[must_use]
    pub fn source_path(&self) -> &CStr {
        self.state.source_path.as_c_str()
    }

    /// True while the handle owns a native OS handle; always the case for a
    /// handle obtained from a successful open.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state.native.is_some()
    }

    /// Whether the compiled backend reference-counts repeated opens.
    #[must_use]
    pub const fn is_ref_counted() -> bool {
        backend::IS_REF_COUNTED
    }

    /// The compiled backend.
    #[must_use]
    pub const fn platform() -> Platform {
        backend::PLATFORM
    }

    /// Close the native handle and release all owned memory.
    pub fn close(self) {
        drop(self);
    }

    /// Transfer ownership to a C caller.
    #[must_use]
    pub fn into_raw(self) -> *mut LoaderState {
        self.state.into_raw()
    }

    /// Retake ownership of a handle produced by [`LibraryLoader::into_raw`].
    ///
    /// # Safety
    ///
    /// `ptr` must come from `into_raw` and must not have been reclaimed.
    pub unsafe fn from_raw(ptr: NonNull<LoaderState>) -> Self {
        Self {
            // SAFETY: forwarded caller contract.
            state: unsafe { MemBox::from_raw(ptr) },
        }
    }
}

/// Decide between `NotFound` and `InvalidImage` for a path the native loader
/// refused. Anything present on disk (a directory included) is an invalid
/// image. For decorated AIX paths only the archive part is checked.
fn classify_open_failure(path: &[u8]) -> LoaderError {
    let target = path::open_target(path);
    let on_disk = cfg!(windows) || path::has_directory_component(target);
    if on_disk && target_exists(target) {
        LoaderError::InvalidImage
    } else {
        LoaderError::NotFound
    }
}

#[cfg(unix)]
fn path_bytes(path: &Path) -> Result<&[u8], LoaderError> {
    use std::os::unix::ffi::OsStrExt;
    Ok(path.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(path: &Path) -> Result<&[u8], LoaderError> {
    path.to_str()
        .map(str::as_bytes)
        .ok_or(LoaderError::InvalidArgument)
}

#[cfg(unix)]
fn target_exists(bytes: &[u8]) -> bool {
    use std::os::unix::ffi::OsStrExt;
    Path::new(std::ffi::OsStr::from_bytes(bytes)).exists()
}

#[cfg(not(unix))]
fn target_exists(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes).is_ok_and(|s| Path::new(s).exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TEST_LOCK;

    fn temp_file(tag: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "libloader-unit-{tag}-{}.so",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn empty_path_is_invalid_argument() {
        let _lock = TEST_LOCK.lock();
        assert_eq!(
            LibraryLoader::from_bytes(b"").unwrap_err(),
            LoaderError::InvalidArgument
        );
    }

    #[test]
    fn missing_file_is_not_found() {
        let _lock = TEST_LOCK.lock();
        assert_eq!(
            LibraryLoader::new("./unexistent_file.nofile").unwrap_err(),
            LoaderError::NotFound
        );
    }

    #[test]
    fn text_file_is_invalid_image() {
        let _lock = TEST_LOCK.lock();
        let path = temp_file("text", b"this is not a shared object\n");
        assert_eq!(
            LibraryLoader::new(&path).unwrap_err(),
            LoaderError::InvalidImage
        );
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn existing_directory_is_invalid_image() {
        let _lock = TEST_LOCK.lock();
        let dir = std::env::temp_dir().join(format!("libloader-unit-dir-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        assert_eq!(
            LibraryLoader::new(&dir).unwrap_err(),
            LoaderError::InvalidImage
        );
        std::fs::remove_dir(&dir).unwrap();
        assert_eq!(
            LibraryLoader::new(&dir).unwrap_err(),
            LoaderError::NotFound
        );
    }

    #[test]
    fn classify_uses_archive_part() {
        let path = temp_file("archive", b"");
        let decorated = format!("{}(libx.so.1)", path.display());
        assert_eq!(
            classify_open_failure(decorated.as_bytes()),
            LoaderError::InvalidImage
        );
        std::fs::remove_file(&path).unwrap();
        assert_eq!(
            classify_open_failure(decorated.as_bytes()),
            LoaderError::NotFound
        );
    }

    #[cfg(unix)]
    #[test]
    fn bare_name_failure_is_not_found() {
        assert_eq!(
            classify_open_failure(b"libdefinitely-not-installed.so.42"),
            LoaderError::NotFound
        );
    }

    #[test]
    fn capability_matches_platform() {
        assert_eq!(
            LibraryLoader::is_ref_counted(),
            LibraryLoader::platform().is_ref_counted()
        );
    }
}
