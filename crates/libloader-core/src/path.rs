//! Path and symbol-name rules.
//!
//! Paths are handled as raw bytes: the loader hands them to the native OS
//! loader as NUL-terminated strings (re-encoded as UTF-16 on Windows) and
//! never interprets them beyond the checks below.

use crate::error::LoaderError;

/// Validate a library path before it is copied and handed to the backend.
///
/// The path must be non-empty and must not contain a NUL byte.
pub fn validate_path(path: &[u8]) -> Result<(), LoaderError> {
    if path.is_empty() || path.contains(&0) {
        return Err(LoaderError::InvalidArgument);
    }
    Ok(())
}

/// Validate an exported symbol name.
pub fn validate_symbol_name(name: &[u8]) -> Result<(), LoaderError> {
    if name.is_empty() || name.contains(&0) {
        return Err(LoaderError::InvalidArgument);
    }
    Ok(())
}

/// Split an AIX decorated path `archive(member)` into its two parts.
///
/// Returns `None` unless the path ends with `)`, both parts are non-empty,
/// and neither part contains another parenthesis.
#[must_use]
pub fn split_archive_member(path: &[u8]) -> Option<(&[u8], &[u8])> {
    let inner = path.strip_suffix(b")")?;
    let open = inner.iter().rposition(|&b| b == b'(')?;
    let (archive, member) = (&inner[..open], &inner[open + 1..]);
    if archive.is_empty()
        || member.is_empty()
        || archive.contains(&b'(')
        || member.contains(&b')')
    {
        return None;
    }
    Some((archive, member))
}

/// Returns `true` if `path` uses the `archive(member)` syntax.
#[inline]
#[must_use]
pub fn is_archive_member(path: &[u8]) -> bool {
    split_archive_member(path).is_some()
}

/// The file whose presence decides between "not found" and "invalid image"
/// after a failed open: the archive for a decorated path, the path otherwise.
#[must_use]
pub fn open_target(path: &[u8]) -> &[u8] {
    match split_archive_member(path) {
        Some((archive, _)) => archive,
        None => path,
    }
}

/// Returns `true` if the native loader will treat `path` as a location on
/// disk rather than a bare name resolved through its search path.
#[must_use]
pub fn has_directory_component(path: &[u8]) -> bool {
    path.iter().any(|&b| b == b'/' || (cfg!(windows) && b == b'\\'))
}

/// Build the AIX shared-object member path used by the system library
/// packaging convention: `<path>(lib<name>.so.<major>)`.
#[must_use]
pub fn aix_member_path(path: &str, lib_name: &str, major: u32) -> String {
    format!("{path}(lib{lib_name}.so.{major})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_path_rejects_empty_and_nul() {
        assert_eq!(validate_path(b""), Err(LoaderError::InvalidArgument));
        assert_eq!(validate_path(b"lib\0x.so"), Err(LoaderError::InvalidArgument));
        assert_eq!(validate_path(b"./libfoo.so"), Ok(()));
    }

    #[test]
    fn validate_symbol_name_rules() {
        assert_eq!(validate_symbol_name(b""), Err(LoaderError::InvalidArgument));
        assert_eq!(validate_symbol_name(b"a\0b"), Err(LoaderError::InvalidArgument));
        assert_eq!(validate_symbol_name(b"free"), Ok(()));
    }

    #[test]
    fn archive_member_split() {
        assert_eq!(
            split_archive_member(b"/usr/lib/libc.a(shr_64.o)"),
            Some((&b"/usr/lib/libc.a"[..], &b"shr_64.o"[..]))
        );
        assert_eq!(split_archive_member(b"/usr/lib/libc.a"), None);
        assert_eq!(split_archive_member(b"(member)"), None);
        assert_eq!(split_archive_member(b"archive()"), None);
        assert_eq!(split_archive_member(b"archive(a(b)"), None);
        assert!(is_archive_member(b"libplugin.a(libplugin.so.0)"));
    }

    #[test]
    fn stray_parentheses_are_not_decorated() {
        for path in [&b"archive(a(b)"[..], b"archive(a)b)", b"dir(x)/lib.a(m)"] {
            assert_eq!(split_archive_member(path), None);
            assert!(!is_archive_member(path));
            assert_eq!(open_target(path), path);
        }
    }

    #[test]
    fn open_target_strips_member() {
        assert_eq!(open_target(b"./liba.a(liba.so.1)"), b"./liba.a");
        assert_eq!(open_target(b"./liba.so"), b"./liba.so");
    }

    #[test]
    fn directory_component_detection() {
        assert!(has_directory_component(b"./libfoo.so"));
        assert!(has_directory_component(b"/usr/lib/libfoo.so"));
        assert!(!has_directory_component(b"libc.so.6"));
    }

    #[test]
    fn aix_member_path_format() {
        assert_eq!(
            aix_member_path("/opt/lib/libsys.a", "sys", 0),
            "/opt/lib/libsys.a(libsys.so.0)"
        );
        let decorated = aix_member_path("./libloader.a", "loader", 3);
        assert_eq!(
            split_archive_member(decorated.as_bytes()),
            Some((&b"./libloader.a"[..], &b"libloader.so.3"[..]))
        );
    }
}
