//! Loader backend identity and capability table.

use crate::error::LoaderError;

/// The closed set of native loader backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// `dlopen`/`dlsym`/`dlclose`/`dlerror`.
    Posix,
    /// `LoadLibraryW`/`GetProcAddress`/`FreeLibrary`.
    Windows,
    /// POSIX interface plus `archive(member)` paths via `RTLD_MEMBER`.
    Aix,
    /// `shl_load`/`shl_findsym`/`shl_unload`.
    Hpux,
}

impl Platform {
    /// Backend selected for the current build target.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "aix") {
            Self::Aix
        } else if cfg!(target_os = "hpux") {
            Self::Hpux
        } else {
            Self::Posix
        }
    }

    /// Whether repeated opens of one path share a counted OS handle.
    #[must_use]
    pub const fn is_ref_counted(self) -> bool {
        !matches!(self, Self::Hpux)
    }

    /// Like [`Platform::is_ref_counted`], but reports platforms where the
    /// answer must not be relied upon.
    pub const fn ref_count_query(self) -> Result<bool, LoaderError> {
        match self {
            Self::Hpux => Err(LoaderError::PlatformUnsupportedOperation),
            other => Ok(other.is_ref_counted()),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Posix => "posix",
            Self::Windows => "windows",
            Self::Aix => "aix",
            Self::Hpux => "hpux",
        }
    }
}
