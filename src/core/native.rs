//! Purpose: Open a resolved library path with the platform's native loader.
//! Exports: `NativeHandle`.
//! Role: Last pipeline stage; the handle is consumed by a separate symbol-binding layer.
//! Invariants: Unix opens with `RTLD_NOW | RTLD_GLOBAL`; Windows uses `LoadLibraryW`.
//! Invariants: Handles are never closed; there is no unload path.

use std::ffi::c_void;
use std::path::Path;

use crate::core::error::{Error, ErrorKind};

/// Process-wide handle to a loaded library.
///
/// Returned once per load and kept for the life of the process. Callers that need
/// lifecycle control must wrap it themselves.
#[derive(Debug)]
pub struct NativeHandle {
    raw: *mut c_void,
}

// The OS loader handle is process-global and valid from any thread.
unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

impl NativeHandle {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let raw = sys::open(path).map_err(|message| {
            Error::new(ErrorKind::Load)
                .with_message(format!("failed to load library: {message}"))
                .with_path(path)
        })?;
        tracing::debug!(path = %path.display(), "opened native library");
        Ok(Self { raw })
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.raw
    }

    pub fn addr(&self) -> usize {
        self.raw as usize
    }
}

#[cfg(unix)]
mod sys {
    use std::ffi::{CStr, CString, c_void};
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;

    pub(super) fn open(path: &Path) -> Result<*mut c_void, String> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| "path contains an interior NUL byte".to_string())?;
        // RTLD_GLOBAL exposes the symbols to modules loaded afterwards.
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };
        if handle.is_null() {
            return Err(last_dl_error());
        }
        Ok(handle)
    }

    fn last_dl_error() -> String {
        let err = unsafe { libc::dlerror() };
        if err.is_null() {
            return "unknown dlopen error".to_string();
        }
        unsafe { CStr::from_ptr(err) }.to_string_lossy().into_owned()
    }
}

#[cfg(windows)]
mod sys {
    use std::ffi::c_void;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;

    unsafe extern "system" {
        fn LoadLibraryW(filename: *const u16) -> *mut c_void;
        fn GetLastError() -> u32;
    }

    pub(super) fn open(path: &Path) -> Result<*mut c_void, String> {
        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };
        if handle.is_null() {
            let code = unsafe { GetLastError() };
            return Err(format!("LoadLibraryW failed (error code: {code})"));
        }
        Ok(handle)
    }
}
