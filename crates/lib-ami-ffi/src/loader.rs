//! Dynamic library loading for AMI models.
//!
//! Opening a shared object goes through the [`DynamicLoader`] trait so the
//! bridge can be driven by a test double; [`LibloadingLoader`] is the real
//! implementation. Loaded libraries are cached in a [`LibraryRegistry`]
//! owned by the caller.

use crate::error::{AmiError, AmiResult, BoxError};
use lib_ibis::parse_param_values;
use lib_types::resolved::ResolvedParameters;
use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::ffi::{c_char, c_double, c_void, CString};
use std::os::raw::c_long;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub const INIT_SYMBOL: &str = "AMI_Init";
pub const GETWAVE_SYMBOL: &str = "AMI_GetWave";
pub const CLOSE_SYMBOL: &str = "AMI_Close";
pub const RESOLVE_SYMBOL: &str = "AMI_Resolve";

/// Function signature for AMI_Init.
///
/// ```c
/// long AMI_Init(
///     double *impulse_matrix,
///     long    row_size,
///     long    aggressors,
///     double  sample_interval,
///     double  bit_time,
///     char   *AMI_parameters_in,
///     char  **AMI_parameters_out,
///     void  **AMI_memory_handle,
///     char  **msg
/// );
/// ```
pub type AmiInitFn = unsafe extern "C" fn(
    impulse_matrix: *mut c_double,
    row_size: c_long,
    aggressors: c_long,
    sample_interval: c_double,
    bit_time: c_double,
    ami_parameters_in: *const c_char,
    ami_parameters_out: *mut *mut c_char,
    ami_memory_handle: *mut *mut c_void,
    msg: *mut *mut c_char,
) -> c_long;

/// Function signature for AMI_GetWave.
///
/// ```c
/// long AMI_GetWave(
///     double *wave,
///     long    wave_size,
///     double *clock_times,
///     char  **AMI_parameters_out,
///     void   *AMI_memory_handle
/// );
/// ```
pub type AmiGetWaveFn = unsafe extern "C" fn(
    wave: *mut c_double,
    wave_size: c_long,
    clock_times: *mut c_double,
    ami_parameters_out: *mut *mut c_char,
    ami_memory_handle: *mut c_void,
) -> c_long;

/// Function signature for AMI_Close.
///
/// ```c
/// long AMI_Close(void *AMI_memory_handle);
/// ```
pub type AmiCloseFn = unsafe extern "C" fn(ami_memory_handle: *mut c_void) -> c_long;

/// Function signature for the optional AMI_Resolve.
///
/// ```c
/// long AMI_Resolve(char *AMI_parameters_in, char **AMI_parameters_out, char **msg);
/// ```
pub type AmiResolveFn = unsafe extern "C" fn(
    ami_parameters_in: *const c_char,
    ami_parameters_out: *mut *mut c_char,
    msg: *mut *mut c_char,
) -> c_long;

/// An opened shared object.
pub trait SharedObject: Send + Sync {
    /// Address of an exported symbol, or `None` if it is not exported.
    fn symbol(&self, name: &str) -> Option<*const c_void>;
}

/// Opens shared objects by path.
pub trait DynamicLoader {
    /// Key under which a library is cached.
    fn canonicalize(&self, path: &Path) -> std::io::Result<PathBuf> {
        std::fs::canonicalize(path)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn SharedObject>, BoxError>;
}

/// Loads `.dll`/`.so`/`.dylib` files through `libloading`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LibloadingLoader;

struct LoadedLibrary(Library);

impl SharedObject for LoadedLibrary {
    fn symbol(&self, name: &str) -> Option<*const c_void> {
        let mut bytes = Vec::with_capacity(name.len() + 1);
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(0);
        let sym: Symbol<*mut c_void> = unsafe { self.0.get(&bytes) }.ok()?;
        let addr = *sym;
        (!addr.is_null()).then_some(addr as *const c_void)
    }
}

impl DynamicLoader for LibloadingLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn SharedObject>, BoxError> {
        // Running a vendor library's initializers is inherently unsafe.
        let library = unsafe { Library::new(path) }?;
        Ok(Box::new(LoadedLibrary(library)))
    }
}

/// Lock a mutex, taking the data back from a poisoned lock.
///
/// A panic while holding one of the bridge's locks never leaves the
/// protected state half-written, so continuing is sound.
pub(crate) fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovering poisoned lock");
        poisoned.into_inner()
    })
}

/// Read a NUL-terminated string owned by native code.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of this call.
pub(crate) unsafe fn read_c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(
        std::ffi::CStr::from_ptr(ptr)
            .to_string_lossy()
            .into_owned(),
    )
}

/// Parse parameter text handed back by a model.
///
/// Malformed output is logged and dropped; the raw text is still returned
/// to the caller alongside.
pub(crate) fn parse_model_output(text: Option<&str>, model: &Path) -> ResolvedParameters {
    match text.map(str::trim) {
        None | Some("") => ResolvedParameters::default(),
        Some(text) => parse_param_values(text).unwrap_or_else(|e| {
            tracing::warn!(model = %model.display(), error = %e, "Unparseable model output parameters");
            ResolvedParameters::default()
        }),
    }
}

/// Encode parameters as the NUL-terminated text a model reads.
pub(crate) fn encode_params(params: &ResolvedParameters) -> AmiResult<CString> {
    if let Some(path) = params.find_unquotable() {
        return Err(AmiError::InvalidParameter {
            name: path.to_string(),
            reason: "string value contains a double quote".into(),
        });
    }
    CString::new(params.to_ami_string()).map_err(|_| AmiError::InvalidParameter {
        name: params.root().to_string(),
        reason: "parameter text contains a NUL byte".into(),
    })
}

/// Output of a successful AMI_Resolve.
#[derive(Clone, Debug, Default)]
pub struct ResolveOutput {
    pub params_out: ResolvedParameters,
    pub params_out_text: Option<String>,
    pub message: Option<String>,
}

/// Loaded AMI library with extracted function pointers.
pub struct AmiLibrary {
    path: PathBuf,
    ami_init: AmiInitFn,
    ami_getwave: AmiGetWaveFn,
    ami_close: AmiCloseFn,
    ami_resolve: Option<AmiResolveFn>,

    /// Serializes native calls until the model declares itself reentrant.
    call_lock: Mutex<()>,
    reentrant: AtomicBool,

    /// Keeps the code behind the function pointers mapped. Dropped last.
    _object: Box<dyn SharedObject>,
}

impl AmiLibrary {
    /// Open a library and resolve its entry points. Not cached; use a
    /// [`LibraryRegistry`] to share one load between callers.
    ///
    /// # Safety
    ///
    /// The library must contain valid AMI function implementations.
    /// Invalid or malicious libraries may cause undefined behavior.
    pub fn open(path: &Path, loader: &dyn DynamicLoader) -> AmiResult<Self> {
        let path_str = path.display().to_string();
        let object = loader
            .open(path)
            .map_err(|e| AmiError::load_failure(&path_str, e))?;

        let required = |name: &str| {
            object
                .symbol(name)
                .ok_or_else(|| AmiError::symbol_not_found(&path_str, name))
        };
        let init = required(INIT_SYMBOL)?;
        let getwave = required(GETWAVE_SYMBOL)?;
        let close = required(CLOSE_SYMBOL)?;
        let resolve = object.symbol(RESOLVE_SYMBOL);

        // SAFETY: the addresses are exported under the AMI names, whose C
        // signatures the function pointer types mirror.
        let (ami_init, ami_getwave, ami_close, ami_resolve) = unsafe {
            (
                std::mem::transmute::<*const c_void, AmiInitFn>(init),
                std::mem::transmute::<*const c_void, AmiGetWaveFn>(getwave),
                std::mem::transmute::<*const c_void, AmiCloseFn>(close),
                resolve.map(|r| std::mem::transmute::<*const c_void, AmiResolveFn>(r)),
            )
        };

        tracing::info!(
            path = %path_str,
            has_resolve = ami_resolve.is_some(),
            "Loaded AMI library"
        );

        Ok(Self {
            path: path.to_path_buf(),
            ami_init,
            ami_getwave,
            ami_close,
            ami_resolve,
            call_lock: Mutex::new(()),
            reentrant: AtomicBool::new(false),
            _object: object,
        })
    }

    /// Load an AMI model from a `.dll`/`.so` file, uncached.
    pub fn load<P: AsRef<Path>>(path: P) -> AmiResult<Arc<Self>> {
        Ok(Arc::new(Self::open(path.as_ref(), &LibloadingLoader)?))
    }

    /// Path the library was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> LibraryFormat {
        LibraryFormat::from_path(&self.path)
    }

    /// Whether the optional AMI_Resolve entry point is exported.
    pub fn supports_resolve(&self) -> bool {
        self.ami_resolve.is_some()
    }

    /// Whether a model instance declared the library safe for concurrent calls.
    pub fn is_reentrant(&self) -> bool {
        self.reentrant.load(Ordering::Acquire)
    }

    pub(crate) fn mark_reentrant(&self) {
        if !self.reentrant.swap(true, Ordering::AcqRel) {
            tracing::info!(path = %self.path.display(), "Model declared itself reentrant");
        }
    }

    pub(crate) fn init_fn(&self) -> AmiInitFn {
        self.ami_init
    }

    pub(crate) fn getwave_fn(&self) -> AmiGetWaveFn {
        self.ami_getwave
    }

    pub(crate) fn close_fn(&self) -> AmiCloseFn {
        self.ami_close
    }

    /// Run a native call, holding the library lock unless reentrant.
    pub(crate) fn serialize_call<R>(&self, call: impl FnOnce() -> R) -> R {
        if self.is_reentrant() {
            call()
        } else {
            let _guard = lock_recover(&self.call_lock);
            call()
        }
    }

    /// Ask the model to resolve a parameter set through AMI_Resolve.
    pub fn resolve(&self, params: &ResolvedParameters) -> AmiResult<ResolveOutput> {
        let resolve_fn = self.ami_resolve.ok_or_else(|| AmiError::NotSupported {
            operation: RESOLVE_SYMBOL.to_string(),
        })?;
        let params_in = encode_params(params)?;

        let mut params_out: *mut c_char = std::ptr::null_mut();
        let mut msg: *mut c_char = std::ptr::null_mut();
        // Copy out under the call lock, before another call can reuse model memory.
        let (code, params_out_text, message) = self.serialize_call(|| unsafe {
            let code = resolve_fn(params_in.as_ptr(), &mut params_out, &mut msg);
            (code, read_c_string(params_out), read_c_string(msg))
        });

        if code != 0 {
            return Err(AmiError::ResolveFailed {
                code: i64::from(code),
                message,
            });
        }
        Ok(ResolveOutput {
            params_out: parse_model_output(params_out_text.as_deref(), &self.path),
            params_out_text,
            message,
        })
    }
}

impl std::fmt::Debug for AmiLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiLibrary")
            .field("path", &self.path)
            .field("has_resolve", &self.supports_resolve())
            .field("reentrant", &self.is_reentrant())
            .finish()
    }
}

/// Caller-owned cache of loaded libraries keyed by canonical path.
///
/// A library stays loaded while the registry or any session holds its
/// `Arc`; [`release`](Self::release) only drops the registry's reference.
#[derive(Default)]
pub struct LibraryRegistry {
    libraries: Mutex<HashMap<PathBuf, Arc<AmiLibrary>>>,
}

impl LibraryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached library for `path`, opening it on first use.
    pub fn load(
        &self,
        path: impl AsRef<Path>,
        loader: &dyn DynamicLoader,
    ) -> AmiResult<Arc<AmiLibrary>> {
        let path = path.as_ref();
        let canonical = loader
            .canonicalize(path)
            .map_err(|e| AmiError::load_failure(path.display().to_string(), e))?;

        // Held across the open so two callers never load the same file twice.
        let mut libraries = lock_recover(&self.libraries);
        if let Some(library) = libraries.get(&canonical) {
            tracing::debug!(path = %canonical.display(), "Library cache hit");
            return Ok(Arc::clone(library));
        }

        let library = Arc::new(AmiLibrary::open(&canonical, loader)?);
        libraries.insert(canonical, Arc::clone(&library));
        Ok(library)
    }

    /// Whether a library is cached under this canonical path.
    pub fn contains(&self, canonical: &Path) -> bool {
        lock_recover(&self.libraries).contains_key(canonical)
    }

    /// Drop the registry's reference to a library.
    pub fn release(&self, canonical: &Path) -> bool {
        let removed = lock_recover(&self.libraries).remove(canonical);
        if removed.is_some() {
            tracing::debug!(path = %canonical.display(), "Released library");
        }
        removed.is_some()
    }

    pub fn len(&self) -> usize {
        lock_recover(&self.libraries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Platform-specific library format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LibraryFormat {
    /// Windows DLL.
    Dll,
    /// Linux/Unix shared object.
    So,
    /// macOS dynamic library.
    Dylib,
    /// Unknown format.
    Unknown,
}

impl LibraryFormat {
    /// Detect format from file extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("dll") => Self::Dll,
            Some("so") => Self::So,
            Some("dylib") => Self::Dylib,
            _ => Self::Unknown,
        }
    }

    /// Get the default format for the current platform.
    #[cfg(target_os = "windows")]
    pub fn native() -> Self {
        Self::Dll
    }

    #[cfg(target_os = "linux")]
    pub fn native() -> Self {
        Self::So
    }

    #[cfg(target_os = "macos")]
    pub fn native() -> Self {
        Self::Dylib
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    pub fn native() -> Self {
        Self::Unknown
    }
}
