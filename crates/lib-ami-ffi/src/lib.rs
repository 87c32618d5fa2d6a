//! # lib-ami-ffi
//!
//! Safe FFI wrappers for IBIS-AMI vendor binaries.
//!
//! This crate drives vendor-supplied AMI models (`.dll`/`.so` files)
//! through the fixed `AMI_Init`/`AMI_GetWave`/`AMI_Close` ABI:
//!
//! - Library loading behind the [`DynamicLoader`] trait, cached in a
//!   caller-owned [`LibraryRegistry`]
//! - Parameter text encoding on the way in and re-parsing on the way out
//! - A per-session state machine with shape checks before every native call
//! - Guard sentinels after every buffer to catch overruns
//! - A per-library lock for models that have not declared themselves
//!   reentrant
//!
//! # Safety
//!
//! Vendor binaries are untrusted code. The bridge validates everything it
//! can before a call and copies every model-owned buffer out immediately
//! after it, but a native call cannot be timed out or interrupted. It never
//! spawns threads; deadlines are the caller's business.

pub mod error;
pub mod lifecycle;
pub mod loader;

pub use error::{AmiError, AmiResult, BoxError};
pub use lifecycle::{stream_wave, with_session, AmiSession, SessionState, StreamOutput, CLOCK_END};
pub use loader::{
    AmiLibrary, DynamicLoader, LibloadingLoader, LibraryFormat, LibraryRegistry, ResolveOutput,
    SharedObject,
};
