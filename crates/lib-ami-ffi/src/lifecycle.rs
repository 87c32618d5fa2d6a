//! AMI session lifecycle management.
//!
//! A session is one native model instance:
//! `Created -(init)-> Ready -(getwave)*-> Ready -(close)-> Closed`, with
//! `Faulted` for an instance whose Init failed. Calls out of order fail with
//! [`AmiError::InvalidState`] before any native code runs.
//!
//! Native calls are synchronous on the calling thread and cannot be
//! interrupted. A caller that needs a deadline runs the call on its own
//! worker thread.

use crate::error::{AmiError, AmiResult};
use crate::loader::{
    encode_params, lock_recover, parse_model_output, read_c_string, AmiLibrary,
};
use lib_types::ami::{AmiGetWaveResult, AmiInitResult, REENTRANT_PARAM};
use lib_types::resolved::ResolvedParameters;
use lib_types::units::Seconds;
use lib_types::waveform::ImpulseMatrix;
use std::ffi::{c_char, c_void};
use std::os::raw::c_long;
use std::ptr;
use std::sync::{Arc, Mutex, PoisonError};

pub use lib_types::ami::SessionState;

/// Guard value written after every buffer handed to a model.
const SENTINEL: f64 = f64::from_bits(0xDEADBEEFDEADBEEF);
/// Multiple sentinels to detect extent of overrun.
const SENTINEL_COUNT: usize = 8;

/// Terminator a model writes after its last clock time.
pub const CLOCK_END: f64 = -1.0;

/// `data` followed by the guard sentinels.
fn guarded(data: &[f64]) -> Vec<f64> {
    let mut buffer = Vec::with_capacity(data.len() + SENTINEL_COUNT);
    buffer.extend_from_slice(data);
    buffer.extend(std::iter::repeat(SENTINEL).take(SENTINEL_COUNT));
    buffer
}

/// Index of the first overwritten sentinel, if any.
fn overrun_index(buffer: &[f64], len: usize) -> Option<usize> {
    buffer[len..]
        .iter()
        .position(|v| v.to_bits() != SENTINEL.to_bits())
        .map(|i| len + i)
}

/// Clock times up to the terminator; `None` when the model wrote none.
fn clock_times_written(clock: &[f64]) -> Option<Vec<f64>> {
    let times: Vec<f64> = clock.iter().copied().take_while(|&t| t != CLOCK_END).collect();
    (!times.is_empty()).then_some(times)
}

fn to_c_long(value: usize, operation: &'static str, what: &str) -> AmiResult<c_long> {
    c_long::try_from(value)
        .map_err(|_| AmiError::shape_mismatch(operation, format!("{what} {value} exceeds C long")))
}

struct SessionInner {
    state: SessionState,
    /// Opaque handle from AMI_Init. Only the model dereferences it.
    handle: *mut c_void,
    row_size: usize,
    aggressors: usize,
    getwave_count: u64,
}

// The handle is only passed back to the model that issued it, and every
// use happens under the session mutex.
unsafe impl Send for SessionInner {}

/// An AMI model instance.
///
/// Methods take `&self` and serialize through an internal lock, so a
/// session may be shared between threads; two native calls on the same
/// instance never overlap. Calls on a library that has not declared itself
/// reentrant are additionally serialized across all of its instances.
///
/// Dropping a `Ready` session closes it.
pub struct AmiSession {
    library: Arc<AmiLibrary>,
    inner: Mutex<SessionInner>,
}

impl AmiSession {
    /// Create a new uninitialized session.
    pub fn new(library: Arc<AmiLibrary>) -> Self {
        Self {
            library,
            inner: Mutex::new(SessionInner {
                state: SessionState::Created,
                handle: ptr::null_mut(),
                row_size: 0,
                aggressors: 0,
                getwave_count: 0,
            }),
        }
    }

    pub fn library(&self) -> &Arc<AmiLibrary> {
        &self.library
    }

    /// Get the current session state.
    pub fn state(&self) -> SessionState {
        lock_recover(&self.inner).state
    }

    /// Aggressor count fixed by a successful Init.
    pub fn aggressors(&self) -> Option<usize> {
        let inner = lock_recover(&self.inner);
        (inner.state == SessionState::Ready).then_some(inner.aggressors)
    }

    /// Number of successful GetWave calls so far.
    pub fn getwave_count(&self) -> u64 {
        lock_recover(&self.inner).getwave_count
    }

    fn model_name(&self) -> String {
        self.library.path().display().to_string()
    }

    /// Initialize the model with an impulse matrix and resolved parameters.
    ///
    /// The matrix is copied; the model's in-place edits come back as
    /// `impulse_out`. Output parameter text is re-parsed into `params_out`.
    pub fn init(
        &self,
        impulse: &ImpulseMatrix,
        sample_interval: Seconds,
        bit_time: Seconds,
        params: &ResolvedParameters,
    ) -> AmiResult<AmiInitResult> {
        let mut inner = lock_recover(&self.inner);
        if inner.state != SessionState::Created {
            return Err(AmiError::invalid_state("init", inner.state));
        }

        if impulse.row_size == 0 {
            return Err(AmiError::shape_mismatch("init", "row size is zero"));
        }
        if !impulse.is_consistent() {
            return Err(AmiError::shape_mismatch(
                "init",
                format!(
                    "impulse matrix has {} samples, expected {} ({} rows x {})",
                    impulse.samples.len(),
                    impulse.expected_len(),
                    impulse.rows(),
                    impulse.row_size
                ),
            ));
        }
        if !sample_interval.is_positive() {
            return Err(AmiError::InvalidParameter {
                name: "sample_interval".into(),
                reason: format!("must be positive, got {sample_interval}"),
            });
        }
        if !bit_time.is_positive() {
            return Err(AmiError::InvalidParameter {
                name: "bit_time".into(),
                reason: format!("must be positive, got {bit_time}"),
            });
        }
        let row_size = to_c_long(impulse.row_size, "init", "row size")?;
        let aggressors = to_c_long(impulse.aggressors, "init", "aggressor count")?;
        let params_in = encode_params(params)?;

        let len = impulse.samples.len();
        let mut buffer = guarded(&impulse.samples);
        let mut params_out: *mut c_char = ptr::null_mut();
        let mut handle: *mut c_void = ptr::null_mut();
        let mut msg: *mut c_char = ptr::null_mut();

        tracing::debug!(
            model = %self.model_name(),
            row_size = impulse.row_size,
            aggressors = impulse.aggressors,
            "Calling AMI_Init"
        );
        let init_fn = self.library.init_fn();
        // Model-owned strings are copied while the call lock is still held:
        // a non-reentrant model may reuse one buffer across instances.
        let (code, params_out_text, message) = self.library.serialize_call(|| unsafe {
            let code = init_fn(
                buffer.as_mut_ptr(),
                row_size,
                aggressors,
                sample_interval.0,
                bit_time.0,
                params_in.as_ptr(),
                &mut params_out,
                &mut handle,
                &mut msg,
            );
            (code, read_c_string(params_out), read_c_string(msg))
        });
        let overrun = overrun_index(&buffer, len);

        let failure = if code != 0 {
            Some(AmiError::InitFailed {
                code: i64::from(code),
                message: message.clone(),
            })
        } else if let Some(index) = overrun {
            tracing::error!(
                model = %self.model_name(),
                buffer_size = len,
                overrun_index = index,
                "AMI_Init wrote past the impulse matrix"
            );
            Some(AmiError::BufferOverrun {
                model: self.model_name(),
                size: len,
                detected_index: Some(index),
            })
        } else {
            None
        };

        if let Some(error) = failure {
            if !handle.is_null() {
                tracing::debug!("Cleaning up handle after init failure");
                let close_fn = self.library.close_fn();
                let close_code = self.library.serialize_call(|| unsafe { close_fn(handle) });
                if close_code != 0 {
                    tracing::warn!(code = close_code, "AMI_Close failed after init failure");
                }
            }
            inner.state = SessionState::Faulted;
            return Err(error);
        }

        inner.state = SessionState::Ready;
        inner.handle = handle;
        inner.row_size = impulse.row_size;
        inner.aggressors = impulse.aggressors;

        buffer.truncate(len);
        let params_out = parse_model_output(params_out_text.as_deref(), self.library.path());
        let reentrant = params_out.get(REENTRANT_PARAM).and_then(|v| v.as_bool()) == Some(true);
        if reentrant {
            self.library.mark_reentrant();
        }

        tracing::debug!(
            model = %self.model_name(),
            has_message = message.is_some(),
            params_out = params_out.len(),
            "AMI_Init completed"
        );

        Ok(AmiInitResult {
            impulse_out: buffer,
            params_out,
            params_out_text,
            message,
            reentrant,
        })
    }

    /// Process one block of waveform in place.
    ///
    /// `wave` holds `aggressors + 1` signal rows of `block_size` samples;
    /// `aggressors` must match the paired Init. `clock_times`, when given,
    /// receives the model's clock times terminated by [`CLOCK_END`].
    pub fn getwave(
        &self,
        wave: &mut [f64],
        block_size: usize,
        aggressors: usize,
        clock_times: Option<&mut [f64]>,
    ) -> AmiResult<AmiGetWaveResult> {
        let mut inner = lock_recover(&self.inner);
        if inner.state != SessionState::Ready {
            return Err(AmiError::invalid_state("getwave", inner.state));
        }
        if aggressors != inner.aggressors {
            return Err(AmiError::shape_mismatch(
                "getwave",
                format!(
                    "aggressor count {aggressors} differs from {} given to init",
                    inner.aggressors
                ),
            ));
        }
        if block_size == 0 {
            return Err(AmiError::shape_mismatch("getwave", "block size is zero"));
        }
        let expected = block_size * (aggressors + 1);
        if wave.len() != expected {
            return Err(AmiError::shape_mismatch(
                "getwave",
                format!(
                    "wave has {} samples, expected {expected} ({} rows x {block_size})",
                    wave.len(),
                    aggressors + 1
                ),
            ));
        }
        if clock_times.as_ref().is_some_and(|c| c.is_empty()) {
            return Err(AmiError::shape_mismatch(
                "getwave",
                "clock buffer has no slots",
            ));
        }
        let wave_size = to_c_long(block_size, "getwave", "block size")?;

        let wave_len = wave.len();
        let mut wave_buffer = guarded(wave);
        let clock_len = clock_times.as_ref().map_or(block_size + 1, |c| c.len());
        let mut clock_buffer = guarded(&vec![CLOCK_END; clock_len]);
        let mut params_out: *mut c_char = ptr::null_mut();
        let handle = inner.handle;

        let getwave_fn = self.library.getwave_fn();
        let (code, params_out_text) = self.library.serialize_call(|| unsafe {
            let code = getwave_fn(
                wave_buffer.as_mut_ptr(),
                wave_size,
                clock_buffer.as_mut_ptr(),
                &mut params_out,
                handle,
            );
            (code, read_c_string(params_out))
        });

        let overrun = overrun_index(&wave_buffer, wave_len)
            .map(|i| (wave_len, i))
            .or_else(|| overrun_index(&clock_buffer, clock_len).map(|i| (clock_len, i)));
        if let Some((size, index)) = overrun {
            tracing::error!(
                model = %self.model_name(),
                buffer_size = size,
                overrun_index = index,
                "AMI_GetWave wrote past a buffer"
            );
            return Err(AmiError::BufferOverrun {
                model: self.model_name(),
                size,
                detected_index: Some(index),
            });
        }

        if code != 0 {
            return Err(AmiError::GetWaveFailed {
                code: i64::from(code),
                message: params_out_text,
            });
        }

        wave.copy_from_slice(&wave_buffer[..wave_len]);
        let clock = &clock_buffer[..clock_len];
        if let Some(dest) = clock_times {
            dest.copy_from_slice(clock);
        }
        inner.getwave_count += 1;

        tracing::trace!(
            block_size,
            call = inner.getwave_count,
            "AMI_GetWave completed"
        );

        Ok(AmiGetWaveResult {
            clock_times: clock_times_written(clock),
            params_out: parse_model_output(params_out_text.as_deref(), self.library.path()),
            params_out_text,
        })
    }

    /// Close the session and release the model instance.
    ///
    /// Valid exactly once, from `Ready`. Called automatically on drop.
    pub fn close(&self) -> AmiResult<()> {
        let mut inner = lock_recover(&self.inner);
        close_instance(&self.library, &mut inner)
    }
}

fn close_instance(library: &AmiLibrary, inner: &mut SessionInner) -> AmiResult<()> {
    if inner.state != SessionState::Ready {
        return Err(AmiError::invalid_state("close", inner.state));
    }
    let handle = std::mem::replace(&mut inner.handle, ptr::null_mut());
    inner.state = SessionState::Closed;

    let close_fn = library.close_fn();
    let code = library.serialize_call(|| unsafe { close_fn(handle) });
    if code != 0 {
        return Err(AmiError::CloseFailed {
            code: i64::from(code),
        });
    }
    tracing::debug!(getwave_count = inner.getwave_count, "AMI_Close completed");
    Ok(())
}

impl Drop for AmiSession {
    fn drop(&mut self) {
        let library = &self.library;
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.state == SessionState::Ready {
            // Best-effort close, log but don't propagate errors
            if let Err(e) = close_instance(library, inner) {
                tracing::warn!(error = %e, "Error during session cleanup");
            }
        }
    }
}

impl std::fmt::Debug for AmiSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmiSession")
            .field("library", &self.library.path())
            .field("state", &self.state())
            .finish()
    }
}

/// Run `f` against a fresh session, closing it on every exit path.
///
/// When `f` fails and the close fails too, the close failure is attached to
/// the closure's error as [`AmiError::CloseAfterFailure`].
pub fn with_session<T>(
    library: Arc<AmiLibrary>,
    f: impl FnOnce(&AmiSession) -> AmiResult<T>,
) -> AmiResult<T> {
    let session = AmiSession::new(library);
    let result = f(&session);
    let closed = match session.state() {
        SessionState::Ready => session.close(),
        _ => Ok(()),
    };

    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_error)) => Err(close_error),
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(secondary)) => {
            tracing::warn!(error = %secondary, "AMI_Close failed after an earlier error");
            Err(AmiError::CloseAfterFailure {
                primary: Box::new(primary),
                secondary: Box::new(secondary),
            })
        }
    }
}

/// Output of [`stream_wave`].
#[derive(Clone, Debug, Default)]
pub struct StreamOutput {
    /// Clock times from all blocks, in order.
    pub clock_times: Vec<f64>,
    /// Output parameter text of each call that returned any.
    pub params_out_texts: Vec<String>,
    /// Number of GetWave calls made.
    pub blocks: usize,
}

/// Feed a long victim waveform through GetWave block by block, in place.
///
/// The last block may be short. Each call gets a clock buffer of
/// `clocks_per_block + 1` slots.
pub fn stream_wave(
    session: &AmiSession,
    wave: &mut [f64],
    samples_per_block: usize,
    clocks_per_block: usize,
) -> AmiResult<StreamOutput> {
    if samples_per_block == 0 {
        return Err(AmiError::shape_mismatch("getwave", "block size is zero"));
    }
    match session.aggressors() {
        Some(0) => {}
        Some(n) => {
            return Err(AmiError::shape_mismatch(
                "getwave",
                format!("streaming needs a victim-only session, init had {n} aggressors"),
            ))
        }
        None => return Err(AmiError::invalid_state("getwave", session.state())),
    }

    let mut output = StreamOutput::default();
    let mut clock = vec![CLOCK_END; clocks_per_block + 1];
    for block in wave.chunks_mut(samples_per_block) {
        clock.fill(CLOCK_END);
        let len = block.len();
        let result = session.getwave(block, len, 0, Some(clock.as_mut_slice()))?;
        if let Some(times) = result.clock_times {
            output.clock_times.extend(times);
        }
        if let Some(text) = result.params_out_text {
            output.params_out_texts.push(text);
        }
        output.blocks += 1;
    }

    tracing::debug!(blocks = output.blocks, clocks = output.clock_times.len(), "Streamed waveform");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_guard() {
        let mut buffer = guarded(&[1.0, 2.0, 3.0]);
        assert_eq!(buffer.len(), 3 + SENTINEL_COUNT);
        assert_eq!(overrun_index(&buffer, 3), None);
        buffer[5] = 0.0;
        assert_eq!(overrun_index(&buffer, 3), Some(5));
    }

    #[test]
    fn test_clock_times_stop_at_terminator() {
        assert_eq!(clock_times_written(&[CLOCK_END; 4]), None);
        assert_eq!(
            clock_times_written(&[1e-9, 2e-9, CLOCK_END, 7.0]),
            Some(vec![1e-9, 2e-9])
        );
        assert_eq!(clock_times_written(&[1e-9, 2e-9]), Some(vec![1e-9, 2e-9]));
    }

    #[test]
    fn test_c_long_conversion() {
        assert_eq!(to_c_long(64, "init", "row size").unwrap(), 64);
    }
}
