//! Model invocation orchestration.

use crate::config::{GetWaveConfig, Pattern, RunConfig};
use anyhow::{Context, Result};
use crossbeam::channel::{self, RecvTimeoutError};
use lib_ami_ffi::{
    stream_wave, AmiError, AmiResult, AmiSession, LibloadingLoader, LibraryFormat,
    LibraryRegistry, SessionState, StreamOutput,
};
use lib_ibis::{parse_ami_path, resolve, AmiFile, FsSource};
use lib_types::ami::{AmiInitResult, Corner};
use lib_types::resolved::ResolvedParameters;
use lib_types::units::Seconds;
use lib_types::waveform::Waveform;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Drives one model through Init, optional GetWave, and Close.
pub struct Orchestrator {
    config: RunConfig,
    registry: LibraryRegistry,
}

/// Why a call made through [`call_with_deadline`] failed.
#[derive(Debug)]
enum CallFailure {
    Model(AmiError),
    Deadline { operation: &'static str, limit: Duration },
    Worker { operation: &'static str },
}

impl From<CallFailure> for anyhow::Error {
    fn from(failure: CallFailure) -> Self {
        match failure {
            CallFailure::Model(e) => e.into(),
            CallFailure::Deadline { operation, limit } => anyhow::anyhow!(
                "{operation} did not return within {} ms; the native call was left running",
                limit.as_millis()
            ),
            CallFailure::Worker { operation } => {
                anyhow::anyhow!("{operation} worker exited without a result")
            }
        }
    }
}

/// Run `call` on a worker thread and wait at most `deadline` for it.
///
/// On expiry the worker is left to finish; the native call cannot be
/// interrupted.
fn call_with_deadline<T: Send + 'static>(
    operation: &'static str,
    deadline: Option<Duration>,
    call: impl FnOnce() -> AmiResult<T> + Send + 'static,
) -> Result<T, CallFailure> {
    let Some(limit) = deadline else {
        return call().map_err(CallFailure::Model);
    };

    let (tx, rx) = channel::bounded(1);
    std::thread::Builder::new()
        .name(format!("ami-{operation}"))
        .spawn(move || {
            let _ = tx.send(call());
        })
        .map_err(|_| CallFailure::Worker { operation })?;

    match rx.recv_timeout(limit) {
        Ok(result) => result.map_err(CallFailure::Model),
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(operation, limit_ms = limit.as_millis() as u64, "Deadline expired");
            Err(CallFailure::Deadline { operation, limit })
        }
        Err(RecvTimeoutError::Disconnected) => Err(CallFailure::Worker { operation }),
    }
}

/// Close a session after `primary`, keeping `primary` as the reported error.
fn close_after(session: &AmiSession, primary: AmiError) -> AmiError {
    if session.state() != SessionState::Ready {
        return primary;
    }
    match session.close() {
        Ok(()) => primary,
        Err(secondary) => AmiError::CloseAfterFailure {
            primary: Box::new(primary),
            secondary: Box::new(secondary),
        },
    }
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            registry: LibraryRegistry::new(),
        }
    }

    fn deadline(&self) -> Option<Duration> {
        self.config.deadline_ms.map(Duration::from_millis)
    }

    /// Resolve the file's parameters at the configured corner and apply
    /// overrides.
    fn resolve_parameters(&self, file: &AmiFile) -> Result<ResolvedParameters> {
        let mut params = resolve(&file.tree, self.config.corner)
            .with_context(|| format!("Failed to resolve '{}'", file.name()))?;
        for (path, value) in self.config.parameter_overrides()? {
            if !params.contains(&path) {
                tracing::warn!(%path, "Override adds a parameter the file does not resolve");
            }
            params.insert(path.as_str(), value);
        }
        Ok(params)
    }

    /// Run the model.
    pub fn run(&self) -> Result<RunResults> {
        tracing::info!("Starting run: {}", self.config.name);

        let file = parse_ami_path(&FsSource, &self.config.ami)
            .with_context(|| format!("Failed to parse AMI file {:?}", self.config.ami))?;
        for warning in &file.warnings {
            tracing::warn!(%warning, "AMI file");
        }
        let params = self.resolve_parameters(&file)?;
        let parameters_in = params.to_ami_string();
        tracing::debug!(%parameters_in, "Resolved parameters");

        let library = self
            .registry
            .load(&self.config.library, &LibloadingLoader)
            .with_context(|| format!("Failed to load model {:?}", self.config.library))?;
        if library.format() != LibraryFormat::native() {
            tracing::warn!(format = ?library.format(), "Library is not in this platform's native format");
        }
        let session = Arc::new(AmiSession::new(library));

        let init = {
            let session = Arc::clone(&session);
            let impulse = self.config.impulse_matrix();
            let (dt, bit_time) = (self.config.sample_interval(), self.config.bit_time());
            call_with_deadline("init", self.deadline(), move || {
                session.init(&impulse, dt, bit_time, &params)
            })?
        };
        if let Some(message) = &init.message {
            tracing::info!(%message, "Model message");
        }

        let getwave = match (&self.config.getwave, file.getwave_exists()) {
            (Some(cfg), true) => Some(self.run_getwave(&session, cfg)?),
            (Some(_), false) => {
                tracing::info!("Model declares no GetWave; skipping");
                None
            }
            (None, _) => None,
        };

        session.close().context("Failed to close model")?;

        Ok(RunResults {
            name: self.config.name.clone(),
            model: file.name().to_string(),
            corner: self.config.corner,
            parameters_in,
            init_returns_impulse: file.init_returns_impulse(),
            init,
            getwave,
        })
    }

    fn run_getwave(&self, session: &Arc<AmiSession>, cfg: &GetWaveConfig) -> Result<GetWaveSummary> {
        let samples_per_bit = self.config.samples_per_bit();
        let dt = self.config.sample_interval();
        let wave = stimulus(cfg, samples_per_bit, dt);
        let block = cfg.bits_per_call * samples_per_bit;
        tracing::info!(samples = wave.len(), block, "Running GetWave");

        let outcome = {
            let session = Arc::clone(session);
            call_with_deadline("getwave", self.deadline(), move || {
                let mut wave = wave;
                stream_wave(&session, &mut wave, block, clock_slots(block, samples_per_bit))
                    .map(|out| (wave, out))
            })
        };

        let (samples, out) = match outcome {
            Ok(done) => done,
            Err(CallFailure::Model(e)) => return Err(close_after(session, e).into()),
            Err(other) => return Err(other.into()),
        };
        Ok(GetWaveSummary::new(Waveform::new(samples, dt), out))
    }
}

/// One clock slot per bit in a block.
fn clock_slots(block: usize, samples_per_bit: usize) -> usize {
    block.div_ceil(samples_per_bit.max(1))
}

/// Build the GetWave input waveform.
fn stimulus(cfg: &GetWaveConfig, samples_per_bit: usize, dt: Seconds) -> Vec<f64> {
    match cfg.pattern {
        Pattern::Step => Waveform::step(1, cfg.bits.saturating_sub(1), samples_per_bit, dt).samples,
        Pattern::Clock => (0..cfg.bits)
            .flat_map(|bit| {
                let level = if bit % 2 == 0 { 0.5 } else { -0.5 };
                std::iter::repeat(level).take(samples_per_bit)
            })
            .collect(),
    }
}

/// Results of one run.
#[derive(Debug, Serialize)]
pub struct RunResults {
    pub name: String,
    pub model: String,
    pub corner: Corner,
    /// Parameter text sent to Init.
    pub parameters_in: String,
    pub init_returns_impulse: bool,
    pub init: AmiInitResult,
    pub getwave: Option<GetWaveSummary>,
}

/// GetWave output.
#[derive(Debug, Serialize)]
pub struct GetWaveSummary {
    pub blocks: usize,
    pub samples: usize,
    pub peak_to_peak: f64,
    pub clock_times: Vec<f64>,
    /// Output parameter text from the last call that returned any.
    pub last_params_out: Option<String>,
    #[serde(skip)]
    pub waveform: Waveform,
}

impl GetWaveSummary {
    fn new(waveform: Waveform, out: StreamOutput) -> Self {
        Self {
            blocks: out.blocks,
            samples: waveform.len(),
            peak_to_peak: waveform.peak_to_peak(),
            clock_times: out.clock_times,
            last_params_out: out.params_out_texts.into_iter().last(),
            waveform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_and_clock_stimulus() {
        let cfg = GetWaveConfig {
            bits: 3,
            bits_per_call: 1,
            pattern: Pattern::Step,
        };
        let wave = stimulus(&cfg, 2, Seconds::from_ps(1.0));
        assert_eq!(wave, vec![-0.5, -0.5, 0.5, 0.5, 0.5, 0.5]);

        let cfg = GetWaveConfig {
            pattern: Pattern::Clock,
            ..cfg
        };
        let wave = stimulus(&cfg, 1, Seconds::from_ps(1.0));
        assert_eq!(wave, vec![0.5, -0.5, 0.5]);
    }

    #[test]
    fn test_clock_slots_per_block() {
        assert_eq!(clock_slots(64, 16), 4);
        assert_eq!(clock_slots(65, 16), 5);
        assert_eq!(clock_slots(8, 0), 8);
    }

    #[test]
    fn test_deadline_expiry_and_success() {
        let err = call_with_deadline("init", Some(Duration::from_millis(10)), || {
            std::thread::sleep(Duration::from_millis(200));
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, CallFailure::Deadline { operation: "init", .. }));
        let message = anyhow::Error::from(err).to_string();
        assert!(message.contains("did not return within 10 ms"));

        let value = call_with_deadline("init", Some(Duration::from_secs(5)), || Ok(7)).unwrap();
        assert_eq!(value, 7);

        let value = call_with_deadline("init", None, || Ok("inline")).unwrap();
        assert_eq!(value, "inline");
    }

    #[test]
    fn test_model_error_passes_through() {
        let err = call_with_deadline::<()>("getwave", Some(Duration::from_secs(5)), || {
            Err(AmiError::NotSupported {
                operation: "AMI_GetWave".into(),
            })
        })
        .unwrap_err();
        assert!(matches!(err, CallFailure::Model(AmiError::NotSupported { .. })));
    }
}
