//! Run configuration loading and validation.

use anyhow::{Context, Result};
use lib_types::ami::{AmiValue, Corner};
use lib_types::units::Seconds;
use lib_types::waveform::ImpulseMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration for one model invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Run name/description.
    #[serde(default = "default_name")]
    pub name: String,

    /// Path to the model's shared library.
    pub library: PathBuf,

    /// Path to the model's AMI parameter file.
    pub ami: PathBuf,

    /// Corner applied to every parameter.
    #[serde(default = "default_corner")]
    pub corner: Corner,

    /// Bit time in seconds.
    pub bit_time: f64,

    /// Sample interval in seconds.
    pub sample_interval: f64,

    /// Impulse matrix handed to Init.
    #[serde(default)]
    pub impulse: ImpulseConfig,

    /// GetWave stimulus. Skipped when absent or when the model has no GetWave.
    #[serde(default)]
    pub getwave: Option<GetWaveConfig>,

    /// Caller-side deadline for each native call, in milliseconds.
    #[serde(default)]
    pub deadline_ms: Option<u64>,

    /// Values replacing resolved parameters, keyed by dotted path.
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

fn default_name() -> String {
    "run".to_string()
}

fn default_corner() -> Corner {
    Corner::Typ
}

/// Impulse matrix description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImpulseConfig {
    /// Samples per response row.
    #[serde(default = "default_row_size")]
    pub row_size: usize,

    /// Aggressor rows after the victim.
    #[serde(default)]
    pub aggressors: usize,

    /// Explicit samples, victim row first. A unit impulse when absent.
    #[serde(default)]
    pub samples: Option<Vec<f64>>,
}

fn default_row_size() -> usize {
    128
}

impl Default for ImpulseConfig {
    fn default() -> Self {
        Self {
            row_size: default_row_size(),
            aggressors: 0,
            samples: None,
        }
    }
}

/// GetWave stimulus description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetWaveConfig {
    /// Total bits of stimulus.
    #[serde(default = "default_bits")]
    pub bits: usize,

    /// Bits handed to the model per call.
    #[serde(default = "default_bits_per_call")]
    pub bits_per_call: usize,

    /// Stimulus shape.
    #[serde(default)]
    pub pattern: Pattern,
}

fn default_bits() -> usize {
    256
}

fn default_bits_per_call() -> usize {
    32
}

impl Default for GetWaveConfig {
    fn default() -> Self {
        Self {
            bits: default_bits(),
            bits_per_call: default_bits_per_call(),
            pattern: Pattern::default(),
        }
    }
}

/// Stimulus shape for GetWave.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    /// Low for the first bit, high after.
    #[default]
    Step,
    /// Alternating high and low bits.
    Clock,
}

impl RunConfig {
    pub fn bit_time(&self) -> Seconds {
        Seconds(self.bit_time)
    }

    pub fn sample_interval(&self) -> Seconds {
        Seconds(self.sample_interval)
    }

    /// Samples per bit, rounded.
    pub fn samples_per_bit(&self) -> usize {
        self.bit_time()
            .whole_multiple_of(self.sample_interval())
            .unwrap_or(1)
            .max(1)
    }

    /// Build the impulse matrix described by `impulse`.
    pub fn impulse_matrix(&self) -> ImpulseMatrix {
        let cfg = &self.impulse;
        match &cfg.samples {
            Some(samples) => ImpulseMatrix::new(samples.clone(), cfg.row_size, cfg.aggressors),
            None => {
                let mut samples = vec![0.0; cfg.row_size * (cfg.aggressors + 1)];
                if let Some(first) = samples.first_mut() {
                    *first = 1.0 / self.sample_interval;
                }
                ImpulseMatrix::new(samples, cfg.row_size, cfg.aggressors)
            }
        }
    }

    /// Parameter overrides as AMI values.
    pub fn parameter_overrides(&self) -> Result<Vec<(String, AmiValue)>> {
        self.parameters
            .iter()
            .map(|(path, value)| {
                json_to_ami(value)
                    .map(|v| (path.clone(), v))
                    .with_context(|| format!("Unsupported value for parameter '{path}'"))
            })
            .collect()
    }

    /// Rebase relative paths on the directory holding the config file.
    fn rebase(&mut self, base: &Path) {
        for path in [&mut self.library, &mut self.ami] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

fn json_to_ami(value: &serde_json::Value) -> Result<AmiValue> {
    use serde_json::Value;
    Ok(match value {
        Value::Bool(b) => AmiValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AmiValue::Integer(i),
            None => AmiValue::Float(n.as_f64().context("number out of range")?),
        },
        Value::String(s) => AmiValue::String(s.clone()),
        Value::Array(items) => {
            AmiValue::List(items.iter().map(json_to_ami).collect::<Result<_>>()?)
        }
        Value::Null | Value::Object(_) => anyhow::bail!("expected a scalar or a list"),
    })
}

/// Load configuration from a file.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: RunConfig = if path.extension().is_some_and(|e| e == "json") {
        serde_json::from_str(&content).with_context(|| "Failed to parse config as JSON")?
    } else {
        // Assume TOML
        toml::from_str(&content).with_context(|| "Failed to parse config as TOML")?
    };

    if let Some(base) = path.parent() {
        config.rebase(base);
    }
    validate_config(&config)?;

    Ok(config)
}

/// Validate configuration.
pub fn validate_config(config: &RunConfig) -> Result<()> {
    if !config.bit_time().is_positive() {
        anyhow::bail!("bit_time must be positive (got {})", config.bit_time);
    }
    if !config.sample_interval().is_positive() {
        anyhow::bail!(
            "sample_interval must be positive (got {})",
            config.sample_interval
        );
    }
    if config.sample_interval > config.bit_time {
        anyhow::bail!(
            "sample_interval {} exceeds bit_time {}",
            config.sample_interval,
            config.bit_time
        );
    }

    let impulse = &config.impulse;
    if impulse.row_size == 0 {
        anyhow::bail!("impulse.row_size must be at least 1");
    }
    if let Some(samples) = &impulse.samples {
        let expected = impulse.row_size * (impulse.aggressors + 1);
        if samples.len() != expected {
            anyhow::bail!(
                "impulse.samples has {} values, expected {} ({} rows of {})",
                samples.len(),
                expected,
                impulse.aggressors + 1,
                impulse.row_size
            );
        }
    }

    if let Some(getwave) = &config.getwave {
        if getwave.bits == 0 || getwave.bits_per_call == 0 {
            anyhow::bail!("getwave.bits and getwave.bits_per_call must be at least 1");
        }
    }

    if config.deadline_ms == Some(0) {
        anyhow::bail!("deadline_ms must be at least 1");
    }

    config.parameter_overrides()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_toml_defaults_and_rebase() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "run.toml",
            r#"
library = "libtx.so"
ami = "tx.ami"
bit_time = 1e-10
sample_interval = 1.25e-12
corner = "max"

[parameters]
vswing = 0.9
"tx_taps.pre" = -1
mode = "auto"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.name, "run");
        assert_eq!(config.corner, Corner::Max);
        assert_eq!(config.library, dir.path().join("libtx.so"));
        assert_eq!(config.impulse.row_size, 128);
        assert!(config.getwave.is_none());
        assert_eq!(config.samples_per_bit(), 80);

        let overrides = config.parameter_overrides().unwrap();
        assert!(overrides.contains(&("vswing".to_string(), AmiValue::Float(0.9))));
        assert!(overrides.contains(&("tx_taps.pre".to_string(), AmiValue::Integer(-1))));
    }

    #[test]
    fn test_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "run.json",
            r#"{
                "name": "tx",
                "library": "/opt/models/libtx.so",
                "ami": "/opt/models/tx.ami",
                "bit_time": 1e-10,
                "sample_interval": 1e-11,
                "impulse": {"row_size": 2, "aggressors": 1, "samples": [1, 0, 0.5, 0]},
                "getwave": {"bits": 8, "pattern": "clock"},
                "deadline_ms": 500
            }"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.library, PathBuf::from("/opt/models/libtx.so"));
        let getwave = config.getwave.as_ref().unwrap();
        assert_eq!(getwave.pattern, Pattern::Clock);
        assert_eq!(getwave.bits_per_call, 32);
        let matrix = config.impulse_matrix();
        assert!(matrix.is_consistent());
        assert_eq!(matrix.row(1), Some(&[0.5, 0.0][..]));
    }

    #[test]
    fn test_unit_impulse_synthesized() {
        let config: RunConfig = toml::from_str(
            "library = \"a.so\"\nami = \"a.ami\"\nbit_time = 1e-10\nsample_interval = 1e-11\n\
             [impulse]\nrow_size = 4\naggressors = 1\n",
        )
        .unwrap();
        let m = config.impulse_matrix();
        assert_eq!(m.samples.len(), 8);
        assert!((m.samples[0] - 1e11).abs() < 1.0);
        assert!(m.samples[1..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let base: RunConfig = toml::from_str(
            "library = \"a.so\"\nami = \"a.ami\"\nbit_time = 1e-10\nsample_interval = 1e-11\n",
        )
        .unwrap();
        assert!(validate_config(&base).is_ok());

        let mut c = base.clone();
        c.bit_time = 0.0;
        assert!(validate_config(&c).is_err());

        let mut c = base.clone();
        c.sample_interval = 1e-9;
        assert!(validate_config(&c)
            .unwrap_err()
            .to_string()
            .contains("exceeds bit_time"));

        let mut c = base.clone();
        c.impulse.samples = Some(vec![0.0; 3]);
        assert!(validate_config(&c).is_err());

        let mut c = base.clone();
        c.parameters
            .insert("bad".into(), serde_json::json!({"nested": 1}));
        assert!(validate_config(&c).is_err());

        let mut c = base;
        c.getwave = Some(GetWaveConfig {
            bits_per_call: 0,
            ..GetWaveConfig::default()
        });
        assert!(validate_config(&c).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/no/such/run.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
