//! Result output formatting and writing.

use crate::orchestrator::RunResults;
use crate::OutputFormat;
use anyhow::Result;
use lib_ibis::{AmiFile, CornerResolutionError, IbisFile};
use lib_types::ami::Corner;
use lib_types::resolved::ResolvedParameters;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

fn json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Render a parsed IBIS file.
pub fn render_ibis(ibis: &IbisFile, format: OutputFormat) -> Result<String> {
    if let OutputFormat::Json = format {
        return json(ibis);
    }

    let mut out = String::new();
    writeln!(out, "IBIS File: {}", ibis.header.file_name)?;
    writeln!(out, "Version: {}", ibis.header.ibis_ver)?;
    writeln!(out, "Source: {}", ibis.header.source)?;
    writeln!(out, "Components: {}", ibis.components.len())?;
    writeln!(out, "Models: {}", ibis.models.len())?;

    for component in &ibis.components {
        writeln!(out, "\n  Component: {}", component.name)?;
        writeln!(out, "    Manufacturer: {}", component.manufacturer)?;
        writeln!(out, "    Pins: {}", component.pins.len())?;
    }

    for model in &ibis.models {
        writeln!(out, "\n  Model: {}", model.name)?;
        if let Some(model_type) = model.model_type {
            writeln!(out, "    Type: {:?}", model_type)?;
        }
        if let Some(algo) = &model.algorithmic_model {
            let host = algo.executable_for_host();
            for exe in &algo.executables {
                let marker = if host.is_some_and(|h| std::ptr::eq(h, exe)) { " (host)" } else { "" };
                writeln!(
                    out,
                    "    Executable: {}_{}_{} {} {}{marker}",
                    exe.os, exe.compiler, exe.bits, exe.library, exe.ami_file
                )?;
            }
        }
    }

    Ok(out)
}

/// Render a parsed AMI file: flags, warnings and the canonical tree.
pub fn render_ami(ami: &AmiFile, format: OutputFormat) -> Result<String> {
    if let OutputFormat::Json = format {
        return json(&serde_json::json!({
            "name": ami.name(),
            "ami_version": ami.ami_version(),
            "init_returns_impulse": ami.init_returns_impulse(),
            "getwave_exists": ami.getwave_exists(),
            "warnings": ami.warnings,
            "tree": ami.tree,
        }));
    }

    let mut out = String::new();
    writeln!(out, "AMI File: {}", ami.name())?;
    if let Some(version) = ami.ami_version() {
        writeln!(out, "AMI Version: {version}")?;
    }
    writeln!(out, "Init_Returns_Impulse: {}", ami.init_returns_impulse())?;
    writeln!(out, "GetWave_Exists: {}", ami.getwave_exists())?;
    writeln!(out, "Reserved Parameters: {}", ami.tree.reserved().len())?;
    writeln!(out, "Model-Specific Parameters: {}", ami.tree.model_specific().len())?;
    for warning in &ami.warnings {
        writeln!(out, "Warning: {warning}")?;
    }
    writeln!(out, "\n{}", ami.tree.to_ami_string())?;
    Ok(out)
}

/// Render resolved parameters, one corner per entry.
pub fn render_resolved(
    results: &[(Corner, Result<ResolvedParameters, CornerResolutionError>)],
    format: OutputFormat,
) -> Result<String> {
    if let OutputFormat::Json = format {
        let entries: Vec<_> = results
            .iter()
            .map(|(corner, result)| match result {
                Ok(params) => serde_json::json!({
                    "corner": corner,
                    "parameters": params,
                    "text": params.to_ami_string(),
                }),
                Err(e) => serde_json::json!({
                    "corner": corner,
                    "error": e.to_string(),
                }),
            })
            .collect();
        return json(&entries);
    }

    let mut out = String::new();
    for (corner, result) in results {
        match result {
            Ok(params) => writeln!(out, "{corner}: {}", params.to_ami_string())?,
            Err(e) => writeln!(out, "{corner}: error: {e}")?,
        }
    }
    Ok(out)
}

/// Render the results of a model run.
pub fn render_results(results: &RunResults, format: OutputFormat) -> Result<String> {
    if let OutputFormat::Json = format {
        return json(results);
    }

    let mut out = String::new();
    writeln!(out, "\n=== Run: {} ===\n", results.name)?;
    writeln!(out, "Model:  {}", results.model)?;
    writeln!(out, "Corner: {}", results.corner)?;
    writeln!(out, "Parameters in: {}", results.parameters_in)?;

    writeln!(out, "\nInit:")?;
    if let Some(message) = &results.init.message {
        writeln!(out, "  Message: {message}")?;
    }
    if let Some(text) = &results.init.params_out_text {
        writeln!(out, "  Parameters out: {text}")?;
    }
    writeln!(out, "  Reentrant: {}", results.init.reentrant)?;
    if results.init_returns_impulse {
        writeln!(out, "  Impulse samples returned: {}", results.init.impulse_out.len())?;
    }

    if let Some(getwave) = &results.getwave {
        writeln!(out, "\nGetWave:")?;
        writeln!(out, "  Blocks:       {}", getwave.blocks)?;
        writeln!(out, "  Samples:      {}", getwave.samples)?;
        writeln!(out, "  Peak-to-peak: {:.6}", getwave.peak_to_peak)?;
        writeln!(out, "  Clock times:  {}", getwave.clock_times.len())?;
        if let Some(text) = &getwave.last_params_out {
            writeln!(out, "  Parameters out: {text}")?;
        }
    }

    Ok(out)
}

/// Write run results to an output directory.
pub fn write_results(results: &RunResults, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;

    let summary_path = output_dir.join("summary.json");
    std::fs::write(&summary_path, json(results)?)?;
    tracing::info!("Wrote summary to {:?}", summary_path);

    let impulse_path = output_dir.join("impulse_out.csv");
    let mut f = std::io::BufWriter::new(std::fs::File::create(&impulse_path)?);
    writeln!(f, "sample,amplitude")?;
    for (i, v) in results.init.impulse_out.iter().enumerate() {
        writeln!(f, "{i},{v}")?;
    }
    f.flush()?;
    tracing::info!("Wrote impulse response to {:?}", impulse_path);

    if let Some(getwave) = &results.getwave {
        let wf_path = output_dir.join("output_waveform.csv");
        let mut f = std::io::BufWriter::new(std::fs::File::create(&wf_path)?);
        let dt = getwave.waveform.dt.0;
        writeln!(f, "time_ps,amplitude")?;
        for (i, v) in getwave.waveform.samples.iter().enumerate() {
            writeln!(f, "{},{}", i as f64 * dt * 1e12, v)?;
        }
        f.flush()?;
        tracing::info!(
            "Wrote output waveform to {:?} ({} samples)",
            wf_path,
            getwave.waveform.len()
        );
    }

    Ok(())
}
