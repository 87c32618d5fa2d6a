//! Typed view of a model-description (`.ibs`) file.
//!
//! [`keyword::parse`] does the grammar work; this module reads the keyword
//! document into the structures a driver needs: components and their pins,
//! buffer models with their corner triples and I-V tables, and the
//! `[Algorithmic Model]` executables that point at native AMI models.

use crate::error::ParseResult;
use crate::keyword::{self, KeywordDocument, KeywordNode, Line, TypMinMax};
use lib_types::ami::Corner;
use serde::Serialize;

/// Parsed IBIS file.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IbisFile {
    /// File header information.
    pub header: IbisHeader,

    /// Component definitions.
    pub components: Vec<Component>,

    /// Model definitions.
    pub models: Vec<Model>,

    /// Model selector definitions.
    pub model_selectors: Vec<ModelSelector>,
}

/// IBIS file header section.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IbisHeader {
    pub ibis_ver: String,
    pub file_name: String,
    pub file_rev: String,
    pub date: String,
    /// Vendor or tool that produced the file.
    pub source: String,
    pub notes: String,
    pub disclaimer: String,
    pub copyright: String,
}

/// Component definition.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Component {
    pub name: String,
    pub manufacturer: String,
    pub package: Option<Package>,
    /// Signal pins; POWER, GND and NC rows are left out.
    pub pins: Vec<Pin>,
    pub diff_pins: Vec<DiffPin>,
}

/// Package parasitics.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Package {
    /// R_pkg in ohms.
    pub r_pkg: Option<TypMinMax>,
    /// L_pkg in henries.
    pub l_pkg: Option<TypMinMax>,
    /// C_pkg in farads.
    pub c_pkg: Option<TypMinMax>,
}

/// `[Pin]` row.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Pin {
    pub name: String,
    pub signal_name: String,
    pub model_name: String,
    pub r_pin: Option<f64>,
    pub l_pin: Option<f64>,
    pub c_pin: Option<f64>,
}

/// `[Diff Pin]` row.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DiffPin {
    pub pin: String,
    pub inv_pin: String,
    /// Differential threshold in volts.
    pub vdiff: Option<f64>,
}

/// I/O buffer model.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Model {
    pub name: String,
    pub model_type: Option<ModelType>,
    /// C_comp in farads.
    pub c_comp: Option<TypMinMax>,
    pub voltage_range: Option<TypMinMax>,
    pub temperature_range: Option<TypMinMax>,
    pub pullup: Option<IVTable>,
    pub pulldown: Option<IVTable>,
    pub power_clamp: Option<IVTable>,
    pub gnd_clamp: Option<IVTable>,
    pub ramp: Option<Ramp>,
    pub algorithmic_model: Option<AlgorithmicModel>,
}

impl Model {
    /// Whether the model carries an `[Algorithmic Model]` section.
    pub fn is_ami(&self) -> bool {
        self.algorithmic_model.is_some()
    }
}

/// Model type enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ModelType {
    Input,
    Output,
    IO,
    ThreeState,
    OpenDrain,
    OpenSink,
    OpenSource,
    InputECL,
    OutputECL,
    IOECL,
    ThreeStateECL,
    Terminator,
    Series,
    SeriesSwitch,
    InputDiff,
    OutputDiff,
    IODiff,
    ThreeStateDiff,
}

impl ModelType {
    /// Read a `Model_type` value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "input" => Some(Self::Input),
            "output" => Some(Self::Output),
            "i/o" | "io" => Some(Self::IO),
            "3-state" | "three-state" => Some(Self::ThreeState),
            "open_drain" => Some(Self::OpenDrain),
            "open_sink" => Some(Self::OpenSink),
            "open_source" => Some(Self::OpenSource),
            "input_ecl" => Some(Self::InputECL),
            "output_ecl" => Some(Self::OutputECL),
            "i/o_ecl" | "io_ecl" => Some(Self::IOECL),
            "3-state_ecl" => Some(Self::ThreeStateECL),
            "terminator" => Some(Self::Terminator),
            "series" => Some(Self::Series),
            "series_switch" => Some(Self::SeriesSwitch),
            "input_diff" => Some(Self::InputDiff),
            "output_diff" => Some(Self::OutputDiff),
            "i/o_diff" | "io_diff" => Some(Self::IODiff),
            "3-state_diff" => Some(Self::ThreeStateDiff),
            _ => None,
        }
    }

    /// Whether the buffer drives the pin.
    pub fn is_driver(&self) -> bool {
        !matches!(self, Self::Input | Self::InputECL | Self::InputDiff | Self::Terminator)
    }
}

/// One I-V table point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct IVPoint {
    pub voltage: f64,
    pub current: TypMinMax,
}

/// I-V table data, sorted by voltage as written.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IVTable {
    pub points: Vec<IVPoint>,
}

impl IVTable {
    fn from_node(node: &KeywordNode) -> Self {
        let points = node
            .lines()
            .filter_map(|l| {
                Some(IVPoint {
                    voltage: l.tokens.first()?.number()?,
                    current: l.triple(1)?,
                })
            })
            .collect();
        Self { points }
    }

    /// Interpolate current at `voltage`, clamping outside the table.
    /// `NA` slots fall back to the typical column.
    pub fn current_at(&self, voltage: f64, corner: Corner) -> f64 {
        let Some(first) = self.points.first() else {
            return 0.0;
        };

        let upper_idx = match self.points.iter().position(|p| p.voltage >= voltage) {
            Some(0) => return first.current.at_or_typ(corner),
            Some(i) => i,
            None => {
                let last = &self.points[self.points.len() - 1];
                return last.current.at_or_typ(corner);
            }
        };

        let lower = &self.points[upper_idx - 1];
        let upper = &self.points[upper_idx];
        let i_lower = lower.current.at_or_typ(corner);
        let i_upper = upper.current.at_or_typ(corner);
        if upper.voltage == lower.voltage {
            return i_upper;
        }
        let frac = (voltage - lower.voltage) / (upper.voltage - lower.voltage);
        i_lower + frac * (i_upper - i_lower)
    }
}

/// `[Ramp]` rates in volts per second.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Ramp {
    pub dv_dt_r: Option<TypMinMax>,
    pub dv_dt_f: Option<TypMinMax>,
    /// Test load in ohms; 50 when absent.
    pub r_load: f64,
}

/// `[Algorithmic Model]` section.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AlgorithmicModel {
    pub executables: Vec<Executable>,
}

/// One `Executable <platform>_<compiler>_<bits> <library> <ami>` line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Executable {
    /// Operating system part of the platform token, e.g. `Linux`.
    pub os: String,
    /// Compiler part, e.g. `gcc`.
    pub compiler: String,
    /// Pointer width: 32 or 64.
    pub bits: u32,
    /// Shared library file name.
    pub library: String,
    /// Parameter (`.ami`) file name.
    pub ami_file: String,
}

impl Executable {
    fn from_line(line: &Line) -> Option<Self> {
        let values = line.values();
        let platform = values.first()?.text.as_str();
        let mut parts = platform.split('_');
        let os = parts.next()?.to_string();
        let mut rest: Vec<&str> = parts.collect();
        let bits = rest.pop()?.parse().ok()?;
        Some(Self {
            os,
            compiler: rest.join("_"),
            bits,
            library: values.get(1)?.text.clone(),
            ami_file: values.get(2)?.text.clone(),
        })
    }
}

impl AlgorithmicModel {
    /// Executable for a platform, matched case-insensitively on the OS.
    pub fn executable_for(&self, os: &str, bits: u32) -> Option<&Executable> {
        self.executables
            .iter()
            .find(|e| e.bits == bits && e.os.eq_ignore_ascii_case(os))
    }

    /// Executable for the platform this process runs on.
    pub fn executable_for_host(&self) -> Option<&Executable> {
        let os = match std::env::consts::OS {
            "windows" => "Windows",
            "macos" => "Darwin",
            _ => "Linux",
        };
        let bits = if cfg!(target_pointer_width = "64") { 64 } else { 32 };
        self.executable_for(os, bits)
    }
}

/// Model selector.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ModelSelector {
    pub name: String,
    /// Model names with descriptions.
    pub models: Vec<(String, String)>,
}

/// Parse an IBIS file from a string.
pub fn parse_ibs_file(content: &str) -> ParseResult<IbisFile> {
    let doc = keyword::parse(content)?;
    Ok(IbisFile::from_document(&doc))
}

impl IbisFile {
    /// Read the typed view out of a keyword document.
    pub fn from_document(doc: &KeywordDocument) -> Self {
        let value = |name: &str| doc.get(name).map(|n| n.value().to_string()).unwrap_or_default();
        let text = |name: &str| doc.get(name).map(KeywordNode::text).unwrap_or_default();

        let header = IbisHeader {
            ibis_ver: value("ibis_ver"),
            file_name: value("file_name"),
            file_rev: value("file_rev"),
            date: value("date"),
            source: text("source"),
            notes: text("notes"),
            disclaimer: text("disclaimer"),
            copyright: text("copyright"),
        };

        let file = Self {
            header,
            components: doc.all("component").map(component).collect(),
            models: doc.all("model").map(model).collect(),
            model_selectors: doc.all("model_selector").map(model_selector).collect(),
        };
        tracing::debug!(
            components = file.components.len(),
            models = file.models.len(),
            "Parsed IBIS file"
        );
        file
    }

    /// Find a model by name, ignoring case.
    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name.eq_ignore_ascii_case(name))
    }

    /// Find a component by name, ignoring case.
    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Models with an `[Algorithmic Model]` section.
    pub fn ami_models(&self) -> impl Iterator<Item = &Model> {
        self.models.iter().filter(|m| m.is_ami())
    }
}

fn component(node: &KeywordNode) -> Component {
    let manufacturer = node
        .child("manufacturer")
        .map(|m| m.value().to_string())
        .or_else(|| node.param("manufacturer").map(Line::value_text))
        .unwrap_or_default();

    let package = node.child("package").map(|p| {
        let triple = |name: &str| {
            p.param(name).and_then(|l| {
                let start = if l.tokens.get(1).is_some_and(|t| t.text == "=") { 2 } else { 1 };
                l.triple(start)
            })
        };
        Package {
            r_pkg: triple("r_pkg"),
            l_pkg: triple("l_pkg"),
            c_pkg: triple("c_pkg"),
        }
    });

    let pins = node
        .child("pin")
        .into_iter()
        .flat_map(KeywordNode::lines)
        .filter_map(|l| {
            let [name, signal, model_name, rest @ ..] = l.tokens.as_slice() else {
                return None;
            };
            if ["power", "gnd", "nc"].contains(&model_name.text.to_ascii_lowercase().as_str()) {
                return None;
            }
            let rlc = |i: usize| rest.get(i).and_then(keyword::Token::number);
            Some(Pin {
                name: name.text.clone(),
                signal_name: signal.text.clone(),
                model_name: model_name.text.clone(),
                r_pin: rlc(0),
                l_pin: rlc(1),
                c_pin: rlc(2),
            })
        })
        .collect();

    let diff_pins = node
        .child("diff_pin")
        .into_iter()
        .flat_map(KeywordNode::lines)
        .filter_map(|l| {
            let [pin, inv, rest @ ..] = l.tokens.as_slice() else {
                return None;
            };
            Some(DiffPin {
                pin: pin.text.clone(),
                inv_pin: inv.text.clone(),
                vdiff: rest.first().and_then(keyword::Token::number),
            })
        })
        .collect();

    Component {
        name: node.value().to_string(),
        manufacturer,
        package,
        pins,
        diff_pins,
    }
}

fn model(node: &KeywordNode) -> Model {
    let name = node
        .header
        .tokens
        .first()
        .map(|t| t.text.clone())
        .unwrap_or_default();
    let model_type = node
        .param("model_type")
        .and_then(|l| l.values().first())
        .and_then(|t| ModelType::parse(&t.text));
    if model_type.is_none() {
        tracing::debug!(model = %name, "Model has no recognized Model_type");
    }
    let c_comp = node.param("c_comp").and_then(|l| {
        let start = if l.tokens.get(1).is_some_and(|t| t.text == "=") { 2 } else { 1 };
        l.triple(start)
    });
    let header_triple = |kw: &str| node.child(kw).and_then(|k| k.header.triple(0));
    let table = |kw: &str| node.child(kw).map(IVTable::from_node);

    let ramp = node.child("ramp").map(|r| Ramp {
        dv_dt_r: r.param("dV/dt_r").and_then(|l| l.triple(1)),
        dv_dt_f: r.param("dV/dt_f").and_then(|l| l.triple(1)),
        r_load: r
            .param("r_load")
            .and_then(|l| l.values().first().and_then(keyword::Token::number))
            .unwrap_or(50.0),
    });

    let algorithmic_model = node.child("algorithmic_model").map(|a| AlgorithmicModel {
        executables: a
            .lines()
            .filter(|l| l.first_word().is_some_and(|w| w.eq_ignore_ascii_case("executable")))
            .filter_map(Executable::from_line)
            .collect(),
    });

    Model {
        name,
        model_type,
        c_comp,
        voltage_range: header_triple("voltage_range"),
        temperature_range: header_triple("temperature_range"),
        pullup: table("pullup"),
        pulldown: table("pulldown"),
        power_clamp: table("power_clamp"),
        gnd_clamp: table("gnd_clamp"),
        ramp,
        algorithmic_model,
    }
}

fn model_selector(node: &KeywordNode) -> ModelSelector {
    ModelSelector {
        name: node.value().to_string(),
        models: node
            .lines()
            .filter_map(|l| {
                let (first, rest) = l.tokens.split_first()?;
                let desc = rest
                    .iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                Some((first.text.clone(), desc))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_IBS: &str = r#"
[IBIS Ver]      7.2
[File Name]     sample.ibs
[File Rev]      1.0
[Date]          January 1, 2024
[Source]        Test Vendor

[Component]     TEST_CHIP
[Manufacturer]  Test Vendor Inc
[Package]
| variable  typ     min     max
R_pkg       0.2     0.1     0.3
L_pkg       2nH     1nH     NA
C_pkg       1pF     NA      NA
[Pin] signal_name  model_name  R_pin  L_pin  C_pin
1     TXDATA       TX_MODEL    0.1    1nH    0.5pF
2     VDD          POWER
3     RXDATA       RX_MODEL
[Diff Pin] inv_pin vdiff tdelay_typ
1     4     0.1V   0ns

[Model Selector] TX_SEL
TX_MODEL   Full-swing transmitter
TX_LOW     Low-swing transmitter

[Model]         TX_MODEL
Model_type      Output
C_comp          1.0pF   0.8pF   1.2pF
[Voltage Range] 1.8V    1.7V    1.9V
[Pulldown]
| V      I(typ)   I(min)   I(max)
-1.0     -10mA    -8mA     -12mA
 0.0      0mA      0mA      0mA
 1.0      10mA     NA       12mA
[Ramp]
dV/dt_r   0.9/0.2n    0.8/0.25n   1.0/0.15n
dV/dt_f   0.9/0.2n    NA          NA
[Algorithmic Model]
Executable Linux_gcc_64      libtx.so     tx.ami
Executable Windows_VisualStudio_64 tx.dll tx.ami
[End Algorithmic Model]

[Model]         RX_MODEL
Model_type      Input

[End]
"#;

    #[test]
    fn test_parse_sample_ibs() {
        let ibis = parse_ibs_file(SAMPLE_IBS).unwrap();

        assert_eq!(ibis.header.ibis_ver, "7.2");
        assert_eq!(ibis.header.file_name, "sample.ibs");
        assert_eq!(ibis.header.date, "January 1, 2024");
        assert_eq!(ibis.components.len(), 1);
        assert_eq!(ibis.models.len(), 2);

        let comp = ibis.component("test_chip").unwrap();
        assert_eq!(comp.manufacturer, "Test Vendor Inc");
        assert_eq!(comp.pins.len(), 2);
        assert_eq!(comp.pins[0].model_name, "TX_MODEL");
        assert!((comp.pins[0].l_pin.unwrap() - 1e-9).abs() < 1e-21);
        assert_eq!(comp.pins[1].r_pin, None);
        assert_eq!(comp.diff_pins[0].inv_pin, "4");

        let pkg = comp.package.as_ref().unwrap();
        assert_eq!(pkg.r_pkg.unwrap().max, Some(0.3));
        assert_eq!(pkg.l_pkg.unwrap().max, None);

        assert_eq!(ibis.model_selectors[0].models.len(), 2);
    }

    #[test]
    fn test_model_details() {
        let ibis = parse_ibs_file(SAMPLE_IBS).unwrap();
        let tx = ibis.model("TX_MODEL").unwrap();
        assert_eq!(tx.model_type, Some(ModelType::Output));
        assert!(tx.model_type.unwrap().is_driver());
        assert!((tx.c_comp.unwrap().typ - 1e-12).abs() < 1e-24);
        assert_eq!(tx.voltage_range.unwrap().min, Some(1.7));

        let pd = tx.pulldown.as_ref().unwrap();
        assert_eq!(pd.points.len(), 3);
        assert!((pd.current_at(0.5, Corner::Typ) - 5e-3).abs() < 1e-12);
        // NA min slot falls back to typical
        assert!((pd.current_at(1.0, Corner::Min) - 10e-3).abs() < 1e-12);
        assert!((pd.current_at(5.0, Corner::Max) - 12e-3).abs() < 1e-12);

        let ramp = tx.ramp.as_ref().unwrap();
        assert!((ramp.dv_dt_r.unwrap().typ - 4.5e9).abs() < 1.0);
        assert_eq!(ramp.dv_dt_f.unwrap().min, None);
        assert_eq!(ramp.r_load, 50.0);

        let algo = tx.algorithmic_model.as_ref().unwrap();
        assert_eq!(algo.executables.len(), 2);
        let linux = algo.executable_for("linux", 64).unwrap();
        assert_eq!(linux.compiler, "gcc");
        assert_eq!(linux.library, "libtx.so");
        assert_eq!(linux.ami_file, "tx.ami");
        assert!(algo.executable_for("Windows", 32).is_none());
        if cfg!(all(target_os = "linux", target_pointer_width = "64")) {
            assert_eq!(algo.executable_for_host().unwrap().library, "libtx.so");
        }

        assert_eq!(ibis.ami_models().count(), 1);
    }

    #[test]
    fn test_manufacturer_as_plain_line() {
        let ibis = parse_ibs_file("[Component] C\nManufacturer Acme Corp\n").unwrap();
        assert_eq!(ibis.components[0].manufacturer, "Acme Corp");
    }
}
