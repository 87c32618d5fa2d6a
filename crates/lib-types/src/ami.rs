//! AMI (Algorithmic Modeling Interface) types.
//!
//! These types describe an `.ami` parameter tree as declared by a model
//! author, and the session bookkeeping used when a native model is driven
//! through its Init/GetWave/Close entry points.
//!
//! # Canonical text
//!
//! Every tree has exactly one canonical rendering, produced by
//! [`ParameterTree::to_ami_string`]:
//!
//! ```text
//! (root (Mode (Usage In)(Type Int)(Value 1)))
//! ```
//!
//! A node prints as `(name`, one space, its children back to back, and `)`.
//! Leaf tags always appear in the order Usage, Type, Value, Format, Default,
//! Optional, Description, List_Tip.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the reserved-parameter section as written in `.ami` files.
pub const RESERVED_SECTION: &str = "Reserved_Parameters";

/// Name of the model-specific section as written in `.ami` files.
pub const MODEL_SPECIFIC_SECTION: &str = "Model_Specific";

/// Parameter names with a meaning defined by the IBIS standard.
pub const RESERVED_PARAM_NAMES: &[&str] = &[
    "AMI_Version",
    "Init_Returns_Impulse",
    "GetWave_Exists",
    "Use_Init_Output",
    "Max_Init_Aggressors",
    "Ignore_Bits",
    "Resolve_Exists",
    "Model_Name",
    "Special_Param_Names",
    "Component_Name",
    "Signal_Name",
    "Rx_Decision_Time",
    "DC_Offset",
    "Rx_Use_Clock_Input",
    "Supporting_Files",
    "DLL_Path",
    "DLL_ID",
    "Tx_Jitter",
    "Tx_DCD",
    "Tx_Rj",
    "Tx_Dj",
    "Tx_Sj",
    "Tx_Sj_Frequency",
    "Rx_DCD",
    "Rx_Rj",
    "Rx_Dj",
    "Rx_Sj",
    "Rx_Clock_PDF",
    "Rx_Clock_Recovery_Mean",
    "Rx_Clock_Recovery_Rj",
    "Rx_Clock_Recovery_Dj",
    "Rx_Clock_Recovery_Sj",
    "Rx_Clock_Recovery_DCD",
    "Rx_Receiver_Sensitivity",
    "Rx_Noise",
    "Rx_GaussianNoise",
    "Rx_UniformNoise",
    "Modulation",
    "PAM4_Mapping",
    "PAM4_UpperThreshold",
    "PAM4_CenterThreshold",
    "PAM4_LowerThreshold",
    "PAM4_UpperEyeOffset",
    "PAM4_CenterEyeOffset",
    "PAM4_LowerEyeOffset",
    "Repeater_Type",
    "BCI_Protocol",
    "BCI_ID",
    "BCI_State",
    "BCI_Message_Interval_UI",
    "BCI_Training_UI",
    "BCI_Training_Mode",
    "Ts4file",
    "Tx_V",
    "Tx_R",
    "Rx_R",
];

/// Reserved parameters every model must declare.
pub const REQUIRED_RESERVED_PARAMS: &[&str] = &["Init_Returns_Impulse", "GetWave_Exists"];

/// Out capability parameter through which a model opts into concurrent
/// calls across instances of the same library.
pub const REENTRANT_PARAM: &str = "Reentrant";

/// Check whether `name` is an IBIS reserved parameter name.
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_PARAM_NAMES.contains(&name)
}

/// Error converting a keyword into one of the AMI enumerations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmiTypeError {
    #[error("Unknown corner '{0}' (expected typ, min or max)")]
    UnknownCorner(String),

    #[error("Unknown usage '{0}' (expected In, Out, InOut or Info)")]
    UnknownUsage(String),

    #[error("Unknown parameter type '{0}'")]
    UnknownType(String),
}

/// Process corner applied uniformly to every parameter in a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Corner {
    /// Nominal.
    Typ,
    /// Slow.
    Min,
    /// Fast.
    Max,
}

impl Corner {
    pub const ALL: [Corner; 3] = [Corner::Typ, Corner::Min, Corner::Max];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Typ => "Typ",
            Self::Min => "Min",
            Self::Max => "Max",
        }
    }
}

impl fmt::Display for Corner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Corner {
    type Err = AmiTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "typ" | "typical" | "nominal" => Ok(Self::Typ),
            "min" | "slow" => Ok(Self::Min),
            "max" | "fast" => Ok(Self::Max),
            _ => Err(AmiTypeError::UnknownCorner(s.to_string())),
        }
    }
}

/// Direction of a parameter relative to the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Usage {
    /// Supplied by the simulator.
    In,
    /// Produced by the model.
    Out,
    /// Supplied by the simulator and may be updated by the model.
    InOut,
    /// Informational only; never sent to the model.
    Info,
}

impl Usage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "In",
            Self::Out => "Out",
            Self::InOut => "InOut",
            Self::Info => "Info",
        }
    }

    /// True when the simulator passes this parameter into the model.
    #[inline]
    pub fn is_input(&self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Usage {
    type Err = AmiTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            "inout" => Ok(Self::InOut),
            "info" => Ok(Self::Info),
            _ => Err(AmiTypeError::UnknownUsage(s.to_string())),
        }
    }
}

/// Declared type of a leaf parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    Int,
    Float,
    /// Fraction of a unit interval.
    UI,
    /// Equalizer tap weight.
    Tap,
    String,
    Boolean,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Int => "Int",
            Self::Float => "Float",
            Self::UI => "UI",
            Self::Tap => "Tap",
            Self::String => "String",
            Self::Boolean => "Boolean",
        }
    }

    /// Types whose values are numbers.
    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float | Self::UI | Self::Tap)
    }

    /// Corner triples and ranges only make sense for ordered numeric types.
    #[inline]
    pub fn allows_triple(&self) -> bool {
        self.is_numeric()
    }

    /// Check that `value` has the runtime shape this type declares.
    pub fn accepts(&self, value: &AmiValue) -> bool {
        match (self, value) {
            (Self::Int, AmiValue::Integer(_)) => true,
            (Self::Float | Self::UI | Self::Tap, AmiValue::Float(_)) => true,
            (Self::String, AmiValue::String(_)) => true,
            (Self::Boolean, AmiValue::Boolean(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamType {
    type Err = AmiTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "ui" => Ok(Self::UI),
            "tap" => Ok(Self::Tap),
            "string" => Ok(Self::String),
            "boolean" | "bool" => Ok(Self::Boolean),
            _ => Err(AmiTypeError::UnknownType(s.to_string())),
        }
    }
}

/// A concrete AMI parameter value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AmiValue {
    /// Integer value.
    Integer(i64),

    /// Floating-point value.
    Float(f64),

    /// String value.
    String(String),

    /// Boolean value.
    Boolean(bool),

    /// Several values under one name (model output only).
    List(Vec<AmiValue>),
}

impl AmiValue {
    /// Try to extract as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to extract as i64. Floats convert only when integral.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// Try to extract as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to extract as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::List(_) => "list",
        }
    }

    /// True if this value cannot be written as a quoted string literal.
    ///
    /// The parameter grammar has no escape sequences, so a string that
    /// itself contains `"` has no text form.
    pub fn has_unquotable_text(&self) -> bool {
        match self {
            Self::String(s) => s.contains('"'),
            Self::List(items) => items.iter().any(Self::has_unquotable_text),
            _ => false,
        }
    }
}

/// Canonical text form: integers in decimal, floats in shortest
/// round-trip form with a decimal point or exponent, strings quoted,
/// Booleans as `True`/`False`, lists space separated.
impl fmt::Display for AmiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Boolean(true) => f.write_str("True"),
            Self::Boolean(false) => f.write_str("False"),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// How a `Single` parameter's value is constrained.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Format {
    /// A plain value.
    Value(AmiValue),

    /// A nominal value with inclusive bounds.
    Range {
        typ: AmiValue,
        min: AmiValue,
        max: AmiValue,
    },

    /// One of a fixed set of choices, optionally with display labels.
    List {
        choices: Vec<AmiValue>,
        tips: Vec<String>,
    },

    /// No value tag; the parameter's `Default` supplies the value.
    DefaultOnly,
}

/// The three shapes a parameter can take.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamKind {
    /// A scalar that does not vary with corner.
    Single {
        usage: Usage,
        ptype: ParamType,
        format: Format,
    },

    /// A typ/min/max triple. `None` marks a slot that is not available.
    Corner {
        usage: Usage,
        ptype: ParamType,
        typ: AmiValue,
        min: Option<AmiValue>,
        max: Option<AmiValue>,
    },

    /// A named container of parameters; has no value of its own.
    Group(Vec<Parameter>),
}

/// One node of a parameter tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Name, unique among siblings.
    pub name: String,

    /// Optional `Default` tag.
    pub default: Option<AmiValue>,

    /// When set, a missing corner slot drops the parameter instead of
    /// failing resolution.
    pub optional: bool,

    /// Free-form description.
    pub description: Option<String>,

    pub kind: ParamKind,
}

impl Parameter {
    /// A plain scalar leaf.
    pub fn single(name: impl Into<String>, usage: Usage, ptype: ParamType, value: AmiValue) -> Self {
        Self::with_kind(
            name,
            ParamKind::Single {
                usage,
                ptype,
                format: Format::Value(value),
            },
        )
    }

    /// A corner-triple leaf.
    pub fn corner(
        name: impl Into<String>,
        usage: Usage,
        ptype: ParamType,
        typ: AmiValue,
        min: Option<AmiValue>,
        max: Option<AmiValue>,
    ) -> Self {
        Self::with_kind(
            name,
            ParamKind::Corner {
                usage,
                ptype,
                typ,
                min,
                max,
            },
        )
    }

    /// A group of parameters.
    pub fn group(name: impl Into<String>, children: Vec<Parameter>) -> Self {
        Self::with_kind(name, ParamKind::Group(children))
    }

    fn with_kind(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            default: None,
            optional: false,
            description: None,
            kind,
        }
    }

    /// Builder: set `Default`.
    pub fn with_default(mut self, value: AmiValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Builder: mark optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Builder: set the description.
    pub fn with_description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Usage of a leaf; `None` for groups.
    pub fn usage(&self) -> Option<Usage> {
        match &self.kind {
            ParamKind::Single { usage, .. } | ParamKind::Corner { usage, .. } => Some(*usage),
            ParamKind::Group(_) => None,
        }
    }

    /// Declared type of a leaf; `None` for groups.
    pub fn param_type(&self) -> Option<ParamType> {
        match &self.kind {
            ParamKind::Single { ptype, .. } | ParamKind::Corner { ptype, .. } => Some(*ptype),
            ParamKind::Group(_) => None,
        }
    }

    /// Children of a group; empty for leaves.
    pub fn children(&self) -> &[Parameter] {
        match &self.kind {
            ParamKind::Group(children) => children,
            _ => &[],
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, ParamKind::Group(_))
    }

    /// Value of a `Single` leaf, independent of corner.
    ///
    /// A `List` without an explicit choice yields its `Default` if that
    /// is one of the choices, otherwise the first choice.
    pub fn single_value(&self) -> Option<&AmiValue> {
        let ParamKind::Single { format, .. } = &self.kind else {
            return None;
        };
        match format {
            Format::Value(v) => Some(v),
            Format::Range { typ, .. } => Some(typ),
            Format::List { choices, .. } => self
                .default
                .as_ref()
                .filter(|d| choices.contains(d))
                .or_else(|| choices.first()),
            Format::DefaultOnly => self.default.as_ref(),
        }
    }

    /// Value of this leaf at `corner`. `Single` leaves ignore the corner;
    /// `None` means the selected slot is not available.
    pub fn value_at(&self, corner: Corner) -> Option<&AmiValue> {
        match &self.kind {
            ParamKind::Single { .. } => self.single_value(),
            ParamKind::Corner { typ, min, max, .. } => match corner {
                Corner::Typ => Some(typ),
                Corner::Min => min.as_ref(),
                Corner::Max => max.as_ref(),
            },
            ParamKind::Group(_) => None,
        }
    }

    /// Find a direct child by name.
    pub fn child(&self, name: &str) -> Option<&Parameter> {
        self.children().iter().find(|p| p.name == name)
    }

    /// Append the canonical text of this parameter to `out`.
    pub fn write_ami(&self, out: &mut String) {
        out.push('(');
        out.push_str(&self.name);
        match &self.kind {
            ParamKind::Group(children) => {
                if self.description.is_some() || !children.is_empty() {
                    out.push(' ');
                }
                if let Some(desc) = &self.description {
                    push_tag(out, "Description", &format!("\"{desc}\""));
                }
                for child in children {
                    child.write_ami(out);
                }
            }
            ParamKind::Single {
                usage,
                ptype,
                format,
            } => {
                out.push(' ');
                push_tag(out, "Usage", usage.as_str());
                push_tag(out, "Type", ptype.as_str());
                let mut tips: &[String] = &[];
                match format {
                    Format::Value(v) => push_tag(out, "Value", &v.to_string()),
                    Format::Range { typ, min, max } => {
                        push_tag(out, "Format", &format!("Range {typ} {min} {max}"))
                    }
                    Format::List { choices, tips: t } => {
                        let joined = AmiValue::List(choices.clone()).to_string();
                        push_tag(out, "Format", &format!("List {joined}"));
                        tips = t;
                    }
                    Format::DefaultOnly => {}
                }
                self.write_trailing_tags(out);
                if !tips.is_empty() {
                    let quoted: Vec<String> = tips.iter().map(|t| format!("\"{t}\"")).collect();
                    push_tag(out, "List_Tip", &quoted.join(" "));
                }
            }
            ParamKind::Corner {
                usage,
                ptype,
                typ,
                min,
                max,
            } => {
                out.push(' ');
                push_tag(out, "Usage", usage.as_str());
                push_tag(out, "Type", ptype.as_str());
                let slot = |v: &Option<AmiValue>| v.as_ref().map_or("NA".to_string(), |v| v.to_string());
                push_tag(
                    out,
                    "Format",
                    &format!("Corner {typ} {} {}", slot(min), slot(max)),
                );
                self.write_trailing_tags(out);
            }
        }
        out.push(')');
    }

    fn write_trailing_tags(&self, out: &mut String) {
        if let Some(d) = &self.default {
            push_tag(out, "Default", &d.to_string());
        }
        if self.optional {
            push_tag(out, "Optional", "True");
        }
        if let Some(desc) = &self.description {
            push_tag(out, "Description", &format!("\"{desc}\""));
        }
    }
}

fn push_tag(out: &mut String, tag: &str, body: &str) {
    out.push('(');
    out.push_str(tag);
    out.push(' ');
    out.push_str(body);
    out.push(')');
}

/// The two mandated top-level groups of an `.ami` file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Section {
    Reserved,
    ModelSpecific,
}

impl Section {
    /// Recognize a section by its group name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "reserved_parameters" | "reserved" => Some(Self::Reserved),
            "model_specific" => Some(Self::ModelSpecific),
            _ => None,
        }
    }

    /// Group name used when writing a file.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Reserved => RESERVED_SECTION,
            Self::ModelSpecific => MODEL_SPECIFIC_SECTION,
        }
    }

    /// Short label used at the head of parameter paths.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Reserved => "Reserved",
            Self::ModelSpecific => "Model-Specific",
        }
    }
}

/// A complete parameter declaration: a root name plus top-level nodes.
///
/// Trees read from an `.ami` file carry exactly the two section groups;
/// trees built programmatically may hold parameters directly under the
/// root.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterTree {
    /// Root name, usually the model name.
    pub name: String,

    /// Root-level description.
    pub description: Option<String>,

    /// Top-level nodes in declaration order.
    pub params: Vec<Parameter>,
}

impl ParameterTree {
    /// An empty tree.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            params: Vec::new(),
        }
    }

    /// A tree holding the two standard sections.
    pub fn with_sections(
        name: impl Into<String>,
        reserved: Vec<Parameter>,
        model_specific: Vec<Parameter>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            params: vec![
                Parameter::group(RESERVED_SECTION, reserved),
                Parameter::group(MODEL_SPECIFIC_SECTION, model_specific),
            ],
        }
    }

    /// The group for `section`, if present.
    pub fn section(&self, section: Section) -> Option<&Parameter> {
        self.params
            .iter()
            .find(|p| p.is_group() && Section::from_name(&p.name) == Some(section))
    }

    /// Parameters of the reserved section.
    pub fn reserved(&self) -> &[Parameter] {
        self.section(Section::Reserved)
            .map(Parameter::children)
            .unwrap_or(&[])
    }

    /// Parameters of the model-specific section.
    pub fn model_specific(&self) -> &[Parameter] {
        self.section(Section::ModelSpecific)
            .map(Parameter::children)
            .unwrap_or(&[])
    }

    /// Look up a node by its path from the root, e.g.
    /// `["Model_Specific", "tx_taps", "tap_0"]`.
    pub fn find(&self, path: &[&str]) -> Option<&Parameter> {
        let (first, rest) = path.split_first()?;
        let mut node = self.params.iter().find(|p| p.name == *first)?;
        for seg in rest {
            node = node.child(seg)?;
        }
        Some(node)
    }

    /// Look up a reserved parameter by name.
    pub fn reserved_param(&self, name: &str) -> Option<&Parameter> {
        self.reserved().iter().find(|p| p.name == name)
    }

    /// Canonical text of the whole tree.
    pub fn to_ami_string(&self) -> String {
        let mut out = String::new();
        out.push('(');
        out.push_str(&self.name);
        if self.description.is_some() || !self.params.is_empty() {
            out.push(' ');
        }
        if let Some(desc) = &self.description {
            push_tag(&mut out, "Description", &format!("\"{desc}\""));
        }
        for p in &self.params {
            p.write_ami(&mut out);
        }
        out.push(')');
        out
    }
}

/// AMI session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Session created but AMI_Init not called.
    Created,
    /// AMI_Init completed successfully; GetWave and Close are allowed.
    Ready,
    /// AMI_Close has been called.
    Closed,
    /// AMI_Init failed; the native handle (if any) was released.
    Faulted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "Created",
            Self::Ready => "Ready",
            Self::Closed => "Closed",
            Self::Faulted => "Faulted",
        };
        f.write_str(s)
    }
}

/// Result from AMI_Init call.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AmiInitResult {
    /// The impulse matrix after the model processed it in place.
    pub impulse_out: Vec<f64>,

    /// Output parameters parsed from the model's returned text.
    pub params_out: crate::ResolvedParameters,

    /// The model's returned parameter text, verbatim.
    pub params_out_text: Option<String>,

    /// Message from the model.
    pub message: Option<String>,

    /// Whether the model declared itself reentrant.
    pub reentrant: bool,
}

/// Result from AMI_GetWave call.
#[derive(Clone, Debug, Default, Serialize)]
pub struct AmiGetWaveResult {
    /// Clock times the model reported, if any.
    pub clock_times: Option<Vec<f64>>,

    /// Output parameters parsed from the model's returned text.
    pub params_out: crate::ResolvedParameters,

    /// The model's returned parameter text, verbatim.
    pub params_out_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_leaf() {
        let mut tree = ParameterTree::new("root");
        tree.params.push(Parameter::single(
            "Mode",
            Usage::In,
            ParamType::Int,
            AmiValue::Integer(1),
        ));
        assert_eq!(tree.to_ami_string(), "(root (Mode (Usage In)(Type Int)(Value 1)))");
    }

    #[test]
    fn test_canonical_corner_with_na() {
        let p = Parameter::corner(
            "vswing",
            Usage::In,
            ParamType::Float,
            AmiValue::Float(2.5),
            Some(AmiValue::Float(2.0)),
            None,
        )
        .optional();
        let mut out = String::new();
        p.write_ami(&mut out);
        assert_eq!(
            out,
            "(vswing (Usage In)(Type Float)(Format Corner 2.5 2.0 NA)(Optional True))"
        );
    }

    #[test]
    fn test_canonical_list_with_tips() {
        let p = Parameter {
            name: "mode".into(),
            default: Some(AmiValue::Integer(2)),
            optional: false,
            description: Some("Operating mode".into()),
            kind: ParamKind::Single {
                usage: Usage::In,
                ptype: ParamType::Int,
                format: Format::List {
                    choices: vec![AmiValue::Integer(1), AmiValue::Integer(2)],
                    tips: vec!["slow".into(), "fast".into()],
                },
            },
        };
        let mut out = String::new();
        p.write_ami(&mut out);
        assert_eq!(
            out,
            "(mode (Usage In)(Type Int)(Format List 1 2)(Default 2)\
             (Description \"Operating mode\")(List_Tip \"slow\" \"fast\"))"
        );
        assert_eq!(p.single_value(), Some(&AmiValue::Integer(2)));
    }

    #[test]
    fn test_value_at_corner() {
        let p = Parameter::corner(
            "x",
            Usage::In,
            ParamType::Int,
            AmiValue::Integer(5),
            None,
            Some(AmiValue::Integer(7)),
        );
        assert_eq!(p.value_at(Corner::Typ), Some(&AmiValue::Integer(5)));
        assert_eq!(p.value_at(Corner::Min), None);
        assert_eq!(p.value_at(Corner::Max), Some(&AmiValue::Integer(7)));
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("Integer".parse::<ParamType>(), Ok(ParamType::Int));
        assert_eq!("InOut".parse::<Usage>(), Ok(Usage::InOut));
        assert_eq!("max".parse::<Corner>(), Ok(Corner::Max));
        assert!("Sideways".parse::<Usage>().is_err());
    }

    #[test]
    fn test_float_display_is_round_trippable() {
        assert_eq!(AmiValue::Float(1.0).to_string(), "1.0");
        assert_eq!(AmiValue::Float(1e-12).to_string(), "1e-12");
        assert_eq!(AmiValue::Float(0.25).to_string(), "0.25");
    }

    #[test]
    fn test_sections() {
        let tree = ParameterTree::with_sections(
            "model",
            vec![Parameter::single(
                "GetWave_Exists",
                Usage::Info,
                ParamType::Boolean,
                AmiValue::Boolean(true),
            )],
            vec![],
        );
        assert!(tree.reserved_param("GetWave_Exists").is_some());
        assert!(tree.model_specific().is_empty());
        assert_eq!(Section::from_name("Model-Specific"), Some(Section::ModelSpecific));
        assert!(is_reserved_name("Ignore_Bits"));
    }
}
