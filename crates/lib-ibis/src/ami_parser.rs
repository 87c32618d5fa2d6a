//! AMI parameter file parser.
//!
//! Turns the parenthesized parameter grammar into a typed
//! [`ParameterTree`]:
//!
//! ```text
//! (example_tx
//!   (Reserved_Parameters
//!     (Init_Returns_Impulse (Usage Info)(Type Boolean)(Value True))
//!     (GetWave_Exists (Usage Info)(Type Boolean)(Value True)))
//!   (Model_Specific
//!     (tx_taps
//!       (tap_0 (Usage In)(Type Float)(Format Corner 0.1 0.05 NA)))))
//! ```
//!
//! Validation and syntax errors name the offending parameter by its dotted
//! path with the section shown by label, e.g. `Model-Specific.tx_taps.tap_0`.

use crate::error::{ParseError, ParseResult, ValidationError};
use crate::numeric;
use crate::sexpr::{self, SExpr};
use lib_types::ami::{
    is_reserved_name, AmiValue, Format, ParamKind, ParamType, Parameter, ParameterTree, Section,
    Usage, REQUIRED_RESERVED_PARAMS,
};
use lib_types::resolved::{ParamPath, ResolvedParameters};
use serde::Serialize;
use std::collections::HashSet;

/// Child heads that mark a node as a leaf parameter.
const LEAF_TAGS: &[&str] = &[
    "usage", "type", "value", "format", "default", "range", "list", "corner", "list_tip",
    "labels", "optional",
];

/// A parsed `.ami` file with its structural checks passed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AmiFile {
    pub tree: ParameterTree,
    /// Recoverable oddities found while checking the file.
    pub warnings: Vec<String>,
}

impl AmiFile {
    /// Model name from the root of the tree.
    pub fn name(&self) -> &str {
        &self.tree.name
    }

    fn reserved_bool(&self, name: &str) -> bool {
        self.tree
            .reserved_param(name)
            .and_then(Parameter::single_value)
            .and_then(AmiValue::as_bool)
            .unwrap_or(false)
    }

    /// Whether `AMI_Init` returns a modified impulse response.
    pub fn init_returns_impulse(&self) -> bool {
        self.reserved_bool("Init_Returns_Impulse")
    }

    /// Whether the model implements `AMI_GetWave`.
    pub fn getwave_exists(&self) -> bool {
        self.reserved_bool("GetWave_Exists")
    }

    /// Declared `AMI_Version`, if any.
    pub fn ami_version(&self) -> Option<String> {
        let value = self
            .tree
            .reserved_param("AMI_Version")
            .and_then(Parameter::single_value)?;
        Some(match value {
            AmiValue::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Parse an `.ami` file and check that both sections and the mandatory
/// reserved parameters are present.
pub fn parse_ami_file(text: &str) -> ParseResult<AmiFile> {
    let tree = parse_parameter_tree(text)?;
    let mut warnings = Vec::new();

    for p in &tree.params {
        if !p.is_group() || Section::from_name(&p.name).is_none() {
            tracing::warn!(name = %p.name, "Unrecognized top-level parameter group");
            warnings.push(format!("unrecognized top-level entry '{}'", p.name));
        }
    }

    for section in [Section::Reserved, Section::ModelSpecific] {
        if tree.section(section).is_none() {
            return Err(ValidationError::MissingSection {
                section: section.label().to_string(),
            }
            .into());
        }
    }

    for name in REQUIRED_RESERVED_PARAMS {
        if tree.reserved_param(name).is_none() {
            return Err(ValidationError::MissingReserved {
                path: Section::Reserved.label().to_string(),
                name: name.to_string(),
            }
            .into());
        }
    }

    for p in tree.reserved() {
        if !is_reserved_name(&p.name) {
            tracing::warn!(name = %p.name, "Unknown reserved parameter");
            warnings.push(format!("unknown reserved parameter '{}'", p.name));
        }
    }

    let reserved: HashSet<&str> = tree.reserved().iter().map(|p| p.name.as_str()).collect();
    if let Some(p) = tree
        .model_specific()
        .iter()
        .find(|p| reserved.contains(p.name.as_str()))
    {
        return Err(ValidationError::DuplicateName {
            path: Section::ModelSpecific.label().to_string(),
            name: p.name.clone(),
        }
        .into());
    }

    tracing::debug!(
        model = %tree.name,
        reserved = tree.reserved().len(),
        model_specific = tree.model_specific().len(),
        "Parsed AMI file"
    );
    Ok(AmiFile { tree, warnings })
}

/// Parse parameter text into a tree without requiring the two sections.
pub fn parse_parameter_tree(text: &str) -> ParseResult<ParameterTree> {
    let expr = read(text)?;
    let mut tree = ParameterTree::new(expr.head().unwrap_or_default());
    let mut seen = HashSet::new();

    for child in expr.tail() {
        let head = list_head(child, &tree.name)?;
        if head.eq_ignore_ascii_case("description") {
            tree.description = Some(joined_text(child.tail()));
            continue;
        }
        let path = Section::from_name(head).map_or(head, |s| s.label()).to_string();
        let param = parse_node(child, path)?;
        if !seen.insert(param.name.clone()) {
            return Err(ValidationError::DuplicateName {
                path: tree.name.clone(),
                name: param.name,
            }
            .into());
        }
        tree.params.push(param);
    }
    Ok(tree)
}

/// Read parameter text, naming syntax errors by parameter path.
fn read(text: &str) -> ParseResult<SExpr> {
    sexpr::parse(text).map_err(|e| e.map_path(parameter_path))
}

/// `root.Model_Specific.tx_taps` becomes `Model-Specific.tx_taps`. A path
/// holding only the root keeps the root name.
fn parameter_path(lists: &str) -> String {
    let mut segments = lists.split('.');
    let root = segments.next().unwrap_or_default();
    match segments.next() {
        None => root.to_string(),
        Some(first) => std::iter::once(Section::from_name(first).map_or(first, |s| s.label()))
            .chain(segments)
            .collect::<Vec<_>>()
            .join("."),
    }
}

/// Head of a list child of `path`, or a syntax error at a stray atom.
fn list_head<'a>(expr: &'a SExpr, path: &str) -> ParseResult<&'a str> {
    match expr.head() {
        Some(h) => Ok(h),
        None => {
            let pos = expr.pos();
            Err(ParseError::syntax(
                pos.line,
                pos.column,
                ["("],
                expr.atom().unwrap_or_default(),
            )
            .in_parameter(Some(path.to_string())))
        }
    }
}

fn joined_text(items: &[SExpr]) -> String {
    items
        .iter()
        .filter_map(SExpr::atom)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_node(expr: &SExpr, path: String) -> ParseResult<Parameter> {
    let name = expr.head().unwrap_or_default();
    let is_leaf = expr.tail().iter().any(|c| {
        c.head()
            .is_some_and(|h| LEAF_TAGS.contains(&h.to_ascii_lowercase().as_str()))
    });
    if is_leaf {
        return parse_leaf(expr, &path);
    }

    let mut children = Vec::new();
    let mut description = None;
    let mut seen = HashSet::new();
    for child in expr.tail() {
        let head = list_head(child, &path)?;
        if head.eq_ignore_ascii_case("description") {
            description = Some(joined_text(child.tail()));
            continue;
        }
        let param = parse_node(child, format!("{path}.{head}"))?;
        if !seen.insert(param.name.clone()) {
            return Err(ValidationError::DuplicateName {
                path,
                name: param.name,
            }
            .into());
        }
        children.push(param);
    }

    let mut group = Parameter::group(name, children);
    group.description = description;
    Ok(group)
}

/// Tags collected from a leaf's children.
#[derive(Default)]
struct LeafTags<'a> {
    usage: Option<&'a SExpr>,
    ptype: Option<&'a SExpr>,
    value: Option<&'a SExpr>,
    /// Format kind (`Range`, `List`, `Corner`, `Value`) and its arguments.
    format: Option<(&'a SExpr, &'a [SExpr])>,
    default: Option<&'a SExpr>,
    description: Option<&'a SExpr>,
    tips: Option<&'a SExpr>,
    optional: Option<&'a SExpr>,
}

/// Store a tag that may appear once per leaf.
fn set_once<T>(
    slot: &mut Option<T>,
    tag: T,
    path: &str,
    name: &str,
) -> Result<(), ValidationError> {
    if slot.is_some() {
        return Err(shape(path, format!("{name} given more than once")));
    }
    *slot = Some(tag);
    Ok(())
}

fn collect_tags<'a>(expr: &'a SExpr, path: &str) -> ParseResult<LeafTags<'a>> {
    let mut tags = LeafTags::default();
    for child in expr.tail() {
        let head = list_head(child, path)?;
        match head.to_ascii_lowercase().as_str() {
            "usage" => set_once(&mut tags.usage, child, path, "Usage")?,
            "type" => set_once(&mut tags.ptype, child, path, "Type")?,
            "value" => set_once(&mut tags.value, child, path, "Value")?,
            "format" => {
                let args = child.tail();
                match args.split_first() {
                    Some(format) => set_once(&mut tags.format, format, path, "Format")?,
                    None => return Err(shape(path, "empty Format").into()),
                }
            }
            "range" | "list" | "corner" => {
                if let Some(format) = child.items().split_first() {
                    set_once(&mut tags.format, format, path, "Format")?;
                }
            }
            "default" => set_once(&mut tags.default, child, path, "Default")?,
            "description" => tags.description = Some(child),
            "list_tip" | "labels" => tags.tips = Some(child),
            "optional" => tags.optional = Some(child),
            _ => tracing::warn!(path, tag = head, "Ignoring unknown parameter tag"),
        }
    }
    Ok(tags)
}

fn parse_leaf(expr: &SExpr, path: &str) -> ParseResult<Parameter> {
    let name = expr.head().unwrap_or_default();
    let tags = collect_tags(expr, path)?;

    let usage_text = single_atom(tags.usage, path, "Usage")?;
    let usage: Usage = usage_text.parse().map_err(|_| ValidationError::InvalidUsage {
        path: path.to_string(),
        found: usage_text.to_string(),
    })?;

    let type_text = single_atom(tags.ptype, path, "Type")?;
    let ptype: ParamType = type_text.parse().map_err(|_| ValidationError::UnknownType {
        path: path.to_string(),
        found: type_text.to_string(),
    })?;

    let mut default = match tags.default {
        Some(d) => Some(read_single(d, ptype, path)?),
        None => None,
    };
    if default.is_some() && usage == Usage::Out {
        return Err(ValidationError::DefaultOnOut {
            path: path.to_string(),
        }
        .into());
    }

    let value = match tags.value {
        Some(v) => Some(read_single(v, ptype, path)?),
        None => None,
    };

    let mut param = match tags.format {
        Some((kind, args)) => {
            let kind_text = kind.atom().unwrap_or_default();
            match kind_text.to_ascii_lowercase().as_str() {
                "corner" => {
                    let [typ, min, max] = triple(args, ptype, path, "Corner")?;
                    let typ = typ.ok_or_else(|| ValidationError::InvalidValue {
                        path: path.to_string(),
                        found: "NA".to_string(),
                        reason: "the typical value of a corner must be concrete".to_string(),
                    })?;
                    if value.is_some() {
                        tracing::warn!(path, "Value ignored alongside Format Corner");
                    }
                    Parameter::corner(name, usage, ptype, typ, min, max)
                }
                "range" => {
                    let [typ, min, max] = triple(args, ptype, path, "Range")?;
                    let (Some(typ), Some(min), Some(max)) = (typ, min, max) else {
                        return Err(ValidationError::InvalidValue {
                            path: path.to_string(),
                            found: "NA".to_string(),
                            reason: "Range bounds must be concrete".to_string(),
                        }
                        .into());
                    };
                    single(name, usage, ptype, Format::Range { typ, min, max })
                }
                "list" => {
                    let choices = args
                        .iter()
                        .map(|a| read_atom(a, ptype, path))
                        .collect::<Result<Vec<_>, _>>()?;
                    if choices.is_empty() {
                        return Err(shape(path, "List needs at least one choice").into());
                    }
                    let tips = match tags.tips {
                        Some(t) => t.tail().iter().filter_map(SExpr::atom).map(str::to_string).collect(),
                        None => Vec::new(),
                    };
                    if !tips.is_empty() && tips.len() != choices.len() {
                        return Err(shape(
                            path,
                            format!("{} List_Tip labels for {} choices", tips.len(), choices.len()),
                        )
                        .into());
                    }
                    if let Some(v) = value {
                        default = default.or(Some(v));
                    }
                    if let Some(d) = &default {
                        if !choices.contains(d) {
                            return Err(ValidationError::InvalidValue {
                                path: path.to_string(),
                                found: d.to_string(),
                                reason: "not one of the List choices".to_string(),
                            }
                            .into());
                        }
                    }
                    single(name, usage, ptype, Format::List { choices, tips })
                }
                "value" => {
                    let [arg] = args else {
                        return Err(shape(path, "Format Value takes exactly one value").into());
                    };
                    let v = read_atom(arg, ptype, path)?;
                    single(name, usage, ptype, Format::Value(v))
                }
                other => {
                    return Err(ValidationError::InvalidValue {
                        path: path.to_string(),
                        found: other.to_string(),
                        reason: "expected Value, Range, List or Corner".to_string(),
                    }
                    .into())
                }
            }
        }
        None => match (value, &default) {
            (Some(v), Some(_)) => {
                tracing::warn!(path, "Default ignored; Value takes precedence");
                single(name, usage, ptype, Format::Value(v))
            }
            (Some(v), None) => single(name, usage, ptype, Format::Value(v)),
            (None, Some(_)) => single(name, usage, ptype, Format::DefaultOnly),
            (None, None) => {
                return Err(ValidationError::MissingTag {
                    path: path.to_string(),
                    tag: "Value",
                }
                .into())
            }
        },
    };

    param.default = default;
    if let Some(d) = tags.description {
        param.description = Some(joined_text(d.tail()));
    }
    if let Some(o) = tags.optional {
        param.optional = read_atom_bool(o, path)?;
    }
    Ok(param)
}

fn single(name: &str, usage: Usage, ptype: ParamType, format: Format) -> Parameter {
    Parameter {
        name: name.to_string(),
        default: None,
        optional: false,
        description: None,
        kind: ParamKind::Single {
            usage,
            ptype,
            format,
        },
    }
}

fn shape(path: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::ShapeMismatch {
        path: path.to_string(),
        reason: reason.into(),
    }
}

/// The one atom of a tag such as `(Usage In)`.
fn single_atom<'a>(
    tag: Option<&'a SExpr>,
    path: &str,
    name: &'static str,
) -> Result<&'a str, ValidationError> {
    let tag = tag.ok_or_else(|| ValidationError::MissingTag {
        path: path.to_string(),
        tag: name,
    })?;
    match tag.tail() {
        [atom] if !atom.is_list() => Ok(atom.atom().unwrap_or_default()),
        _ => Err(shape(path, format!("({name} ...) takes exactly one atom"))),
    }
}

/// The one value of a `(Value v)` or `(Default v)` tag.
fn read_single(tag: &SExpr, ptype: ParamType, path: &str) -> Result<AmiValue, ValidationError> {
    match tag.tail() {
        [atom] => read_atom(atom, ptype, path),
        [] => Err(shape(path, format!("({} ...) is empty", tag.head().unwrap_or_default()))),
        [_, _, _] if ptype.allows_triple() => Err(shape(
            path,
            "three values given; use (Format Corner typ min max)",
        )),
        _ => Err(shape(
            path,
            format!("({} ...) takes exactly one value", tag.head().unwrap_or_default()),
        )),
    }
}

/// Read three slots, allowing `NA`. Rejected for non-numeric types.
fn triple(
    args: &[SExpr],
    ptype: ParamType,
    path: &str,
    kind: &str,
) -> Result<[Option<AmiValue>; 3], ValidationError> {
    if !ptype.allows_triple() {
        return Err(shape(path, format!("a {kind} triple is not valid for type {ptype}")));
    }
    let [typ, min, max] = args else {
        return Err(shape(
            path,
            format!("{kind} takes typ, min and max; found {} values", args.len()),
        ));
    };
    let slot = |a: &SExpr| -> Result<Option<AmiValue>, ValidationError> {
        if a.atom().is_some_and(|t| t.eq_ignore_ascii_case("na")) && !a.is_quoted() {
            Ok(None)
        } else {
            read_atom(a, ptype, path).map(Some)
        }
    };
    Ok([slot(typ)?, slot(min)?, slot(max)?])
}

/// Read one atom as a value of the declared type.
fn read_atom(atom: &SExpr, ptype: ParamType, path: &str) -> Result<AmiValue, ValidationError> {
    let Some(text) = atom.atom() else {
        return Err(shape(path, "nested list where a value was expected"));
    };
    let invalid = |reason: &str| ValidationError::InvalidValue {
        path: path.to_string(),
        found: text.to_string(),
        reason: reason.to_string(),
    };
    match ptype {
        ParamType::String => Ok(AmiValue::String(text.to_string())),
        _ if atom.is_quoted() => Err(invalid("quoted text for a non-String type")),
        ParamType::Int => numeric::parse_integer(text)
            .map(AmiValue::Integer)
            .ok_or_else(|| invalid("not an integer")),
        ParamType::Float | ParamType::UI | ParamType::Tap => numeric::parse_plain(text)
            .map(AmiValue::Float)
            .ok_or_else(|| invalid("not a number")),
        ParamType::Boolean => parse_bool(text)
            .map(AmiValue::Boolean)
            .ok_or_else(|| invalid("expected True or False")),
    }
}

fn read_atom_bool(tag: &SExpr, path: &str) -> Result<bool, ValidationError> {
    let text = single_atom(Some(tag), path, "Optional")?;
    parse_bool(text).ok_or_else(|| ValidationError::InvalidValue {
        path: path.to_string(),
        found: text.to_string(),
        reason: "expected True or False".to_string(),
    })
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Parse the value text a model sends or returns, e.g.
/// `(example_tx (tx_tap_units 27) (taps (pre -0.1)))`.
///
/// Types are inferred: quoted atoms are strings, `True`/`False` booleans,
/// integer literals integers, other numbers floats and any other word a
/// string. Several atoms under one name form a list.
pub fn parse_param_values(text: &str) -> ParseResult<ResolvedParameters> {
    let expr = read(text)?;
    let mut out = ResolvedParameters::new(expr.head().unwrap_or_default());
    collect_values(expr.tail(), &ParamPath::new(Vec::new()), &mut out);
    Ok(out)
}

fn collect_values(items: &[SExpr], prefix: &ParamPath, out: &mut ResolvedParameters) {
    for item in items {
        let Some(name) = item.head() else {
            tracing::debug!(atom = item.atom().unwrap_or_default(), "Skipping stray atom in value text");
            continue;
        };
        let path = prefix.child(name);
        let tail = item.tail();
        if tail.iter().any(SExpr::is_list) {
            collect_values(tail, &path, out);
            continue;
        }
        let mut values: Vec<AmiValue> = tail.iter().map(infer_value).collect();
        let value = match values.len() {
            0 => {
                tracing::debug!(%path, "Skipping empty value");
                continue;
            }
            1 => values.remove(0),
            _ => AmiValue::List(values),
        };
        out.insert(path, value);
    }
}

fn infer_value(atom: &SExpr) -> AmiValue {
    let text = atom.atom().unwrap_or_default();
    if atom.is_quoted() {
        return AmiValue::String(text.to_string());
    }
    if let Some(b) = parse_bool(text) {
        return AmiValue::Boolean(b);
    }
    if numeric::is_integer_literal(text) {
        if let Ok(i) = text.parse::<i64>() {
            return AmiValue::Integer(i);
        }
    }
    match numeric::parse_plain(text) {
        Some(f) => AmiValue::Float(f),
        None => AmiValue::String(text.to_string()),
    }
}
