//! Corner resolution: flatten a parameter tree into concrete values.

use crate::error::CornerResolutionError;
use lib_types::ami::{Corner, ParamKind, Parameter, ParameterTree, Section};
use lib_types::resolved::{ParamPath, ResolvedParameters};
use std::collections::BTreeMap;

/// Resolve every `In`/`InOut` leaf of `tree` at `corner`.
///
/// Keys are paths below the section groups, which are not part of what a
/// model sees. A `Corner` leaf whose selected slot is `NA` fails the whole
/// resolution unless the leaf is optional, in which case it is left out.
/// `Out` and `Info` leaves are never included. Two leaves that flatten to
/// the same key are rejected rather than letting one shadow the other.
///
/// The result depends only on `(tree, corner)`.
pub fn resolve(
    tree: &ParameterTree,
    corner: Corner,
) -> Result<ResolvedParameters, CornerResolutionError> {
    let mut out = ResolvedParameters::new(tree.name.clone());
    // Resolved key -> full path of the leaf that produced it.
    let mut origins = BTreeMap::new();
    for param in &tree.params {
        match Section::from_name(&param.name).filter(|_| param.is_group()) {
            Some(section) => {
                let error_prefix = section.label().to_string();
                for child in param.children() {
                    visit(
                        child,
                        &ParamPath::new(Vec::new()),
                        &error_prefix,
                        corner,
                        &mut out,
                        &mut origins,
                    )?;
                }
            }
            None => visit(
                param,
                &ParamPath::new(Vec::new()),
                "",
                corner,
                &mut out,
                &mut origins,
            )?,
        }
    }
    tracing::debug!(model = %tree.name, %corner, count = out.len(), "Resolved parameters");
    Ok(out)
}

/// Resolve at all three corners.
pub fn resolve_all(
    tree: &ParameterTree,
) -> [(Corner, Result<ResolvedParameters, CornerResolutionError>); 3] {
    Corner::ALL.map(|c| (c, resolve(tree, c)))
}

fn visit(
    param: &Parameter,
    prefix: &ParamPath,
    error_prefix: &str,
    corner: Corner,
    out: &mut ResolvedParameters,
    origins: &mut BTreeMap<ParamPath, String>,
) -> Result<(), CornerResolutionError> {
    let path = prefix.child(&param.name);
    if let ParamKind::Group(children) = &param.kind {
        for child in children {
            visit(child, &path, error_prefix, corner, out, origins)?;
        }
        return Ok(());
    }

    if !param.usage().is_some_and(|u| u.is_input()) {
        return Ok(());
    }

    let full_path = |path: &ParamPath| {
        if error_prefix.is_empty() {
            path.to_string()
        } else {
            format!("{error_prefix}.{path}")
        }
    };

    match param.value_at(corner) {
        Some(value) => {
            if let Some(first) = origins.get(&path) {
                return Err(CornerResolutionError::DuplicateKey {
                    key: path.to_string(),
                    first: first.clone(),
                    path: full_path(&path),
                });
            }
            origins.insert(path.clone(), full_path(&path));
            out.insert(path, value.clone());
        }
        None if param.optional => {
            tracing::trace!(%path, %corner, "Optional parameter has no value at corner");
        }
        None => {
            return Err(CornerResolutionError::Unavailable {
                path: full_path(&path),
                corner,
            });
        }
    }
    Ok(())
}
