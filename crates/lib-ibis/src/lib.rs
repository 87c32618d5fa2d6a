//! # lib-ibis
//!
//! Parsers for the two text formats an IBIS-AMI model ships with:
//! - `.ibs` model-description files, read by a line-oriented keyword
//!   grammar ([`keyword`]) and then into typed structures ([`ibs_parser`])
//! - `.ami` parameter files, read by an s-expression reader ([`sexpr`])
//!   into a typed [`ParameterTree`](lib_types::ami::ParameterTree)
//!   ([`ami_parser`])
//!
//! [`corner`] flattens a parameter tree into the concrete values sent to a
//! native model for one corner.
//!
//! Every parser fails on the first error; there is no partial result.

pub mod ami_parser;
pub mod corner;
pub mod error;
pub mod ibs_parser;
pub mod keyword;
pub mod numeric;
pub mod sexpr;
pub mod source;

pub use ami_parser::{parse_ami_file, parse_param_values, parse_parameter_tree, AmiFile};
pub use corner::{resolve, resolve_all};
pub use error::{CornerResolutionError, ParseError, ParseResult, ValidationError};
pub use ibs_parser::{parse_ibs_file, IbisFile};
pub use keyword::{KeywordDocument, KeywordNode};
pub use source::{parse_ami_path, parse_ibs_path, FsSource, MemorySource, TextSource};
