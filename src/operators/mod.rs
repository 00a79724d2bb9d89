//! Rule operators.
//!
//! Operators are looked up by name at rule-load time; unknown names and
//! malformed arguments fail there rather than during evaluation.

mod comparison;
mod detection;
mod inspect;
mod network;
mod pattern;
mod traits;
mod validation;

pub use comparison::{BeginsWith, Contains, ContainsWord, EndsWith, NumCompare, Streq, Within};
pub use detection::{DetectSqli, DetectXss};
pub use inspect::InspectFile;
pub use network::{IpMatch, Rbl};
pub use pattern::{Pm, Restpath, Rx};
pub use traits::{Operator, OperatorOptions};
pub use validation::{ValidateByteRange, ValidateNid, ValidateUrlEncoding, ValidateUtf8Encoding};

use crate::engine::Transaction;
use crate::error::{Error, Result};
use comparison::CompareOp;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Instantiate an operator by its rule-definition name.
pub fn create_operator(name: &str, options: OperatorOptions) -> Result<Arc<dyn Operator>> {
    let args = options.arguments.as_str();
    match name.to_ascii_lowercase().as_str() {
        "rx" => Ok(Arc::new(Rx::new(args)?)),
        "pm" => Ok(Arc::new(Pm::new(args)?)),
        "pmfromfile" | "pmf" => Ok(Arc::new(Pm::from_file(args, &options.search_paths)?)),
        "pmfromdataset" => Ok(Arc::new(Pm::from_dataset(args, &options.datasets)?)),
        "beginswith" => Ok(Arc::new(BeginsWith::new(args)?)),
        "endswith" => Ok(Arc::new(EndsWith::new(args)?)),
        "contains" => Ok(Arc::new(Contains::new(args)?)),
        "containsword" => Ok(Arc::new(ContainsWord::new(args)?)),
        "streq" => Ok(Arc::new(Streq::new(args)?)),
        "within" => Ok(Arc::new(Within::new(args)?)),
        "eq" => Ok(Arc::new(NumCompare::new(CompareOp::Eq, args)?)),
        "ge" => Ok(Arc::new(NumCompare::new(CompareOp::Ge, args)?)),
        "gt" => Ok(Arc::new(NumCompare::new(CompareOp::Gt, args)?)),
        "le" => Ok(Arc::new(NumCompare::new(CompareOp::Le, args)?)),
        "lt" => Ok(Arc::new(NumCompare::new(CompareOp::Lt, args)?)),
        "ipmatch" => Ok(Arc::new(IpMatch::new(args)?)),
        "ipmatchfromfile" | "ipmatchf" => {
            Ok(Arc::new(IpMatch::from_file(args, &options.search_paths)?))
        }
        "ipmatchfromdataset" => Ok(Arc::new(IpMatch::from_dataset(args, &options.datasets)?)),
        "validatebyterange" => Ok(Arc::new(ValidateByteRange::new(args)?)),
        "validateurlencoding" => Ok(Arc::new(ValidateUrlEncoding)),
        "validateutf8encoding" => Ok(Arc::new(ValidateUtf8Encoding)),
        "validatenid" => Ok(Arc::new(ValidateNid::new(args)?)),
        "detectsqli" => Ok(Arc::new(DetectSqli)),
        "detectxss" => Ok(Arc::new(DetectXss)),
        "rbl" => Ok(Arc::new(Rbl::new(args))),
        "geolookup" => Ok(Arc::new(GeoLookup)),
        "inspectfile" => Ok(Arc::new(InspectFile::new(args, &options.search_paths)?)),
        "restpath" => Ok(Arc::new(Restpath::new(args)?)),
        "nomatch" => Ok(Arc::new(NoMatch)),
        "unconditionalmatch" => Ok(Arc::new(UnconditionalMatch)),
        other => Err(Error::UnknownOperator {
            name: other.to_string(),
        }),
    }
}

// File loading shared by the *FromFile operators: the path is tried
// as-is, then joined onto each search path. Blank lines and comments are
// dropped.
pub(crate) fn read_list_file(path: &str, search_paths: &[PathBuf]) -> Result<Vec<String>> {
    let given = Path::new(path);
    let mut candidates = vec![given.to_path_buf()];
    if given.is_relative() {
        candidates.extend(search_paths.iter().map(|dir| dir.join(given)));
    }

    let mut last_error: Option<std::io::Error> = None;
    for candidate in &candidates {
        match std::fs::read_to_string(candidate) {
            Ok(content) => {
                return Ok(content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty() && !line.starts_with('#'))
                    .map(str::to_string)
                    .collect());
            }
            Err(err) => last_error = Some(err),
        }
    }
    Err(Error::FileLoad {
        path: given.to_path_buf(),
        source: last_error.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "no candidate paths")
        }),
    })
}

/// Never matches.
pub struct NoMatch;

impl Operator for NoMatch {
    fn evaluate(&self, _tx: &mut Transaction, _value: &str) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "noMatch"
    }
}

/// Always matches.
pub struct UnconditionalMatch;

impl Operator for UnconditionalMatch {
    fn evaluate(&self, _tx: &mut Transaction, _value: &str) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "unconditionalMatch"
    }
}

/// Geo databases are not wired in; the lookup reports a hit so rules
/// keyed on it still run.
pub struct GeoLookup;

impl Operator for GeoLookup {
    fn evaluate(&self, _tx: &mut Transaction, _value: &str) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "geoLookup"
    }
}
