//! Detection operators backed by the injection heuristics.

use super::traits::Operator;
use crate::engine::Transaction;
use crate::injection;

/// SQL injection detector. The fingerprint of the detected pattern goes
/// into capture slot 0.
pub struct DetectSqli;

impl Operator for DetectSqli {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        match injection::sqli_fingerprint(value) {
            Some(fingerprint) => {
                tx.capture_field(0, &fingerprint);
                true
            }
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "detectSQLi"
    }
}

/// Cross-site scripting detector.
pub struct DetectXss;

impl Operator for DetectXss {
    fn evaluate(&self, _tx: &mut Transaction, value: &str) -> bool {
        injection::is_xss(value)
    }

    fn name(&self) -> &'static str {
        "detectXSS"
    }
}
