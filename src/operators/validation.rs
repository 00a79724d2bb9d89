//! Validation operators. These match when the value is *malformed*.

use super::traits::Operator;
use crate::engine::Transaction;
use crate::error::{Error, Result};
use regex::Regex;

/// Matches when the value contains a byte outside the allowed ranges.
pub struct ValidateByteRange {
    allowed: [bool; 256],
}

impl ValidateByteRange {
    /// Parse a range spec such as `9,10,13,32-126`.
    pub fn new(spec: &str) -> Result<Self> {
        let mut allowed = [false; 256];
        let mut seen = false;
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (lo, hi) = match part.split_once('-') {
                Some((a, b)) => (parse_byte(a)?, parse_byte(b)?),
                None => {
                    let b = parse_byte(part)?;
                    (b, b)
                }
            };
            if lo > hi {
                return Err(Error::operator_argument(
                    "validateByteRange",
                    format!("inverted range {}-{}", lo, hi),
                ));
            }
            for b in lo..=hi {
                allowed[b as usize] = true;
            }
            seen = true;
        }
        if !seen {
            return Err(Error::operator_argument("validateByteRange", "empty range list"));
        }
        Ok(Self { allowed })
    }
}

fn parse_byte(text: &str) -> Result<u8> {
    text.trim()
        .parse::<u16>()
        .ok()
        .filter(|n| *n <= 255)
        .map(|n| n as u8)
        .ok_or_else(|| {
            Error::operator_argument("validateByteRange", format!("bad byte value {:?}", text))
        })
}

impl Operator for ValidateByteRange {
    fn evaluate(&self, _tx: &mut Transaction, value: &str) -> bool {
        value.bytes().any(|b| !self.allowed[b as usize])
    }

    fn name(&self) -> &'static str {
        "validateByteRange"
    }
}

/// Matches when the value carries a broken percent-escape.
pub struct ValidateUrlEncoding;

fn has_valid_url_encoding(value: &str) -> bool {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            match (bytes.get(i + 1), bytes.get(i + 2)) {
                (Some(a), Some(b)) if a.is_ascii_hexdigit() && b.is_ascii_hexdigit() => i += 3,
                _ => return false,
            }
        } else {
            i += 1;
        }
    }
    true
}

impl Operator for ValidateUrlEncoding {
    fn evaluate(&self, _tx: &mut Transaction, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }
        !has_valid_url_encoding(value)
    }

    fn name(&self) -> &'static str {
        "validateUrlEncoding"
    }
}

/// Matches when the value carries bytes that were not valid UTF-8.
///
/// Values are normalised on ingestion, so broken sequences surface as the
/// replacement character.
pub struct ValidateUtf8Encoding;

impl Operator for ValidateUtf8Encoding {
    fn evaluate(&self, _tx: &mut Transaction, value: &str) -> bool {
        value.contains('\u{fffd}')
    }

    fn name(&self) -> &'static str {
        "validateUtf8Encoding"
    }
}

#[derive(Clone, Copy, Debug)]
enum NidKind {
    Cl,
    Us,
}

/// Extracts national-identifier candidates with a regex and matches when
/// at least one passes its checksum. Valid candidates fill the capture
/// slots in order.
pub struct ValidateNid {
    kind: NidKind,
    regex: Regex,
}

impl ValidateNid {
    /// Parse an argument of the form `cl <regex>` or `us <regex>`.
    pub fn new(args: &str) -> Result<Self> {
        let (kind, pattern) = args
            .split_once(' ')
            .ok_or_else(|| Error::operator_argument("validateNid", "expected \"<type> <regex>\""))?;
        let kind = match kind {
            "cl" => NidKind::Cl,
            "us" => NidKind::Us,
            other => {
                return Err(Error::operator_argument(
                    "validateNid",
                    format!("unknown identifier type {:?}", other),
                ))
            }
        };
        let regex = Regex::new(pattern).map_err(|source| Error::RegexCompile {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { kind, regex })
    }
}

// Chilean RUT: mod-11 over the digits with weights cycling 2..=7, verifier
// digit 0-9 or K.
fn valid_cl_nid(candidate: &str) -> bool {
    let cleaned: String = candidate
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_uppercase();
    if cleaned.len() < 2 {
        return false;
    }
    let (digits, verifier) = cleaned.split_at(cleaned.len() - 1);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let mut sum = 0u32;
    let mut weight = 2u32;
    for b in digits.bytes().rev() {
        sum += u32::from(b - b'0') * weight;
        weight = if weight == 7 { 2 } else { weight + 1 };
    }
    let expected = match 11 - (sum % 11) {
        11 => '0',
        10 => 'K',
        d => char::from(b'0' + d as u8),
    };
    verifier.chars().next() == Some(expected)
}

// US SSN: nine digits, with the never-issued area/group/serial values
// rejected.
fn valid_us_nid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate
        .chars()
        .filter(char::is_ascii_digit)
        .map(|c| c as u32 - '0' as u32)
        .collect();
    if digits.len() != 9 {
        return false;
    }
    let area = digits[0] * 100 + digits[1] * 10 + digits[2];
    let group = digits[3] * 10 + digits[4];
    let serial = digits[5] * 1000 + digits[6] * 100 + digits[7] * 10 + digits[8];
    if area == 0 || area == 666 || area >= 900 {
        return false;
    }
    group != 0 && serial != 0
}

impl Operator for ValidateNid {
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool {
        let candidates: Vec<String> = self
            .regex
            .find_iter(value)
            .take(10)
            .map(|m| m.as_str().to_string())
            .collect();
        let mut matched = false;
        for (i, candidate) in candidates.iter().enumerate() {
            let valid = match self.kind {
                NidKind::Cl => valid_cl_nid(candidate),
                NidKind::Us => valid_us_nid(candidate),
            };
            if valid {
                matched = true;
                tx.capture_field(i, candidate);
            }
        }
        matched
    }

    fn name(&self) -> &'static str {
        "validateNid"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RuleGroup, Waf, WafConfig};

    fn test_tx() -> Transaction {
        Waf::new(WafConfig::default(), RuleGroup::new()).new_transaction()
    }

    #[test]
    fn byte_range_flags_outliers() {
        let op = ValidateByteRange::new("9,10,13,32-126").unwrap();
        let mut tx = test_tx();
        assert!(!op.evaluate(&mut tx, "plain text\r\n"));
        assert!(op.evaluate(&mut tx, "null\0byte"));
        assert!(!op.evaluate(&mut tx, ""));
    }

    #[test]
    fn byte_range_rejects_bad_specs() {
        assert!(ValidateByteRange::new("300").is_err());
        assert!(ValidateByteRange::new("50-20").is_err());
        assert!(ValidateByteRange::new("").is_err());
    }

    #[test]
    fn url_encoding_validation() {
        let op = ValidateUrlEncoding;
        let mut tx = test_tx();
        assert!(!op.evaluate(&mut tx, "hello%20world"));
        assert!(op.evaluate(&mut tx, "hello%2"));
        assert!(op.evaluate(&mut tx, "hello%GGworld"));
        assert!(!op.evaluate(&mut tx, ""));
    }

    #[test]
    fn utf8_validation_detects_replacement_char() {
        let op = ValidateUtf8Encoding;
        let mut tx = test_tx();
        assert!(!op.evaluate(&mut tx, "valid utf8 ✓"));
        let broken = String::from_utf8_lossy(b"bad \xff byte").into_owned();
        assert!(op.evaluate(&mut tx, &broken));
    }

    #[test]
    fn chilean_rut_checksum() {
        assert!(valid_cl_nid("11111111-1"));
        assert!(!valid_cl_nid("11111111-2"));
        assert!(valid_cl_nid("5.126.663-3"));
    }

    #[test]
    fn us_ssn_rules() {
        assert!(valid_us_nid("573-67-1654"));
        assert!(!valid_us_nid("000-12-3456"));
        assert!(!valid_us_nid("666-12-3456"));
        assert!(!valid_us_nid("901-12-3456"));
        assert!(!valid_us_nid("573-00-1654"));
        assert!(!valid_us_nid("573-67-0000"));
    }

    #[test]
    fn nid_operator_captures_valid_candidates() {
        let op = ValidateNid::new(r"us \d{3}-\d{2}-\d{4}").unwrap();
        let mut tx = test_tx();
        tx.capture = true;
        assert!(op.evaluate(&mut tx, "ssn: 573-67-1654 and 000-00-0000"));
        let vars = tx.variables();
        assert_eq!(
            vars.map(crate::variables::VariableKind::Tx)
                .unwrap()
                .get_first("0"),
            Some("573-67-1654")
        );
        assert!(!op.evaluate(&mut tx, "no identifiers here"));
    }

    #[test]
    fn nid_rejects_bad_arguments() {
        assert!(ValidateNid::new("cl").is_err());
        assert!(ValidateNid::new("xx \\d+").is_err());
    }
}
