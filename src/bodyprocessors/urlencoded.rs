//! `application/x-www-form-urlencoded` body processor.

use std::io::Read;

use super::{BodyProcessor, BodyProcessorOptions};
use crate::error::Result;
use crate::transformations::url_decode_bytes;
use crate::variables::{TransactionVariables, VariableKind};

/// Decode one form component. Returns the text and whether an invalid
/// escape was seen.
fn decode_component(input: &str) -> (String, bool) {
    let (bytes, invalid) = url_decode_bytes(input, false);
    (String::from_utf8_lossy(&bytes).into_owned(), invalid)
}

/// Walk `key=value` pairs separated by `&` or `;`, decoding both sides.
/// A pair without `=` yields an empty value. Returns whether any component
/// carried an invalid escape.
pub(crate) fn parse_query(input: &str, mut add: impl FnMut(&str, &str)) -> bool {
    let mut invalid = false;
    for pair in input.split(['&', ';']) {
        if pair.is_empty() {
            continue;
        }
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let (key, bad_key) = decode_component(raw_key);
        let (value, bad_value) = decode_component(raw_value);
        invalid |= bad_key | bad_value;
        if key.is_empty() {
            continue;
        }
        add(&key, &value);
    }
    invalid
}

/// Form-body processor: fills `ARGS_POST` on the request side and
/// `RESPONSE_ARGS` on the response side.
pub struct Urlencoded;

impl BodyProcessor for Urlencoded {
    fn name(&self) -> &'static str {
        "urlencoded"
    }

    fn process_request(
        &self,
        reader: &mut dyn Read,
        variables: &mut TransactionVariables,
        _options: &BodyProcessorOptions,
    ) -> Result<()> {
        let mut body = String::new();
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        body.push_str(&String::from_utf8_lossy(&bytes));
        let invalid = parse_query(body.trim_end_matches(['\r', '\n']), |key, value| {
            variables.add_post_argument(key, value);
        });
        if invalid {
            variables.set_single(VariableKind::UrlencodedError, "1");
        }
        Ok(())
    }

    fn process_response(
        &self,
        reader: &mut dyn Read,
        variables: &mut TransactionVariables,
        _options: &BodyProcessorOptions,
    ) -> Result<()> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let body = String::from_utf8_lossy(&bytes).into_owned();
        parse_query(body.trim_end_matches(['\r', '\n']), |key, value| {
            if let Some(map) = variables.map_mut(VariableKind::ResponseArgs) {
                map.add(key, value);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(input: &str) -> (Vec<(String, String)>, bool) {
        let mut out = Vec::new();
        let invalid = parse_query(input, |k, v| out.push((k.to_string(), v.to_string())));
        (out, invalid)
    }

    #[test]
    fn splits_on_both_separators() {
        let (got, invalid) = pairs("a=1&b=2;c=3");
        assert_eq!(
            got,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
                ("c".to_string(), "3".to_string()),
            ]
        );
        assert!(!invalid);
    }

    #[test]
    fn decodes_escapes_and_plus() {
        let (got, invalid) = pairs("q=1%27+OR&x%20y=z");
        assert_eq!(got[0], ("q".to_string(), "1' OR".to_string()));
        assert_eq!(got[1], ("x y".to_string(), "z".to_string()));
        assert!(!invalid);
    }

    #[test]
    fn pair_without_equals_has_empty_value() {
        let (got, _) = pairs("flag&a=1");
        assert_eq!(got[0], ("flag".to_string(), String::new()));
    }

    #[test]
    fn invalid_escape_is_flagged_and_kept() {
        let (got, invalid) = pairs("a=%zz");
        assert_eq!(got[0].1, "%zz");
        assert!(invalid);
    }

    #[test]
    fn empty_keys_are_dropped() {
        let (got, _) = pairs("=orphan&&a=1");
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, "a");
    }

    #[test]
    fn request_side_fills_args_post() {
        let mut variables = TransactionVariables::new(100);
        let mut reader: &[u8] = b"user=admin&pass=s3cret";
        Urlencoded
            .process_request(
                &mut reader,
                &mut variables,
                &BodyProcessorOptions::default(),
            )
            .unwrap();
        assert_eq!(
            variables.first_value(VariableKind::ArgsPost, "user"),
            "admin"
        );
        assert_eq!(
            variables.first_value(VariableKind::ArgsPost, "pass"),
            "s3cret"
        );
    }
}
