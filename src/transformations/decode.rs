//! Decoding transformations.

use super::Transformation;
use crate::error::Result;
use std::borrow::Cow;

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn hex_pair(bytes: &[u8], at: usize) -> Option<u8> {
    let hi = hex_val(*bytes.get(at)?)?;
    let lo = hex_val(*bytes.get(at + 1)?)?;
    Some(hi << 4 | lo)
}

// Code points in the full-width ASCII block fold down to their ASCII
// counterparts, everything else above 0xff keeps its low byte.
fn fold_code_point(code: u32) -> u8 {
    if (0xff01..=0xff5e).contains(&code) {
        (code - 0xfee0) as u8
    } else {
        (code & 0xff) as u8
    }
}

/// Decode `%XX` and `+`, optionally `%uXXXX`, into raw bytes. Returns the
/// bytes and whether an invalid escape was seen.
pub(crate) fn url_decode_bytes(input: &str, unicode: bool) -> (Vec<u8>, bool) {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut invalid = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if unicode && matches!(bytes.get(i + 1), Some(b'u') | Some(b'U')) {
                    let code = hex_pair(bytes, i + 2)
                        .zip(hex_pair(bytes, i + 4))
                        .map(|(hi, lo)| u32::from(hi) << 8 | u32::from(lo));
                    match code {
                        Some(code) => {
                            out.push(fold_code_point(code));
                            i += 6;
                        }
                        None => {
                            invalid = true;
                            out.push(b'%');
                            i += 1;
                        }
                    }
                } else {
                    match hex_pair(bytes, i + 1) {
                        Some(byte) => {
                            out.push(byte);
                            i += 3;
                        }
                        None => {
                            invalid = true;
                            out.push(b'%');
                            i += 1;
                        }
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    (out, invalid)
}

/// URL decode: `%XX` escapes and `+` as space. Invalid escapes are kept
/// literal.
pub struct UrlDecode;

impl Transformation for UrlDecode {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        let (bytes, _) = url_decode_bytes(input, false);
        let decoded = String::from_utf8_lossy(&bytes);
        if decoded == input {
            Ok(Cow::Borrowed(input))
        } else {
            Ok(Cow::Owned(decoded.into_owned()))
        }
    }

    fn name(&self) -> &'static str {
        "urlDecode"
    }
}

/// URL decode accepting IIS-style `%uXXXX` escapes as well.
pub struct UrlDecodeUni;

impl Transformation for UrlDecodeUni {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        let (bytes, _) = url_decode_bytes(input, true);
        let decoded = String::from_utf8_lossy(&bytes);
        if decoded == input {
            Ok(Cow::Borrowed(input))
        } else {
            Ok(Cow::Owned(decoded.into_owned()))
        }
    }

    fn name(&self) -> &'static str {
        "urlDecodeUni"
    }
}

fn is_base64_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'+' || b == b'/'
}

fn decode_base64_prefix(data: &str) -> Option<String> {
    use base64::Engine;
    let bytes = data.as_bytes();
    let end = bytes
        .iter()
        .position(|b| !is_base64_char(*b))
        .unwrap_or(bytes.len());
    // A lone trailing symbol cannot form a byte.
    let end = if end % 4 == 1 { end - 1 } else { end };
    if end == 0 {
        return None;
    }
    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(&bytes[..end])
        .ok()
        .map(|decoded| String::from_utf8_lossy(&decoded).into_owned())
}

/// Base64 decode. Decoding stops at the first character outside the
/// alphabet, matching the forgiving classic behaviour.
pub struct Base64Decode;

impl Transformation for Base64Decode {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        match decode_base64_prefix(input) {
            Some(decoded) if decoded != input => Ok(Cow::Owned(decoded)),
            _ => Ok(Cow::Borrowed(input)),
        }
    }

    fn name(&self) -> &'static str {
        "base64Decode"
    }
}

/// Base64 decode that first strips every character outside the alphabet.
pub struct Base64DecodeExt;

impl Transformation for Base64DecodeExt {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        let cleaned: String = input
            .bytes()
            .filter(|b| is_base64_char(*b))
            .map(char::from)
            .collect();
        match decode_base64_prefix(&cleaned) {
            Some(decoded) if decoded != input => Ok(Cow::Owned(decoded)),
            _ => Ok(Cow::Borrowed(input)),
        }
    }

    fn name(&self) -> &'static str {
        "base64DecodeExt"
    }
}

/// Hex decode. The input must be an even run of hex digits; anything else
/// is left unchanged.
pub struct HexDecode;

impl Transformation for HexDecode {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        let bytes = input.as_bytes();
        if bytes.is_empty() || bytes.len() % 2 != 0 {
            return Ok(Cow::Borrowed(input));
        }
        let mut out = Vec::with_capacity(bytes.len() / 2);
        for i in (0..bytes.len()).step_by(2) {
            match hex_pair(bytes, i) {
                Some(byte) => out.push(byte),
                None => return Ok(Cow::Borrowed(input)),
            }
        }
        Ok(Cow::Owned(String::from_utf8_lossy(&out).into_owned()))
    }

    fn name(&self) -> &'static str {
        "hexDecode"
    }
}

/// HTML entity decode (`&lt;`, `&#60;`, `&#x3c;`, ...).
pub struct HtmlEntityDecode;

impl Transformation for HtmlEntityDecode {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        let decoded = html_escape::decode_html_entities(input);
        if decoded == input {
            Ok(Cow::Borrowed(input))
        } else {
            Ok(Cow::Owned(decoded.into_owned()))
        }
    }

    fn name(&self) -> &'static str {
        "htmlEntityDecode"
    }
}

/// JavaScript escape decode (`\xHH`, `\uHHHH`, octal and single-char
/// escapes). An unknown escape drops the backslash.
pub struct JsDecode;

impl Transformation for JsDecode {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        if !input.contains('\\') {
            return Ok(Cow::Borrowed(input));
        }
        let bytes = input.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'\\' || i + 1 >= bytes.len() {
                out.push(bytes[i]);
                i += 1;
                continue;
            }
            match bytes[i + 1] {
                b'a' => {
                    out.push(0x07);
                    i += 2;
                }
                b'b' => {
                    out.push(0x08);
                    i += 2;
                }
                b'f' => {
                    out.push(0x0c);
                    i += 2;
                }
                b'n' => {
                    out.push(b'\n');
                    i += 2;
                }
                b'r' => {
                    out.push(b'\r');
                    i += 2;
                }
                b't' => {
                    out.push(b'\t');
                    i += 2;
                }
                b'v' => {
                    out.push(0x0b);
                    i += 2;
                }
                b'x' => match hex_pair(bytes, i + 2) {
                    Some(byte) => {
                        out.push(byte);
                        i += 4;
                    }
                    None => {
                        out.push(b'x');
                        i += 2;
                    }
                },
                b'u' => {
                    let code = hex_pair(bytes, i + 2)
                        .zip(hex_pair(bytes, i + 4))
                        .map(|(hi, lo)| u32::from(hi) << 8 | u32::from(lo));
                    match code {
                        Some(code) => {
                            out.push(fold_code_point(code));
                            i += 6;
                        }
                        None => {
                            out.push(b'u');
                            i += 2;
                        }
                    }
                }
                b'0'..=b'7' => {
                    let mut code = 0u32;
                    let mut taken = 0;
                    while taken < 3 {
                        match bytes.get(i + 1 + taken) {
                            Some(d @ b'0'..=b'7') => {
                                code = code * 8 + u32::from(d - b'0');
                                taken += 1;
                            }
                            _ => break,
                        }
                    }
                    out.push((code & 0xff) as u8);
                    i += 1 + taken;
                }
                other => {
                    out.push(other);
                    i += 2;
                }
            }
        }
        Ok(Cow::Owned(String::from_utf8_lossy(&out).into_owned()))
    }

    fn name(&self) -> &'static str {
        "jsDecode"
    }
}

/// CSS escape decode: `\` followed by up to six hex digits and an optional
/// trailing whitespace separator. A non-hex escaped character stands for
/// itself.
pub struct CssDecode;

impl Transformation for CssDecode {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        if !input.contains('\\') {
            return Ok(Cow::Borrowed(input));
        }
        let bytes = input.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] != b'\\' {
                out.push(bytes[i]);
                i += 1;
                continue;
            }
            let mut j = i + 1;
            let mut code = 0u32;
            while j < bytes.len() && j - i <= 6 {
                match hex_val(bytes[j]) {
                    Some(v) => {
                        code = code * 16 + u32::from(v);
                        j += 1;
                    }
                    None => break,
                }
            }
            if j > i + 1 {
                if matches!(bytes.get(j), Some(b' ') | Some(b'\t') | Some(b'\n')) {
                    j += 1;
                }
                out.push(fold_code_point(code));
                i = j;
            } else if j < bytes.len() {
                out.push(bytes[j]);
                i = j + 1;
            } else {
                // Trailing bare backslash.
                out.push(b'\\');
                i = j;
            }
        }
        Ok(Cow::Owned(String::from_utf8_lossy(&out).into_owned()))
    }

    fn name(&self) -> &'static str {
        "cssDecode"
    }
}
