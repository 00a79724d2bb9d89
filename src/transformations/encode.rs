//! Encoding and digest transformations.

use super::Transformation;
use crate::error::Result;
use std::borrow::Cow;

/// Base64 encode.
pub struct Base64Encode;

impl Transformation for Base64Encode {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        use base64::Engine;
        Ok(Cow::Owned(
            base64::engine::general_purpose::STANDARD.encode(input),
        ))
    }

    fn name(&self) -> &'static str {
        "base64Encode"
    }
}

/// Hex encode every byte as two lowercase digits.
pub struct HexEncode;

impl Transformation for HexEncode {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        if input.is_empty() {
            return Ok(Cow::Borrowed(input));
        }
        let mut encoded = String::with_capacity(input.len() * 2);
        for b in input.bytes() {
            encoded.push_str(&format!("{:02x}", b));
        }
        Ok(Cow::Owned(encoded))
    }

    fn name(&self) -> &'static str {
        "hexEncode"
    }
}

/// Percent-encode everything outside the unreserved alphanumerics.
pub struct UrlEncode;

impl Transformation for UrlEncode {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
        let encoded = utf8_percent_encode(input, NON_ALPHANUMERIC).to_string();
        if encoded == input {
            Ok(Cow::Borrowed(input))
        } else {
            Ok(Cow::Owned(encoded))
        }
    }

    fn name(&self) -> &'static str {
        "urlEncode"
    }
}

/// MD5 digest, rendered as lowercase hex.
pub struct Md5;

impl Transformation for Md5 {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        use md5::{Digest, Md5 as Md5Hasher};
        let mut hasher = Md5Hasher::new();
        hasher.update(input.as_bytes());
        Ok(Cow::Owned(format!("{:x}", hasher.finalize())))
    }

    fn name(&self) -> &'static str {
        "md5"
    }
}

/// SHA-1 digest, rendered as lowercase hex.
pub struct Sha1;

impl Transformation for Sha1 {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        use sha1::{Digest, Sha1 as Sha1Hasher};
        let mut hasher = Sha1Hasher::new();
        hasher.update(input.as_bytes());
        Ok(Cow::Owned(format!("{:x}", hasher.finalize())))
    }

    fn name(&self) -> &'static str {
        "sha1"
    }
}

/// Replace the value with its byte length in decimal.
pub struct Length;

impl Transformation for Length {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        Ok(Cow::Owned(input.len().to_string()))
    }

    fn name(&self) -> &'static str {
        "length"
    }
}
