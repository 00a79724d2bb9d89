//! Normalization transformations.

use super::Transformation;
use crate::error::Result;
use std::borrow::Cow;

/// Lowercase the value.
pub struct Lowercase;

impl Transformation for Lowercase {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        if input.chars().any(|c| c.is_uppercase()) {
            Ok(Cow::Owned(input.to_lowercase()))
        } else {
            Ok(Cow::Borrowed(input))
        }
    }

    fn name(&self) -> &'static str {
        "lowercase"
    }
}

/// Uppercase the value.
pub struct Uppercase;

impl Transformation for Uppercase {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        if input.chars().any(|c| c.is_lowercase()) {
            Ok(Cow::Owned(input.to_uppercase()))
        } else {
            Ok(Cow::Borrowed(input))
        }
    }

    fn name(&self) -> &'static str {
        "uppercase"
    }
}

fn is_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Collapse each whitespace run into a single space.
pub struct CompressWhitespace;

impl Transformation for CompressWhitespace {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        let mut out = String::with_capacity(input.len());
        let mut in_run = false;
        let mut changed = false;
        for b in input.bytes() {
            if is_ws(b) {
                if in_run {
                    changed = true;
                } else {
                    out.push(' ');
                    in_run = true;
                    changed |= b != b' ';
                }
            } else {
                out.push(char::from(b));
                in_run = false;
            }
        }
        if changed {
            Ok(Cow::Owned(out))
        } else {
            Ok(Cow::Borrowed(input))
        }
    }

    fn name(&self) -> &'static str {
        "compressWhitespace"
    }
}

/// Strip all whitespace.
pub struct RemoveWhitespace;

impl Transformation for RemoveWhitespace {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        if !input.bytes().any(is_ws) {
            return Ok(Cow::Borrowed(input));
        }
        Ok(Cow::Owned(
            input
                .chars()
                .filter(|c| !c.is_ascii() || !is_ws(*c as u8))
                .collect(),
        ))
    }

    fn name(&self) -> &'static str {
        "removeWhitespace"
    }
}

/// Strip NUL bytes.
pub struct RemoveNulls;

impl Transformation for RemoveNulls {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        if !input.contains('\0') {
            return Ok(Cow::Borrowed(input));
        }
        Ok(Cow::Owned(input.chars().filter(|c| *c != '\0').collect()))
    }

    fn name(&self) -> &'static str {
        "removeNulls"
    }
}

/// Replace NUL bytes with spaces.
pub struct ReplaceNulls;

impl Transformation for ReplaceNulls {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        if !input.contains('\0') {
            return Ok(Cow::Borrowed(input));
        }
        Ok(Cow::Owned(input.replace('\0', " ")))
    }

    fn name(&self) -> &'static str {
        "replaceNulls"
    }
}

/// Trim whitespace from both ends.
pub struct Trim;

impl Transformation for Trim {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        Ok(Cow::Borrowed(input.trim()))
    }

    fn name(&self) -> &'static str {
        "trim"
    }
}

/// Trim whitespace from the left end.
pub struct TrimLeft;

impl Transformation for TrimLeft {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        Ok(Cow::Borrowed(input.trim_start()))
    }

    fn name(&self) -> &'static str {
        "trimLeft"
    }
}

/// Trim whitespace from the right end.
pub struct TrimRight;

impl Transformation for TrimRight {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        Ok(Cow::Borrowed(input.trim_end()))
    }

    fn name(&self) -> &'static str {
        "trimRight"
    }
}

fn normalize_path_impl(input: &str, windows: bool) -> String {
    let unified = if windows {
        Cow::Owned(input.replace('\\', "/"))
    } else {
        Cow::Borrowed(input)
    };
    let absolute = unified.starts_with('/');
    let trailing_slash = unified.len() > 1 && unified.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                // A relative path keeps leading "..", an absolute path
                // cannot climb above the root.
                if matches!(segments.last(), None | Some(&"..")) {
                    if !absolute {
                        segments.push("..");
                    }
                } else {
                    segments.pop();
                }
            }
            other => segments.push(other),
        }
    }

    let mut out = String::with_capacity(unified.len());
    if absolute {
        out.push('/');
    }
    out.push_str(&segments.join("/"));
    if trailing_slash && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Resolve `.` and `..` segments and collapse duplicate slashes.
pub struct NormalizePath;

impl Transformation for NormalizePath {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        let normalized = normalize_path_impl(input, false);
        if normalized == input {
            Ok(Cow::Borrowed(input))
        } else {
            Ok(Cow::Owned(normalized))
        }
    }

    fn name(&self) -> &'static str {
        "normalizePath"
    }
}

/// Like [`NormalizePath`] but converts backslashes to slashes first.
pub struct NormalizePathWin;

impl Transformation for NormalizePathWin {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        let normalized = normalize_path_impl(input, true);
        if normalized == input {
            Ok(Cow::Borrowed(input))
        } else {
            Ok(Cow::Owned(normalized))
        }
    }

    fn name(&self) -> &'static str {
        "normalizePathWin"
    }
}

/// Replace each comment (`/* ... */`, `<!-- ... -->`, `--`, `#`) with a
/// single space. An unterminated block comment swallows the rest of the
/// value.
pub struct RemoveComments;

impl Transformation for RemoveComments {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        let bytes = input.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        let mut changed = false;
        while i < bytes.len() {
            if bytes[i..].starts_with(b"/*") {
                changed = true;
                out.push(b' ');
                match bytes[i + 2..].windows(2).position(|w| w == b"*/") {
                    Some(pos) => i += 2 + pos + 2,
                    None => break,
                }
            } else if bytes[i..].starts_with(b"<!--") {
                changed = true;
                out.push(b' ');
                match bytes[i + 4..].windows(3).position(|w| w == b"-->") {
                    Some(pos) => i += 4 + pos + 3,
                    None => break,
                }
            } else if bytes[i..].starts_with(b"--") || bytes[i] == b'#' {
                changed = true;
                out.push(b' ');
                break;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        if changed {
            Ok(Cow::Owned(String::from_utf8_lossy(&out).into_owned()))
        } else {
            Ok(Cow::Borrowed(input))
        }
    }

    fn name(&self) -> &'static str {
        "removeComments"
    }
}

/// Normalize shell command lines: drop quoting and caret characters,
/// collapse separators and spacing, lowercase the rest.
pub struct CmdLine;

impl Transformation for CmdLine {
    fn transform<'a>(&self, input: &'a str) -> Result<Cow<'a, str>> {
        let mut out = String::with_capacity(input.len());
        let mut space_pending = false;
        for c in input.chars() {
            match c {
                '\\' | '"' | '\'' | '^' => {}
                ' ' | '\t' | '\n' | '\r' | ',' | ';' => {
                    if !out.is_empty() {
                        space_pending = true;
                    }
                }
                '/' | '(' => {
                    // Spaces before a slash or opening paren are dropped.
                    space_pending = false;
                    out.push(c);
                }
                other => {
                    if space_pending {
                        out.push(' ');
                        space_pending = false;
                    }
                    out.extend(other.to_lowercase());
                }
            }
        }
        Ok(Cow::Owned(out))
    }

    fn name(&self) -> &'static str {
        "cmdLine"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(t: &dyn Transformation, input: &str) -> String {
        t.transform(input).unwrap().into_owned()
    }

    #[test]
    fn case_folding() {
        assert_eq!(apply(&Lowercase, "AbC"), "abc");
        assert_eq!(apply(&Uppercase, "AbC"), "ABC");
        assert!(matches!(
            Lowercase.transform("already").unwrap(),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn whitespace_handling() {
        assert_eq!(apply(&CompressWhitespace, "a \t\n b"), "a b");
        assert_eq!(apply(&RemoveWhitespace, " a b\tc "), "abc");
        assert_eq!(apply(&Trim, "  x  "), "x");
        assert_eq!(apply(&TrimLeft, "  x  "), "x  ");
        assert_eq!(apply(&TrimRight, "  x  "), "  x");
    }

    #[test]
    fn nulls() {
        assert_eq!(apply(&RemoveNulls, "a\0b"), "ab");
        assert_eq!(apply(&ReplaceNulls, "a\0b"), "a b");
    }

    #[test]
    fn path_normalization() {
        assert_eq!(apply(&NormalizePath, "/a/b/../c"), "/a/c");
        assert_eq!(apply(&NormalizePath, "/a//./b/"), "/a/b/");
        assert_eq!(apply(&NormalizePath, "/../../etc/passwd"), "/etc/passwd");
        assert_eq!(apply(&NormalizePath, "a/../../b"), "../b");
        assert_eq!(apply(&NormalizePathWin, r"\a\..\b"), "/b");
    }

    #[test]
    fn comment_removal() {
        assert_eq!(apply(&RemoveComments, "1 /* x */ 2"), "1   2");
        assert_eq!(apply(&RemoveComments, "select -- comment"), "select  ");
        assert_eq!(apply(&RemoveComments, "a # b"), "a  ");
        assert_eq!(apply(&RemoveComments, "a /* open"), "a  ");
    }

    #[test]
    fn cmdline_folding() {
        assert_eq!(apply(&CmdLine, "C^M^D.exe"), "cmd.exe");
        assert_eq!(apply(&CmdLine, "net  user ;add"), "net user add");
        assert_eq!(apply(&CmdLine, "dir /s"), "dir/s");
        assert_eq!(apply(&CmdLine, "\"ex\"'e'c"), "exec");
    }
}
