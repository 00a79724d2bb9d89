//! Cross-site scripting detection.
//!
//! The input is normalized first (HTML entities and percent escapes decoded,
//! NUL bytes stripped) so split or encoded payloads collapse back into their
//! plain form, then scanned for executable tag names, event handler
//! attributes, script-capable URL schemes and script sinks.

use once_cell::sync::Lazy;
use phf::phf_set;
use regex::Regex;

use crate::transformations::url_decode_bytes;

/// Tags that execute script or rewrite the document when injected.
static DANGEROUS_TAGS: phf::Set<&'static str> = phf_set! {
    "script", "iframe", "object", "embed", "applet", "svg", "math",
    "base", "link", "meta", "style", "form", "frame", "frameset",
    "layer", "ilayer", "bgsound", "isindex", "marquee", "xmp",
    "plaintext", "listing", "template", "portal",
};

static EVENT_HANDLERS: phf::Set<&'static str> = phf_set! {
    "onabort", "onactivate", "onafterprint", "onanimationend",
    "onanimationstart", "onauxclick", "onbeforecopy", "onbeforecut",
    "onbeforeprint", "onbeforeunload", "onblur", "oncanplay", "onchange",
    "onclick", "oncontextmenu", "oncopy", "oncut", "ondblclick", "ondrag",
    "ondragend", "ondragenter", "ondragleave", "ondragover", "ondragstart",
    "ondrop", "onended", "onerror", "onfocus", "onfocusin", "onfocusout",
    "onhashchange", "oninput", "oninvalid", "onkeydown", "onkeypress",
    "onkeyup", "onload", "onloadstart", "onmessage", "onmousedown",
    "onmouseenter", "onmouseleave", "onmousemove", "onmouseout",
    "onmouseover", "onmouseup", "onmousewheel", "onpagehide", "onpageshow",
    "onpaste", "onpause", "onplay", "onpointerdown", "onpointerenter",
    "onpointermove", "onpointerover", "onpointerup", "onprogress",
    "onpropertychange", "onreadystatechange", "onreset", "onresize",
    "onscroll", "onsearch", "onselect", "onstart", "onsubmit", "ontoggle",
    "ontouchend", "ontouchmove", "ontouchstart", "ontransitionend",
    "onunload", "onwheel",
};

static HANDLER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(on[a-z]{2,30})\s*=").unwrap());

static SINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)\b(?:eval|settimeout|setinterval|fscommand)\s*\(",
        r"|document\s*\.\s*(?:write|writeln|cookie|location|domain)",
        r"|window\s*\.\s*location",
        r"|\.\s*(?:innerhtml|outerhtml|insertadjacenthtml)\s*",
        r"|expression\s*\(",
        r"|-moz-binding|@import|behaviou?r\s*:",
    ))
    .unwrap()
});

/// Decode HTML entities and percent escapes and drop NUL bytes.
fn normalize(input: &str) -> String {
    let decoded = html_escape::decode_html_entities(input);
    let (bytes, _) = url_decode_bytes(&decoded, true);
    String::from_utf8_lossy(&bytes).replace('\0', "")
}

fn contains_dangerous_tag(input: &str) -> bool {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < bytes.len() && (bytes[j] == b'/' || bytes[j].is_ascii_whitespace()) {
            j += 1;
        }
        let start = j;
        while j < bytes.len() && bytes[j].is_ascii_alphanumeric() {
            j += 1;
        }
        if j > start {
            let name = String::from_utf8_lossy(&bytes[start..j]).to_ascii_lowercase();
            if DANGEROUS_TAGS.contains(name.as_str()) {
                return true;
            }
        }
        i = j.max(i + 1);
    }
    false
}

fn contains_event_handler(input: &str) -> bool {
    let has_tag_open = input.contains('<');
    for caps in HANDLER_RE.captures_iter(input) {
        if has_tag_open {
            return true;
        }
        if let Some(name) = caps.get(1) {
            if EVENT_HANDLERS.contains(name.as_str().to_ascii_lowercase().as_str()) {
                return true;
            }
        }
    }
    false
}

/// Scheme checks run on a copy with whitespace and control characters
/// removed, so `java\nscript:` style splitting does not hide the scheme.
fn contains_script_scheme(input: &str) -> bool {
    let compact: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    compact.contains("javascript:")
        || compact.contains("vbscript:")
        || compact.contains("livescript:")
        || compact.contains("mocha:")
        || compact.contains("data:text/html")
        || compact.contains("data:image/svg")
}

/// Returns true when the input carries a cross-site scripting payload.
pub fn is_xss(input: &str) -> bool {
    if input.len() < 4 {
        return false;
    }
    let normalized = normalize(input);
    contains_dangerous_tag(&normalized)
        || contains_event_handler(&normalized)
        || contains_script_scheme(&normalized)
        || SINK_RE.is_match(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_tags() {
        assert!(is_xss("<script>alert(1)</script>"));
        assert!(is_xss("</script ><SCRIPT>x</SCRIPT>"));
        assert!(is_xss("<svg/onload=alert(1)>"));
        assert!(is_xss("<iframe src=//evil.test>"));
    }

    #[test]
    fn event_handlers() {
        assert!(is_xss("<img src=x onerror=alert(1)>"));
        assert!(is_xss("\" onmouseover=alert(document.cookie)"));
        assert!(is_xss("<body onload = doit()>"));
    }

    #[test]
    fn schemes_survive_splitting() {
        assert!(is_xss("<a href=\"java\nscript:alert(1)\">x</a>"));
        assert!(is_xss("JaVaScRiPt:alert(1)"));
        assert!(is_xss("data:text/html;base64,PHNjcmlwdD4="));
    }

    #[test]
    fn encoded_payloads_decode_first() {
        assert!(is_xss("%3Cscript%3Ealert(1)%3C%2Fscript%3E"));
        assert!(is_xss("&lt;script&gt;alert(1)&lt;/script&gt;"));
    }

    #[test]
    fn sinks() {
        assert!(is_xss("x');eval(name);//"));
        assert!(is_xss("<div style=width:expression(alert(1))>"));
    }

    #[test]
    fn benign_markup_passes() {
        assert!(!is_xss("<p>Hello <b>world</b></p>"));
        assert!(!is_xss("a perfectly normal sentence"));
        assert!(!is_xss("price < 100 and rising"));
        assert!(!is_xss("season=winter"));
    }
}
