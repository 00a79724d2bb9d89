//! SQL injection and cross-site scripting detection.
//!
//! A compact take on the libinjection approach: input is tokenized into a
//! short fingerprint which is checked against known attack shapes, with a
//! few structural heuristics on top.

pub mod sqli;
pub mod xss;

pub use sqli::{is_sqli, sqli_fingerprint};
pub use xss::is_xss;
