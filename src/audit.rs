//! Structured audit logging.
//!
//! An audit record is assembled per transaction at logging time. Which
//! sections it carries is controlled by an [`AuditParts`] letter set, and
//! delivery goes through the host-pluggable [`AuditWriter`].

use std::fmt;

use chrono::Local;
use serde::Serialize;

use crate::engine::Transaction;
use crate::error::{Error, Result};
use crate::variables::VariableKind;

const VALID_PARTS: &str = "ABCDEFGHIJKZ";

/// Selected audit-log sections, e.g. `"ABCFHZ"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditParts {
    letters: String,
}

impl AuditParts {
    /// Parse a letter set. Every character must be one of `ABCDEFGHIJKZ`.
    pub fn parse(value: &str) -> Result<AuditParts> {
        let letters = value.to_ascii_uppercase();
        if letters.is_empty() {
            return Err(Error::config("audit parts cannot be empty"));
        }
        if let Some(bad) = letters.chars().find(|c| !VALID_PARTS.contains(*c)) {
            return Err(Error::config(format!("invalid audit part {bad:?}")));
        }
        Ok(AuditParts { letters })
    }

    /// Whether section `part` was selected.
    pub fn has(&self, part: char) -> bool {
        self.letters.contains(part.to_ascii_uppercase())
    }
}

impl Default for AuditParts {
    fn default() -> Self {
        AuditParts {
            letters: "ABCFHZ".to_string(),
        }
    }
}

impl fmt::Display for AuditParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.letters)
    }
}

/// One header pair of the audited request or response.
#[derive(Debug, Clone, Serialize)]
pub struct AuditHeader {
    /// Header name as received.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Section A: transaction envelope.
#[derive(Debug, Serialize)]
pub struct AuditEnvelope {
    /// RFC 3339 timestamp of record assembly.
    pub timestamp: String,
    /// Transaction unique id.
    pub unique_id: String,
    /// Client address.
    pub client_ip: String,
    /// Client port.
    pub client_port: String,
    /// Server address.
    pub host_ip: String,
    /// Server port.
    pub host_port: String,
    /// Whether the transaction ended interrupted.
    pub interrupted: bool,
}

/// Sections B and C: request line, headers and optionally the raw body.
#[derive(Debug, Serialize)]
pub struct AuditRequest {
    /// Full request line.
    pub request_line: String,
    /// Request method.
    pub method: String,
    /// Raw request URI.
    pub uri: String,
    /// Request protocol.
    pub protocol: String,
    /// Request headers in arrival order.
    pub headers: Vec<AuditHeader>,
    /// Raw request body, present when section C was selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Sections F and E: response status, headers and optionally the body.
#[derive(Debug, Serialize)]
pub struct AuditResponse {
    /// Response status code.
    pub status: String,
    /// Response protocol.
    pub protocol: String,
    /// Response headers.
    pub headers: Vec<AuditHeader>,
    /// Response body, present when section E was selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Section I: metadata of uploaded form-data files.
#[derive(Debug, Serialize)]
pub struct AuditUpload {
    /// Uploaded file name.
    pub name: String,
    /// Size in bytes, as recorded by the body processor.
    pub size: String,
}

/// Section H: trailer with engine state and timing.
#[derive(Debug, Serialize)]
pub struct AuditTrailer {
    /// Rule engine mode the transaction ran under.
    pub engine_mode: String,
    /// Per-phase timing summary.
    pub stopwatch: String,
    /// Component signatures registered by the host.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    /// Error-log lines, present only when section K is not selected.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

/// Section K: one entry per matched target of each logging rule.
#[derive(Debug, Serialize)]
pub struct AuditMessage {
    /// Rule id.
    pub rule_id: u32,
    /// Phase number the match happened in.
    pub phase: u8,
    /// Full name of the matched variable.
    pub variable: String,
    /// Expanded rule message.
    pub msg: String,
    /// Expanded rule log data.
    pub data: String,
    /// Severity name, when the rule carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<&'static str>,
    /// Rule revision.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rev: String,
    /// Rule version string.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub ver: String,
    /// Rule maturity.
    pub maturity: u8,
    /// Rule accuracy.
    pub accuracy: u8,
    /// Rule tags.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Raw rule text, when the parser supplied it.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub raw: String,
}

/// A complete audit record.
#[derive(Debug, Serialize)]
pub struct AuditLog {
    /// Section A.
    pub transaction: AuditEnvelope,
    /// Sections B and C.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<AuditRequest>,
    /// Sections F and E.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<AuditResponse>,
    /// Section I.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploads: Option<Vec<AuditUpload>>,
    /// Section H.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trailer: Option<AuditTrailer>,
    /// Section K.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<AuditMessage>,
}

fn headers_of(tx: &Transaction, kind: VariableKind) -> Vec<AuditHeader> {
    tx.variables()
        .map(kind)
        .map(|map| {
            map.find_all()
                .into_iter()
                .map(|md| AuditHeader {
                    name: md.key,
                    value: md.value,
                })
                .collect()
        })
        .unwrap_or_default()
}

impl AuditLog {
    /// Assemble the record for `tx`, honouring its parts selection.
    pub(crate) fn build(tx: &Transaction) -> AuditLog {
        let parts = &tx.audit_parts;
        let vars = tx.variables();

        let transaction = AuditEnvelope {
            timestamp: Local::now().to_rfc3339(),
            unique_id: vars.single(VariableKind::UniqueId).to_string(),
            client_ip: vars.single(VariableKind::RemoteAddr).to_string(),
            client_port: vars.single(VariableKind::RemotePort).to_string(),
            host_ip: vars.single(VariableKind::ServerAddr).to_string(),
            host_port: vars.single(VariableKind::ServerPort).to_string(),
            interrupted: tx.interruption().is_some(),
        };

        let request = parts.has('B').then(|| AuditRequest {
            request_line: vars.single(VariableKind::RequestLine).to_string(),
            method: vars.single(VariableKind::RequestMethod).to_string(),
            uri: vars.single(VariableKind::RequestUriRaw).to_string(),
            protocol: vars.single(VariableKind::RequestProtocol).to_string(),
            headers: headers_of(tx, VariableKind::RequestHeaders),
            body: (parts.has('C') && !vars.single(VariableKind::RequestBody).is_empty())
                .then(|| vars.single(VariableKind::RequestBody).to_string()),
        });

        let response = parts.has('F').then(|| AuditResponse {
            status: vars.single(VariableKind::ResponseStatus).to_string(),
            protocol: vars.single(VariableKind::ResponseProtocol).to_string(),
            headers: headers_of(tx, VariableKind::ResponseHeaders),
            body: (parts.has('E') && !vars.single(VariableKind::ResponseBody).is_empty())
                .then(|| vars.single(VariableKind::ResponseBody).to_string()),
        });

        let uploads = parts.has('I').then(|| {
            vars.map(VariableKind::Files)
                .map(|files| {
                    files
                        .find_all()
                        .into_iter()
                        .map(|md| AuditUpload {
                            size: vars.first_value(VariableKind::FilesSizes, &md.key),
                            name: md.value,
                        })
                        .collect()
                })
                .unwrap_or_default()
        });

        let messages: Vec<AuditMessage> = if parts.has('K') {
            tx.matched_rules()
                .iter()
                .filter(|m| m.log)
                .flat_map(|m| {
                    m.matches.iter().map(|md| AuditMessage {
                        rule_id: m.rule_id,
                        phase: m.phase.number(),
                        variable: md.full_name(),
                        msg: m.msg.clone(),
                        data: md.data.clone(),
                        severity: m.severity.map(|s| s.name()),
                        rev: m.rev.clone(),
                        ver: m.ver.clone(),
                        maturity: m.maturity,
                        accuracy: m.accuracy,
                        tags: m.tags.clone(),
                        raw: m.raw.clone(),
                    })
                })
                .collect()
        } else {
            Vec::new()
        };

        let trailer = parts.has('H').then(|| AuditTrailer {
            engine_mode: tx.rule_engine.name().to_string(),
            stopwatch: tx.stopwatch.summary(),
            components: tx.waf_config().component_names.clone(),
            messages: if parts.has('K') {
                Vec::new()
            } else {
                tx.matched_rules()
                    .iter()
                    .filter(|m| m.log)
                    .map(|m| m.error_log())
                    .collect()
            },
        });

        AuditLog {
            transaction,
            request,
            response,
            uploads,
            trailer,
            messages,
        }
    }
}

/// Destination for finished audit records.
pub trait AuditWriter: Send + Sync {
    /// Deliver one record. Failures are the writer's to report; the engine
    /// does not retry.
    fn write(&self, log: &AuditLog);
}

/// Default writer: serializes the record to JSON on the `audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditWriter;

impl AuditWriter for TracingAuditWriter {
    fn write(&self, log: &AuditLog) {
        match serde_json::to_string(log) {
            Ok(json) => tracing::info!(target: "audit", "{json}"),
            Err(err) => tracing::warn!(target: "audit", "audit record serialization failed: {err}"),
        }
    }
}
