//! Transaction lifecycle: phase dispatch, body buffering, audit assembly.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, warn};

use crate::actions::TargetException;
use crate::audit::{AuditLog, AuditParts};
use crate::bodybuffer::{BodyBuffer, BodyBufferOptions};
use crate::bodyprocessors::{self, parse_query, BodyProcessorOptions};
use crate::error::{Error, Result};
use crate::transformations::TransformationCache;
use crate::variables::{TransactionVariables, VariableKind};

use super::interruption::Interruption;
use super::phase::Phase;
use super::rule::MatchedRule;
use super::{
    AllowType, AuditEngineStatus, BodyLimitAction, RuleEngineStatus, WafConfig, WafInner,
};

/// Per-phase wall-clock accounting, reported in the audit trailer.
#[derive(Debug, Default)]
pub(crate) struct Stopwatch {
    phases: [Duration; 5],
}

impl Stopwatch {
    pub(crate) fn record(&mut self, phase: Phase, elapsed: Duration) {
        self.phases[usize::from(phase.number()) - 1] += elapsed;
    }

    pub(crate) fn summary(&self) -> String {
        self.phases
            .iter()
            .enumerate()
            .map(|(i, d)| format!("p{}={}us", i + 1, d.as_micros()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One HTTP transaction moving through the five evaluation phases.
///
/// A transaction is single-threaded: the host feeds it connection data,
/// URI, headers and bodies in order, calls the `process_*` phase handlers,
/// and inspects [`Transaction::interruption`] after each. Phase handlers
/// are idempotent; a repeated call logs and returns the cached outcome.
pub struct Transaction {
    waf: Arc<WafInner>,
    variables: TransactionVariables,
    request_body: BodyBuffer,
    response_body: BodyBuffer,

    pub(crate) transformation_cache: TransformationCache,
    pub(crate) matched: Vec<MatchedRule>,
    pub(crate) interruption: Option<Interruption>,
    detected: Option<Interruption>,
    pub(crate) stopwatch: Stopwatch,
    pub(crate) last_phase: Option<Phase>,

    // per-rule scratch state driven by the scheduler
    pub(crate) capture: bool,
    pub(crate) skip: u32,
    pub(crate) skip_after: Option<String>,
    pub(crate) allow_type: AllowType,

    // knobs copied from the engine config, mutable via `ctl`
    pub(crate) rule_engine: RuleEngineStatus,
    pub(crate) audit_engine: AuditEngineStatus,
    pub(crate) audit_parts: AuditParts,
    pub(crate) debug_log_level: u8,
    pub(crate) request_body_access: bool,
    pub(crate) response_body_access: bool,
    pub(crate) request_body_limit: u64,
    pub(crate) response_body_limit: u64,
    pub(crate) force_request_body_variable: bool,
    pub(crate) force_response_body_variable: bool,

    // per-transaction rule exclusions accumulated by `ctl`
    pub(crate) removed_rules: Vec<(u32, u32)>,
    pub(crate) removed_rule_msgs: Vec<String>,
    pub(crate) removed_rule_tags: Vec<String>,
    pub(crate) removed_targets: Vec<TargetException>,

    request_body_done: bool,
    response_body_done: bool,
    logging_done: bool,
}

impl Transaction {
    pub(crate) fn new(waf: Arc<WafInner>, mut variables: TransactionVariables) -> Transaction {
        let config = &waf.config;
        variables.reset();
        variables.populate_clock(Local::now());
        let unique_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        variables.set_single(VariableKind::UniqueId, unique_id);

        let request_body = BodyBuffer::new(BodyBufferOptions {
            memory_limit: config.request_body_in_memory_limit,
            limit: u64::MAX,
            temp_dir: config.temp_dir.clone(),
        });
        let response_body = BodyBuffer::new(BodyBufferOptions {
            memory_limit: config.request_body_in_memory_limit,
            limit: u64::MAX,
            temp_dir: config.temp_dir.clone(),
        });

        Transaction {
            variables,
            request_body,
            response_body,
            transformation_cache: TransformationCache::default(),
            matched: Vec::new(),
            interruption: None,
            detected: None,
            stopwatch: Stopwatch::default(),
            last_phase: None,
            capture: false,
            skip: 0,
            skip_after: None,
            allow_type: AllowType::Unset,
            rule_engine: config.rule_engine,
            audit_engine: config.audit_engine,
            audit_parts: config.audit_log_parts.clone(),
            debug_log_level: 9,
            request_body_access: config.request_body_access,
            response_body_access: config.response_body_access,
            request_body_limit: config.request_body_limit,
            response_body_limit: config.response_body_limit,
            force_request_body_variable: false,
            force_response_body_variable: false,
            removed_rules: Vec::new(),
            removed_rule_msgs: Vec::new(),
            removed_rule_tags: Vec::new(),
            removed_targets: Vec::new(),
            request_body_done: false,
            response_body_done: false,
            logging_done: false,
            waf,
        }
    }

    /// Record the TCP endpoints of the transaction.
    pub fn process_connection(
        &mut self,
        client_ip: &str,
        client_port: u16,
        server_ip: &str,
        server_port: u16,
    ) {
        self.variables.set_single(VariableKind::RemoteAddr, client_ip);
        self.variables.set_single(VariableKind::RemoteHost, client_ip);
        self.variables
            .set_single(VariableKind::RemotePort, client_port.to_string());
        self.variables.set_single(VariableKind::ServerAddr, server_ip);
        self.variables
            .set_single(VariableKind::ServerPort, server_port.to_string());
    }

    /// Record the request line and derive the URI variables, including
    /// `ARGS_GET` from the query string.
    pub fn process_uri(&mut self, uri: &str, method: &str, protocol: &str) {
        self.variables.set_single(VariableKind::RequestMethod, method);
        self.variables
            .set_single(VariableKind::RequestProtocol, protocol);
        self.variables.set_single(VariableKind::RequestUriRaw, uri);
        self.variables.set_single(VariableKind::RequestUri, uri);
        self.variables.set_single(
            VariableKind::RequestLine,
            format!("{method} {uri} {protocol}"),
        );

        let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
        self.variables.set_single(VariableKind::QueryString, query);
        self.variables.set_single(VariableKind::RequestFilename, path);
        let basename = path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(path);
        self.variables
            .set_single(VariableKind::RequestBasename, basename);

        let variables = &mut self.variables;
        let invalid = parse_query(query, |key, value| {
            variables.add_get_argument(key, value);
        });
        if invalid {
            variables.set_single(VariableKind::UrlencodedError, "1");
        }
    }

    /// Append one request header.
    pub fn add_request_header(&mut self, name: &str, value: &str) {
        if let Some(headers) = self.variables.map_mut(VariableKind::RequestHeaders) {
            headers.add(name, value);
        }
    }

    /// Evaluate phase 1 rules.
    pub fn process_request_headers(&mut self) -> Option<&Interruption> {
        if self.phase_already_run(Phase::RequestHeaders) {
            warn!("request headers already processed, returning cached result");
            return self.interruption.as_ref();
        }
        self.apply_request_header_effects();
        self.eval(Phase::RequestHeaders);
        self.interruption.as_ref()
    }

    /// Buffer request body bytes.
    ///
    /// Enforces the (possibly `ctl`-overridden) request body limit. On
    /// overflow, `Reject` raises a 413 interruption and `ProcessPartial`
    /// clamps the write and runs the body phase on what fits.
    pub fn write_request_body(&mut self, data: &[u8]) -> Result<Option<&Interruption>> {
        if self.request_body_done {
            return Err(Error::state("request body write after processing"));
        }
        if !self.request_body_access {
            debug!(bytes = data.len(), "request body access disabled, dropping write");
            return Ok(None);
        }
        let buffered = self.request_body.size();
        let limit = self.request_body_limit;
        if buffered.saturating_add(data.len() as u64) > limit {
            self.variables
                .set_single(VariableKind::InboundDataError, "1");
            match self.waf.config.request_body_limit_action {
                BodyLimitAction::Reject => {
                    warn!(limit, "request body limit exceeded, rejecting");
                    self.interrupt(Interruption::deny(413, 0));
                }
                BodyLimitAction::ProcessPartial => {
                    let room = (limit - buffered) as usize;
                    if room > 0 {
                        self.request_body.write(&data[..room])?;
                    }
                    debug!(limit, "request body limit reached, processing partial body");
                    self.process_request_body();
                }
            }
            return Ok(self.interruption.as_ref());
        }
        self.request_body.write(data)?;
        Ok(None)
    }

    /// Drain `reader` into the request body buffer, stopping early if the
    /// limit policy interrupts the transaction.
    pub fn read_request_body_from(&mut self, reader: &mut dyn Read) -> Result<Option<&Interruption>> {
        let mut chunk = [0u8; 8192];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                return Ok(self.interruption.as_ref());
            }
            if self.write_request_body(&chunk[..n])?.is_some() {
                return Ok(self.interruption.as_ref());
            }
        }
    }

    /// Evaluate phase 2 rules, after dispatching the buffered body to its
    /// processor.
    pub fn process_request_body(&mut self) -> Option<&Interruption> {
        if self.phase_already_run(Phase::RequestBody) {
            debug!("request body already processed, returning cached result");
            return self.interruption.as_ref();
        }
        self.request_body_done = true;
        if self.request_body_access {
            self.extract_request_body_variables();
        }
        self.eval(Phase::RequestBody);
        self.interruption.as_ref()
    }

    /// Append one response header.
    pub fn add_response_header(&mut self, name: &str, value: &str) {
        if let Some(headers) = self.variables.map_mut(VariableKind::ResponseHeaders) {
            headers.add(name, value);
        }
    }

    /// Evaluate phase 3 rules.
    pub fn process_response_headers(&mut self, status: u16, protocol: &str) -> Option<&Interruption> {
        if self.phase_already_run(Phase::ResponseHeaders) {
            warn!("response headers already processed, returning cached result");
            return self.interruption.as_ref();
        }
        self.variables
            .set_single(VariableKind::ResponseStatus, status.to_string());
        self.variables
            .set_single(VariableKind::ResponseProtocol, protocol);
        self.variables
            .set_single(VariableKind::StatusLine, format!("{protocol} {status}"));
        let raw = self
            .variables
            .first_value(VariableKind::ResponseHeaders, "content-type");
        if !raw.is_empty() {
            let mime = raw
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase();
            self.variables
                .set_single(VariableKind::ResponseContentType, mime);
        }
        self.eval(Phase::ResponseHeaders);
        self.interruption.as_ref()
    }

    /// Whether the response body will be inspected: forced via `ctl`, or
    /// its content type is on the configured allow-list.
    pub fn is_response_body_processable(&self) -> bool {
        if self.force_response_body_variable {
            return true;
        }
        let mime = self.variables.single(VariableKind::ResponseContentType);
        !mime.is_empty()
            && self
                .waf
                .config
                .response_body_mime_types
                .iter()
                .any(|m| m == mime)
    }

    /// Buffer response body bytes; overflow rejects with a 500.
    pub fn write_response_body(&mut self, data: &[u8]) -> Result<Option<&Interruption>> {
        if self.response_body_done {
            return Err(Error::state("response body write after processing"));
        }
        if !self.response_body_access {
            debug!(bytes = data.len(), "response body access disabled, dropping write");
            return Ok(None);
        }
        let buffered = self.response_body.size();
        let limit = self.response_body_limit;
        if buffered.saturating_add(data.len() as u64) > limit {
            self.variables
                .set_single(VariableKind::OutboundDataError, "1");
            match self.waf.config.response_body_limit_action {
                BodyLimitAction::Reject => {
                    warn!(limit, "response body limit exceeded, rejecting");
                    self.interrupt(Interruption::deny(500, 0));
                }
                BodyLimitAction::ProcessPartial => {
                    let room = (limit - buffered) as usize;
                    if room > 0 {
                        self.response_body.write(&data[..room])?;
                    }
                    debug!(limit, "response body limit reached, processing partial body");
                    self.process_response_body();
                }
            }
            return Ok(self.interruption.as_ref());
        }
        self.response_body.write(data)?;
        Ok(None)
    }

    /// Drain `reader` into the response body buffer.
    pub fn read_response_body_from(&mut self, reader: &mut dyn Read) -> Result<Option<&Interruption>> {
        let mut chunk = [0u8; 8192];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                return Ok(self.interruption.as_ref());
            }
            if self.write_response_body(&chunk[..n])?.is_some() {
                return Ok(self.interruption.as_ref());
            }
        }
    }

    /// Evaluate phase 4 rules.
    pub fn process_response_body(&mut self) -> Option<&Interruption> {
        if self.phase_already_run(Phase::ResponseBody) {
            debug!("response body already processed, returning cached result");
            return self.interruption.as_ref();
        }
        self.response_body_done = true;
        if self.response_body_access && self.is_response_body_processable() {
            self.extract_response_body_variables();
        }
        self.eval(Phase::ResponseBody);
        self.interruption.as_ref()
    }

    /// Evaluate phase 5 rules (always, even after an interruption) and
    /// emit the audit record when the audit engine calls for one.
    pub fn process_logging(&mut self) -> Option<&Interruption> {
        if self.logging_done {
            debug!("logging already processed");
            return self.interruption.as_ref();
        }
        self.logging_done = true;
        self.eval(Phase::Logging);
        self.audit_log();
        self.interruption.as_ref()
    }

    /// The blocking decision, if a rule raised one.
    pub fn interruption(&self) -> Option<&Interruption> {
        self.interruption.as_ref()
    }

    /// What an enforcing engine would have done; set only in
    /// detection-only mode.
    pub fn detected_interruption(&self) -> Option<&Interruption> {
        self.detected.as_ref()
    }

    /// Rules that fully matched so far, in match order.
    pub fn matched_rules(&self) -> &[MatchedRule] {
        &self.matched
    }

    /// Unique transaction id, also exposed as `UNIQUE_ID`.
    pub fn unique_id(&self) -> &str {
        self.variables.single(VariableKind::UniqueId)
    }

    /// Read access to the transaction's variables.
    pub fn variables(&self) -> &TransactionVariables {
        &self.variables
    }

    /// Write access to the transaction's variables, for hosts that feed
    /// data outside the `process_*` entry points.
    pub fn variables_mut(&mut self) -> &mut TransactionVariables {
        &mut self.variables
    }

    /// Whether the rule being evaluated asked for captures.
    pub fn capturing(&self) -> bool {
        self.capture
    }

    /// Store an operator capture into `TX:0..TX:9`; no-op unless the
    /// current rule enabled capturing.
    pub fn capture_field(&mut self, index: usize, value: &str) {
        if self.capture {
            self.variables.capture_field(index, value);
        }
    }

    /// Release buffers and hand the variable store back to the engine
    /// pool. Failures to remove spill files are aggregated, not fatal.
    pub fn close(self) -> Result<()> {
        let Transaction {
            waf,
            mut variables,
            mut request_body,
            mut response_body,
            ..
        } = self;
        let mut messages = Vec::new();
        if let Err(err) = request_body.reset() {
            messages.push(format!("request body: {err}"));
        }
        if let Err(err) = response_body.reset() {
            messages.push(format!("response body: {err}"));
        }
        variables.reset();
        waf.recycle(variables);
        if messages.is_empty() {
            Ok(())
        } else {
            Err(Error::BufferRelease { messages })
        }
    }

    pub(crate) fn waf_config(&self) -> &WafConfig {
        &self.waf.config
    }

    /// Record a blocking decision. First writer wins; later calls log and
    /// are ignored.
    pub(crate) fn interrupt(&mut self, interruption: Interruption) {
        if let Some(existing) = &self.interruption {
            debug!(
                kept = existing.summary().as_str(),
                dropped = interruption.summary().as_str(),
                "interruption already set"
            );
            return;
        }
        debug!(interruption = interruption.summary().as_str(), "transaction interrupted");
        self.interruption = Some(interruption);
    }

    /// Detection-only counterpart of [`Transaction::interrupt`].
    pub(crate) fn detect_interruption(&mut self, interruption: Interruption) {
        if self.detected.is_none() {
            self.detected = Some(interruption);
        }
    }

    /// Account a fully matched rule: highest-severity tracking, error-log
    /// line, and the matched-rules list.
    pub(crate) fn register_match(&mut self, matched: MatchedRule) {
        if let Some(severity) = matched.severity {
            let current = self.variables.single(VariableKind::HighestSeverity);
            let update = current
                .parse::<u8>()
                .map_or(true, |c| severity.number() < c);
            if update {
                self.variables.set_single(
                    VariableKind::HighestSeverity,
                    severity.number().to_string(),
                );
            }
        }
        if matched.log {
            tracing::info!(
                target: "error_log",
                rule_id = matched.rule_id,
                "{}",
                matched.error_log()
            );
        }
        self.matched.push(matched);
    }

    /// Whether an equivalent match for `rule_id` was already registered,
    /// comparing the full chain target sequence.
    #[cfg(feature = "multiphase")]
    pub(crate) fn has_equivalent_match(
        &self,
        rule_id: u32,
        matches: &[crate::variables::MatchData],
    ) -> bool {
        self.matched
            .iter()
            .filter(|m| m.rule_id == rule_id)
            .any(|m| {
                m.matches.len() == matches.len()
                    && m.matches.iter().zip(matches).all(|(a, b)| {
                        a.variable == b.variable && a.key == b.key && a.value == b.value
                    })
            })
    }

    fn phase_already_run(&self, phase: Phase) -> bool {
        self.last_phase.map_or(false, |last| last >= phase)
    }

    fn eval(&mut self, phase: Phase) -> bool {
        if self.rule_engine == RuleEngineStatus::Off {
            debug!(phase = phase.number(), "rule engine off, skipping phase");
            self.last_phase = Some(phase);
            return false;
        }
        let waf = Arc::clone(&self.waf);
        waf.rules.eval(phase, self)
    }

    /// Header-derived side effects that must land before phase 1 runs.
    fn apply_request_header_effects(&mut self) {
        let content_type = self
            .variables
            .first_value(VariableKind::RequestHeaders, "content-type")
            .to_ascii_lowercase();
        if content_type.starts_with("application/x-www-form-urlencoded") {
            self.variables
                .set_single(VariableKind::ReqbodyProcessor, "URLENCODED");
        } else if content_type.starts_with("multipart/form-data") {
            self.variables
                .set_single(VariableKind::ReqbodyProcessor, "MULTIPART");
        }

        let cookies: Vec<String> = self
            .variables
            .map(VariableKind::RequestHeaders)
            .map(|headers| {
                headers
                    .get("cookie")
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        for header in cookies {
            let variables = &mut self.variables;
            for pair in header.split(';') {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                if let Some(map) = variables.map_mut(VariableKind::RequestCookies) {
                    map.add(name.trim(), value.trim());
                }
            }
        }

        let host = self
            .variables
            .first_value(VariableKind::RequestHeaders, "host");
        if !host.is_empty() {
            let name = if let Some(rest) = host.strip_prefix('[') {
                rest.split(']').next().unwrap_or(&host).to_string()
            } else {
                host.split(':').next().unwrap_or(&host).to_string()
            };
            self.variables.set_single(VariableKind::ServerName, name);
        }
    }

    fn extract_request_body_variables(&mut self) {
        let size = self.request_body.size();
        self.variables
            .set_single(VariableKind::RequestBodyLength, size.to_string());

        let name = {
            let current = self.variables.single(VariableKind::ReqbodyProcessor);
            if current.is_empty() && self.force_request_body_variable {
                "URLENCODED".to_string()
            } else {
                current.to_string()
            }
        };
        if !name.is_empty() {
            self.variables
                .set_single(VariableKind::ReqbodyProcessor, name.as_str());
            match bodyprocessors::lookup(&name) {
                Some(processor) => {
                    let options = BodyProcessorOptions {
                        mime: self
                            .variables
                            .first_value(VariableKind::RequestHeaders, "content-type"),
                        storage_path: self.waf.config.temp_dir.clone(),
                    };
                    let mut reader = self.request_body.reader();
                    if let Err(err) =
                        processor.process_request(&mut reader, &mut self.variables, &options)
                    {
                        warn!(processor = name.as_str(), "request body processor failed: {err}");
                        let message = err.to_string();
                        self.variables.set_single(VariableKind::ReqbodyError, "1");
                        self.variables
                            .set_single(VariableKind::ReqbodyErrorMsg, message.as_str());
                        self.variables
                            .set_single(VariableKind::ReqbodyProcessorError, "1");
                        self.variables
                            .set_single(VariableKind::ReqbodyProcessorErrorMsg, message.as_str());
                    }
                }
                None => {
                    debug!(processor = name.as_str(), "no body processor registered under name");
                }
            }
        }
        if !name.eq_ignore_ascii_case("multipart") {
            if let Ok(body) = self.request_body.read_to_string() {
                self.variables.set_single(VariableKind::RequestBody, body);
            }
        }
        self.build_full_request();
    }

    fn extract_response_body_variables(&mut self) {
        let size = self.response_body.size();
        self.variables
            .set_single(VariableKind::ResponseContentLength, size.to_string());

        let name = self
            .variables
            .single(VariableKind::ResbodyProcessor)
            .to_string();
        let processor = (!name.is_empty())
            .then(|| bodyprocessors::lookup(&name))
            .flatten();
        match processor {
            Some(processor) => {
                let options = BodyProcessorOptions {
                    mime: self
                        .variables
                        .single(VariableKind::ResponseContentType)
                        .to_string(),
                    storage_path: self.waf.config.temp_dir.clone(),
                };
                let mut reader = self.response_body.reader();
                if let Err(err) =
                    processor.process_response(&mut reader, &mut self.variables, &options)
                {
                    warn!(processor = name.as_str(), "response body processor failed: {err}");
                    let message = err.to_string();
                    self.variables.set_single(VariableKind::ResbodyError, "1");
                    self.variables
                        .set_single(VariableKind::ResbodyErrorMsg, message.as_str());
                    self.variables
                        .set_single(VariableKind::ResbodyProcessorError, "1");
                    self.variables
                        .set_single(VariableKind::ResbodyProcessorErrorMsg, message.as_str());
                }
            }
            None => {
                if let Ok(body) = self.response_body.read_to_string() {
                    self.variables.set_single(VariableKind::ResponseBody, body);
                }
            }
        }
    }

    fn build_full_request(&mut self) {
        let mut full = self.variables.single(VariableKind::RequestLine).to_string();
        full.push('\n');
        if let Some(headers) = self.variables.map(VariableKind::RequestHeaders) {
            for md in headers.find_all() {
                full.push_str(&md.key);
                full.push_str(": ");
                full.push_str(&md.value);
                full.push('\n');
            }
        }
        full.push('\n');
        full.push_str(self.variables.single(VariableKind::RequestBody));
        self.variables
            .set_single(VariableKind::FullRequestLength, full.len().to_string());
        self.variables.set_single(VariableKind::FullRequest, full);
    }

    fn audit_log(&mut self) {
        match self.audit_engine {
            AuditEngineStatus::Off => return,
            AuditEngineStatus::On => {}
            AuditEngineStatus::RelevantOnly => {
                if !self.matched.iter().any(|m| m.audit_log) {
                    return;
                }
                if let Some(pattern) = &self.waf.config.audit_log_relevant_status {
                    let status = self
                        .interruption
                        .as_ref()
                        .map(|i| i.status.to_string())
                        .unwrap_or_else(|| {
                            self.variables
                                .single(VariableKind::ResponseStatus)
                                .to_string()
                        });
                    if !pattern.is_match(&status) {
                        return;
                    }
                }
            }
        }
        let log = AuditLog::build(self);
        self.waf.config.audit_writer.write(&log);
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("unique_id", &self.unique_id())
            .field("last_phase", &self.last_phase)
            .field("interrupted", &self.interruption.is_some())
            .field("matched_rules", &self.matched.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::interruption::InterruptionKind;
    use crate::engine::rule::Rule;
    use crate::engine::{RuleGroup, Waf};

    fn waf(config: WafConfig, rules: Vec<Rule>) -> Waf {
        let mut group = RuleGroup::new();
        for rule in rules {
            group.add(rule).unwrap();
        }
        Waf::new(config, group)
    }

    fn counting_rule(id: u32, phase: &str, counter: &str) -> Rule {
        let mut rule = Rule::new();
        rule.add_action("id", &id.to_string()).unwrap();
        rule.add_action("phase", phase).unwrap();
        rule.add_action("setvar", &format!("tx.{counter}=+1")).unwrap();
        rule.add_action("pass", "").unwrap();
        rule.add_action("nolog", "").unwrap();
        rule
    }

    fn body_config(limit: u64, action: BodyLimitAction) -> WafConfig {
        let mut config = WafConfig::default();
        config.request_body_access = true;
        config.request_body_limit = limit;
        config.request_body_limit_action = action;
        config
    }

    fn sqli_deny_rule() -> Rule {
        let mut rule = Rule::new();
        rule.add_variable(VariableKind::Args, "", false).unwrap();
        rule.set_operator("detectSQLi", "", false).unwrap();
        rule.add_action("id", "9421").unwrap();
        rule.add_action("phase", "2").unwrap();
        rule.add_action("deny", "").unwrap();
        rule.add_action("status", "403").unwrap();
        rule.add_action("severity", "CRITICAL").unwrap();
        rule.add_action("msg", "SQL injection").unwrap();
        rule
    }

    #[cfg(not(feature = "multiphase"))]
    #[test]
    fn sql_injection_in_query_arg_is_denied() {
        let waf = waf(WafConfig::default(), vec![sqli_deny_rule()]);

        let mut tx = waf.new_transaction();
        tx.process_connection("203.0.113.7", 54321, "198.51.100.1", 443);
        tx.process_uri("/?q=1%27%20OR%201=1--", "GET", "HTTP/1.1");
        assert!(tx.process_request_headers().is_none());
        let interruption = tx.process_request_body().cloned().unwrap();
        assert_eq!(interruption.status, 403);
        assert_eq!(interruption.action, InterruptionKind::Deny);
        assert_eq!(interruption.rule_id, 9421);
        assert_eq!(tx.matched_rules().len(), 1);
        assert_eq!(
            tx.variables().single(VariableKind::MatchedVarName),
            "ARGS:q"
        );
        assert_eq!(
            tx.variables().single(VariableKind::MatchedVar),
            "1' OR 1=1--"
        );
        tx.close().unwrap();
    }

    /// With cross-phase evaluation a phase 2 rule over ARGS already sees the
    /// query arguments in phase 1, and the body phase does not re-register
    /// the same match.
    #[cfg(feature = "multiphase")]
    #[test]
    fn sql_injection_in_query_arg_is_denied_early() {
        let waf = waf(WafConfig::default(), vec![sqli_deny_rule()]);

        let mut tx = waf.new_transaction();
        tx.process_uri("/?q=1%27%20OR%201=1--", "GET", "HTTP/1.1");
        let interruption = tx.process_request_headers().cloned().unwrap();
        assert_eq!(interruption.status, 403);
        assert_eq!(interruption.action, InterruptionKind::Deny);
        assert_eq!(interruption.rule_id, 9421);
        assert_eq!(tx.matched_rules().len(), 1);
        assert_eq!(
            tx.variables().single(VariableKind::MatchedVarName),
            "ARGS_GET:q"
        );
        tx.process_request_body();
        assert_eq!(tx.matched_rules().len(), 1);
        tx.close().unwrap();
    }

    #[test]
    fn chained_rule_scores_without_blocking() {
        let mut parent = Rule::new();
        parent.add_variable(VariableKind::RequestUri, "", false).unwrap();
        parent.set_operator("beginsWith", "/admin", false).unwrap();
        parent.add_action("id", "2001").unwrap();
        parent.add_action("phase", "1").unwrap();
        parent.add_action("pass", "").unwrap();
        parent.add_action("setvar", "tx.score=+5").unwrap();
        let mut child = Rule::new();
        child
            .add_variable(VariableKind::RequestHeaders, "User-Agent", false)
            .unwrap();
        child.add_transformation("lowercase").unwrap();
        child.set_operator("contains", "curl", false).unwrap();
        parent.add_chained_rule(child);
        let waf = waf(WafConfig::default(), vec![parent]);

        let mut tx = waf.new_transaction();
        tx.process_uri("/admin/users", "GET", "HTTP/1.1");
        tx.add_request_header("User-Agent", "Curl/8.4.0");
        assert!(tx.process_request_headers().is_none());
        assert_eq!(tx.variables().first_value(VariableKind::Tx, "score"), "5");
        assert_eq!(tx.matched_rules().len(), 1);
        assert_eq!(tx.matched_rules()[0].matches.len(), 2);
    }

    #[test]
    fn request_body_over_limit_is_rejected() {
        let waf = waf(body_config(10, BodyLimitAction::Reject), Vec::new());
        let mut tx = waf.new_transaction();
        // a write landing exactly on the limit is still in bounds
        assert!(tx.write_request_body(b"1234567890").unwrap().is_none());
        assert_eq!(tx.variables().single(VariableKind::InboundDataError), "");
        let interruption = tx.write_request_body(b"x").unwrap().cloned().unwrap();
        assert_eq!(interruption.status, 413);
        assert_eq!(interruption.rule_id, 0);
        assert_eq!(
            tx.variables().single(VariableKind::InboundDataError),
            "1"
        );
    }

    #[test]
    fn partial_processing_clamps_and_runs_the_body_phase_once() {
        let rule = counting_rule(4001, "2", "body_phase");
        let waf = waf(body_config(10, BodyLimitAction::ProcessPartial), vec![rule]);
        let mut tx = waf.new_transaction();
        assert!(tx.write_request_body(b"abcdefghijklmno").unwrap().is_none());
        assert_eq!(
            tx.variables().single(VariableKind::RequestBodyLength),
            "10"
        );
        assert_eq!(tx.variables().single(VariableKind::RequestBody), "abcdefghij");
        // the auto-invoked body phase already ran; a second call is a no-op
        tx.process_request_body();
        assert_eq!(
            tx.variables().first_value(VariableKind::Tx, "body_phase"),
            "1"
        );
        assert!(tx.write_request_body(b"x").is_err());
    }

    #[test]
    fn allow_phase_spares_the_rest_of_the_phase_only() {
        let mut allow = Rule::new();
        allow.add_action("id", "5001").unwrap();
        allow.add_action("phase", "1").unwrap();
        allow.add_action("allow", "phase").unwrap();
        allow.add_action("nolog", "").unwrap();
        let mut skipped = Rule::new();
        skipped.add_action("id", "5002").unwrap();
        skipped.add_action("phase", "1").unwrap();
        skipped.add_action("deny", "").unwrap();
        skipped.add_action("status", "401").unwrap();
        let mut later = Rule::new();
        later.add_action("id", "5003").unwrap();
        later.add_action("phase", "2").unwrap();
        later.add_action("deny", "").unwrap();
        later.add_action("status", "403").unwrap();
        let waf = waf(WafConfig::default(), vec![allow, skipped, later]);

        let mut tx = waf.new_transaction();
        assert!(tx.process_request_headers().is_none());
        let interruption = tx.process_request_body().cloned().unwrap();
        assert_eq!(interruption.status, 403);
        assert_eq!(interruption.rule_id, 5003);
    }

    #[test]
    fn target_exception_set_in_phase_one_holds_in_phase_two() {
        let mut exempt = Rule::new();
        exempt.add_action("id", "6001").unwrap();
        exempt.add_action("phase", "1").unwrap();
        exempt
            .add_action("ctl", "ruleRemoveTargetById=9421;ARGS:user")
            .unwrap();
        exempt.add_action("pass", "").unwrap();
        exempt.add_action("nolog", "").unwrap();
        let mut detect = Rule::new();
        detect.add_variable(VariableKind::Args, "", false).unwrap();
        detect.set_operator("contains", "evil", false).unwrap();
        detect.add_action("id", "9421").unwrap();
        detect.add_action("phase", "2").unwrap();
        detect.add_action("pass", "").unwrap();
        let waf = waf(WafConfig::default(), vec![exempt, detect]);

        let mut tx = waf.new_transaction();
        tx.process_uri("/?user=evil1&other=evil2", "GET", "HTTP/1.1");
        tx.process_request_headers();
        tx.process_request_body();
        assert_eq!(tx.matched_rules().len(), 1);
        let matched = &tx.matched_rules()[0];
        assert!(matched.matches.iter().all(|md| md.key != "user"));
        assert!(matched.matches.iter().any(|md| md.key == "other"));
    }

    #[test]
    fn uri_processing_derives_request_variables() {
        let waf = waf(WafConfig::default(), Vec::new());
        let mut tx = waf.new_transaction();
        tx.process_uri("/app/index.php?x=1&y=2", "POST", "HTTP/1.1");
        let vars = tx.variables();
        assert_eq!(vars.single(VariableKind::RequestMethod), "POST");
        assert_eq!(vars.single(VariableKind::QueryString), "x=1&y=2");
        assert_eq!(vars.single(VariableKind::RequestFilename), "/app/index.php");
        assert_eq!(vars.single(VariableKind::RequestBasename), "index.php");
        assert_eq!(
            vars.single(VariableKind::RequestLine),
            "POST /app/index.php?x=1&y=2 HTTP/1.1"
        );
        assert_eq!(vars.first_value(VariableKind::ArgsGet, "y"), "2");
    }

    #[test]
    fn header_effects_cookies_host_and_processor() {
        let waf = waf(WafConfig::default(), Vec::new());
        let mut tx = waf.new_transaction();
        tx.add_request_header("Host", "shop.example.com:8443");
        tx.add_request_header("Cookie", "session=abc123; theme=dark");
        tx.add_request_header("Content-Type", "application/x-www-form-urlencoded");
        tx.process_request_headers();
        let vars = tx.variables();
        assert_eq!(vars.single(VariableKind::ServerName), "shop.example.com");
        assert_eq!(
            vars.first_value(VariableKind::RequestCookies, "session"),
            "abc123"
        );
        assert_eq!(vars.first_value(VariableKind::RequestCookies, "theme"), "dark");
        assert_eq!(vars.single(VariableKind::ReqbodyProcessor), "URLENCODED");
    }

    #[test]
    fn urlencoded_body_fills_post_arguments() {
        let mut config = WafConfig::default();
        config.request_body_access = true;
        let waf = waf(config, Vec::new());
        let mut tx = waf.new_transaction();
        tx.add_request_header("Content-Type", "application/x-www-form-urlencoded");
        tx.process_request_headers();
        tx.write_request_body(b"user=admin&role=super%20user").unwrap();
        tx.process_request_body();
        let vars = tx.variables();
        assert_eq!(vars.first_value(VariableKind::ArgsPost, "user"), "admin");
        assert_eq!(vars.first_value(VariableKind::ArgsPost, "role"), "super user");
        assert_eq!(
            vars.single(VariableKind::RequestBody),
            "user=admin&role=super%20user"
        );
        assert!(!vars.single(VariableKind::FullRequest).is_empty());
    }

    #[test]
    fn body_writes_are_dropped_when_access_is_off() {
        let waf = waf(WafConfig::default(), Vec::new());
        let mut tx = waf.new_transaction();
        assert!(tx.write_request_body(b"ignored").unwrap().is_none());
        tx.process_request_body();
        assert_eq!(tx.variables().single(VariableKind::RequestBodyLength), "");
        assert_eq!(tx.variables().single(VariableKind::RequestBody), "");
    }

    #[test]
    fn phase_handlers_are_idempotent() {
        let rule = counting_rule(7001, "1", "headers_phase");
        let waf = waf(WafConfig::default(), vec![rule]);
        let mut tx = waf.new_transaction();
        tx.process_request_headers();
        tx.process_request_headers();
        assert_eq!(
            tx.variables().first_value(VariableKind::Tx, "headers_phase"),
            "1"
        );
    }

    #[test]
    fn response_content_type_gates_body_processing() {
        let mut config = WafConfig::default();
        config.response_body_access = true;
        let waf = waf(config, Vec::new());

        let mut tx = waf.new_transaction();
        tx.add_response_header("Content-Type", "text/html; charset=utf-8");
        tx.process_response_headers(200, "HTTP/1.1");
        assert_eq!(
            tx.variables().single(VariableKind::ResponseContentType),
            "text/html"
        );
        assert!(tx.is_response_body_processable());
        tx.write_response_body(b"<html>hello</html>").unwrap();
        tx.process_response_body();
        assert_eq!(
            tx.variables().single(VariableKind::ResponseBody),
            "<html>hello</html>"
        );

        let mut tx = waf.new_transaction();
        tx.add_response_header("Content-Type", "application/pdf");
        tx.process_response_headers(200, "HTTP/1.1");
        assert!(!tx.is_response_body_processable());
    }

    #[test]
    fn reader_drain_stops_on_interruption() {
        let waf = waf(body_config(8, BodyLimitAction::Reject), Vec::new());
        let mut tx = waf.new_transaction();
        let mut source = std::io::Cursor::new(vec![b'a'; 64 * 1024]);
        let interruption = tx
            .read_request_body_from(&mut source)
            .unwrap()
            .cloned()
            .unwrap();
        assert_eq!(interruption.status, 413);
    }

    #[test]
    fn logging_phase_runs_even_after_an_interruption() {
        let mut block = Rule::new();
        block.add_action("id", "8001").unwrap();
        block.add_action("phase", "1").unwrap();
        block.add_action("deny", "").unwrap();
        let logged = counting_rule(8002, "5", "seen_logging");
        let waf = waf(WafConfig::default(), vec![block, logged]);
        let mut tx = waf.new_transaction();
        assert!(tx.process_request_headers().is_some());
        tx.process_logging();
        assert_eq!(
            tx.variables().first_value(VariableKind::Tx, "seen_logging"),
            "1"
        );
    }

    #[test]
    fn first_interruption_is_kept() {
        let waf = waf(WafConfig::default(), Vec::new());
        let mut tx = waf.new_transaction();
        tx.interrupt(Interruption::deny(403, 1));
        tx.interrupt(Interruption::deny(500, 2));
        let interruption = tx.interruption().unwrap();
        assert_eq!(interruption.status, 403);
        assert_eq!(interruption.rule_id, 1);
    }

    #[test]
    fn unique_ids_differ_between_transactions() {
        let waf = waf(WafConfig::default(), Vec::new());
        let a = waf.new_transaction();
        let b = waf.new_transaction();
        assert_eq!(a.unique_id().len(), 16);
        assert_ne!(a.unique_id(), b.unique_id());
    }

    #[test]
    fn connection_endpoints_are_recorded() {
        let waf = waf(WafConfig::default(), Vec::new());
        let mut tx = waf.new_transaction();
        tx.process_connection("192.0.2.4", 55000, "203.0.113.9", 80);
        let vars = tx.variables();
        assert_eq!(vars.single(VariableKind::RemoteAddr), "192.0.2.4");
        assert_eq!(vars.single(VariableKind::RemotePort), "55000");
        assert_eq!(vars.single(VariableKind::ServerAddr), "203.0.113.9");
        assert_eq!(vars.single(VariableKind::ServerPort), "80");
    }

    #[test]
    fn stopwatch_summary_covers_all_phases() {
        let mut stopwatch = Stopwatch::default();
        stopwatch.record(Phase::RequestHeaders, Duration::from_micros(120));
        stopwatch.record(Phase::Logging, Duration::from_micros(30));
        let summary = stopwatch.summary();
        assert!(summary.starts_with("p1=120us"));
        assert!(summary.ends_with("p5=30us"));
    }
}
