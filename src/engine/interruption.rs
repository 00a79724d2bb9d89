//! Interruption raised by a disruptive action.

use serde::Serialize;

/// What the host should do with the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptionKind {
    /// Answer with an error status.
    Deny,
    /// Close the connection without a response.
    Drop,
    /// Answer with a redirect.
    Redirect,
}

impl InterruptionKind {
    /// Lower-case name as it appears in logs.
    pub fn name(&self) -> &'static str {
        match self {
            InterruptionKind::Deny => "deny",
            InterruptionKind::Drop => "drop",
            InterruptionKind::Redirect => "redirect",
        }
    }
}

/// A blocking decision. Set at most once per transaction; later disruptive
/// actions never overwrite it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interruption {
    /// HTTP status the host should answer with.
    pub status: u16,
    /// Id of the rule that raised the interruption, 0 for engine-raised ones
    /// such as body-limit rejects.
    pub rule_id: u32,
    /// Kind of disruption.
    pub action: InterruptionKind,
    /// Redirect target or extra detail, empty when not applicable.
    pub data: String,
}

impl Interruption {
    /// Deny with a status code.
    pub fn deny(status: u16, rule_id: u32) -> Self {
        Self {
            status,
            rule_id,
            action: InterruptionKind::Deny,
            data: String::new(),
        }
    }

    /// Drop the connection.
    pub fn drop(status: u16, rule_id: u32) -> Self {
        Self {
            status,
            rule_id,
            action: InterruptionKind::Drop,
            data: String::new(),
        }
    }

    /// Redirect to `url`.
    pub fn redirect(status: u16, rule_id: u32, url: String) -> Self {
        Self {
            status,
            rule_id,
            action: InterruptionKind::Redirect,
            data: url,
        }
    }

    /// One-line form for the error log.
    pub fn summary(&self) -> String {
        if self.data.is_empty() {
            format!(
                "[{} status {}] [rule {}]",
                self.action.name(),
                self.status,
                self.rule_id
            )
        } else {
            format!(
                "[{} status {}] [rule {}] [data \"{}\"]",
                self.action.name(),
                self.status,
                self.rule_id,
                self.data
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors() {
        let i = Interruption::deny(403, 942100);
        assert_eq!(i.status, 403);
        assert_eq!(i.rule_id, 942100);
        assert_eq!(i.action, InterruptionKind::Deny);
        assert!(i.data.is_empty());

        let i = Interruption::redirect(302, 10, "https://example.com/blocked".to_string());
        assert_eq!(i.action, InterruptionKind::Redirect);
        assert_eq!(i.data, "https://example.com/blocked");
    }

    #[test]
    fn summary_formats() {
        let log = Interruption::deny(503, 100).summary();
        assert!(log.contains("[deny status 503]"));
        assert!(log.contains("[rule 100]"));
        let log = Interruption::redirect(302, 7, "/x".to_string()).summary();
        assert!(log.contains("[data \"/x\"]"));
    }
}
