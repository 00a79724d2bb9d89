//! Rule severity levels.

use crate::error::{Error, Result};

/// Syslog-style severity attached to a rule by the `severity` action.
///
/// Lower numbers are more severe. `HIGHEST_SEVERITY` tracks the lowest
/// number seen across all matched rules in a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Severity {
    /// Severity 0.
    Emergency = 0,
    /// Severity 1.
    Alert = 1,
    /// Severity 2.
    Critical = 2,
    /// Severity 3.
    Error = 3,
    /// Severity 4.
    Warning = 4,
    /// Severity 5.
    Notice = 5,
    /// Severity 6.
    Info = 6,
    /// Severity 7.
    Debug = 7,
}

impl Severity {
    /// Numeric value, 0 (most severe) through 7.
    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Upper-case symbolic name.
    pub fn name(&self) -> &'static str {
        match self {
            Severity::Emergency => "EMERGENCY",
            Severity::Alert => "ALERT",
            Severity::Critical => "CRITICAL",
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Notice => "NOTICE",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        }
    }

    /// Parse from either a number ("2") or a symbolic name ("CRITICAL",
    /// case-insensitive).
    pub fn parse(value: &str) -> Result<Severity> {
        match value.to_ascii_uppercase().as_str() {
            "0" | "EMERGENCY" => Ok(Severity::Emergency),
            "1" | "ALERT" => Ok(Severity::Alert),
            "2" | "CRITICAL" => Ok(Severity::Critical),
            "3" | "ERROR" => Ok(Severity::Error),
            "4" | "WARNING" => Ok(Severity::Warning),
            "5" | "NOTICE" => Ok(Severity::Notice),
            "6" | "INFO" => Ok(Severity::Info),
            "7" | "DEBUG" => Ok(Severity::Debug),
            _ => Err(Error::action_argument(
                "severity",
                format!("invalid severity: {value}"),
            )),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_numeric_and_symbolic() {
        assert_eq!(Severity::parse("2").unwrap(), Severity::Critical);
        assert_eq!(Severity::parse("CRITICAL").unwrap(), Severity::Critical);
        assert_eq!(Severity::parse("critical").unwrap(), Severity::Critical);
        assert_eq!(Severity::parse("7").unwrap(), Severity::Debug);
        assert!(Severity::parse("8").is_err());
        assert!(Severity::parse("fatal").is_err());
    }

    #[test]
    fn ordering_by_number() {
        assert!(Severity::Emergency < Severity::Debug);
        assert_eq!(Severity::Warning.number(), 4);
        assert_eq!(Severity::Emergency.name(), "EMERGENCY");
    }
}
