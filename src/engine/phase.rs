//! Request processing phases.

/// Evaluation phases.
///
/// Phases 1 and 2 cover the request, 3 and 4 the response, and 5 runs at
/// logging time. Phase 5 is evaluated even when an earlier phase raised an
/// interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    /// Phase 1: request headers
    RequestHeaders = 1,
    /// Phase 2: request body
    RequestBody = 2,
    /// Phase 3: response headers
    ResponseHeaders = 3,
    /// Phase 4: response body
    ResponseBody = 4,
    /// Phase 5: logging
    Logging = 5,
}

impl Phase {
    /// Get the phase number.
    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Get phase name.
    pub fn name(&self) -> &'static str {
        match self {
            Phase::RequestHeaders => "REQUEST_HEADERS",
            Phase::RequestBody => "REQUEST_BODY",
            Phase::ResponseHeaders => "RESPONSE_HEADERS",
            Phase::ResponseBody => "RESPONSE_BODY",
            Phase::Logging => "LOGGING",
        }
    }

    /// Parse phase from number.
    pub fn from_number(n: u8) -> Option<Phase> {
        match n {
            1 => Some(Phase::RequestHeaders),
            2 => Some(Phase::RequestBody),
            3 => Some(Phase::ResponseHeaders),
            4 => Some(Phase::ResponseBody),
            5 => Some(Phase::Logging),
            _ => None,
        }
    }

    /// All phases in order.
    pub fn all() -> [Phase; 5] {
        [
            Phase::RequestHeaders,
            Phase::RequestBody,
            Phase::ResponseHeaders,
            Phase::ResponseBody,
            Phase::Logging,
        ]
    }

    /// Whether this is a request phase (1 or 2).
    pub fn is_request_phase(&self) -> bool {
        matches!(self, Phase::RequestHeaders | Phase::RequestBody)
    }

    /// Whether this is a response phase (3 or 4).
    pub fn is_response_phase(&self) -> bool {
        matches!(self, Phase::ResponseHeaders | Phase::ResponseBody)
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::RequestBody
    }
}

impl TryFrom<u8> for Phase {
    type Error = crate::error::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Phase::from_number(value)
            .ok_or_else(|| crate::error::Error::config(format!("invalid phase number: {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_numbers() {
        assert_eq!(Phase::RequestHeaders.number(), 1);
        assert_eq!(Phase::Logging.number(), 5);
        assert_eq!(Phase::from_number(3), Some(Phase::ResponseHeaders));
        assert_eq!(Phase::from_number(0), None);
        assert_eq!(Phase::from_number(6), None);
    }

    #[test]
    fn phase_ordering() {
        assert!(Phase::RequestHeaders < Phase::RequestBody);
        assert!(Phase::ResponseBody < Phase::Logging);
        let all = Phase::all();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0], Phase::RequestHeaders);
        assert_eq!(all[4], Phase::Logging);
    }

    #[test]
    fn request_response_split() {
        assert!(Phase::RequestHeaders.is_request_phase());
        assert!(Phase::RequestBody.is_request_phase());
        assert!(Phase::ResponseHeaders.is_response_phase());
        assert!(!Phase::Logging.is_request_phase());
        assert!(!Phase::Logging.is_response_phase());
    }
}
