//! Body processors turn buffered request/response bodies into variables.
//!
//! The engine ships the `urlencoded` processor; hosts register additional
//! processors (multipart, JSON, XML) under the names the rule language
//! selects with `ctl:requestBodyProcessor`.

mod urlencoded;

pub use urlencoded::Urlencoded;
pub(crate) use urlencoded::parse_query;

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::error::Result;
use crate::variables::TransactionVariables;

/// Context handed to a body processor.
#[derive(Debug, Clone, Default)]
pub struct BodyProcessorOptions {
    /// Content type of the body, parameters stripped.
    pub mime: String,
    /// Directory for processors that extract files to disk.
    pub storage_path: Option<PathBuf>,
}

/// Parses one body format into transaction variables.
///
/// Processors must tolerate malformed input: recoverable problems are
/// recorded into variables (`REQBODY_ERROR`, `URLENCODED_ERROR`, ...)
/// rather than returned, so that rules can react to them. An `Err` return
/// is reserved for I/O failure on the reader.
pub trait BodyProcessor: Send + Sync {
    /// Registry name, matched case-insensitively.
    fn name(&self) -> &'static str;

    /// Populate request-side variables from the body.
    fn process_request(
        &self,
        reader: &mut dyn Read,
        variables: &mut TransactionVariables,
        options: &BodyProcessorOptions,
    ) -> Result<()>;

    /// Populate response-side variables from the body.
    fn process_response(
        &self,
        reader: &mut dyn Read,
        variables: &mut TransactionVariables,
        options: &BodyProcessorOptions,
    ) -> Result<()>;
}

static REGISTRY: Lazy<RwLock<HashMap<String, Arc<dyn BodyProcessor>>>> = Lazy::new(|| {
    let mut map: HashMap<String, Arc<dyn BodyProcessor>> = HashMap::new();
    map.insert("urlencoded".to_string(), Arc::new(Urlencoded));
    RwLock::new(map)
});

/// Register a processor under `name`, replacing any previous registration.
pub fn register(name: &str, processor: Arc<dyn BodyProcessor>) {
    if let Ok(mut registry) = REGISTRY.write() {
        registry.insert(name.to_ascii_lowercase(), processor);
    }
}

/// Look up a processor by name, case-insensitively.
pub fn lookup(name: &str) -> Option<Arc<dyn BodyProcessor>> {
    REGISTRY
        .read()
        .ok()
        .and_then(|registry| registry.get(&name.to_ascii_lowercase()).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencoded_is_preregistered() {
        assert!(lookup("urlencoded").is_some());
        assert!(lookup("URLENCODED").is_some());
        assert!(lookup("multipart").is_none());
    }

    #[test]
    fn hosts_can_register_processors() {
        struct Nop;
        impl BodyProcessor for Nop {
            fn name(&self) -> &'static str {
                "nop"
            }
            fn process_request(
                &self,
                _reader: &mut dyn Read,
                _variables: &mut TransactionVariables,
                _options: &BodyProcessorOptions,
            ) -> Result<()> {
                Ok(())
            }
            fn process_response(
                &self,
                _reader: &mut dyn Read,
                _variables: &mut TransactionVariables,
                _options: &BodyProcessorOptions,
            ) -> Result<()> {
                Ok(())
            }
        }
        register("NOP", Arc::new(Nop));
        assert_eq!(lookup("nop").unwrap().name(), "nop");
    }
}
