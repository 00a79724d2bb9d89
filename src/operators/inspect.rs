//! External file inspection through a helper program.

use super::traits::Operator;
use crate::engine::Transaction;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Runs an external inspection program with the value as its argument and
/// matches when the program's first output byte is `1`. The program runs
/// on a helper thread and is abandoned after the timeout.
pub struct InspectFile {
    program: PathBuf,
    timeout: Duration,
}

impl InspectFile {
    /// Resolve the program path, preferring the search paths for relative
    /// names.
    pub fn new(path: &str, search_paths: &[PathBuf]) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::operator_argument("inspectFile", "missing program path"));
        }
        let given = Path::new(path);
        let program = if given.is_relative() {
            search_paths
                .iter()
                .map(|dir| dir.join(given))
                .find(|candidate| candidate.is_file())
                .unwrap_or_else(|| given.to_path_buf())
        } else {
            given.to_path_buf()
        };
        Ok(Self {
            program,
            timeout: Duration::from_secs(10),
        })
    }
}

impl Operator for InspectFile {
    fn evaluate(&self, _tx: &mut Transaction, value: &str) -> bool {
        let program = self.program.clone();
        let argument = value.to_string();

        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let output = Command::new(&program).arg(&argument).output();
            let _ = sender.send(output);
        });
        match receiver.recv_timeout(self.timeout) {
            Ok(Ok(output)) => output.stdout.starts_with(b"1"),
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        "inspectFile"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RuleGroup, Waf, WafConfig};
    use std::io::Write;

    fn test_tx() -> Transaction {
        Waf::new(WafConfig::default(), RuleGroup::new()).new_transaction()
    }

    #[cfg(unix)]
    fn script(body: &str) -> tempfile::TempPath {
        use std::os::unix::fs::PermissionsExt;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "#!/bin/sh\n{}", body).unwrap();
        let path = file.into_temp_path();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    #[cfg(unix)]
    fn program_output_drives_the_verdict() {
        let mut tx = test_tx();

        let hit = script("echo '1 clamav: Eicar-Test-Signature'");
        let op = InspectFile::new(hit.to_str().unwrap(), &[]).unwrap();
        assert!(op.evaluate(&mut tx, "/tmp/upload"));

        let clean = script("echo '0 clean'");
        let op = InspectFile::new(clean.to_str().unwrap(), &[]).unwrap();
        assert!(!op.evaluate(&mut tx, "/tmp/upload"));
    }

    #[test]
    fn missing_program_never_matches() {
        let op = InspectFile::new("/does/not/exist", &[]).unwrap();
        let mut tx = test_tx();
        assert!(!op.evaluate(&mut tx, "anything"));
    }

    #[test]
    fn empty_path_is_a_build_error() {
        assert!(InspectFile::new("", &[]).is_err());
    }
}
