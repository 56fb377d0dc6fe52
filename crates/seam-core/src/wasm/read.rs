use anyhow::{Context as _, Result};
use sha2::{Digest, Sha256};
use std::{fs, path::Path};

use crate::report::model::ArtifactInfo;

/// Raw artifact context used during a run.
///
/// Holds the exact bytes analyzed and a cryptographic fingerprint that
/// uniquely identifies the artifact. Filesystem metadata (timestamps,
/// permissions) is ignored so identical bytes always produce identical run
/// summaries.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// Source path (informational only).
    pub path: Option<String>,

    /// Exact bytes read from disk.
    pub bytes: Vec<u8>,

    /// Hex-encoded sha256 of the artifact bytes.
    pub fingerprint: String,
}

impl Artifact {
    /// Wrap already-loaded bytes, e.g. a wat fixture compiled in a test.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let fingerprint = hex::encode(Sha256::digest(&bytes));
        Self {
            path: None,
            bytes,
            fingerprint,
        }
    }

    /// Report-facing artifact metadata. Drops the raw bytes.
    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            path: self.path.clone(),
            size_bytes: self.bytes.len() as u64,
            sha256: self.fingerprint.clone(),
        }
    }

    /// Stem used to synthesize `argv[0]` and output file names.
    pub fn program_name(&self) -> String {
        self.path
            .as_deref()
            .and_then(|p| Path::new(p).file_stem().and_then(|s| s.to_str()))
            .unwrap_or("module")
            .to_string()
    }
}

/// Read a `.wasm` artifact and compute its identity.
pub fn read_artifact(path: &Path) -> Result<Artifact> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read artifact: {}", path.display()))?;

    let mut artifact = Artifact::from_bytes(bytes);
    artifact.path = Some(path.display().to_string());
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_bytes_and_computes_stable_fingerprint() {
        let data = b"\0asm\x01\0\0\0";

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();

        let a = read_artifact(file.path()).expect("artifact read succeeds");
        let b = read_artifact(file.path()).unwrap();

        assert_eq!(a.bytes, data);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert!(a.path.is_some());
    }

    #[test]
    fn different_inputs_produce_different_fingerprints() {
        let a = Artifact::from_bytes(b"data-a".to_vec());
        let b = Artifact::from_bytes(b"data-b".to_vec());
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn missing_file_returns_error() {
        assert!(read_artifact(Path::new("non_existent.wasm")).is_err());
    }

    #[test]
    fn program_name_prefers_file_stem() {
        let mut a = Artifact::from_bytes(Vec::new());
        assert_eq!(a.program_name(), "module");
        a.path = Some("test/password.wasm".to_string());
        assert_eq!(a.program_name(), "password");
    }
}
