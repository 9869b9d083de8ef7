//! Persisted run artifacts with digest verification.

use std::path::{Path, PathBuf};

use crate::domain::digest::digest_bytes;
use crate::domain::{Result, UnpackerError};
use crate::sequencer::PipelineOutput;

const OUTPUT_FILE: &str = "output.json";
const DIGEST_FILE: &str = "output.digest";

/// Persist `<dir>/<run_id>/output.json` and `<dir>/<run_id>/output.digest`.
pub fn write_run_artifact(output: &PipelineOutput, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(&output.run_id);
    std::fs::create_dir_all(&run_dir)?;

    let artifact_path = run_dir.join(OUTPUT_FILE);
    let json = serde_json::to_vec_pretty(output)?;
    std::fs::write(&artifact_path, &json)?;
    std::fs::write(run_dir.join(DIGEST_FILE), digest_bytes(&json).as_bytes())?;

    Ok(artifact_path)
}

/// Read `<dir>/<run_id>/output.json`, verifying it against its digest.
pub fn read_run_artifact(run_id: &str, dir: &Path) -> Result<PipelineOutput> {
    read_artifact_file(&dir.join(run_id).join(OUTPUT_FILE))
}

/// Read an `output.json` by path; the digest is expected beside it.
pub fn read_artifact_file(path: &Path) -> Result<PipelineOutput> {
    let json = std::fs::read(path)?;
    let digest_path = path.with_file_name(DIGEST_FILE);
    let expected = std::fs::read_to_string(&digest_path)?;
    let actual = digest_bytes(&json);
    if expected.trim() != actual {
        return Err(UnpackerError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}
