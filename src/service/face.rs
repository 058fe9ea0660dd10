use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of comparing a candidate capture against the trusted reference
/// photo. `success=false` means processing failed (missing reference, corrupt
/// image, backend error, timeout) and is distinct from a low-confidence
/// mismatch, which comes back with `success=true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceComparison {
    pub success: bool,
    #[serde(rename = "match")]
    pub matched: bool,
    pub confidence: f64,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub message: String,
}

impl FaceComparison {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            matched: false,
            confidence: 0.0,
            distance: None,
            message: message.into(),
        }
    }
}

/// Seam between the orchestrator and the external face-matching capability.
/// Failure is data, never an error type: every non-Ok outcome of the real
/// backend collapses into `success=false`.
pub trait FaceVerifier {
    async fn compare(&self, reference: &Path, candidate_jpeg: &[u8]) -> FaceComparison;
}

/// Production gateway: shells out to the face-embedding comparison script
/// (`python3 <script> <reference> <candidate>`, JSON on stdout) with a
/// bounded timeout.
pub struct ScriptFaceVerifier {
    script_path: PathBuf,
    timeout: Duration,
}

impl ScriptFaceVerifier {
    pub fn new(script_path: PathBuf, timeout: Duration) -> Self {
        Self { script_path, timeout }
    }

    async fn run_script(&self, reference: &Path, candidate: &Path) -> FaceComparison {
        let output = Command::new("python3")
            .arg(&self.script_path)
            .arg(reference)
            .arg(candidate)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                error!(error = %e, script = %self.script_path.display(), "Face comparison spawn failed");
                return FaceComparison::failure("Face comparison backend unavailable");
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs(),
                    "Face comparison timed out"
                );
                return FaceComparison::failure("Face comparison timed out");
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(status = ?output.status.code(), stderr = %stderr, "Face comparison script failed");
            return FaceComparison::failure("Face comparison failed");
        }

        match serde_json::from_slice::<FaceComparison>(&output.stdout) {
            Ok(result) => {
                info!(
                    success = result.success,
                    matched = result.matched,
                    confidence = result.confidence,
                    "Face comparison executed"
                );
                result
            }
            Err(e) => {
                error!(error = %e, "Failed to parse face comparison output");
                FaceComparison::failure("Failed to parse face comparison result")
            }
        }
    }
}

impl FaceVerifier for ScriptFaceVerifier {
    async fn compare(&self, reference: &Path, candidate_jpeg: &[u8]) -> FaceComparison {
        if !reference.exists() {
            warn!(path = %reference.display(), "Reference photo not found");
            return FaceComparison::failure("Reference photo not found");
        }

        if !self.script_path.exists() {
            error!(path = %self.script_path.display(), "Face comparison script not found");
            return FaceComparison::failure("Face comparison script not found");
        }

        // Candidate arrives as raw bytes; the script wants a file.
        let temp = std::env::temp_dir().join(format!("face_compare_{}.jpg", Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&temp, candidate_jpeg).await {
            error!(error = %e, "Failed to write candidate image to temp file");
            return FaceComparison::failure("Failed to stage candidate image");
        }

        let result = self.run_script(reference, &temp).await;

        if let Err(e) = tokio::fs::remove_file(&temp).await {
            warn!(error = %e, path = %temp.display(), "Failed to clean up temp image");
        }

        result
    }
}
