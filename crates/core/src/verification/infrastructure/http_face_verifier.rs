use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::shared::constants::{ATTENDANCE_PATH, FACE_IMAGE_FIELD, FACE_IMAGE_FILENAME};
use crate::verification::domain::face_verifier::{FaceVerifier, VerificationError};
use crate::verification::domain::verification_result::VerificationResult;

/// Posts the captured JPEG to the attendance endpoint, which compares it
/// against the user's enrolled face and records the check-in.
pub struct HttpFaceVerifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpFaceVerifier {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, VerificationError> {
        if base_url.trim().is_empty() {
            return Err(VerificationError::Config("server URL is empty".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerificationError::Config(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: attendance_endpoint(base_url),
            token,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl FaceVerifier for HttpFaceVerifier {
    fn verify(&self, image: &[u8]) -> Result<VerificationResult, VerificationError> {
        let part = Part::bytes(image.to_vec())
            .file_name(FACE_IMAGE_FILENAME)
            .mime_str("image/jpeg")
            .map_err(|e| VerificationError::Transport(e.to_string()))?;
        let form = Form::new().part(FACE_IMAGE_FIELD, part);

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        log::info!("Submitting {} byte capture to {}", image.len(), self.endpoint);
        let response = request
            .send()
            .map_err(|e| VerificationError::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| VerificationError::Transport(e.to_string()))?;
        log::debug!("Verification response {status}: {body}");

        Ok(interpret_response(status, &body))
    }
}

fn attendance_endpoint(base_url: &str) -> String {
    format!("{}/{ATTENDANCE_PATH}", base_url.trim().trim_end_matches('/'))
}

/// Attendance record returned on a successful check-in.
#[derive(Deserialize)]
struct AttendanceRecord {
    date: Option<String>,
    time: Option<String>,
    status: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

fn interpret_response(status: StatusCode, body: &str) -> VerificationResult {
    if status.is_success() {
        return match serde_json::from_str::<AttendanceRecord>(body) {
            Ok(record) => {
                let message = match record.status {
                    Some(s) => format!("Attendance recorded ({s})"),
                    None => "Attendance recorded".to_string(),
                };
                let timestamp = match (record.date, record.time) {
                    (Some(d), Some(t)) => Some(format!("{d} {t}")),
                    (None, Some(t)) => Some(t),
                    (Some(d), None) => Some(d),
                    (None, None) => None,
                };
                VerificationResult::succeeded(message, timestamp)
            }
            Err(e) => {
                log::warn!("Unrecognised success body from verifier: {e}");
                VerificationResult::succeeded("Attendance recorded", None)
            }
        };
    }

    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| detail_message(&b.detail));
    VerificationResult::failed(
        detail.unwrap_or_else(|| format!("Verification failed (HTTP {})", status.as_u16())),
    )
}

/// `detail` is a string for handled errors and a list of `{msg}` objects
/// for request validation errors.
fn detail_message(detail: &serde_json::Value) -> Option<String> {
    match detail {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(items) => items
            .first()
            .and_then(|item| item.get("msg"))
            .and_then(|msg| msg.as_str())
            .map(str::to_string),
        _ => None,
    }
}
