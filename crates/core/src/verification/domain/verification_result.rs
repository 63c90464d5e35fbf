use serde::Serialize;

/// Outcome of one capture attempt. Exactly one is produced per completed
/// attempt; fields are read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl VerificationResult {
    pub fn succeeded(message: impl Into<String>, timestamp: Option<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            timestamp,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            timestamp: None,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }
}
