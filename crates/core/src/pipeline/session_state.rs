use serde::Serialize;

/// Lifecycle of one capture session. `Closed` is terminal for the session
/// but, like `Idle`, accepts a fresh `open()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Opening,
    Detecting,
    Capturing,
    Verifying,
    Closed,
}

impl SessionState {
    pub fn accepts_open(self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Closed)
    }

    /// True while the single capture attempt owns the session. Detection
    /// ticks and new triggers are refused in these states.
    pub fn capture_in_progress(self) -> bool {
        matches!(self, SessionState::Capturing | SessionState::Verifying)
    }

    pub fn is_active(self) -> bool {
        !self.accepts_open()
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::Detecting => "detecting",
            SessionState::Capturing => "capturing",
            SessionState::Verifying => "verifying",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
