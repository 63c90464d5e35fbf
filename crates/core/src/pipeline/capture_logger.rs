use std::collections::HashMap;
use std::time::Instant;

/// Observer for capture-session events.
///
/// Keeps the coordinator free of output concerns; the CLI records timings
/// and prints a summary, tests discard everything.
pub trait CaptureLogger: Send {
    /// Record how long a named stage took (`detect`, `encode`, `verify`).
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric such as a sample's face count.
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable lifecycle message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullCaptureLogger;

impl CaptureLogger for NullCaptureLogger {
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Collects per-stage timings and metrics for one session and reports them
/// through the `log` facade when the session ends.
pub struct SessionLogger {
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    started_at: Instant,
    messages: Vec<String>,
}

impl SessionLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            metrics: HashMap::new(),
            started_at: Instant::now(),
            messages: Vec::new(),
        }
    }

    /// Returns the formatted summary string, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_s = self.started_at.elapsed().as_secs_f64();
        let mut lines = vec![format!("Session summary ({elapsed_s:.1}s total):")];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            lines.push(format!(
                "  {stage:8}: {count:3} calls  avg {avg:6.1}ms  max {max:6.1}ms",
                count = durations.len(),
                avg = mean(durations),
                max = durations.iter().copied().fold(0.0, f64::max),
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            let values = &self.metrics[name];
            lines.push(format!(
                "  {name}: {} samples, avg {:.1}",
                values.len(),
                mean(values)
            ));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl Default for SessionLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureLogger for SessionLogger {
    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullCaptureLogger;
        logger.timing("detect", 5.0);
        logger.metric("face_count", 1.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = SessionLogger::new();
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("verify", 400.0);

        let detect = logger.timings_for("detect").unwrap();
        assert_eq!(detect.len(), 2);
        assert_relative_eq!(mean(detect), 25.0);
        assert_eq!(logger.timings_for("verify").unwrap().len(), 1);
        assert!(logger.timings_for("encode").is_none());
    }

    #[test]
    fn test_summary_lists_stages_and_metrics() {
        let mut logger = SessionLogger::new();
        logger.timing("detect", 12.0);
        logger.timing("verify", 250.0);
        logger.metric("face_count", 1.0);
        logger.metric("face_count", 2.0);

        let summary = logger.summary_string().unwrap();

        assert!(summary.starts_with("Session summary"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("verify"));
        assert!(summary.contains("face_count: 2 samples, avg 1.5"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(SessionLogger::default().summary_string().is_none());
    }

    #[test]
    fn test_info_stores_messages() {
        let mut logger = SessionLogger::new();
        logger.info("Camera opened");
        assert_eq!(logger.messages(), ["Camera opened".to_string()]);
    }
}
