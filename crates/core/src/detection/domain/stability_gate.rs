use super::detection_sample::{DetectionSample, FaceStatus};
use crate::shared::constants::CONFIRM_FRAMES;

/// Result of feeding one sample through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOutcome {
    pub status: FaceStatus,
    /// Set on the sample that completes a run of `confirm_frames`
    /// consecutive single-face samples.
    pub trigger: bool,
}

/// Decides when one face has been held steadily enough to capture.
///
/// Any sample that is not exactly one face resets the run. The counter also
/// resets after firing, so a second trigger needs a fresh full run.
#[derive(Debug, Clone)]
pub struct StabilityGate {
    confirm_frames: u32,
    consecutive_single_face_count: u32,
}

impl StabilityGate {
    pub fn new(confirm_frames: u32) -> Self {
        Self {
            confirm_frames: confirm_frames.max(1),
            consecutive_single_face_count: 0,
        }
    }

    pub fn observe(&mut self, sample: &DetectionSample) -> GateOutcome {
        let status = sample.status();
        let mut trigger = false;

        if status == FaceStatus::SingleFace {
            self.consecutive_single_face_count += 1;
            if self.consecutive_single_face_count >= self.confirm_frames {
                trigger = true;
                self.consecutive_single_face_count = 0;
            }
        } else {
            self.consecutive_single_face_count = 0;
        }

        GateOutcome { status, trigger }
    }

    pub fn reset(&mut self) {
        self.consecutive_single_face_count = 0;
    }

    pub fn consecutive_single_face_count(&self) -> u32 {
        self.consecutive_single_face_count
    }

    pub fn confirm_frames(&self) -> u32 {
        self.confirm_frames
    }
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self::new(CONFIRM_FRAMES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Instant;

    /// Indices (0-based) of the samples that fired a trigger.
    fn trigger_indices(gate: &mut StabilityGate, counts: &[usize]) -> Vec<usize> {
        counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| {
                gate.observe(&DetectionSample::new(count, Instant::now()))
                    .trigger
            })
            .map(|(i, _)| i)
            .collect()
    }

    #[rstest]
    #[case::ten_single_faces(vec![1; 10], vec![9])]
    #[case::nine_is_not_enough(vec![1; 9], vec![])]
    #[case::reset_by_two_faces(vec![1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1], vec![13])]
    #[case::reset_by_no_face(vec![1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 1], vec![])]
    #[case::session_ends_mid_stream(vec![0, 0, 1, 1], vec![])]
    #[case::counter_restarts_after_trigger(vec![1; 20], vec![9, 19])]
    #[case::never_single(vec![0, 2, 3, 0, 2], vec![])]
    fn test_trigger_positions(#[case] counts: Vec<usize>, #[case] expected: Vec<usize>) {
        let mut gate = StabilityGate::default();
        assert_eq!(trigger_indices(&mut gate, &counts), expected);
    }

    #[test]
    fn test_status_is_reported_for_every_sample() {
        let mut gate = StabilityGate::default();
        let statuses: Vec<FaceStatus> = [0, 1, 3]
            .iter()
            .map(|&c| gate.observe(&DetectionSample::new(c, Instant::now())).status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                FaceStatus::NoFace,
                FaceStatus::SingleFace,
                FaceStatus::MultipleFaces(3)
            ]
        );
    }

    #[test]
    fn test_counter_resets_on_non_single_sample() {
        let mut gate = StabilityGate::default();
        for _ in 0..4 {
            gate.observe(&DetectionSample::new(1, Instant::now()));
        }
        assert_eq!(gate.consecutive_single_face_count(), 4);

        gate.observe(&DetectionSample::new(2, Instant::now()));
        assert_eq!(gate.consecutive_single_face_count(), 0);
    }

    #[test]
    fn test_reset_discards_partial_run() {
        let mut gate = StabilityGate::default();
        trigger_indices(&mut gate, &[1; 9]);
        gate.reset();
        assert!(trigger_indices(&mut gate, &[1]).is_empty());
        assert_eq!(gate.consecutive_single_face_count(), 1);
    }

    #[test]
    fn test_zero_threshold_is_clamped_to_one() {
        let mut gate = StabilityGate::new(0);
        assert_eq!(gate.confirm_frames(), 1);
        assert_eq!(trigger_indices(&mut gate, &[0, 1, 1]), vec![1, 2]);
    }

    /// A trigger fires iff the sample closes a run of exactly-one-face
    /// samples whose length is a multiple of the threshold.
    #[test]
    fn test_matches_run_length_model_on_pseudo_random_sequences() {
        let mut seed: u64 = 0x5eed;
        for _ in 0..50 {
            let counts: Vec<usize> = (0..200)
                .map(|_| {
                    seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    // Mostly single faces so long runs actually occur
                    match (seed >> 33) % 10 {
                        0 => 0,
                        1 => 2,
                        _ => 1,
                    }
                })
                .collect();

            let mut run = 0u32;
            let expected: Vec<usize> = counts
                .iter()
                .enumerate()
                .filter_map(|(i, &c)| {
                    run = if c == 1 { run + 1 } else { 0 };
                    (run > 0 && run % CONFIRM_FRAMES == 0).then_some(i)
                })
                .collect();

            let mut gate = StabilityGate::default();
            assert_eq!(trigger_indices(&mut gate, &counts), expected);
        }
    }
}
