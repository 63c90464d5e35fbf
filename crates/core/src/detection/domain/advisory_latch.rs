use super::detection_sample::FaceStatus;

/// Warning shown to the user while the frame is not usable for capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    NoFace,
    MultipleFaces(usize),
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advisory::NoFace => write!(f, "No face detected. Please move your face into the frame."),
            Advisory::MultipleFaces(n) => write!(
                f,
                "{n} faces detected. Please make sure only your face is in the frame."
            ),
        }
    }
}

/// Emits each advisory once per face-count class instead of on every tick.
///
/// The latch re-arms whenever the class changes, so leaving and re-entering
/// a bad state warns again.
#[derive(Debug, Default)]
pub struct AdvisoryLatch {
    last: Option<FaceStatus>,
    warned: bool,
}

impl AdvisoryLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, status: FaceStatus) -> Option<Advisory> {
        let class_changed = self.last.map_or(true, |prev| !prev.same_class(&status));
        if class_changed {
            self.warned = false;
        }
        self.last = Some(status);

        let advisory = match status {
            FaceStatus::NoFace => Advisory::NoFace,
            FaceStatus::MultipleFaces(n) => Advisory::MultipleFaces(n),
            FaceStatus::SingleFace => return None,
        };
        if self.warned {
            return None;
        }
        self.warned = true;
        Some(advisory)
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.warned = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(latch: &mut AdvisoryLatch, counts: &[usize]) -> Vec<Advisory> {
        counts
            .iter()
            .filter_map(|&c| latch.update(FaceStatus::from_count(c)))
            .collect()
    }

    #[test]
    fn test_warns_once_per_stretch() {
        let mut latch = AdvisoryLatch::new();
        assert_eq!(feed(&mut latch, &[0, 0, 0, 0]), vec![Advisory::NoFace]);
    }

    #[test]
    fn test_rearms_when_class_changes() {
        let mut latch = AdvisoryLatch::new();
        let warnings = feed(&mut latch, &[0, 0, 2, 2, 0, 1, 1, 0]);
        assert_eq!(
            warnings,
            vec![
                Advisory::NoFace,
                Advisory::MultipleFaces(2),
                Advisory::NoFace,
                Advisory::NoFace
            ]
        );
    }

    #[test]
    fn test_multiple_face_count_change_does_not_rewarn() {
        let mut latch = AdvisoryLatch::new();
        assert_eq!(
            feed(&mut latch, &[2, 3, 4]),
            vec![Advisory::MultipleFaces(2)]
        );
    }

    #[test]
    fn test_single_face_never_warns() {
        let mut latch = AdvisoryLatch::new();
        assert!(feed(&mut latch, &[1, 1, 1]).is_empty());
    }

    #[test]
    fn test_reset_rearms() {
        let mut latch = AdvisoryLatch::new();
        feed(&mut latch, &[0]);
        latch.reset();
        assert_eq!(feed(&mut latch, &[0]), vec![Advisory::NoFace]);
    }

    #[test]
    fn test_display_mentions_face_count() {
        assert!(Advisory::MultipleFaces(3).to_string().starts_with("3 faces"));
    }
}
