use std::time::Instant;

/// One detector result, stamped when it was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionSample {
    pub face_count: usize,
    pub observed_at: Instant,
}

impl DetectionSample {
    pub fn new(face_count: usize, observed_at: Instant) -> Self {
        Self {
            face_count,
            observed_at,
        }
    }

    pub fn status(&self) -> FaceStatus {
        FaceStatus::from_count(self.face_count)
    }
}

/// Face-count class of a sample, reported to the user on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceStatus {
    NoFace,
    SingleFace,
    MultipleFaces(usize),
}

impl FaceStatus {
    pub fn from_count(face_count: usize) -> Self {
        match face_count {
            0 => FaceStatus::NoFace,
            1 => FaceStatus::SingleFace,
            n => FaceStatus::MultipleFaces(n),
        }
    }

    /// `MultipleFaces(2)` and `MultipleFaces(3)` are the same class.
    pub fn same_class(&self, other: &FaceStatus) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
