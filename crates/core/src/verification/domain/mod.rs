pub mod face_verifier;
pub mod verification_result;
