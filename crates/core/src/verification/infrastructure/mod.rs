pub mod http_face_verifier;
