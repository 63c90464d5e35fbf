pub mod capture_coordinator;
pub mod capture_logger;
pub mod capture_worker;
pub mod detection_loop;
pub mod session_state;
