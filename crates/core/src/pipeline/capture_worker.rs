use std::thread;

use crossbeam_channel::Receiver;

use crate::pipeline::capture_coordinator::{
    CaptureCoordinator, CaptureError, CaptureHandle, CaptureMessage, CaptureParts,
};

/// Runs one capture session on a background thread.
///
/// Messages stream out until the session comes to rest, after which the
/// channel disconnects. A hardware failure is reported as
/// [`CaptureMessage::HardwareError`] and ends the thread without `Closed`.
pub fn spawn(parts: CaptureParts) -> (Receiver<CaptureMessage>, CaptureHandle) {
    let (tx, rx) = crossbeam_channel::unbounded::<CaptureMessage>();
    let mut coordinator = CaptureCoordinator::new(parts, tx);
    let handle = coordinator.handle();

    thread::spawn(move || match coordinator.open() {
        Ok(()) => {
            coordinator.run();
        }
        Err(CaptureError::Hardware(_)) => {}
        Err(e) => log::error!("Capture session failed to start: {e}"),
    });

    (rx, handle)
}
