//! Where server-reported errors go when no request is waiting for them.

use tracing::error;

/// Receives human-readable error text for display.
pub trait Notifier: Send + Sync + 'static {
    fn show_error(&self, message: &str);
}

/// Default notifier: writes to the log and nothing else.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_error(&self, message: &str) {
        error!(message, "Server error notification");
    }
}

impl<F> Notifier for F
where
    F: Fn(&str) + Send + Sync + 'static,
{
    fn show_error(&self, message: &str) {
        self(message);
    }
}
