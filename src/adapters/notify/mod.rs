//! User notification adapters.

mod logging_notifier;

pub use logging_notifier::TracingNotifier;
