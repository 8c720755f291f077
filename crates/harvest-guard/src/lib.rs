//! Ban/risk detection. Individual signals (URL shape, page phrases, HTTP
//! status, API responses, console output) are each weak; the detector
//! fuses them and keeps the worst severity, with a consecutive-warning
//! counter that escalates to a soft ban.

pub mod detector;
pub mod monitor;
pub mod patterns;

pub use detector::{BanDetector, Signals};
pub use monitor::SessionMonitor;
