pub mod driver;
pub mod error;
pub mod fingerprint;
pub mod scripted;
pub mod session;
pub mod version_cache;
pub mod wait;

pub use driver::{BrowserContext, BrowserDriver, ContextSpec, NavigationInfo, Page};
pub use error::{BrowserError, Result};
pub use fingerprint::Fingerprint;
pub use session::{SessionFactory, SessionGuard, StealthBundle};
pub use version_cache::EdgeVersionCache;
pub use wait::{smart_wait, smart_wait_default, smart_wait_for};
