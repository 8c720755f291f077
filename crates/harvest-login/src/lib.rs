pub mod classify;
pub mod error;
pub mod machine;
pub mod passkey;
pub mod recovery;
pub mod totp;

pub use classify::{classify, Observation};
pub use error::{LoginError, Result};
pub use machine::{LoginMachine, LoginReport};
pub use recovery::RecoveryCheck;
