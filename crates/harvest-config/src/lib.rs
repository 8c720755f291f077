pub mod accounts;
pub mod config;
pub mod disabler;
pub mod error;
pub mod jsonc;

pub use accounts::load_accounts;
pub use config::{
    BanDetectionConfig, Config, DashboardConfig, DelayWindow, ExecutionConfig,
    HumanizationConfig, NotificationConfig, ParallelConfig, ScheduleConfig, SearchSettings,
    WorkersConfig,
};
pub use disabler::disable_account;
pub use error::{ConfigError, Result};
