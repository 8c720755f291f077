pub mod account;
pub mod activity;
pub mod dashboard;
pub mod error;
pub mod history;
pub mod incident;
pub mod state;

pub use account::{Account, Proxy};
pub use activity::{Activity, ActivityKind};
pub use dashboard::{Counters, DashboardData, PointProgress, Promotion, PunchCard, UserStatus};
pub use error::{error_id, FlowError, Result};
pub use history::{AccountHistoryEntry, RunSummary, RunSummaryEntry};
pub use incident::{BanDetectionResult, BanSeverity, IncidentKind, SecurityIncident};
pub use state::{LoginState, Persona, RunContext, WorkUnitId};
