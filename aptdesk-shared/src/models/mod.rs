/// Domain models and database operations
///
/// Each model owns its table access; handlers never write raw SQL.
pub mod action_log;
pub mod analytics;
pub mod complaint;
pub mod notification;
pub mod user;

pub use action_log::{ActionLog, AuditAction};
pub use complaint::{Complaint, ComplaintStatus, Priority};
pub use notification::{Notification, NotificationKind};
pub use user::{User, UserRole};
