/// Dashboard administration state
///
/// Audit log, moderation records, dashboard roles and permissions,
/// the Squad whitelist and dashboard settings.

pub mod audit;
pub mod moderation;
pub mod roles;
pub mod settings;
pub mod whitelist;

pub use audit::{AuditAuthor, AuditLogEntry, AuditRecorder, NewAuditEntry};
pub use moderation::{ModerationCount, ModerationKind, ModerationManager, ModerationRecord, NewModeration};
pub use roles::{Action, Page, PermissionSchema, Role, RoleManager, Toggle, OWNER_ROLE};
pub use settings::SettingsManager;
pub use whitelist::{Whitelist, WhitelistEntry, WhitelistGroup, WhitelistManager};
