//! Security module for TabHive — origin allowlists and audit logging.
//!
//! Provides:
//! - **Allowlists**: Validate the claimed origin of external command senders
//! - **Audit logging**: Structured record of accepted and rejected commands

pub mod allowlist;
pub mod audit;

pub use allowlist::{OriginCheckResult, OriginPolicy};
pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
