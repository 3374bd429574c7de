//! # ck-audit
//!
//! Append-only audit ledger for the capability kernel.
//!
//! Every policy decision carries an `audit_required` obligation; this crate
//! is where those obligations land. Each [`AuditRecord`] is one JSON line,
//! linked to its predecessor by the SHA-256 hash of the predecessor's line.
//! Inserting, removing, or editing a line breaks the chain and is reported
//! by [`AuditLedger::verify_chain`].
//!
//! ```rust,no_run
//! use ck_audit::{AuditAction, AuditLedger, AuditRecord, AuditSink};
//!
//! let mut ledger = AuditLedger::open("/tmp/ck-audit.jsonl").unwrap();
//! let mut record = AuditRecord::new(AuditAction::Decision, "send_email")
//!     .with_risk(42, "medium");
//! ledger.append(&mut record).unwrap();
//! ```

pub mod error;
pub mod hasher;
pub mod ledger;
pub mod record;
pub mod sink;

pub use error::AuditError;
pub use ledger::AuditLedger;
pub use record::{AuditAction, AuditRecord};
pub use sink::{AuditSink, MemoryAuditLog};
