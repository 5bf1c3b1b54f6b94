pub mod backup;
pub mod deleter;
pub mod engine;
pub mod manifest;
pub mod report;
pub mod safety;

pub use engine::{CleanupEngine, Selection, CONFIRMATION_TOKEN};
pub use manifest::{DeletionLog, DeletionOutcome, DeletionRecord};
pub use report::{CleanupItem, CleanupReport, ItemKind, ReportSummary};
pub use safety::{Candidate, Confirmations, RejectReason, SafetyChecker, SafetyVerdict};
