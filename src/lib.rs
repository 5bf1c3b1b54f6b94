//! # diskclean
//!
//! Finds reclaimable disk space under a directory and deletes it only behind
//! an explicit safety gate.
//!
//! The pipeline runs in four stages:
//!
//! - **Scan**: bounded-concurrency traversal producing a [`ScanSnapshot`],
//!   reusing cached entries whose size, mtime and identity are unchanged
//! - **Classify**: every entry gets a type category, a risk level and an age band
//! - **Deduplicate**: byte-identical files are grouped, hashing only where sizes collide
//!   once the candidate set is large
//! - **Gate**: protected paths, locked files and unwritable parents are never approved
//!
//! [`CleanupEngine::analyze`] never modifies the filesystem.
//! [`CleanupEngine::execute`] deletes only when given the literal
//! [`CONFIRMATION_TOKEN`], and records a per-item outcome instead of
//! aborting on the first failure.
//!
//! [`ScanSnapshot`]: scanner::snapshot::ScanSnapshot
//! [`CleanupEngine::analyze`]: cleaner::CleanupEngine::analyze
//! [`CleanupEngine::execute`]: cleaner::CleanupEngine::execute
//! [`CONFIRMATION_TOKEN`]: cleaner::CONFIRMATION_TOKEN

pub mod classifier;
pub mod cleaner;
pub mod cli;
pub mod common;
pub mod duplicates;
pub mod scanner;
