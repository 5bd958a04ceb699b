//! csvtidy - a CSV classification and cleanup utility
//!
//! This library provides utilities for reading CSV header signatures,
//! classifying files into destination groups by signature, planning and
//! executing copy/move runs with a rollback manifest, and removing
//! duplicate rows from individual CSV files.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod dedupe;
pub mod executor;
pub mod header;
pub mod manifest;
pub mod output;
pub mod plan;
pub mod rollback;
pub mod signature;

pub use classifier::{ClassifyError, Classifier, ScanOutcome};
pub use config::{ClassifyConfig, ConfigError};
pub use dedupe::{DedupeOptions, Deduper, KeepPolicy};
pub use executor::{ExecuteError, ExecutionReport, Executor, RunLock};
pub use manifest::{Manifest, ManifestStatus, RunMode, load_manifest};
pub use plan::{ActionKind, Plan, PlanBuilder, PlanError};
pub use rollback::{RollbackEngine, RollbackReport};
pub use signature::{MatchKind, MatchMode, Signature};

pub use cli::{Cli, RunOutcome, run_classify, run_dedupe, run_rollback};
