//! Command-line interface module for csvtidy.
//!
//! This module handles all CLI-related functionality including:
//! - Command parsing and validation
//! - Classification orchestration (scan, classify, plan, execute)
//! - Rollback handling
//! - Dedupe handling

use crate::classifier::{Classifier, SkippedFile};
use crate::config::ClassifyConfig;
use crate::dedupe::{DedupeOptions, DedupeOutcome, Deduper, KeepPolicy};
use crate::executor::{Executor, LOCK_FILE_NAME, RunLock};
use crate::header::NormalizeOptions;
use crate::manifest::{Manifest, ManifestEntry, ManifestStatus, ManifestWriter, RunMode};
use crate::output::OutputFormatter;
use crate::plan::{ActionKind, Plan, PlanBuilder};
use crate::rollback::{RollbackEngine, RollbackReport};
use crate::signature::{MatchKind, MatchMode};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

/// Classify CSV files into destination groups by header signature.
#[derive(Debug, Parser)]
#[command(name = "csvtidy", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a source directory and sort CSV files into groups.
    Classify(ClassifyArgs),
    /// Reverse the actions recorded in a run manifest.
    Rollback(RollbackArgs),
    /// Remove duplicate rows from a single CSV file.
    Dedupe(DedupeArgs),
}

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Directory to scan for CSV files.
    pub source: PathBuf,

    /// Destination root; one subdirectory per group.
    pub dest: PathBuf,

    /// Cluster unmatched files by shared header signature instead of
    /// sending them to the unclassified group.
    #[arg(long)]
    pub auto: bool,

    /// Path to a TOML configuration file with signatures and filters.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Signature comparison mode (overrides the config file).
    #[arg(long, value_enum)]
    pub mode: Option<MatchMode>,

    /// Signature match kind (overrides the config file).
    #[arg(long = "match", value_enum)]
    pub match_kind: Option<MatchKind>,

    /// Copy files instead of moving them.
    #[arg(long)]
    pub copy: bool,

    /// Print the plan without touching the filesystem.
    #[arg(long, conflicts_with = "report_only")]
    pub dry_run: bool,

    /// Write the plan as a manifest without executing it.
    #[arg(long)]
    pub report_only: bool,
}

#[derive(Debug, Args)]
pub struct RollbackArgs {
    /// Path to the manifest file of the run to reverse.
    pub manifest: PathBuf,

    /// Verify and report without restoring anything.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Args)]
pub struct DedupeArgs {
    /// CSV file to deduplicate.
    pub input: PathBuf,

    /// Where to write the deduplicated CSV.
    #[arg(long)]
    pub deduped: PathBuf,

    /// Where to write the duplicate-group report CSV.
    #[arg(long)]
    pub report: PathBuf,

    /// Columns considered for the row digest; all columns when omitted.
    #[arg(long, num_args = 1..)]
    pub subset: Vec<String>,

    /// Columns removed from the digest after --subset is applied.
    #[arg(long, num_args = 1..)]
    pub exclude: Vec<String>,

    /// Which row of a duplicate group to keep.
    #[arg(long, value_enum, default_value = "first")]
    pub keep: KeepPolicy,
}

/// How a classification run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Plan computed and printed; nothing persisted.
    DryRunComplete {
        plan: Plan,
        skipped: Vec<SkippedFile>,
    },
    /// Plan persisted as a manifest; no file was copied or moved.
    ReportWritten {
        plan: Plan,
        skipped: Vec<SkippedFile>,
        manifest_path: PathBuf,
    },
    /// Every planned action was applied and recorded.
    Completed {
        plan: Plan,
        skipped: Vec<SkippedFile>,
        manifest_path: PathBuf,
        completed: usize,
    },
}

/// Runs the parsed command and maps the result to an exit code.
pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Commands::Classify(args) => run_classify(&args).map(|_| ()),
        Commands::Rollback(args) => run_rollback(&args).map(|_| ()),
        Commands::Dedupe(args) => run_dedupe(&args).map(|_| ()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&e);
            ExitCode::FAILURE
        }
    }
}

/// Runs the full classification pipeline: load config, scan, classify,
/// plan, then execute (or stop early for dry-run / report-only).
pub fn run_classify(args: &ClassifyArgs) -> Result<RunOutcome, String> {
    let config = match &args.config {
        Some(path) => ClassifyConfig::load(path)
            .map_err(|e| format!("Error loading configuration: {}", e))?,
        None => ClassifyConfig::default(),
    };

    // Command-line flags override the config file defaults.
    let mode = args.mode.or(config.options.mode).unwrap_or_default();
    let kind = args.match_kind.or(config.options.match_kind).unwrap_or_default();

    let normalize = NormalizeOptions::default();
    let registry = config
        .build_registry(mode, kind, &normalize)
        .map_err(|e| format!("Error in configuration: {}", e))?;
    let filters = config
        .compile_filters()
        .map_err(|e| format!("Error compiling filters: {}", e))?;

    if registry.is_empty() && !args.auto {
        OutputFormatter::warning(
            "No signatures configured and --auto is off; every file will be unclassified",
        );
    }

    OutputFormatter::info(&format!("Scanning {}", args.source.display()));
    let classifier = Classifier::new(registry, mode, args.auto).with_filters(filters);
    let outcome = classifier
        .scan(&args.source)
        .map_err(|e| format!("Error scanning source: {}", e))?;
    let skipped = outcome.skipped;
    OutputFormatter::skipped_files(&skipped);

    let records = classifier.classify(outcome.records);
    let action_kind = if args.copy {
        ActionKind::Copy
    } else {
        ActionKind::Move
    };
    let plan = PlanBuilder::build(&records, &args.dest, action_kind)
        .map_err(|e| format!("Error building plan: {}", e))?;

    if plan.is_empty() {
        OutputFormatter::plain("No CSV files to classify.");
    } else {
        OutputFormatter::plan_listing(&plan);
        OutputFormatter::group_summary_table(&plan.group_counts(), plan.len());
    }

    if args.dry_run {
        OutputFormatter::dry_run_notice("No files were modified.");
        return Ok(RunOutcome::DryRunComplete { plan, skipped });
    }

    if args.report_only {
        let manifest = Manifest::new(RunMode::ReportOnly, mode, kind, &args.source, &args.dest);
        let mut writer = ManifestWriter::create(&args.dest, manifest)
            .map_err(|e| format!("Error writing manifest: {}", e))?;
        for action in &plan.actions {
            writer
                .append(ManifestEntry {
                    seq: action.seq,
                    source: action.source.clone(),
                    destination: action.destination.clone(),
                    group: action.group.clone(),
                    kind: action.kind,
                    checksum: None,
                })
                .map_err(|e| format!("Error writing manifest: {}", e))?;
        }
        writer
            .finalize(ManifestStatus::Completed)
            .map_err(|e| format!("Error writing manifest: {}", e))?;

        OutputFormatter::report_only_notice(&format!(
            "Plan written to {}. No files were modified.",
            writer.path().display()
        ));
        return Ok(RunOutcome::ReportWritten {
            plan,
            skipped,
            manifest_path: writer.path().to_path_buf(),
        });
    }

    let _lock = RunLock::acquire(&args.dest.join(LOCK_FILE_NAME)).map_err(|e| e.to_string())?;

    let manifest = Manifest::new(RunMode::Executed, mode, kind, &args.source, &args.dest);
    let mut writer = ManifestWriter::create(&args.dest, manifest)
        .map_err(|e| format!("Error writing manifest: {}", e))?;

    let progress = OutputFormatter::create_progress_bar(plan.len() as u64);
    let report = match Executor::execute(&plan, &mut writer, &progress) {
        Ok(report) => report,
        Err(e) => {
            progress.finish_and_clear();
            return Err(e.to_string());
        }
    };
    progress.finish_and_clear();

    OutputFormatter::success(&format!(
        "Classified {} file{}. Manifest: {}",
        report.completed,
        if report.completed == 1 { "" } else { "s" },
        report.manifest_path.display()
    ));
    OutputFormatter::plain(&format!(
        "Use 'csvtidy rollback {}' to revert.",
        report.manifest_path.display()
    ));

    Ok(RunOutcome::Completed {
        plan,
        skipped,
        manifest_path: report.manifest_path,
        completed: report.completed,
    })
}

/// Reverses a previous run from its manifest.
pub fn run_rollback(args: &RollbackArgs) -> Result<RollbackReport, String> {
    if args.dry_run {
        OutputFormatter::dry_run_notice(&format!(
            "Verifying rollback of {}",
            args.manifest.display()
        ));
    } else {
        OutputFormatter::info(&format!("Rolling back {}", args.manifest.display()));
    }

    let report =
        RollbackEngine::rollback(&args.manifest, args.dry_run).map_err(|e| e.to_string())?;
    OutputFormatter::rollback_report(&report);

    if !report.failed.is_empty() {
        return Err(format!(
            "{} entr{} could not be restored; manifest was not marked rolled back",
            report.failed.len(),
            if report.failed.len() == 1 { "y" } else { "ies" }
        ));
    }
    Ok(report)
}

/// Deduplicates a single CSV file and writes the report.
pub fn run_dedupe(args: &DedupeArgs) -> Result<DedupeOutcome, String> {
    let options = DedupeOptions {
        subset: args.subset.clone(),
        exclude: args.exclude.clone(),
        keep: args.keep,
    };

    let outcome = Deduper::new(options)
        .run(&args.input, &args.deduped, &args.report)
        .map_err(|e| e.to_string())?;

    OutputFormatter::success(&format!(
        "Kept {} of {} rows ({} dropped, {} duplicate group{})",
        outcome.kept_rows,
        outcome.total_rows,
        outcome.dropped_rows(),
        outcome.duplicate_groups.len(),
        if outcome.duplicate_groups.len() == 1 {
            ""
        } else {
            "s"
        }
    ));

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("Failed to parse args")
    }

    #[test]
    fn test_parse_classify_defaults() {
        let cli = parse(&["csvtidy", "classify", "/in", "/out"]);
        match cli.command {
            Commands::Classify(args) => {
                assert_eq!(args.source, PathBuf::from("/in"));
                assert_eq!(args.dest, PathBuf::from("/out"));
                assert!(!args.auto);
                assert!(!args.copy);
                assert!(!args.dry_run);
                assert!(!args.report_only);
                assert_eq!(args.mode, None);
            }
            other => panic!("Expected classify, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_classify_flags() {
        let cli = parse(&[
            "csvtidy", "classify", "/in", "/out", "--auto", "--copy", "--mode", "relaxed",
            "--match", "contains", "--dry-run",
        ]);
        match cli.command {
            Commands::Classify(args) => {
                assert!(args.auto);
                assert!(args.copy);
                assert!(args.dry_run);
                assert_eq!(args.mode, Some(MatchMode::Relaxed));
                assert_eq!(args.match_kind, Some(MatchKind::Contains));
            }
            other => panic!("Expected classify, got {:?}", other),
        }
    }

    #[test]
    fn test_dry_run_conflicts_with_report_only() {
        let result = Cli::try_parse_from([
            "csvtidy",
            "classify",
            "/in",
            "/out",
            "--dry-run",
            "--report-only",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rollback() {
        let cli = parse(&["csvtidy", "rollback", "/out/manifest_x.json", "--dry-run"]);
        match cli.command {
            Commands::Rollback(args) => {
                assert_eq!(args.manifest, PathBuf::from("/out/manifest_x.json"));
                assert!(args.dry_run);
            }
            other => panic!("Expected rollback, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_dedupe() {
        let cli = parse(&[
            "csvtidy", "dedupe", "/in.csv", "--deduped", "/d.csv", "--report", "/r.csv",
            "--subset", "name", "email", "--keep", "last",
        ]);
        match cli.command {
            Commands::Dedupe(args) => {
                assert_eq!(args.subset, vec!["name", "email"]);
                assert!(args.exclude.is_empty());
                assert_eq!(args.keep, KeepPolicy::Last);
            }
            other => panic!("Expected dedupe, got {:?}", other),
        }
    }
}
