//! Plan construction: a pure mapping from classified records to an
//! ordered list of planned filesystem actions.
//!
//! Building a plan never touches the filesystem. Destination
//! collisions (two sources mapping to the same destination path) are
//! detected here and fail planning; resolution policy is deliberately
//! not inferred.

use crate::signature::Signature;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Group name used for files no configured signature matched when
/// auto-clustering is disabled.
pub const UNCLASSIFIED_GROUP: &str = "unclassified";

/// How a record was assigned to its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// No configured signature matched and auto mode was off.
    Unclassified,
    /// A configured signature matched.
    Matched,
    /// Grouped with other files sharing the same auto-derived signature.
    Clustered,
}

/// A scanned file with its computed signature and group assignment.
/// Created during scanning, assigned by the matcher or cluster
/// assigner, read-only afterwards.
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// Source path of the file.
    pub path: PathBuf,
    /// Normalized header, in file order.
    pub header: Vec<String>,
    /// Signature computed under the mode the record was matched with.
    pub signature: Signature,
    /// Destination group name.
    pub group: String,
    /// How the group was assigned.
    pub status: RecordStatus,
}

/// Whether an action copies or moves the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Copy,
    Move,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Copy => "copy",
            ActionKind::Move => "move",
        }
    }
}

/// A single planned file action. Immutable once created.
#[derive(Debug, Clone)]
pub struct PlannedAction {
    /// Execution order; actions are applied in ascending sequence.
    pub seq: usize,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub group: String,
    pub kind: ActionKind,
}

/// Ordered sequence of planned actions for a single classification run.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub actions: Vec<PlannedAction>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of planned files per destination group.
    pub fn group_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for action in &self.actions {
            *counts.entry(action.group.clone()).or_insert(0) += 1;
        }
        counts
    }
}

/// Two source files mapping to the identical destination path.
#[derive(Debug, Clone)]
pub struct Collision {
    pub destination: PathBuf,
    pub first: PathBuf,
    pub second: PathBuf,
}

/// Errors raised during plan construction.
#[derive(Debug)]
pub enum PlanError {
    /// One or more destination collisions; all are reported at once.
    DestinationCollision(Vec<Collision>),
    /// A source path with no final file name component.
    NoFileName(PathBuf),
}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::DestinationCollision(collisions) => {
                writeln!(
                    f,
                    "{} destination collision(s); no files were touched:",
                    collisions.len()
                )?;
                for c in collisions {
                    writeln!(
                        f,
                        "  {} <- both {} and {}",
                        c.destination.display(),
                        c.first.display(),
                        c.second.display()
                    )?;
                }
                Ok(())
            }
            PlanError::NoFileName(path) => {
                write!(f, "Source path {} has no file name component", path.display())
            }
        }
    }
}

impl std::error::Error for PlanError {}

/// Builds plans from classified records.
pub struct PlanBuilder;

impl PlanBuilder {
    /// Combines classified records into an ordered plan.
    ///
    /// Records are expected in stable scan order (sorted by path);
    /// sequence numbers follow that order. Destination per record is
    /// `<dest_root>/<group>/<original_filename>`.
    pub fn build(
        records: &[FileRecord],
        dest_root: &Path,
        kind: ActionKind,
    ) -> Result<Plan, PlanError> {
        let mut actions = Vec::with_capacity(records.len());
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut collisions = Vec::new();

        for (seq, record) in records.iter().enumerate() {
            let file_name = record
                .path
                .file_name()
                .ok_or_else(|| PlanError::NoFileName(record.path.clone()))?;

            let destination = dest_root.join(&record.group).join(file_name);

            if let Some(first) = claimed.get(&destination) {
                collisions.push(Collision {
                    destination: destination.clone(),
                    first: first.clone(),
                    second: record.path.clone(),
                });
                continue;
            }
            claimed.insert(destination.clone(), record.path.clone());

            actions.push(PlannedAction {
                seq,
                source: record.path.clone(),
                destination,
                group: record.group.clone(),
                kind,
            });
        }

        if !collisions.is_empty() {
            return Err(PlanError::DestinationCollision(collisions));
        }

        Ok(Plan { actions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{MatchMode, Signature};

    fn record(path: &str, group: &str) -> FileRecord {
        let header = vec!["id".to_string(), "name".to_string()];
        FileRecord {
            path: PathBuf::from(path),
            signature: Signature::compute(&header, MatchMode::Strict),
            header,
            group: group.to_string(),
            status: RecordStatus::Matched,
        }
    }

    #[test]
    fn test_build_assigns_sequence_in_order() {
        let records = vec![record("/src/a.csv", "users"), record("/src/b.csv", "users")];
        let plan = PlanBuilder::build(&records, Path::new("/dest"), ActionKind::Move)
            .expect("Failed to build plan");

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.actions[0].seq, 0);
        assert_eq!(plan.actions[1].seq, 1);
        assert_eq!(plan.actions[0].destination, PathBuf::from("/dest/users/a.csv"));
    }

    #[test]
    fn test_build_detects_collisions() {
        let records = vec![
            record("/src/x/data.csv", "users"),
            record("/src/y/data.csv", "users"),
        ];
        let err = PlanBuilder::build(&records, Path::new("/dest"), ActionKind::Move).unwrap_err();

        match err {
            PlanError::DestinationCollision(collisions) => {
                assert_eq!(collisions.len(), 1);
                assert_eq!(collisions[0].destination, PathBuf::from("/dest/users/data.csv"));
                assert_eq!(collisions[0].first, PathBuf::from("/src/x/data.csv"));
                assert_eq!(collisions[0].second, PathBuf::from("/src/y/data.csv"));
            }
            other => panic!("Expected collision error, got {:?}", other),
        }
    }

    #[test]
    fn test_same_name_different_groups_no_collision() {
        let records = vec![
            record("/src/x/data.csv", "users"),
            record("/src/y/data.csv", "sales"),
        ];
        let plan = PlanBuilder::build(&records, Path::new("/dest"), ActionKind::Copy)
            .expect("Failed to build plan");
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_group_counts() {
        let records = vec![
            record("/src/a.csv", "users"),
            record("/src/b.csv", "users"),
            record("/src/c.csv", "sales"),
        ];
        let plan = PlanBuilder::build(&records, Path::new("/dest"), ActionKind::Move)
            .expect("Failed to build plan");

        let counts = plan.group_counts();
        assert_eq!(counts.get("users"), Some(&2));
        assert_eq!(counts.get("sales"), Some(&1));
    }

    #[test]
    fn test_empty_records_build_empty_plan() {
        let plan = PlanBuilder::build(&[], Path::new("/dest"), ActionKind::Move)
            .expect("Failed to build plan");
        assert!(plan.is_empty());
    }
}
