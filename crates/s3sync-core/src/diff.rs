use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::file::File;

/// Why a source file has to be copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyReason {
    /// No file with the same name on the destination
    Missing,
    /// Same name, different size
    SizeMismatch,
    /// Same size, source modified strictly later
    SourceNewer,
}

/// A source file that must be transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyAction {
    pub file: File,
    pub reason: CopyReason,
}

/// Result of comparing a source listing against a destination listing.
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    /// Source files to transfer
    pub to_copy: Vec<CopyAction>,
    /// Source files already up to date on the destination
    pub to_skip: Vec<File>,
    /// Destination files without a source counterpart (only when deletion is enabled)
    pub to_delete: Vec<File>,
}

impl SyncPlan {
    /// True when neither copies nor deletions are required.
    pub fn is_noop(&self) -> bool {
        self.to_copy.is_empty() && self.to_delete.is_empty()
    }
}

/// Classify every source file as copy or skip, and every destination file as
/// delete-candidate when `delete_enabled` is set.
///
/// Files are joined by filename. Equal size and a source timestamp that is not
/// strictly newer means skip; a missing timestamp is never newer. Destination
/// listings must not contain duplicate filenames.
pub fn classify(source: &[File], destination: &[File], delete_enabled: bool) -> SyncPlan {
    let existing: HashMap<&str, &File> = destination
        .iter()
        .map(|f| (f.filename.as_str(), f))
        .collect();

    let mut plan = SyncPlan::default();

    for file in source {
        let reason = match existing.get(file.filename.as_str()) {
            None => Some(CopyReason::Missing),
            Some(dest) if dest.size != file.size => Some(CopyReason::SizeMismatch),
            Some(dest) if file.is_newer_than(dest) => Some(CopyReason::SourceNewer),
            Some(_) => None,
        };

        match reason {
            Some(reason) => plan.to_copy.push(CopyAction {
                file: file.clone(),
                reason,
            }),
            None => plan.to_skip.push(file.clone()),
        }
    }

    if delete_enabled {
        let wanted: HashSet<&str> = source.iter().map(|f| f.filename.as_str()).collect();
        plan.to_delete = destination
            .iter()
            .filter(|f| !wanted.contains(f.filename.as_str()))
            .cloned()
            .collect();
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn file(name: &str, size: u64, mtime: i64) -> File {
        File::new(name, size, Utc.timestamp_opt(mtime, 0).single())
    }

    fn names(files: &[File]) -> Vec<&str> {
        files.iter().map(|f| f.filename.as_str()).collect()
    }

    #[test]
    fn test_identical_files_are_skipped() {
        let plan = classify(&[file("a.txt", 10, 5)], &[file("a.txt", 10, 5)], true);
        assert!(plan.to_copy.is_empty());
        assert!(plan.to_delete.is_empty());
        assert_eq!(names(&plan.to_skip), vec!["a.txt"]);
        assert!(plan.is_noop());
    }

    #[test]
    fn test_size_mismatch_copies() {
        let plan = classify(&[file("b.txt", 20, 10)], &[file("b.txt", 15, 10)], false);
        assert_eq!(plan.to_copy.len(), 1);
        assert_eq!(plan.to_copy[0].file.filename, "b.txt");
        assert_eq!(plan.to_copy[0].reason, CopyReason::SizeMismatch);
    }

    #[test]
    fn test_missing_on_destination_copies() {
        let plan = classify(&[file("new.txt", 1, 1)], &[], false);
        assert_eq!(plan.to_copy[0].reason, CopyReason::Missing);
    }

    #[test]
    fn test_newer_source_copies_older_source_skips() {
        let plan = classify(
            &[file("newer.txt", 3, 20), file("older.txt", 3, 1)],
            &[file("newer.txt", 3, 10), file("older.txt", 3, 10)],
            false,
        );
        assert_eq!(plan.to_copy.len(), 1);
        assert_eq!(plan.to_copy[0].file.filename, "newer.txt");
        assert_eq!(plan.to_copy[0].reason, CopyReason::SourceNewer);
        assert_eq!(names(&plan.to_skip), vec!["older.txt"]);
    }

    #[test]
    fn test_missing_destination_timestamp_skips_when_size_matches() {
        let plan = classify(
            &[file("a.bin", 7, 100)],
            &[File::new("a.bin", 7, None)],
            false,
        );
        assert!(plan.to_copy.is_empty());
    }

    #[test]
    fn test_orphans_deleted_only_when_enabled() {
        let destination = [file("c.txt", 1, 1)];

        let plan = classify(&[], &destination, true);
        assert_eq!(names(&plan.to_delete), vec!["c.txt"]);

        let plan = classify(&[], &destination, false);
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn test_inputs_untouched_and_deterministic() {
        let source = vec![file("a", 1, 1), file("b", 2, 2)];
        let destination = vec![file("b", 3, 2), file("z", 1, 1)];
        let before = (source.clone(), destination.clone());

        let first = classify(&source, &destination, true);
        let second = classify(&source, &destination, true);

        assert_eq!((source, destination), before);
        assert_eq!(first.to_copy, second.to_copy);
        assert_eq!(names(&first.to_delete), vec!["z"]);
    }
}
