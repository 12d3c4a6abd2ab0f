use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata about one object in a listing.
///
/// `filename` is relative to the listed root and always uses `/` as separator.
/// Within one listing, filenames are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Path relative to the listing root
    pub filename: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time, if the backend tracks one
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl File {
    pub fn new(
        filename: impl Into<String>,
        size: u64,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            filename: filename.into(),
            size,
            last_modified,
        }
    }

    /// True if this file's timestamp is strictly newer than `other`'s.
    ///
    /// A missing timestamp on either side is never "newer".
    pub fn is_newer_than(&self, other: &File) -> bool {
        match (self.last_modified, other.last_modified) {
            (Some(mine), Some(theirs)) => mine > theirs,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(secs, 0).single()
    }

    #[test]
    fn test_is_newer_than() {
        let old = File::new("a.txt", 1, at(5));
        let new = File::new("a.txt", 1, at(10));
        assert!(new.is_newer_than(&old));
        assert!(!old.is_newer_than(&new));
        assert!(!old.is_newer_than(&old));
    }

    #[test]
    fn test_missing_timestamp_is_never_newer() {
        let stamped = File::new("a.txt", 1, at(10));
        let bare = File::new("a.txt", 1, None);
        assert!(!stamped.is_newer_than(&bare));
        assert!(!bare.is_newer_than(&stamped));
    }

    #[test]
    fn test_serializes_with_optional_timestamp() {
        let file = File::new("dir/a.txt", 3, None);
        let json = serde_json::to_string(&file).unwrap();
        assert!(json.contains("\"filename\":\"dir/a.txt\""));
        let parsed: File = serde_json::from_str(r#"{"filename":"x","size":1}"#).unwrap();
        assert_eq!(parsed.last_modified, None);
    }
}
