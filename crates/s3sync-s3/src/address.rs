use s3sync_core::StorageError;

const SCHEME: &str = "s3:/";

/// A bucket/key pair parsed from an `s3://bucket/path` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddress {
    pub bucket: String,
    pub key: String,
}

impl RemoteAddress {
    /// True if `address` uses the remote scheme.
    pub fn is_remote(address: &str) -> bool {
        address.starts_with(SCHEME)
    }

    /// Parse `s3://bucket/path` (or `s3:/bucket/path`, or `s3://bucket`).
    pub fn parse(address: &str) -> Result<Self, StorageError> {
        let rest = address
            .strip_prefix("s3://")
            .or_else(|| address.strip_prefix(SCHEME))
            .ok_or_else(|| {
                StorageError::InvalidAddress(format!(
                    "{} does not start with s3://",
                    address
                ))
            })?;

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(StorageError::InvalidAddress(format!(
                "{} has no bucket name",
                address
            )));
        }

        Ok(Self {
            bucket: bucket.to_string(),
            key: key.replace('\\', "/"),
        })
    }

    /// The key as a directory prefix: empty, or ending in `/`.
    pub fn directory_prefix(&self) -> String {
        if self.key.is_empty() || self.key.ends_with('/') {
            self.key.clone()
        } else {
            format!("{}/", self.key)
        }
    }
}

impl std::fmt::Display for RemoteAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
