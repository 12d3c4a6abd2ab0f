use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_sdk_s3::Client as S3Client;
use chrono::DateTime;
use s3sync_core::{ListPage, ObjectEntry, ObjectLister, StorageError};
use tracing::debug;

use crate::retry::with_retry;

const MAX_KEYS_PER_PAGE: i32 = 1000;

/// Delimiter-scoped `ListObjectsV2` pages for one bucket.
#[derive(Clone)]
pub struct S3PageLister {
    s3_client: S3Client,
    bucket_name: String,
}

impl S3PageLister {
    pub fn new(s3_client: S3Client, bucket_name: String) -> Self {
        Self {
            s3_client,
            bucket_name,
        }
    }
}

#[async_trait]
impl ObjectLister for S3PageLister {
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<ListPage, StorageError> {
        let output = with_retry("list_objects_v2", prefix, || {
            self.s3_client
                .list_objects_v2()
                .bucket(&self.bucket_name)
                .prefix(prefix)
                .delimiter("/")
                .max_keys(MAX_KEYS_PER_PAGE)
                .set_continuation_token(continuation.clone())
                .send()
        })
        .await
        .map_err(|e| {
            StorageError::Listing(format!(
                "S3 list_objects_v2 error for s3://{}/{}: {}",
                self.bucket_name,
                prefix,
                DisplayErrorContext(&e)
            ))
        })?;

        let page = page_from_output(output);
        debug!(
            prefix,
            objects = page.objects.len(),
            common_prefixes = page.common_prefixes.len(),
            more = page.next_token.is_some(),
            "Listed S3 page"
        );
        Ok(page)
    }
}

fn page_from_output(output: ListObjectsV2Output) -> ListPage {
    let objects = output
        .contents
        .unwrap_or_default()
        .into_iter()
        .filter_map(|obj| {
            let key = obj.key?;
            let last_modified = obj
                .last_modified
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()));
            Some(ObjectEntry {
                key,
                size: obj.size.unwrap_or(0).max(0) as u64,
                last_modified,
            })
        })
        .collect();

    let common_prefixes = output
        .common_prefixes
        .unwrap_or_default()
        .into_iter()
        .filter_map(|cp| cp.prefix)
        .collect();

    // A truncated page without a token cannot be continued.
    let next_token = if output.is_truncated.unwrap_or(false) {
        output.next_continuation_token
    } else {
        None
    };

    ListPage {
        objects,
        common_prefixes,
        next_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::primitives::DateTime as SmithyDateTime;
    use aws_sdk_s3::types::{CommonPrefix, Object};

    #[test]
    fn test_page_from_output() {
        let output = ListObjectsV2Output::builder()
            .contents(
                Object::builder()
                    .key("data/a.txt")
                    .size(42)
                    .last_modified(SmithyDateTime::from_secs(1_700_000_000))
                    .build(),
            )
            .contents(Object::builder().size(1).build())
            .common_prefixes(CommonPrefix::builder().prefix("data/sub/").build())
            .is_truncated(true)
            .next_continuation_token("token-1")
            .build();

        let page = page_from_output(output);
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].key, "data/a.txt");
        assert_eq!(page.objects[0].size, 42);
        assert_eq!(
            page.objects[0].last_modified.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
        assert_eq!(page.common_prefixes, vec!["data/sub/".to_string()]);
        assert_eq!(page.next_token.as_deref(), Some("token-1"));
    }

    #[test]
    fn test_last_page_has_no_token() {
        let output = ListObjectsV2Output::builder()
            .is_truncated(false)
            .next_continuation_token("ignored")
            .build();
        let page = page_from_output(output);
        assert!(page.objects.is_empty());
        assert!(page.next_token.is_none());
    }
}
