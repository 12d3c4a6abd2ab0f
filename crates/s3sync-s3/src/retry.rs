use std::future::Future;
use std::time::Duration;

use aws_sdk_s3::error::SdkError;
use tracing::warn;

/// Maximum retries for transient errors (429 / 5xx).
const MAX_RETRIES: u32 = 5;
/// Base delay for exponential backoff.
const BASE_DELAY_MS: u64 = 200;

/// Delay before retry number `attempt`: exponential backoff plus jitter.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt) + rand_jitter())
}

/// Check if an S3 error is retryable (429 or 5xx).
pub(crate) fn is_retryable_s3_error<E>(err: &SdkError<E>) -> bool {
    match err {
        SdkError::ServiceError(e) => {
            let status = e.raw().status().as_u16();
            status == 429 || (500..=504).contains(&status)
        }
        SdkError::ResponseError(e) => {
            let status = e.raw().status().as_u16();
            status == 429 || (500..=504).contains(&status)
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => true,
        _ => false,
    }
}

/// Run an S3 call, retrying transient failures with backoff.
pub(crate) async fn with_retry<T, E, F, Fut>(
    operation: &str,
    key: &str,
    mut call: F,
) -> Result<T, SdkError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SdkError<E>>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(output) => return Ok(output),
            Err(e) if attempt < MAX_RETRIES && is_retryable_s3_error(&e) => {
                warn!(attempt, key, "S3 {} retryable error, retrying", operation);
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Simple jitter: random-ish value 0..50ms using timestamp nanos.
fn rand_jitter() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 % 50)
        .unwrap_or(0)
}
