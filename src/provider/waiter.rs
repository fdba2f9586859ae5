//! Async completion waiter.
//!
//! Mutating API calls are accepted immediately and answered with a
//! `Location` header such as `https://api.ionos.com/cloudapi/v6/requests/<id>/status`.
//! [`await_completion`] polls that request until it is `DONE` or `FAILED`.

use std::time::Duration;

use async_trait::async_trait;

use super::error::{ApiError, ApiResult};
use super::models::{RequestState, RequestStatus};

/// Number of status polls before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1000;

/// Delay between two status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Bounds for the completion poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WaitPolicy {
    /// Hard ceiling on the total wait time
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Anything that can report the status of a pending request.
#[async_trait]
pub trait RequestStatusSource: Send + Sync {
    async fn request_status(&self, request_id: &str) -> ApiResult<RequestStatus>;
}

/// Extract the request id from a status location URL.
///
/// The id is the second-to-last `/` delimited segment:
/// `.../requests/<id>/status` yields `<id>`.
pub fn request_id_from_location(location: &str) -> Option<&str> {
    let mut segments = location.trim_end_matches('/').rsplit('/');
    segments.next()?;
    segments.next().filter(|id| !id.is_empty())
}

/// Poll a pending request until it reaches a terminal state.
///
/// - `DONE` returns `Ok(())`.
/// - `FAILED` returns [`ApiError::RequestFailed`] with the remote message.
/// - A failure of the status call itself returns [`ApiError::Poll`] at once.
/// - Running out of attempts returns [`ApiError::Timeout`].
pub async fn await_completion<S>(source: &S, location: &str, policy: WaitPolicy) -> ApiResult<()>
where
    S: RequestStatusSource + ?Sized,
{
    let request_id = request_id_from_location(location)
        .ok_or_else(|| ApiError::InvalidLocation(location.to_string()))?;

    tracing::debug!(
        "Waiting for request {} (up to {:?})",
        request_id,
        policy.ceiling()
    );

    for attempt in 1..=policy.max_attempts {
        let status = source
            .request_status(request_id)
            .await
            .map_err(|e| ApiError::Poll {
                request_id: request_id.to_string(),
                source: Box::new(e),
            })?;

        match status.metadata.status {
            RequestState::Done => {
                tracing::debug!("Request {} done after {} polls", request_id, attempt);
                return Ok(());
            }
            RequestState::Failed => {
                return Err(ApiError::RequestFailed {
                    request_id: request_id.to_string(),
                    message: status.metadata.message.unwrap_or_default(),
                });
            }
            state => {
                tracing::trace!("Request {} is {:?}", request_id, state);
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(ApiError::Timeout {
        request_id: request_id.to_string(),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::provider::models::RequestMetadata;

    const LOCATION: &str = "https://api.example.com/cloudapi/v6/requests/abc-123/status";

    struct ScriptedStatus {
        replies: Mutex<VecDeque<ApiResult<RequestStatus>>>,
        polled: Mutex<Vec<String>>,
    }

    impl ScriptedStatus {
        fn new(replies: Vec<ApiResult<RequestStatus>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                polled: Mutex::new(Vec::new()),
            }
        }

        fn polls(&self) -> usize {
            self.polled.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl RequestStatusSource for ScriptedStatus {
        async fn request_status(&self, request_id: &str) -> ApiResult<RequestStatus> {
            self.polled.lock().unwrap().push(request_id.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(status(RequestState::Running, None)))
        }
    }

    fn status(state: RequestState, message: Option<&str>) -> RequestStatus {
        RequestStatus {
            metadata: RequestMetadata {
                status: state,
                message: message.map(String::from),
            },
        }
    }

    fn fast(max_attempts: u32) -> WaitPolicy {
        WaitPolicy {
            max_attempts,
            interval: Duration::ZERO,
        }
    }

    #[test]
    fn test_request_id_from_location() {
        assert_eq!(request_id_from_location(LOCATION), Some("abc-123"));
        assert_eq!(request_id_from_location("requests/xyz/status/"), Some("xyz"));
        assert_eq!(request_id_from_location("status"), None);
        assert_eq!(request_id_from_location(""), None);
    }

    #[test]
    fn test_default_policy_ceiling() {
        let policy = WaitPolicy::default();
        assert_eq!(policy.max_attempts, 1000);
        assert_eq!(policy.ceiling(), Duration::from_secs(10_000));
    }

    #[tokio::test]
    async fn test_running_then_done_succeeds() {
        let source = ScriptedStatus::new(vec![
            Ok(status(RequestState::Queued, None)),
            Ok(status(RequestState::Running, None)),
            Ok(status(RequestState::Running, None)),
            Ok(status(RequestState::Done, None)),
        ]);

        await_completion(&source, LOCATION, fast(10)).await.unwrap();

        assert_eq!(source.polls(), 4);
        assert!(source
            .polled
            .lock()
            .unwrap()
            .iter()
            .all(|id| id == "abc-123"));
    }

    #[tokio::test]
    async fn test_failed_carries_remote_message() {
        let source = ScriptedStatus::new(vec![
            Ok(status(RequestState::Running, None)),
            Ok(status(RequestState::Failed, Some("quota exceeded"))),
        ]);

        let err = await_completion(&source, LOCATION, fast(10))
            .await
            .unwrap_err();

        assert!(err.is_request_failed());
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_timeout() {
        let source = ScriptedStatus::new(vec![]);

        let err = await_completion(&source, LOCATION, fast(5))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(!err.is_request_failed());
        assert_eq!(source.polls(), 5);
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let source = ScriptedStatus::new(vec![
            Err(ApiError::status(401, "authentication failed: bad token")),
            Ok(status(RequestState::Done, None)),
        ]);

        let err = await_completion(&source, LOCATION, fast(10))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Poll { .. }));
        assert_eq!(source.polls(), 1);
    }

    #[tokio::test]
    async fn test_invalid_location() {
        let source = ScriptedStatus::new(vec![]);
        let err = await_completion(&source, "", fast(1)).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidLocation(_)));
        assert_eq!(source.polls(), 0);
    }
}
