//! Delivery/invocation bridge between the listener and subscriber handlers.
//!
//! Every handler runs on its own task. Verification and denial calls wait
//! for that task (bounded by the listener's handler timeout); notifications
//! are acknowledged right away and the task is left to finish on its own.
//! A task is never aborted, including when the wait times out.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::transport::WebhookResponse;
use crate::utils::error::{DeliveryError, HandlerError, Result, WebSubError};

/// Runs `invocation` on a separate task and waits for its result.
pub async fn await_result<T, F>(timeout: Duration, invocation: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, HandlerError>> + Send + 'static,
{
    let task = tokio::spawn(invocation);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(outcome)) => outcome.map_err(WebSubError::from_handler),
        Ok(Err(join_error)) => Err(DeliveryError::ServiceExecution {
            source: Box::new(join_error),
        }
        .into()),
        Err(_) => Err(DeliveryError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
        .into()),
    }
}

/// Spawns `invocation` and answers `202 Accepted` without waiting for it.
///
/// The handler's failure is only logged; the caller has already been
/// answered by then.
pub fn fire_and_acknowledge<F>(resource: String, invocation: F) -> WebhookResponse
where
    F: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    tokio::spawn(async move {
        match invocation.await {
            Ok(()) => debug!(resource = %resource, "Notification handled"),
            Err(e) => {
                let err = WebSubError::from_handler(e);
                warn!(
                    resource = %resource,
                    service_execution = err.is_service_execution(),
                    "Notification handler failed: {}",
                    err.detail()
                );
            }
        }
    });
    WebhookResponse::accepted()
}
