// Delayed-mode workers
//
// Each accepted job runs on its own task, detached from the request that
// submitted it. A panic anywhere in the job is contained by the task
// boundary and recorded as a failed job instead of leaving the token
// pending forever. Workers share the server process, so an abort or a
// segfault in native stage code still takes the whole server down.

use super::RequestService;
use crate::interface::{RequestForm, ResponseItem};
use crate::jobs::JobToken;
use std::sync::Arc;

/// Accept a job and return its token immediately.
pub(super) fn spawn_delayed_job(
    service: Arc<RequestService>,
    form: RequestForm,
    exclusive: bool,
) -> JobToken {
    let token = service.jobs().mint();
    tracing::info!(request_id = %token, "Delayed job accepted");

    tokio::spawn(async move {
        // One job pipeline at a time when exclusive; the slot is held until
        // the result is stored.
        let _slot = if exclusive {
            match service.job_slot().acquire().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    tracing::error!(request_id = %token, "Job slot unavailable: {}", e);
                    service.jobs().fail(token, e.to_string());
                    return;
                }
            }
        } else {
            None
        };

        let worker = Arc::clone(&service);
        let outcome = tokio::spawn(async move { worker.process(form).await }).await;

        let mut items = vec![ResponseItem::text(format!(
            "The results of your earlier request {} have been received",
            token
        ))];
        match outcome {
            Ok(Ok(result)) => items.extend(result),
            Ok(Err(err)) => {
                tracing::error!(request_id = %token, error = %err, "Delayed job failed");
                items.push(ResponseItem::error(err.user_message()));
            }
            Err(join_err) => {
                tracing::error!(request_id = %token, "Delayed job worker died: {}", join_err);
                service.jobs().fail(token, "the worker processing it crashed");
                return;
            }
        }

        service.jobs().complete(token, items);
        tracing::info!(request_id = %token, "Delayed job finished");
    });

    token
}
