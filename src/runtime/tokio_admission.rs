//! Tokio driver for the admission loop.
//!
//! Backoff waits become `tokio::time::sleep` suspension points raced against
//! a caller-supplied cancellation future, so a request handler can give up
//! (client disconnect, shutdown) without holding a worker thread.

use std::future::Future;

use tracing::Instrument;

use crate::core::admission::{Admission, AdmissionController, Step};

/// Run the decision loop asynchronously.
///
/// `cancel` resolving during a backoff wait ends the loop with a
/// [`crate::core::RejectKind::Cancelled`] rejection.
pub async fn admit_async<C>(
    controller: &AdmissionController,
    use_sideband: bool,
    cancel: C,
) -> Admission
where
    C: Future<Output = ()>,
{
    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("admission", %run_id, use_sideband);

    async move {
        tokio::pin!(cancel);
        let mut run = controller.begin(use_sideband);
        loop {
            match run.step() {
                Step::Done(admission) => return admission,
                Step::Pause { duration, load } => {
                    if duration.is_zero() {
                        continue;
                    }
                    tokio::select! {
                        () = tokio::time::sleep(duration) => {}
                        () = &mut cancel => return run.cancel(load),
                    }
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// Run the decision loop asynchronously without a cancellation signal.
pub async fn admit_uncancellable(
    controller: &AdmissionController,
    use_sideband: bool,
) -> Admission {
    admit_async(controller, use_sideband, std::future::pending()).await
}
