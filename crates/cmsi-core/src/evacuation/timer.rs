// ── Deadline tasks ──
//
// One task per armed zone. The task holds only a weak reference to the
// core so an abandoned core is never kept alive by a pending deadline.

use std::sync::Weak;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::CoreInner;
use crate::model::ZoneId;

pub(super) async fn deadline_task(
    core: Weak<CoreInner>,
    zone: ZoneId,
    generation: u64,
    due: Instant,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            trace!(zone = %zone, generation, "deadline cancelled");
        }
        () = tokio::time::sleep_until(due) => {
            if let Some(core) = core.upgrade() {
                core.deadline_elapsed(&zone, generation);
            }
        }
    }
}
