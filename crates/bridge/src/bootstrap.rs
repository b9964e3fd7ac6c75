//! Consumer-group bootstrap.
//!
//! Neither step can abort startup: a failed group creation becomes an info
//! signal, a failed trim a warning. If the broker really is down, the read
//! loop's backoff handles it.

use streambot_core::error::StreamError;
use streambot_core::event::{BridgeInfo, BridgeSignal, BridgeWarning, SignalBus};
use streambot_core::stream::StreamClient;
use tracing::{debug, info, warn};

/// Create `group` on `key` at `start_id`, creating the stream if needed.
///
/// Returns `true` when the group was created by this call. "Already exists"
/// is the normal restart case.
pub async fn ensure_group(
    client: &dyn StreamClient,
    signals: &SignalBus,
    key: &str,
    group: &str,
    start_id: &str,
) -> bool {
    match client.create_group(key, group, start_id).await {
        Ok(()) => {
            info!(stream = %key, group = %group, "Created consumer group");
            true
        }
        Err(e) => {
            let already_exists = matches!(e, StreamError::GroupExists { .. });
            if already_exists {
                info!(stream = %key, group = %group, "Consumer group already exists");
            } else {
                warn!(stream = %key, group = %group, error = %e, "Consumer group creation failed");
            }
            signals.publish(BridgeSignal::Info(BridgeInfo::GroupCreateFailed {
                group: group.to_string(),
                already_exists,
                reason: e.to_string(),
            }));
            false
        }
    }
}

/// Bound the stream's retained length, approximately.
pub async fn trim_stream(client: &dyn StreamClient, signals: &SignalBus, key: &str, max_len: usize) {
    match client.trim(key, max_len).await {
        Ok(evicted) => debug!(stream = %key, max_len, evicted, "Trimmed stream"),
        Err(e) => {
            warn!(stream = %key, error = %e, "Stream trim failed");
            signals.publish(BridgeSignal::Warning(BridgeWarning::TrimFailed {
                stream: key.to_string(),
                reason: e.to_string(),
            }));
        }
    }
}
