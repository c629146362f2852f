use crate::state::{read_state, MessageStatus};
use std::cell::Cell;

thread_local! {
    static FINALIZATION_FAILURES: Cell<u64> = Cell::default();
}

/// Counts a signing attempt that left a message open.
pub fn observe_finalization_failure() {
    FINALIZATION_FAILURES.with(|c| c.set(c.get().saturating_add(1)));
}

pub fn finalization_failures() -> u64 {
    FINALIZATION_FAILURES.with(|c| c.get())
}

pub fn encode_metrics(
    metrics: &mut ic_metrics_encoder::MetricsEncoder<Vec<u8>>,
) -> std::io::Result<()> {
    #[cfg(target_arch = "wasm32")]
    metrics.encode_gauge(
        "ordinox_ecdsa_stable_memory_bytes",
        (ic_cdk::api::stable::stable_size() * 64 * 1024) as f64,
        "Size of the stable memory allocated by this canister.",
    )?;

    #[cfg(target_arch = "wasm32")]
    metrics.encode_gauge(
        "ordinox_ecdsa_heap_memory_bytes",
        (core::arch::wasm32::memory_size(0) * 64 * 1024) as f64,
        "Size of the heap memory allocated by this canister.",
    )?;

    metrics.encode_gauge(
        "ordinox_ecdsa_event_count",
        crate::storage::count_events() as f64,
        "Number of events in the event log.",
    )?;

    read_state(|s| {
        metrics.encode_gauge(
            "ordinox_ecdsa_signers",
            s.signer_set
                .as_ref()
                .map(|signer_set| signer_set.signers().len())
                .unwrap_or_default() as f64,
            "Number of principals allowed to endorse messages.",
        )?;
        metrics.encode_gauge(
            "ordinox_ecdsa_threshold",
            s.threshold().unwrap_or_default() as f64,
            "Number of endorsements required to sign a message.",
        )?;
        metrics.encode_gauge(
            "ordinox_ecdsa_open_messages",
            s.count_messages(MessageStatus::Open) as f64,
            "Number of messages waiting for endorsements or for their signature.",
        )?;
        metrics.encode_gauge(
            "ordinox_ecdsa_finalized_messages",
            s.count_messages(MessageStatus::Finalized) as f64,
            "Number of signed messages.",
        )?;
        metrics.encode_gauge(
            "ordinox_ecdsa_next_message_id",
            s.next_id as f64,
            "Identifier of the next message to be created.",
        )?;
        metrics.encode_gauge(
            "ordinox_ecdsa_pending_finalizations",
            s.pending_finalizations.len() as f64,
            "Number of signing requests in flight.",
        )?;
        Ok::<(), std::io::Error>(())
    })?;

    metrics.encode_counter(
        "ordinox_ecdsa_finalization_failures",
        finalization_failures() as f64,
        "Number of failed attempts to sign a message that reached quorum.",
    )?;

    Ok(())
}
