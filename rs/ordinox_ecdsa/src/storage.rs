//! The coordinator event log, in stable memory.
//!
//! Events are CBOR-encoded and appended to an `ic_stable_structures` log,
//! which survives upgrades. The heap state is rebuilt from it in `post_upgrade`.

use crate::state::event::{Event, EventType};
use crate::CanisterRuntime;
use ic_stable_structures::{
    log::Log as StableLog,
    memory_manager::{MemoryId, MemoryManager, VirtualMemory},
    DefaultMemoryImpl,
};
use std::cell::RefCell;
use std::ops::Range;

const EVENT_INDEX_MEMORY_ID: MemoryId = MemoryId::new(0);
const EVENT_DATA_MEMORY_ID: MemoryId = MemoryId::new(1);

type VMem = VirtualMemory<DefaultMemoryImpl>;
type EventLog = StableLog<Vec<u8>, VMem, VMem>;

thread_local! {
    static MEMORY_MANAGER: RefCell<MemoryManager<DefaultMemoryImpl>> = RefCell::new(
        MemoryManager::init(DefaultMemoryImpl::default())
    );

    static EVENTS: EventLog = MEMORY_MANAGER.with(|m| {
        let m = m.borrow();
        StableLog::init(m.get(EVENT_INDEX_MEMORY_ID), m.get(EVENT_DATA_MEMORY_ID))
            .expect("BUG: failed to initialize the event log")
    });
}

/// Returns the events whose position falls in `range`, in log order.
/// Positions past the end of the log are ignored.
pub fn events_in(range: Range<u64>) -> impl Iterator<Item = Event> {
    range.map_while(|index| {
        EVENTS
            .with(|log| log.get(index))
            .map(|bytes| decode_event(index, &bytes))
    })
}

/// Returns all events, oldest first.
pub fn events() -> impl Iterator<Item = Event> {
    events_in(0..u64::MAX)
}

pub fn count_events() -> u64 {
    EVENTS.with(|log| log.len())
}

/// Appends an event timestamped with the runtime clock.
pub fn record_event<R: CanisterRuntime>(payload: EventType, runtime: &R) {
    let event = Event {
        timestamp: runtime.time(),
        payload,
    };
    let mut bytes = vec![];
    ciborium::ser::into_writer(&event, &mut bytes)
        .expect("BUG: failed to encode a coordinator event");
    EVENTS.with(|log| {
        log.append(&bytes)
            .expect("failed to append an entry to the event log")
    });
}

fn decode_event(index: u64, bytes: &[u8]) -> Event {
    ciborium::de::from_reader(bytes)
        .unwrap_or_else(|err| panic!("BUG: failed to decode event {index}: {err}"))
}
