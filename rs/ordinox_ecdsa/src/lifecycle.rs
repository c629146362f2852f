use crate::endpoints::{InitArg, UpgradeArg};
use crate::finalization::retry_pending_finalizations;
use crate::logs::INFO;
use crate::state::event::{replay_events, EventType};
use crate::state::{mutate_state, replace_state, State};
use crate::storage::{count_events, events, record_event};
use crate::{CanisterRuntime, FINALIZATION_RETRY_INTERVAL, IC_CANISTER_RUNTIME};
use ic_canister_log::log;


pub fn init<R: CanisterRuntime>(init_arg: InitArg, runtime: &R) {
    log!(INFO, "[init]: initialized coordinator with arg: {init_arg:?}");
    let state =
        State::try_from(init_arg.clone()).expect("ERROR: failed to initialize the coordinator");
    record_event(EventType::Init(init_arg), runtime);
    replace_state(state);
}

pub fn post_upgrade<R: CanisterRuntime>(upgrade_arg: Option<UpgradeArg>, runtime: &R) {
    let state = replay_events(events())
        .unwrap_or_else(|err| panic!("BUG: failed to replay the event log: {err:?}"));
    replace_state(state);

    if let Some(arg) = upgrade_arg {
        mutate_state(|s| {
            let mut upgraded = s.clone();
            if let Err(err) = upgraded.upgrade(arg.clone()) {
                ic_cdk::trap(&format!(
                    "[post_upgrade]: ERROR: invalid upgrade argument {arg:?}: {err:?}"
                ));
            }
            record_event(EventType::Upgrade(arg), runtime);
            *s = upgraded;
        });
    }

    log!(
        INFO,
        "[upgrade]: replayed {} events from the event log",
        count_events()
    );
}

/// Schedules the periodic retry of finalizations that failed.
pub fn setup_timers() {
    ic_cdk_timers::set_timer_interval(FINALIZATION_RETRY_INTERVAL, || {
        ic_cdk::spawn(retry_pending_finalizations(IC_CANISTER_RUNTIME))
    });
}
