use crate::endpoints::SetupError;
use crate::logs::INFO;
use crate::state::{audit, mutate_state};
use crate::CanisterRuntime;
use candid::Principal;
use ic_canister_log::log;

/// Configures the signer committee. Succeeds at most once.
pub fn setup<R: CanisterRuntime>(
    signers: Vec<Principal>,
    threshold: u32,
    runtime: &R,
) -> Result<(), SetupError> {
    let caller = runtime.caller();
    mutate_state(|s| {
        let signer_set = s.validate_setup(&caller, signers, threshold)?;
        log!(
            INFO,
            "[setup]: {caller} configured {} signers with threshold {threshold}",
            signer_set.signers().len()
        );
        audit::configure_signers(s, signer_set, runtime);
        Ok(())
    })
}
