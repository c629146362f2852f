use candid::Principal;
use ic_cdk::{init, post_upgrade, query, update};
use ic_http_types::{HttpRequest, HttpResponse};
use ic_ordinox_ecdsa::endpoints::{
    CoordinatorArg, CoordinatorState, CreateOrSignError, GetEventsArg, GetEventsResult, Message,
    SetupError,
};
use ic_ordinox_ecdsa::lifecycle::{self, setup_timers};
use ic_ordinox_ecdsa::signer::{evm_address as compute_evm_address, lazy_ecdsa_public_key};
use ic_ordinox_ecdsa::state::read_state;
use ic_ordinox_ecdsa::{queries, updates, MessageId, IC_CANISTER_RUNTIME};

fn main() {}

#[init]
fn init(arg: CoordinatorArg) {
    match arg {
        CoordinatorArg::Init(init_arg) => lifecycle::init(init_arg, &IC_CANISTER_RUNTIME),
        CoordinatorArg::Upgrade(_) => {
            ic_cdk::trap("cannot initialize the canister with an Upgrade argument");
        }
    }
    setup_timers();
}

#[post_upgrade]
fn post_upgrade(arg: Option<CoordinatorArg>) {
    match arg {
        Some(CoordinatorArg::Init(_)) => {
            ic_cdk::trap("cannot upgrade the canister with an Init argument");
        }
        Some(CoordinatorArg::Upgrade(upgrade_arg)) => {
            lifecycle::post_upgrade(upgrade_arg, &IC_CANISTER_RUNTIME)
        }
        None => lifecycle::post_upgrade(None, &IC_CANISTER_RUNTIME),
    }
    setup_timers();
}

#[update]
fn setup(signers: Vec<Principal>, threshold: u32) -> Result<(), SetupError> {
    updates::setup::setup(signers, threshold, &IC_CANISTER_RUNTIME)
}

#[update]
async fn create_or_sign_message(data: String) -> Result<MessageId, CreateOrSignError> {
    updates::create_or_sign_message::create_or_sign_message(data, &IC_CANISTER_RUNTIME).await
}

#[update]
async fn create_or_sign_evm_message(
    nonce: u64,
    chain_id: u64,
    token_address: String,
    to_address: String,
    amount: String,
) -> Result<MessageId, CreateOrSignError> {
    updates::create_or_sign_message::create_or_sign_evm_message(
        nonce,
        chain_id,
        token_address,
        to_address,
        amount,
        &IC_CANISTER_RUNTIME,
    )
    .await
}

#[query]
fn get_signature(data: String) -> String {
    read_state(|s| s.signature(&data).unwrap_or_default().to_string())
}

#[query]
fn get_message(id: MessageId) -> Option<Message> {
    read_state(|s| s.message(id).map(Message::from))
}

#[query]
fn state() -> CoordinatorState {
    read_state(|s| s.snapshot())
}

#[query]
fn caller() -> Principal {
    ic_cdk::caller()
}

#[update]
async fn public_key() -> Result<String, String> {
    lazy_ecdsa_public_key(&IC_CANISTER_RUNTIME)
        .await
        .map(hex::encode)
        .map_err(|err| err.to_string())
}

#[update]
async fn evm_address() -> Result<String, String> {
    let public_key = lazy_ecdsa_public_key(&IC_CANISTER_RUNTIME)
        .await
        .map_err(|err| err.to_string())?;
    compute_evm_address(&public_key).map_err(|err| err.to_string())
}

#[query]
fn get_events(arg: GetEventsArg) -> GetEventsResult {
    queries::get_events(arg)
}

#[query(hidden = true)]
fn http_request(req: HttpRequest) -> HttpResponse {
    queries::http_request(req, ic_cdk::api::time())
}
