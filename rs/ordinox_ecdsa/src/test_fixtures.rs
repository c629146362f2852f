use crate::endpoints::InitArg;
use crate::state::{replace_state, State};
use candid::Principal;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature, SigningKey};

pub const NOW: u64 = 1_733_145_560_000_000_000;

pub const ECDSA_KEY_NAME: &str = "key_1";

pub fn init_args() -> InitArg {
    InitArg {
        ecdsa_key_name: ECDSA_KEY_NAME.to_string(),
        setup_authority: None,
    }
}

pub fn init_state(args: InitArg) {
    replace_state(State::try_from(args).expect("BUG: invalid init args"));
}

pub fn principal(id: u8) -> Principal {
    Principal::from_slice(&[id; 29])
}

pub fn signer_a() -> Principal {
    principal(0xa)
}

pub fn signer_b() -> Principal {
    principal(0xb)
}

pub fn signer_c() -> Principal {
    principal(0xc)
}

pub fn outsider() -> Principal {
    principal(0xd)
}

pub fn signing_key() -> SigningKey {
    SigningKey::from_slice(&[7_u8; 32]).expect("BUG: invalid secret key")
}

/// Compressed SEC1 encoding, as returned by the management canister.
pub fn ecdsa_public_key() -> Vec<u8> {
    signing_key()
        .verifying_key()
        .to_encoded_point(true)
        .as_bytes()
        .to_vec()
}

/// The 64-byte `r || s` signature returned by `sign_with_ecdsa`.
pub fn sign_prehash(message_hash: &[u8; 32]) -> Vec<u8> {
    let signature: Signature = signing_key()
        .sign_prehash(message_hash)
        .expect("BUG: failed to sign");
    signature.to_bytes().to_vec()
}

pub mod mock {
    use crate::management::CallError;
    use crate::CanisterRuntime;
    use async_trait::async_trait;
    use candid::Principal;
    use mockall::mock;

    mock! {
        pub CanisterRuntime {}

        #[async_trait]
        impl CanisterRuntime for CanisterRuntime {
            fn caller(&self) -> Principal;
            fn time(&self) -> u64;
            async fn ecdsa_public_key(
                &self,
                key_name: String,
                derivation_path: Vec<Vec<u8>>,
            ) -> Result<Vec<u8>, CallError>;
            async fn sign_with_ecdsa(
                &self,
                key_name: String,
                derivation_path: Vec<Vec<u8>>,
                message_hash: [u8; 32],
            ) -> Result<Vec<u8>, CallError>;
        }
    }
}

/// A runtime where `caller` is the given principal, the clock is frozen and
/// the threshold ECDSA API works.
pub fn runtime_for(caller: Principal) -> mock::MockCanisterRuntime {
    let mut runtime = mock::MockCanisterRuntime::new();
    runtime.expect_caller().return_const(caller);
    runtime.expect_time().return_const(NOW);
    expect_working_ecdsa(&mut runtime);
    runtime
}

pub fn expect_working_ecdsa(runtime: &mut mock::MockCanisterRuntime) {
    runtime
        .expect_ecdsa_public_key()
        .returning(|_, _| Ok(ecdsa_public_key()));
    runtime
        .expect_sign_with_ecdsa()
        .returning(|_, _, message_hash| Ok(sign_prehash(&message_hash)));
}
