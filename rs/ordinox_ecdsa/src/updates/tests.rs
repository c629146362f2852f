use crate::endpoints::{CreateOrSignError, InitArg, MessageKind, SetupError};
use crate::evm::EvmTransfer;
use crate::management::{CallError, Reason};
use crate::signer::personal_message_digest;
use crate::state::event::{replay_events, EventType};
use crate::state::{read_state, MessageStatus, State};
use crate::storage::{count_events, events, record_event};
use crate::test_fixtures::mock::MockCanisterRuntime;
use crate::test_fixtures::{
    ecdsa_public_key, init_args, init_state, outsider, runtime_for, signer_a, signer_b,
    signer_c, signing_key, NOW,
};
use crate::updates::create_or_sign_message::{
    create_or_sign_evm_message, create_or_sign_message,
};
use crate::updates::setup::setup;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

fn init_and_setup(threshold: u32) {
    let args = init_args();
    init_state(args.clone());
    let runtime = runtime_for(signer_a());
    record_event(EventType::Init(args), &runtime);
    setup(vec![signer_a(), signer_b(), signer_c()], threshold, &runtime).unwrap();
}

fn assert_replay_matches_state() {
    let replayed = replay_events(events()).unwrap();
    assert_eq!(read_state(|s| replayed.is_equivalent_to(s)), Ok(()));
}

fn assert_valid_signature(message: &[u8], signature: &str) {
    let bytes = hex::decode(signature.strip_prefix("0x").unwrap()).unwrap();
    let recovered = VerifyingKey::recover_from_prehash(
        &personal_message_digest(message),
        &Signature::from_slice(&bytes[..64]).unwrap(),
        RecoveryId::from_byte(bytes[64] - 27).unwrap(),
    )
    .unwrap();
    assert_eq!(recovered, VerifyingKey::from(&signing_key()));
}

mod setup {
    use super::*;

    #[test]
    fn should_configure_signers_once() {
        init_state(init_args());
        let runtime = runtime_for(outsider());

        assert_eq!(
            setup(vec![signer_a(), signer_b(), signer_c()], 2, &runtime),
            Ok(())
        );
        let state_after_setup = read_state(|s| s.clone());
        let events_after_setup = count_events();

        assert_eq!(
            setup(vec![signer_a()], 1, &runtime),
            Err(SetupError::AlreadyConfigured)
        );
        assert_eq!(read_state(|s| s.clone()), state_after_setup);
        assert_eq!(count_events(), events_after_setup);

        let snapshot = read_state(|s| s.snapshot());
        assert_eq!(snapshot.threshold, 2);
        assert_eq!(snapshot.signers, vec![signer_a(), signer_b(), signer_c()]);
    }

    #[test]
    fn should_leave_state_unchanged_on_invalid_setup() {
        init_state(init_args());
        let runtime = runtime_for(signer_a());
        let initial_state = read_state(|s| s.clone());

        assert_eq!(setup(vec![], 1, &runtime), Err(SetupError::NoSigners));
        assert_eq!(
            setup(vec![signer_a(), signer_a()], 1, &runtime),
            Err(SetupError::DuplicateSigner(signer_a()))
        );
        assert_eq!(
            setup(vec![signer_a(), signer_b()], 3, &runtime),
            Err(SetupError::InvalidThreshold {
                threshold: 3,
                num_signers: 2
            })
        );
        assert_eq!(
            setup(vec![signer_a(), signer_b()], 0, &runtime),
            Err(SetupError::InvalidThreshold {
                threshold: 0,
                num_signers: 2
            })
        );

        assert_eq!(read_state(|s| s.clone()), initial_state);
        assert_eq!(count_events(), 0);
    }

    #[test]
    fn should_reject_caller_other_than_setup_authority() {
        init_state(InitArg {
            setup_authority: Some(signer_c()),
            ..init_args()
        });

        assert_eq!(
            setup(vec![signer_a()], 1, &runtime_for(signer_a())),
            Err(SetupError::NotAuthorized(signer_a()))
        );
        assert_eq!(setup(vec![signer_a()], 1, &runtime_for(signer_c())), Ok(()));
    }
}

mod create_or_sign_message {
    use super::*;
    use proptest::collection::vec;
    use proptest::prelude::*;

    #[tokio::test]
    async fn should_reject_before_setup() {
        init_state(init_args());

        assert_eq!(
            create_or_sign_message("hello".to_string(), &runtime_for(signer_a())).await,
            Err(CreateOrSignError::NotConfigured)
        );
        assert_eq!(read_state(|s| s.next_id), 0);
    }

    #[tokio::test]
    async fn should_sign_once_threshold_is_reached() {
        init_and_setup(2);

        // A endorses: the message is created and stays open.
        assert_eq!(
            create_or_sign_message("hello".to_string(), &runtime_for(signer_a())).await,
            Ok(0)
        );
        read_state(|s| {
            let message = s.message(0).unwrap();
            assert_eq!(message.signers, vec![signer_a()]);
            assert_eq!(message.status(), MessageStatus::Open);
            assert_eq!(s.signature("hello"), None);
        });

        // B endorses: quorum is reached and the message is signed.
        assert_eq!(
            create_or_sign_message("hello".to_string(), &runtime_for(signer_b())).await,
            Ok(0)
        );
        let signature = read_state(|s| s.signature("hello").map(str::to_string)).unwrap();
        assert_valid_signature(b"hello", &signature);

        // C endorses: the endorsement is kept but the message is not signed again.
        let mut runtime = MockCanisterRuntime::new();
        runtime.expect_caller().return_const(signer_c());
        runtime.expect_time().return_const(NOW);
        runtime.expect_sign_with_ecdsa().never();
        assert_eq!(
            create_or_sign_message("hello".to_string(), &runtime).await,
            Ok(0)
        );
        read_state(|s| {
            let message = s.message(0).unwrap();
            assert_eq!(message.signers, vec![signer_a(), signer_b(), signer_c()]);
            assert_eq!(message.signature.as_deref(), Some(signature.as_str()));
        });

        // D is not a signer.
        assert_eq!(
            create_or_sign_message("hello".to_string(), &runtime_for(outsider())).await,
            Err(CreateOrSignError::NotAuthorized(outsider()))
        );

        read_state(|s| {
            assert_eq!(s.next_id, 1);
            assert_eq!(s.messages.len(), 1);
        });
        assert_replay_matches_state();
    }

    #[tokio::test]
    async fn should_ignore_repeated_endorsement() {
        init_and_setup(2);
        let runtime = runtime_for(signer_a());

        for _ in 0..3 {
            assert_eq!(
                create_or_sign_message("hello".to_string(), &runtime).await,
                Ok(0)
            );
        }

        read_state(|s| {
            assert_eq!(s.next_id, 1);
            assert_eq!(s.message(0).unwrap().signers, vec![signer_a()]);
            assert_eq!(s.signature("hello"), None);
        });
        // Init, setup, creation and a single endorsement.
        assert_eq!(count_events(), 4);
    }

    #[tokio::test]
    async fn should_distinguish_payloads_byte_for_byte() {
        init_and_setup(3);
        let runtime = runtime_for(signer_a());

        for (expected_id, data) in ["hello", "Hello", "hello ", ""].into_iter().enumerate() {
            assert_eq!(
                create_or_sign_message(data.to_string(), &runtime).await,
                Ok(expected_id as u64)
            );
        }
        assert_eq!(read_state(|s| s.next_id), 4);
    }

    #[tokio::test]
    async fn should_sign_with_threshold_of_one() {
        init_and_setup(1);

        assert_eq!(
            create_or_sign_message("hello".to_string(), &runtime_for(signer_c())).await,
            Ok(0)
        );

        let signature = read_state(|s| s.signature("hello").map(str::to_string)).unwrap();
        assert_valid_signature(b"hello", &signature);
    }

    #[tokio::test]
    async fn should_retry_signing_after_failure() {
        init_and_setup(2);
        create_or_sign_message("hello".to_string(), &runtime_for(signer_a()))
            .await
            .unwrap();

        let mut failing_runtime = MockCanisterRuntime::new();
        failing_runtime.expect_caller().return_const(signer_b());
        failing_runtime.expect_time().return_const(NOW);
        failing_runtime
            .expect_ecdsa_public_key()
            .returning(|_, _| Ok(ecdsa_public_key()));
        failing_runtime
            .expect_sign_with_ecdsa()
            .times(1)
            .returning(|_, _, _| {
                Err(CallError::new(
                    "sign_with_ecdsa",
                    Reason::CanisterError("timeout".to_string()),
                ))
            });
        assert_eq!(
            create_or_sign_message("hello".to_string(), &failing_runtime).await,
            Ok(0)
        );
        read_state(|s| {
            let message = s.message(0).unwrap();
            assert_eq!(message.signers, vec![signer_a(), signer_b()]);
            assert_eq!(message.status(), MessageStatus::Open);
            assert_eq!(s.messages_awaiting_signature(), vec![0]);
        });

        // An endorser submitting again triggers the signature.
        assert_eq!(
            create_or_sign_message("hello".to_string(), &runtime_for(signer_b())).await,
            Ok(0)
        );
        read_state(|s| {
            let message = s.message(0).unwrap();
            assert_eq!(message.signers, vec![signer_a(), signer_b()]);
            assert_eq!(message.status(), MessageStatus::Finalized);
        });
        assert_replay_matches_state();
    }

    #[tokio::test]
    async fn should_replay_interleaved_messages() {
        init_and_setup(2);

        for (caller, data) in [
            (signer_a(), "first"),
            (signer_b(), "second"),
            (signer_c(), "first"),
            (signer_a(), "third"),
            (signer_c(), "second"),
            (signer_b(), "first"),
        ] {
            create_or_sign_message(data.to_string(), &runtime_for(caller))
                .await
                .unwrap();
        }

        read_state(|s| {
            assert_eq!(s.message_id("first"), Some(0));
            assert_eq!(s.message_id("second"), Some(1));
            assert_eq!(s.message_id("third"), Some(2));
            assert_eq!(s.count_messages(MessageStatus::Finalized), 2);
            assert_eq!(s.count_messages(MessageStatus::Open), 1);
            assert_eq!(
                s.message(0).unwrap().signers,
                vec![signer_a(), signer_c(), signer_b()]
            );
        });
        assert_replay_matches_state();
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    proptest! {
        #[test]
        fn should_count_distinct_endorsers_regardless_of_order(
            submissions in vec((0_usize..4, 0_usize..3), 1..30),
            threshold in 1_u32..=3,
        ) {
            let callers = [signer_a(), signer_b(), signer_c(), outsider()];
            let payloads = ["alpha", "beta", "gamma"];
            init_state(init_args());
            let runtime = runtime_for(signer_a());
            setup(callers[..3].to_vec(), threshold, &runtime).unwrap();

            let mut first_ids = std::collections::BTreeMap::new();
            for (caller, payload) in &submissions {
                let result = block_on(create_or_sign_message(
                    payloads[*payload].to_string(),
                    &runtime_for(callers[*caller]),
                ));
                if *caller == 3 {
                    prop_assert_eq!(result, Err(CreateOrSignError::NotAuthorized(outsider())));
                    continue;
                }
                let next_expected_id = first_ids.len() as u64;
                let id = *first_ids.entry(*payload).or_insert(next_expected_id);
                prop_assert_eq!(result, Ok(id));
            }

            let state: State = read_state(|s| s.clone());
            prop_assert_eq!(state.next_id, first_ids.len() as u64);
            for (payload, id) in first_ids {
                let mut expected_signers = vec![];
                for (caller, p) in &submissions {
                    if *p == payload && *caller < 3 && !expected_signers.contains(&callers[*caller]) {
                        expected_signers.push(callers[*caller]);
                    }
                }
                let message = state.message(id).unwrap();
                prop_assert_eq!(&message.signers, &expected_signers);
                prop_assert_eq!(
                    message.status() == MessageStatus::Finalized,
                    expected_signers.len() >= threshold as usize
                );
            }
        }
    }
}

mod create_or_sign_evm_message {
    use super::*;
    use assert_matches::assert_matches;

    const TOKEN: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";
    const RECIPIENT: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";
    const TRANSFER_HASH: &str =
        "0x53ce8703e06b3e8a648f387c31261addab96ccd41c8997f0640651f1662552ad";

    async fn endorse_transfer(
        caller: candid::Principal,
        to_address: &str,
    ) -> Result<u64, CreateOrSignError> {
        create_or_sign_evm_message(
            7,
            11_155_111,
            TOKEN.to_string(),
            to_address.to_string(),
            "1000000000000000000".to_string(),
            &runtime_for(caller),
        )
        .await
    }

    #[tokio::test]
    async fn should_sign_transfer_hash_once_threshold_is_reached() {
        init_and_setup(2);

        assert_eq!(endorse_transfer(signer_a(), RECIPIENT).await, Ok(0));
        read_state(|s| {
            let message = s.message(0).unwrap();
            assert_eq!(message.kind, MessageKind::EvmTransfer);
            assert_eq!(message.data, TRANSFER_HASH);
            assert_eq!(message.signature, None);
        });

        // Same transfer with a lowercase address hashes to the same message.
        assert_eq!(
            endorse_transfer(signer_b(), &RECIPIENT.to_lowercase()).await,
            Ok(0)
        );

        let signature = read_state(|s| s.signature(TRANSFER_HASH).map(str::to_string)).unwrap();
        let hash = hex::decode(TRANSFER_HASH.strip_prefix("0x").unwrap()).unwrap();
        assert_valid_signature(&hash, &signature);
        assert_eq!(
            read_state(|s| s.message(0).unwrap().signers.clone()),
            vec![signer_a(), signer_b()]
        );
        assert_replay_matches_state();
    }

    #[tokio::test]
    async fn should_keep_transfers_apart_from_text_messages() {
        init_and_setup(2);

        assert_eq!(
            create_or_sign_message(TRANSFER_HASH.to_string(), &runtime_for(signer_a())).await,
            Ok(0)
        );
        assert_eq!(endorse_transfer(signer_a(), RECIPIENT).await, Ok(1));
        assert_eq!(endorse_transfer(signer_c(), RECIPIENT).await, Ok(1));

        read_state(|s| {
            assert_eq!(s.message(0).unwrap().signature, None);
            assert!(s.message(1).unwrap().signature.is_some());
        });
        assert_replay_matches_state();
    }

    #[tokio::test]
    async fn should_reject_invalid_transfer_without_state_change() {
        init_and_setup(2);
        let events_before = count_events();

        assert_matches!(
            endorse_transfer(signer_a(), "0x1234").await,
            Err(CreateOrSignError::InvalidAddress { address, .. }) if address == "0x1234"
        );
        assert_matches!(
            create_or_sign_evm_message(
                1,
                1,
                TOKEN.to_string(),
                RECIPIENT.to_string(),
                "1.5".to_string(),
                &runtime_for(signer_a()),
            )
            .await,
            Err(CreateOrSignError::InvalidAmount { amount, .. }) if amount == "1.5"
        );

        assert_eq!(count_events(), events_before);
        assert_eq!(read_state(|s| s.next_id), 0);
    }

    #[tokio::test]
    async fn should_reject_outsider() {
        init_and_setup(2);

        assert_eq!(
            endorse_transfer(outsider(), RECIPIENT).await,
            Err(CreateOrSignError::NotAuthorized(outsider()))
        );
        assert_eq!(read_state(|s| s.next_id), 0);
    }

    #[test]
    fn should_hash_the_endpoint_arguments() {
        let transfer =
            EvmTransfer::new(7, 11_155_111, TOKEN, RECIPIENT, "1000000000000000000").unwrap();
        assert_eq!(transfer.message_data(), TRANSFER_HASH);
    }
}
