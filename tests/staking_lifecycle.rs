use bitcoin::Amount;
use mooring::{covenant, StakingCovenant, StakingError};
use rand::SeedableRng;
use rand_chacha::ChaChaRng;

mod util;

#[test]
fn stake_and_withdraw_full_lifecycle() {
    let mut rng = ChaChaRng::seed_from_u64(0);

    let (_shell_sk, shell_pk) = util::make_keypair(&mut rng);
    let (_target_sk, target_pk) = util::make_keypair(&mut rng);
    let (_user_sk, user_pk) = util::make_keypair(&mut rng);

    let covenant = StakingCovenant::new(shell_pk, target_pk, 1_000, util::dummy_template());

    // the staker's wallet derives the successor state, builds the
    // transaction outputs and proposes the spend
    let successor = covenant.with_deposit(user_pk, Amount::from_sat(500), 1_000);
    let change = util::change_to_fresh_key(&mut rng, Amount::from_sat(40_000));
    let outputs = vec![
        covenant::state_output(&successor.lock_script(), Amount::from_sat(500)),
        covenant::change_output(&change),
    ];
    let ctx = util::propose_spend(&outputs, vec![util::random_outpoint(&mut rng)], 0);

    let staked = covenant
        .deposit(user_pk, Amount::from_sat(500), 1_000, &change, &ctx)
        .unwrap();

    assert_eq!(staked, successor);
    assert_eq!(staked.staker().staked, Amount::from_sat(500));
    assert_eq!(staked.shell_token_reserve(), 500);

    // too early: the same withdrawal is rejected before outputs are even
    // considered
    let change = util::change_to_fresh_key(&mut rng, Amount::from_sat(30_000));
    let outputs = vec![
        covenant::address_output(&staked.staker().payout_script(), Amount::from_sat(500)),
        covenant::change_output(&change),
    ];
    let early = util::propose_spend(&outputs, vec![util::random_outpoint(&mut rng)], 999);

    let err = staked
        .withdraw(Amount::from_sat(500), &change, &early)
        .expect_err("could withdraw before unlock time");
    assert!(matches!(err, StakingError::TimeLockNotReached { .. }));

    // once the declared lock reaches the unlock time the spend verifies and
    // the slot closes
    let on_time = util::propose_spend(&outputs, vec![util::random_outpoint(&mut rng)], 1_000);
    let settled = staked
        .withdraw(Amount::from_sat(500), &change, &on_time)
        .unwrap();

    assert_eq!(settled.staker().staked, Amount::ZERO);
    assert_eq!(settled.shell_token_reserve(), 1_000);
}

#[test]
fn rebuilt_outputs_hash_to_the_committed_digest() {
    let mut rng = ChaChaRng::seed_from_u64(1);

    let (_shell_sk, shell_pk) = util::make_keypair(&mut rng);
    let (_target_sk, target_pk) = util::make_keypair(&mut rng);
    let (_user_sk, user_pk) = util::make_keypair(&mut rng);

    let covenant = StakingCovenant::new(shell_pk, target_pk, 1_000, util::dummy_template());
    let successor = covenant.with_deposit(user_pk, Amount::from_sat(123), 77);

    let change = util::change_to_fresh_key(&mut rng, Amount::from_sat(9_999));
    let outputs = vec![
        covenant::state_output(&successor.lock_script(), Amount::from_sat(123)),
        covenant::change_output(&change),
    ];

    // the covenant's digest agrees with an independently computed one
    assert_eq!(
        covenant::outputs_digest(&outputs),
        util::ledger_outputs_digest(&outputs)
    );
}
