// =============================================================================
// Engine Module
// =============================================================================
// Pool behaviour independent of the Solana account model. Every public
// entry point is a method on `MarginPool` taking an `OpContext`; instruction
// handlers build the context from accounts and settle the returned token
// movements.
// =============================================================================

pub mod emergency;
pub mod liquidation;
pub mod operations;
pub mod reinit;
pub mod venue;

#[cfg(test)]
pub mod testing;

pub use reinit::ReinitOutcome;
pub use venue::*;

#[cfg(test)]
mod tests {
    use super::testing::*;
    use proptest::prelude::*;

    #[derive(Clone, Debug)]
    enum Action {
        DepositBase(u8, u64, u64),
        DepositQuote(u8, u64, u64),
        WithdrawBase(u8, u64),
        WithdrawQuote(u8, u64),
        Short(u8, u64),
        Long(u8, u64),
        Close(u8),
        Advance(i64),
        Price(u128),
    }

    fn action_strategy() -> impl Strategy<Value = Action> {
        let user = 1u8..5;
        prop_oneof![
            (user.clone(), 1u64..5_000, 0u64..3).prop_map(|(u, a, l)| Action::DepositBase(u, a, l * 500)),
            (user.clone(), 1u64..5_000, 0u64..3).prop_map(|(u, a, s)| Action::DepositQuote(u, a, s * 500)),
            (user.clone(), 1u64..3_000).prop_map(|(u, a)| Action::WithdrawBase(u, a)),
            (user.clone(), 1u64..3_000).prop_map(|(u, a)| Action::WithdrawQuote(u, a)),
            (user.clone(), 1u64..4_000).prop_map(|(u, a)| Action::Short(u, a)),
            (user.clone(), 1u64..4_000).prop_map(|(u, a)| Action::Long(u, a)),
            user.prop_map(Action::Close),
            (60i64..5_000_000).prop_map(Action::Advance),
            (80u128..125).prop_map(Action::Price),
        ]
    }

    fn account(n: u8) -> anchor_lang::prelude::Pubkey {
        anchor_lang::prelude::Pubkey::new_from_array([n + 100; 32])
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_ledger_aggregates_heaps_and_vaults_agree(actions in proptest::collection::vec(action_strategy(), 1..60)) {
            let mut env = TestEnv::new();
            env.lend(LENDER, 50_000, 50_000);

            for action in actions {
                // failed calls are rolled back by the harness
                let _ = match action {
                    Action::DepositBase(u, a, l) => env.try_deposit_base(account(u), a, l).map(|_| ()),
                    Action::DepositQuote(u, a, s) => env.try_deposit_quote(account(u), a, s).map(|_| ()),
                    Action::WithdrawBase(u, a) => env.try_withdraw_base(account(u), a).map(|_| ()),
                    Action::WithdrawQuote(u, a) => env.try_withdraw_quote(account(u), a).map(|_| ()),
                    Action::Short(u, a) => env.try_short(account(u), a).map(|_| ()),
                    Action::Long(u, a) => env.try_long(account(u), a).map(|_| ()),
                    Action::Close(u) => env.try_close(account(u)).map(|_| ()),
                    Action::Advance(s) => {
                        env.advance(s);
                        env.try_reinit()
                    }
                    Action::Price(p) => {
                        env.set_price(p, 100);
                        env.try_reinit()
                    }
                };
                env.pool.check_aggregates().unwrap();
                env.pool.check_heaps().unwrap();
            }
            env.assert_consistent();
        }

        #[test]
        fn prop_reinit_twice_changes_nothing(elapsed in 1i64..10_000_000) {
            let mut env = TestEnv::new();
            env.lend(LENDER, 10_000, 10_000);
            env.deposit_quote(BORROWER, 500);
            env.short(BORROWER, 3_000);
            env.deposit_base(LONGER, 500);
            env.long(LONGER, 2_000);

            env.advance(elapsed);
            let _ = env.try_reinit();
            let coefficients = env.coefficients();
            let ledger = env.pool.ledger.clone();
            let _ = env.try_reinit();
            prop_assert_eq!(env.coefficients(), coefficients);
            prop_assert_eq!(&env.pool.ledger, &ledger);
        }
    }
}
