//! Property-based tests for ledger and rebalancer invariants.
//!
//! These tests use proptest to verify that key invariants hold
//! across randomly generated sequences of operations.

use bondbook::market::MockMarket;
use bondbook::{
    BondMarket, Portfolio, PortfolioError, Position, RebalanceConfig, RebalanceOptions,
    Rebalancer, decode, encode,
};
use proptest::prelude::*;

const DAY: u128 = 86_400;

#[derive(Clone, Debug)]
enum LedgerOp {
    /// Open `amount` bonds `step` units after the current back maturity
    Open { step: u128, amount: u128 },
    /// Close `amount` bonds from the front
    Close { amount: u128 },
}

fn ledger_op() -> impl Strategy<Value = LedgerOp> {
    prop_oneof![
        3 => ((0u128..=2), (1u128..=1_000)).prop_map(|(step, amount)| LedgerOp::Open { step, amount }),
        2 => (1u128..=1_500).prop_map(|amount| LedgerOp::Close { amount }),
    ]
}

#[derive(Clone, Debug)]
enum VaultOp {
    Deposit(u128),
    Withdraw(u128),
    Advance(u128),
    Rebalance { withdrawal: u128 },
}

fn vault_op() -> impl Strategy<Value = VaultOp> {
    const UNIT: u128 = 1_000_000;
    prop_oneof![
        3 => (1u128..=5_000).prop_map(|a| VaultOp::Deposit(a * UNIT)),
        1 => (1u128..=3_000).prop_map(|a| VaultOp::Withdraw(a * UNIT)),
        2 => (1u128..=10).prop_map(|d| VaultOp::Advance(d * DAY)),
        3 => (0u128..=2_000).prop_map(|w| VaultOp::Rebalance { withdrawal: w * UNIT }),
    ]
}

fn market() -> MockMarket {
    MockMarket::builder()
        .start_time(0)
        .position_duration(30 * DAY)
        .checkpoint_duration(DAY)
        .discount_bps(400)
        .min_transaction_amount(20_000_000)
        .build()
}

fn snapshot(s: &Rebalancer) -> (Vec<Position>, u128, u128) {
    (
        s.portfolio().positions().collect(),
        s.portfolio().total_bonds(),
        s.idle(),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // ========================================================================
    // PACKING
    // ========================================================================

    /// decode(encode(m, b)) == (m, b) for every pair of u128 values
    #[test]
    fn pack_round_trip(m in any::<u128>(), b in any::<u128>()) {
        prop_assert_eq!(decode(encode(m, b)), Position::new(m, b));
    }

    /// Packed words order by maturity first, then by amount
    #[test]
    fn packed_order_follows_maturity(
        m1 in any::<u128>(), b1 in any::<u128>(),
        m2 in any::<u128>(), b2 in any::<u128>(),
    ) {
        let ordered = encode(m1, b1) < encode(m2, b2);
        prop_assert_eq!(ordered, (m1, b1) < (m2, b2));
    }

    // ========================================================================
    // LEDGER INVARIANTS
    // ========================================================================

    /// Maturities strictly increase and total_bonds matches the sum of
    /// positions, after any sequence of opens and closes. Rejected
    /// operations change nothing.
    #[test]
    fn ledger_matches_model(ops in prop::collection::vec(ledger_op(), 1..80)) {
        let mut p = Portfolio::new();
        let mut model: Vec<(u128, u128)> = Vec::new();
        let mut opened = 0u128;
        let mut closed = 0u128;

        for op in ops {
            match op {
                LedgerOp::Open { step, amount } => {
                    let maturity = model.last().map_or(100, |&(m, _)| m + step);
                    p.handle_open_position(maturity, amount).unwrap();
                    match model.last_mut() {
                        Some(back) if back.0 == maturity => back.1 += amount,
                        _ => model.push((maturity, amount)),
                    }
                    opened += amount;
                }
                LedgerOp::Close { amount } => {
                    let before: Vec<_> = p.positions().collect();
                    match model.first().copied() {
                        None => {
                            prop_assert_eq!(p.close_partial(amount), Err(PortfolioError::NoPositionsToClose));
                        }
                        Some((_, front)) if amount > front => {
                            let is_insufficient = matches!(p.close_partial(amount), Err(PortfolioError::InsufficientBonds { .. }));
                            prop_assert!(is_insufficient);
                            prop_assert_eq!(p.positions().collect::<Vec<_>>(), before);
                        }
                        Some((_, front)) => {
                            p.close_partial(amount).unwrap();
                            if amount == front {
                                model.remove(0);
                            } else {
                                model[0].1 -= amount;
                            }
                            closed += amount;
                        }
                    }
                }
            }

            let actual: Vec<_> = p.positions().map(|pos| (pos.maturity_time, pos.bond_amount)).collect();
            prop_assert_eq!(&actual, &model);
            prop_assert!(actual.windows(2).all(|w| w[0].0 < w[1].0));
            prop_assert!(actual.iter().all(|&(_, b)| b > 0));
        }

        prop_assert_eq!(p.total_bonds(), opened - closed);
        prop_assert!(p.invariants_hold());
    }

    /// open(m, b1); open(m, b2) leaves the same ledger as open(m, b1 + b2)
    #[test]
    fn merge_equivalence(
        prefix in prop::collection::vec(1u128..=1_000, 0..5),
        b1 in 1u128..=1_000_000,
        b2 in 1u128..=1_000_000,
    ) {
        let mut split = Portfolio::new();
        let mut joined = Portfolio::new();
        for (i, b) in prefix.iter().enumerate() {
            split.handle_open_position(i as u128 * 10, *b).unwrap();
            joined.handle_open_position(i as u128 * 10, *b).unwrap();
        }
        let m = prefix.len() as u128 * 10;

        split.handle_open_position(m, b1).unwrap();
        split.handle_open_position(m, b2).unwrap();
        joined.handle_open_position(m, b1 + b2).unwrap();

        prop_assert_eq!(split.positions().collect::<Vec<_>>(), joined.positions().collect::<Vec<_>>());
        prop_assert_eq!(split.total_bonds(), joined.total_bonds());
    }

    /// Out-of-order opens are always rejected without mutation
    #[test]
    fn earlier_maturity_rejected(back in 1u128..=u128::MAX, earlier_by in 1u128..=1_000, amount in 1u128..=1_000) {
        let mut p = Portfolio::new();
        p.handle_open_position(back, 5).unwrap();
        let earlier = back.saturating_sub(earlier_by);
        prop_assume!(earlier < back);

        let is_out_of_order = matches!(p.handle_open_position(earlier, amount), Err(PortfolioError::OutOfOrderMaturity { .. }));
        prop_assert!(is_out_of_order);
        prop_assert_eq!(p.total_bonds(), 5);
        prop_assert_eq!(p.position_count(), 1);
    }

    // ========================================================================
    // REBALANCER INVARIANTS
    // ========================================================================

    /// Across random vault activity: ledger invariants hold, the market
    /// agrees with the ledger, failed calls change nothing, and no position
    /// left after a completed call is worth less than the minimum transaction.
    #[test]
    fn rebalancer_atomic_and_dust_free(ops in prop::collection::vec(vault_op(), 1..40)) {
        let mut m = market();
        let mut s = Rebalancer::new(RebalanceConfig {
            target_idle_liquidity: 500_000_000,
            partial_closure_buffer_bps: 10,
            max_positions_closed_per_call: 4,
        });

        for op in ops {
            let before = snapshot(&s);
            let calls = m.calls().len();

            let result = match op {
                VaultOp::Deposit(amount) => s.deposit(amount).map(|_| ()),
                VaultOp::Withdraw(amount) => s
                    .free_funds(&mut m, amount, &RebalanceOptions::default())
                    .map(|_| ()),
                VaultOp::Advance(secs) => {
                    m.advance(secs);
                    Ok(())
                }
                VaultOp::Rebalance { withdrawal } => {
                    let options = RebalanceOptions { withdrawal, ..RebalanceOptions::default() };
                    s.rebalance(&mut m, &options).map(|_| ())
                }
            };

            match result {
                Ok(()) => {
                    for pos in s.portfolio().positions() {
                        let value = m.preview_close_position(pos.maturity_time, pos.bond_amount).unwrap_or(0);
                        prop_assert!(value >= m.min_transaction_amount(), "dust position {} worth {}", pos, value);
                    }
                }
                Err(PortfolioError::InsufficientLiquidity { .. }) => {
                    prop_assert_eq!(snapshot(&s), before);
                    prop_assert_eq!(m.calls().len(), calls);
                }
                Err(e) => prop_assert!(false, "unexpected error: {}", e),
            }

            prop_assert!(s.portfolio().invariants_hold());
            for pos in s.portfolio().positions() {
                prop_assert_eq!(m.outstanding(pos.maturity_time), pos.bond_amount);
            }
        }
    }

    /// Valuing the portfolio never moves funds
    #[test]
    fn total_assets_is_a_pure_read(deposits in prop::collection::vec(100_000_000u128..=900_000_000, 1..10)) {
        let mut m = market();
        let mut s = Rebalancer::new(RebalanceConfig {
            target_idle_liquidity: 0,
            partial_closure_buffer_bps: 10,
            max_positions_closed_per_call: 16,
        });
        for amount in deposits {
            s.deposit(amount).unwrap();
            s.rebalance(&mut m, &RebalanceOptions::default()).unwrap();
            m.advance(DAY);
        }

        let before = snapshot(&s);
        let first = s.estimate_total_assets(&m).unwrap();
        let second = s.estimate_total_assets(&m).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(snapshot(&s), before);
        prop_assert!(first >= s.idle());
    }
}
