use cash_desk_engine::engine::calculator::ConversionCalculator;
use cash_desk_engine::engine::matching::ProfitMatchingEngine;
use cash_desk_engine::ledger::lots::FiatLotLedger;
use cash_desk_engine::prelude::*;
use cash_desk_engine::simulation::{generate_operation_stream, replay, Operation, StreamConfig};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn engine() -> CashDeskEngine {
    CashDeskEngine::new(EngineConfig::default()).unwrap()
}

fn desk() -> ScopeId {
    ScopeId::new("prop", "desk")
}

/// Assets a random operation may touch, including one the desk does not know.
fn arb_asset() -> impl Strategy<Value = AssetCode> {
    prop::sample::select(vec![
        AssetCode::new("USDT"),
        AssetCode::new("CZK"),
        AssetCode::new("EUR"),
        AssetCode::new("USD"),
        AssetCode::new("GBP"),
    ])
}

/// Operation kinds as they appear in files, legacy aliases and typos included.
fn arb_kind() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "fiat_to_settlement",
        "settlement_to_fiat",
        "fiat_to_fiat",
        "fiat_to_crypto",
        "crypto_to_fiat",
        "deposit",
        "swap",
    ])
    .prop_map(str::to_string)
}

/// Positive amount between 1 and 5000 with up to 2 decimals.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (100i64..500_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Rate between 0.01 and 30.00.
fn arb_rate() -> impl Strategy<Value = Decimal> {
    (1i64..3_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        6 => (arb_kind(), arb_asset(), arb_asset(), arb_amount(), arb_rate(), 0i64..40i64).prop_map(
            |(kind, from, to, amount, rate, fee_tenths)| Operation::Exchange {
                kind,
                from,
                to,
                amount,
                rate,
                fee_percent: Decimal::new(fee_tenths, 1),
                note: String::new(),
            }
        ),
        2 => (arb_asset(), arb_amount()).prop_map(|(asset, amount)| Operation::Deposit {
            asset,
            amount,
            note: String::new(),
        }),
        2 => (arb_asset(), arb_amount()).prop_map(|(asset, amount)| Operation::Withdrawal {
            asset,
            amount,
            note: String::new(),
        }),
    ]
}

/// Direct lots of a single currency: (amount, rate in hundredths).
fn arb_lots() -> impl Strategy<Value = Vec<(i64, i64)>> {
    prop::collection::vec((1i64..10_000i64, 1_500i64..2_500i64), 1..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // ===================================================================
    // INVARIANT 1: Balances never go negative, and a rejected operation
    // leaves the desk exactly as it was.
    // ===================================================================
    #[test]
    fn balances_stay_non_negative(ops in prop::collection::vec(arb_operation(), 1..60)) {
        let engine = engine();
        let scope = desk();

        for op in &ops {
            let before = engine.snapshot(&scope).unwrap();
            if op.apply(&engine, &scope).is_err() {
                prop_assert_eq!(engine.snapshot(&scope).unwrap(), before);
            }
        }

        for (asset, balance) in engine.balances(&scope).unwrap() {
            prop_assert!(balance >= Decimal::ZERO, "{} went negative: {}", asset, balance);
        }
        for lot in engine.lots(&scope, None).unwrap() {
            prop_assert!(lot.remaining >= Decimal::ZERO);
            prop_assert!(lot.remaining <= lot.original);
        }
    }

    // ===================================================================
    // INVARIANT 2: Replaying the same generated stream twice gives the
    // same books.
    // ===================================================================
    #[test]
    fn replay_is_deterministic(seed in any::<u64>()) {
        let config = StreamConfig { operation_count: 80, seed, ..Default::default() };
        let ops = generate_operation_stream(&EngineConfig::default(), &config).unwrap();
        prop_assert_eq!(&ops, &generate_operation_stream(&EngineConfig::default(), &config).unwrap());

        let (a, b) = (engine(), engine());
        let report_a = replay(&a, &desk(), &ops);
        let report_b = replay(&b, &desk(), &ops);
        prop_assert!(report_a.rejected.is_empty(), "{:?}", report_a.rejected);
        prop_assert_eq!(report_a.applied, report_b.applied);

        prop_assert_eq!(a.balances(&desk()).unwrap(), b.balances(&desk()).unwrap());
        let profit = |engine: &CashDeskEngine| -> Vec<(Decimal, Decimal)> {
            engine
                .transactions(&desk())
                .unwrap()
                .iter()
                .map(|tx| (tx.realized_profit, tx.realized_profit_settlement))
                .collect()
        };
        prop_assert_eq!(profit(&a), profit(&b));
    }

    // ===================================================================
    // INVARIANT 3: Settlement profit realized through hopped fiat equals
    // net settlement flow plus the cost still held in open lots.
    // ===================================================================
    #[test]
    fn cost_basis_is_conserved_through_hops(
        buys in prop::collection::vec((1_000i64..200_000i64, 2_000i64..2_400i64), 1..6),
        hop_rate in 2_400i64..2_550i64,
        sells in prop::collection::vec((10i64..5_000i64, 110i64..120i64), 1..10),
    ) {
        let engine = engine();
        let scope = desk();
        let (usdt, czk, eur) = (AssetCode::new("USDT"), AssetCode::new("CZK"), AssetCode::new("EUR"));
        engine.deposit(&scope, &usdt, dec!(10000000), "").unwrap();

        let mut outflow = Decimal::ZERO;
        for (amount, rate) in &buys {
            let result = engine
                .process_transaction(
                    &scope,
                    &TransactionRequest::new(
                        TransactionKind::FiatToSettlement,
                        czk.clone(),
                        usdt.clone(),
                        Decimal::from(*amount),
                        Decimal::new(*rate, 2),
                    ),
                )
                .unwrap();
            outflow += result.transaction.final_amount;
        }

        let czk_held = engine.balances(&scope).unwrap()[&czk];
        engine
            .process_transaction(
                &scope,
                &TransactionRequest::new(
                    TransactionKind::FiatToFiat,
                    czk.clone(),
                    eur.clone(),
                    czk_held,
                    Decimal::new(hop_rate, 2),
                ),
            )
            .unwrap();
        prop_assert!(engine.lots(&scope, Some(&czk)).unwrap().iter().all(|lot| !lot.is_open()));

        let mut inflow = Decimal::ZERO;
        let mut realized = Decimal::ZERO;
        let mut sales = 0;
        for (amount, rate) in &sells {
            let request = TransactionRequest::new(
                TransactionKind::SettlementToFiat,
                usdt.clone(),
                eur.clone(),
                Decimal::from(*amount),
                Decimal::new(*rate, 2),
            );
            if let Ok(result) = engine.process_transaction(&scope, &request) {
                prop_assert!(result.matches.iter().all(|m| m.stage == MatchStage::ChainedExchange));
                inflow += request.amount_from;
                realized += result.transaction.realized_profit_settlement;
                sales += 1;
            }
        }

        let open_cost: Decimal = engine
            .lots(&scope, Some(&eur))
            .unwrap()
            .iter()
            .map(|lot| lot.open_cost_basis().unwrap())
            .sum();
        let expected = inflow - outflow + open_cost;
        let tolerance = Decimal::new(1, 4) * Decimal::from(sales + 1);
        prop_assert!(
            (realized - expected).abs() <= tolerance,
            "realized {} vs expected {}",
            realized,
            expected
        );
    }
}

proptest! {
    // ===================================================================
    // INVARIANT 4: Lots are consumed oldest first and the matched pieces
    // add up to the whole sale, with stage 3 absorbing any shortfall.
    // ===================================================================
    #[test]
    fn sale_drains_lots_in_creation_order(
        lots in arb_lots(),
        share in 1i64..150i64,
        sale_rate in 1_500i64..2_500i64,
    ) {
        let czk = AssetCode::new("CZK");
        let mut ledger = FiatLotLedger::new();
        let mut ids = Vec::new();
        let mut total = Decimal::ZERO;
        for (amount, rate) in &lots {
            let amount = Decimal::from(*amount);
            total += amount;
            ids.push(
                ledger
                    .create_lot(czk.clone(), amount, Decimal::new(*rate, 2), LotSource::DirectPurchase, None, Uuid::new_v4())
                    .unwrap()
                    .id,
            );
        }

        let fiat_needed = (total * Decimal::new(share, 2)).round().max(Decimal::ONE);
        let eff = Decimal::new(sale_rate, 2);
        let settlement = fiat_needed / eff;

        let sale = ProfitMatchingEngine::new(dec!(0.0000001))
            .match_sale(&mut ledger, &czk, RateConvention::Divide, fiat_needed, settlement, Uuid::new_v4())
            .unwrap();

        // Matched lots are a prefix of the creation order.
        let matched: Vec<Uuid> = sale.records.iter().filter_map(|r| r.lot_id).collect();
        prop_assert_eq!(&matched[..], &ids[..matched.len()]);

        // Every matched lot but the last is empty, every later lot untouched.
        for (i, id) in ids.iter().enumerate() {
            let lot = ledger.get(*id).unwrap();
            if i + 1 < matched.len() {
                prop_assert!(!lot.is_open());
            } else if i >= matched.len() {
                prop_assert_eq!(lot.remaining, lot.original);
            }
        }

        let fiat_used: Decimal = sale.records.iter().map(|r| r.fiat_used).sum();
        prop_assert_eq!(fiat_used, fiat_needed);
        let matched_settlement: Decimal = sale.records.iter().map(|r| r.matched_settlement).sum();
        prop_assert!((matched_settlement - settlement).abs() < dec!(0.000001));

        let untracked = sale.records.iter().filter(|r| r.stage == MatchStage::Untracked).count();
        prop_assert_eq!(untracked == 1, fiat_needed > total);
        prop_assert!(untracked <= 1);
    }

    // ===================================================================
    // INVARIANT 5: A zero-fee fiat hop and its reciprocal return the
    // original amount within rounding of the two legs.
    // ===================================================================
    #[test]
    fn fiat_round_trip_is_near_identity(
        amount in 1_000i64..10_000_000i64,
        rate_units in 200_000i64..5_000_000i64,
    ) {
        let calculator = ConversionCalculator::new(EngineConfig::default().registry());
        let x = Decimal::from(amount);
        let r = Decimal::new(rate_units, 5);

        let out = calculator
            .compute(&TransactionRequest::new(TransactionKind::FiatToFiat, "CZK", "EUR", x, r))
            .unwrap();
        let back = calculator
            .compute(&TransactionRequest::new(
                TransactionKind::FiatToFiat,
                "EUR",
                "CZK",
                out.final_amount,
                Decimal::ONE / r,
            ))
            .unwrap();

        prop_assert_eq!(out.fee_amount, Decimal::ZERO);
        let bound = r / Decimal::TWO + Decimal::ONE;
        prop_assert!(
            (back.final_amount - x).abs() <= bound,
            "{} -> {} -> {} at rate {}",
            x,
            out.final_amount,
            back.final_amount,
            r
        );
    }
}
