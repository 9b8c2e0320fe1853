use cash_desk_engine::config::EngineConfig;
use cash_desk_engine::core::asset::{AssetCode, RateConvention};
use cash_desk_engine::core::scope::ScopeId;
use cash_desk_engine::engine::matching::ProfitMatchingEngine;
use cash_desk_engine::engine::service::CashDeskEngine;
use cash_desk_engine::ledger::lots::{FiatLotLedger, LotSource};
use cash_desk_engine::simulation::{generate_operation_stream, replay, StreamConfig};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rust_decimal::Decimal;
use uuid::Uuid;

fn lot_ledger(lots: usize) -> FiatLotLedger {
    let mut ledger = FiatLotLedger::new();
    for i in 0..lots {
        ledger
            .create_lot(
                AssetCode::new("CZK"),
                Decimal::from(1_000),
                Decimal::new(2100 + (i % 50) as i64, 2),
                LotSource::DirectPurchase,
                None,
                Uuid::new_v4(),
            )
            .expect("valid lot");
    }
    ledger
}

fn bench_match_sale(c: &mut Criterion, lots: usize) {
    let engine = ProfitMatchingEngine::new(Decimal::new(1, 7));
    let template = lot_ledger(lots);
    let czk = AssetCode::new("CZK");
    // drains every lot
    let fiat_needed = Decimal::from(lots as u64 * 1_000);
    let settlement = fiat_needed / Decimal::from(20);

    c.bench_function(&format!("match_sale_{lots}_lots"), |b| {
        b.iter_batched(
            || template.clone(),
            |mut ledger| {
                engine
                    .match_sale(
                        &mut ledger,
                        &czk,
                        RateConvention::Divide,
                        black_box(fiat_needed),
                        black_box(settlement),
                        Uuid::nil(),
                    )
                    .expect("match")
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_match_sale_100_lots(c: &mut Criterion) {
    bench_match_sale(c, 100);
}

fn bench_match_sale_1000_lots(c: &mut Criterion) {
    bench_match_sale(c, 1_000);
}

fn bench_replay_stream(c: &mut Criterion) {
    let config = StreamConfig {
        operation_count: 500,
        ..Default::default()
    };
    let ops = generate_operation_stream(&EngineConfig::default(), &config).expect("stream");
    let scope = ScopeId::new("bench", "desk");

    c.bench_function("replay_500_operations", |b| {
        b.iter(|| {
            let engine = CashDeskEngine::new(EngineConfig::default()).expect("config");
            replay(&engine, &scope, black_box(&ops))
        })
    });
}

criterion_group!(
    benches,
    bench_match_sale_100_lots,
    bench_match_sale_1000_lots,
    bench_replay_stream
);
criterion_main!(benches);
