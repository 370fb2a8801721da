use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use rust_decimal::Decimal;
use stockledger_core::{LedgerEntryId, PositionId, StockId};
use stockledger_inventory::{LedgerEntry, plan_issue, plan_receipt};

/// `layers` distinct-cost layers of 100 units each, every other one half drawn.
fn ledger(stock: &StockId, layers: i64) -> Vec<LedgerEntry> {
    let mut entries = Vec::new();
    let mut next_id = 0;
    for n in 0..layers {
        next_id += 1;
        let drawn = if n % 2 == 0 { 50 } else { 0 };
        entries.push(LedgerEntry {
            id: LedgerEntryId::new(next_id),
            position_id: PositionId::new(1),
            stock_id: stock.clone(),
            quantity_change: 100,
            unit_cost: Decimal::new(100 + n, 2),
            notes: String::new(),
            job_ticket: None,
            updated_at: Utc::now(),
            remaining_quantity: 100 - drawn,
        });
        if drawn > 0 {
            next_id += 1;
            entries.push(LedgerEntry {
                id: LedgerEntryId::new(next_id),
                position_id: PositionId::new(1),
                stock_id: stock.clone(),
                quantity_change: -drawn,
                unit_cost: Decimal::new(100 + n, 2),
                notes: String::new(),
                job_ticket: Some("JOB".into()),
                updated_at: Utc::now(),
                remaining_quantity: 100 - drawn,
            });
        }
    }
    entries
}

fn bench_plan_issue(c: &mut Criterion) {
    let stock = StockId::new("CARD-100").expect("valid stock id");
    let mut group = c.benchmark_group("plan_issue");

    for layers in [10i64, 100, 1_000] {
        let entries = ledger(&stock, layers);
        let issue = layers * 25;
        group.throughput(Throughput::Elements(layers as u64));
        group.bench_with_input(BenchmarkId::new("layers", layers), &entries, |b, entries| {
            b.iter(|| plan_issue(black_box(entries), &stock, black_box(issue)))
        });
    }

    group.finish();
}

fn bench_plan_receipt(c: &mut Criterion) {
    let stock = StockId::new("CARD-100").expect("valid stock id");
    let entries = ledger(&stock, 1_000);
    let mut group = c.benchmark_group("plan_receipt");

    group.bench_function("merge_hit", |b| {
        b.iter(|| plan_receipt(black_box(&entries), &stock, Decimal::new(600, 2)))
    });
    group.bench_function("append_miss", |b| {
        b.iter(|| plan_receipt(black_box(&entries), &stock, Decimal::new(99_999, 2)))
    });

    group.finish();
}

criterion_group!(benches, bench_plan_issue, bench_plan_receipt);
criterion_main!(benches);
