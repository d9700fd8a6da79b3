//! Policy parsing and bulk body encoding throughput.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fleet_agent_core::network::encode_bulk_body;
use fleet_agent_core::policy::parse_policy_action;
use fleet_agent_core::storage::BufferedDocument;
use fleet_agent_core::testing::fixtures;
use fleet_agent_core::CollectorKind;
use serde_json::json;

fn bench_parse_policy(c: &mut Criterion) {
    let action = fixtures::policy_change_action("policy-bench", 42, "5m", "30s");
    let received_at = fixtures::received_at();

    c.bench_function("policy/parse_action", |b| {
        b.iter(|| parse_policy_action(black_box(&action), received_at, "default"))
    });
}

fn bench_encode_bulk(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk/encode");

    for count in [1usize, 50, 500] {
        let docs: Vec<BufferedDocument> = (0..count as u64)
            .map(|seq| BufferedDocument {
                seq,
                collector: CollectorKind::Location,
                appended_at: Utc::now(),
                body: json!({
                    "@timestamp": "2024-03-19T21:25:27.000Z",
                    "agent.id": fixtures::AGENT_ID,
                    "host.hostname": fixtures::HOSTNAME,
                    "data_stream.dataset": fixtures::DATASET,
                    "geo.location": format!("52.{},4.3", seq),
                }),
            })
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &docs, |b, docs| {
            b.iter(|| encode_bulk_body(black_box(docs)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_policy, bench_encode_bulk);
criterion_main!(benches);
