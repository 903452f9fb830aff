//! Latency benchmarks for the ingestor pipeline
//!
//! The live path runs inside the OS broadcast budget, so the synchronous
//! part (filter + parse) has to stay far below a millisecond per message.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

const PAYMENT_BODY: &str = "Payment of ZMW 50.00 Till Number 12345 John Banda. Airtel Money bal is ZMW 150.00. TID : ABC123.DEF.";

/// Benchmark body parsing against the built-in templates
fn bench_parse_message(c: &mut Criterion) {
    use smsledger_ingestor::decoder::TemplateRegistry;

    let registry = TemplateRegistry::builtin();

    c.bench_function("parse_payment_body", |b| {
        b.iter(|| black_box(registry.parse(black_box(PAYMENT_BODY))))
    });

    c.bench_function("parse_unrecognized_body", |b| {
        b.iter(|| black_box(registry.parse(black_box("You have received ZMW 20.00 from 0977000000."))))
    });
}

/// Benchmark the sender/keyword filter
fn bench_filter(c: &mut Criterion) {
    use smsledger_ingestor::filter::{is_eligible, FilterMode, TrustedSenderPolicy};

    let policy = TrustedSenderPolicy::default();

    c.bench_function("filter_trusted_sender", |b| {
        b.iter(|| {
            black_box(is_eligible(
                &policy,
                FilterMode::SenderAndKeywords,
                black_box("AirtelMoney"),
                black_box(PAYMENT_BODY),
            ))
        })
    });
}

/// Benchmark JSON encoding of a UI event
fn bench_format_event(c: &mut Criterion) {
    use smsledger_ingestor::decoder::parse_message;
    use smsledger_ingestor::publisher::UiEvent;

    let event = UiEvent::Transaction {
        record: parse_message(PAYMENT_BODY).unwrap(),
    };

    c.bench_function("format_ui_event_json", |b| {
        b.iter(|| black_box(event.to_json().unwrap()))
    });
}

criterion_group!(benches, bench_parse_message, bench_filter, bench_format_event);

criterion_main!(benches);
