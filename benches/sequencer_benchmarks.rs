use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use directive_sequencer::{
    BlockingPolicy, Directive, DirectiveCompletion, DirectiveHandler, HandlerBindingTable,
    HandlerConfiguration, HandlerFailure, NamespaceAndName,
};

struct NoopHandler;

#[async_trait]
impl DirectiveHandler for NoopHandler {
    async fn pre_handle(&self, _directive: &Directive) -> Result<(), HandlerFailure> {
        Ok(())
    }

    async fn handle(&self, _directive: &Directive, completion: DirectiveCompletion) {
        completion.completed();
    }

    async fn cancel(&self, _directive: &Directive) {}
}

fn benchmark_table_lookup(c: &mut Criterion) {
    let table = HandlerBindingTable::new();
    let mut configuration = HandlerConfiguration::new();
    for i in 0..64 {
        configuration.insert(
            NamespaceAndName::new("Namespace", format!("Name{i}")).unwrap(),
            Arc::new(NoopHandler),
            BlockingPolicy::NonBlocking,
        );
    }
    assert!(table.add(&configuration));

    let key = NamespaceAndName::new("Namespace", "Name32").unwrap();
    c.bench_function("table_lookup", |b| {
        b.iter(|| table.lookup(black_box(&key)))
    });
}

fn benchmark_table_batch_swap(c: &mut Criterion) {
    c.bench_function("table_batch_add_remove", |b| {
        let table = HandlerBindingTable::new();
        let configuration = HandlerConfiguration::new().with_binding(
            NamespaceAndName::new("Speaker", "Play").unwrap(),
            Arc::new(NoopHandler),
            BlockingPolicy::Blocking,
        );
        b.iter(|| {
            assert!(table.add(black_box(&configuration)));
            assert!(table.remove(black_box(&configuration)));
        })
    });
}

criterion_group!(benches, benchmark_table_lookup, benchmark_table_batch_swap);
criterion_main!(benches);
