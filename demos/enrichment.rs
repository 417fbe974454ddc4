//! Walks the pipeline through its failure modes: normal enrichment,
//! injected connection failures tripping the breaker, fail-fast
//! rejections, and recovery through a half-open probe.

use orderguard::{
    Address, AddressClient, CallError, ChaosDirective, FaultInjector, InMemoryOrderStore, Order,
    Outcome, Pipeline,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct StaticAddresses;

impl AddressClient for StaticAddresses {
    fn fetch(&self, postal_code: &str) -> Result<Option<Address>, CallError> {
        Ok(Some(Address {
            id: 1,
            postal_code: postal_code.to_string(),
            state: "TX".to_string(),
            city: "Austin".to_string(),
        }))
    }
}

fn report(label: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Success(order) => println!(
            "{label}: success, shipping to {} / {}",
            order.shipping_city.as_deref().unwrap_or("-"),
            order.shipping_state.as_deref().unwrap_or("-"),
        ),
        Outcome::Failure(failure) => println!(
            "{label}: {} (HTTP {}, retryable: {}) - {}",
            failure.reason,
            failure.reason.http_status(),
            failure.retryable,
            failure.message,
        ),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let store = Arc::new(InMemoryOrderStore::new());
    store.insert(Order::new(1, "ORDER-1", "12345"));

    let injector = FaultInjector::new();
    let pipeline = Pipeline::builder()
        .order_store(store)
        .address_client(Arc::new(StaticAddresses))
        .fault_injector(injector.clone())
        .max_attempts(2)
        .backoff(vec![Duration::from_millis(200)])
        .failure_rate_threshold(0.5)
        .min_samples(4)
        .open_duration(Duration::from_secs(2))
        .build();

    report("healthy call", &pipeline.handle("ORDER-1"));
    report("unknown order", &pipeline.handle("ORDER-999"));

    println!("\nenabling injected connection failures...");
    injector.configure(ChaosDirective {
        enabled: true,
        connection_error: true,
        ..ChaosDirective::default()
    });

    for i in 1..=3 {
        report(&format!("chaos call {i}"), &pipeline.handle("ORDER-1"));
        println!("  breaker state: {:?}", pipeline.breaker().current_state());
    }

    println!("\ndisabling chaos and waiting out the cool-down...");
    injector.set_enabled(false);
    thread::sleep(Duration::from_millis(2200));

    report("probe call", &pipeline.handle("ORDER-1"));
    println!("  breaker state: {:?}", pipeline.breaker().current_state());
}
