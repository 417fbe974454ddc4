use orderguard::{
    Address, AddressClient, CallError, ChaosDirective, CircuitState, FaultInjector,
    InMemoryMetrics, InMemoryOrderStore, Order, Outcome, Pipeline, ReasonCode,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn austin(postal_code: &str) -> Address {
    Address {
        id: 1,
        postal_code: postal_code.to_string(),
        state: "TX".to_string(),
        city: "Austin".to_string(),
    }
}

fn seeded_store() -> Arc<InMemoryOrderStore> {
    let store = Arc::new(InMemoryOrderStore::new());
    store.insert(Order::new(1, "ORDER-1", "12345"));
    store
}

/// Plays back a scripted sequence of responses, then keeps answering
/// with a fixed success. Counts invocations.
struct ScriptedAddresses {
    script: Mutex<VecDeque<Result<Option<Address>, CallError>>>,
    calls: AtomicU32,
}

impl ScriptedAddresses {
    fn new(script: Vec<Result<Option<Address>, CallError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AddressClient for ScriptedAddresses {
    fn fetch(&self, postal_code: &str) -> Result<Option<Address>, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Some(austin(postal_code))))
    }
}

/// Blocks every fetch on a shared mutex the test holds, keeping calls
/// in flight for as long as the test wants.
struct BlockingAddresses {
    gate: Arc<Mutex<()>>,
}

impl AddressClient for BlockingAddresses {
    fn fetch(&self, postal_code: &str) -> Result<Option<Address>, CallError> {
        let _held = self.gate.lock();
        Ok(Some(austin(postal_code)))
    }
}

#[test]
fn order_is_enriched_with_shipping_address() {
    let addresses = Arc::new(ScriptedAddresses::new(vec![]));
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::clone(&addresses) as Arc<dyn AddressClient>)
        .build();

    let outcome = pipeline.handle("ORDER-1");

    let Outcome::Success(order) = outcome else {
        panic!("expected success, got {:?}", outcome);
    };
    assert_eq!(order.order_number, "ORDER-1");
    assert_eq!(order.postal_code, "12345");
    assert_eq!(order.shipping_state.as_deref(), Some("TX"));
    assert_eq!(order.shipping_city.as_deref(), Some("Austin"));
    assert_eq!(addresses.call_count(), 1);
}

#[test]
fn empty_address_body_is_degraded_success() {
    let addresses = Arc::new(ScriptedAddresses::new(vec![Ok(None)]));
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(addresses)
        .build();

    let Outcome::Success(order) = pipeline.handle("ORDER-1") else {
        panic!("empty body should not be a failure");
    };
    assert_eq!(order.shipping_state, None);
    assert_eq!(order.shipping_city, None);
}

#[test]
fn missing_order_resolves_to_order_not_found() {
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::new(ScriptedAddresses::new(vec![])))
        .build();

    let Outcome::Failure(failure) = pipeline.handle("ORDER-404") else {
        panic!("expected a failure");
    };
    assert_eq!(failure.reason, ReasonCode::OrderNotFound);
    assert!(!failure.retryable);
    assert_eq!(failure.reason.http_status(), 404);
}

#[test]
fn domain_errors_do_not_feed_the_breaker_window() {
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::new(ScriptedAddresses::new(vec![])))
        .min_samples(2)
        .build();

    for _ in 0..10 {
        let outcome = pipeline.handle("ORDER-404");
        assert!(!outcome.is_success());
    }

    assert_eq!(pipeline.breaker().current_state(), CircuitState::Closed);
    assert_eq!(pipeline.breaker().failure_rate(), 0.0);
}

#[test]
fn failing_dependency_exhausts_retries_with_backoff() {
    let addresses = Arc::new(ScriptedAddresses::new(vec![
        Err(CallError::Connection),
        Err(CallError::Connection),
        Err(CallError::Connection),
    ]));
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::clone(&addresses) as Arc<dyn AddressClient>)
        .max_attempts(3)
        .backoff(vec![Duration::from_millis(50), Duration::from_millis(100)])
        .min_samples(10)
        .build();

    let started = Instant::now();
    let Outcome::Failure(failure) = pipeline.handle("ORDER-1") else {
        panic!("expected retry exhaustion");
    };

    assert_eq!(failure.reason, ReasonCode::RetryExhausted);
    assert!(!failure.retryable);
    assert_eq!(failure.reason.http_status(), 502);
    assert_eq!(addresses.call_count(), 3);
    assert!(started.elapsed() >= Duration::from_millis(150));
}

#[test]
fn transient_failure_recovers_on_second_attempt() {
    let addresses = Arc::new(ScriptedAddresses::new(vec![Err(CallError::Timeout)]));
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::clone(&addresses) as Arc<dyn AddressClient>)
        .max_attempts(2)
        .backoff(vec![Duration::from_millis(1)])
        .min_samples(10)
        .build();

    let Outcome::Success(order) = pipeline.handle("ORDER-1") else {
        panic!("second attempt should have succeeded");
    };
    assert_eq!(order.shipping_city.as_deref(), Some("Austin"));
    assert_eq!(addresses.call_count(), 2);
}

#[test]
fn breaker_opens_and_rejects_without_invoking_the_client() {
    let injector = FaultInjector::new();
    let addresses = Arc::new(ScriptedAddresses::new(vec![]));
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::clone(&addresses) as Arc<dyn AddressClient>)
        .fault_injector(injector.clone())
        .max_attempts(2)
        .backoff(vec![Duration::from_millis(1)])
        .failure_rate_threshold(0.5)
        .min_samples(4)
        .open_duration(Duration::from_secs(60))
        .build();

    injector.configure(ChaosDirective {
        enabled: true,
        connection_error: true,
        ..ChaosDirective::default()
    });

    // Two traversals of two attempts each: four recorded failures.
    for _ in 0..2 {
        let Outcome::Failure(failure) = pipeline.handle("ORDER-1") else {
            panic!("injected faults should fail the call");
        };
        assert_eq!(failure.reason, ReasonCode::RetryExhausted);
    }
    assert_eq!(pipeline.breaker().current_state(), CircuitState::Open);

    // The injector never reaches the address client, so the count stays
    // at zero; the open breaker must keep it there.
    let before = addresses.call_count();
    let Outcome::Failure(failure) = pipeline.handle("ORDER-1") else {
        panic!("open breaker should reject");
    };
    assert_eq!(failure.reason, ReasonCode::CircuitOpen);
    assert!(failure.retryable);
    assert_eq!(failure.reason.http_status(), 503);
    assert_eq!(addresses.call_count(), before);
}

#[test]
fn successful_probe_closes_the_breaker_and_clears_the_window() {
    let injector = FaultInjector::new();
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::new(ScriptedAddresses::new(vec![])))
        .fault_injector(injector.clone())
        .max_attempts(2)
        .backoff(vec![Duration::from_millis(1)])
        .failure_rate_threshold(0.5)
        .min_samples(4)
        .open_duration(Duration::from_millis(100))
        .build();

    injector.configure(ChaosDirective {
        enabled: true,
        connection_error: true,
        ..ChaosDirective::default()
    });
    pipeline.handle("ORDER-1");
    pipeline.handle("ORDER-1");
    assert_eq!(pipeline.breaker().current_state(), CircuitState::Open);

    injector.set_enabled(false);
    thread::sleep(Duration::from_millis(150));

    let Outcome::Success(_) = pipeline.handle("ORDER-1") else {
        panic!("probe should have been admitted and succeeded");
    };
    assert_eq!(pipeline.breaker().current_state(), CircuitState::Closed);
    assert_eq!(pipeline.breaker().failure_rate(), 0.0);
}

#[test]
fn failed_probe_reopens_the_breaker() {
    let injector = FaultInjector::new();
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::new(ScriptedAddresses::new(vec![])))
        .fault_injector(injector.clone())
        .max_attempts(2)
        .backoff(vec![Duration::from_millis(1)])
        .failure_rate_threshold(0.5)
        .min_samples(4)
        .open_duration(Duration::from_millis(100))
        .build();

    injector.configure(ChaosDirective {
        enabled: true,
        connection_error: true,
        ..ChaosDirective::default()
    });
    pipeline.handle("ORDER-1");
    pipeline.handle("ORDER-1");
    assert_eq!(pipeline.breaker().current_state(), CircuitState::Open);

    thread::sleep(Duration::from_millis(150));

    // Still injecting: the probe fails and the cool-down restarts.
    let Outcome::Failure(failure) = pipeline.handle("ORDER-1") else {
        panic!("probe should have failed");
    };
    assert_eq!(failure.reason, ReasonCode::CircuitOpen);
    assert_eq!(pipeline.breaker().current_state(), CircuitState::Open);
}

/// Blocks every fetch on a shared mutex, counts entries, and fails with
/// a connection error while `failing` is set.
struct GatedAddresses {
    gate: Arc<Mutex<()>>,
    entered: AtomicU32,
    failing: AtomicBool,
}

impl AddressClient for GatedAddresses {
    fn fetch(&self, postal_code: &str) -> Result<Option<Address>, CallError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let _held = self.gate.lock();
        if self.failing.load(Ordering::SeqCst) {
            Err(CallError::Connection)
        } else {
            Ok(Some(austin(postal_code)))
        }
    }
}

#[test]
fn probe_spent_on_domain_error_is_handed_back() {
    let injector = FaultInjector::new();
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::new(ScriptedAddresses::new(vec![])))
        .fault_injector(injector.clone())
        .max_attempts(2)
        .backoff(vec![Duration::from_millis(1)])
        .failure_rate_threshold(0.5)
        .min_samples(4)
        .open_duration(Duration::from_millis(100))
        .half_open_probe_count(1)
        .build();

    injector.configure(ChaosDirective {
        enabled: true,
        connection_error: true,
        ..ChaosDirective::default()
    });
    pipeline.handle("ORDER-1");
    pipeline.handle("ORDER-1");
    assert_eq!(pipeline.breaker().current_state(), CircuitState::Open);

    injector.set_enabled(false);
    thread::sleep(Duration::from_millis(150));

    // Burn the sole probe on orders that do not exist, repeatedly.
    // Domain errors are caller error, so the probe must be returned
    // each time rather than draining the budget.
    for _ in 0..3 {
        let Outcome::Failure(failure) = pipeline.handle("ORDER-404") else {
            panic!("unknown order should fail");
        };
        assert_eq!(failure.reason, ReasonCode::OrderNotFound);
    }
    assert_eq!(pipeline.breaker().current_state(), CircuitState::HalfOpen);

    // A healthy call is still admitted as a probe and recovers the
    // breaker.
    let Outcome::Success(_) = pipeline.handle("ORDER-1") else {
        panic!("probe against a healthy dependency should succeed");
    };
    assert_eq!(pipeline.breaker().current_state(), CircuitState::Closed);
}

#[test]
fn half_open_rejects_calls_beyond_the_probe_budget() {
    let gate = Arc::new(Mutex::new(()));
    let addresses = Arc::new(GatedAddresses {
        gate: Arc::clone(&gate),
        entered: AtomicU32::new(0),
        failing: AtomicBool::new(true),
    });
    let pipeline = Arc::new(
        Pipeline::builder()
            .order_store(seeded_store())
            .address_client(Arc::clone(&addresses) as Arc<dyn AddressClient>)
            .max_attempts(2)
            .backoff(vec![Duration::from_millis(1)])
            .failure_rate_threshold(0.5)
            .min_samples(4)
            .open_duration(Duration::from_millis(100))
            .half_open_probe_count(1)
            .build(),
    );

    pipeline.handle("ORDER-1");
    pipeline.handle("ORDER-1");
    assert_eq!(pipeline.breaker().current_state(), CircuitState::Open);

    addresses.failing.store(false, Ordering::SeqCst);
    thread::sleep(Duration::from_millis(150));

    // Hold the gate so the single admitted probe stays outstanding.
    let held = gate.lock();
    let baseline = addresses.entered.load(Ordering::SeqCst);
    let worker = {
        let pipeline = Arc::clone(&pipeline);
        thread::spawn(move || pipeline.handle("ORDER-1"))
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while addresses.entered.load(Ordering::SeqCst) == baseline {
        assert!(Instant::now() < deadline, "probe never reached the dependency");
        thread::sleep(Duration::from_millis(5));
    }

    // The probe budget is spent while the probe is in flight; further
    // calls fail fast.
    let Outcome::Failure(failure) = pipeline.handle("ORDER-1") else {
        panic!("call beyond the probe budget should be rejected");
    };
    assert_eq!(failure.reason, ReasonCode::CircuitOpen);
    assert_eq!(pipeline.breaker().current_state(), CircuitState::HalfOpen);

    drop(held);
    assert!(worker.join().unwrap().is_success());
    assert_eq!(pipeline.breaker().current_state(), CircuitState::Closed);
}

#[test]
fn rate_gate_rejects_calls_over_the_window_limit() {
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::new(ScriptedAddresses::new(vec![])))
        .rate_limit(3)
        .rate_window(Duration::from_secs(30))
        .build();

    for _ in 0..3 {
        assert!(pipeline.handle("ORDER-1").is_success());
    }

    let Outcome::Failure(failure) = pipeline.handle("ORDER-1") else {
        panic!("fourth call in the window should be rejected");
    };
    assert_eq!(failure.reason, ReasonCode::RateLimit);
    assert!(!failure.retryable);
    assert_eq!(failure.reason.http_status(), 429);
}

#[test]
fn saturated_bulkhead_rejects_without_disturbing_in_flight_calls() {
    let gate = Arc::new(Mutex::new(()));
    let capacity = 3u32;
    let pipeline = Arc::new(
        Pipeline::builder()
            .order_store(seeded_store())
            .address_client(Arc::new(BlockingAddresses {
                gate: Arc::clone(&gate),
            }))
            .bulkhead_capacity(capacity)
            .rate_limit(100)
            .build(),
    );

    let held = gate.lock();

    let mut workers = Vec::new();
    for _ in 0..capacity {
        let pipeline = Arc::clone(&pipeline);
        workers.push(thread::spawn(move || pipeline.handle("ORDER-1")));
    }

    // Wait until every worker occupies a slot.
    let deadline = Instant::now() + Duration::from_secs(5);
    while pipeline.bulkhead().in_flight() < capacity {
        assert!(Instant::now() < deadline, "workers never filled the bulkhead");
        thread::sleep(Duration::from_millis(5));
    }

    let Outcome::Failure(failure) = pipeline.handle("ORDER-1") else {
        panic!("call over capacity should be rejected");
    };
    assert_eq!(failure.reason, ReasonCode::BulkheadFull);
    assert!(failure.retryable);
    assert_eq!(failure.reason.http_status(), 429);

    drop(held);
    for worker in workers {
        assert!(worker.join().unwrap().is_success());
    }
    assert_eq!(pipeline.bulkhead().in_flight(), 0);
}

#[test]
fn injected_latency_delays_but_does_not_fail_the_call() {
    let injector = FaultInjector::new();
    injector.configure(ChaosDirective {
        enabled: true,
        latency_ms: 50,
        ..ChaosDirective::default()
    });

    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::new(ScriptedAddresses::new(vec![])))
        .fault_injector(injector)
        .build();

    let started = Instant::now();
    assert!(pipeline.handle("ORDER-1").is_success());
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn injected_http_500_is_retried_like_a_real_fault() {
    let injector = FaultInjector::new();
    injector.configure(ChaosDirective {
        enabled: true,
        http_500: true,
        ..ChaosDirective::default()
    });

    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::new(ScriptedAddresses::new(vec![])))
        .fault_injector(injector)
        .max_attempts(2)
        .backoff(vec![Duration::from_millis(1)])
        .min_samples(10)
        .build();

    let Outcome::Failure(failure) = pipeline.handle("ORDER-1") else {
        panic!("injected 500s should exhaust retries");
    };
    assert_eq!(failure.reason, ReasonCode::RetryExhausted);
    assert!(failure.message.contains("HTTP 500"));
}

#[test]
fn every_path_records_exactly_one_call_metric() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let injector = FaultInjector::new();
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::new(ScriptedAddresses::new(vec![])))
        .fault_injector(injector.clone())
        .metric_sink(Arc::clone(&metrics))
        .max_attempts(2)
        .backoff(vec![Duration::from_millis(1)])
        .rate_limit(3)
        .rate_window(Duration::from_secs(30))
        .min_samples(10)
        .build();

    pipeline.handle("ORDER-1"); // success
    pipeline.handle("ORDER-404"); // not found

    injector.configure(ChaosDirective {
        enabled: true,
        connection_error: true,
        ..ChaosDirective::default()
    });
    pipeline.handle("ORDER-1"); // retry exhausted
    pipeline.handle("ORDER-1"); // rate limited (4th in window)

    assert_eq!(metrics.call_count(), 4);
    let labels: Vec<&str> = metrics.calls().iter().map(|(label, _)| *label).collect();
    assert_eq!(
        labels,
        vec!["SUCCESS", "ORDER_NOT_FOUND", "RETRY_EXHAUSTED", "RATE_LIMIT"]
    );

    // The rate-limited call never passed admission, so it is not
    // processed - but it is still recorded and counted as failed.
    assert_eq!(metrics.counter("orders.processed"), 3);
    assert_eq!(metrics.counter("orders.successful"), 1);
    assert_eq!(metrics.counter("orders.failed:ORDER_NOT_FOUND"), 1);
    assert_eq!(metrics.counter("orders.failed:RETRY_EXHAUSTED"), 1);
    assert_eq!(metrics.counter("orders.failed:RATE_LIMIT"), 1);
    // Two attempts in the retry-exhausted call, one in the success.
    assert_eq!(metrics.counter("orders.by_postal_code:12345"), 3);
}

#[test]
fn breaker_transitions_are_reported_to_the_sink() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let injector = FaultInjector::new();
    let pipeline = Pipeline::builder()
        .order_store(seeded_store())
        .address_client(Arc::new(ScriptedAddresses::new(vec![])))
        .fault_injector(injector.clone())
        .metric_sink(Arc::clone(&metrics))
        .max_attempts(2)
        .backoff(vec![Duration::from_millis(1)])
        .failure_rate_threshold(0.5)
        .min_samples(4)
        .open_duration(Duration::from_millis(100))
        .build();

    injector.configure(ChaosDirective {
        enabled: true,
        connection_error: true,
        ..ChaosDirective::default()
    });
    pipeline.handle("ORDER-1");
    pipeline.handle("ORDER-1");

    injector.set_enabled(false);
    thread::sleep(Duration::from_millis(150));
    pipeline.handle("ORDER-1");

    assert_eq!(
        metrics.transitions(),
        vec![
            ("closed", "open"),
            ("open", "half-open"),
            ("half-open", "closed"),
        ]
    );
}
