//! Single-flight dispatch loop.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::cadence::Cadence;
use super::config::SchedulerConfig;
use crate::cache::{cache_key, ResponseCache};
use crate::metrics as prom;
use crate::queue::{AdmissionQueue, QueueMetrics, ScoreRequest};
use crate::upstream::{ScoreGateway, UpstreamError};

/// What a single dispatch cycle did with the request it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The request was past its deadline and was dropped uncalled
    Expired,
    /// The upstream produced a body
    Succeeded { latency: Duration },
    /// The upstream call failed
    Failed { latency: Duration },
    /// The cycle panicked; the handle was failed
    Panicked,
}

/// The one worker that drains the admission queue
pub struct Dispatcher {
    queue: Arc<AdmissionQueue>,
    gateway: Arc<dyn ScoreGateway>,
    cache: Arc<ResponseCache>,
    cadence: Arc<Cadence>,
    config: SchedulerConfig,
    metrics: Arc<QueueMetrics>,
    running: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<AdmissionQueue>,
        gateway: Arc<dyn ScoreGateway>,
        cache: Arc<ResponseCache>,
        cadence: Arc<Cadence>,
        config: SchedulerConfig,
    ) -> Self {
        let metrics = queue.metrics().clone();
        Self {
            queue,
            gateway,
            cache,
            cadence,
            config,
            metrics,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an externally owned liveness flag, e.g. for a readiness probe
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    pub fn running(&self) -> &Arc<AtomicBool> {
        &self.running
    }

    /// Run the loop on a new task until `shutdown` turns true
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Run until `shutdown` turns true or its sender is dropped.
    ///
    /// Shutdown is only observed between cycles; an upstream call that has
    /// started always finishes and resolves its handle.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        self.running.store(true, Ordering::Release);
        prom::set_scheduler_interval(self.cadence.current().as_millis() as u64);
        info!(
            base_ms = self.config.base_interval.as_millis() as u64,
            penalty_ms = self.config.penalty_interval().as_millis() as u64,
            "Dispatch loop starting"
        );

        if !self.pause(self.config.warmup, &mut shutdown).await {
            loop {
                let request = tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => break,
                    request = self.queue.take() => request,
                };

                self.run_cycle(request).await;

                if self.pause(self.cadence.current(), &mut shutdown).await {
                    break;
                }
            }
        }

        self.running.store(false, Ordering::Release);
        info!("Dispatch loop stopped");
    }

    /// Sleep for `duration`; true if shutdown was signalled meanwhile
    async fn pause(&self, duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return true;
        }
        tokio::select! {
            _ = wait_for_shutdown(shutdown) => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }

    /// Dispatch one request, containing any panic to this cycle
    pub async fn run_cycle(&self, request: ScoreRequest) -> CycleOutcome {
        let handle = request.handle().clone();
        let id = request.id().to_string();

        match AssertUnwindSafe(self.dispatch_once(request))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(request_id = %id, reason = %reason, "Dispatch cycle panicked");
                handle.fail(UpstreamError::Internal(reason));
                CycleOutcome::Panicked
            }
        }
    }

    /// Dispatch one request and adjust the cadence from its latency
    pub async fn dispatch_once(&self, request: ScoreRequest) -> CycleOutcome {
        if request.is_expired() {
            self.metrics.record_expired();
            prom::record_drop("ttl");
            warn!(
                request_id = %request.id(),
                priority = %request.priority(),
                age_ms = request.age().as_millis() as u64,
                "Dropping expired request"
            );
            return CycleOutcome::Expired;
        }

        let started = Instant::now();
        let result = self
            .gateway
            .call(request.query_params(), request.headers(), request.client_id())
            .await;
        let latency = started.elapsed();

        let outcome = match result {
            Ok(body) => {
                self.metrics.record_succeeded(latency);
                prom::record_upstream("success", latency.as_secs_f64());
                self.cache
                    .put(&cache_key(request.query_params()), body.clone())
                    .await;
                request.handle().resolve(body);
                debug!(
                    request_id = %request.id(),
                    latency_ms = latency.as_millis() as u64,
                    "Upstream call succeeded"
                );
                CycleOutcome::Succeeded { latency }
            }
            Err(err) => {
                self.metrics.record_failed(latency);
                prom::record_upstream("error", latency.as_secs_f64());
                warn!(
                    request_id = %request.id(),
                    kind = err.kind(),
                    latency_ms = latency.as_millis() as u64,
                    error = %err,
                    "Upstream call failed"
                );
                request.handle().fail(err);
                CycleOutcome::Failed { latency }
            }
        };

        let next = self.cadence.observe(latency);
        prom::set_scheduler_interval(next.as_millis() as u64);
        outcome
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender counts as a shutdown request
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::queue::{Priority, Resolution, ResultHandle};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Scripted gateway recording every call it receives
    struct FakeGateway {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
        fail: bool,
        panic: bool,
        seen: Mutex<Vec<String>>,
    }

    impl FakeGateway {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: false,
                panic: false,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScoreGateway for FakeGateway {
        async fn call(
            &self,
            query: &HashMap<String, String>,
            _headers: &HashMap<String, String>,
            client_id: Option<&str>,
        ) -> Result<String, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if self.panic {
                panic!("gateway exploded");
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.seen
                .lock()
                .unwrap()
                .push(query.get("cpf").cloned().unwrap_or_default());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                Err(UpstreamError::Connection("refused".to_string()))
            } else {
                Ok(format!(
                    "{{\"cpf\":\"{}\",\"client\":\"{}\"}}",
                    query.get("cpf").cloned().unwrap_or_default(),
                    client_id.unwrap_or("-")
                ))
            }
        }
    }

    struct Harness {
        queue: Arc<AdmissionQueue>,
        cache: Arc<ResponseCache>,
        cadence: Arc<Cadence>,
        dispatcher: Dispatcher,
    }

    fn harness(gateway: Arc<dyn ScoreGateway>) -> Harness {
        harness_with(
            gateway,
            SchedulerConfig {
                base_interval: Duration::from_millis(10),
                penalty_extra_delay: Duration::from_millis(20),
                penalty_margin: Duration::from_millis(5),
                warmup: Duration::ZERO,
            },
        )
    }

    fn harness_with(gateway: Arc<dyn ScoreGateway>, config: SchedulerConfig) -> Harness {
        let queue = Arc::new(AdmissionQueue::new(10, Arc::new(QueueMetrics::new())));
        let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
        let cadence = Arc::new(Cadence::from_config(&config));
        let dispatcher = Dispatcher::new(
            queue.clone(),
            gateway,
            cache.clone(),
            cadence.clone(),
            config,
        );
        Harness {
            queue,
            cache,
            cadence,
            dispatcher,
        }
    }

    fn request(cpf: &str) -> ScoreRequest {
        let mut params = HashMap::new();
        params.insert("cpf".to_string(), cpf.to_string());
        ScoreRequest::new("/score", params, HashMap::new())
    }

    #[tokio::test]
    async fn test_success_resolves_and_caches() {
        let gateway = Arc::new(FakeGateway::new());
        let h = harness(gateway.clone());
        let req = request("111").with_client_id("acme");
        let handle = req.handle().clone();

        let outcome = h.dispatcher.dispatch_once(req).await;
        assert!(matches!(outcome, CycleOutcome::Succeeded { .. }));
        assert_eq!(gateway.calls(), 1);

        let body = "{\"cpf\":\"111\",\"client\":\"acme\"}".to_string();
        assert_eq!(handle.peek(), Some(Ok(body.clone())));
        assert_eq!(h.cache.get("cpf=111").await, Some(body));
        assert_eq!(h.queue.metrics().snapshot().upstream_succeeded, 1);
    }

    #[tokio::test]
    async fn test_failure_resolves_without_caching() {
        let mut fake = FakeGateway::new();
        fake.fail = true;
        let gateway = Arc::new(fake);
        let h = harness(gateway.clone());
        let req = request("222");
        let handle = req.handle().clone();

        let outcome = h.dispatcher.dispatch_once(req).await;
        assert!(matches!(outcome, CycleOutcome::Failed { .. }));
        assert_eq!(
            handle.peek(),
            Some(Err(UpstreamError::Connection("refused".to_string())))
        );
        assert!(h.cache.is_empty().await);
        assert_eq!(h.queue.metrics().snapshot().upstream_failed, 1);
    }

    #[tokio::test]
    async fn test_expired_request_is_never_sent() {
        let gateway = Arc::new(FakeGateway::new());
        let h = harness(gateway.clone());
        let req = request("333").with_deadline(std::time::Instant::now() - Duration::from_millis(1));
        let handle = req.handle().clone();

        let outcome = h.dispatcher.dispatch_once(req).await;
        assert_eq!(outcome, CycleOutcome::Expired);
        assert_eq!(gateway.calls(), 0);
        assert!(!handle.is_resolved());
        assert_eq!(h.queue.metrics().snapshot().requests_expired, 1);
        // Cadence untouched by a drop
        assert_eq!(h.cadence.current(), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_slow_call_moves_cadence_to_penalty() {
        let mut fake = FakeGateway::new();
        fake.delay = Duration::from_millis(60);
        let h = harness(Arc::new(fake));

        h.dispatcher.dispatch_once(request("444")).await;
        assert_eq!(h.cadence.current(), Duration::from_millis(30));
        assert!(h.cadence.in_penalty());
    }

    #[tokio::test]
    async fn test_panic_fails_handle() {
        let mut fake = FakeGateway::new();
        fake.panic = true;
        let h = harness(Arc::new(fake));
        let req = request("555");
        let handle = req.handle().clone();

        let outcome = h.dispatcher.run_cycle(req).await;
        assert_eq!(outcome, CycleOutcome::Panicked);
        assert!(matches!(
            handle.peek(),
            Some(Err(UpstreamError::Internal(msg))) if msg.contains("gateway exploded")
        ));
    }

    #[tokio::test]
    async fn test_loop_dispatches_in_priority_order_one_at_a_time() {
        let mut fake = FakeGateway::new();
        fake.delay = Duration::from_millis(5);
        let gateway = Arc::new(fake);
        let h = harness(gateway.clone());

        let low = request("low").with_priority(Priority::Low);
        let high = request("high").with_priority(Priority::High);
        let medium = request("medium").with_priority(Priority::Medium);
        let last: ResultHandle = low.handle().clone();

        for req in [low, high, medium] {
            assert!(h.queue.admit(req, Duration::from_millis(10)).await.unwrap());
        }

        let (tx, rx) = watch::channel(false);
        let running = h.dispatcher.running().clone();
        let task = h.dispatcher.spawn(rx);

        last.wait(Duration::from_secs(5)).await;
        assert!(running.load(Ordering::Acquire));
        tx.send(true).unwrap();
        task.await.unwrap();

        assert!(!running.load(Ordering::Acquire));
        assert_eq!(*gateway.seen.lock().unwrap(), vec!["high", "medium", "low"]);
        assert_eq!(gateway.max_in_flight.load(Ordering::SeqCst), 1);
    }

    /// Gateway on the tokio clock: records when each call started and ended
    struct TimedGateway {
        slow_cpf: &'static str,
        slow_delay: Duration,
        calls: Mutex<Vec<(String, Instant, Instant)>>,
    }

    #[async_trait]
    impl ScoreGateway for TimedGateway {
        async fn call(
            &self,
            query: &HashMap<String, String>,
            _headers: &HashMap<String, String>,
            _client_id: Option<&str>,
        ) -> Result<String, UpstreamError> {
            let cpf = query.get("cpf").cloned().unwrap_or_default();
            let started = Instant::now();
            if cpf == self.slow_cpf {
                tokio::time::sleep(self.slow_delay).await;
            }
            self.calls
                .lock()
                .unwrap()
                .push((cpf.clone(), started, Instant::now()));
            Ok(format!("{{\"cpf\":\"{}\"}}", cpf))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_paces_calls_by_current_interval() {
        let gateway = Arc::new(TimedGateway {
            slow_cpf: "slow",
            slow_delay: Duration::from_millis(400),
            calls: Mutex::new(Vec::new()),
        });
        let h = harness_with(
            gateway.clone(),
            SchedulerConfig {
                base_interval: Duration::from_millis(100),
                penalty_extra_delay: Duration::from_millis(200),
                penalty_margin: Duration::from_millis(10),
                warmup: Duration::ZERO,
            },
        );

        let expired = request("stale")
            .with_priority(Priority::High)
            .with_deadline(std::time::Instant::now() - Duration::from_millis(1));
        let expired_handle = expired.handle().clone();
        let batch = [expired, request("a"), request("slow"), request("c")];
        let last_handle = batch[3].handle().clone();
        for req in batch {
            assert!(h.queue.admit(req, Duration::from_millis(10)).await.unwrap());
        }

        let (tx, rx) = watch::channel(false);
        let loop_started = Instant::now();
        let task = h.dispatcher.spawn(rx);

        assert!(matches!(
            last_handle.wait(Duration::from_secs(30)).await,
            Resolution::Success(_)
        ));
        tx.send(true).unwrap();
        task.await.unwrap();

        let calls = gateway.calls.lock().unwrap().clone();
        let order: Vec<&str> = calls.iter().map(|(cpf, _, _)| cpf.as_str()).collect();
        assert_eq!(order, vec!["a", "slow", "c"]);

        let close_to = |actual: Duration, expected_ms: u64| {
            let expected = Duration::from_millis(expected_ms);
            actual >= expected && actual <= expected + Duration::from_millis(5)
        };

        // The dropped request still costs one base interval, but no upstream call
        let first_gap = calls[0].1 - loop_started;
        assert!(close_to(first_gap, 100), "first call after {:?}", first_gap);

        let after_fast = calls[1].1 - calls[0].2;
        assert!(close_to(after_fast, 100), "gap after fast call {:?}", after_fast);

        let slow_latency = calls[1].2 - calls[1].1;
        assert!(slow_latency >= Duration::from_millis(400));

        let after_slow = calls[2].1 - calls[1].2;
        assert!(close_to(after_slow, 300), "gap after slow call {:?}", after_slow);

        assert!(!expired_handle.is_resolved());
        assert_eq!(h.queue.metrics().snapshot().requests_expired, 1);
        assert_eq!(h.cadence.current(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_shutdown_while_idle() {
        let h = harness(Arc::new(FakeGateway::new()));
        let (tx, rx) = watch::channel(false);
        let task = h.dispatcher.spawn(rx);

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_loop() {
        let h = harness(Arc::new(FakeGateway::new()));
        let (tx, rx) = watch::channel(false);
        let task = h.dispatcher.spawn(rx);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop should stop")
            .unwrap();
    }
}
