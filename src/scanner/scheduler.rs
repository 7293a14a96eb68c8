//! Concurrent scan dispatch.
//!
//! Every connect attempt holds two permits for its whole lifetime: one from
//! its host's pool and one from the global pool shared by all hosts. The
//! permits are RAII guards, so they are released exactly once however the
//! attempt ends. Permits are always taken host-first, then global. A
//! precheck takes its handshakes out of the same global pool.
//!
//! Results travel as [`ScanEvent`]s over a channel owned by the scheduler;
//! nothing else is shared between attempts.

use super::precheck::HostPrecheck;
use super::rate_limiter::RateLimiter;
use super::traits::{Connector, ScanResult};
use crate::error::ScanError;
use crate::progress::{HostProgress, ProgressSender};
use crate::types::{HostResolver, ScanTarget};
use futures::stream::{self, Stream, TryStreamExt};
use serde::Serialize;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a host was not swept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    /// Name resolution failed.
    Unresolvable(String),
    /// The precheck got no answer.
    Unreachable,
    /// The scan was cancelled before this host started.
    Cancelled,
}

/// Everything the scheduler reports, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Emitted for every target, in submission order, before any work starts.
    Queued { host: String, total: usize },
    /// The host resolved (and passed the precheck, if one applied).
    Started { host: String, address: IpAddr },
    /// The host will not be swept.
    Skipped { host: String, reason: SkipReason },
    /// One attempt finished.
    Result(ScanResult),
    /// Every submitted attempt for the host has reported.
    Finished {
        host: String,
        submitted: usize,
        completed: usize,
        cancelled: bool,
    },
}

impl ScanEvent {
    /// The host this event belongs to.
    pub fn host(&self) -> &str {
        match self {
            Self::Queued { host, .. }
            | Self::Started { host, .. }
            | Self::Skipped { host, .. }
            | Self::Finished { host, .. } => host,
            Self::Result(result) => &result.host,
        }
    }
}

/// Scheduler-wide limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum attempts in flight across all hosts.
    pub global_concurrency: usize,
    /// Maximum hosts being resolved, prechecked or swept at once.
    pub max_parallel_hosts: usize,
    /// Progress is reported roughly this many times per host.
    pub progress_steps: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            global_concurrency: 500,
            max_parallel_hosts: 16,
            progress_steps: 64,
        }
    }
}

/// Fans connect attempts out over bounded slot pools.
pub struct ScanScheduler {
    connector: Arc<dyn Connector>,
    config: SchedulerConfig,
    precheck: Option<HostPrecheck>,
    resolver: Option<HostResolver>,
    limiter: Option<RateLimiter>,
    progress: Option<ProgressSender>,
    cancel: CancellationToken,
}

impl ScanScheduler {
    /// Create a scheduler driving `connector`.
    pub fn new(connector: Arc<dyn Connector>, config: SchedulerConfig) -> Self {
        Self {
            connector,
            config,
            precheck: None,
            resolver: None,
            limiter: None,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Precheck hosts before sweeping them.
    pub fn with_precheck(mut self, precheck: HostPrecheck) -> Self {
        self.precheck = Some(precheck);
        self
    }

    /// Resolve hostnames with `resolver` instead of one built from the
    /// system configuration.
    pub fn with_resolver(mut self, resolver: HostResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Cap the dispatch rate across all hosts.
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Report per-host progress to `sender`.
    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Stop dispatching when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The token that stops this scheduler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Start sweeping `targets` in the background.
    ///
    /// Fails only when the global slot pool cannot be created.
    pub fn scan(self, targets: Vec<ScanTarget>) -> Result<ScanStream, ScanError> {
        let slots = self.config.global_concurrency;
        if slots == 0 || slots > Semaphore::MAX_PERMITS {
            return Err(ScanError::ResourcePoolExhausted(format!(
                "cannot create a pool of {} slots (allowed: 1-{})",
                slots,
                Semaphore::MAX_PERMITS
            )));
        }

        let (events, rx) = mpsc::unbounded_channel();
        for target in &targets {
            // The receiver is still in scope, so this cannot fail.
            let _ = events.send(ScanEvent::Queued {
                host: target.host.clone(),
                total: target.ports.len(),
            });
        }

        let parallel_hosts = self.config.max_parallel_hosts.max(1);
        let dispatcher = Arc::new(Dispatcher {
            connector: self.connector,
            global: Arc::new(Semaphore::new(slots)),
            global_slots: slots,
            resolver: self.resolver.unwrap_or_else(HostResolver::from_system_conf),
            precheck: self.precheck,
            limiter: self.limiter,
            progress: self.progress,
            progress_steps: self.config.progress_steps,
            // A fatal error stops this scan only, not the caller's token.
            cancel: self.cancel.child_token(),
            events,
        });

        debug!(
            hosts = targets.len(),
            slots, parallel_hosts, "scan dispatch starting"
        );
        let driver = tokio::spawn(async move {
            let result = stream::iter(targets.into_iter().map(Ok::<_, ScanError>))
                .try_for_each_concurrent(parallel_hosts, |target| {
                    Arc::clone(&dispatcher).sweep(target)
                })
                .await;
            if result.is_err() {
                dispatcher.cancel.cancel();
            }
            result
        });

        Ok(ScanStream { events: rx, driver })
    }
}

/// The event stream of a running scan.
///
/// Ends once every host has finished (or been skipped). Call [`join`]
/// afterwards to learn whether the scan aborted.
///
/// [`join`]: ScanStream::join
pub struct ScanStream {
    events: mpsc::UnboundedReceiver<ScanEvent>,
    driver: JoinHandle<Result<(), ScanError>>,
}

impl ScanStream {
    /// Wait for the dispatch driver and surface a fatal error, if any.
    pub async fn join(self) -> Result<(), ScanError> {
        match self.driver.await {
            Ok(result) => result,
            Err(e) => Err(ScanError::Aborted(e.to_string())),
        }
    }
}

impl Stream for ScanStream {
    type Item = ScanEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

/// The two permits an attempt holds while in flight.
struct Slot {
    _host: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

/// Shared state of one running scan.
struct Dispatcher {
    connector: Arc<dyn Connector>,
    global: Arc<Semaphore>,
    global_slots: usize,
    resolver: HostResolver,
    precheck: Option<HostPrecheck>,
    limiter: Option<RateLimiter>,
    progress: Option<ProgressSender>,
    progress_steps: usize,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<ScanEvent>,
}

impl Dispatcher {
    fn emit(&self, event: ScanEvent) {
        // The consumer may have stopped listening; results are then moot.
        let _ = self.events.send(event);
    }

    /// Resolve, precheck and sweep one host.
    async fn sweep(self: Arc<Self>, target: ScanTarget) -> Result<(), ScanError> {
        let host = target.host.clone();

        if self.cancel.is_cancelled() {
            self.emit(ScanEvent::Skipped {
                host,
                reason: SkipReason::Cancelled,
            });
            return Ok(());
        }

        let address = match self.locate(&target).await {
            Ok(address) => address,
            Err(reason) => {
                warn!(host = %host, reason = ?reason, "skipping host");
                self.emit(ScanEvent::Skipped { host, reason });
                return Ok(());
            }
        };

        let total = target.ports.len();
        info!(host = %host, %address, ports = total, "sweep started");
        self.emit(ScanEvent::Started {
            host: host.clone(),
            address,
        });

        let host_slots = Arc::new(Semaphore::new(
            target.concurrency.clamp(1, Semaphore::MAX_PERMITS),
        ));
        let progress = Arc::new(HostProgress::new(
            host.clone(),
            total,
            self.progress_steps,
            self.progress.clone(),
        ));
        let timeouts = target.timeouts();
        let mut attempts = JoinSet::new();
        let mut submitted = 0;

        for port in target.ports.iter() {
            let Some(slot) = self.acquire_slot(&host_slots).await? else {
                break;
            };

            let dispatcher = Arc::clone(&self);
            let progress = Arc::clone(&progress);
            let host = host.clone();
            attempts.spawn(async move {
                let _slot = slot;
                let outcome = dispatcher.connector.connect(address, port, timeouts).await;
                dispatcher.emit(ScanEvent::Result(ScanResult::new(host, port, outcome)));
                progress.record();
            });
            submitted += 1;
        }

        let cancelled = submitted < total;
        if cancelled {
            info!(host = %host, submitted, total, "dispatch stopped by cancellation");
        }

        while let Some(joined) = attempts.join_next().await {
            if let Err(e) = joined {
                warn!(host = %host, error = %e, "connect attempt task failed");
            }
        }

        progress.finish().await;
        let completed = progress.completed();
        info!(host = %host, completed, total, "sweep finished");
        self.emit(ScanEvent::Finished {
            host,
            submitted,
            completed,
            cancelled,
        });
        Ok(())
    }

    /// Pick the address to sweep, running the precheck when it applies.
    async fn locate(&self, target: &ScanTarget) -> Result<IpAddr, SkipReason> {
        let addresses = self
            .resolver
            .resolve(&target.host)
            .await
            .map_err(|e| SkipReason::Unresolvable(e.to_string()))?;

        match &self.precheck {
            Some(precheck) if precheck.applies_to(target.ports.len()) => {
                let wanted = precheck
                    .attempt_count(&addresses)
                    .clamp(1, self.global_slots);
                let permits = u32::try_from(wanted).unwrap_or(u32::MAX);
                let _slots = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(SkipReason::Cancelled),
                    // The pool is only closed once the dispatcher is gone.
                    held = Arc::clone(&self.global).acquire_many_owned(permits) => {
                        held.map_err(|_| SkipReason::Cancelled)?
                    }
                };
                debug!(host = %target.host, permits, "precheck holding global slots");
                precheck
                    .probe_bounded(&addresses, permits as usize)
                    .await
                    .ok_or(SkipReason::Unreachable)
            }
            _ => addresses
                .first()
                .copied()
                .ok_or_else(|| SkipReason::Unresolvable("no addresses found".to_string())),
        }
    }

    /// Wait for a host slot, then a global slot, then a rate token.
    ///
    /// Returns `Ok(None)` once the scan is cancelled.
    async fn acquire_slot(&self, host_slots: &Arc<Semaphore>) -> Result<Option<Slot>, ScanError> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let host = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            permit = Arc::clone(host_slots).acquire_owned() => permit
                .map_err(|_| ScanError::ResourcePoolExhausted("host slot pool closed".to_string()))?,
        };
        let global = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            permit = Arc::clone(&self.global).acquire_owned() => permit
                .map_err(|_| ScanError::ResourcePoolExhausted("global slot pool closed".to_string()))?,
        };
        if let Some(limiter) = &self.limiter {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(None),
                _ = limiter.wait() => {}
            }
        }

        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        Ok(Some(Slot {
            _host: host,
            _global: global,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressEvent;
    use crate::scanner::traits::{Outcome, Timeouts};
    use crate::types::{Port, PortSet};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Connector that records how many attempts overlap.
    #[derive(Default)]
    struct CountingConnector {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
        open: Vec<u16>,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl CountingConnector {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self, _address: IpAddr, port: Port, _timeouts: Timeouts) -> Outcome {
            let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if let Some((limit, token)) = &self.cancel_after {
                if calls == *limit {
                    token.cancel();
                }
            }
            tokio::time::sleep(self.delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.open.contains(&port.as_u16()) {
                Outcome::open()
            } else {
                Outcome::Closed
            }
        }
    }

    fn target(host: &str, ports: &str, concurrency: usize) -> ScanTarget {
        ScanTarget::new(host, PortSet::resolve([ports]).unwrap()).with_concurrency(concurrency)
    }

    fn config(global: usize) -> SchedulerConfig {
        SchedulerConfig {
            global_concurrency: global,
            ..SchedulerConfig::default()
        }
    }

    async fn collect(mut stream: ScanStream) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        stream.join().await.unwrap();
        events
    }

    fn results(events: &[ScanEvent]) -> Vec<&ScanResult> {
        events
            .iter()
            .filter_map(|e| match e {
                ScanEvent::Result(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_global_limit_holds_across_hosts() {
        let connector = Arc::new(CountingConnector::with_delay(Duration::from_millis(5)));
        let scheduler = ScanScheduler::new(connector.clone(), config(4));
        let targets = vec![
            target("127.0.0.1", "1-40", 64),
            target("127.0.0.2", "1-40", 64),
            target("127.0.0.3", "1-40", 64),
        ];

        let events = collect(scheduler.scan(targets).unwrap()).await;

        assert_eq!(results(&events).len(), 120);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 120);
        assert!(connector.max_in_flight.load(Ordering::SeqCst) <= 4);
    }

    #[tokio::test]
    async fn test_host_limit_holds() {
        let connector = Arc::new(CountingConnector::with_delay(Duration::from_millis(5)));
        let scheduler = ScanScheduler::new(connector.clone(), config(100));

        let events = collect(scheduler.scan(vec![target("127.0.0.1", "1-30", 3)]).unwrap()).await;

        assert_eq!(results(&events).len(), 30);
        let max = connector.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "saw {max} attempts in flight");
    }

    #[tokio::test]
    async fn test_one_result_per_port_and_queued_in_order() {
        let connector = Arc::new(CountingConnector {
            open: vec![22, 80],
            ..CountingConnector::default()
        });
        let scheduler = ScanScheduler::new(connector, config(8));
        let targets = vec![
            target("127.0.0.2", "22,80,443", 2),
            target("127.0.0.1", "80-81", 2),
        ];

        let events = collect(scheduler.scan(targets).unwrap()).await;

        assert_eq!(
            &events[..2],
            &[
                ScanEvent::Queued {
                    host: "127.0.0.2".into(),
                    total: 3
                },
                ScanEvent::Queued {
                    host: "127.0.0.1".into(),
                    total: 2
                },
            ]
        );
        let mut seen: Vec<(String, u16)> = results(&events)
            .iter()
            .map(|r| (r.host.clone(), r.port.as_u16()))
            .collect();
        seen.sort();
        assert_eq!(
            seen,
            vec![
                ("127.0.0.1".into(), 80),
                ("127.0.0.1".into(), 81),
                ("127.0.0.2".into(), 22),
                ("127.0.0.2".into(), 80),
                ("127.0.0.2".into(), 443),
            ]
        );
        let open = results(&events).iter().filter(|r| r.is_open()).count();
        assert_eq!(open, 3);
    }

    #[tokio::test]
    async fn test_finished_comes_after_all_results() {
        let connector = Arc::new(CountingConnector::with_delay(Duration::from_millis(1)));
        let scheduler = ScanScheduler::new(connector, config(8));

        let events = collect(scheduler.scan(vec![target("127.0.0.1", "1-20", 4)]).unwrap()).await;

        let last = events.last().unwrap();
        assert_eq!(
            last,
            &ScanEvent::Finished {
                host: "127.0.0.1".into(),
                submitted: 20,
                completed: 20,
                cancelled: false
            }
        );
    }

    #[tokio::test]
    async fn test_cancellation_stops_new_submissions() {
        let token = CancellationToken::new();
        let connector = Arc::new(CountingConnector {
            cancel_after: Some((10, token.clone())),
            delay: Duration::from_millis(2),
            ..CountingConnector::default()
        });
        let scheduler =
            ScanScheduler::new(connector.clone(), config(1)).with_cancellation(token.clone());

        let events = collect(scheduler.scan(vec![target("127.0.0.1", "1-100", 1)]).unwrap()).await;

        assert!(token.is_cancelled());
        assert_eq!(connector.calls.load(Ordering::SeqCst), 10);
        assert_eq!(results(&events).len(), 10);
        assert_eq!(
            events.last().unwrap(),
            &ScanEvent::Finished {
                host: "127.0.0.1".into(),
                submitted: 10,
                completed: 10,
                cancelled: true
            }
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_hosts() {
        let token = CancellationToken::new();
        token.cancel();
        let connector = Arc::new(CountingConnector::default());
        let scheduler = ScanScheduler::new(connector.clone(), config(4)).with_cancellation(token);

        let events = collect(scheduler.scan(vec![target("127.0.0.1", "1-5", 2)]).unwrap()).await;

        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
        assert!(events.contains(&ScanEvent::Skipped {
            host: "127.0.0.1".into(),
            reason: SkipReason::Cancelled
        }));
    }

    #[tokio::test]
    async fn test_failed_precheck_issues_no_attempts() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = Port::new(listener.local_addr().unwrap().port()).unwrap();
        drop(listener);

        let connector = Arc::new(CountingConnector::default());
        let precheck = HostPrecheck::new(vec![closed], Duration::from_millis(200)).with_min_ports(1);
        let scheduler = ScanScheduler::new(connector.clone(), config(4)).with_precheck(precheck);

        let events = collect(scheduler.scan(vec![target("127.0.0.1", "1-50", 4)]).unwrap()).await;

        assert_eq!(connector.calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            events.last().unwrap(),
            &ScanEvent::Skipped {
                host: "127.0.0.1".into(),
                reason: SkipReason::Unreachable
            }
        );
    }

    #[tokio::test]
    async fn test_precheck_waits_for_global_slots() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let open = Port::new(listener.local_addr().unwrap().port()).unwrap();

        let connector = Arc::new(CountingConnector::with_delay(Duration::from_millis(200)));
        let precheck = HostPrecheck::new(vec![open], Duration::from_millis(500)).with_min_ports(2);
        let scheduler = ScanScheduler::new(connector.clone(), config(1))
            .with_precheck(precheck)
            .with_resolver(HostResolver::from_system_conf());
        // The first host takes the only slot; the second must wait for it
        // before its reachability check may connect.
        let targets = vec![target("192.0.2.1", "80", 1), target("127.0.0.1", "81-82", 1)];

        let events = collect(scheduler.scan(targets).unwrap()).await;

        let first_result = events
            .iter()
            .position(|e| matches!(e, ScanEvent::Result(r) if r.host == "192.0.2.1"))
            .unwrap();
        let second_started = events
            .iter()
            .position(|e| matches!(e, ScanEvent::Started { host, .. } if host == "127.0.0.1"))
            .unwrap();
        assert!(first_result < second_started);
        assert_eq!(connector.calls.load(Ordering::SeqCst), 3);
        assert_eq!(connector.max_in_flight.load(Ordering::SeqCst), 1);
        drop(listener);
    }

    #[tokio::test]
    async fn test_precheck_not_applied_to_small_sweeps() {
        let connector = Arc::new(CountingConnector::default());
        let precheck = HostPrecheck::new(Vec::new(), Duration::from_millis(100)).with_min_ports(100);
        let scheduler = ScanScheduler::new(connector.clone(), config(4)).with_precheck(precheck);

        collect(scheduler.scan(vec![target("127.0.0.1", "1-5", 4)]).unwrap()).await;

        assert_eq!(connector.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_final_event_delivered() {
        let (sender, mut rx) = crate::progress::ProgressSender::channel(4);
        let collector = tokio::spawn(async move {
            let mut events: Vec<ProgressEvent> = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        });

        let connector = Arc::new(CountingConnector::default());
        let scheduler = ScanScheduler::new(connector, config(16)).with_progress(sender);
        collect(scheduler.scan(vec![target("127.0.0.1", "1-1000", 16)]).unwrap()).await;

        let events = collector.await.unwrap();
        let counts: Vec<usize> = events.iter().map(|e| e.completed).collect();
        assert!(counts.windows(2).all(|w| w[0] < w[1]), "{counts:?}");
        let last = events.last().unwrap();
        assert!(last.done);
        assert_eq!((last.completed, last.total), (1000, 1000));
    }

    #[tokio::test]
    async fn test_zero_slots_is_fatal() {
        let connector = Arc::new(CountingConnector::default());
        let result = ScanScheduler::new(connector, config(0)).scan(Vec::new());
        assert!(matches!(result, Err(ScanError::ResourcePoolExhausted(_))));
    }

    #[test]
    fn test_event_host() {
        let event = ScanEvent::Result(ScanResult::new(
            "10.0.0.9",
            Port::new(22).unwrap(),
            Outcome::Filtered,
        ));
        assert_eq!(event.host(), "10.0.0.9");
    }
}
