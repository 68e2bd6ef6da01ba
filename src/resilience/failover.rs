//! Failover coordinator.
//!
//! # Responsibilities
//! - Answer `get_server(session)`: live sticky binding first, fresh selection otherwise
//! - Track per-session failover state after callers report failures
//! - Exclude already-tried servers and wait the backoff delay before retrying
//! - Give up with `FailoverExhausted` once the retry budget is spent
//!
//! # State
//! ```text
//! report_failure(s, x)  → tried += x, retry pending   (tried > max_retries → exhausted)
//! get_server(s)         → sleep backoff if pending, select excluding tried
//! report_success(s)     → state cleared
//! idle > window_secs    → state forgotten
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::time::{self, Duration, Instant};

use crate::config::{FailoverConfig, StickinessConfig};
use crate::error::{BalancerError, Result};
use crate::load_balancer::{SelectionEngine, Server, ServerId, ServerRegistry};
use crate::observability::audit::{AuditEvent, AuditSink};
use crate::observability::metrics;
use crate::resilience::backoff::retry_delay;
use crate::stickiness::{StickinessStore, StoreError};

#[derive(Debug, Clone)]
struct FailoverState {
    tried: Vec<ServerId>,
    pending_retry: bool,
    last_activity: Instant,
}

impl FailoverState {
    fn new(now: Instant) -> Self {
        Self {
            tried: Vec::new(),
            pending_retry: false,
            last_activity: now,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.duration_since(self.last_activity) >= window
    }
}

pub struct FailoverCoordinator {
    registry: Arc<ServerRegistry>,
    engine: SelectionEngine,
    store: Arc<dyn StickinessStore>,
    stickiness: StickinessConfig,
    failover: FailoverConfig,
    audit: Arc<dyn AuditSink>,
    sessions: DashMap<String, FailoverState>,
}

impl FailoverCoordinator {
    pub fn new(
        registry: Arc<ServerRegistry>,
        engine: SelectionEngine,
        store: Arc<dyn StickinessStore>,
        stickiness: StickinessConfig,
        failover: FailoverConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            engine,
            store,
            stickiness,
            failover,
            audit,
            sessions: DashMap::new(),
        }
    }

    pub fn algorithm_name(&self) -> &'static str {
        self.engine.algorithm_name()
    }

    /// Server ids already tried for `session` in its current failover window.
    pub fn tried(&self, session: &str) -> Vec<ServerId> {
        let now = Instant::now();
        self.sessions
            .get(session)
            .filter(|state| !state.is_expired(now, self.window()))
            .map(|state| state.tried.clone())
            .unwrap_or_default()
    }

    /// Sessions with live failover state.
    pub fn active_sessions(&self) -> usize {
        self.purge_expired();
        self.sessions.len()
    }

    /// Forget failover state idle for longer than the window. Returns how
    /// many sessions were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let window = self.window();
        let mut removed = 0;
        self.sessions.retain(|_, state| {
            let keep = !state.is_expired(now, window);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub async fn get_server(&self, session: &str) -> Result<Server> {
        let tried = self.begin_attempt(session).await;
        let snapshot = self.registry.snapshot();

        if self.stickiness.enabled {
            if let Some(server) = self.sticky_server(session, &snapshot, &tried).await {
                metrics::record_selection(self.algorithm_name(), "sticky");
                self.audit.record(AuditEvent::Selected {
                    session: session.to_string(),
                    server: server.id.clone(),
                    sticky: true,
                });
                return Ok(server);
            }
        }

        let selected = match self.engine.select_excluding(&snapshot, session, &tried) {
            Ok(server) => server,
            Err(BalancerError::NoHealthyServers)
                if !tried.is_empty() && snapshot.iter().any(Server::is_healthy) =>
            {
                // Healthy servers remain, but every one of them was already tried.
                return Err(self.exhausted(session, tried));
            }
            Err(e) => {
                metrics::record_selection(self.algorithm_name(), "no_healthy");
                tracing::warn!(session = %session, error = %e, "Selection failed");
                return Err(e);
            }
        };

        let server = if self.stickiness.enabled {
            self.bind(session, selected, &snapshot, &tried).await
        } else {
            selected
        };

        metrics::record_selection(self.algorithm_name(), "selected");
        self.audit.record(AuditEvent::Selected {
            session: session.to_string(),
            server: server.id.clone(),
            sticky: false,
        });
        Ok(server)
    }

    /// Record that `server_id` failed for `session`.
    ///
    /// Drops the session's binding to that server. With failover enabled the
    /// server is excluded from the session's next selections; returns
    /// `FailoverExhausted` once more than `max_retries` servers have failed.
    pub async fn report_failure(&self, session: &str, server_id: &ServerId) -> Result<()> {
        if self.stickiness.enabled {
            let _ = self
                .store_call("delete_if", self.store.delete_if(session, server_id))
                .await;
        }

        if !self.failover.enabled {
            tracing::debug!(session = %session, server = %server_id, "Failure reported, failover disabled");
            return Ok(());
        }

        let now = Instant::now();
        let window = self.window();
        let tried = {
            let mut state = self
                .sessions
                .entry(session.to_string())
                .or_insert_with(|| FailoverState::new(now));
            if state.is_expired(now, window) {
                *state = FailoverState::new(now);
            }
            if !state.tried.contains(server_id) {
                state.tried.push(server_id.clone());
            }
            state.pending_retry = true;
            state.last_activity = now;
            state.tried.clone()
        };

        if tried.len() > self.failover.max_retries as usize {
            return Err(self.exhausted(session, tried));
        }

        tracing::info!(
            session = %session,
            server = %server_id,
            attempt = tried.len(),
            max_retries = self.failover.max_retries,
            "Server failed, failing over"
        );
        metrics::record_failover("retry");
        self.audit.record(AuditEvent::FailoverAttempt {
            session: session.to_string(),
            failed: server_id.clone(),
            attempt: tried.len(),
        });
        Ok(())
    }

    /// Forget the session's failover state after a successful call.
    pub fn report_success(&self, session: &str) {
        self.sessions.remove(session);
    }

    /// Run `op` against servers chosen for `session`, failing over on error
    /// until it succeeds, the retry budget runs out, or `deadline` passes.
    pub async fn call_with_failover<F, Fut, T, E>(
        &self,
        session: &str,
        deadline: Instant,
        mut op: F,
    ) -> Result<T>
    where
        F: FnMut(Server) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
    {
        let attempts = async {
            loop {
                let server = self.get_server(session).await?;
                let id = server.id.clone();
                match op(server).await {
                    Ok(value) => {
                        self.report_success(session);
                        return Ok(value);
                    }
                    Err(e) => {
                        tracing::warn!(session = %session, server = %id, error = %e, "Call failed");
                        self.report_failure(session, &id).await?;
                        if !self.failover.enabled {
                            return Err(BalancerError::FailoverExhausted { tried: vec![id] });
                        }
                    }
                }
            }
        };

        match time::timeout_at(deadline, attempts).await {
            Ok(result) => result,
            Err(_) => {
                let tried = self
                    .sessions
                    .remove(session)
                    .map(|(_, state)| state.tried)
                    .unwrap_or_default();
                tracing::warn!(session = %session, tried = ?tried, "Failover deadline passed");
                metrics::record_failover("deadline");
                self.audit.record(AuditEvent::FailoverExhausted {
                    session: session.to_string(),
                    tried: tried.clone(),
                });
                Err(BalancerError::FailoverExhausted { tried })
            }
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.failover.window_secs)
    }

    /// Load the session's tried set, sleeping first if a retry is pending.
    async fn begin_attempt(&self, session: &str) -> Vec<ServerId> {
        let now = Instant::now();
        let window = self.window();

        let live = self.sessions.get_mut(session).map(|mut state| {
            if state.is_expired(now, window) {
                return None;
            }
            let pending = std::mem::replace(&mut state.pending_retry, false);
            state.last_activity = now;
            Some((state.tried.clone(), pending))
        });

        let (tried, pending) = match live {
            Some(Some(state)) => state,
            Some(None) => {
                self.sessions.remove(session);
                (Vec::new(), false)
            }
            None => (Vec::new(), false),
        };

        if pending {
            let delay = retry_delay(
                self.failover.backoff,
                tried.len() as u32,
                self.failover.retry_delay_ms,
                self.failover.max_retry_delay_ms,
            );
            tracing::debug!(session = %session, delay_ms = delay.as_millis() as u64, "Waiting before retry");
            time::sleep(delay).await;
        }

        tried
    }

    /// The session's bound server, if the binding is live and usable.
    async fn sticky_server(
        &self,
        session: &str,
        snapshot: &[Server],
        tried: &[ServerId],
    ) -> Option<Server> {
        let bound = match self.store_call("get", self.store.get(session)).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                metrics::record_sticky_lookup("miss");
                return None;
            }
            Err(_) => {
                metrics::record_sticky_lookup("error");
                return None;
            }
        };

        match usable(snapshot, &bound, tried) {
            Some(server) => {
                metrics::record_sticky_lookup("hit");
                Some(server.clone())
            }
            None => {
                tracing::debug!(session = %session, server = %bound, "Dropping stale sticky binding");
                metrics::record_sticky_lookup("stale");
                let _ = self
                    .store_call("delete_if", self.store.delete_if(session, &bound))
                    .await;
                None
            }
        }
    }

    /// Bind `session` to `selected`, adopting a concurrent winner if it is usable.
    async fn bind(
        &self,
        session: &str,
        selected: Server,
        snapshot: &[Server],
        tried: &[ServerId],
    ) -> Server {
        let ttl = self.stickiness.ttl();
        let winner = match self
            .store_call("set_if_absent", self.store.set_if_absent(session, &selected.id, ttl))
            .await
        {
            Ok(winner) => winner,
            Err(_) => return selected,
        };

        if winner == selected.id {
            return selected;
        }
        if let Some(server) = usable(snapshot, &winner, tried) {
            tracing::debug!(session = %session, server = %winner, "Adopting concurrent binding");
            return server.clone();
        }

        let _ = self
            .store_call("set", self.store.set(session, &selected.id, ttl))
            .await;
        selected
    }

    /// Bound a store call by the configured timeout. Failures are logged and
    /// returned so callers can fall back to fresh selection.
    async fn store_call<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> Result<T> {
        match time::timeout(self.stickiness.store_timeout(), call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(op, error = %e, "Stickiness store error, treating as miss");
                Err(BalancerError::StoreUnavailable(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(op, "Stickiness store timed out, treating as miss");
                Err(BalancerError::StoreUnavailable(format!("{} timed out", op)))
            }
        }
    }

    fn exhausted(&self, session: &str, tried: Vec<ServerId>) -> BalancerError {
        self.sessions.remove(session);
        tracing::warn!(session = %session, tried = ?tried, "Failover exhausted");
        metrics::record_failover("exhausted");
        self.audit.record(AuditEvent::FailoverExhausted {
            session: session.to_string(),
            tried: tried.clone(),
        });
        BalancerError::FailoverExhausted { tried }
    }
}

fn usable<'a>(snapshot: &'a [Server], id: &ServerId, tried: &[ServerId]) -> Option<&'a Server> {
    snapshot
        .iter()
        .find(|s| &s.id == id)
        .filter(|s| s.is_healthy() && !tried.contains(&s.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Algorithm, BackoffKind};
    use crate::load_balancer::test_support::{healthy_registry as registry, set_status};
    use crate::load_balancer::HealthStatus;
    use crate::observability::audit::MemoryAuditSink;
    use crate::stickiness::MemoryStickinessStore;
    use async_trait::async_trait;

    fn failover() -> FailoverConfig {
        FailoverConfig {
            max_retries: 2,
            retry_delay_ms: 100,
            ..FailoverConfig::default()
        }
    }

    struct Fixture {
        coordinator: FailoverCoordinator,
        store: MemoryStickinessStore,
        audit: Arc<MemoryAuditSink>,
    }

    fn fixture(ids: &[&str], stickiness: StickinessConfig, failover: FailoverConfig) -> Fixture {
        let store = MemoryStickinessStore::new();
        let audit = Arc::new(MemoryAuditSink::new());
        let coordinator = FailoverCoordinator::new(
            registry(ids),
            SelectionEngine::new(Algorithm::RoundRobin),
            Arc::new(store.clone()),
            stickiness,
            failover,
            audit.clone(),
        );
        Fixture {
            coordinator,
            store,
            audit,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sticky_binding_is_reused() {
        let f = fixture(&["a", "b", "c"], StickinessConfig::default(), failover());

        let first = f.coordinator.get_server("sess1").await.unwrap();
        for _ in 0..5 {
            assert_eq!(f.coordinator.get_server("sess1").await.unwrap().id, first.id);
        }
        assert_eq!(f.store.get("sess1").await.unwrap(), Some(first.id.clone()));

        let other = f.coordinator.get_server("sess2").await.unwrap();
        assert_ne!(other.id, first.id, "round robin moved on for a new session");

        let sticky_hits = f
            .audit
            .events()
            .into_iter()
            .filter(|e| matches!(e, AuditEvent::Selected { sticky: true, .. }))
            .count();
        assert_eq!(sticky_hits, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_binding_to_unhealthy_server_is_replaced() {
        let f = fixture(&["a", "b"], StickinessConfig::default(), failover());
        let first = f.coordinator.get_server("s").await.unwrap();

        set_status(&f.coordinator.registry, first.id.as_str(), HealthStatus::Unhealthy);

        let second = f.coordinator.get_server("s").await.unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(f.store.get("s").await.unwrap(), Some(second.id));
    }

    #[tokio::test(start_paused = true)]
    async fn late_failure_report_keeps_newer_binding() {
        let f = fixture(&["a", "b"], StickinessConfig::default(), failover());
        let first = f.coordinator.get_server("s").await.unwrap();
        assert_eq!(first.id, "a");

        // Another request rebinds the session before this failure lands.
        let b = ServerId::from("b");
        f.store.set("s", &b, Duration::from_secs(60)).await.unwrap();
        f.coordinator.report_failure("s", &first.id).await.unwrap();
        assert_eq!(f.store.get("s").await.unwrap(), Some(b.clone()));

        f.coordinator.report_failure("s", &b).await.unwrap();
        assert_eq!(f.store.get("s").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failover_reaches_third_server() {
        let f = fixture(&["a", "b", "c"], StickinessConfig::default(), failover());

        let first = f.coordinator.get_server("s").await.unwrap();
        f.coordinator.report_failure("s", &first.id).await.unwrap();
        let second = f.coordinator.get_server("s").await.unwrap();
        assert_ne!(second.id, first.id);
        f.coordinator.report_failure("s", &second.id).await.unwrap();

        let third = f.coordinator.get_server("s").await.unwrap();
        assert!(third.id != first.id && third.id != second.id);
        assert_eq!(f.coordinator.tried("s"), vec![first.id, second.id]);

        f.coordinator.report_success("s");
        assert!(f.coordinator.tried("s").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn all_healthy_tried_is_exhausted() {
        let f = fixture(&["a", "b"], StickinessConfig::default(), failover());

        let first = f.coordinator.get_server("s").await.unwrap();
        f.coordinator.report_failure("s", &first.id).await.unwrap();
        let second = f.coordinator.get_server("s").await.unwrap();
        f.coordinator.report_failure("s", &second.id).await.unwrap();

        match f.coordinator.get_server("s").await {
            Err(BalancerError::FailoverExhausted { tried }) => {
                assert_eq!(tried, vec![first.id, second.id]);
            }
            other => panic!("expected FailoverExhausted, got {:?}", other),
        }
        assert_eq!(f.coordinator.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exceeded_on_report() {
        let f = fixture(&["a", "b", "c", "d"], StickinessConfig::default(), failover());

        for _ in 0..2 {
            let server = f.coordinator.get_server("s").await.unwrap();
            f.coordinator.report_failure("s", &server.id).await.unwrap();
        }
        let third = f.coordinator.get_server("s").await.unwrap();
        let err = f.coordinator.report_failure("s", &third.id).await.unwrap_err();
        assert!(matches!(err, BalancerError::FailoverExhausted { ref tried } if tried.len() == 3));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_linear_delay() {
        let f = fixture(&["a", "b", "c"], StickinessConfig::default(), failover());
        let first = f.coordinator.get_server("s").await.unwrap();
        f.coordinator.report_failure("s", &first.id).await.unwrap();

        let started = Instant::now();
        f.coordinator.get_server("s").await.unwrap();
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(100) && waited < Duration::from_millis(110));

        let started = Instant::now();
        f.coordinator.get_server("s").await.unwrap();
        assert_eq!(started.elapsed(), Duration::ZERO, "no retry pending");
    }

    #[tokio::test(start_paused = true)]
    async fn exponential_backoff_grows() {
        let cfg = FailoverConfig {
            max_retries: 3,
            backoff: BackoffKind::Exponential,
            retry_delay_ms: 10,
            ..FailoverConfig::default()
        };
        let f = fixture(&["a", "b", "c", "d"], StickinessConfig::default(), cfg);

        let mut delays = Vec::new();
        let mut server = f.coordinator.get_server("s").await.unwrap();
        for _ in 0..3 {
            f.coordinator.report_failure("s", &server.id).await.unwrap();
            let started = Instant::now();
            server = f.coordinator.get_server("s").await.unwrap();
            delays.push(started.elapsed().as_millis());
        }
        assert!(delays[0] >= 10 && delays[0] < 20);
        assert!(delays[1] >= 20 && delays[1] < 40);
        assert!(delays[2] >= 40 && delays[2] < 80);
    }

    #[tokio::test(start_paused = true)]
    async fn failover_state_expires_after_window() {
        let cfg = FailoverConfig {
            window_secs: 5,
            ..failover()
        };
        let f = fixture(&["a", "b"], StickinessConfig::default(), cfg);
        let first = f.coordinator.get_server("s").await.unwrap();
        f.coordinator.report_failure("s", &first.id).await.unwrap();
        assert_eq!(f.coordinator.tried("s").len(), 1);

        time::advance(Duration::from_secs(5)).await;
        assert!(f.coordinator.tried("s").is_empty());
        assert_eq!(f.coordinator.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_sessions_are_purged() {
        let cfg = FailoverConfig {
            window_secs: 5,
            ..failover()
        };
        let f = fixture(&["a", "b", "c"], StickinessConfig::default(), cfg);
        for i in 0..1_000 {
            let session = format!("client-{}", i);
            let server = f.coordinator.get_server(&session).await.unwrap();
            f.coordinator.report_failure(&session, &server.id).await.unwrap();
        }
        assert_eq!(f.coordinator.sessions.len(), 1_000);

        time::advance(Duration::from_secs(2)).await;
        let fresh = f.coordinator.get_server("late").await.unwrap();
        f.coordinator.report_failure("late", &fresh.id).await.unwrap();
        assert_eq!(f.coordinator.purge_expired(), 0);

        time::advance(Duration::from_secs(3)).await;
        assert_eq!(f.coordinator.purge_expired(), 1_000);
        assert_eq!(f.coordinator.tried("late"), vec![fresh.id]);

        time::advance(Duration::from_secs(3600)).await;
        assert_eq!(f.coordinator.purge_expired(), 1);
        assert!(f.coordinator.sessions.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failover_disabled_keeps_no_state() {
        let cfg = FailoverConfig {
            enabled: false,
            ..failover()
        };
        let f = fixture(&["a", "b"], StickinessConfig::default(), cfg);
        let first = f.coordinator.get_server("s").await.unwrap();
        f.coordinator.report_failure("s", &first.id).await.unwrap();

        assert!(f.coordinator.tried("s").is_empty());
        assert_eq!(f.store.get("s").await.unwrap(), None, "binding to failed server dropped");
    }

    #[tokio::test(start_paused = true)]
    async fn stickiness_disabled_rotates() {
        let stickiness = StickinessConfig {
            enabled: false,
            ..StickinessConfig::default()
        };
        let f = fixture(&["a", "b"], stickiness, failover());
        let first = f.coordinator.get_server("s").await.unwrap();
        let second = f.coordinator.get_server("s").await.unwrap();
        assert_ne!(first.id, second.id);
        assert!(f.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_healthy_servers() {
        let f = fixture(&[], StickinessConfig::default(), failover());
        assert_eq!(
            f.coordinator.get_server("s").await.unwrap_err(),
            BalancerError::NoHealthyServers
        );
    }

    /// Store that never answers.
    struct HangingStore;

    #[async_trait]
    impl StickinessStore for HangingStore {
        async fn get(&self, _: &str) -> std::result::Result<Option<ServerId>, StoreError> {
            std::future::pending().await
        }
        async fn set(&self, _: &str, _: &ServerId, _: Duration) -> std::result::Result<(), StoreError> {
            std::future::pending().await
        }
        async fn set_if_absent(
            &self,
            _: &str,
            _: &ServerId,
            _: Duration,
        ) -> std::result::Result<ServerId, StoreError> {
            std::future::pending().await
        }
        async fn delete(&self, _: &str) -> std::result::Result<bool, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn delete_if(&self, _: &str, _: &ServerId) -> std::result::Result<bool, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
        async fn delete_server(&self, _: &ServerId) -> std::result::Result<usize, StoreError> {
            Err(StoreError::Connection("refused".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_degrades_to_fresh_selection() {
        let coordinator = FailoverCoordinator::new(
            registry(&["a", "b"]),
            SelectionEngine::new(Algorithm::RoundRobin),
            Arc::new(HangingStore),
            StickinessConfig::default(),
            failover(),
            Arc::new(MemoryAuditSink::new()),
        );

        let started = Instant::now();
        let server = coordinator.get_server("s").await.unwrap();
        assert_eq!(server.id, "a");
        // One timed-out lookup plus one timed-out bind.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(100) && waited < Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn call_with_failover_retries_until_success() {
        let f = fixture(&["a", "b", "c"], StickinessConfig::default(), failover());
        let deadline = Instant::now() + Duration::from_secs(10);

        let mut calls = Vec::new();
        let value = f
            .coordinator
            .call_with_failover("s", deadline, |server| {
                calls.push(server.id.clone());
                let ok = server.id == "c";
                async move {
                    if ok {
                        Ok(server.port)
                    } else {
                        Err("connection reset")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 8080);
        assert_eq!(calls.last().map(|id| id.as_str()), Some("c"));
        assert!(f.coordinator.tried("s").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn call_with_failover_respects_deadline() {
        let cfg = FailoverConfig {
            max_retries: 10,
            retry_delay_ms: 1_000,
            ..FailoverConfig::default()
        };
        let f = fixture(&["a", "b", "c", "d"], StickinessConfig::default(), cfg);
        let deadline = Instant::now() + Duration::from_millis(1_500);

        let err = f
            .coordinator
            .call_with_failover("s", deadline, |_server| async { Err::<(), _>("boom") })
            .await
            .unwrap_err();

        match err {
            BalancerError::FailoverExhausted { tried } => assert_eq!(tried.len(), 2),
            other => panic!("expected FailoverExhausted, got {:?}", other),
        }
        assert_eq!(f.coordinator.active_sessions(), 0);
    }
}
