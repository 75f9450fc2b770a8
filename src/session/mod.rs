//! The session controller.
//!
//! Joins the three inputs of a watched session: periodic snapshot polls, the
//! live event stream, and user actions (respond, branch, switch). Every
//! snapshot result is tagged with the session id it was fetched for and
//! dropped if the controller has moved on, so switching sessions needs no
//! cancellation token.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::subscription::DEFAULT_RETRY_DELAY;
use crate::client::{CockpitApi, EventSubscription};
use crate::config::CockpitConfig;
use crate::errors::{BranchError, ClientError};
use crate::lineage::Checkpoint;
use crate::lineage::branch::{self, NewSessionDescriptor};
use crate::live::{Applied, GhostSettings, LiveEvent, Reducer};
use crate::model::MessageFlow;
use crate::timeline::PhaseGroup;
use crate::timeline::cost::{CostSummary, CostSummaryCache};

/// How often ghost expiry is advanced while running.
const GHOST_TICK: Duration = Duration::from_millis(100);

/// `tokio::time::interval` rejects a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// No snapshot has arrived yet.
    Loading,
    /// The session exists but has not logged anything yet.
    WaitingForData,
    Ready,
}

/// The renderable result of the latest good snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineView {
    pub groups: Vec<PhaseGroup>,
    pub cost: CostSummary,
    pub total_messages: usize,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub poll_interval: Duration,
    pub ghosts: GhostSettings,
    pub stream_retry: Duration,
    pub research_session_limit: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            ghosts: GhostSettings::default(),
            stream_retry: DEFAULT_RETRY_DELAY,
            research_session_limit: 50,
        }
    }
}

impl From<&CockpitConfig> for ControllerSettings {
    fn from(config: &CockpitConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            ghosts: config.ghost_settings(),
            stream_retry: DEFAULT_RETRY_DELAY,
            research_session_limit: config.server.research_session_limit,
        }
    }
}

type SnapshotResult = (String, Result<MessageFlow, ClientError>);

pub struct SessionController<A: CockpitApi + ?Sized> {
    api: Arc<A>,
    settings: ControllerSettings,
    session_id: String,
    reducer: Reducer,
    view_state: ViewState,
    view: Option<TimelineView>,
    checkpoints: Vec<Checkpoint>,
    banner: Option<String>,
    cost_cache: CostSummaryCache,
    subscription: Option<EventSubscription>,
    epoch: Instant,
}

impl<A: CockpitApi + ?Sized + 'static> SessionController<A> {
    pub fn new(api: Arc<A>, session_id: impl Into<String>, settings: ControllerSettings) -> Self {
        let session_id = session_id.into();
        Self {
            reducer: Reducer::new(session_id.clone(), settings.ghosts),
            api,
            settings,
            session_id,
            view_state: ViewState::Loading,
            view: None,
            checkpoints: Vec::new(),
            banner: None,
            cost_cache: CostSummaryCache::new(),
            subscription: None,
            epoch: Instant::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn view_state(&self) -> ViewState {
        self.view_state
    }

    pub fn view(&self) -> Option<&TimelineView> {
        self.view.as_ref()
    }

    pub fn reducer(&self) -> &Reducer {
        &self.reducer
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn pending_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.iter().rev().find(|c| c.is_pending())
    }

    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    pub fn is_live(&self) -> bool {
        self.subscription.is_some()
    }

    /// Milliseconds since the controller was created.
    pub fn now_ms(&self) -> i64 {
        i64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    /// Start consuming the live event stream. Requires a tokio runtime.
    pub fn subscribe(&mut self) {
        if self.subscription.is_none() {
            self.subscription = Some(EventSubscription::spawn(
                self.api.clone(),
                self.settings.stream_retry,
            ));
        }
    }

    /// A session we are actively following that has produced no data yet.
    fn known_running(&self) -> bool {
        self.view.is_none() || self.reducer.status().is_active()
    }

    /// Apply the result of a snapshot fetch made for `session_id`.
    ///
    /// Returns false when the result was dropped because it belongs to a
    /// session the controller is no longer showing.
    pub fn apply_snapshot(
        &mut self,
        session_id: &str,
        result: Result<MessageFlow, ClientError>,
    ) -> bool {
        if session_id != self.session_id {
            debug!(stale = %session_id, current = %self.session_id, "Dropping stale snapshot");
            return false;
        }

        match result {
            Ok(flow) => {
                let cost = if flow.cost_summary == CostSummary::default() {
                    self.cost_cache.get(flow.log()).clone()
                } else {
                    flow.cost_summary.clone()
                };
                let first_snapshot = self.view.is_none();
                self.reducer.reconcile(&flow);
                if first_snapshot && !self.is_live() {
                    let now = self.now_ms();
                    self.reducer.replay_from_snapshot(flow.log(), now);
                }
                self.view = Some(TimelineView {
                    groups: flow.phase_groups(),
                    cost,
                    total_messages: flow.total_messages.max(flow.log().len()),
                });
                self.view_state = ViewState::Ready;
                self.banner = None;
            }
            Err(e) if e.is_waiting_for_data() && self.known_running() => {
                debug!(session = %self.session_id, "Waiting for first data");
                if self.view.is_none() {
                    self.view_state = ViewState::WaitingForData;
                }
            }
            Err(e) => {
                warn!(session = %self.session_id, error = %e, "Snapshot fetch failed");
                if self.view_state != ViewState::WaitingForData {
                    self.banner = Some(e.to_string());
                }
            }
        }
        true
    }

    /// Fetch and apply a fresh snapshot and the checkpoint list.
    pub async fn refresh(&mut self) {
        let session_id = self.session_id.clone();
        let result = self.api.message_flow(&session_id).await;
        if !self.apply_snapshot(&session_id, result) {
            return;
        }
        match self.api.checkpoints(&session_id).await {
            Ok(checkpoints) if session_id == self.session_id => self.checkpoints = checkpoints,
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Checkpoint fetch failed"),
        }
    }

    /// Feed one stream event to the reducer.
    pub fn handle_event(&mut self, event: &LiveEvent) -> Applied {
        let now = self.now_ms();
        self.reducer.apply(event, now)
    }

    /// Advance ghost expiry. Returns true if anything visible changed.
    pub fn tick(&mut self) -> bool {
        let now = self.now_ms();
        self.reducer.tick(now)
    }

    /// Submit a response to a pending checkpoint.
    pub async fn respond(&mut self, checkpoint_id: &str, response: &Value) -> Result<(), ClientError> {
        self.api.respond_to_checkpoint(checkpoint_id, response).await?;
        info!(checkpoint = %checkpoint_id, "Responded to checkpoint");
        self.reducer.user_responded();
        self.refresh().await;
        Ok(())
    }

    /// Fork the current session at a checkpoint and switch to the new one.
    ///
    /// On any error nothing about the controller changes.
    pub async fn branch(
        &mut self,
        checkpoint_index: usize,
        new_response: Value,
    ) -> Result<NewSessionDescriptor, BranchError> {
        let lineage = branch::resolve_lineage(
            self.api.as_ref(),
            &self.session_id,
            self.settings.research_session_limit,
        )
        .await?;
        let descriptor =
            branch::branch(self.api.as_ref(), &lineage, checkpoint_index, new_response).await?;
        self.switch_session(descriptor.new_session_id.clone());
        Ok(descriptor)
    }

    /// Follow a different session. Drops everything tied to the old one.
    pub fn switch_session(&mut self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        info!(from = %self.session_id, to = %session_id, "Switching session");
        let was_live = self.subscription.take().is_some();
        self.reducer = Reducer::new(session_id.clone(), self.settings.ghosts);
        self.session_id = session_id;
        self.view_state = ViewState::Loading;
        self.view = None;
        self.checkpoints.clear();
        self.banner = None;
        self.cost_cache.invalidate();
        if was_live {
            self.subscribe();
        }
    }

    fn spawn_fetch(&self, tx: &mpsc::Sender<SnapshotResult>) {
        let api = self.api.clone();
        let session_id = self.session_id.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = api.message_flow(&session_id).await;
            let _ = tx.send((session_id, result)).await;
        });
    }

    /// Drive the controller until `shutdown` resolves.
    ///
    /// Polls on a fixed interval, applies stream events as they arrive,
    /// refetches on milestone events and advances ghost expiry. `render` is
    /// called after every visible change.
    pub async fn run<F, R>(&mut self, shutdown: F, mut render: R)
    where
        F: Future<Output = ()>,
        R: FnMut(&Self),
    {
        self.subscribe();
        let (tx, mut rx) = mpsc::channel::<SnapshotResult>(16);
        let mut poll = tokio::time::interval(self.settings.poll_interval.max(MIN_POLL_INTERVAL));
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ghost_tick = tokio::time::interval(GHOST_TICK);
        ghost_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = poll.tick() => self.spawn_fetch(&tx),
                Some((session_id, result)) = rx.recv() => {
                    if self.apply_snapshot(&session_id, result) {
                        render(self);
                    }
                }
                Some(event) = next_event(&mut self.subscription) => {
                    let applied = self.handle_event(&event);
                    if applied.refetch {
                        self.spawn_fetch(&tx);
                    }
                    if applied.accepted {
                        render(self);
                    }
                }
                _ = ghost_tick.tick() => {
                    if self.tick() {
                        render(self);
                    }
                }
            }
        }
    }
}

async fn next_event(subscription: &mut Option<EventSubscription>) -> Option<LiveEvent> {
    match subscription {
        Some(sub) => sub.next().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::MockApi;
    use crate::lineage::{CheckpointStatus, ResearchSession, SessionStatus};
    use crate::live::{EventKind, OrchestrationStatus};
    use crate::model::Entry;
    use serde_json::json;

    fn flow(session_id: &str) -> MessageFlow {
        let entry = |ts: f64, phase: &str, cost: f64| Entry {
            timestamp: crate::model::Timestamp(ts),
            phase_name: Some(phase.into()),
            role: "assistant".into(),
            cost,
            ..Default::default()
        };
        let messages = vec![entry(1.0, "plan", 0.1), entry(2.0, "research", 0.2)];
        MessageFlow {
            session_id: session_id.into(),
            all_messages: messages.clone(),
            main_flow: messages,
            total_messages: 2,
            ..Default::default()
        }
    }

    fn controller(api: MockApi, session: &str) -> SessionController<MockApi> {
        SessionController::new(Arc::new(api), session, ControllerSettings::default())
    }

    fn checkpoint(id: &str, session: &str, status: CheckpointStatus) -> Checkpoint {
        Checkpoint {
            id: id.into(),
            session_id: session.into(),
            phase_name: None,
            status,
            ui_spec: Value::Null,
            response: None,
            summary: String::new(),
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_refresh_builds_view() {
        let mut c = controller(MockApi::default().with_flow(flow("s1")), "s1");
        assert_eq!(c.view_state(), ViewState::Loading);
        c.refresh().await;
        assert_eq!(c.view_state(), ViewState::Ready);
        let view = c.view().unwrap();
        assert_eq!(view.groups.len(), 2);
        assert!((view.cost.total_cost - 0.3).abs() < 1e-9);
        assert!(c.banner().is_none());
    }

    #[tokio::test]
    async fn test_waiting_for_data_is_not_an_error() {
        let mut c = controller(MockApi::default().with_waiting("s1"), "s1");
        c.refresh().await;
        assert_eq!(c.view_state(), ViewState::WaitingForData);
        assert!(c.banner().is_none());
    }

    #[tokio::test]
    async fn test_failure_keeps_last_view_and_sets_banner() {
        let api = Arc::new(MockApi::default().with_flow(flow("s1")));
        let mut c = SessionController::new(api.clone(), "s1", ControllerSettings::default());
        c.refresh().await;
        let before = c.view().cloned();

        api.set_failing(true);
        c.refresh().await;
        assert_eq!(c.view().cloned(), before);
        assert!(c.banner().unwrap().contains("503"));

        c.dismiss_banner();
        assert!(c.banner().is_none());

        api.set_failing(false);
        c.refresh().await;
        assert_eq!(c.view_state(), ViewState::Ready);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_dropped() {
        let mut c = controller(MockApi::default(), "s2");
        assert!(!c.apply_snapshot("s1", Ok(flow("s1"))));
        assert_eq!(c.view_state(), ViewState::Loading);
        assert!(c.view().is_none());
    }

    #[tokio::test]
    async fn test_events_drive_reducer() {
        let mut c = controller(MockApi::default(), "s1");
        let applied = c.handle_event(&LiveEvent::new(
            EventKind::ToolCall,
            "s1",
            json!({"tool_name": "search"}),
        ));
        assert!(applied.accepted);
        assert_eq!(c.reducer().status(), OrchestrationStatus::ToolRunning);
        assert_eq!(c.reducer().ghosts().len(), 1);
    }

    #[tokio::test]
    async fn test_respond_resumes_and_refreshes() {
        let api = Arc::new(
            MockApi::default()
                .with_flow(flow("s1"))
                .with_checkpoints(vec![checkpoint("cp-1", "s1", CheckpointStatus::Pending)]),
        );
        let mut c = SessionController::new(api.clone(), "s1", ControllerSettings::default());
        c.handle_event(&LiveEvent::new(EventKind::CheckpointWaiting, "s1", Value::Null));
        c.refresh().await;
        assert_eq!(c.pending_checkpoint().unwrap().id, "cp-1");

        c.respond("cp-1", &json!({"choice": "a"})).await.unwrap();
        assert_eq!(c.reducer().status(), OrchestrationStatus::Thinking);
        assert_eq!(api.responses(), vec![("cp-1".to_string(), json!({"choice": "a"}))]);
        assert!(c.pending_checkpoint().is_none());
        assert_eq!(api.flow_fetches(), 2);
    }

    fn research_session(checkpoint_status: CheckpointStatus) -> ResearchSession {
        ResearchSession {
            id: "rs-1".into(),
            original_session_id: "s1".into(),
            parent_session_id: None,
            branch_checkpoint_index: None,
            status: SessionStatus::Completed,
            checkpoints: vec![checkpoint("cp-0", "s1", checkpoint_status)],
            total_cost: 0.0,
            total_turns: 0,
            title: String::new(),
        }
    }

    #[tokio::test]
    async fn test_branch_switches_to_new_session() {
        let api = MockApi::default()
            .with_flow(flow("s1"))
            .with_research_sessions(vec![research_session(CheckpointStatus::Responded)])
            .with_branch_result("s2");
        let mut c = controller(api, "s1");
        c.refresh().await;

        let descriptor = c.branch(0, json!("other answer")).await.unwrap();
        assert_eq!(descriptor.new_session_id, "s2");
        assert_eq!(c.session_id(), "s2");
        assert_eq!(c.view_state(), ViewState::Loading);
        assert!(c.view().is_none());
        // A late result for the old session must not leak into the new view.
        assert!(!c.apply_snapshot("s1", Ok(flow("s1"))));
    }

    #[tokio::test]
    async fn test_failed_branch_changes_nothing() {
        let api = MockApi::default()
            .with_flow(flow("s1"))
            .with_research_sessions(vec![research_session(CheckpointStatus::Pending)])
            .with_branch_result("s2");
        let mut c = controller(api, "s1");
        c.refresh().await;

        let err = c.branch(0, json!("x")).await.unwrap_err();
        assert!(matches!(err, BranchError::InvalidBranchPoint { .. }));
        assert_eq!(c.session_id(), "s1");
        assert_eq!(c.view_state(), ViewState::Ready);
    }

    #[tokio::test]
    async fn test_unsaved_session_cannot_branch() {
        let mut c = controller(MockApi::default().with_flow(flow("s1")), "s1");
        let err = c.branch(0, json!("x")).await.unwrap_err();
        assert!(matches!(err, BranchError::SessionNotPersisted { .. }));
    }

    #[tokio::test]
    async fn test_run_survives_zero_poll_interval() {
        let mut config = CockpitConfig::default();
        config.polling.interval_ms = 0;
        let api = Arc::new(MockApi::default().with_flow(flow("s1")));

        let mut from_config =
            SessionController::new(api.clone(), "s1", ControllerSettings::from(&config));
        from_config
            .run(tokio::time::sleep(Duration::from_millis(50)), |_| {})
            .await;

        let settings = ControllerSettings {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        let mut direct = SessionController::new(api.clone(), "s1", settings);
        direct
            .run(tokio::time::sleep(Duration::from_millis(50)), |_| {})
            .await;

        assert!(api.flow_fetches() >= 2);
    }

    #[tokio::test]
    async fn test_run_applies_stream_and_polls() {
        let api = Arc::new(MockApi::default().with_flow(flow("s1")).with_events(vec![
            LiveEvent::new(EventKind::CascadeStart, "s1", Value::Null),
            LiveEvent::new(EventKind::ToolCall, "s1", json!({"tool": "fetch"})),
            LiveEvent::new(EventKind::ToolCall, "other", json!({"tool": "ignored"})),
            LiveEvent::new(EventKind::CheckpointCreated, "s1", Value::Null),
        ]));
        let settings = ControllerSettings {
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        };
        let mut c = SessionController::new(api.clone(), "s1", settings);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
        let mut done_tx = Some(done_tx);
        let mut renders = 0;

        let shutdown = async move {
            let _ = tokio::time::timeout(Duration::from_secs(5), done_rx).await;
        };
        c.run(shutdown, |c| {
            renders += 1;
            if c.view_state() == ViewState::Ready
                && c.reducer().status() == OrchestrationStatus::WaitingHuman
                && let Some(tx) = done_tx.take()
            {
                let _ = tx.send(());
            }
        })
        .await;

        assert!(renders > 0);
        assert!(c.is_live());
        assert_eq!(c.view_state(), ViewState::Ready);
        assert_eq!(c.reducer().status(), OrchestrationStatus::WaitingHuman);
        assert!(c.reducer().ghosts().is_empty());
        assert!(api.flow_fetches() >= 1);
    }
}
