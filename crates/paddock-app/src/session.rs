// Reconciliation loop: the async driver around `DraftEngine`.
//
// Polls the draft collaborator on a fixed schedule, ticks the countdown,
// runs user commands, and pushes snapshots to the UI. Fetches, submissions,
// and order creation run in spawned tasks that report back over a channel;
// results from a superseded fetch are dropped by generation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use paddock_core::config::Config;
use paddock_core::draft::autopick::AutoPickStrategy;
use paddock_core::draft::connectivity::ConnectivityTracker;
use paddock_core::draft::countdown::{DraftTimer, ExpirySignal};
use paddock_core::draft::engine::{CycleOutcome, DraftEngine, EngineSettings, FetchBatch};
use paddock_core::draft::order::DraftOrderEntry;
use paddock_core::draft::pick::{DraftPick, Driver};
use paddock_core::draft::turn::DraftPhase;
use paddock_core::error::{DraftError, ServiceError};
use paddock_core::protocol::{
    ConnectionStatus, OrderCreation, OrderRequest, PickRequest, UiUpdate, UserCommand,
};
use paddock_core::service::{create_or_fetch_order, DraftService};

/// Channel capacity for task results.
const TASK_CHANNEL_CAPACITY: usize = 32;

/// Loop parameters, usually derived from [`Config`].
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    pub tick_interval: Duration,
    pub fetch_timeout: Duration,
    /// `None` disables auto-pick on expiry.
    pub auto_pick: Option<AutoPickStrategy>,
    pub order_request: OrderRequest,
    pub engine: EngineSettings,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.reconcile.poll_interval_secs),
            tick_interval: Duration::from_millis(config.reconcile.tick_interval_ms),
            fetch_timeout: Duration::from_secs(config.reconcile.fetch_timeout_secs),
            auto_pick: config
                .auto_pick
                .enabled
                .then_some(config.auto_pick.strategy),
            order_request: OrderRequest {
                method: config.draft.method,
                snake_base: config.draft.snake_base,
            },
            engine: EngineSettings {
                my_team_id: config.league.my_team_id,
                slots_per_team: config.league.draftable_slots_per_team,
                turn_seconds: config.draft.turn_seconds,
                offline_after_failures: config.reconcile.offline_after_failures,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Task plumbing
// ---------------------------------------------------------------------------

/// A spawned task that is aborted when replaced or dropped.
#[derive(Default)]
struct TaskSlot(Option<JoinHandle<()>>);

impl TaskSlot {
    fn replace(&mut self, handle: JoinHandle<()>) {
        self.cancel();
        self.0 = Some(handle);
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// What a fetch task should pull.
#[derive(Debug, Clone, Copy)]
enum FetchPlan {
    /// No engine yet: order, catalog, and a full cycle.
    Bootstrap,
    Cycle { since: Option<u32>, pool: bool },
}

enum Fetched {
    Bootstrap {
        order: Vec<DraftOrderEntry>,
        drivers: Vec<Driver>,
        batch: FetchBatch,
    },
    Cycle(FetchBatch),
}

enum TaskEvent {
    Fetched {
        generation: u64,
        result: Result<Fetched, ServiceError>,
    },
    Submitted {
        request: PickRequest,
        result: Result<DraftPick, ServiceError>,
    },
    OrderCreated(Result<OrderCreation, ServiceError>),
}

async fn fetch_cycle(
    service: &dyn DraftService,
    since: Option<u32>,
    pool: bool,
) -> Result<FetchBatch, ServiceError> {
    let status = service.fetch_status().await?;
    let picks = service.fetch_picks(since).await?;
    let available = if pool {
        Some(service.fetch_available_drivers().await?)
    } else {
        None
    };
    Ok(FetchBatch {
        status,
        picks,
        available,
        full: since.is_none(),
    })
}

async fn run_plan(service: &dyn DraftService, plan: FetchPlan) -> Result<Fetched, ServiceError> {
    match plan {
        FetchPlan::Bootstrap => {
            let order = service.fetch_draft_order().await?;
            let drivers = service.fetch_drivers().await?;
            let batch = fetch_cycle(service, None, true).await?;
            Ok(Fetched::Bootstrap {
                order,
                drivers,
                batch,
            })
        }
        FetchPlan::Cycle { since, pool } => {
            fetch_cycle(service, since, pool).await.map(Fetched::Cycle)
        }
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout {
            secs: timeout.as_secs(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

struct Session {
    service: Arc<dyn DraftService>,
    settings: SessionSettings,
    ui_tx: mpsc::Sender<UiUpdate>,
    events_tx: mpsc::Sender<TaskEvent>,

    engine: Option<DraftEngine>,
    /// Link health before the engine exists.
    bootstrap_link: ConnectivityTracker,
    /// A configuration error that stops reconciliation.
    halted: bool,
    order_missing_reported: bool,

    generation: u64,
    fetch_in_flight: bool,
    refresh_queued: bool,
    fetch_task: TaskSlot,

    submitting: Option<PickRequest>,
    submit_task: TaskSlot,
    creating_order: bool,
    order_task: TaskSlot,

    last_timer: Option<DraftTimer>,
}

impl Session {
    fn new(
        service: Arc<dyn DraftService>,
        settings: SessionSettings,
        ui_tx: mpsc::Sender<UiUpdate>,
        events_tx: mpsc::Sender<TaskEvent>,
    ) -> Self {
        let offline_after = settings.engine.offline_after_failures;
        Self {
            service,
            settings,
            ui_tx,
            events_tx,
            engine: None,
            bootstrap_link: ConnectivityTracker::new(offline_after),
            halted: false,
            order_missing_reported: false,
            generation: 0,
            fetch_in_flight: false,
            refresh_queued: false,
            fetch_task: TaskSlot::default(),
            submitting: None,
            submit_task: TaskSlot::default(),
            creating_order: false,
            order_task: TaskSlot::default(),
            last_timer: None,
        }
    }

    async fn send(&self, update: UiUpdate) {
        let _ = self.ui_tx.send(update).await;
    }

    fn draft_complete(&self) -> bool {
        self.engine
            .as_ref()
            .is_some_and(|e| e.phase() == DraftPhase::Completed)
    }

    // -----------------------------------------------------------------------
    // Fetching
    // -----------------------------------------------------------------------

    /// Scheduled cycle. Skipped while a fetch is outstanding or once the
    /// draft is complete.
    fn on_poll(&mut self) {
        if self.halted || self.draft_complete() {
            return;
        }
        if self.fetch_in_flight {
            debug!("Poll skipped: fetch still in flight");
            return;
        }
        self.start_fetch();
    }

    /// Manual refresh. Runs now, or right after the outstanding fetch.
    fn request_refresh(&mut self) {
        if self.halted {
            return;
        }
        if self.fetch_in_flight {
            self.refresh_queued = true;
        } else {
            self.start_fetch();
        }
    }

    fn start_fetch(&mut self) {
        let plan = match &self.engine {
            None => FetchPlan::Bootstrap,
            Some(engine) => FetchPlan::Cycle {
                since: engine.picks_since(),
                pool: engine.wants_available_pool(),
            },
        };
        self.generation += 1;
        let generation = self.generation;
        self.fetch_in_flight = true;
        self.refresh_queued = false;
        debug!("Fetch #{} started: {:?}", generation, plan);

        let service = Arc::clone(&self.service);
        let tx = self.events_tx.clone();
        let timeout = self.settings.fetch_timeout;
        self.fetch_task.replace(tokio::spawn(async move {
            let result = with_timeout(timeout, run_plan(service.as_ref(), plan)).await;
            let _ = tx.send(TaskEvent::Fetched { generation, result }).await;
        }));
    }

    async fn on_fetched(&mut self, generation: u64, result: Result<Fetched, ServiceError>) {
        if generation != self.generation {
            debug!(
                "Discarding stale fetch #{} (current #{})",
                generation, self.generation
            );
            return;
        }
        self.fetch_in_flight = false;

        match result {
            Ok(Fetched::Bootstrap {
                order,
                drivers,
                batch,
            }) => self.on_bootstrap(order, drivers, batch).await,
            Ok(Fetched::Cycle(batch)) => {
                if let Some(engine) = self.engine.as_mut() {
                    let outcome = engine.apply_fetch(batch);
                    self.on_outcome(outcome).await;
                }
            }
            Err(e) => self.on_fetch_error(e).await,
        }

        if self.refresh_queued && !self.fetch_in_flight {
            self.start_fetch();
        }
    }

    async fn on_bootstrap(
        &mut self,
        order: Vec<DraftOrderEntry>,
        drivers: Vec<Driver>,
        batch: FetchBatch,
    ) {
        let method = batch.status.draft_method;
        let mut engine = match DraftEngine::new(order, method, self.settings.engine.clone()) {
            Ok(engine) => engine,
            Err(e) => {
                error!("Cannot start draft engine: {}", e);
                self.halted = true;
                self.send(UiUpdate::Error(format!("Draft cannot start: {e}")))
                    .await;
                return;
            }
        };
        info!(
            "Draft session ready: {} drivers in catalog, method {}",
            drivers.len(),
            method.as_str()
        );
        engine.set_driver_catalog(drivers);
        let outcome = engine.apply_fetch(batch);
        self.engine = Some(engine);
        self.on_outcome(outcome).await;
    }

    async fn on_outcome(&mut self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Applied { phase_change, .. } => {
                if let Some(change) = phase_change {
                    info!(
                        "Draft phase: {} -> {}",
                        change.from.label(),
                        change.to.label()
                    );
                    if change.to == DraftPhase::Completed {
                        if let Some(engine) = self.engine.as_mut() {
                            engine.close();
                        }
                        self.send(UiUpdate::Notice("Draft complete".into())).await;
                    }
                }
                self.publish().await;
            }
            CycleOutcome::RefetchRequired(fault) => {
                debug!("Refetching full pick log after: {}", fault);
                self.start_fetch();
            }
            CycleOutcome::Faulted(fault) => {
                self.publish().await;
                self.send(UiUpdate::Error(format!("Draft data inconsistent: {fault}")))
                    .await;
            }
        }
    }

    async fn on_fetch_error(&mut self, err: ServiceError) {
        if self.engine.is_none() && matches!(err, ServiceError::NotFound(_)) {
            // The server answered; there is just no order yet.
            if let Some(status) = self.bootstrap_link.record_success() {
                self.send(UiUpdate::ConnectionStatus(status)).await;
            }
            if !self.order_missing_reported {
                self.order_missing_reported = true;
                info!("No draft order yet");
                self.send(UiUpdate::Notice(
                    "No draft order yet. Press o to create it.".into(),
                ))
                .await;
            }
            return;
        }

        warn!("Reconciliation cycle failed: {}", DraftError::TransientFetch(err.clone()));
        let change = match self.engine.as_mut() {
            Some(engine) => engine.record_fetch_failure(&err),
            None => self.bootstrap_link.record_failure(err.to_string()),
        };
        if let Some(status) = change {
            self.send(UiUpdate::ConnectionStatus(status)).await;
            if status == ConnectionStatus::Offline {
                self.send(UiUpdate::Error(format!("Draft server unreachable: {err}")))
                    .await;
            }
        }
    }

    async fn publish(&mut self) {
        if let Some(engine) = &self.engine {
            let snapshot = engine.snapshot();
            self.last_timer = snapshot.timer;
            self.send(UiUpdate::Snapshot(Box::new(snapshot))).await;
        }
    }

    // -----------------------------------------------------------------------
    // Countdown
    // -----------------------------------------------------------------------

    async fn on_tick(&mut self) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let signal = engine.tick();
        let timer = engine.countdown().timer();
        if timer != self.last_timer {
            self.last_timer = timer;
            self.send(UiUpdate::Timer(timer)).await;
        }
        if let Some(signal) = signal {
            self.on_expiry(signal).await;
        }
    }

    async fn on_expiry(&mut self, signal: ExpirySignal) {
        let Some(strategy) = self.settings.auto_pick else {
            self.send(UiUpdate::Notice("Your turn clock has run out".into()))
                .await;
            return;
        };
        let Some(engine) = &self.engine else {
            return;
        };
        match engine.propose_auto_pick(signal, strategy) {
            Ok(Some(request)) => self.start_submit(request).await,
            Ok(None) => debug!("Expiry for a turn that has moved on; ignored"),
            Err(e) => {
                error!("Auto-pick failed: {}", e);
                self.send(UiUpdate::Error(format!("Auto-pick failed: {e}")))
                    .await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Submissions
    // -----------------------------------------------------------------------

    async fn start_submit(&mut self, request: PickRequest) {
        if self.submitting.is_some() {
            self.send(UiUpdate::Notice(
                "A pick is already being submitted".into(),
            ))
            .await;
            return;
        }
        info!(
            "Submitting pick #{}: driver {} for team {}{}",
            request.pick_number,
            request.driver_id,
            request.team_id,
            if request.is_auto_pick { " (auto)" } else { "" }
        );
        self.submitting = Some(request);

        let service = Arc::clone(&self.service);
        let tx = self.events_tx.clone();
        let timeout = self.settings.fetch_timeout;
        self.submit_task.replace(tokio::spawn(async move {
            let result = with_timeout(timeout, service.submit_pick(request)).await;
            let _ = tx.send(TaskEvent::Submitted { request, result }).await;
        }));
    }

    async fn on_submitted(
        &mut self,
        request: PickRequest,
        result: Result<DraftPick, ServiceError>,
    ) {
        self.submitting = None;
        match result {
            Ok(pick) => {
                info!(
                    "Pick #{} recorded: driver {}",
                    pick.pick_number, pick.driver_id
                );
                self.request_refresh();
            }
            Err(ServiceError::SlotTaken) if request.is_auto_pick => {
                debug!(
                    "Auto-pick for #{} lost to the server; turn already advanced",
                    request.pick_number
                );
                self.request_refresh();
            }
            Err(e) if e.is_submission_conflict() => {
                warn!("Pick #{} rejected: {}", request.pick_number, e);
                if let Some(engine) = self.engine.as_mut() {
                    engine.invalidate_pool();
                }
                self.send(UiUpdate::Notice(format!(
                    "Pick rejected ({e}). Refreshing the board."
                )))
                .await;
                self.request_refresh();
            }
            Err(e) => {
                error!("Pick #{} submission failed: {}", request.pick_number, e);
                self.send(UiUpdate::Error(format!("Pick not submitted: {e}")))
                    .await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Order creation
    // -----------------------------------------------------------------------

    fn start_create_order(&mut self) {
        if self.creating_order {
            return;
        }
        self.creating_order = true;
        let service = Arc::clone(&self.service);
        let tx = self.events_tx.clone();
        let request = self.settings.order_request;
        let timeout = self.settings.fetch_timeout;
        self.order_task.replace(tokio::spawn(async move {
            let result = with_timeout(
                timeout,
                create_or_fetch_order(service.as_ref(), request),
            )
            .await;
            let _ = tx.send(TaskEvent::OrderCreated(result)).await;
        }));
    }

    async fn on_order_created(&mut self, result: Result<OrderCreation, ServiceError>) {
        self.creating_order = false;
        match result {
            Ok(creation) => {
                let names: Vec<&str> = creation
                    .order()
                    .iter()
                    .map(|e| e.team_name.as_str())
                    .collect();
                let verb = match creation {
                    OrderCreation::Created(_) => "created",
                    OrderCreation::Existing(_) => "already set",
                };
                self.send(UiUpdate::Notice(format!(
                    "Draft order {verb}: {}",
                    names.join(", ")
                )))
                .await;
                self.request_refresh();
            }
            Err(e) => {
                error!("Order creation failed: {}", e);
                self.send(UiUpdate::Error(format!("Could not create draft order: {e}")))
                    .await;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    async fn on_command(&mut self, cmd: UserCommand) {
        match cmd {
            UserCommand::Refresh => {
                info!("Manual refresh requested");
                self.request_refresh();
            }
            UserCommand::SubmitPick { driver_id } => {
                let prepared = match &self.engine {
                    Some(engine) => engine.prepare_pick(driver_id),
                    None => Err(DraftError::Configuration("draft not loaded yet".into())),
                };
                match prepared {
                    Ok(request) => self.start_submit(request).await,
                    Err(e) => self.send(UiUpdate::Notice(e.to_string())).await,
                }
            }
            UserCommand::CreateOrder => self.start_create_order(),
            // Handled by the loop.
            UserCommand::Quit => {}
        }
    }

    fn shutdown(&mut self) {
        self.fetch_task.cancel();
        self.submit_task.cancel();
        self.order_task.cancel();
        if let Some(engine) = self.engine.as_mut() {
            engine.close();
        }
    }
}

/// Run the reconciliation loop until quit, or until either channel closes.
pub async fn run(
    service: Arc<dyn DraftService>,
    settings: SessionSettings,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<UiUpdate>,
) -> anyhow::Result<()> {
    info!("Draft session loop started");

    let (events_tx, mut events_rx) = mpsc::channel(TASK_CHANNEL_CAPACITY);

    let mut poll = tokio::time::interval(settings.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick = tokio::time::interval(settings.tick_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the countdown starts one
    // interval from now.
    tick.tick().await;

    let mut session = Session::new(service, settings, ui_tx.clone(), events_tx);
    session
        .send(UiUpdate::ConnectionStatus(ConnectionStatus::Connecting))
        .await;

    loop {
        tokio::select! {
            // --- Reconciliation schedule ---
            _ = poll.tick() => {
                session.on_poll();
            }

            // --- Countdown ---
            _ = tick.tick() => {
                session.on_tick().await;
            }

            // --- Task results ---
            Some(event) = events_rx.recv() => {
                match event {
                    TaskEvent::Fetched { generation, result } => {
                        session.on_fetched(generation, result).await;
                    }
                    TaskEvent::Submitted { request, result } => {
                        session.on_submitted(request, result).await;
                    }
                    TaskEvent::OrderCreated(result) => {
                        session.on_order_created(result).await;
                    }
                }
            }

            // --- User commands ---
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UserCommand::Quit) => {
                        info!("Quit command received, shutting down");
                        break;
                    }
                    Some(cmd) => session.on_command(cmd).await,
                    None => {
                        info!("Command channel closed, shutting down");
                        break;
                    }
                }
            }

            // --- UI gone ---
            _ = ui_tx.closed() => {
                info!("UI channel closed, shutting down");
                break;
            }
        }
    }

    session.shutdown();
    info!("Draft session loop exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use paddock_core::draft::order::{BaseOrder, DraftMethod, TeamRef};
    use paddock_core::protocol::{DraftStatus, EngineSnapshot};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Collaborator whose reads always fail.
    struct Unreachable {
        calls: AtomicU32,
    }

    #[async_trait]
    impl DraftService for Unreachable {
        async fn fetch_status(&self) -> Result<DraftStatus, ServiceError> {
            Err(ServiceError::Transport("refused".into()))
        }
        async fn fetch_picks(&self, _: Option<u32>) -> Result<Vec<DraftPick>, ServiceError> {
            Err(ServiceError::Transport("refused".into()))
        }
        async fn fetch_available_drivers(&self) -> Result<Vec<Driver>, ServiceError> {
            Err(ServiceError::Transport("refused".into()))
        }
        async fn fetch_drivers(&self) -> Result<Vec<Driver>, ServiceError> {
            Err(ServiceError::Transport("refused".into()))
        }
        async fn fetch_draft_order(&self) -> Result<Vec<DraftOrderEntry>, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Transport("refused".into()))
        }
        async fn submit_pick(&self, _: PickRequest) -> Result<DraftPick, ServiceError> {
            Err(ServiceError::Transport("refused".into()))
        }
        async fn create_draft_order(
            &self,
            _: OrderRequest,
        ) -> Result<Vec<DraftOrderEntry>, ServiceError> {
            Err(ServiceError::Transport("refused".into()))
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            poll_interval: Duration::from_secs(3),
            tick_interval: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(2),
            auto_pick: Some(AutoPickStrategy::HighestRanked),
            order_request: OrderRequest {
                method: DraftMethod::Snake,
                snake_base: BaseOrder::Sequential,
            },
            engine: EngineSettings {
                my_team_id: Some(1),
                slots_per_team: 2,
                turn_seconds: 60,
                offline_after_failures: 3,
            },
        }
    }

    #[tokio::test]
    async fn session_loop_handles_quit_command() {
        let service = Arc::new(Unreachable {
            calls: AtomicU32::new(0),
        });
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ui_tx, _ui_rx) = mpsc::channel(64);

        let handle = tokio::spawn(run(service, settings(), cmd_rx, ui_tx));
        cmd_tx.send(UserCommand::Quit).await.unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn session_loop_exits_when_command_channel_closes() {
        let service = Arc::new(Unreachable {
            calls: AtomicU32::new(0),
        });
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ui_tx, _ui_rx) = mpsc::channel(64);

        let handle = tokio::spawn(run(service, settings(), cmd_rx, ui_tx));
        drop(cmd_tx);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn session_loop_exits_when_ui_goes_away() {
        let service = Arc::new(Unreachable {
            calls: AtomicU32::new(0),
        });
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ui_tx, ui_rx) = mpsc::channel(64);

        let handle = tokio::spawn(run(service, settings(), cmd_rx, ui_tx));
        drop(ui_rx);
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_failures_go_offline() {
        let service = Arc::new(Unreachable {
            calls: AtomicU32::new(0),
        });
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ui_tx, mut ui_rx) = mpsc::channel(64);
        let handle = tokio::spawn(run(service.clone(), settings(), cmd_rx, ui_tx));

        let mut statuses = Vec::new();
        let mut offline_error = false;
        while let Some(update) = ui_rx.recv().await {
            match update {
                UiUpdate::ConnectionStatus(s) => statuses.push(s),
                UiUpdate::Error(msg) if msg.contains("unreachable") => {
                    offline_error = true;
                    break;
                }
                _ => {}
            }
        }

        assert_eq!(statuses.first(), Some(&ConnectionStatus::Connecting));
        assert_eq!(statuses.last(), Some(&ConnectionStatus::Offline));
        assert!(offline_error);
        assert!(service.calls.load(Ordering::SeqCst) >= 3);

        cmd_tx.send(UserCommand::Quit).await.unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    // -----------------------------------------------------------------------
    // Scripted collaborator: two teams, sequential order, mutable feed
    // -----------------------------------------------------------------------

    struct Scripted {
        started: Instant,
        status: Mutex<DraftStatus>,
        picks: Mutex<Vec<DraftPick>>,
        /// Incremental pick fetches come back empty, like a lagging replica.
        hide_incremental: AtomicBool,
        submit_error: Option<ServiceError>,
        status_calls: Mutex<Vec<Duration>>,
        full_pick_fetches: AtomicU32,
        incremental_pick_fetches: AtomicU32,
        pool_fetches: AtomicU32,
        submitted: Mutex<Vec<PickRequest>>,
    }

    impl Scripted {
        fn new(status: DraftStatus, submit_error: Option<ServiceError>) -> Arc<Self> {
            Arc::new(Self {
                started: Instant::now(),
                status: Mutex::new(status),
                picks: Mutex::new(Vec::new()),
                hide_incremental: AtomicBool::new(false),
                submit_error,
                status_calls: Mutex::new(Vec::new()),
                full_pick_fetches: AtomicU32::new(0),
                incremental_pick_fetches: AtomicU32::new(0),
                pool_fetches: AtomicU32::new(0),
                submitted: Mutex::new(Vec::new()),
            })
        }

        fn status_calls(&self) -> Vec<Duration> {
            self.status_calls.lock().unwrap().clone()
        }

        fn submitted(&self) -> Vec<PickRequest> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DraftService for Scripted {
        async fn fetch_status(&self) -> Result<DraftStatus, ServiceError> {
            self.status_calls
                .lock()
                .unwrap()
                .push(self.started.elapsed());
            Ok(self.status.lock().unwrap().clone())
        }
        async fn fetch_picks(&self, since: Option<u32>) -> Result<Vec<DraftPick>, ServiceError> {
            match since {
                None => {
                    self.full_pick_fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(self.picks.lock().unwrap().clone())
                }
                Some(since) => {
                    self.incremental_pick_fetches.fetch_add(1, Ordering::SeqCst);
                    if self.hide_incremental.load(Ordering::SeqCst) {
                        return Ok(Vec::new());
                    }
                    Ok(self
                        .picks
                        .lock()
                        .unwrap()
                        .iter()
                        .filter(|p| p.pick_number > since)
                        .cloned()
                        .collect())
                }
            }
        }
        async fn fetch_available_drivers(&self) -> Result<Vec<Driver>, ServiceError> {
            self.pool_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(pool())
        }
        async fn fetch_drivers(&self) -> Result<Vec<Driver>, ServiceError> {
            Ok(pool())
        }
        async fn fetch_draft_order(&self) -> Result<Vec<DraftOrderEntry>, ServiceError> {
            Ok(order())
        }
        async fn submit_pick(&self, request: PickRequest) -> Result<DraftPick, ServiceError> {
            self.submitted.lock().unwrap().push(request);
            match &self.submit_error {
                Some(err) => Err(err.clone()),
                None => Ok(pick(request.pick_number, request.team_id, request.driver_id)),
            }
        }
        async fn create_draft_order(
            &self,
            _: OrderRequest,
        ) -> Result<Vec<DraftOrderEntry>, ServiceError> {
            Err(ServiceError::OrderExists)
        }
    }

    fn order() -> Vec<DraftOrderEntry> {
        vec![
            DraftOrderEntry {
                draft_position_number: 1,
                team_id: 1,
                team_name: "Apex".into(),
            },
            DraftOrderEntry {
                draft_position_number: 2,
                team_id: 2,
                team_name: "Box Box".into(),
            },
        ]
    }

    fn driver(id: i64, name: &str, points: f64) -> Driver {
        Driver {
            id,
            number: Some(id as u32),
            name: name.into(),
            constructor: "Ferrari".into(),
            season_points: points,
        }
    }

    fn pool() -> Vec<Driver> {
        vec![
            driver(1, "Max Verstappen", 110.0),
            driver(4, "Lando Norris", 125.0),
            driver(44, "Lewis Hamilton", 90.0),
        ]
    }

    fn pick(pick_number: u32, team_id: i64, driver_id: i64) -> DraftPick {
        DraftPick {
            id: i64::from(pick_number),
            round: 1,
            pick_number,
            team_id,
            driver_id,
            is_auto_pick: false,
            created_at: Default::default(),
        }
    }

    /// Round 1 status with `made` picks behind it.
    fn status(made: u32, remaining: Option<u32>) -> DraftStatus {
        let position = made + 1;
        DraftStatus {
            draft_method: DraftMethod::Sequential,
            is_draft_complete: false,
            total_teams: 2,
            total_picks_made: made,
            current_round: 1,
            current_position: position,
            current_team: order()
                .into_iter()
                .find(|e| e.draft_position_number == position)
                .map(|e| TeamRef {
                    team_id: e.team_id,
                    team_name: e.team_name,
                }),
            next_pick: None,
            time_remaining_seconds: remaining,
            is_draft_paused: false,
        }
    }

    fn sequential_settings() -> SessionSettings {
        let mut s = settings();
        s.order_request.method = DraftMethod::Sequential;
        s
    }

    async fn next_snapshot(ui_rx: &mut mpsc::Receiver<UiUpdate>) -> EngineSnapshot {
        loop {
            match ui_rx.recv().await {
                Some(UiUpdate::Snapshot(snapshot)) => return *snapshot,
                Some(UiUpdate::Error(msg)) => panic!("unexpected error: {msg}"),
                Some(_) => {}
                None => panic!("session closed the UI channel"),
            }
        }
    }

    async fn stop(
        cmd_tx: mpsc::Sender<UserCommand>,
        handle: JoinHandle<anyhow::Result<()>>,
        mut ui_rx: mpsc::Receiver<UiUpdate>,
    ) -> Vec<UiUpdate> {
        cmd_tx.send(UserCommand::Quit).await.unwrap();
        assert!(handle.await.unwrap().is_ok());
        let mut rest = Vec::new();
        while let Some(update) = ui_rx.recv().await {
            rest.push(update);
        }
        rest
    }

    #[tokio::test(start_paused = true)]
    async fn incremental_gap_triggers_full_refetch() {
        let service = Scripted::new(status(0, None), None);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ui_tx, mut ui_rx) = mpsc::channel(256);
        let handle = tokio::spawn(run(service.clone(), sequential_settings(), cmd_rx, ui_tx));

        let first = next_snapshot(&mut ui_rx).await;
        assert!(first.picks.is_empty());
        assert_eq!(service.full_pick_fetches.load(Ordering::SeqCst), 1);

        // The server moves on, but incremental reads miss the new pick.
        service.picks.lock().unwrap().push(pick(1, 1, 4));
        *service.status.lock().unwrap() = status(1, None);
        service.hide_incremental.store(true, Ordering::SeqCst);
        cmd_tx.send(UserCommand::Refresh).await.unwrap();

        let healed = next_snapshot(&mut ui_rx).await;
        assert_eq!(healed.picks.len(), 1);
        assert_eq!(healed.picks[0].driver_id, 4);
        assert!(healed.fault.is_none());
        assert_eq!(healed.current.as_ref().map(|s| s.team_id), Some(2));
        assert_eq!(service.incremental_pick_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(service.full_pick_fetches.load(Ordering::SeqCst), 2);

        let rest = stop(cmd_tx, handle, ui_rx).await;
        assert!(!rest.iter().any(|u| matches!(u, UiUpdate::Error(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_count_mismatch_is_reported() {
        let service = Scripted::new(status(3, None), None);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ui_tx, mut ui_rx) = mpsc::channel(256);
        let handle = tokio::spawn(run(service.clone(), sequential_settings(), cmd_rx, ui_tx));

        let mut faulted_snapshot = None;
        let message = loop {
            match ui_rx.recv().await {
                Some(UiUpdate::Snapshot(s)) => faulted_snapshot = Some(*s),
                Some(UiUpdate::Error(msg)) => break msg,
                Some(_) => {}
                None => panic!("session closed the UI channel"),
            }
        };
        assert_eq!(
            message,
            "Draft data inconsistent: server reports 3 picks made, observed log has 0"
        );
        let snapshot = faulted_snapshot.expect("snapshot published before the error");
        assert!(snapshot.fault.is_some());

        stop(cmd_tx, handle, ui_rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_runs_now_and_keeps_poll_schedule() {
        let service = Scripted::new(status(0, None), None);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ui_tx, mut ui_rx) = mpsc::channel(256);
        let handle = tokio::spawn(run(service.clone(), sequential_settings(), cmd_rx, ui_tx));

        next_snapshot(&mut ui_rx).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        cmd_tx.send(UserCommand::Refresh).await.unwrap();
        next_snapshot(&mut ui_rx).await;
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let calls = service.status_calls();
        assert_eq!(calls.len(), 3, "bootstrap, refresh, one poll: {calls:?}");
        assert!(calls[0] < Duration::from_secs(1));
        assert!(calls[1] >= Duration::from_secs(1) && calls[1] < Duration::from_secs(2));
        // Still on the original 3s grid, not 3s after the refresh.
        assert!(calls[2] >= Duration::from_secs(3) && calls[2] < Duration::from_secs(4));

        stop(cmd_tx, handle, ui_rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn auto_pick_losing_the_slot_is_silent() {
        let service = Scripted::new(status(0, Some(2)), Some(ServiceError::SlotTaken));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ui_tx, mut ui_rx) = mpsc::channel(256);
        let handle = tokio::spawn(run(service.clone(), sequential_settings(), cmd_rx, ui_tx));

        let first = next_snapshot(&mut ui_rx).await;
        assert!(first.is_my_turn);
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let submitted = service.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].is_auto_pick);
        assert_eq!(submitted[0].driver_id, 4);
        assert_eq!(submitted[0].pick_number, 1);
        // The rejection is followed by a refresh.
        assert_eq!(service.status_calls().len(), 2);

        let rest = stop(cmd_tx, handle, ui_rx).await;
        assert!(
            !rest
                .iter()
                .any(|u| matches!(u, UiUpdate::Notice(_) | UiUpdate::Error(_))),
            "{rest:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_manual_pick_refreshes_with_notice() {
        let service = Scripted::new(
            status(0, Some(60)),
            Some(ServiceError::DriverUnavailable { driver_id: 44 }),
        );
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (ui_tx, mut ui_rx) = mpsc::channel(256);
        let handle = tokio::spawn(run(service.clone(), sequential_settings(), cmd_rx, ui_tx));

        let first = next_snapshot(&mut ui_rx).await;
        assert!(first.is_my_turn);
        let status_before = service.status_calls().len();
        let pool_before = service.pool_fetches.load(Ordering::SeqCst);

        cmd_tx
            .send(UserCommand::SubmitPick { driver_id: 44 })
            .await
            .unwrap();
        let notice = loop {
            match ui_rx.recv().await {
                Some(UiUpdate::Notice(msg)) => break msg,
                Some(UiUpdate::Error(msg)) => panic!("unexpected error: {msg}"),
                Some(_) => {}
                None => panic!("session closed the UI channel"),
            }
        };
        assert!(notice.starts_with("Pick rejected"), "{notice}");
        assert!(notice.contains("driver 44"), "{notice}");

        next_snapshot(&mut ui_rx).await;
        assert!(service.status_calls().len() > status_before);
        assert!(service.pool_fetches.load(Ordering::SeqCst) > pool_before);
        let submitted = service.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(!submitted[0].is_auto_pick);

        stop(cmd_tx, handle, ui_rx).await;
    }
}
