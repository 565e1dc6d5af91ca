// LiveEngine - facade wiring clock, scheduler, transport and voices

use crate::clock::{BeatClock, BeatPosition, Meter, Tempo};
use crate::config::EngineConfig;
use crate::error::{ActionError, EngineResult};
use crate::messaging::channels::{NotificationConsumer, create_notification_channel};
use crate::messaging::notification::{Notification, NotificationCategory, Notifier};
use crate::sched::job::{Job, JobContext};
use crate::sched::queue::{PRIORITY_CONTROL, PRIORITY_NOTE};
use crate::sched::scheduler::{Scheduler, SchedulerHandle};
use crate::sync::client::{ClockSyncClient, SyncStatus};
use crate::sync::server::ClockSyncServer;
use crate::transport::link::Transport;
use crate::transport::sink::{MessageSink, UdpSink};
use crate::voice::pattern::Pattern;
use crate::voice::player::VoiceRegistry;
use ringbuf::traits::Consumer;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

/// One running scheduling session.
///
/// Owns the clock, the scheduler thread, the transport worker and the
/// voice registry; optionally a sync server and/or client. All methods
/// are callable from any thread while the scheduler runs.
pub struct LiveEngine {
    config: EngineConfig,
    clock: Arc<BeatClock>,
    handle: SchedulerHandle,
    scheduler: Scheduler,
    transport: Transport,
    voices: Arc<VoiceRegistry>,
    notifier: Notifier,
    notifications_rx: Mutex<NotificationConsumer>,
    sync_server: Option<ClockSyncServer>,
    sync_client: Option<ClockSyncClient>,
}

impl LiveEngine {
    /// Start a session sending to the UDP target from the config.
    pub fn start(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let sink = UdpSink::connect(&config.transport.target)?;
        Self::start_with_sink(config, Box::new(sink))
    }

    /// Start a session against an arbitrary sink (in-process engines,
    /// test capture).
    pub fn start_with_sink(config: EngineConfig, sink: Box<dyn MessageSink>) -> EngineResult<Self> {
        config.validate()?;

        let clock = Arc::new(BeatClock::new(config.tempo(), config.meter()));
        let (ntx, nrx) = create_notification_channel(config.notification_capacity);
        let notifier = Notifier::new(ntx);

        let transport = Transport::start(sink, config.transport.queue_capacity, notifier.clone());
        let ctx = JobContext::new(Arc::clone(&clock), transport.link(), notifier.clone());
        let scheduler = Scheduler::start(ctx);
        let handle = scheduler.handle();

        log::info!(
            "engine started at {} {}, sending to {}",
            config.tempo(),
            config.meter(),
            config.transport.target
        );

        Ok(Self {
            config,
            clock,
            handle,
            scheduler,
            transport,
            voices: Arc::new(VoiceRegistry::new()),
            notifier,
            notifications_rx: Mutex::new(nrx),
            sync_server: None,
            sync_client: None,
        })
    }

    // --- voices ---

    /// Start a named voice, or hot-swap the pattern of a running one.
    pub fn play(&self, name: &str, pattern: Pattern) -> EngineResult<()> {
        self.voices
            .play(name, pattern, &self.handle, self.config.quantize)?;
        Ok(())
    }

    /// Stop a voice. O(1); its queued entry discards itself when popped.
    pub fn stop(&self, name: &str) -> bool {
        self.voices.stop(name)
    }

    /// Stop every voice, as a control-priority entry so a same-instant
    /// "stop all" wins over pending note entries.
    pub fn stop_all(&self) {
        let voices = Arc::clone(&self.voices);
        self.handle.insert_at(
            self.clock.now(),
            PRIORITY_CONTROL,
            Job::once("stop-all", move |ctx| {
                let stopped = voices.stop_all();
                ctx.notifier.info(
                    NotificationCategory::Voice,
                    format!("stop-all: {} voices silenced", stopped),
                );
                Ok(())
            }),
        );
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.voices.is_playing(name)
    }

    pub fn playing(&self) -> Vec<String> {
        self.voices.playing()
    }

    // --- clock ---

    pub fn now(&self) -> BeatPosition {
        self.clock.now()
    }

    pub fn tempo(&self) -> Tempo {
        self.clock.tempo()
    }

    /// Change tempo from this instant; pending beat deadlines re-arm.
    pub fn set_tempo(&self, tempo: Tempo) {
        self.clock.set_tempo(tempo);
        self.handle.wake();
    }

    pub fn meter(&self) -> Meter {
        self.clock.meter()
    }

    pub fn set_meter(&self, meter: Meter) {
        self.clock.set_meter(meter);
        self.handle.wake();
    }

    pub fn next_bar(&self) -> BeatPosition {
        self.clock.next_bar()
    }

    /// Restart the clock at beat zero; stale entries become due now.
    pub fn restart(&self) {
        self.handle.restart_clock();
    }

    pub fn clock(&self) -> Arc<BeatClock> {
        Arc::clone(&self.clock)
    }

    // --- one-shot scheduling ---

    /// Run an action when `beat` comes due.
    pub fn schedule_at(
        &self,
        beat: BeatPosition,
        label: impl Into<String>,
        action: impl FnOnce(&JobContext) -> Result<(), ActionError> + Send + 'static,
    ) -> u64 {
        self.handle
            .insert_at(beat, PRIORITY_NOTE, Job::once(label, action))
    }

    /// Run an action at the next bar line.
    pub fn schedule_next_bar(
        &self,
        label: impl Into<String>,
        action: impl FnOnce(&JobContext) -> Result<(), ActionError> + Send + 'static,
    ) -> u64 {
        self.schedule_at(self.clock.next_bar(), label, action)
    }

    pub fn pending_len(&self) -> usize {
        self.handle.pending_len()
    }

    // --- sync peers ---

    /// Publish this engine's clock to network peers.
    pub fn serve_sync(&mut self, bind_addr: &str) -> EngineResult<SocketAddr> {
        let server =
            ClockSyncServer::bind(bind_addr, Arc::clone(&self.clock), self.notifier.clone())?;
        let addr = server.local_addr();
        self.sync_server = Some(server);
        Ok(addr)
    }

    /// Follow a remote engine's clock.
    pub fn sync_to(&mut self, server_addr: &str) -> EngineResult<()> {
        let client = ClockSyncClient::connect(
            server_addr,
            Arc::clone(&self.clock),
            Some(self.handle.clone()),
            self.config.sync.clone(),
            self.notifier.clone(),
        )?;
        self.sync_client = Some(client);
        Ok(())
    }

    /// Sync status, when following a remote clock.
    pub fn sync_status(&self) -> Option<SyncStatus> {
        self.sync_client.as_ref().map(|c| c.status())
    }

    // --- observation ---

    /// Drain pending notifications from the process-wide error sink.
    pub fn notifications(&self) -> Vec<Notification> {
        let mut rx = self
            .notifications_rx
            .lock()
            .expect("notification consumer corrupted");
        let mut drained = Vec::new();
        while let Some(notification) = rx.try_pop() {
            drained.push(notification);
        }
        drained
    }

    /// Stop everything: sync peers first, then the scheduler loop, then
    /// the transport worker (which drains pending messages).
    pub fn shutdown(&mut self) {
        if let Some(mut client) = self.sync_client.take() {
            client.shutdown();
        }
        if let Some(mut server) = self.sync_server.take() {
            server.shutdown();
        }
        self.voices.stop_all();
        self.scheduler.shutdown();
        self.transport.shutdown();
        log::info!("engine stopped");
    }
}

impl Drop for LiveEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
