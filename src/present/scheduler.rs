use crate::foundation::config::SchedulerOpts;
use crate::foundation::core::HostTime;
use crate::foundation::error::FramepipeError;
use crate::present::compositor::{
    CommandBatch, CompositorConnection, CompositorEvent, FramePresentedInfo,
    FuturePresentationTimes,
};
use crate::present::signal::{RasterFence, ReadySignal};
use crate::present::vsync::{VsyncInfo, VsyncPredictor};
use crate::scene::node::SceneCommand;
use std::time::Duration;

/// Callback run for every frame-presented acknowledgment.
pub type FramePresentedCallback = Box<dyn FnMut(&FramePresentedInfo) + Send>;
/// Callback run once when the connection is lost.
pub type ErrorCallback = Box<dyn FnMut(&FramepipeError) + Send>;

/// Connection phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Phase {
    /// Waiting for the handshake; `pending` records a present requested meanwhile.
    Uninitialized {
        /// A present was requested before the handshake completed.
        pending: bool,
    },
    /// Presents are transmitted as soon as they are requested.
    Ready,
    /// One coalesced present is queued behind the budget.
    Draining,
    /// The compositor went away; nothing more is transmitted.
    Disconnected,
}

/// What [`PresentScheduler::request_present`] did with the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum PresentOutcome {
    /// Sent to the compositor.
    Transmitted,
    /// Queued until the handshake completes or budget frees up.
    Deferred,
    /// The connection is gone.
    Dropped,
}

/// Scheduler counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct SchedulerStats {
    /// `request_present` calls.
    pub requests: u64,
    /// Batches transmitted.
    pub transmitted: u64,
    /// Requests that had to wait.
    pub deferred: u64,
    /// Deferred requests folded into an already queued present.
    pub coalesced: u64,
    /// Requests refused after disconnect.
    pub dropped: u64,
    /// Frame-presented acknowledgments handled.
    pub acks: u64,
    /// Submissions finalized across all acknowledgments.
    pub frames_presented: u64,
}

/// Admission-controlled presentation over a [`CompositorConnection`].
///
/// At most `max_frames_in_flight` presents are outstanding, and a present is only sent while
/// the compositor's budget is positive. Requests made while either limit is hit collapse into
/// a single queued present, transmitted automatically once an acknowledgment frees a slot.
/// Callers observe progress through the [`ReadySignal`] only.
pub struct PresentScheduler<C: CompositorConnection> {
    conn: C,
    max_frames_in_flight: u32,
    phase: Phase,
    frames_in_flight: u32,
    frames_in_flight_allowed: u32,
    batch: CommandBatch,
    ready: ReadySignal,
    vsync: VsyncPredictor,

    next_present_trace_id: u64,
    next_request_trace_id: u64,
    processed_request_trace_id: u64,

    on_frame_presented: Option<FramePresentedCallback>,
    on_error: Option<ErrorCallback>,
    stats: SchedulerStats,
}

impl<C: CompositorConnection> std::fmt::Debug for PresentScheduler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentScheduler")
            .field("phase", &self.phase)
            .field("frames_in_flight", &self.frames_in_flight)
            .field("frames_in_flight_allowed", &self.frames_in_flight_allowed)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<C: CompositorConnection> PresentScheduler<C> {
    /// Name the session and start the handshake.
    pub fn new(mut conn: C, opts: &SchedulerOpts, debug_label: &str) -> Self {
        conn.set_debug_name(debug_label);
        conn.request_presentation_times(Duration::from_millis(opts.prediction_window_ms));
        Self {
            conn,
            max_frames_in_flight: opts.max_frames_in_flight.max(1),
            phase: Phase::Uninitialized { pending: false },
            frames_in_flight: 0,
            frames_in_flight_allowed: 0,
            batch: CommandBatch::default(),
            ready: ReadySignal::new(),
            vsync: VsyncPredictor::new(opts.default_present_interval_ns),
            next_present_trace_id: 0,
            next_request_trace_id: 0,
            processed_request_trace_id: 0,
            on_frame_presented: None,
            on_error: None,
            stats: SchedulerStats::default(),
        }
    }

    /// Install the per-acknowledgment callback.
    pub fn on_frame_presented(&mut self, cb: impl FnMut(&FramePresentedInfo) + Send + 'static) {
        self.on_frame_presented = Some(Box::new(cb));
    }

    /// Install the connection-loss callback. It runs at most once.
    pub fn on_error(&mut self, cb: impl FnMut(&FramepipeError) + Send + 'static) {
        self.on_error = Some(Box::new(cb));
    }

    /// Readiness signal: raised when another frame may be produced.
    pub fn ready_signal(&self) -> ReadySignal {
        self.ready.clone()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Presents sent but not yet acknowledged.
    pub fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    /// Presents the compositor currently accepts.
    pub fn frames_in_flight_allowed(&self) -> u32 {
        self.frames_in_flight_allowed
    }

    /// Whether a present is queued behind the budget or the handshake.
    pub fn is_present_pending(&self) -> bool {
        matches!(
            self.phase,
            Phase::Draining | Phase::Uninitialized { pending: true }
        )
    }

    /// Counters.
    pub fn stats(&self) -> SchedulerStats {
        self.stats.clone()
    }

    /// Vsync predictor fed by compositor feedback.
    pub fn vsync(&self) -> &VsyncPredictor {
        &self.vsync
    }

    /// Timing for a frame started now.
    pub fn next_vsync(&self) -> VsyncInfo {
        self.vsync.next_vsync(HostTime::now())
    }

    /// Underlying connection.
    pub fn connection(&self) -> &C {
        &self.conn
    }

    /// Underlying connection, mutably.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Append commands to the batch sent by the next transmission.
    ///
    /// A stream that opens with [`SceneCommand::DetachChildren`] rebuilds the tree from scratch,
    /// so it replaces whatever is still queued along with the fences already signaled.
    pub fn enqueue(&mut self, commands: impl IntoIterator<Item = SceneCommand>) {
        let mut commands = commands.into_iter().peekable();
        let rebuilds = matches!(commands.peek(), Some(SceneCommand::DetachChildren { .. }));
        if rebuilds && !self.batch.commands.is_empty() {
            tracing::trace!(
                superseded = self.batch.commands.len(),
                "replacing queued scene stream"
            );
            self.batch.commands.clear();
            self.batch.fences.retain(|f| !f.is_signaled());
        }
        self.batch.commands.extend(commands);
    }

    /// Make the next transmitted batch wait on `fence`.
    pub fn add_fence(&mut self, fence: RasterFence) {
        self.batch.fences.push(fence);
    }

    /// Mark the accumulated batch ready for presentation.
    #[tracing::instrument(
        level = "debug",
        skip(self),
        fields(trace_id = self.next_present_trace_id, in_flight = self.frames_in_flight)
    )]
    pub fn request_present(&mut self) -> PresentOutcome {
        self.stats.requests = self.stats.requests.saturating_add(1);
        self.next_present_trace_id = self.next_present_trace_id.wrapping_add(1);

        match self.phase {
            Phase::Disconnected => {
                self.stats.dropped = self.stats.dropped.saturating_add(1);
                tracing::debug!("present requested after disconnect; dropping it");
                PresentOutcome::Dropped
            }
            Phase::Uninitialized { pending } => {
                self.defer(pending);
                self.phase = Phase::Uninitialized { pending: true };
                PresentOutcome::Deferred
            }
            Phase::Ready | Phase::Draining => {
                if self.can_transmit() {
                    if self.transmit() {
                        PresentOutcome::Transmitted
                    } else {
                        PresentOutcome::Dropped
                    }
                } else {
                    self.defer(self.phase == Phase::Draining);
                    self.phase = Phase::Draining;
                    PresentOutcome::Deferred
                }
            }
        }
    }

    /// Process one compositor event. Events must be fed in arrival order.
    ///
    /// # Panics
    ///
    /// Panics when the handshake grants no presents or an acknowledgment finalizes more
    /// presents than are in flight; the connection cannot recover from either.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn handle_event(&mut self, event: CompositorEvent) {
        if self.phase == Phase::Disconnected {
            tracing::trace!(?event, "event after disconnect ignored");
            return;
        }
        match event {
            CompositorEvent::Handshake(times) => self.on_handshake(times),
            CompositorEvent::SubmitAck(times) => self.on_submit_ack(times),
            CompositorEvent::FramePresented(info) => self.on_frame_presented_event(info),
            CompositorEvent::Disconnected(reason) => self.disconnect(reason),
        }
    }

    fn on_handshake(&mut self, times: FuturePresentationTimes) {
        let Phase::Uninitialized { pending } = self.phase else {
            tracing::warn!("duplicate handshake ignored");
            return;
        };
        assert!(
            times.remaining_presents_in_flight_allowed > 0,
            "compositor granted no presents at handshake"
        );
        self.frames_in_flight_allowed = times.remaining_presents_in_flight_allowed;
        self.vsync.update_predictions(&times.future_presentations);
        self.phase = Phase::Ready;
        tracing::debug!(
            allowed = self.frames_in_flight_allowed,
            "compositor handshake complete"
        );
        self.ready.raise();

        if pending {
            self.phase = Phase::Draining;
            self.retry_pending();
        }
    }

    fn on_submit_ack(&mut self, times: FuturePresentationTimes) {
        self.processed_request_trace_id = self.processed_request_trace_id.wrapping_add(1);
        self.frames_in_flight_allowed = times.remaining_presents_in_flight_allowed;
        self.vsync.update_predictions(&times.future_presentations);
        tracing::trace!(
            processed = self.processed_request_trace_id,
            allowed = self.frames_in_flight_allowed,
            "submit acknowledged"
        );
        self.retry_pending();
    }

    fn on_frame_presented_event(&mut self, info: FramePresentedInfo) {
        if let Phase::Uninitialized { .. } = self.phase {
            tracing::warn!("frame presented before handshake ignored");
            return;
        }
        let finalized = u32::try_from(info.presentation_infos.len()).unwrap_or(u32::MAX);
        assert!(
            finalized <= self.frames_in_flight,
            "compositor finalized {finalized} presents with only {} in flight",
            self.frames_in_flight
        );
        self.frames_in_flight -= finalized;
        self.frames_in_flight_allowed = info.num_presents_allowed;
        self.vsync.record_presentation(info.actual_presentation_time);
        self.stats.acks = self.stats.acks.saturating_add(1);
        self.stats.frames_presented = self
            .stats
            .frames_presented
            .saturating_add(u64::from(finalized));
        tracing::debug!(
            finalized,
            in_flight = self.frames_in_flight,
            allowed = self.frames_in_flight_allowed,
            "frame presented"
        );

        if let Some(cb) = self.on_frame_presented.as_mut() {
            cb(&info);
        }
        self.retry_pending();
        if self.phase != Phase::Disconnected {
            self.ready.raise();
        }
    }

    fn retry_pending(&mut self) {
        if self.phase == Phase::Draining && self.can_transmit() {
            self.transmit();
        }
    }

    fn can_transmit(&self) -> bool {
        self.frames_in_flight < self.max_frames_in_flight && self.frames_in_flight_allowed > 0
    }

    fn defer(&mut self, already_pending: bool) {
        self.stats.deferred = self.stats.deferred.saturating_add(1);
        if already_pending {
            self.stats.coalesced = self.stats.coalesced.saturating_add(1);
        }
        self.ready.lower();
        tracing::debug!(
            in_flight = self.frames_in_flight,
            allowed = self.frames_in_flight_allowed,
            "present deferred"
        );
    }

    // Returns `false` when the connection failed during submission.
    fn transmit(&mut self) -> bool {
        self.next_request_trace_id = self.next_request_trace_id.wrapping_add(1);
        let mut batch = std::mem::take(&mut self.batch);
        batch.trace_id = self.next_request_trace_id;
        let requested_time = self.vsync.next_vsync(HostTime::now()).frame_target;
        tracing::debug!(
            trace_id = batch.trace_id,
            commands = batch.commands.len(),
            in_flight = self.frames_in_flight,
            "transmitting present"
        );

        match self.conn.submit(batch, requested_time) {
            Ok(()) => {
                self.frames_in_flight += 1;
                self.frames_in_flight_allowed -= 1;
                self.phase = Phase::Ready;
                self.stats.transmitted = self.stats.transmitted.saturating_add(1);
                true
            }
            Err(e) => {
                self.disconnect(e.to_string());
                false
            }
        }
    }

    fn disconnect(&mut self, reason: String) {
        if self.phase == Phase::Disconnected {
            return;
        }
        tracing::error!(%reason, "compositor connection lost");
        self.phase = Phase::Disconnected;
        self.ready.close();
        self.batch = CommandBatch::default();
        if let Some(mut cb) = self.on_error.take() {
            cb(&FramepipeError::connection(reason));
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/present/scheduler.rs"]
mod tests;
