use crate::foundation::core::HostTime;
use crate::foundation::error::{FramepipeError, FramepipeResult};
use crate::present::compositor::{
    CommandBatch, CompositorConnection, CompositorEvent, FramePresentedInfo,
    FuturePresentationTimes, PresentReceivedInfo, PresentationInfo,
};
use crate::present::signal::RasterFence;
use crate::scene::node::SceneCommand;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A batch as received by the loopback compositor.
#[derive(Clone, Debug)]
pub struct Submission {
    /// Batch trace id.
    pub trace_id: u64,
    /// Requested presentation time.
    pub requested_time: HostTime,
    /// When the submission arrived.
    pub received_time: HostTime,
    /// Commands in the batch.
    pub commands: Vec<SceneCommand>,
    /// Fences the batch waits on.
    pub fences: Vec<RasterFence>,
}

impl Submission {
    /// All fences have been signaled.
    pub fn is_ready(&self) -> bool {
        self.fences.iter().all(RasterFence::is_signaled)
    }
}

#[derive(Debug)]
struct Shared {
    budget: u32,
    interval_ns: u64,
    predictions: usize,
    debug_name: Option<String>,
    prediction_window: Option<Duration>,
    events: VecDeque<CompositorEvent>,
    outstanding: VecDeque<Submission>,
    received: Vec<Submission>,
    disconnected: bool,
}

impl Shared {
    fn remaining(&self) -> u32 {
        self.budget
            .saturating_sub(u32::try_from(self.outstanding.len()).unwrap_or(u32::MAX))
    }

    fn future(&self, now: HostTime) -> FuturePresentationTimes {
        let future_presentations = (1..=self.predictions as u64)
            .map(|i| {
                let t = now.saturating_add_nanos(i.saturating_mul(self.interval_ns));
                PresentationInfo {
                    latch_point: HostTime(t.0.saturating_sub(self.interval_ns / 2)),
                    presentation_time: t,
                }
            })
            .collect();
        FuturePresentationTimes {
            remaining_presents_in_flight_allowed: self.remaining(),
            future_presentations,
        }
    }
}

/// In-process compositor double.
///
/// Accepts submissions up to a fixed in-flight budget and queues replies as
/// [`CompositorEvent`]s. Presentation is driven from the paired [`LoopbackHandle`].
#[derive(Debug)]
pub struct LoopbackCompositor {
    shared: Arc<Mutex<Shared>>,
}

/// Control side of a [`LoopbackCompositor`].
#[derive(Clone, Debug)]
pub struct LoopbackHandle {
    shared: Arc<Mutex<Shared>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LoopbackCompositor {
    /// Compositor granting `budget` presents in flight with a 60 Hz cadence.
    pub fn new(budget: u32) -> (Self, LoopbackHandle) {
        Self::with_interval(budget, 16_666_667)
    }

    /// Compositor with an explicit presentation interval.
    pub fn with_interval(budget: u32, interval_ns: u64) -> (Self, LoopbackHandle) {
        let shared = Arc::new(Mutex::new(Shared {
            budget,
            interval_ns: interval_ns.max(1),
            predictions: 3,
            debug_name: None,
            prediction_window: None,
            events: VecDeque::new(),
            outstanding: VecDeque::new(),
            received: Vec::new(),
            disconnected: false,
        }));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            LoopbackHandle { shared },
        )
    }
}

impl CompositorConnection for LoopbackCompositor {
    fn set_debug_name(&mut self, name: &str) {
        lock(&self.shared).debug_name = Some(name.to_owned());
    }

    fn request_presentation_times(&mut self, prediction_window: Duration) {
        let mut s = lock(&self.shared);
        s.prediction_window = Some(prediction_window);
        let times = s.future(HostTime::now());
        s.events.push_back(CompositorEvent::Handshake(times));
    }

    fn submit(&mut self, batch: CommandBatch, requested_time: HostTime) -> FramepipeResult<()> {
        let mut s = lock(&self.shared);
        if s.disconnected {
            return Err(FramepipeError::connection("loopback compositor disconnected"));
        }
        let now = HostTime::now();
        let sub = Submission {
            trace_id: batch.trace_id,
            requested_time,
            received_time: now,
            commands: batch.commands,
            fences: batch.fences,
        };
        s.received.push(sub.clone());
        s.outstanding.push_back(sub);
        let times = s.future(now);
        s.events.push_back(CompositorEvent::SubmitAck(times));
        Ok(())
    }

    fn poll_event(&mut self) -> Option<CompositorEvent> {
        lock(&self.shared).events.pop_front()
    }
}

impl LoopbackHandle {
    /// Name set by the client.
    pub fn debug_name(&self) -> Option<String> {
        lock(&self.shared).debug_name.clone()
    }

    /// Prediction window requested at handshake.
    pub fn prediction_window(&self) -> Option<Duration> {
        lock(&self.shared).prediction_window
    }

    /// Total submissions received.
    pub fn submission_count(&self) -> usize {
        lock(&self.shared).received.len()
    }

    /// Every submission received so far.
    pub fn submissions(&self) -> Vec<Submission> {
        lock(&self.shared).received.clone()
    }

    /// Submissions not yet presented.
    pub fn outstanding(&self) -> usize {
        lock(&self.shared).outstanding.len()
    }

    /// Events queued for the client.
    pub fn pending_events(&self) -> usize {
        lock(&self.shared).events.len()
    }

    /// Change the in-flight budget reported from now on.
    pub fn set_budget(&self, budget: u32) {
        lock(&self.shared).budget = budget;
    }

    /// Present up to `max` of the oldest outstanding submissions whose fences are signaled,
    /// in submit order, at `actual`. Queues one acknowledgment and returns how many were
    /// finalized; nothing is queued when none were.
    pub fn present(&self, max: usize, actual: HostTime) -> usize {
        let mut s = lock(&self.shared);
        if s.disconnected {
            return 0;
        }
        let mut infos = Vec::new();
        while infos.len() < max {
            match s.outstanding.front() {
                Some(sub) if sub.is_ready() => {}
                _ => break,
            }
            let Some(sub) = s.outstanding.pop_front() else {
                break;
            };
            infos.push(PresentReceivedInfo {
                trace_id: sub.trace_id,
                present_received_time: sub.received_time,
                latched_time: actual,
            });
        }
        let n = infos.len();
        if n > 0 {
            let num_presents_allowed = s.remaining();
            s.events
                .push_back(CompositorEvent::FramePresented(FramePresentedInfo {
                    actual_presentation_time: actual,
                    presentation_infos: infos,
                    num_presents_allowed,
                }));
        }
        n
    }

    /// Present every ready submission now.
    pub fn present_all(&self) -> usize {
        self.present(usize::MAX, HostTime::now())
    }

    /// Queue an arbitrary event, bypassing the budget bookkeeping.
    pub fn inject(&self, event: CompositorEvent) {
        lock(&self.shared).events.push_back(event);
    }

    /// Drop the connection; the client sees one [`CompositorEvent::Disconnected`].
    pub fn disconnect(&self, reason: impl Into<String>) {
        let mut s = lock(&self.shared);
        if s.disconnected {
            return;
        }
        s.disconnected = true;
        s.outstanding.clear();
        s.events
            .push_back(CompositorEvent::Disconnected(reason.into()));
    }
}

#[cfg(test)]
#[path = "../../tests/unit/present/loopback.rs"]
mod tests;
