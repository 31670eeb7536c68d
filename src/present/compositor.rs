use crate::foundation::core::HostTime;
use crate::foundation::error::FramepipeResult;
use crate::present::signal::RasterFence;
use crate::scene::node::SceneCommand;
use std::time::Duration;

/// A predicted future presentation opportunity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentationInfo {
    /// Last moment a submission can be latched for this presentation.
    pub latch_point: HostTime,
    /// When the latched content becomes visible.
    pub presentation_time: HostTime,
}

/// Budget and predictions sent with the handshake and with every submit reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FuturePresentationTimes {
    /// Presents the compositor will currently accept.
    pub remaining_presents_in_flight_allowed: u32,
    /// Upcoming presentation opportunities, ascending.
    pub future_presentations: Vec<PresentationInfo>,
}

/// One finalized submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentReceivedInfo {
    /// Batch trace id the record belongs to.
    pub trace_id: u64,
    /// When the compositor received the submission.
    pub present_received_time: HostTime,
    /// When it was latched for display.
    pub latched_time: HostTime,
}

/// Acknowledgment that one or more submissions were shown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FramePresentedInfo {
    /// When the frame actually appeared.
    pub actual_presentation_time: HostTime,
    /// Submissions finalized since the previous acknowledgment, in submit order.
    pub presentation_infos: Vec<PresentReceivedInfo>,
    /// Updated budget.
    pub num_presents_allowed: u32,
}

/// Accumulated commands and fences transmitted by one present.
#[derive(Clone, Debug, Default)]
pub struct CommandBatch {
    /// Present sequence number, assigned at transmission.
    pub trace_id: u64,
    /// Scene commands in order.
    pub commands: Vec<SceneCommand>,
    /// Fences the compositor must wait on before displaying this batch.
    pub fences: Vec<RasterFence>,
}

impl CommandBatch {
    /// Return `true` when there is nothing to send.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.fences.is_empty()
    }
}

/// Asynchronous notifications from the compositor, in arrival order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompositorEvent {
    /// One-shot reply to [`CompositorConnection::request_presentation_times`].
    Handshake(FuturePresentationTimes),
    /// Reply to a [`CompositorConnection::submit`].
    SubmitAck(FuturePresentationTimes),
    /// Submissions were displayed.
    FramePresented(FramePresentedInfo),
    /// The connection is gone.
    Disconnected(String),
}

/// Capability to talk to an external compositor.
///
/// Calls never block on the compositor; replies come back as [`CompositorEvent`]s in the
/// order the requests were made.
pub trait CompositorConnection: Send {
    /// Attach a diagnostic name to the session.
    fn set_debug_name(&mut self, name: &str);

    /// Start the handshake; answered by [`CompositorEvent::Handshake`].
    fn request_presentation_times(&mut self, prediction_window: Duration);

    /// Transmit a batch to be shown no earlier than `requested_time`; answered by
    /// [`CompositorEvent::SubmitAck`].
    fn submit(&mut self, batch: CommandBatch, requested_time: HostTime) -> FramepipeResult<()>;

    /// Next pending event, if any.
    fn poll_event(&mut self) -> Option<CompositorEvent>;
}
