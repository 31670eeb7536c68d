use super::*;
use crate::present::compositor::PresentReceivedInfo;
use crate::present::loopback::{LoopbackCompositor, LoopbackHandle};
use crate::scene::node::NodeId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Sched = PresentScheduler<LoopbackCompositor>;

fn opts(max_frames_in_flight: u32) -> SchedulerOpts {
    SchedulerOpts {
        max_frames_in_flight,
        ..SchedulerOpts::default()
    }
}

fn connect(budget: u32, max_in_flight: u32) -> (Sched, LoopbackHandle) {
    let (conn, handle) = LoopbackCompositor::new(budget);
    (
        PresentScheduler::new(conn, &opts(max_in_flight), "test-session"),
        handle,
    )
}

fn pump(s: &mut Sched) {
    while let Some(e) = s.connection_mut().poll_event() {
        s.handle_event(e);
    }
}

fn ready(budget: u32, max_in_flight: u32) -> (Sched, LoopbackHandle) {
    let (mut s, h) = connect(budget, max_in_flight);
    pump(&mut s);
    (s, h)
}

#[test]
fn initialization_names_session_and_waits_for_handshake() {
    let (mut s, h) = connect(2, 3);
    assert_eq!(h.debug_name().as_deref(), Some("test-session"));
    assert_eq!(s.phase(), Phase::Uninitialized { pending: false });
    assert!(!s.ready_signal().is_raised());

    pump(&mut s);
    assert_eq!(s.phase(), Phase::Ready);
    assert_eq!(s.frames_in_flight_allowed(), 2);
    assert!(s.ready_signal().is_raised());
}

#[test]
fn present_before_handshake_is_sent_on_handshake() {
    let (mut s, h) = connect(2, 3);
    assert_eq!(s.request_present(), PresentOutcome::Deferred);
    assert_eq!(s.request_present(), PresentOutcome::Deferred);
    assert!(s.is_present_pending());
    assert_eq!(h.submission_count(), 0);

    pump(&mut s);
    assert_eq!(h.submission_count(), 1);
    assert_eq!(s.frames_in_flight(), 1);
    assert!(!s.is_present_pending());
    assert_eq!(s.stats().coalesced, 1);
}

#[test]
fn basic_present_transmits_accumulated_commands() {
    let (mut s, h) = ready(2, 3);
    s.enqueue([SceneCommand::DetachChildren { node: NodeId(0) }]);
    let fence = RasterFence::new();
    s.add_fence(fence.clone());

    assert_eq!(s.request_present(), PresentOutcome::Transmitted);
    assert_eq!(s.frames_in_flight(), 1);

    let subs = h.submissions();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].trace_id, 1);
    assert_eq!(subs[0].commands.len(), 1);
    assert_eq!(subs[0].fences.len(), 1);
    assert!(!subs[0].is_ready());
    fence.signal();
    assert!(h.submissions()[0].is_ready());
}

#[test]
fn budget_of_one_transmits_once_then_once_per_ack() {
    let (mut s, h) = ready(1, 3);

    assert_eq!(s.request_present(), PresentOutcome::Transmitted);
    assert_eq!(s.request_present(), PresentOutcome::Deferred);
    assert_eq!(s.request_present(), PresentOutcome::Deferred);
    assert_eq!(h.submission_count(), 1);
    assert!(s.is_present_pending());
    assert!(!s.ready_signal().is_raised());

    pump(&mut s);
    assert_eq!(h.submission_count(), 1);

    assert_eq!(h.present(1, HostTime(100)), 1);
    pump(&mut s);
    assert_eq!(h.submission_count(), 2);
    assert_eq!(s.frames_in_flight(), 1);
    assert!(!s.is_present_pending());
    assert!(s.ready_signal().is_raised());

    assert_eq!(h.present(1, HostTime(200)), 1);
    pump(&mut s);
    assert_eq!(h.submission_count(), 2);
    assert_eq!(s.frames_in_flight(), 0);
}

#[test]
fn in_flight_cap_applies_even_with_large_budget() {
    let (mut s, h) = ready(10, 1);

    assert_eq!(s.request_present(), PresentOutcome::Transmitted);
    assert_eq!(s.request_present(), PresentOutcome::Deferred);
    assert_eq!(s.request_present(), PresentOutcome::Deferred);
    pump(&mut s);
    assert_eq!(h.submission_count(), 1);

    h.present_all();
    pump(&mut s);
    assert_eq!(h.submission_count(), 2);

    h.present_all();
    pump(&mut s);
    assert_eq!(h.submission_count(), 2);
    assert_eq!(s.frames_in_flight(), 0);
}

fn frame_stream(children: u32) -> Vec<SceneCommand> {
    let mut cmds = vec![SceneCommand::DetachChildren { node: NodeId(0) }];
    cmds.extend((1..=children).map(|child| SceneCommand::AddChild {
        parent: NodeId(0),
        child: NodeId(child),
    }));
    cmds
}

#[test]
fn deferred_batches_coalesce_into_one_transmission() {
    let (mut s, h) = ready(1, 3);
    s.request_present();

    s.enqueue(frame_stream(2));
    s.request_present();
    s.enqueue(frame_stream(2));
    s.request_present();

    h.present_all();
    pump(&mut s);
    let subs = h.submissions();
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[1].commands, frame_stream(2));
}

#[test]
fn rebuilding_stream_replaces_queued_commands_and_signaled_fences() {
    let (mut s, h) = ready(1, 1);
    assert_eq!(s.request_present(), PresentOutcome::Transmitted);

    for _ in 0..40 {
        s.enqueue(frame_stream(3));
        let fence = RasterFence::new();
        s.add_fence(fence.clone());
        assert_eq!(s.request_present(), PresentOutcome::Deferred);
        fence.signal();
    }
    let pending = RasterFence::new();
    s.enqueue(frame_stream(5));
    s.add_fence(pending.clone());
    s.request_present();

    h.present_all();
    pump(&mut s);
    let subs = h.submissions();
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[1].commands, frame_stream(5));
    assert_eq!(subs[1].fences.len(), 1);
    assert!(!subs[1].is_ready());
    pending.signal();
    assert!(h.submissions()[1].is_ready());
}

#[test]
fn unsignaled_fences_survive_a_rebuild() {
    let (mut s, h) = ready(1, 1);
    s.request_present();

    let slow = RasterFence::new();
    s.enqueue(frame_stream(1));
    s.add_fence(slow.clone());
    s.request_present();
    let fast = RasterFence::new();
    fast.signal();
    s.enqueue(frame_stream(1));
    s.add_fence(fast);
    s.request_present();

    h.present_all();
    pump(&mut s);
    let subs = h.submissions();
    assert_eq!(subs[1].commands.len(), 2);
    assert_eq!(subs[1].fences.len(), 2);
    assert!(!subs[1].is_ready());
    slow.signal();
    assert!(h.submissions()[1].is_ready());
}

#[test]
fn commands_without_a_rebuild_are_appended() {
    let (mut s, h) = ready(1, 1);
    s.request_present();

    s.enqueue(frame_stream(1));
    s.enqueue([SceneCommand::AddChild {
        parent: NodeId(0),
        child: NodeId(2),
    }]);
    s.request_present();

    h.present_all();
    pump(&mut s);
    assert_eq!(h.submissions()[1].commands, frame_stream(2));
}

#[test]
fn in_flight_never_exceeds_cap() {
    let (mut s, h) = ready(5, 3);
    for round in 0..40 {
        for _ in 0..(round % 4) {
            s.request_present();
            assert!(s.frames_in_flight() <= 3);
        }
        pump(&mut s);
        if round % 3 == 0 {
            h.present(round % 2 + 1, HostTime::now());
            pump(&mut s);
        }
        assert!(s.frames_in_flight() <= 3);
        assert_eq!(s.frames_in_flight() as usize, h.outstanding());
    }
}

#[test]
fn acknowledgment_releases_exactly_the_finalized_count() {
    let (mut s, h) = ready(3, 3);
    for _ in 0..3 {
        assert_eq!(s.request_present(), PresentOutcome::Transmitted);
    }
    pump(&mut s);
    assert_eq!(s.frames_in_flight(), 3);

    assert_eq!(h.present(2, HostTime(10)), 2);
    pump(&mut s);
    assert_eq!(s.frames_in_flight(), 1);
    assert_eq!(s.stats().frames_presented, 2);
    assert_eq!(s.vsync().last_presentation(), Some(HostTime(10)));
}

#[test]
fn frame_presented_callback_sees_every_ack() {
    let (mut s, h) = ready(2, 3);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    s.on_frame_presented(move |info| {
        if let Ok(mut v) = sink.lock() {
            v.push(info.presentation_infos.len());
        }
    });

    s.request_present();
    s.request_present();
    pump(&mut s);
    h.present(1, HostTime(1));
    h.present(1, HostTime(2));
    pump(&mut s);

    assert_eq!(*seen.lock().unwrap(), vec![1, 1]);
}

#[test]
#[should_panic(expected = "granted no presents")]
fn zero_budget_handshake_is_fatal() {
    let _ = ready(0, 3);
}

#[test]
#[should_panic(expected = "in flight")]
fn over_acknowledgment_is_fatal() {
    let (mut s, h) = ready(2, 3);
    h.inject(CompositorEvent::FramePresented(FramePresentedInfo {
        actual_presentation_time: HostTime(1),
        presentation_infos: vec![PresentReceivedInfo {
            trace_id: 1,
            present_received_time: HostTime(0),
            latched_time: HostTime(1),
        }],
        num_presents_allowed: 2,
    }));
    pump(&mut s);
}

#[test]
fn disconnect_reports_once_and_drops_later_presents() {
    let (mut s, h) = ready(1, 3);
    let errors = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&errors);
    s.on_error(move |e| {
        assert!(matches!(e, FramepipeError::Connection(_)));
        count.fetch_add(1, Ordering::SeqCst);
    });
    let signal = s.ready_signal();

    s.request_present();
    s.request_present();
    h.disconnect("compositor crashed");
    pump(&mut s);

    assert_eq!(s.phase(), Phase::Disconnected);
    assert!(signal.is_closed());
    assert!(!signal.wait_timeout(Duration::from_millis(1)));
    assert_eq!(s.request_present(), PresentOutcome::Dropped);

    s.handle_event(CompositorEvent::Disconnected("again".into()));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert_eq!(h.submission_count(), 1);
}

#[test]
fn submit_failure_is_treated_as_disconnect() {
    let (mut s, h) = ready(2, 3);
    let errors = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&errors);
    s.on_error(move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    });

    h.disconnect("gone");
    // Submit happens before the disconnect event is pumped.
    assert_eq!(s.request_present(), PresentOutcome::Dropped);
    assert_eq!(s.phase(), Phase::Disconnected);
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    // Nothing reached the compositor, so nothing is in flight.
    assert_eq!(s.frames_in_flight(), 0);
    assert_eq!(s.frames_in_flight_allowed(), 2);
    assert_eq!(s.stats().transmitted, 0);

    pump(&mut s);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}
