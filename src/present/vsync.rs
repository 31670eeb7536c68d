use crate::foundation::core::HostTime;
use crate::present::compositor::PresentationInfo;

/// Frame timing handed to the producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VsyncInfo {
    /// When work on the frame may start.
    pub frame_start: HostTime,
    /// Presentation time the frame should aim for.
    pub frame_target: HostTime,
}

/// Advisory presentation-time prediction from compositor feedback.
#[derive(Clone, Debug)]
pub struct VsyncPredictor {
    default_interval_ns: u64,
    interval_ns: u64,
    last_presentation: Option<HostTime>,
    future: Vec<PresentationInfo>,
}

impl VsyncPredictor {
    /// Predictor assuming `default_interval_ns` until told otherwise.
    pub fn new(default_interval_ns: u64) -> Self {
        let default_interval_ns = default_interval_ns.max(1);
        Self {
            default_interval_ns,
            interval_ns: default_interval_ns,
            last_presentation: None,
            future: Vec::new(),
        }
    }

    /// Current interval estimate.
    pub fn interval_ns(&self) -> u64 {
        self.interval_ns
    }

    /// Most recent actual presentation time.
    pub fn last_presentation(&self) -> Option<HostTime> {
        self.last_presentation
    }

    /// Replace the set of predicted future presentations.
    ///
    /// The interval becomes the average spacing of the predictions, or the default when fewer
    /// than two are known.
    pub fn update_predictions(&mut self, future: &[PresentationInfo]) {
        let mut future = future.to_vec();
        future.sort_by_key(|p| p.presentation_time);
        self.interval_ns = match (future.first(), future.last()) {
            (Some(first), Some(last)) if future.len() >= 2 => {
                let span = last.presentation_time.saturating_nanos_since(first.presentation_time);
                let avg = span / (future.len() as u64 - 1);
                if avg == 0 { self.default_interval_ns } else { avg }
            }
            _ => self.default_interval_ns,
        };
        self.future = future;
    }

    /// Record when a frame actually appeared.
    pub fn record_presentation(&mut self, actual: HostTime) {
        if self.last_presentation.is_none_or(|t| actual > t) {
            self.last_presentation = Some(actual);
        }
    }

    /// Timing for the next frame produced at `now`.
    ///
    /// Picks the first prediction at least half an interval after the last presentation whose
    /// latch point is still ahead; otherwise extrapolates by whole intervals.
    pub fn next_vsync(&self, now: HostTime) -> VsyncInfo {
        let last = self.last_presentation.unwrap_or(now);
        let earliest = last.saturating_add_nanos(self.interval_ns / 2);

        let predicted = self
            .future
            .iter()
            .find(|p| p.presentation_time >= earliest && p.latch_point > now)
            .map(|p| p.presentation_time);

        let frame_target = predicted.unwrap_or_else(|| {
            let mut t = last.saturating_add_nanos(self.interval_ns);
            if t <= now {
                let behind = now.saturating_nanos_since(t);
                let steps = behind / self.interval_ns + 1;
                t = t.saturating_add_nanos(steps.saturating_mul(self.interval_ns));
            }
            t
        });

        VsyncInfo {
            frame_start: now,
            frame_target,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/present/vsync.rs"]
mod tests;
