//! Outgoing cursor throttle: one emission per interval, latest sample wins.

use std::time::{Duration, Instant};

use crate::protocol::Point;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);

/// Drawing surface extent; positions are clamped into `[0, width] x [0, height]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width:  f64,
    pub height: f64,
}

impl Bounds {
    pub fn clamp(&self, p: Point) -> Point {
        Point {
            x: clamp_axis(p.x, self.width),
            y: clamp_axis(p.y, self.height),
        }
    }
}

fn clamp_axis(v: f64, max: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, max.max(0.0)) }
}

#[derive(Debug, Clone)]
pub struct CursorThrottler {
    interval:  Duration,
    bounds:    Bounds,
    last_emit: Option<Instant>,
    pending:   Option<Point>,
}

impl CursorThrottler {
    pub fn new(bounds: Bounds) -> Self {
        Self::with_interval(bounds, DEFAULT_INTERVAL)
    }

    pub fn with_interval(bounds: Bounds, interval: Duration) -> Self {
        Self { interval, bounds, last_emit: None, pending: None }
    }

    pub fn set_bounds(&mut self, bounds: Bounds) { self.bounds = bounds; }

    /// Feeds one pointer sample. Returns the point to emit now, if the window is open.
    pub fn sample(&mut self, p: Point, now: Instant) -> Option<Point> {
        let p = self.bounds.clamp(p);
        if self.window_open(now) {
            self.pending = None;
            self.last_emit = Some(now);
            Some(p)
        } else {
            self.pending = Some(p);
            None
        }
    }

    /// Emits the pending sample once its window has opened. Call from a timer tick.
    pub fn poll(&mut self, now: Instant) -> Option<Point> {
        if self.pending.is_some() && self.window_open(now) {
            self.last_emit = Some(now);
            return self.pending.take();
        }
        None
    }

    /// Earliest instant at which `poll` could emit the pending sample.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending?;
        Some(self.last_emit.map_or_else(Instant::now, |t| t + self.interval))
    }

    fn window_open(&self, now: Instant) -> bool {
        self.last_emit
            .map_or(true, |t| now.saturating_duration_since(t) >= self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: Bounds = Bounds { width: 800.0, height: 600.0 };

    #[test]
    fn fast_stream_never_emits_closer_than_interval() {
        let t0 = Instant::now();
        let mut th = CursorThrottler::new(SURFACE);
        let mut emitted: Vec<(Instant, Point)> = Vec::new();

        // 4ms sample period, 500ms of movement
        for i in 0..125u32 {
            let now = t0 + Duration::from_millis(u64::from(i) * 4);
            let p = Point::new(f64::from(i), f64::from(i));
            if let Some(e) = th.sample(p, now) {
                emitted.push((now, e));
            }
            if let Some(e) = th.poll(now) {
                emitted.push((now, e));
            }
        }

        assert!(emitted.len() >= 9 && emitted.len() <= 11, "{}", emitted.len());
        for w in emitted.windows(2) {
            assert!(w[1].0 - w[0].0 >= DEFAULT_INTERVAL);
        }
    }

    #[test]
    fn emission_carries_most_recent_sample() {
        let t0 = Instant::now();
        let mut th = CursorThrottler::new(SURFACE);
        assert_eq!(th.sample(Point::new(1.0, 1.0), t0), Some(Point::new(1.0, 1.0)));
        assert_eq!(th.sample(Point::new(2.0, 2.0), t0 + Duration::from_millis(10)), None);
        assert_eq!(th.sample(Point::new(3.0, 3.0), t0 + Duration::from_millis(20)), None);
        assert_eq!(th.poll(t0 + Duration::from_millis(30)), None);
        assert_eq!(th.poll(t0 + Duration::from_millis(50)), Some(Point::new(3.0, 3.0)));
        assert_eq!(th.poll(t0 + Duration::from_millis(200)), None);
    }

    #[test]
    fn positions_are_clamped_to_surface() {
        let mut th = CursorThrottler::new(SURFACE);
        let out = th.sample(Point::new(-5.0, 9000.0), Instant::now());
        assert_eq!(out, Some(Point::new(0.0, 600.0)));
    }

    #[test]
    fn deadline_tracks_pending_sample() {
        let t0 = Instant::now();
        let mut th = CursorThrottler::new(SURFACE);
        assert!(th.next_deadline().is_none());
        th.sample(Point::new(1.0, 1.0), t0);
        th.sample(Point::new(2.0, 1.0), t0 + Duration::from_millis(5));
        assert_eq!(th.next_deadline(), Some(t0 + DEFAULT_INTERVAL));
    }
}
