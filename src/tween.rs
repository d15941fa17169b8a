use std::time::Duration;

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval},
};

use crate::shared::geo::Coordinate;

/// Straight-line marker movement over `duration`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tween {
    pub from: Coordinate,
    pub to: Coordinate,
    pub duration: Duration,
}

impl Tween {
    pub fn new(from: Coordinate, to: Coordinate, duration: Duration) -> Self {
        Self { from, to, duration }
    }

    /// 0.0 at the start, clamped to 1.0 at the end.
    pub fn progress(&self, elapsed: Duration) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }

    pub fn position_at(&self, elapsed: Duration) -> Coordinate {
        let t = self.progress(elapsed);
        Coordinate::new(
            self.from.latitude + (self.to.latitude - self.from.latitude) * t,
            self.from.longitude + (self.to.longitude - self.from.longitude) * t,
        )
    }
}

/// A running tween. Cancelling or dropping the handle stops further
/// frames; the last frame delivered stays where it was.
#[derive(Debug)]
pub struct TweenHandle(JoinHandle<()>);

impl TweenHandle {
    pub fn cancel(&self) {
        self.0.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for TweenHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Calls `on_frame` every `frame_interval` with the interpolated position,
/// ending with exactly `tween.to`.
pub fn spawn_tween<F>(tween: Tween, frame_interval: Duration, mut on_frame: F) -> TweenHandle
where
    F: FnMut(Coordinate) + Send + 'static,
{
    TweenHandle(tokio::spawn(async move {
        let start = Instant::now();
        let mut frames = interval(frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            frames.tick().await;
            let elapsed = start.elapsed();
            if elapsed >= tween.duration {
                on_frame(tween.to);
                break;
            }
            on_frame(tween.position_at(elapsed));
        }
    }))
}

#[test]
fn position_at_test() {
    let tween = Tween::new(
        Coordinate::new(50.0, 19.0),
        Coordinate::new(51.0, 21.0),
        Duration::from_millis(600),
    );
    assert_eq!(tween.position_at(Duration::ZERO), tween.from);
    assert_eq!(
        tween.position_at(Duration::from_millis(300)),
        Coordinate::new(50.5, 20.0)
    );
    assert_eq!(tween.position_at(Duration::from_secs(5)), tween.to);
}
