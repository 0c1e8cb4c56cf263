use crate::interaction::InteractionParams;
use nalgebra::Point2;
use std::time::Instant;

/// Speed of the primary input point between frames, in image pixels per
/// second.
///
/// The frame interval is clamped into `[dt_min, dt_max]` so frame-rate
/// jitter does not produce spikes, and the result is capped.
#[derive(Clone, Debug, Default)]
pub struct VelocityEstimator {
    last: Option<(Point2<f32>, Instant)>,
    speed: f32,
}

impl VelocityEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed this frame's primary point (or `None` when no point is present,
    /// which resets the estimate) and return the current speed.
    pub fn update(
        &mut self,
        point: Option<Point2<f32>>,
        now: Instant,
        params: &InteractionParams,
    ) -> f32 {
        let Some(p) = point else {
            self.last = None;
            self.speed = 0.0;
            return 0.0;
        };
        self.speed = match self.last {
            Some((prev, t)) => {
                let [lo, hi] = params.dt_clamp_secs;
                let dt = now.saturating_duration_since(t).as_secs_f32().clamp(lo, hi);
                ((p - prev).norm() / dt).min(params.max_speed)
            }
            None => 0.0,
        };
        self.last = Some((p, now));
        self.speed
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.speed = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::time::Duration;

    #[test]
    fn first_sample_has_zero_speed() {
        let mut v = VelocityEstimator::new();
        let params = InteractionParams::default();
        assert_eq!(v.update(Some(Point2::new(10.0, 10.0)), Instant::now(), &params), 0.0);
    }

    #[test]
    fn interval_is_clamped() {
        let params = InteractionParams::default();
        let t0 = Instant::now();

        // 1 ms apart counts as 16 ms.
        let mut v = VelocityEstimator::new();
        v.update(Some(Point2::new(0.0, 0.0)), t0, &params);
        let s = v.update(Some(Point2::new(4.0, 3.0)), t0 + Duration::from_millis(1), &params);
        assert_relative_eq!(s, 5.0 / 0.016, max_relative = 1e-4);

        // 2 s apart counts as 100 ms.
        let mut v = VelocityEstimator::new();
        v.update(Some(Point2::new(0.0, 0.0)), t0, &params);
        let s = v.update(Some(Point2::new(10.0, 0.0)), t0 + Duration::from_secs(2), &params);
        assert_relative_eq!(s, 100.0, max_relative = 1e-4);
    }

    #[test]
    fn speed_is_capped_and_resets_without_point() {
        let params = InteractionParams::default();
        let t0 = Instant::now();
        let mut v = VelocityEstimator::new();
        v.update(Some(Point2::new(0.0, 0.0)), t0, &params);
        let s = v.update(Some(Point2::new(500.0, 0.0)), t0 + Duration::from_millis(50), &params);
        assert_eq!(s, params.max_speed);
        assert_eq!(v.update(None, t0 + Duration::from_millis(80), &params), 0.0);
        assert_eq!(
            v.update(Some(Point2::new(0.0, 0.0)), t0 + Duration::from_millis(90), &params),
            0.0
        );
    }
}
