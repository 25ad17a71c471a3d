use std::time::Instant;

use crate::config::SmoothingConfig;
use crate::placement::Placement;

/// Low-pass filter component
struct LowPassFilter {
    prev: Option<f32>,
}

impl LowPassFilter {
    fn new() -> Self {
        Self { prev: None }
    }

    fn filter(&mut self, value: f32, alpha: f32) -> f32 {
        match self.prev {
            Some(prev) => {
                let result = alpha * value + (1.0 - alpha) * prev;
                self.prev = Some(result);
                result
            }
            None => {
                self.prev = Some(value);
                value
            }
        }
    }
}

/// alpha = 1 / (1 + tau/Te), tau = 1/(2*pi*fc)
fn smoothing_factor(te: f32, cutoff: f32) -> f32 {
    let r = 2.0 * std::f32::consts::PI * cutoff * te;
    r / (r + 1.0)
}

/// One Euro Filter for a single scalar value
struct ScalarFilter {
    min_cutoff: f32,
    beta: f32,
    d_cutoff: f32,
    x_filter: LowPassFilter,
    dx_filter: LowPassFilter,
    prev_value: Option<f32>,
}

impl ScalarFilter {
    fn new(min_cutoff: f32, beta: f32, d_cutoff: f32) -> Self {
        Self {
            min_cutoff,
            beta,
            d_cutoff,
            x_filter: LowPassFilter::new(),
            dx_filter: LowPassFilter::new(),
            prev_value: None,
        }
    }

    fn filter(&mut self, value: f32, dt: f32) -> f32 {
        let dx = match self.prev_value {
            Some(prev) if dt > 0.0 => (value - prev) / dt,
            _ => 0.0,
        };
        self.prev_value = Some(value);

        let edx = self.dx_filter.filter(dx, smoothing_factor(dt, self.d_cutoff));
        let cutoff = self.min_cutoff + self.beta * edx.abs();
        self.x_filter.filter(value, smoothing_factor(dt, cutoff))
    }
}

/// 配置矩形 (x, y, width, height) の One Euro Filter
///
/// 回転は調整値そのままなので平滑化しない。
pub struct PlacementFilter {
    rect: [ScalarFilter; 4],
    last_time: Option<Instant>,
}

impl PlacementFilter {
    pub fn new(min_cutoff: f32, beta: f32) -> Self {
        let d_cutoff = 1.0;
        Self {
            rect: std::array::from_fn(|_| ScalarFilter::new(min_cutoff, beta, d_cutoff)),
            last_time: None,
        }
    }

    pub fn from_config(config: &SmoothingConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.min_cutoff, config.beta))
    }

    pub fn apply(&mut self, placement: Placement) -> Placement {
        self.apply_at(placement, Instant::now())
    }

    pub fn apply_at(&mut self, placement: Placement, now: Instant) -> Placement {
        let raw = [placement.x, placement.y, placement.width, placement.height];
        let dt = match self.last_time {
            Some(t) => {
                let d = now.saturating_duration_since(t).as_secs_f32();
                if d > 0.0 { d } else { 1.0 / 60.0 }
            }
            None => {
                self.last_time = Some(now);
                for (filter, value) in self.rect.iter_mut().zip(raw) {
                    filter.filter(value, 0.0);
                }
                return placement;
            }
        };
        self.last_time = Some(now);

        let [x, y, width, height] = std::array::from_fn(|i| self.rect[i].filter(raw[i], dt));
        Placement {
            x,
            y,
            width,
            height,
            ..placement
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn placement(x: f32) -> Placement {
        Placement {
            x,
            y: 20.0,
            width: 100.0,
            height: 150.0,
            rotation_radians: 0.1,
        }
    }

    #[test]
    fn test_smoothing_factor_rises_with_cutoff() {
        let te = 1.0 / 30.0;
        let low = smoothing_factor(te, 0.5);
        let high = smoothing_factor(te, 20.0);
        assert!(low > 0.0 && low < high && high < 1.0, "low={low}, high={high}");
    }

    #[test]
    fn test_beta_tracks_fast_move() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_millis(16);
        let mut steady = PlacementFilter::new(1.0, 0.0);
        let mut speedy = PlacementFilter::new(1.0, 1.0);
        steady.apply_at(placement(0.0), t0);
        speedy.apply_at(placement(0.0), t0);

        let lagging = steady.apply_at(placement(100.0), t1).x;
        let tracking = speedy.apply_at(placement(100.0), t1).x;
        assert!(tracking > lagging, "beta=1 gave {tracking}, beta=0 gave {lagging}");
        assert!(tracking > 90.0, "x = {tracking}");
    }

    #[test]
    fn test_settles_on_held_placement() {
        let mut filter = PlacementFilter::new(1.5, 0.0);
        let t0 = Instant::now();
        filter.apply_at(placement(0.0), t0);
        let mut out = placement(0.0);
        for frame in 1..=60 {
            out = filter.apply_at(placement(100.0), t0 + Duration::from_millis(16 * frame));
        }
        assert!((out.x - 100.0).abs() < 0.5, "x = {}", out.x);
        assert!((out.y - 20.0).abs() < 1e-3, "y = {}", out.y);
    }

    #[test]
    fn test_first_placement_passthrough() {
        let mut filter = PlacementFilter::new(1.5, 0.3);
        assert_eq!(filter.apply_at(placement(50.0), Instant::now()), placement(50.0));
    }

    #[test]
    fn test_jump_is_smoothed_and_rotation_kept() {
        let mut filter = PlacementFilter::new(1.5, 0.0);
        let t0 = Instant::now();
        filter.apply_at(placement(0.0), t0);
        let out = filter.apply_at(placement(100.0), t0 + Duration::from_millis(16));
        assert!(out.x > 0.0 && out.x < 100.0, "x = {}", out.x);
        assert_eq!(out.width, 100.0);
        assert_eq!(out.rotation_radians, 0.1);
    }

    #[test]
    fn test_disabled_by_config() {
        let config = SmoothingConfig {
            enabled: false,
            ..SmoothingConfig::default()
        };
        assert!(PlacementFilter::from_config(&config).is_none());
        assert!(PlacementFilter::from_config(&SmoothingConfig::default()).is_some());
    }
}
