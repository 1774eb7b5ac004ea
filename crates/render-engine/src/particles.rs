//! Seeded particle fields for the intro hearts and outro stars.
//!
//! Fields are initialised once per export from a seed and then evaluated
//! per frame without mutation, so any frame can be rendered on its own.

/// One floating heart of the intro.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heart {
    pub x: f64,
    /// Initial vertical position.
    pub y: f64,
    pub size: f64,
    /// Pixels risen per frame.
    pub speed: f64,
    /// Base opacity before the shimmer term.
    pub opacity: f64,
    /// Initial rotation in degrees.
    pub rotation: f64,
}

/// Heart state at one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartPose {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub rotation_deg: f64,
    pub alpha: f64,
}

/// One twinkling star of the outro.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Star {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub phase: f64,
}

pub const HEART_COUNT: usize = 15;
pub const STAR_COUNT: usize = 20;

/// Hearts wrap to the bottom once they rise above this line.
const HEART_WRAP_ABOVE: f64 = -50.0;

/// Degrees of rotation per frame.
const HEART_SPIN: f64 = 0.5;

/// The intro and outro particle fields of one export.
#[derive(Debug, Clone)]
pub struct ParticleField {
    width: f64,
    height: f64,
    hearts: Vec<Heart>,
    stars: Vec<Star>,
}

impl ParticleField {
    pub fn new(seed: u64, width: f64, height: f64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);

        let hearts = (0..HEART_COUNT)
            .map(|_| Heart {
                x: rng.f64() * width,
                y: rng.f64() * height,
                size: 20.0 + rng.f64() * 30.0,
                speed: 1.0 + rng.f64() * 2.0,
                opacity: 0.3 + rng.f64() * 0.5,
                rotation: rng.f64() * 360.0,
            })
            .collect();

        let stars = (0..STAR_COUNT)
            .map(|_| Star {
                x: rng.f64() * width,
                y: rng.f64() * height,
                size: 3.0 + rng.f64() * 5.0,
                phase: rng.f64() * std::f64::consts::TAU,
            })
            .collect();

        Self {
            width,
            height,
            hearts,
            stars,
        }
    }

    pub fn hearts(&self) -> &[Heart] {
        &self.hearts
    }

    pub fn stars(&self) -> &[Star] {
        &self.stars
    }

    /// Heart positions at intro frame `frame`.
    ///
    /// Every frame, before drawing, a heart rises `speed` px and turns 0.5
    /// degrees; a heart that passes above -50 restarts at `height + 50`.
    /// Frame 0 is therefore already one step in.
    pub fn hearts_at(&self, frame: u32) -> impl Iterator<Item = HeartPose> + '_ {
        let f = frame as f64;
        let steps = f + 1.0;
        let restart = self.height - HEART_WRAP_ABOVE;
        self.hearts.iter().map(move |heart| {
            // Step that first lands above the wrap line, then the restart period.
            let first_wrap = ((heart.y - HEART_WRAP_ABOVE) / heart.speed).floor().max(0.0) + 1.0;
            let period = ((restart - HEART_WRAP_ABOVE) / heart.speed).floor() + 1.0;
            let y = if steps < first_wrap {
                heart.y - heart.speed * steps
            } else {
                restart - ((steps - first_wrap) % period) * heart.speed
            };
            HeartPose {
                x: heart.x,
                y,
                size: heart.size,
                rotation_deg: (heart.rotation + HEART_SPIN * steps) % 360.0,
                alpha: heart.opacity * (0.5 + 0.5 * (f * 0.1 + heart.x).sin()),
            }
        })
    }

    /// Star brightness at outro frame `frame`, in [0, 1].
    pub fn twinkle(star: &Star, frame: u32) -> f64 {
        (frame as f64 * 0.1 + star.phase).sin() * 0.5 + 0.5
    }

    pub fn width(&self) -> f64 {
        self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_field() {
        let a = ParticleField::new(7, 720.0, 1280.0);
        let b = ParticleField::new(7, 720.0, 1280.0);
        assert_eq!(a.hearts(), b.hearts());
        assert_eq!(a.stars(), b.stars());
        assert_eq!(a.hearts().len(), HEART_COUNT);
        assert_eq!(a.stars().len(), STAR_COUNT);
    }

    #[test]
    fn test_field_ranges() {
        let field = ParticleField::new(42, 720.0, 1280.0);
        for heart in field.hearts() {
            assert!((20.0..50.0).contains(&heart.size));
            assert!((1.0..3.0).contains(&heart.speed));
            assert!((0.3..0.8).contains(&heart.opacity));
        }
        for star in field.stars() {
            assert!((3.0..8.0).contains(&star.size));
        }
    }

    #[test]
    fn test_hearts_rise_and_wrap() {
        let field = ParticleField::new(1, 720.0, 1280.0);
        let first: Vec<HeartPose> = field.hearts_at(0).collect();
        let later: Vec<HeartPose> = field.hearts_at(10).collect();
        for ((heart, a), b) in field.hearts().iter().zip(&first).zip(&later) {
            let risen = heart.y - heart.speed * 11.0;
            if risen >= -50.0 {
                assert!((b.y - risen).abs() < 1e-9);
            }
            if heart.y - heart.speed >= -50.0 {
                assert!((a.y - (heart.y - heart.speed)).abs() < 1e-9);
            }
        }
        // Long after the start every heart is still inside the wrap band.
        for pose in field.hearts_at(5000) {
            assert!(pose.y >= -50.0 && pose.y <= 1280.0 + 50.0, "y = {}", pose.y);
        }
    }

    #[test]
    fn test_first_frame_is_one_step_in() {
        let field = ParticleField::new(4, 720.0, 1280.0);
        for (pose, heart) in field.hearts_at(0).zip(field.hearts()) {
            assert!((pose.rotation_deg - (heart.rotation + 0.5) % 360.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_wrap_matches_stepwise_motion() {
        let field = ParticleField::new(11, 720.0, 1280.0);
        let mut ys: Vec<f64> = field.hearts().iter().map(|h| h.y).collect();
        for frame in 0..600 {
            for (y, heart) in ys.iter_mut().zip(field.hearts()) {
                *y -= heart.speed;
                if *y < -50.0 {
                    *y = 1280.0 + 50.0;
                }
            }
            for (pose, y) in field.hearts_at(frame).zip(&ys) {
                assert!((pose.y - y).abs() < 1e-6, "frame {frame}: {} vs {y}", pose.y);
            }
        }
    }

    #[test]
    fn test_heart_alpha_never_exceeds_base_opacity() {
        let field = ParticleField::new(3, 720.0, 1280.0);
        for frame in 0..90 {
            for (pose, heart) in field.hearts_at(frame).zip(field.hearts()) {
                assert!(pose.alpha >= 0.0 && pose.alpha <= heart.opacity + 1e-12);
            }
        }
    }
}
