//! Frame rates and frame-to-time conversion.
//!
//! Frame rates are kept as numerator/denominator pairs so that NTSC rates
//! such as 30000/1001 survive a round trip through ffprobe.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame rate as a rational number (e.g., 30000/1001 for 29.97 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 30000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Approximate a floating-point rate with a millisecond-precision fraction.
    pub fn from_fps_f64(fps: f64) -> Self {
        if !fps.is_finite() || fps <= 0.0 {
            return Self::new(0, 1);
        }
        if (fps - fps.round()).abs() < 1e-6 {
            return Self::new(fps.round() as u32, 1);
        }
        Self::new((fps * 1000.0).round() as u32, 1000)
    }

    /// Parse `"30000/1001"` or `"29.97"` as printed by ffprobe.
    ///
    /// Returns `None` for malformed input and for `0/0`, which ffprobe
    /// prints when a stream has no usable rate.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some((num, den)) = s.split_once('/') {
            let num: u32 = num.trim().parse().ok()?;
            let den: u32 = den.trim().parse().ok()?;
            if num == 0 || den == 0 {
                return None;
            }
            return Some(Self::new(num, den));
        }
        let fps: f64 = s.parse().ok()?;
        let rate = Self::from_fps_f64(fps);
        rate.is_valid().then_some(rate)
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        if self.denominator == 0 {
            return 0.0;
        }
        self.numerator as f64 / self.denominator as f64
    }

    /// A rate with a non-zero numerator and denominator.
    pub fn is_valid(self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Common frame rates
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_30
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}

/// Format a frame index as `HH:MM:SS.mmm` at the given rate.
pub fn frame_to_timecode(frame: u64, fps: f64) -> String {
    let total_ms = if fps > 0.0 {
        (frame as f64 * 1000.0 / fps).round() as u64
    } else {
        0
    };
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        ms
    )
}
