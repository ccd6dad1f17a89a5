// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Clipping plane definitions.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A half-space clipping plane.
///
/// Geometry on the positive side of `normal · p + offset` is kept.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClipPlane {
    /// Plane normal (need not be unit length, must be non-zero).
    pub normal: [f32; 3],
    /// Signed offset along the normal.
    pub offset: f32,
    /// Whether the plane currently clips.
    pub enabled: bool,
}

impl ClipPlane {
    /// True when the plane is finite and has a non-zero normal.
    pub fn is_valid(&self) -> bool {
        self.normal.iter().all(|v| v.is_finite())
            && self.offset.is_finite()
            && self.normal.iter().any(|v| *v != 0.0)
    }
}

/// The three axis-aligned planes a fresh viewer starts with, all disabled.
pub fn default_clip_planes() -> Vec<ClipPlane> {
    [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]]
        .into_iter()
        .map(|normal| ClipPlane {
            normal,
            offset: 0.0,
            enabled: false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_three_disabled_axis_planes() {
        let planes = default_clip_planes();
        assert_eq!(planes.len(), 3);
        assert!(planes.iter().all(|p| !p.enabled && p.is_valid()));
    }

    #[test]
    fn zero_normal_is_invalid() {
        let plane = ClipPlane {
            normal: [0.0; 3],
            offset: 1.0,
            enabled: true,
        };
        assert!(!plane.is_valid());
    }
}
