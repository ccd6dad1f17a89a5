// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Scene-wide render options (lights, edge styling, helpers).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scene-wide render options.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RenderOptions {
    /// Ambient light intensity.
    pub ambient_intensity: f32,
    /// Directional light intensity.
    pub direct_intensity: f32,
    /// Edge color as `#rrggbb`.
    pub edge_color: String,
    /// Render solids semi-transparent.
    pub transparent: bool,
    /// Draw edges black instead of `edge_color`.
    pub black_edges: bool,
    /// Show the axes helper at the scene center.
    pub axes: bool,
    /// Place the axes helper at the world origin instead.
    pub axes0: bool,
    /// Grid visibility for the xy, xz and yz planes.
    pub grid: [bool; 3],
    /// Approximate tick count of the grids.
    pub ticks: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            ambient_intensity: 0.9,
            direct_intensity: 0.12,
            edge_color: "#707070".to_owned(),
            transparent: false,
            black_edges: false,
            axes: false,
            axes0: false,
            grid: [false; 3],
            ticks: 10,
        }
    }
}
