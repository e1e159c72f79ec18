//! Zone rectangles and the pixel → millimetre mapping.

use serde::{Deserialize, Serialize};

/// Axis-aligned zone rectangle in pixel coordinates (as drawn in a panel
/// designer).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub w: f64,
    /// Height.
    pub h: f64,
}

fn overlap_len(a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    (a1.min(b1) - a0.max(b0)).max(0.0)
}

fn gap_len(a0: f64, a1: f64, b0: f64, b1: f64) -> f64 {
    (b0 - a1).max(a0 - b1).max(0.0)
}

impl Rect {
    fn right(&self) -> f64 {
        self.x + self.w
    }

    fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Whether two zones touch: overlap on one axis with at most `max_gap`
    /// pixels of separation on the other. Overlapping rectangles have zero
    /// gap on both axes and are always adjacent.
    #[must_use]
    pub fn is_adjacent(&self, other: &Self, max_gap: f64) -> bool {
        let x_overlap = overlap_len(self.x, self.right(), other.x, other.right());
        let y_overlap = overlap_len(self.y, self.bottom(), other.y, other.bottom());
        let x_gap = gap_len(self.x, self.right(), other.x, other.right());
        let y_gap = gap_len(self.y, self.bottom(), other.y, other.bottom());
        (x_overlap > 0.0 && y_gap <= max_gap) || (y_overlap > 0.0 && x_gap <= max_gap)
    }
}

/// Physical measurements derived from the zone rectangles.
///
/// The scale maps the bounding extent of all zones to the configured panel
/// length, so a panel drawn at any zoom level gets the same physical
/// interpretation.
#[derive(Debug, Clone)]
pub(crate) struct PanelGeometry {
    areas_mm2: Vec<f64>,
    min_edges_mm: Vec<f64>,
}

impl PanelGeometry {
    pub(crate) fn from_rects(rects: &[Rect], panel_length_mm: f64) -> Self {
        let min_x = rects.iter().map(|r| r.x).fold(f64::INFINITY, f64::min);
        let min_y = rects.iter().map(|r| r.y).fold(f64::INFINITY, f64::min);
        let max_x = rects.iter().map(Rect::right).fold(f64::NEG_INFINITY, f64::max);
        let max_y = rects.iter().map(Rect::bottom).fold(f64::NEG_INFINITY, f64::max);
        let extent_px = (max_x - min_x).max(max_y - min_y);
        let scale = if extent_px > 0.0 {
            panel_length_mm / extent_px
        } else {
            1.0
        };

        Self {
            areas_mm2: rects.iter().map(|r| r.w * scale * r.h * scale).collect(),
            min_edges_mm: rects.iter().map(|r| r.w.min(r.h) * scale).collect(),
        }
    }

    pub(crate) fn area_mm2(&self, zone: usize) -> f64 {
        self.areas_mm2[zone]
    }

    pub(crate) fn min_edge_mm(&self, zone: usize) -> f64 {
        self.min_edges_mm[zone]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_rects_are_adjacent() {
        let a = Rect { x: 0.0, y: 0.0, w: 100.0, h: 100.0 };
        let b = Rect { x: 50.0, y: 50.0, w: 100.0, h: 100.0 };
        assert!(a.is_adjacent(&b, 40.0));
    }

    #[test]
    fn test_gap_within_threshold_is_adjacent() {
        let a = Rect { x: 0.0, y: 0.0, w: 100.0, h: 100.0 };
        // 30 px to the right, fully overlapping in y.
        let b = Rect { x: 130.0, y: 0.0, w: 100.0, h: 100.0 };
        assert!(a.is_adjacent(&b, 40.0));
        // 50 px away: beyond the threshold.
        let c = Rect { x: 150.0, y: 0.0, w: 100.0, h: 100.0 };
        assert!(!a.is_adjacent(&c, 40.0));
    }

    #[test]
    fn test_diagonal_rects_are_not_adjacent() {
        let a = Rect { x: 0.0, y: 0.0, w: 100.0, h: 100.0 };
        // Close on both axes but overlapping on neither.
        let b = Rect { x: 110.0, y: 110.0, w: 100.0, h: 100.0 };
        assert!(!a.is_adjacent(&b, 40.0));
    }

    #[test]
    fn test_scale_maps_extent_to_panel_length() {
        let rects = [
            Rect { x: 0.0, y: 0.0, w: 300.0, h: 150.0 },
            Rect { x: 300.0, y: 0.0, w: 300.0, h: 150.0 },
        ];
        // Bounding extent 600 px wide → scale 0.5 mm/px for a 300 mm panel.
        let geometry = PanelGeometry::from_rects(&rects, 300.0);
        assert!((geometry.area_mm2(0) - 150.0 * 75.0).abs() < 1e-9);
        assert!((geometry.min_edge_mm(0) - 75.0).abs() < 1e-9);
    }
}
