//! Capsule-stroked lines with angle-dependent width compensation.
//!
//! A one-pixel GL line rasterizes with visibly different weight depending
//! on its angle: near-axis-aligned lines cover whole texel rows while
//! diagonals spread coverage across the pixel grid. The helper here draws
//! a line as a pair of thin quads (four triangles) instead, choosing the
//! stroke width from a lookup table keyed by the line's angle relative to
//! the nearest axis.
//!
//! The table is a rendering-quality tuning parameter, not algorithm state,
//! so it is owned by the caller and passed in; [`StrokeTable::default`]
//! carries the stock compensation values.

use crate::batch_set::BatchSet;
use crate::color::Rgba;

/// One entry of the width table: lines whose axis-relative angle falls in
/// `[min_deg, max_deg)` are stroked `width` pixels wide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeBand {
    /// Inclusive lower bound, degrees from the nearest axis (0–45).
    pub min_deg: f32,
    /// Exclusive upper bound, degrees from the nearest axis.
    pub max_deg: f32,
    /// Stroke width in pixels.
    pub width: f32,
}

/// Angle-band → stroke-width lookup for capsule lines.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeTable {
    bands: Vec<StrokeBand>,
}

impl Default for StrokeTable {
    /// The stock compensation table: full width at the axes, tapering to
    /// 0.72 at the diagonal. Boundaries are hard thresholds; the 15° entry
    /// corresponds to 75° relative to the opposite axis.
    fn default() -> Self {
        Self {
            bands: vec![
                StrokeBand {
                    min_deg: 5.0,
                    max_deg: 15.0,
                    width: 0.965,
                },
                StrokeBand {
                    min_deg: 15.0,
                    max_deg: 25.0,
                    width: 0.90,
                },
                StrokeBand {
                    min_deg: 25.0,
                    max_deg: 33.0,
                    width: 0.87,
                },
                StrokeBand {
                    min_deg: 33.0,
                    max_deg: 39.0,
                    width: 0.81,
                },
                StrokeBand {
                    min_deg: 39.0,
                    max_deg: 44.0,
                    width: 0.74,
                },
                StrokeBand {
                    min_deg: 44.0,
                    max_deg: 45.1,
                    width: 0.72,
                },
            ],
        }
    }
}

impl StrokeTable {
    /// Build a table from explicit bands. Angles outside every band fall
    /// back to a width of 1.0.
    #[must_use]
    pub fn new(bands: Vec<StrokeBand>) -> Self {
        Self { bands }
    }

    /// Stroke width for a line at `angle_deg` (any range; folded to the
    /// 0–45° distance from the nearest axis internally).
    #[must_use]
    pub fn width_for_angle(&self, angle_deg: f32) -> f32 {
        let folded = fold_to_axis_distance(angle_deg);
        self.bands
            .iter()
            .find(|band| folded >= band.min_deg && folded < band.max_deg)
            .map_or(1.0, |band| band.width)
    }
}

/// Fold an arbitrary angle to its distance in degrees from the nearest
/// axis (horizontal or vertical), in `[0, 45]`.
fn fold_to_axis_distance(angle_deg: f32) -> f32 {
    let wrapped = angle_deg.rem_euclid(90.0);
    wrapped.min(90.0 - wrapped)
}

/// Draw a line as a capsule: two thin quads (four triangles) flanking the
/// mathematical line, each offset perpendicular by half the table's width
/// for this angle.
///
/// Goes through [`BatchSet::add_tri`], so the stroke participates in z
/// assignment and alpha ordering exactly like four hand-submitted
/// triangles.
#[allow(clippy::too_many_arguments)]
pub fn add_capsule_line(
    batches: &mut BatchSet,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    color: Rgba,
    cx: f32,
    cy: f32,
    angle: f32,
    table: &StrokeTable,
) {
    let dx = x1 - x0;
    let dy = y1 - y0;
    let length = (dx * dx + dy * dy).sqrt();
    if length <= f32::EPSILON {
        return;
    }

    let line_angle = dy.atan2(dx).to_degrees();
    let width = table.width_for_angle(line_angle);
    let half = width / 2.0;

    // Unit normal to the line direction.
    let nx = -dy / length;
    let ny = dx / length;
    let (ox, oy) = (nx * half, ny * half);

    // Quad on the +normal side.
    batches.add_tri(x0, y0, x1, y1, x1 + ox, y1 + oy, color, cx, cy, angle);
    batches.add_tri(x0, y0, x1 + ox, y1 + oy, x0 + ox, y0 + oy, color, cx, cy, angle);
    // Quad on the -normal side.
    batches.add_tri(x0, y0, x1, y1, x1 - ox, y1 - oy, color, cx, cy, angle);
    batches.add_tri(x0, y0, x1 - ox, y1 - oy, x0 - ox, y0 - oy, color, cx, cy, angle);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::batch::PrimitiveKind;
    use crate::color::rgb;

    #[test]
    fn axis_aligned_lines_get_full_width() {
        let table = StrokeTable::default();
        for angle in [0.0, 90.0, 180.0, 270.0, -90.0, 360.0] {
            assert!((table.width_for_angle(angle) - 1.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn diagonals_get_the_narrowest_width() {
        let table = StrokeTable::default();
        for angle in [45.0, 135.0, -45.0, 225.0] {
            assert!((table.width_for_angle(angle) - 0.72).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn width_decreases_monotonically_toward_the_diagonal() {
        let table = StrokeTable::default();
        let widths: Vec<f32> = (0..=45)
            .map(|deg| {
                #[allow(clippy::cast_precision_loss)]
                let deg = deg as f32;
                table.width_for_angle(deg)
            })
            .collect();
        for pair in widths.windows(2) {
            assert!(pair[0] >= pair[1], "widths not monotonic: {widths:?}");
        }
    }

    #[test]
    fn band_boundaries_are_hard_thresholds() {
        let table = StrokeTable::default();
        assert!((table.width_for_angle(14.9) - 0.965).abs() < f32::EPSILON);
        assert!((table.width_for_angle(15.0) - 0.90).abs() < f32::EPSILON);
        // 75° is 15° from vertical; the same band applies.
        assert!((table.width_for_angle(75.0) - 0.90).abs() < f32::EPSILON);
    }

    #[test]
    fn capsule_emits_four_triangles() {
        let mut set = BatchSet::new();
        add_capsule_line(
            &mut set,
            0.0,
            0.0,
            10.0,
            0.0,
            rgb(0xffffff),
            0.0,
            0.0,
            0.0,
            &StrokeTable::default(),
        );
        assert_eq!(set.vertex_count_opaque(PrimitiveKind::Tri), 12);
    }

    #[test]
    fn zero_length_lines_emit_nothing() {
        let mut set = BatchSet::new();
        add_capsule_line(
            &mut set,
            3.0,
            3.0,
            3.0,
            3.0,
            rgb(0xffffff),
            0.0,
            0.0,
            0.0,
            &StrokeTable::default(),
        );
        assert_eq!(set.vertex_count_opaque(PrimitiveKind::Tri), 0);
    }

    #[test]
    fn custom_tables_override_the_stock_widths() {
        let table = StrokeTable::new(vec![StrokeBand {
            min_deg: 0.0,
            max_deg: 45.1,
            width: 2.5,
        }]);
        assert!((table.width_for_angle(30.0) - 2.5).abs() < f32::EPSILON);
    }
}
