//! N-dimensional bounding boxes.
//!
//! An [`Envelope`] is a list of per-axis intervals. The first two axes are
//! the horizontal/spatial ones; any further axes carry temporal, elevation
//! or other non-spatial coordinates. Envelopes are only ever intersected and
//! merged here; reprojecting them between reference systems is the job of an
//! external collaborator.

use serde::{Deserialize, Serialize};

use crate::cartesian::Rect;

/// Closed interval on one envelope axis.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl AxisRange {
    /// Creates a range, swapping the endpoints if given in reverse order.
    pub fn new(min: f64, max: f64) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self {
                min: max,
                max: min,
            }
        }
    }

    /// A zero-length range anchored at a single coordinate.
    pub fn degenerate(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Length of the interval.
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Returns true if the two intervals share at least one point.
    pub fn intersects(&self, other: &AxisRange) -> bool {
        self.min <= other.max && self.max >= other.min
    }

    /// Returns true if the coordinate lies inside the interval.
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && self.max >= value
    }

    /// Common part of the two intervals, if any.
    pub fn intersection(&self, other: &AxisRange) -> Option<AxisRange> {
        if self.intersects(other) {
            Some(AxisRange {
                min: self.min.max(other.min),
                max: self.max.min(other.max),
            })
        } else {
            None
        }
    }

    /// Smallest interval containing both inputs.
    pub fn merge(&self, other: &AxisRange) -> AxisRange {
        AxisRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// N-dimensional axis-aligned bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    axes: Vec<AxisRange>,
}

impl Envelope {
    /// Creates an envelope from its per-axis intervals.
    pub fn new(axes: Vec<AxisRange>) -> Self {
        Self { axes }
    }

    /// Two-dimensional envelope over the given rectangle.
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self {
            axes: vec![
                AxisRange::new(rect.x_min, rect.x_max),
                AxisRange::new(rect.y_min, rect.y_max),
            ],
        }
    }

    /// Number of axes.
    pub fn dimension(&self) -> usize {
        self.axes.len()
    }

    /// Interval of one axis.
    pub fn axis(&self, index: usize) -> Option<&AxisRange> {
        self.axes.get(index)
    }

    /// All axis intervals in order.
    pub fn axes(&self) -> &[AxisRange] {
        &self.axes
    }

    /// The spatial (first two axes) part of the envelope.
    pub fn spatial(&self) -> Option<Rect<f64>> {
        match self.axes.as_slice() {
            [x, y, ..] => Some(Rect::new(x.min, y.min, x.max, y.max)),
            _ => None,
        }
    }

    /// Returns true if the envelopes intersect on every axis they share.
    ///
    /// Axes present in only one of the envelopes are unconstrained: a purely
    /// spatial query envelope intersects any mosaic envelope whose spatial
    /// part it overlaps, whatever the mosaic's extra-axis coordinates are.
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.axes
            .iter()
            .zip(other.axes.iter())
            .all(|(a, b)| a.intersects(b))
    }

    /// Common part of the two envelopes over their shared axes, if any.
    pub fn intersection(&self, other: &Envelope) -> Option<Envelope> {
        let axes: Option<Vec<AxisRange>> = self
            .axes
            .iter()
            .zip(other.axes.iter())
            .map(|(a, b)| a.intersection(b))
            .collect();
        let axes = axes?;
        if axes.is_empty() {
            None
        } else {
            Some(Envelope { axes })
        }
    }

    /// Smallest envelope containing both inputs, axis by axis.
    ///
    /// The result has as many axes as the shorter of the two inputs.
    pub fn merge(&self, other: &Envelope) -> Envelope {
        Envelope {
            axes: self
                .axes
                .iter()
                .zip(other.axes.iter())
                .map(|(a, b)| a.merge(b))
                .collect(),
        }
    }

    /// Returns true if the coordinate tuple lies inside the envelope.
    ///
    /// The tuple must provide a value for every axis of the envelope.
    pub fn contains_point(&self, coords: &[f64]) -> bool {
        coords.len() >= self.axes.len()
            && self
                .axes
                .iter()
                .zip(coords.iter())
                .all(|(axis, value)| axis.contains(*value))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn interval_intersection_span() {
        let common = AxisRange::new(0.0, 0.3)
            .intersection(&AxisRange::new(0.1, 0.5))
            .unwrap();
        assert_abs_diff_eq!(common.min, 0.1);
        assert_abs_diff_eq!(common.span(), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn reversed_endpoints_are_swapped() {
        let range = AxisRange::new(10.0, -10.0);
        assert_eq!(range.min, -10.0);
        assert_eq!(range.max, 10.0);
    }

    #[test]
    fn spatial_round_trip() {
        let rect = Rect::new(-10.0, -5.0, 10.0, 5.0);
        let envelope = Envelope::from_rect(rect);
        assert_eq!(envelope.dimension(), 2);
        assert_eq!(envelope.spatial(), Some(rect));
    }

    #[test]
    fn extra_axes_constrain_intersection() {
        let spatial = Envelope::from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        let with_time = Envelope::new(vec![
            AxisRange::new(5.0, 15.0),
            AxisRange::new(5.0, 15.0),
            AxisRange::degenerate(2020.0),
        ]);

        // A 2-d query leaves the time axis unconstrained.
        assert!(spatial.intersects(&with_time));

        let other_time = Envelope::new(vec![
            AxisRange::new(5.0, 15.0),
            AxisRange::new(5.0, 15.0),
            AxisRange::degenerate(2021.0),
        ]);
        assert!(!with_time.intersects(&other_time));
    }

    #[test]
    fn disjoint_envelopes_have_no_intersection() {
        let a = Envelope::from_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        let b = Envelope::from_rect(Rect::new(2.0, 2.0, 3.0, 3.0));
        assert!(!a.intersects(&b));
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn contains_point_checks_every_axis() {
        let envelope = Envelope::new(vec![
            AxisRange::new(0.0, 10.0),
            AxisRange::new(0.0, 10.0),
            AxisRange::new(100.0, 200.0),
        ]);
        assert!(envelope.contains_point(&[5.0, 5.0, 150.0]));
        assert!(!envelope.contains_point(&[5.0, 5.0, 50.0]));
        assert!(!envelope.contains_point(&[5.0, 5.0]));
    }
}
