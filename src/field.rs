//! The in-memory grid passed between pipeline stages

use crate::calendar::CivilTime;
use ndarray::Array2;

/// A named 2-D scalar field on a lon/lat grid at one point in time.
///
/// `data` is `ny × nx` with row 0 at the northernmost latitude; `x` is
/// normalized to `[0, 360)` but keeps the source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub data: Array2<f64>,
    pub dx: f64,
    pub dy: f64,
    pub time: CivilTime,
}

/// Corners of a field as written to the output header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lo1: f64,
    pub la1: f64,
    pub lo2: f64,
    pub la2: f64,
}

impl Field {
    pub fn nx(&self) -> usize {
        self.x.len()
    }

    pub fn ny(&self) -> usize {
        self.y.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether `other` lives on exactly the same grid.
    pub fn same_grid(&self, other: &Field) -> bool {
        self.x == other.x && self.y == other.y && self.data.dim() == other.data.dim()
    }

    /// `lo1`/`lo2` are the min/max longitude, `la1`/`la2` the max/min latitude.
    pub fn bounding_box(&self) -> BoundingBox {
        let (lo1, lo2) = min_max(&self.x);
        let (la2, la1) = min_max(&self.y);
        BoundingBox { lo1, la1, lo2, la2 }
    }
}

/// Shift negative longitudes into `[0, 360)`, keeping the axis order.
pub fn normalize_longitudes(x: &mut [f64]) {
    for lon in x.iter_mut() {
        if *lon < 0.0 {
            *lon += 360.0;
        }
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_longitude_normalization_keeps_order() {
        let mut x = vec![-10.0, 0.0, 10.0];
        normalize_longitudes(&mut x);
        assert_eq!(x, vec![350.0, 0.0, 10.0]);
        assert!(x.iter().all(|&v| (0.0..360.0).contains(&v)));
    }

    #[test]
    fn test_bounding_box() {
        let field = Field {
            name: "u".into(),
            x: vec![350.0, 0.0, 10.0],
            y: vec![20.0, 10.0],
            data: array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
            dx: 10.0,
            dy: 10.0,
            time: CivilTime::new(2021, 1, 1, 0, 0, 0),
        };
        let bbox = field.bounding_box();
        assert_eq!(bbox.lo1, 0.0);
        assert_eq!(bbox.lo2, 350.0);
        assert_eq!(bbox.la1, 20.0);
        assert_eq!(bbox.la2, 10.0);
        assert_eq!(field.len(), field.nx() * field.ny());
    }
}
