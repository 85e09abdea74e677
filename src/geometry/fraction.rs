use geo::{Distance, Euclidean, LineLocatePoint};
use geo_types::{Coord, LineString, Point};

/// Round a fraction to the two decimals used for split decisions.
pub fn round_fraction(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Position of a sub-segment along its parent line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fraction {
    pub start: f64,
    pub end: f64,
    /// First coordinate of the sub-segment.
    pub start_point: Coord<f64>,
    /// Last coordinate of the sub-segment.
    pub end_point: Coord<f64>,
}

impl Fraction {
    /// Fractions of `sub`'s endpoints projected onto `parent`, rounded.
    ///
    /// `None` if either line is empty or `parent` has zero length.
    pub fn locate(parent: &LineString<f64>, sub: &LineString<f64>) -> Option<Self> {
        let first = *sub.0.first()?;
        let last = *sub.0.last()?;
        if line_length(parent) == 0.0 {
            return None;
        }
        let start = parent.line_locate_point(&Point::from(first))?;
        let end = parent.line_locate_point(&Point::from(last))?;
        Some(Fraction {
            start: round_fraction(start),
            end: round_fraction(end),
            start_point: first,
            end_point: last,
        })
    }

    /// Covers the whole parent line.
    pub fn is_full(&self) -> bool {
        self.start == 0.0 && self.end == 1.0
    }

    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }

    /// Same range with `start <= end`; endpoints swap along with the fractions.
    pub fn normalized(self) -> Self {
        if self.start <= self.end {
            return self;
        }
        Fraction {
            start: self.end,
            end: self.start,
            start_point: self.end_point,
            end_point: self.start_point,
        }
    }

    /// Whether this range shares a stretch of positive length with `[start, end]`.
    pub fn overlaps(&self, start: f64, end: f64) -> bool {
        self.start < end && self.end > start
    }
}

fn line_length(line: &LineString<f64>) -> f64 {
    line.lines()
        .map(|segment| Euclidean.distance(segment.start_point(), segment.end_point()))
        .sum()
}

/// Unrounded fraction of every vertex along `line`.
pub fn vertex_fractions(line: &LineString<f64>) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(line.0.len());
    let mut total = 0.0;
    for (i, coord) in line.0.iter().enumerate() {
        if i > 0 {
            total += Euclidean.distance(Point::from(line.0[i - 1]), Point::from(*coord));
        }
        cumulative.push(total);
    }
    if total > 0.0 {
        for value in &mut cumulative {
            *value /= total;
        }
    }
    cumulative
}
