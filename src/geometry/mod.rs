mod clean;
mod fraction;

pub use clean::TagCleanFilter;
pub use fraction::{Fraction, round_fraction, vertex_fractions};
