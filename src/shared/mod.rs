pub mod geo;
pub mod time;

pub use geo::*;
pub use time::*;

/// Anything that sits at a single point on the map.
pub trait Located {
    fn coordinate(&self) -> Coordinate;
}

impl Located for Coordinate {
    fn coordinate(&self) -> Coordinate {
        *self
    }
}
