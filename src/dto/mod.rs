pub mod envelope;
pub mod location_row;

pub use envelope::Envelope;
pub use location_row::{Coordinates, LocationRow};
