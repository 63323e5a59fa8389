pub mod geo;
pub mod observation;

pub use geo::*;
pub use observation::*;
