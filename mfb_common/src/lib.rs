mod geo;
mod money;

pub mod op;

pub use geo::{distance_km, Coordinates, EARTH_RADIUS_KM};
pub use money::{Cents, CentsConversionError, DEFAULT_CURRENCY_CODE, DEFAULT_CURRENCY_CODE_LOWER};
