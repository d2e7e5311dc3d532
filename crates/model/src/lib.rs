pub mod filter;
pub mod vehicle;

pub use filter::{partition_renderable, renderable_positions, FilterOutcome};
pub use vehicle::{Coordinates, RawVehicleRecord, Vehicle, VehiclePosition};
