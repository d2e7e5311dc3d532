use crate::vehicle::{RawVehicleRecord, VehiclePosition};

/// Keeps the records whose position and speed are all known, in input order.
pub fn renderable_positions<I>(records: I) -> Vec<VehiclePosition>
where
    I: IntoIterator<Item = RawVehicleRecord>,
{
    records
        .into_iter()
        .filter_map(VehiclePosition::from_raw)
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub kept: usize,
    pub dropped: usize,
}

/// Same as [`renderable_positions`], but also reports how many records were
/// dropped for having an unknown position.
pub fn partition_renderable<I>(records: I) -> (Vec<VehiclePosition>, FilterOutcome)
where
    I: IntoIterator<Item = RawVehicleRecord>,
{
    let mut outcome = FilterOutcome::default();
    let positions = records
        .into_iter()
        .filter_map(|record| {
            let position = VehiclePosition::from_raw(record);
            match position {
                Some(_) => outcome.kept += 1,
                None => outcome.dropped += 1,
            }
            position
        })
        .collect();
    (positions, outcome)
}
