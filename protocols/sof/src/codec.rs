// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

//! Codec between value in control surface and value in the device.
//!
//! The value of volume is quantized by lookup over monotonic table. The inverse lookup returns
//! the first index whose entry is not less than the value, thus several steps in both ends of
//! the table may collapse to one value in the device.

use super::*;

/// The gain of unity in Q1.16 format.
pub const VOLUME_UNITY_GAIN: u32 = 1 << 16;

/// The value of dB in centi unit at or below which the first step is mute.
pub const VOLUME_MUTE_DB: i32 = -10000;

/// Map the value of control surface to the value of device.
pub fn ui_to_device(value: u32, table: &[u32]) -> u32 {
    assert!(table.len() > 0, "Programming error for empty table");

    let pos = std::cmp::min(value as usize, table.len() - 1);
    table[pos]
}

/// Map the value of device to the value of control surface.
pub fn device_to_ui(value: u32, table: &[u32]) -> u32 {
    assert!(table.len() > 0, "Programming error for empty table");

    table
        .iter()
        .position(|&entry| entry >= value)
        .unwrap_or(table.len() - 1) as u32
}

/// Non-decreasing table from step in control surface to value in the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeTable(Vec<u32>);

impl VolumeTable {
    pub fn new(entries: Vec<u32>) -> Result<Self, Error> {
        if entries.is_empty() {
            Err(Error::new(
                ControlProtocolError::InvalidArgument,
                "The volume table should have one entry at least",
            ))
        } else if let Some(pos) = entries.windows(2).position(|w| w[0] > w[1]) {
            let msg = format!(
                "The volume table should be non-decreasing, but entry {} is 0x{:x} after 0x{:x}",
                pos + 1,
                entries[pos + 1],
                entries[pos]
            );
            Err(Error::new(ControlProtocolError::InvalidArgument, &msg))
        } else {
            Ok(Self(entries))
        }
    }

    /// Generate linear gains in Q1.16 format for the steps in dB scale.
    ///
    /// The minimum and step are in centi dB unit.
    pub fn from_db_scale(min: i32, step: i32, steps: usize) -> Result<Self, Error> {
        if steps == 0 || step < 0 {
            let msg = format!(
                "Invalid dB scale: min {}, step {}, steps {}",
                min, step, steps
            );
            return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
        }

        let entries = (0..steps)
            .map(|i| {
                let db = min as i64 + step as i64 * i as i64;
                if i == 0 && db <= VOLUME_MUTE_DB as i64 {
                    0
                } else {
                    let gain = 10f64.powf(db as f64 / 2000.0) * VOLUME_UNITY_GAIN as f64;
                    gain.round().min(u32::MAX as f64) as u32
                }
            })
            .collect();

        Self::new(entries)
    }

    /// The maximum index of step in control surface.
    pub fn max_index(&self) -> u32 {
        (self.0.len() - 1) as u32
    }

    pub fn entries(&self) -> &[u32] {
        &self.0
    }

    pub fn ui_to_device(&self, value: u32) -> u32 {
        ui_to_device(value, &self.0)
    }

    pub fn device_to_ui(&self, value: u32) -> u32 {
        device_to_ui(value, &self.0)
    }
}

/// Convert the value of control surface to the value of device according to the kind.
pub(crate) fn encode_channel_value(kind: &ControlKind, value: i64) -> Result<u32, Error> {
    if value < 0 || value > u32::MAX as i64 {
        let msg = format!("The value {} is out of range", value);
        return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
    }

    let val = match kind {
        ControlKind::Volume(table) => table.ui_to_device(value as u32),
        _ => value as u32,
    };

    Ok(val)
}

/// Convert the value of device to the value of control surface according to the kind.
pub(crate) fn decode_channel_value(kind: &ControlKind, value: u32) -> i64 {
    match kind {
        ControlKind::Volume(table) => table.device_to_ui(value) as i64,
        _ => value as i64,
    }
}
