// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

use {
    serde::Deserialize,
    sof_ctl_protocols::*,
    std::{
        path::{Path, PathBuf},
        time::Duration,
    },
};

fn default_autosuspend_delay_ms() -> u64 {
    DEFAULT_AUTOSUSPEND_DELAY.as_millis() as u64
}

fn default_timeout_ms() -> u64 {
    500
}

fn default_poll_us() -> u64 {
    100
}

fn default_channels() -> usize {
    1
}

/// The device file and the range of mapped region.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub path: PathBuf,
    #[serde(default)]
    pub offset: u64,
    pub size: usize,
    /// The directory of runtime power management in sysfs.
    #[serde(default)]
    pub power: Option<PathBuf>,
    #[serde(default = "default_autosuspend_delay_ms")]
    pub autosuspend_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct MailboxEntry {
    pub host_offset: usize,
    pub host_size: usize,
    pub dsp_offset: usize,
    pub dsp_size: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DoorbellEntry {
    /// The offset of register to notify request.
    pub request: usize,
    /// The offset of register to acknowledge request.
    pub ack: usize,
    pub busy: u32,
    pub done: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_us")]
    pub poll_us: u64,
}

impl DoorbellEntry {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_us)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlKindEntry {
    Volume,
    Switch,
    Enum,
    Bytes,
    Trigger,
}

/// The scale in centi dB.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DbScaleEntry {
    pub min: i32,
    pub step: i32,
    pub steps: usize,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ControlEntry {
    pub name: String,
    pub id: u32,
    pub comp_id: u32,
    #[serde(default = "default_channels")]
    pub channels: usize,
    pub kind: ControlKindEntry,
    #[serde(default)]
    pub table: Option<Vec<u32>>,
    #[serde(default)]
    pub db: Option<DbScaleEntry>,
    /// The capacity of blob including header.
    #[serde(default)]
    pub max: Option<usize>,
}

impl ControlEntry {
    fn invalid(&self, cause: &str) -> Error {
        let msg = format!("Control {}: {}", self.name, cause);
        Error::new(ControlProtocolError::InvalidArgument, &msg)
    }

    pub fn build(&self) -> Result<Control, Error> {
        let kind = match self.kind {
            ControlKindEntry::Volume => {
                let table = match (&self.table, &self.db) {
                    (Some(entries), None) => VolumeTable::new(entries.clone()),
                    (None, Some(db)) => VolumeTable::from_db_scale(db.min, db.step, db.steps),
                    _ => return Err(self.invalid("either table or db is required for volume")),
                }
                .map_err(|err| self.invalid(err.message()))?;
                ControlKind::Volume(table)
            }
            ControlKindEntry::Switch => ControlKind::Switch,
            ControlKindEntry::Enum => ControlKind::Enum,
            ControlKindEntry::Trigger => ControlKind::TriggerableSwitch,
            ControlKindEntry::Bytes => {
                let max = self
                    .max
                    .ok_or_else(|| self.invalid("max is required for bytes"))?;
                return Control::new_bytes(self.id, self.comp_id, max, CORE_ABI_VERSION)
                    .map_err(|err| self.invalid(err.message()));
            }
        };

        Control::new(self.id, self.comp_id, self.channels, kind)
            .map_err(|err| self.invalid(err.message()))
    }
}

/// The description of device and its controls.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub device: DeviceEntry,
    pub mailbox: MailboxEntry,
    pub doorbell: DoorbellEntry,
    #[serde(default)]
    pub control: Vec<ControlEntry>,
}

impl ServiceConfig {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            let msg = format!("Fail to read {}: {}", path.display(), e);
            Error::new(ControlProtocolError::Io, &msg)
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        let cfg: ServiceConfig = toml::from_str(text).map_err(|e| {
            let msg = format!("Fail to parse device description: {}", e);
            Error::new(ControlProtocolError::InvalidArgument, &msg)
        })?;

        if cfg.device.size == 0 {
            let msg = "The size of mapped region should not be zero";
            return Err(Error::new(ControlProtocolError::InvalidArgument, msg));
        }

        let layout = cfg.mailbox_layout();
        [layout.host_box, layout.dsp_box]
            .iter()
            .chain(
                [
                    Mailbox {
                        offset: cfg.doorbell.request,
                        size: 4,
                    },
                    Mailbox {
                        offset: cfg.doorbell.ack,
                        size: 4,
                    },
                ]
                .iter(),
            )
            .try_for_each(|window| {
                let out_of_region = window
                    .offset
                    .checked_add(window.size)
                    .map_or(true, |end| end > cfg.device.size);
                if window.offset % 4 > 0 || out_of_region {
                    let msg = format!(
                        "The window 0x{:x}+0x{:x} is unaligned or out of region of size 0x{:x}",
                        window.offset, window.size, cfg.device.size
                    );
                    Err(Error::new(ControlProtocolError::InvalidArgument, &msg))
                } else {
                    Ok(())
                }
            })?;

        Ok(cfg)
    }

    pub fn mailbox_layout(&self) -> MailboxLayout {
        MailboxLayout {
            host_box: Mailbox {
                offset: self.mailbox.host_offset,
                size: self.mailbox.host_size,
            },
            dsp_box: Mailbox {
                offset: self.mailbox.dsp_offset,
                size: self.mailbox.dsp_size,
            },
        }
    }

    pub fn autosuspend_delay(&self) -> Duration {
        Duration::from_millis(self.device.autosuspend_delay_ms)
    }

    pub fn build_controls(&self) -> Result<Vec<(String, Control)>, Error> {
        self.control
            .iter()
            .map(|entry| entry.build().map(|control| (entry.name.clone(), control)))
            .collect()
    }
}
