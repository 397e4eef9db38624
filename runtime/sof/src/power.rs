// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

use {
    sof_ctl_protocols::*,
    std::{
        path::{Path, PathBuf},
        sync::Mutex,
        time::{Duration, Instant},
    },
    tracing::debug,
};

/// Runtime power management of the device by attributes in sysfs.
#[derive(Debug)]
pub struct SysfsRuntimePm {
    dir: PathBuf,
    last_busy: Mutex<Option<Instant>>,
}

impl SysfsRuntimePm {
    const CONTROL: &'static str = "control";
    const AUTOSUSPEND_DELAY_MS: &'static str = "autosuspend_delay_ms";

    pub fn new(dir: &Path) -> Result<Self, Error> {
        let path = dir.join(Self::CONTROL);
        if !path.is_file() {
            let msg = format!("{} is not available", path.display());
            return Err(Error::new(ControlProtocolError::Io, &msg));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            last_busy: Default::default(),
        })
    }

    fn write_attr(&self, name: &str, value: &str) -> Result<(), Error> {
        let path = self.dir.join(name);
        std::fs::write(&path, value).map_err(|e| {
            let msg = format!("Fail to write '{}' to {}: {}", value, path.display(), e);
            Error::new(ControlProtocolError::Io, &msg)
        })?;
        debug!(attr = name, value);
        Ok(())
    }

    fn allow_suspend(&self, delay: Duration) -> Result<(), Error> {
        self.write_attr(Self::AUTOSUSPEND_DELAY_MS, &delay.as_millis().to_string())?;
        self.write_attr(Self::CONTROL, "auto")
    }
}

impl PowerOperation for SysfsRuntimePm {
    fn resume_sync(&self) -> Result<(), Error> {
        // The write blocks till the device is resumed.
        self.write_attr(Self::CONTROL, "on")
    }

    fn mark_last_busy(&self) {
        if let Ok(mut last_busy) = self.last_busy.lock() {
            *last_busy = Some(Instant::now());
        }
    }

    fn schedule_idle(&self, delay: Duration) -> Result<(), Error> {
        if let Ok(last_busy) = self.last_busy.lock() {
            let elapsed = last_busy.map(|at| at.elapsed().as_micros() as u64);
            debug!(?elapsed, delay_ms = delay.as_millis() as u64);
        }
        self.allow_suspend(delay)
    }

    fn force_suspend(&self) -> Result<(), Error> {
        self.allow_suspend(Duration::ZERO)
    }
}

/// For the device without runtime power management.
#[derive(Default, Debug)]
pub struct AlwaysOn;

impl PowerOperation for AlwaysOn {
    fn resume_sync(&self) -> Result<(), Error> {
        Ok(())
    }

    fn mark_last_busy(&self) {}

    fn schedule_idle(&self, _: Duration) -> Result<(), Error> {
        Ok(())
    }

    fn force_suspend(&self) -> Result<(), Error> {
        Ok(())
    }
}

#[derive(Debug)]
pub enum RuntimePower {
    Sysfs(SysfsRuntimePm),
    AlwaysOn(AlwaysOn),
}

impl RuntimePower {
    pub fn new(dir: Option<&Path>) -> Result<Self, Error> {
        match dir {
            Some(dir) => SysfsRuntimePm::new(dir).map(RuntimePower::Sysfs),
            None => Ok(RuntimePower::AlwaysOn(AlwaysOn)),
        }
    }

    fn ops(&self) -> &dyn PowerOperation {
        match self {
            RuntimePower::Sysfs(pm) => pm,
            RuntimePower::AlwaysOn(pm) => pm,
        }
    }
}

impl PowerOperation for RuntimePower {
    fn resume_sync(&self) -> Result<(), Error> {
        self.ops().resume_sync()
    }

    fn mark_last_busy(&self) {
        self.ops().mark_last_busy()
    }

    fn schedule_idle(&self, delay: Duration) -> Result<(), Error> {
        self.ops().schedule_idle(delay)
    }

    fn force_suspend(&self) -> Result<(), Error> {
        self.ops().force_suspend()
    }
}
