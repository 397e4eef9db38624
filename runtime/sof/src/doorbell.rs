// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

use {
    super::config::DoorbellEntry,
    sof_ctl_protocols::*,
    std::time::{Duration, Instant},
    tracing::{debug, trace},
};

/// Doorbell by the pair of registers in the mapped region.
///
/// The command is written to the request register together with busy bit. The device sets done
/// bit in the acknowledge register when the reply is available in its window, then the bit is
/// cleared by host.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegisterDoorbell {
    request: usize,
    ack: usize,
    busy: u32,
    done: u32,
    timeout: Duration,
    poll_interval: Duration,
}

impl From<&DoorbellEntry> for RegisterDoorbell {
    fn from(entry: &DoorbellEntry) -> Self {
        Self {
            request: entry.request,
            ack: entry.ack,
            busy: entry.busy,
            done: entry.done,
            timeout: entry.timeout(),
            poll_interval: entry.poll_interval(),
        }
    }
}

impl RegisterDoorbell {
    fn check_register(region: &MappedRegion, offset: usize) -> Result<(), Error> {
        if offset % 4 > 0 || offset.checked_add(4).map_or(true, |end| end > region.len()) {
            let msg = format!(
                "The register at 0x{:x} is unaligned or out of region of size 0x{:x}",
                offset,
                region.len()
            );
            Err(Error::new(ControlProtocolError::InvalidArgument, &msg))
        } else {
            Ok(())
        }
    }
}

impl Doorbell for RegisterDoorbell {
    fn ring(&mut self, region: &MappedRegion, command: u32) -> Result<(), Error> {
        Self::check_register(region, self.request)?;
        Self::check_register(region, self.ack)?;

        region.write32(self.request, (command | self.busy).to_le());

        let start = Instant::now();
        loop {
            let val = u32::from_le(region.read32(self.ack));
            trace!(ack = %format!("0x{:08x}", val));

            if val & self.done > 0 {
                region.write32(self.ack, (val & !self.done).to_le());
                debug!(
                    command = %format!("0x{:08x}", command),
                    elapsed_us = start.elapsed().as_micros() as u64,
                );
                break Ok(());
            }

            if start.elapsed() >= self.timeout {
                // Withdraw the request.
                region.write32(self.request, 0);
                let msg = format!(
                    "No acknowledge for command 0x{:08x} within {} ms",
                    command,
                    self.timeout.as_millis()
                );
                break Err(Error::new(ControlProtocolError::Transport, &msg));
            }

            std::thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn doorbell() -> RegisterDoorbell {
        RegisterDoorbell {
            request: 0x00,
            ack: 0x04,
            busy: 0x80000000,
            done: 0x40000000,
            timeout: Duration::from_millis(5),
            poll_interval: Duration::from_micros(100),
        }
    }

    #[test]
    fn doorbell_acknowledged() {
        let region = MappedRegion::with_capacity(0x10);
        region.write32(0x04, 0x40000001u32.to_le());

        let mut doorbell = doorbell();
        doorbell.ring(&region, 0x50020000).unwrap();

        assert_eq!(u32::from_le(region.read32(0x00)), 0xd0020000);
        assert_eq!(u32::from_le(region.read32(0x04)), 0x00000001);
    }

    #[test]
    fn doorbell_timeout() {
        let region = MappedRegion::with_capacity(0x10);

        let mut doorbell = doorbell();
        let err = doorbell.ring(&region, 0x50020000).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::Transport);
        assert_eq!(region.read32(0x00), 0);
    }

    #[test]
    fn doorbell_register_out_of_region() {
        let region = MappedRegion::with_capacity(0x04);

        let mut doorbell = doorbell();
        let err = doorbell.ring(&region, 0x50020000).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);
    }

    #[test]
    fn doorbell_register_wrapping_end() {
        let region = MappedRegion::with_capacity(0x10);

        let mut doorbell = doorbell();
        doorbell.ack = usize::MAX - 3;
        let err = doorbell.ring(&region, 0x50020000).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);
        assert_eq!(region.read32(doorbell.request), 0);
    }
}
