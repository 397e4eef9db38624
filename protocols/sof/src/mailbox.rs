// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

//! Mailbox channel and request/reply transport over it.
//!
//! The module includes structure for fixed window in mapped region to exchange short
//! synchronous messages with the device, and the implementation of request/reply primitive
//! which writes request into the window toward the device, rings doorbell, then reads reply from
//! the window toward the host.
//!
//! At most one transaction is in flight through the mailbox. The primitive takes mutable
//! reference, thus any user shared between threads should serialize it by mutual exclusion.

use super::*;

/// Fixed window in mapped region.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// The offset of window in mapped region.
    pub offset: usize,
    /// The size of window.
    pub size: usize,
}

impl Mailbox {
    fn check_size(&self, len: usize) -> Result<(), Error> {
        if len > self.size {
            let msg = format!(
                "The size of message should be less than {}, actually {}",
                self.size, len
            );
            Err(Error::new(ControlProtocolError::InvalidArgument, &msg))
        } else {
            Ok(())
        }
    }

    /// Check that the window lies within the region.
    pub fn check_region(&self, region: &MappedRegion) -> Result<(), Error> {
        if self.offset % 4 > 0 || self.size % 4 > 0 {
            let msg = format!(
                "The mailbox should be aligned to quadlet, actually 0x{:x}+0x{:x}",
                self.offset, self.size
            );
            Err(Error::new(ControlProtocolError::InvalidArgument, &msg))
        } else if self
            .offset
            .checked_add(self.size)
            .map_or(true, |end| end > region.len())
        {
            let msg = format!(
                "The mailbox 0x{:x}+0x{:x} exceeds the region of size 0x{:x}",
                self.offset,
                self.size,
                region.len()
            );
            Err(Error::new(ControlProtocolError::InvalidArgument, &msg))
        } else {
            Ok(())
        }
    }

    /// Write the message to the window.
    pub fn write(&self, region: &MappedRegion, message: &[u8]) -> Result<(), Error> {
        self.check_size(message.len())?;
        write_block(region, self.offset, message);
        Ok(())
    }

    /// Read the message from the window.
    pub fn read(&self, region: &MappedRegion, message: &mut [u8]) -> Result<(), Error> {
        self.check_size(message.len())?;
        read_block(region, self.offset, message);
        Ok(())
    }
}

/// The pair of windows for both directions.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct MailboxLayout {
    /// The window toward the device.
    pub host_box: Mailbox,
    /// The window toward the host.
    pub dsp_box: Mailbox,
}

/// The primitive to send request and receive reply. The encoding of command is opaque.
pub trait IpcOperation {
    /// Send the command with payload, then wait for reply of the given size.
    fn send(&mut self, command: u32, payload: &[u8], reply_size: usize) -> Result<Vec<u8>, Error>;
}

/// Notification to the device that request is available in mailbox.
pub trait Doorbell {
    /// Notify the command, then block till the device acknowledges it or time out.
    fn ring(&mut self, region: &MappedRegion, command: u32) -> Result<(), Error>;
}

/// The implementation of request/reply primitive over mailbox.
#[derive(Debug)]
pub struct MailboxIpc<D: Doorbell> {
    region: MappedRegion,
    layout: MailboxLayout,
    doorbell: D,
}

impl<D: Doorbell> MailboxIpc<D> {
    pub fn new(region: MappedRegion, layout: MailboxLayout, doorbell: D) -> Result<Self, Error> {
        layout.host_box.check_region(&region)?;
        layout.dsp_box.check_region(&region)?;

        Ok(Self {
            region,
            layout,
            doorbell,
        })
    }

    #[cfg(test)]
    pub(crate) fn doorbell_mut(&mut self) -> &mut D {
        &mut self.doorbell
    }
}

impl<D: Doorbell> IpcOperation for MailboxIpc<D> {
    fn send(&mut self, command: u32, payload: &[u8], reply_size: usize) -> Result<Vec<u8>, Error> {
        self.layout.dsp_box.check_size(reply_size)?;
        self.layout.host_box.write(&self.region, payload)?;

        self.doorbell
            .ring(&self.region, command)
            .map_err(|err| {
                let msg = format!("Command 0x{:08x} is not acknowledged: {}", command, err.message());
                Error::new(ControlProtocolError::Transport, &msg)
            })?;

        let mut reply = vec![0u8; reply_size];
        self.layout.dsp_box.read(&self.region, &mut reply)?;

        tracing::debug!(
            command = %format!("0x{:08x}", command),
            request_size = payload.len(),
            reply_size,
        );

        Ok(reply)
    }
}
