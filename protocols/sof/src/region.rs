// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

//! Raw access to memory-mapped window of the device.
//!
//! The module includes structure for contiguous range of address visible to the device. All of
//! accesses are volatile and sequenced in program order. Any access out of the range is a
//! programming error of caller; the checks are done in debug build only.

use {
    super::*,
    nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags},
    std::{num::NonZeroUsize, os::fd::AsFd, ptr::NonNull},
};

enum Backing {
    /// Mapped from device file.
    Mapped,
    /// Host memory, aligned to 8 bytes.
    Host(#[allow(dead_code)] Box<[u64]>),
}

/// Contiguous range of address visible to the device.
///
/// The instance is exclusively owned by the attachment of device and never copied.
pub struct MappedRegion {
    ptr: NonNull<u8>,
    size: usize,
    backing: Backing,
}

// The pointer is owned exclusively by the instance.
unsafe impl Send for MappedRegion {}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if let Backing::Mapped = self.backing {
            let _ = unsafe { munmap(self.ptr.cast(), self.size) };
        }
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let backing = match self.backing {
            Backing::Mapped => "mapped",
            Backing::Host(_) => "host",
        };
        f.debug_struct("MappedRegion")
            .field("base", &self.ptr)
            .field("size", &self.size)
            .field("backing", &backing)
            .finish()
    }
}

impl MappedRegion {
    /// Map the range of device file, typically the node of userspace I/O.
    pub fn map<F: AsFd>(file: F, offset: u64, size: usize) -> Result<Self, Error> {
        let length = NonZeroUsize::new(size).ok_or_else(|| {
            Error::new(
                ControlProtocolError::InvalidArgument,
                "The size of mapped region should not be zero",
            )
        })?;
        let ptr = unsafe {
            mmap(
                None,
                length,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                file,
                offset as nix::libc::off_t,
            )
        }?;

        Ok(Self {
            ptr: ptr.cast(),
            size,
            backing: Backing::Mapped,
        })
    }

    /// Allocate the range in host memory, filled with zero.
    pub fn with_capacity(size: usize) -> Self {
        let count = std::cmp::max((size + 7) / 8, 1);
        let mut mem = vec![0u64; count].into_boxed_slice();
        let ptr = NonNull::from(&mut mem[..]).cast::<u8>();

        Self {
            ptr,
            size,
            backing: Backing::Host(mem),
        }
    }

    /// The length of region in byte unit.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn check_access(&self, offset: usize, width: usize) {
        debug_assert!(
            offset.checked_add(width).map_or(false, |end| end <= self.size),
            "Programming error for access at 0x{:x} with width {} to region of size 0x{:x}",
            offset,
            width,
            self.size
        );
        debug_assert_eq!(
            offset % width,
            0,
            "Programming error for unaligned access at 0x{:x}",
            offset
        );
    }

    pub fn read8(&self, offset: usize) -> u8 {
        self.check_access(offset, 1);
        unsafe { self.ptr.as_ptr().add(offset).read_volatile() }
    }

    pub fn write8(&self, offset: usize, value: u8) {
        self.check_access(offset, 1);
        unsafe { self.ptr.as_ptr().add(offset).write_volatile(value) }
    }

    pub fn read32(&self, offset: usize) -> u32 {
        self.check_access(offset, 4);
        unsafe { (self.ptr.as_ptr().add(offset) as *const u32).read_volatile() }
    }

    pub fn write32(&self, offset: usize, value: u32) {
        self.check_access(offset, 4);
        unsafe { (self.ptr.as_ptr().add(offset) as *mut u32).write_volatile(value) }
    }

    pub fn read64(&self, offset: usize) -> u64 {
        self.check_access(offset, 8);
        unsafe { (self.ptr.as_ptr().add(offset) as *const u64).read_volatile() }
    }

    pub fn write64(&self, offset: usize, value: u64) {
        self.check_access(offset, 8);
        unsafe { (self.ptr.as_ptr().add(offset) as *mut u64).write_volatile(value) }
    }

    /// Copy quadlets in the order of address. The length of source should be multiple of 4.
    pub fn write32_copy(&self, offset: usize, src: &[u8]) {
        assert_eq!(
            src.len() % 4,
            0,
            "Programming error for length of quadlet data"
        );

        let mut quadlet = [0; 4];
        src.chunks_exact(4).enumerate().for_each(|(i, chunk)| {
            quadlet.copy_from_slice(chunk);
            self.write32(offset + i * 4, u32::from_ne_bytes(quadlet));
        });
    }
}
