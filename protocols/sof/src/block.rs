// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

//! Transfer of byte block between host memory and mapped region.
//!
//! The trailing bytes which do not fill a quadlet are written by read-modify-write of the
//! destination quadlet, thus the other bytes in the quadlet are preserved. It is safe only when
//! no other writer touches the quadlet at the same time, which is guaranteed by the discipline
//! of single writer per mailbox.

use super::*;

/// Copy the bytes to the offset of region.
pub fn write_block(region: &MappedRegion, offset: usize, src: &[u8]) {
    debug_assert!(offset + src.len() <= region.len());

    let m = src.len() / 4;
    let n = src.len() % 4;

    region.write32_copy(offset, &src[..(m * 4)]);

    if n > 0 {
        let pos = offset + m * 4;
        let affected_mask = (1u32 << (8 * n)) - 1;

        let mut quadlet = [0; 4];
        quadlet[..n].copy_from_slice(&src[(m * 4)..]);
        let tail = u32::from_le_bytes(quadlet);

        // Handle the quadlet in the order of address.
        let mut val = u32::from_le_bytes(region.read32(pos).to_ne_bytes());
        val &= !affected_mask;
        val |= tail & affected_mask;
        region.write32(pos, u32::from_ne_bytes(val.to_le_bytes()));
    }
}

/// Copy the bytes from the offset of region.
pub fn read_block(region: &MappedRegion, offset: usize, dst: &mut [u8]) {
    debug_assert!(offset + dst.len() <= region.len());

    dst.iter_mut()
        .enumerate()
        .for_each(|(i, b)| *b = region.read8(offset + i));
}
