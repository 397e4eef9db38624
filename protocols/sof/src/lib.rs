// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

#![doc = include_str!("../README.md")]

pub mod blob;
pub mod block;
pub mod codec;
pub mod control;
pub mod error;
pub mod mailbox;
pub mod power;
pub mod region;
pub mod transaction;

pub use {
    blob::*, block::*, codec::*, control::*, error::*, mailbox::*, power::*, region::*,
    transaction::*,
};

// The words in mailbox are in little endian, as the device reads them.

fn deserialize_i32(val: &mut i32, raw: &[u8]) {
    assert!(raw.len() >= 4);

    let mut quadlet = [0; 4];
    quadlet.copy_from_slice(&raw[..4]);
    *val = i32::from_le_bytes(quadlet);
}

fn serialize_u32(val: &u32, raw: &mut [u8]) {
    assert!(raw.len() >= 4);

    raw[..4].copy_from_slice(&val.to_le_bytes())
}

fn deserialize_u32(val: &mut u32, raw: &[u8]) {
    assert!(raw.len() >= 4);

    let mut quadlet = [0; 4];
    quadlet.copy_from_slice(&raw[..4]);
    *val = u32::from_le_bytes(quadlet);
}
