// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

//! Opaque binary blob with self-describing header.
//!
//! The module includes structure and functions for the blob exchanged by bytes control. The blob
//! starts with header which consists of magic, ABI version, and the size of payload following
//! the header. The extended variant is wrapped by envelope which consists of identifier and
//! length of the blob.

use super::*;

/// The magic in header of blob ("SOF\0").
pub const ABI_MAGIC: u32 = 0x00464f53;

pub const ABI_MAJOR: u32 = 3;
pub const ABI_MINOR: u32 = 8;
pub const ABI_PATCH: u32 = 0;

/// The version of ABI which the crate is built against.
pub const CORE_ABI_VERSION: AbiVersion = AbiVersion::new(ABI_MAJOR, ABI_MINOR, ABI_PATCH);

/// The size of value buffer in control surface for bytes control.
pub const BYTES_VALUE_SIZE: usize = 512;

const ABI_MAJOR_SHIFT: u32 = 24;
const ABI_MAJOR_MASK: u32 = 0xff;
const ABI_MINOR_SHIFT: u32 = 12;
const ABI_MINOR_MASK: u32 = 0xfff;
const ABI_PATCH_MASK: u32 = 0xfff;

/// The version of ABI, packed as major (8 bits), minor (12 bits), and patch (12 bits).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct AbiVersion(pub u32);

impl AbiVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self(
            ((major & ABI_MAJOR_MASK) << ABI_MAJOR_SHIFT)
                | ((minor & ABI_MINOR_MASK) << ABI_MINOR_SHIFT)
                | (patch & ABI_PATCH_MASK),
        )
    }

    pub fn major(&self) -> u32 {
        (self.0 >> ABI_MAJOR_SHIFT) & ABI_MAJOR_MASK
    }

    pub fn minor(&self) -> u32 {
        (self.0 >> ABI_MINOR_SHIFT) & ABI_MINOR_MASK
    }

    pub fn patch(&self) -> u32 {
        self.0 & ABI_PATCH_MASK
    }
}

impl std::fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major(), self.minor(), self.patch())
    }
}

/// Whether the blob of candidate version is acceptable for the reference version. The major
/// versions should be the same, and the minor version of candidate should not be newer.
pub fn abi_version_compatible(reference: AbiVersion, candidate: AbiVersion) -> bool {
    reference.major() == candidate.major() && candidate.minor() <= reference.minor()
}

/// The header of blob.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    pub magic: u32,
    pub abi_version: AbiVersion,
    /// The size of payload, excluding the header.
    pub size: u32,
}

impl BlobHeader {
    pub const SIZE: usize = 12;

    /// The size of header and payload.
    pub fn total_size(&self) -> usize {
        Self::SIZE + self.size as usize
    }
}

pub(crate) fn serialize_blob_header(header: &BlobHeader, raw: &mut [u8]) {
    assert!(raw.len() >= BlobHeader::SIZE);

    serialize_u32(&header.magic, &mut raw[..4]);
    serialize_u32(&header.abi_version.0, &mut raw[4..8]);
    serialize_u32(&header.size, &mut raw[8..12]);
}

pub(crate) fn deserialize_blob_header(header: &mut BlobHeader, raw: &[u8]) {
    assert!(raw.len() >= BlobHeader::SIZE);

    deserialize_u32(&mut header.magic, &raw[..4]);
    deserialize_u32(&mut header.abi_version.0, &raw[4..8]);
    deserialize_u32(&mut header.size, &raw[8..12]);
}

/// Opaque byte buffer which starts with header.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct BlobPayload(Vec<u8>);

impl BlobPayload {
    /// Build blob with header for the payload.
    pub fn new(abi_version: AbiVersion, payload: &[u8]) -> Self {
        let header = BlobHeader {
            magic: ABI_MAGIC,
            abi_version,
            size: payload.len() as u32,
        };
        let mut raw = vec![0u8; header.total_size()];
        serialize_blob_header(&header, &mut raw);
        raw[BlobHeader::SIZE..].copy_from_slice(payload);
        Self(raw)
    }

    pub fn from_raw(raw: Vec<u8>) -> Self {
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse the header, if the buffer is large enough.
    pub fn header(&self) -> Option<BlobHeader> {
        if self.0.len() < BlobHeader::SIZE {
            None
        } else {
            let mut header = BlobHeader::default();
            deserialize_blob_header(&mut header, &self.0);
            Some(header)
        }
    }

    /// The payload following the header, within the declared size.
    pub fn payload(&self) -> Option<&[u8]> {
        self.header()
            .filter(|header| header.total_size() <= self.0.len())
            .map(|header| &self.0[BlobHeader::SIZE..header.total_size()])
    }
}

/// The envelope of blob for extended variant.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct BlobEnvelope {
    /// The identifier of control.
    pub id: u32,
    /// The length of blob following the envelope.
    pub length: u32,
}

impl BlobEnvelope {
    pub const SIZE: usize = 8;

    /// Parse the envelope, if the buffer is large enough.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < Self::SIZE {
            None
        } else {
            let mut envelope = Self::default();
            deserialize_blob_envelope(&mut envelope, raw);
            Some(envelope)
        }
    }
}

pub(crate) fn serialize_blob_envelope(envelope: &BlobEnvelope, raw: &mut [u8]) {
    assert!(raw.len() >= BlobEnvelope::SIZE);

    serialize_u32(&envelope.id, &mut raw[..4]);
    serialize_u32(&envelope.length, &mut raw[4..8]);
}

pub(crate) fn deserialize_blob_envelope(envelope: &mut BlobEnvelope, raw: &[u8]) {
    assert!(raw.len() >= BlobEnvelope::SIZE);

    deserialize_u32(&mut envelope.id, &raw[..4]);
    deserialize_u32(&mut envelope.length, &raw[4..8]);
}

/// Check the capacity of control against the value buffer of control surface.
pub(crate) fn check_surface_capacity(id: u32, capacity: usize) -> Result<(), Error> {
    if capacity > BYTES_VALUE_SIZE {
        let msg = format!(
            "The maximum size of control {} should be less than {}, actually {}",
            id, BYTES_VALUE_SIZE, capacity
        );
        Err(Error::new(ControlProtocolError::InvalidArgument, &msg))
    } else {
        Ok(())
    }
}

/// Check the size declared by header against the capacity of control.
pub(crate) fn check_declared_size(id: u32, header: &BlobHeader, capacity: usize) -> Result<(), Error> {
    if header.total_size() > capacity {
        let msg = format!(
            "The blob of control {} declares {} bytes, but the maximum is {}",
            id,
            header.total_size(),
            capacity
        );
        Err(Error::new(ControlProtocolError::ProtocolViolation, &msg))
    } else {
        Ok(())
    }
}

/// Validate the blob to be sent for the control, and return the parsed header. The checks are
/// done in the order of size, magic, ABI version, and declared size.
pub(crate) fn validate_blob(
    id: u32,
    raw: &[u8],
    capacity: usize,
    reference: AbiVersion,
) -> Result<BlobHeader, Error> {
    if raw.len() > capacity {
        let msg = format!(
            "The blob for control {} has {} bytes, but the maximum is {}",
            id,
            raw.len(),
            capacity
        );
        return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
    }

    if raw.len() < BlobHeader::SIZE {
        let msg = format!(
            "The blob for control {} has {} bytes, less than its header",
            id,
            raw.len()
        );
        return Err(Error::new(ControlProtocolError::ProtocolViolation, &msg));
    }

    let mut header = BlobHeader::default();
    deserialize_blob_header(&mut header, raw);

    if header.magic != ABI_MAGIC {
        let msg = format!("Wrong ABI magic 0x{:08x} for control {}", header.magic, id);
        return Err(Error::new(ControlProtocolError::ProtocolViolation, &msg));
    }

    if !abi_version_compatible(reference, header.abi_version) {
        let msg = format!(
            "Incompatible ABI version {} for control {}, expected {}",
            header.abi_version, id, reference
        );
        return Err(Error::new(ControlProtocolError::ProtocolViolation, &msg));
    }

    check_declared_size(id, &header, capacity)?;

    if header.total_size() > raw.len() {
        let msg = format!(
            "The blob for control {} declares {} bytes, but truncated to {}",
            id,
            header.total_size(),
            raw.len()
        );
        return Err(Error::new(ControlProtocolError::ProtocolViolation, &msg));
    }

    Ok(header)
}

/// Parse the envelope and return the blob wrapped by it. The declared length is checked against
/// the maximum before the blob is read.
pub(crate) fn unwrap_envelope(id: u32, data: &[u8], max: usize) -> Result<&[u8], Error> {
    if data.len() < BlobEnvelope::SIZE {
        let msg = format!(
            "The data for control {} has {} bytes, less than its envelope",
            id,
            data.len()
        );
        return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
    }

    let mut envelope = BlobEnvelope::default();
    deserialize_blob_envelope(&mut envelope, data);

    if envelope.length as usize > max {
        let msg = format!(
            "The length {} of blob for control {} exceeds maximum {}",
            envelope.length, id, max
        );
        return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
    }

    if envelope.id != id {
        let msg = format!(
            "The identifier {} in envelope is not for control {}",
            envelope.id, id
        );
        return Err(Error::new(ControlProtocolError::ProtocolViolation, &msg));
    }

    let end = BlobEnvelope::SIZE + envelope.length as usize;
    if data.len() < end {
        let msg = format!(
            "The envelope for control {} declares {} bytes, but truncated to {}",
            id,
            envelope.length,
            data.len() - BlobEnvelope::SIZE
        );
        return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
    }

    Ok(&data[BlobEnvelope::SIZE..end])
}

/// Wrap the blob by envelope for the control.
pub(crate) fn wrap_envelope(id: u32, blob: &[u8]) -> Vec<u8> {
    let envelope = BlobEnvelope {
        id,
        length: blob.len() as u32,
    };
    let mut raw = vec![0u8; BlobEnvelope::SIZE + blob.len()];
    serialize_blob_envelope(&envelope, &mut raw);
    raw[BlobEnvelope::SIZE..].copy_from_slice(blob);
    raw
}
