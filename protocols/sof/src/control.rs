// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

//! Control entity and its message in mailbox.
//!
//! The module includes structure for one addressable parameter of component in the device, with
//! cache of its values or blob. The message for the control consists of header and the sequence
//! of channel values or the blob.

use super::*;

const GLB_COMP_MSG: u32 = 0x5 << 28;
const GLB_STREAM_MSG: u32 = 0x6 << 28;

const COMP_SET_VALUE: u32 = 0x1 << 16;
const COMP_GET_VALUE: u32 = 0x2 << 16;
const COMP_SET_DATA: u32 = 0x3 << 16;
const COMP_GET_DATA: u32 = 0x4 << 16;

const STREAM_PCM_PARAMS: u32 = 0x1 << 16;
const STREAM_PCM_FREE: u32 = 0x3 << 16;
const STREAM_TRIG_START: u32 = 0x4 << 16;

/// The command to set channel values of component.
pub const CMD_COMP_SET_VALUE: u32 = GLB_COMP_MSG | COMP_SET_VALUE;
/// The command to get channel values of component.
pub const CMD_COMP_GET_VALUE: u32 = GLB_COMP_MSG | COMP_GET_VALUE;
/// The command to set blob of component.
pub const CMD_COMP_SET_DATA: u32 = GLB_COMP_MSG | COMP_SET_DATA;
/// The command to get blob of component.
pub const CMD_COMP_GET_DATA: u32 = GLB_COMP_MSG | COMP_GET_DATA;

/// The command to configure stream parameters of pipeline.
pub const CMD_STREAM_PCM_PARAMS: u32 = GLB_STREAM_MSG | STREAM_PCM_PARAMS;
/// The command to free stream and reset pipeline.
pub const CMD_STREAM_PCM_FREE: u32 = GLB_STREAM_MSG | STREAM_PCM_FREE;
/// The command to start pipeline.
pub const CMD_STREAM_TRIG_START: u32 = GLB_STREAM_MSG | STREAM_TRIG_START;

/// The type of data in control message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlType {
    ChannelGet,
    ChannelSet,
    DataGet,
    DataSet,
}

impl From<ControlType> for u32 {
    fn from(ctrl_type: ControlType) -> Self {
        match ctrl_type {
            ControlType::ChannelGet => 0,
            ControlType::ChannelSet => 1,
            ControlType::DataGet => 4,
            ControlType::DataSet => 5,
        }
    }
}

/// The kind of control, resolved once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    /// Volume with lookup table.
    Volume(VolumeTable),
    /// On/off switch per channel.
    Switch,
    /// Enumerated mode per channel.
    Enum,
    /// Opaque blob.
    Bytes,
    /// On/off switch which starts and stops the pipeline of component.
    TriggerableSwitch,
}

impl ControlKind {
    /// The command of control in message.
    pub fn ctrl_cmd(&self) -> u32 {
        match self {
            ControlKind::Volume(_) => 0,
            ControlKind::Enum => 1,
            ControlKind::Switch | ControlKind::TriggerableSwitch => 2,
            ControlKind::Bytes => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlKind::Volume(_) => "volume",
            ControlKind::Switch => "switch",
            ControlKind::Enum => "enum",
            ControlKind::Bytes => "bytes",
            ControlKind::TriggerableSwitch => "trigger",
        }
    }
}

/// The value of channel.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChannelValue {
    pub channel: u32,
    pub value: u32,
}

impl ChannelValue {
    const SIZE: usize = 8;
}

/// One addressable parameter of component in the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    id: u32,
    comp_id: u32,
    kind: ControlKind,
    channels: Vec<ChannelValue>,
    data: Vec<u8>,
    abi_version: AbiVersion,
}

impl Control {
    /// Control for channel values; volume, switch, enumeration, and triggerable switch.
    pub fn new(id: u32, comp_id: u32, channel_count: usize, kind: ControlKind) -> Result<Self, Error> {
        if let ControlKind::Bytes = kind {
            let msg = format!("Control {} for bytes requires capacity", id);
            return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
        }

        if channel_count == 0 {
            let msg = format!("Control {} should have one channel at least", id);
            return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
        }

        let channels = (0..channel_count)
            .map(|i| ChannelValue {
                channel: i as u32,
                value: 0,
            })
            .collect();

        Ok(Self {
            id,
            comp_id,
            kind,
            channels,
            data: Vec::new(),
            abi_version: CORE_ABI_VERSION,
        })
    }

    /// Control for blob, with the capacity including header.
    pub fn new_bytes(
        id: u32,
        comp_id: u32,
        capacity: usize,
        abi_version: AbiVersion,
    ) -> Result<Self, Error> {
        if capacity < BlobHeader::SIZE {
            let msg = format!(
                "The capacity of control {} should be {} at least, actually {}",
                id,
                BlobHeader::SIZE,
                capacity
            );
            return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
        }

        Ok(Self {
            id,
            comp_id,
            kind: ControlKind::Bytes,
            channels: Vec::new(),
            data: vec![0; capacity],
            abi_version,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn comp_id(&self) -> u32 {
        self.comp_id
    }

    pub fn kind(&self) -> &ControlKind {
        &self.kind
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// The cached values of channels.
    pub fn channel_values(&self) -> &[ChannelValue] {
        &self.channels
    }

    /// The maximum size of blob including header.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The cached buffer of blob.
    pub fn cached_data(&self) -> &[u8] {
        &self.data
    }

    /// The reference version of ABI for blob.
    pub fn abi_version(&self) -> AbiVersion {
        self.abi_version
    }

    pub(crate) fn is_bytes(&self) -> bool {
        self.kind == ControlKind::Bytes
    }

    pub(crate) fn update_channels(&mut self, vals: &[u32]) {
        assert_eq!(vals.len(), self.channels.len());

        self.channels
            .iter_mut()
            .zip(vals)
            .enumerate()
            .for_each(|(i, (ch, &v))| {
                ch.channel = i as u32;
                ch.value = v;
            });
    }

    pub(crate) fn update_data(&mut self, raw: &[u8]) {
        assert!(raw.len() <= self.data.len());

        self.data[..raw.len()].copy_from_slice(raw);
        self.data[raw.len()..].fill(0);
    }

    pub(crate) fn stamp_data_header(&mut self, abi_version: AbiVersion) {
        serialize_u32(&ABI_MAGIC, &mut self.data[..4]);
        serialize_u32(&abi_version.0, &mut self.data[4..8]);
    }

    /// The header in cached buffer of blob.
    pub fn data_header(&self) -> BlobHeader {
        let mut header = BlobHeader::default();
        deserialize_blob_header(&mut header, &self.data);
        header
    }
}

/// The header of control message.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct ControlMessageHeader {
    /// The size of whole message.
    pub size: u32,
    pub command: u32,
    pub comp_id: u32,
    pub ctrl_type: u32,
    pub ctrl_cmd: u32,
    /// The number of channel values, or the number of bytes in blob.
    pub num_elems: u32,
}

impl ControlMessageHeader {
    pub const SIZE: usize = 24;
}

pub(crate) fn serialize_control_message_header(header: &ControlMessageHeader, raw: &mut [u8]) {
    assert!(raw.len() >= ControlMessageHeader::SIZE);

    serialize_u32(&header.size, &mut raw[..4]);
    serialize_u32(&header.command, &mut raw[4..8]);
    serialize_u32(&header.comp_id, &mut raw[8..12]);
    serialize_u32(&header.ctrl_type, &mut raw[12..16]);
    serialize_u32(&header.ctrl_cmd, &mut raw[16..20]);
    serialize_u32(&header.num_elems, &mut raw[20..24]);
}

pub(crate) fn deserialize_control_message_header(header: &mut ControlMessageHeader, raw: &[u8]) {
    assert!(raw.len() >= ControlMessageHeader::SIZE);

    deserialize_u32(&mut header.size, &raw[..4]);
    deserialize_u32(&mut header.command, &raw[4..8]);
    deserialize_u32(&mut header.comp_id, &raw[8..12]);
    deserialize_u32(&mut header.ctrl_type, &raw[12..16]);
    deserialize_u32(&mut header.ctrl_cmd, &raw[16..20]);
    deserialize_u32(&mut header.num_elems, &raw[20..24]);
}

/// The size of message for channel values of the control.
pub(crate) fn value_message_size(control: &Control) -> usize {
    ControlMessageHeader::SIZE + control.channel_count() * ChannelValue::SIZE
}

/// The size of message for the whole blob of the control.
pub(crate) fn data_message_size(control: &Control) -> usize {
    ControlMessageHeader::SIZE + control.capacity()
}

pub(crate) fn build_value_message(control: &Control, command: u32, ctrl_type: ControlType) -> Vec<u8> {
    let size = value_message_size(control);
    let header = ControlMessageHeader {
        size: size as u32,
        command,
        comp_id: control.comp_id,
        ctrl_type: ctrl_type.into(),
        ctrl_cmd: control.kind.ctrl_cmd(),
        num_elems: control.channel_count() as u32,
    };

    let mut raw = vec![0u8; size];
    serialize_control_message_header(&header, &mut raw);
    control
        .channels
        .iter()
        .enumerate()
        .for_each(|(i, ch)| {
            let pos = ControlMessageHeader::SIZE + i * ChannelValue::SIZE;
            serialize_u32(&ch.channel, &mut raw[pos..(pos + 4)]);
            serialize_u32(&ch.value, &mut raw[(pos + 4)..(pos + 8)]);
        });

    raw
}

pub(crate) fn build_data_message(
    control: &Control,
    command: u32,
    ctrl_type: ControlType,
    blob: &[u8],
) -> Vec<u8> {
    let size = ControlMessageHeader::SIZE + blob.len();
    let header = ControlMessageHeader {
        size: size as u32,
        command,
        comp_id: control.comp_id,
        ctrl_type: ctrl_type.into(),
        ctrl_cmd: control.kind.ctrl_cmd(),
        num_elems: blob.len() as u32,
    };

    let mut raw = vec![0u8; size];
    serialize_control_message_header(&header, &mut raw);
    raw[ControlMessageHeader::SIZE..].copy_from_slice(blob);

    raw
}

fn parse_reply_header(control: &Control, raw: &[u8]) -> Result<ControlMessageHeader, Error> {
    if raw.len() < ControlMessageHeader::SIZE {
        let msg = format!(
            "The reply for control {} has {} bytes, less than its header",
            control.id,
            raw.len()
        );
        return Err(Error::new(ControlProtocolError::ProtocolViolation, &msg));
    }

    let mut header = ControlMessageHeader::default();
    deserialize_control_message_header(&mut header, raw);

    if header.comp_id != control.comp_id {
        let msg = format!(
            "The reply for control {} is from component {}, expected {}",
            control.id, header.comp_id, control.comp_id
        );
        Err(Error::new(ControlProtocolError::ProtocolViolation, &msg))
    } else {
        Ok(header)
    }
}

/// Check the reply of set operation.
pub(crate) fn parse_ack_reply(control: &Control, raw: &[u8]) -> Result<(), Error> {
    parse_reply_header(control, raw).map(|_| ())
}

/// Parse the reply of get operation for channel values.
pub(crate) fn parse_value_reply(control: &Control, raw: &[u8]) -> Result<Vec<u32>, Error> {
    let header = parse_reply_header(control, raw)?;

    let count = control.channel_count();
    if header.num_elems as usize != count
        || raw.len() < ControlMessageHeader::SIZE + count * ChannelValue::SIZE
    {
        let msg = format!(
            "The reply for control {} has {} channels, expected {}",
            control.id, header.num_elems, count
        );
        return Err(Error::new(ControlProtocolError::ProtocolViolation, &msg));
    }

    let mut vals = vec![0u32; count];
    let mut ch = ChannelValue::default();
    (0..count).try_for_each(|i| {
        let pos = ControlMessageHeader::SIZE + i * ChannelValue::SIZE;
        deserialize_u32(&mut ch.channel, &raw[pos..(pos + 4)]);
        deserialize_u32(&mut ch.value, &raw[(pos + 4)..(pos + 8)]);

        if ch.channel as usize >= count {
            let msg = format!(
                "The reply for control {} has channel {} out of {}",
                control.id, ch.channel, count
            );
            Err(Error::new(ControlProtocolError::ProtocolViolation, &msg))
        } else {
            vals[ch.channel as usize] = ch.value;
            Ok(())
        }
    })?;

    Ok(vals)
}

/// Parse the reply of get operation for blob.
pub(crate) fn parse_data_reply<'a>(control: &Control, raw: &'a [u8]) -> Result<&'a [u8], Error> {
    let header = parse_reply_header(control, raw)?;

    let len = header.num_elems as usize;
    if len > control.capacity() || raw.len() < ControlMessageHeader::SIZE + len {
        let msg = format!(
            "The reply for control {} has {} bytes, but the maximum is {}",
            control.id,
            len,
            control.capacity()
        );
        return Err(Error::new(ControlProtocolError::ProtocolViolation, &msg));
    }

    Ok(&raw[ControlMessageHeader::SIZE..(ControlMessageHeader::SIZE + len)])
}

/// The message to operate stream of pipeline.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    pub command: u32,
    pub comp_id: u32,
    /// Available for parameters of stream only.
    pub channels: u32,
}

impl StreamMessage {
    const SIZE: usize = 16;
}

/// The reply of the device for stream operation.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamReply {
    pub size: u32,
    pub command: u32,
    pub error: i32,
}

impl StreamReply {
    pub const SIZE: usize = 12;
}

pub(crate) fn build_stream_message(msg: &StreamMessage) -> Vec<u8> {
    let mut raw = vec![0u8; StreamMessage::SIZE];
    serialize_u32(&(StreamMessage::SIZE as u32), &mut raw[..4]);
    serialize_u32(&msg.command, &mut raw[4..8]);
    serialize_u32(&msg.comp_id, &mut raw[8..12]);
    serialize_u32(&msg.channels, &mut raw[12..16]);
    raw
}

#[cfg(test)]
pub(crate) fn parse_stream_message(msg: &mut StreamMessage, raw: &[u8]) {
    assert!(raw.len() >= StreamMessage::SIZE);

    deserialize_u32(&mut msg.command, &raw[4..8]);
    deserialize_u32(&mut msg.comp_id, &raw[8..12]);
    deserialize_u32(&mut msg.channels, &raw[12..16]);
}

#[cfg(test)]
pub(crate) fn serialize_stream_reply(reply: &StreamReply, raw: &mut [u8]) {
    assert!(raw.len() >= StreamReply::SIZE);

    serialize_u32(&reply.size, &mut raw[..4]);
    serialize_u32(&reply.command, &mut raw[4..8]);
    serialize_u32(&(reply.error as u32), &mut raw[8..12]);
}

pub(crate) fn deserialize_stream_reply(reply: &mut StreamReply, raw: &[u8]) {
    assert!(raw.len() >= StreamReply::SIZE);

    deserialize_u32(&mut reply.size, &raw[..4]);
    deserialize_u32(&mut reply.command, &raw[4..8]);
    deserialize_i32(&mut reply.error, &raw[8..12]);
}
