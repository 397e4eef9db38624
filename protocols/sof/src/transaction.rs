// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

//! Transaction of control between host and device.
//!
//! The module includes the orchestrator which wraps every logical operation for control by the
//! power gate, exchanges message through the request/reply primitive, then translates the reply
//! for cache of control. Validation of the caller input is done before the device is resumed,
//! thus any failure of validation leaves both of the device and cache untouched.

use {
    super::*,
    std::sync::{Arc, Mutex},
    tracing::{debug, debug_span, warn},
};

/// The state of one logical operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    PowerPending,
    PowerFailed,
    Active,
    InFlight,
    Committed,
    Failed,
}

/// The orchestrator of control transactions over one mailbox.
#[derive(Debug)]
pub struct ControlOrchestrator<T: IpcOperation, P: PowerOperation> {
    ipc: Mutex<T>,
    activity: Arc<DeviceActivity<P>>,
}

impl<T: IpcOperation, P: PowerOperation> ControlOrchestrator<T, P> {
    pub fn new(ipc: T, activity: Arc<DeviceActivity<P>>) -> Self {
        Self {
            ipc: Mutex::new(ipc),
            activity,
        }
    }

    pub fn activity(&self) -> &Arc<DeviceActivity<P>> {
        &self.activity
    }

    /// Run the body while the device is active. The mailbox is held by the body for the whole
    /// logical operation, thus any message of the other operation never interleaves.
    fn run<R, F>(&self, id: u32, comp_id: u32, op: &'static str, body: F) -> Result<R, Error>
    where
        F: FnOnce(&mut T) -> Result<R, Error>,
    {
        let _enter = debug_span!("transaction", id, comp_id, op).entered();

        debug!(state = ?TransactionState::PowerPending);

        let res = self.activity.with_device_active(|| {
            let mut ipc = self.ipc.lock().map_err(|_| {
                Error::new(ControlProtocolError::Transport, "The mailbox is poisoned")
            })?;
            debug!(state = ?TransactionState::Active);
            body(&mut *ipc)
        });

        let state = match &res {
            Ok(_) => TransactionState::Committed,
            Err(err) if err.matches(ControlProtocolError::PowerResumeFailed) => {
                TransactionState::PowerFailed
            }
            Err(_) => TransactionState::Failed,
        };
        debug!(state = ?state, ok = res.is_ok());
        debug!(state = ?TransactionState::Idle);

        res
    }

    fn transact(
        ipc: &mut T,
        command: u32,
        request: &[u8],
        reply_size: usize,
    ) -> Result<Vec<u8>, Error> {
        debug!(
            state = ?TransactionState::InFlight,
            command = %format!("0x{:08x}", command),
            request_size = request.len(),
            reply_size,
        );

        ipc.send(command, request, reply_size).map_err(|err| {
            if err.matches(ControlProtocolError::InvalidArgument)
                || err.matches(ControlProtocolError::Transport)
            {
                err
            } else {
                let msg = format!("Command 0x{:08x} failed: {}", command, err);
                Error::new(ControlProtocolError::Transport, &msg)
            }
        })
    }

    fn check_value_kind(control: &Control) -> Result<(), Error> {
        if control.is_bytes() {
            let msg = format!("Control {} has no channel value", control.id());
            Err(Error::new(ControlProtocolError::InvalidArgument, &msg))
        } else {
            Ok(())
        }
    }

    fn check_bytes_kind(control: &Control) -> Result<(), Error> {
        if control.is_bytes() {
            Ok(())
        } else {
            let msg = format!("Control {} has no blob", control.id());
            Err(Error::new(ControlProtocolError::InvalidArgument, &msg))
        }
    }

    /// Get the values of all channels from the device. The cache is overwritten by them.
    pub fn get_value(&self, control: &mut Control) -> Result<Vec<i64>, Error> {
        Self::check_value_kind(control)?;

        self.run(control.id(), control.comp_id(), "get-value", |ipc| {
            let request = build_value_message(control, CMD_COMP_GET_VALUE, ControlType::ChannelGet);
            let reply = Self::transact(
                ipc,
                CMD_COMP_GET_VALUE,
                &request,
                value_message_size(control),
            )?;
            let vals = parse_value_reply(control, &reply)?;
            control.update_channels(&vals);
            Ok(())
        })?;

        let kind = control.kind();
        let vals = control
            .channel_values()
            .iter()
            .map(|ch| decode_channel_value(kind, ch.value))
            .collect();

        Ok(vals)
    }

    /// Put the values of all channels to the device. Nothing happens when every channel is
    /// unchanged, then false is returned.
    pub fn put_value(&self, control: &mut Control, values: &[i64]) -> Result<bool, Error> {
        Self::check_value_kind(control)?;

        let count = control.channel_count();
        let kind = control.kind();

        let vals = if let ControlKind::TriggerableSwitch = kind {
            let &value = values.first().ok_or_else(|| {
                let msg = format!("No value for control {}", control.id());
                Error::new(ControlProtocolError::InvalidArgument, &msg)
            })?;
            let val = encode_channel_value(kind, value)?;
            vec![val; count]
        } else {
            if values.len() != count {
                let msg = format!(
                    "Control {} has {} channels, but {} values are given",
                    control.id(),
                    count,
                    values.len()
                );
                return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
            }
            values
                .iter()
                .map(|&value| encode_channel_value(kind, value))
                .collect::<Result<Vec<u32>, Error>>()?
        };

        let old: Vec<u32> = control.channel_values().iter().map(|ch| ch.value).collect();
        if old == vals {
            debug!(id = control.id(), "unchanged");
            return Ok(false);
        }

        let triggerable = *kind == ControlKind::TriggerableSwitch;
        let old_state = old[0] > 0;
        let new_state = vals[0] > 0;

        self.run(control.id(), control.comp_id(), "put-value", |ipc| {
            control.update_channels(&vals);

            let request = build_value_message(control, CMD_COMP_SET_VALUE, ControlType::ChannelSet);
            let res = Self::transact(ipc, CMD_COMP_SET_VALUE, &request, ControlMessageHeader::SIZE)
                .and_then(|reply| parse_ack_reply(control, &reply));
            if let Err(err) = res {
                control.update_channels(&old);
                return Err(err);
            }

            if triggerable && old_state != new_state {
                Self::trigger_pipeline(ipc, control, new_state)?;
            }

            Ok(())
        })?;

        Ok(true)
    }

    fn send_stream_message(ipc: &mut T, control: &Control, command: u32) -> Result<(), Error> {
        let msg = StreamMessage {
            command,
            comp_id: control.comp_id(),
            channels: control.channel_count() as u32,
        };
        let request = build_stream_message(&msg);
        let raw = Self::transact(ipc, command, &request, StreamReply::SIZE)?;

        let mut reply = StreamReply::default();
        deserialize_stream_reply(&mut reply, &raw);
        if reply.error != 0 {
            let msg = format!(
                "Command 0x{:08x} for component {} is rejected with {}",
                command,
                control.comp_id(),
                reply.error
            );
            Err(Error::new(ControlProtocolError::Transport, &msg))
        } else {
            Ok(())
        }
    }

    fn trigger_pipeline(ipc: &mut T, control: &Control, start: bool) -> Result<(), Error> {
        let res = if start {
            Self::send_stream_message(ipc, control, CMD_STREAM_PCM_PARAMS)
                .and_then(|_| Self::send_stream_message(ipc, control, CMD_STREAM_TRIG_START))
        } else {
            Self::send_stream_message(ipc, control, CMD_STREAM_PCM_FREE)
        };

        debug!(id = control.id(), start, ok = res.is_ok(), "pipeline");

        res.map_err(|err| {
            let msg = format!(
                "Fail to {} pipeline for control {}: {}",
                if start { "start" } else { "stop" },
                control.id(),
                err.message()
            );
            Error::new(ControlProtocolError::Transport, &msg)
        })
    }

    fn fetch_data(ipc: &mut T, control: &mut Control) -> Result<(), Error> {
        let header = control.data_header();
        let request = build_data_message(
            control,
            CMD_COMP_GET_DATA,
            ControlType::DataGet,
            &control.cached_data()[..BlobHeader::SIZE],
        );
        debug!(magic = %format!("0x{:08x}", header.magic), abi = %header.abi_version);

        let reply = Self::transact(ipc, CMD_COMP_GET_DATA, &request, data_message_size(control))?;
        let data = parse_data_reply(control, &reply)?;
        control.update_data(data);
        Ok(())
    }

    fn store_data(ipc: &mut T, control: &mut Control, blob: &[u8]) -> Result<(), Error> {
        let old = control.cached_data().to_vec();
        control.update_data(blob);

        let request = build_data_message(control, CMD_COMP_SET_DATA, ControlType::DataSet, blob);
        let res = Self::transact(ipc, CMD_COMP_SET_DATA, &request, ControlMessageHeader::SIZE)
            .and_then(|reply| parse_ack_reply(control, &reply));
        if res.is_err() {
            control.update_data(&old);
        }
        res
    }

    /// Get the blob from the device into the cache of control.
    pub fn get_blob(&self, control: &mut Control) -> Result<BlobPayload, Error> {
        Self::check_bytes_kind(control)?;
        check_surface_capacity(control.id(), control.capacity())?;

        self.run(control.id(), control.comp_id(), "get-blob", |ipc| {
            Self::fetch_data(ipc, control)?;
            let header = control.data_header();
            check_declared_size(control.id(), &header, control.capacity()).map_err(|err| {
                warn!(id = control.id(), %err);
                err
            })?;
            let raw = control.cached_data()[..header.total_size()].to_vec();
            Ok(BlobPayload::from_raw(raw))
        })
    }

    /// Put the blob to the device. The blob is validated before any device access.
    pub fn put_blob(&self, control: &mut Control, payload: &BlobPayload) -> Result<(), Error> {
        Self::check_bytes_kind(control)?;
        check_surface_capacity(control.id(), control.capacity())?;

        let header = validate_blob(
            control.id(),
            payload.as_bytes(),
            control.capacity(),
            control.abi_version(),
        )
        .map_err(|err| {
            warn!(id = control.id(), %err);
            err
        })?;

        let blob = &payload.as_bytes()[..header.total_size()];
        self.run(control.id(), control.comp_id(), "put-blob", |ipc| {
            Self::store_data(ipc, control, blob)
        })
    }

    /// Get the blob wrapped by envelope, up to the given maximum size including the envelope.
    pub fn get_blob_ext(&self, control: &mut Control, max: usize) -> Result<Vec<u8>, Error> {
        Self::check_bytes_kind(control)?;

        let limit = max.checked_sub(BlobEnvelope::SIZE).ok_or_else(|| {
            let msg = format!(
                "The buffer for control {} has {} bytes, less than envelope",
                control.id(),
                max
            );
            Error::new(ControlProtocolError::InvalidArgument, &msg)
        })?;

        self.run(control.id(), control.comp_id(), "get-blob-ext", |ipc| {
            control.stamp_data_header(CORE_ABI_VERSION);
            Self::fetch_data(ipc, control)?;

            let header = control.data_header();
            check_declared_size(control.id(), &header, control.capacity()).map_err(|err| {
                warn!(id = control.id(), %err);
                err
            })?;

            if header.total_size() > limit {
                let msg = format!(
                    "The blob of control {} has {} bytes, but the buffer allows {}",
                    control.id(),
                    header.total_size(),
                    limit
                );
                return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
            }

            Ok(wrap_envelope(
                control.id(),
                &control.cached_data()[..header.total_size()],
            ))
        })
    }

    /// Put the blob wrapped by envelope. The envelope and blob are validated before any device
    /// access.
    pub fn put_blob_ext(&self, control: &mut Control, data: &[u8]) -> Result<(), Error> {
        Self::check_bytes_kind(control)?;

        let header = unwrap_envelope(control.id(), data, control.capacity())
            .and_then(|blob| {
                validate_blob(control.id(), blob, control.capacity(), control.abi_version())
            })
            .map_err(|err| {
                warn!(id = control.id(), %err);
                err
            })?;

        let start = BlobEnvelope::SIZE;
        let blob = &data[start..(start + header.total_size())];
        self.run(control.id(), control.comp_id(), "put-blob-ext", |ipc| {
            Self::store_data(ipc, control, blob)
        })
    }
}

#[cfg(test)]
mod test {
    use {
        super::*,
        crate::power::test::{FakePower, PowerEvent},
        std::{collections::HashMap, thread},
    };

    /// Count requests and answer with the canned reply.
    #[derive(Default)]
    struct CountingIpc {
        requests: Arc<Mutex<Vec<(u32, Vec<u8>)>>>,
        reply: Vec<u8>,
    }

    impl IpcOperation for CountingIpc {
        fn send(&mut self, command: u32, payload: &[u8], reply_size: usize) -> Result<Vec<u8>, Error> {
            self.requests
                .lock()
                .unwrap()
                .push((command, payload.to_vec()));
            let mut reply = self.reply.clone();
            reply.resize(reply_size, 0);
            Ok(reply)
        }
    }

    /// Interpret the control message in mailbox, and answer in the window toward the host.
    #[derive(Default)]
    struct SimulatedDsp {
        layout: MailboxLayout,
        values: HashMap<u32, Vec<u32>>,
        blobs: HashMap<u32, Vec<u8>>,
        streams: Vec<(u32, u32)>,
        stream_error: i32,
        transactions: usize,
        log: Vec<(u32, u32)>,
        deaf: bool,
    }

    impl SimulatedDsp {
        fn answer_control(&mut self, request: &[u8]) -> Vec<u8> {
            let mut header = ControlMessageHeader::default();
            deserialize_control_message_header(&mut header, request);
            let body = &request[ControlMessageHeader::SIZE..header.size as usize];

            match header.command {
                CMD_COMP_SET_VALUE => {
                    let vals = body
                        .chunks_exact(8)
                        .map(|pair| {
                            let mut val = 0;
                            deserialize_u32(&mut val, &pair[4..]);
                            val
                        })
                        .collect();
                    self.values.insert(header.comp_id, vals);
                    header.num_elems = 0;
                    header.size = ControlMessageHeader::SIZE as u32;
                    let mut raw = vec![0; ControlMessageHeader::SIZE];
                    serialize_control_message_header(&header, &mut raw);
                    raw
                }
                CMD_COMP_GET_VALUE => {
                    let vals = self
                        .values
                        .get(&header.comp_id)
                        .cloned()
                        .unwrap_or_else(|| vec![0; header.num_elems as usize]);
                    let mut raw = request[..header.size as usize].to_vec();
                    vals.iter().enumerate().for_each(|(i, val)| {
                        let pos = ControlMessageHeader::SIZE + i * 8;
                        serialize_u32(&(i as u32), &mut raw[pos..(pos + 4)]);
                        serialize_u32(val, &mut raw[(pos + 4)..(pos + 8)]);
                    });
                    raw
                }
                CMD_COMP_SET_DATA => {
                    self.blobs.insert(header.comp_id, body.to_vec());
                    header.num_elems = 0;
                    let mut raw = vec![0; ControlMessageHeader::SIZE];
                    serialize_control_message_header(&header, &mut raw);
                    raw
                }
                CMD_COMP_GET_DATA => {
                    let blob = self.blobs.get(&header.comp_id).cloned().unwrap_or_default();
                    header.num_elems = blob.len() as u32;
                    header.size = (ControlMessageHeader::SIZE + blob.len()) as u32;
                    let mut raw = vec![0; header.size as usize];
                    serialize_control_message_header(&header, &mut raw);
                    raw[ControlMessageHeader::SIZE..].copy_from_slice(&blob);
                    raw
                }
                _ => unreachable!(),
            }
        }

        fn answer_stream(&mut self, request: &[u8]) -> Vec<u8> {
            let mut msg = StreamMessage::default();
            parse_stream_message(&mut msg, request);
            self.streams.push((msg.command, msg.comp_id));

            let reply = StreamReply {
                size: StreamReply::SIZE as u32,
                command: msg.command,
                error: self.stream_error,
            };
            let mut raw = vec![0; StreamReply::SIZE];
            serialize_stream_reply(&reply, &mut raw);
            raw
        }
    }

    impl Doorbell for SimulatedDsp {
        fn ring(&mut self, region: &MappedRegion, command: u32) -> Result<(), Error> {
            if self.deaf {
                return Err(Error::new(ControlProtocolError::Transport, "timeout"));
            }
            self.transactions += 1;

            let mut request = vec![0; self.layout.host_box.size];
            self.layout.host_box.read(region, &mut request)?;

            let mut comp_id = 0;
            deserialize_u32(&mut comp_id, &request[8..12]);
            self.log.push((command, comp_id));

            let reply = if command >> 28 == 0x6 {
                self.answer_stream(&request)
            } else {
                self.answer_control(&request)
            };
            self.layout.dsp_box.write(region, &reply)
        }
    }

    type SimulatedOrchestrator = ControlOrchestrator<MailboxIpc<SimulatedDsp>, FakePower>;

    fn simulated_orchestrator() -> SimulatedOrchestrator {
        let layout = MailboxLayout {
            host_box: Mailbox {
                offset: 0x000,
                size: 0x800,
            },
            dsp_box: Mailbox {
                offset: 0x800,
                size: 0x800,
            },
        };
        let region = MappedRegion::with_capacity(0x1000);
        let dsp = SimulatedDsp {
            layout,
            ..Default::default()
        };
        let ipc = MailboxIpc::new(region, layout, dsp).unwrap();
        let activity = Arc::new(DeviceActivity::new(FakePower::default(), DEFAULT_AUTOSUSPEND_DELAY));
        ControlOrchestrator::new(ipc, activity)
    }

    fn counting_orchestrator(
        power: FakePower,
    ) -> (
        ControlOrchestrator<CountingIpc, FakePower>,
        Arc<Mutex<Vec<(u32, Vec<u8>)>>>,
    ) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let ipc = CountingIpc {
            requests: requests.clone(),
            reply: Vec::new(),
        };
        let activity = Arc::new(DeviceActivity::new(power, DEFAULT_AUTOSUSPEND_DELAY));
        (ControlOrchestrator::new(ipc, activity), requests)
    }

    #[test]
    fn put_value_skips_unchanged() {
        let (orchestrator, requests) = counting_orchestrator(FakePower::default());
        let mut ctl = Control::new(1, 7, 2, ControlKind::Switch).unwrap();
        assert!(!orchestrator.put_value(&mut ctl, &[0, 0]).unwrap());
        assert_eq!(requests.lock().unwrap().len(), 0);
        assert_eq!(orchestrator.activity().ops().count(PowerEvent::Resume), 0);
    }

    #[test]
    fn put_value_sends_full_vector() {
        let mut orchestrator = simulated_orchestrator();
        let mut ctl = Control::new(2, 7, 3, ControlKind::Enum).unwrap();

        assert!(orchestrator.put_value(&mut ctl, &[0, 2, 0]).unwrap());

        let dsp = orchestrator.ipc.get_mut().unwrap().doorbell_mut();
        assert_eq!(dsp.transactions, 1);
        assert_eq!(dsp.values.get(&7), Some(&vec![0, 2, 0]));
        let cached: Vec<u32> = ctl.channel_values().iter().map(|ch| ch.value).collect();
        assert_eq!(cached, vec![0, 2, 0]);

        assert!(!orchestrator.put_value(&mut ctl, &[0, 2, 0]).unwrap());
        let dsp = orchestrator.ipc.get_mut().unwrap().doorbell_mut();
        assert_eq!(dsp.transactions, 1);
    }

    #[test]
    fn put_value_invalid_argument() {
        let (orchestrator, requests) = counting_orchestrator(FakePower::default());
        let mut ctl = Control::new(3, 7, 2, ControlKind::Switch).unwrap();

        let err = orchestrator.put_value(&mut ctl, &[1]).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);
        let err = orchestrator.put_value(&mut ctl, &[1, -1]).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);

        assert_eq!(requests.lock().unwrap().len(), 0);
        assert!(ctl.channel_values().iter().all(|ch| ch.value == 0));
    }

    #[test]
    fn volume_round_trip_via_device() {
        let orchestrator = simulated_orchestrator();
        let table = VolumeTable::new(vec![0, 10, 10, 50, 100]).unwrap();
        let mut ctl = Control::new(4, 9, 2, ControlKind::Volume(table)).unwrap();

        assert!(orchestrator.put_value(&mut ctl, &[2, 7]).unwrap());
        assert_eq!(ctl.channel_values()[0].value, 10);
        assert_eq!(ctl.channel_values()[1].value, 100);

        let mut other = ctl.clone();
        other.update_channels(&[0, 0]);
        assert_eq!(orchestrator.get_value(&mut other).unwrap(), vec![1, 4]);
        assert_eq!(other.channel_values(), ctl.channel_values());
    }

    #[test]
    fn get_value_rejects_wrong_component() {
        let (orchestrator, _) = counting_orchestrator(FakePower::default());
        let mut ctl = Control::new(5, 7, 1, ControlKind::Switch).unwrap();
        let err = orchestrator.get_value(&mut ctl).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::ProtocolViolation);
        assert_eq!(orchestrator.activity().ops().count(PowerEvent::Idle), 1);
    }

    #[test]
    fn resume_failure_skips_mailbox() {
        let (orchestrator, requests) = counting_orchestrator(FakePower {
            resume_fails: true,
            ..Default::default()
        });
        let mut ctl = Control::new(6, 7, 1, ControlKind::Switch).unwrap();

        let err = orchestrator.put_value(&mut ctl, &[1]).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::PowerResumeFailed);
        assert_eq!(requests.lock().unwrap().len(), 0);
        assert_eq!(orchestrator.activity().usage_count(), 0);
    }

    #[test]
    fn triggerable_switch_side_effect() {
        let mut orchestrator = simulated_orchestrator();
        let mut ctl = Control::new(7, 11, 2, ControlKind::TriggerableSwitch).unwrap();

        assert!(orchestrator.put_value(&mut ctl, &[1]).unwrap());
        assert!(ctl.channel_values().iter().all(|ch| ch.value == 1));
        {
            let dsp = orchestrator.ipc.get_mut().unwrap().doorbell_mut();
            assert_eq!(
                dsp.streams,
                vec![(CMD_STREAM_PCM_PARAMS, 11), (CMD_STREAM_TRIG_START, 11)]
            );
        }

        assert!(!orchestrator.put_value(&mut ctl, &[1, 0]).unwrap());

        assert!(orchestrator.put_value(&mut ctl, &[0]).unwrap());
        let dsp = orchestrator.ipc.get_mut().unwrap().doorbell_mut();
        assert_eq!(dsp.streams.len(), 3);
        assert_eq!(dsp.streams[2], (CMD_STREAM_PCM_FREE, 11));
        assert_eq!(dsp.transactions, 5);
    }

    #[test]
    fn triggerable_switch_side_effect_failure() {
        let mut orchestrator = simulated_orchestrator();
        orchestrator.ipc.get_mut().unwrap().doorbell_mut().stream_error = -22;
        let mut ctl = Control::new(8, 11, 1, ControlKind::TriggerableSwitch).unwrap();

        let err = orchestrator.put_value(&mut ctl, &[1]).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::Transport);
        assert_eq!(ctl.channel_values()[0].value, 1);
    }

    #[test]
    fn triggerable_switches_in_parallel() {
        let mut orchestrator = simulated_orchestrator();

        thread::scope(|s| {
            let orchestrator = &orchestrator;
            for comp_id in [11u32, 12] {
                s.spawn(move || {
                    let mut ctl =
                        Control::new(comp_id, comp_id, 1, ControlKind::TriggerableSwitch).unwrap();
                    (0..20).for_each(|i| {
                        let value = if i % 2 == 0 { 1 } else { 0 };
                        assert!(orchestrator.put_value(&mut ctl, &[value]).unwrap());
                    });
                });
            }
        });

        let dsp = orchestrator.ipc.get_mut().unwrap().doorbell_mut();
        assert_eq!(dsp.log.len(), 2 * (10 * 3 + 10 * 2));
        dsp.log
            .iter()
            .enumerate()
            .for_each(|(i, &(command, comp_id))| match command {
                CMD_STREAM_PCM_PARAMS => {
                    assert_eq!(dsp.log[i - 1], (CMD_COMP_SET_VALUE, comp_id));
                    assert_eq!(dsp.log[i + 1], (CMD_STREAM_TRIG_START, comp_id));
                }
                CMD_STREAM_PCM_FREE => {
                    assert_eq!(dsp.log[i - 1], (CMD_COMP_SET_VALUE, comp_id));
                }
                _ => (),
            });
        assert_eq!(orchestrator.activity().usage_count(), 0);
    }

    #[test]
    fn put_blob_failure_restores_cache() {
        let mut orchestrator = simulated_orchestrator();
        let mut ctl = Control::new_bytes(18, 19, 64, CORE_ABI_VERSION).unwrap();

        let payload = BlobPayload::new(CORE_ABI_VERSION, &[0x01; 8]);
        orchestrator.put_blob(&mut ctl, &payload).unwrap();
        let cached = ctl.cached_data().to_vec();

        orchestrator.ipc.get_mut().unwrap().doorbell_mut().deaf = true;
        let other = BlobPayload::new(CORE_ABI_VERSION, &[0x02; 16]);

        let err = orchestrator.put_blob(&mut ctl, &other).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::Transport);
        assert_eq!(ctl.cached_data(), &cached[..]);

        let data = wrap_envelope(18, other.as_bytes());
        let err = orchestrator.put_blob_ext(&mut ctl, &data).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::Transport);
        assert_eq!(ctl.cached_data(), &cached[..]);
    }

    #[test]
    fn blob_round_trip() {
        let mut orchestrator = simulated_orchestrator();
        let mut ctl = Control::new_bytes(9, 13, 64, CORE_ABI_VERSION).unwrap();

        let payload = BlobPayload::new(CORE_ABI_VERSION, &[0x01, 0x02, 0x03, 0x04, 0x05]);
        orchestrator.put_blob(&mut ctl, &payload).unwrap();

        let blob = orchestrator.get_blob(&mut ctl).unwrap();
        assert_eq!(blob, payload);
        assert_eq!(blob.payload(), Some(&[0x01, 0x02, 0x03, 0x04, 0x05][..]));

        let before = orchestrator.ipc.get_mut().unwrap().doorbell_mut().blobs.clone();
        orchestrator.put_blob(&mut ctl, &blob).unwrap();
        let after = orchestrator.ipc.get_mut().unwrap().doorbell_mut().blobs.clone();
        assert_eq!(before, after);
    }

    #[test]
    fn put_blob_validation_before_device() {
        let (orchestrator, requests) = counting_orchestrator(FakePower::default());
        let mut ctl = Control::new_bytes(10, 13, 64, CORE_ABI_VERSION).unwrap();

        // Too large and wrong magic.
        let mut raw = vec![0u8; 80];
        serialize_u32(&0xdeadbeef, &mut raw[..4]);
        let err = orchestrator
            .put_blob(&mut ctl, &BlobPayload::from_raw(raw))
            .unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);

        let mut raw = BlobPayload::new(CORE_ABI_VERSION, &[0; 52]).into_bytes();
        serialize_u32(&60, &mut raw[8..12]);
        let err = orchestrator
            .put_blob(&mut ctl, &BlobPayload::from_raw(raw))
            .unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::ProtocolViolation);

        let newer = AbiVersion::new(ABI_MAJOR, ABI_MINOR + 1, 0);
        let err = orchestrator
            .put_blob(&mut ctl, &BlobPayload::new(newer, &[0; 4]))
            .unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::ProtocolViolation);

        assert_eq!(requests.lock().unwrap().len(), 0);
        assert!(ctl.cached_data().iter().all(|&b| b == 0));
        assert_eq!(orchestrator.activity().ops().count(PowerEvent::Resume), 0);
    }

    #[test]
    fn blob_surface_capacity() {
        let (orchestrator, requests) = counting_orchestrator(FakePower::default());
        let mut ctl = Control::new_bytes(11, 13, 1024, CORE_ABI_VERSION).unwrap();

        let err = orchestrator.get_blob(&mut ctl).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);
        let payload = BlobPayload::new(CORE_ABI_VERSION, &[0; 4]);
        let err = orchestrator.put_blob(&mut ctl, &payload).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);

        assert_eq!(requests.lock().unwrap().len(), 0);
    }

    #[test]
    fn get_blob_declared_size_violation() {
        let mut orchestrator = simulated_orchestrator();
        let mut ctl = Control::new_bytes(12, 13, 64, CORE_ABI_VERSION).unwrap();

        let mut raw = BlobPayload::new(CORE_ABI_VERSION, &[0; 4]).into_bytes();
        serialize_u32(&60, &mut raw[8..12]);
        orchestrator
            .ipc
            .get_mut()
            .unwrap()
            .doorbell_mut()
            .blobs
            .insert(13, raw);

        let err = orchestrator.get_blob(&mut ctl).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::ProtocolViolation);
        assert_eq!(orchestrator.activity().ops().count(PowerEvent::Idle), 1);
    }

    #[test]
    fn blob_ext_round_trip() {
        let orchestrator = simulated_orchestrator();
        let mut ctl = Control::new_bytes(14, 15, 1024, CORE_ABI_VERSION).unwrap();

        let payload = BlobPayload::new(CORE_ABI_VERSION, &[0x5a; 600]);
        let data = wrap_envelope(14, payload.as_bytes());
        orchestrator.put_blob_ext(&mut ctl, &data).unwrap();

        let res = orchestrator.get_blob_ext(&mut ctl, 2048).unwrap();
        assert_eq!(res, data);

        let err = orchestrator.get_blob_ext(&mut ctl, 600).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);
        let err = orchestrator.get_blob_ext(&mut ctl, 4).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);
    }

    #[test]
    fn put_blob_ext_envelope_checks() {
        let (orchestrator, requests) = counting_orchestrator(FakePower::default());
        let mut ctl = Control::new_bytes(16, 15, 64, CORE_ABI_VERSION).unwrap();

        let payload = BlobPayload::new(CORE_ABI_VERSION, &[0; 8]);

        let data = wrap_envelope(17, payload.as_bytes());
        let err = orchestrator.put_blob_ext(&mut ctl, &data).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::ProtocolViolation);

        let mut data = wrap_envelope(16, payload.as_bytes());
        serialize_u32(&65, &mut data[4..8]);
        let err = orchestrator.put_blob_ext(&mut ctl, &data).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);

        assert_eq!(requests.lock().unwrap().len(), 0);
    }

    #[test]
    fn value_operation_on_bytes_control() {
        let (orchestrator, _) = counting_orchestrator(FakePower::default());
        let mut ctl = Control::new_bytes(18, 15, 64, CORE_ABI_VERSION).unwrap();
        let err = orchestrator.get_value(&mut ctl).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);

        let mut ctl = Control::new(19, 15, 1, ControlKind::Switch).unwrap();
        let err = orchestrator.get_blob(&mut ctl).unwrap_err();
        assert_eq!(err.kind(), ControlProtocolError::InvalidArgument);
    }
}
