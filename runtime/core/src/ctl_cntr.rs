// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

use {
    sof_ctl_protocols::*,
    tracing::{debug, debug_span},
};

/// The container of controls, addressed by name.
#[derive(Default, Debug)]
pub struct CtlCntr {
    entries: Vec<(String, Control)>,
}

fn value_array_literal(control: &Control) -> String {
    match control.kind() {
        ControlKind::Bytes => {
            let header = control.data_header();
            format!(
                "magic: 0x{:08x}, abi: {}, size: {}",
                header.magic, header.abi_version, header.size
            )
        }
        ControlKind::Volume(table) => {
            let vals: Vec<u32> = control
                .channel_values()
                .iter()
                .map(|ch| table.device_to_ui(ch.value))
                .collect();
            format!("{:?}", vals)
        }
        _ => {
            let vals: Vec<u32> = control.channel_values().iter().map(|ch| ch.value).collect();
            format!("{:?}", vals)
        }
    }
}

fn dump_control(name: &str, control: &Control) {
    match control.kind() {
        ControlKind::Bytes => {
            debug!(
                name,
                id = control.id(),
                comp_id = control.comp_id(),
                kind = control.kind().name(),
                capacity = control.capacity(),
                abi = %control.abi_version(),
            );
        }
        ControlKind::Volume(table) => {
            debug!(
                name,
                id = control.id(),
                comp_id = control.comp_id(),
                kind = control.kind().name(),
                channels = control.channel_count(),
                value_max = table.max_index(),
            );
        }
        _ => {
            debug!(
                name,
                id = control.id(),
                comp_id = control.comp_id(),
                kind = control.kind().name(),
                channels = control.channel_count(),
            );
        }
    }
}

impl CtlCntr {
    pub fn add_control(&mut self, name: &str, control: Control) -> Result<(), Error> {
        let _enter = debug_span!("register").entered();

        if self.entries.iter().any(|(n, _)| n == name) {
            let msg = format!("Control {} is already registered", name);
            return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
        }

        if self.entries.iter().any(|(_, c)| c.id() == control.id()) {
            let msg = format!("The identifier {} of {} is already used", control.id(), name);
            return Err(Error::new(ControlProtocolError::InvalidArgument, &msg));
        }

        dump_control(name, &control);
        self.entries.push((name.to_string(), control));

        Ok(())
    }

    pub fn controls(&self) -> impl Iterator<Item = (&str, &Control)> {
        self.entries.iter().map(|(name, control)| (name.as_str(), control))
    }

    pub fn find(&self, name: &str) -> Option<&Control> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, control)| control)
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut Control, Error> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, control)| control)
            .ok_or_else(|| {
                let msg = format!("Control {} is not found", name);
                Error::new(ControlProtocolError::InvalidArgument, &msg)
            })
    }

    pub fn read_values<T, P>(
        &mut self,
        orchestrator: &ControlOrchestrator<T, P>,
        name: &str,
    ) -> Result<Vec<i64>, Error>
    where
        T: IpcOperation,
        P: PowerOperation,
    {
        let control = self.find_mut(name)?;

        let _enter = debug_span!("hardware").entered();
        let res = orchestrator.get_value(control);
        debug!(
            id = control.id(),
            values = value_array_literal(control),
            ?res,
        );

        res
    }

    pub fn write_values<T, P>(
        &mut self,
        orchestrator: &ControlOrchestrator<T, P>,
        name: &str,
        values: &[i64],
    ) -> Result<bool, Error>
    where
        T: IpcOperation,
        P: PowerOperation,
    {
        let control = self.find_mut(name)?;

        let _enter = debug_span!("cache").entered();
        let old_values = value_array_literal(control);
        _enter.exit();

        let _enter = debug_span!("hardware").entered();
        let res = orchestrator.put_value(control, values);
        debug!(
            id = control.id(),
            old_values,
            new_values = value_array_literal(control),
            ?res,
        );

        res
    }

    pub fn read_bytes<T, P>(
        &mut self,
        orchestrator: &ControlOrchestrator<T, P>,
        name: &str,
    ) -> Result<BlobPayload, Error>
    where
        T: IpcOperation,
        P: PowerOperation,
    {
        let control = self.find_mut(name)?;

        let _enter = debug_span!("hardware").entered();
        let res = orchestrator.get_blob(control);
        debug!(
            id = control.id(),
            values = value_array_literal(control),
            size = res.as_ref().map(|blob| blob.len()).unwrap_or_default(),
            ok = res.is_ok(),
        );

        res
    }

    pub fn write_bytes<T, P>(
        &mut self,
        orchestrator: &ControlOrchestrator<T, P>,
        name: &str,
        payload: &BlobPayload,
    ) -> Result<(), Error>
    where
        T: IpcOperation,
        P: PowerOperation,
    {
        let control = self.find_mut(name)?;

        let _enter = debug_span!("hardware").entered();
        let res = orchestrator.put_blob(control, payload);
        debug!(
            id = control.id(),
            size = payload.len(),
            values = value_array_literal(control),
            ?res,
        );

        res
    }

    pub fn read_tlv<T, P>(
        &mut self,
        orchestrator: &ControlOrchestrator<T, P>,
        name: &str,
        max: usize,
    ) -> Result<Vec<u8>, Error>
    where
        T: IpcOperation,
        P: PowerOperation,
    {
        let control = self.find_mut(name)?;

        let _enter = debug_span!("hardware").entered();
        let res = orchestrator.get_blob_ext(control, max);
        debug!(
            id = control.id(),
            max,
            values = value_array_literal(control),
            ok = res.is_ok(),
        );

        res
    }

    pub fn write_tlv<T, P>(
        &mut self,
        orchestrator: &ControlOrchestrator<T, P>,
        name: &str,
        data: &[u8],
    ) -> Result<(), Error>
    where
        T: IpcOperation,
        P: PowerOperation,
    {
        let control = self.find_mut(name)?;

        let _enter = debug_span!("hardware").entered();
        let res = orchestrator.put_blob_ext(control, data);
        debug!(
            id = control.id(),
            size = data.len(),
            values = value_array_literal(control),
            ?res,
        );

        res
    }
}
