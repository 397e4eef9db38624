// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto
mod config;
mod doorbell;
mod power;

use {
    clap::{Parser, Subcommand},
    crate::{config::*, doorbell::*, power::*},
    runtime_core::{cmdline::*, ctl_cntr::*, LogLevel, *},
    sof_ctl_protocols::*,
    std::{
        fs::OpenOptions,
        os::unix::fs::OpenOptionsExt,
        path::{Path, PathBuf},
        sync::Arc,
    },
    tracing::{debug, debug_span, Level},
};

/// The maximum size of envelope and blob as a default.
const DEFAULT_TLV_MAX: usize = 4096;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Operation {
    /// List all of controls in the description.
    List,
    /// Get the values of channels.
    Get { name: String },
    /// Put the values of channels.
    Put {
        name: String,
        #[arg(required = true, allow_negative_numbers = true)]
        values: Vec<i64>,
    },
    /// Get the blob into the file.
    GetBytes { name: String, file: PathBuf },
    /// Put the blob in the file.
    PutBytes { name: String, file: PathBuf },
    /// Get the blob wrapped by envelope into the file.
    GetTlv {
        name: String,
        file: PathBuf,
        /// The maximum size of envelope and blob.
        #[arg(long, default_value_t = DEFAULT_TLV_MAX)]
        max: usize,
    },
    /// Put the blob wrapped by envelope in the file.
    PutTlv { name: String, file: PathBuf },
}

type SofOrchestrator = ControlOrchestrator<MailboxIpc<RegisterDoorbell>, RuntimePower>;

struct SofRuntime {
    config: ServiceConfig,
    operation: Operation,
    orchestrator: SofOrchestrator,
    ctl_cntr: CtlCntr,
}

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| {
        let msg = format!("Fail to read {}: {}", path.display(), e);
        Error::new(ControlProtocolError::Io, &msg)
    })
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), Error> {
    std::fs::write(path, data).map_err(|e| {
        let msg = format!("Fail to write {}: {}", path.display(), e);
        Error::new(ControlProtocolError::Io, &msg)
    })
}

fn control_summary(name: &str, control: &Control) -> String {
    let detail = match control.kind() {
        ControlKind::Bytes => format!("capacity {}", control.capacity()),
        ControlKind::Volume(table) => format!(
            "channels {}, steps 0-{}",
            control.channel_count(),
            table.max_index()
        ),
        _ => format!("channels {}", control.channel_count()),
    };
    format!(
        "{:4} {:4} {:8} {}: {}",
        control.id(),
        control.comp_id(),
        control.kind().name(),
        name,
        detail
    )
}

impl RuntimeOperation<(PathBuf, Operation)> for SofRuntime {
    fn new(
        (path, operation): (PathBuf, Operation),
        log_level: Option<LogLevel>,
    ) -> Result<Self, Error> {
        if let Some(level) = log_level {
            let fmt_level = match level {
                LogLevel::Debug => Level::DEBUG,
            };
            tracing_subscriber::fmt().with_max_level(fmt_level).init();
        }

        let config = ServiceConfig::load(&path)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&config.device.path)
            .map_err(|e| {
                let msg = format!("Fail to open {}: {}", config.device.path.display(), e);
                Error::new(ControlProtocolError::Io, &msg)
            })?;
        let region = MappedRegion::map(&file, config.device.offset, config.device.size)?;
        debug!(path = %config.device.path.display(), ?region);

        let doorbell = RegisterDoorbell::from(&config.doorbell);
        let ipc = MailboxIpc::new(region, config.mailbox_layout(), doorbell)?;

        let power = RuntimePower::new(config.device.power.as_deref())?;
        let activity = Arc::new(DeviceActivity::new(power, config.autosuspend_delay()));

        let orchestrator = ControlOrchestrator::new(ipc, activity);

        Ok(SofRuntime {
            config,
            operation,
            orchestrator,
            ctl_cntr: Default::default(),
        })
    }

    fn listen(&mut self) -> Result<(), Error> {
        let _enter = debug_span!("load").entered();

        self.config
            .build_controls()?
            .into_iter()
            .try_for_each(|(name, control)| self.ctl_cntr.add_control(&name, control))
    }

    fn run(&mut self) -> Result<(), Error> {
        let _enter = debug_span!("operation").entered();
        debug!(operation = ?self.operation);

        let orchestrator = &self.orchestrator;
        let ctl_cntr = &mut self.ctl_cntr;

        match &self.operation {
            Operation::List => {
                ctl_cntr
                    .controls()
                    .for_each(|(name, control)| println!("{}", control_summary(name, control)));
            }
            Operation::Get { name } => {
                let vals = ctl_cntr.read_values(orchestrator, name)?;
                let literals: Vec<String> = vals.iter().map(|val| val.to_string()).collect();
                println!("{}", literals.join(" "));
            }
            Operation::Put { name, values } => {
                let changed = ctl_cntr.write_values(orchestrator, name, values)?;
                debug!(name = name.as_str(), changed);
            }
            Operation::GetBytes { name, file } => {
                let payload = ctl_cntr.read_bytes(orchestrator, name)?;
                write_file(file, payload.as_bytes())?;
            }
            Operation::PutBytes { name, file } => {
                let payload = BlobPayload::from_raw(read_file(file)?);
                ctl_cntr.write_bytes(orchestrator, name, &payload)?;
            }
            Operation::GetTlv { name, file, max } => {
                let data = ctl_cntr.read_tlv(orchestrator, name, *max)?;
                write_file(file, &data)?;
            }
            Operation::PutTlv { name, file } => {
                let data = read_file(file)?;
                ctl_cntr.write_tlv(orchestrator, name, &data)?;
            }
        }

        Ok(())
    }
}

impl Drop for SofRuntime {
    fn drop(&mut self) {
        let _enter = debug_span!("shutdown").entered();
        let res = self.orchestrator.activity().shutdown();
        debug!(?res);
    }
}

struct SofServiceCmd;

#[derive(Parser)]
#[command(name = "snd-sof-ctl-service")]
struct Arguments {
    /// The path to file of device description in TOML format.
    config: PathBuf,

    #[command(subcommand)]
    operation: Operation,

    /// The level to debug runtime, disabled as a default.
    #[arg(long, short, value_enum)]
    log_level: Option<LogLevel>,
}

impl ServiceCmd<Arguments, (PathBuf, Operation), SofRuntime> for SofServiceCmd {
    fn params(args: &Arguments) -> ((PathBuf, Operation), Option<LogLevel>) {
        ((args.config.clone(), args.operation.clone()), args.log_level)
    }
}

fn main() {
    SofServiceCmd::run()
}
