// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2024 Takashi Sakamoto

use {
    super::{LogLevel, RuntimeOperation},
    clap::Parser,
    sof_ctl_protocols::{ControlProtocolError, Error},
};

pub trait ServiceCmd<A, T, R>: Sized
where
    A: Parser,
    R: RuntimeOperation<T>,
{
    fn params(args: &A) -> (T, Option<LogLevel>);

    fn run() {
        let code = A::try_parse()
            .map_err(|err| err.to_string())
            .map(|args| Self::params(&args))
            .and_then(|(params, log_level)| {
                R::new(params, log_level)
                    .and_then(|mut runtime| {
                        runtime.listen()?;
                        runtime.run()?;
                        Ok(libc::EXIT_SUCCESS)
                    })
                    .map_err(|err| specific_err_to_string(&err))
            })
            .unwrap_or_else(|msg| {
                eprintln!("{}", msg);
                libc::EXIT_FAILURE
            });

        std::process::exit(code)
    }
}

pub fn specific_err_to_string(e: &Error) -> String {
    let (domain, cause) = match e.kind() {
        ControlProtocolError::InvalidArgument => ("Control operation error", "Invalid argument"),
        ControlProtocolError::PowerResumeFailed => {
            ("Power management error", "Device is not resumed")
        }
        ControlProtocolError::Transport => ("Mailbox operation error", "No valid reply"),
        ControlProtocolError::ProtocolViolation => {
            ("Control operation error", "Protocol violation")
        }
        ControlProtocolError::Io => ("Linux file operation error", ""),
    };
    format!("{}: {}, {}", domain, cause, e)
}
