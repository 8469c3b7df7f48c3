mod builtins;
mod config;
mod error;
mod job_control;
mod jobs;
mod parser;
mod reaper;
mod redirect;
mod shell;
mod spawner;
mod status;

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::builtins::BuiltinAction;
use crate::config::{ShellConfig, DEFAULT_LOG_FILTER, LOG_ENV};
use crate::error::{ParseError, ShellError};
use crate::job_control::{TerminalControl, Tty};
use crate::reaper::Reaper;
use crate::shell::Shell;

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(
            EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = ShellConfig::from_env();
    match run(&config) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("dsh: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &ShellConfig) -> Result<u8, ShellError> {
    ctrlc::set_handler(|| {
        println!();
        let _ = io::stdout().flush();
    })
    .map_err(io::Error::other)?;

    let (terminal, shell_pgid) = match Tty::acquire(config.interactive) {
        Ok(acquired) => acquired,
        Err(e) => {
            warn!(error = %e, "no usable terminal, job control disabled");
            Tty::acquire(false)?
        }
    };
    let interactive = terminal.tty_fd().is_some();
    debug!(interactive, shell_pgid, "shell started");

    let reaper = Reaper::install()?;
    let mut shell = Shell::new(terminal, reaper, shell_pgid);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    let mut line = Vec::new();

    loop {
        shell.reap_pending()?;

        if interactive {
            print!("{}", config.prompt);
            stdout.flush()?;
        }

        line.clear();
        match stdin.lock().read_until(b'\n', &mut line) {
            Ok(0) => {
                if interactive {
                    println!();
                }
                shell.shutdown();
                return Ok(0);
            }
            Ok(_) => {}
            // A signal landed mid-read; show a fresh prompt.
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }

        let parsed = std::str::from_utf8(&line)
            .map_err(|_| ParseError::InvalidUtf8)
            .and_then(parser::parse_line);
        let jobs = match parsed {
            Ok(jobs) => jobs,
            Err(e) => {
                eprintln!("dsh: {e}");
                continue;
            }
        };

        for job in jobs {
            shell.reap_pending()?;
            if let BuiltinAction::Exit(code) = shell.run(job, &mut stdout, &mut stderr)? {
                return Ok(code.clamp(0, 255) as u8);
            }
        }
        stdout.flush()?;
    }
}
