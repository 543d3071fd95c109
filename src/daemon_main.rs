use std::{env::args, process::ExitCode};

use anyhow::Result;
use clap::Parser;
use dayrecap::{
    config::Config,
    daemon::{args::DaemonArgs, start_daemon},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, DAEMON_PREFIX},
        runtime::single_thread_runtime,
    },
};

fn main() -> ExitCode {
    match run_service(args().collect::<Vec<_>>()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run_service(command_args: Vec<String>) -> Result<()> {
    let args = DaemonArgs::parse_from(&command_args);
    // Configuration problems are reported before detaching, while there is still a console
    let config = Config::load(args.config.as_deref())?;

    #[cfg(unix)]
    if !args.force {
        use daemonize::Daemonize;

        let daemonize = Daemonize::new()
            .stdout(daemonize::Stdio::devnull())
            .stderr(daemonize::Stdio::devnull())
            .execute();
        match daemonize {
            daemonize::Outcome::Parent(parent) => {
                parent?;
                println!("Created daemon");
                return Ok(());
            }
            daemonize::Outcome::Child(child) => {
                child?;
            }
        }
    }

    run(args, config)
}

fn run(args: DaemonArgs, config: Config) -> Result<()> {
    let app_dir = args.dir.map_or_else(create_application_default_path, Ok)?;
    enable_logging(DAEMON_PREFIX, &app_dir, args.log, args.log_console)?;
    single_thread_runtime()?.block_on(async move { start_daemon(config).await })?;
    Ok(())
}
