pub mod daemon_path;
pub mod process;
pub mod report;

use std::{env, path::PathBuf};

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use daemon_path::to_daemon_path;
use process::{kill_previous_servers, restart_server};
use tracing::level_filters::LevelFilter;

use crate::{
    config::{Config, ConfigFile},
    daemon::{
        start_daemon,
        storage::{record_log::FileEvidenceLogs, report::MarkdownReportStore},
    },
    llm::build_summarizer,
    utils::{
        dir::{create_application_default_path, default_config_path},
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "dayrecap", version, long_about = None)]
#[command(about = "Tracks file and terminal activity and writes a daily work report", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(
        long,
        global = true,
        help = "Configuration file. By default $XDG_CONFIG_HOME/dayrecap/config.toml"
    )]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Writes a default configuration if there is none and (re)starts the daemon")]
    Init {},
    #[command(
        about = "Run a daemon directly in current console. Used for debugging and for service managers"
    )]
    Serve {},
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Print the effective configuration")]
    Describe {},
    #[command(about = "Print the evidence that would be summarized right now")]
    Evidence {
        #[arg(long, help = "Token limit. By default the configured summarizer.token_limit")]
        token_limit: Option<usize>,
    },
    #[command(about = "Summarize the current evidence into a report immediately")]
    Summarize {
        #[arg(long, help = "Date of the report, YYYY-MM-DD. By default today")]
        date: Option<NaiveDate>,
    },
    #[command(about = "Send a small test log to the configured provider")]
    Check {},
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(
        CLI_PREFIX,
        &create_application_default_path()?,
        logging_level,
        args.log,
    )?;

    let config_path = match args.config {
        Some(v) => v,
        None => default_config_path().ok_or_else(|| anyhow!("Can't locate the config directory"))?,
    };

    match args.commands {
        Commands::Init {} => {
            if ConfigFile::write_default(&config_path)? {
                println!("Wrote default configuration to {config_path:?}");
            }
            // Fail here rather than in a detached process
            Config::load(Some(&config_path))?;
            restart_server(&to_daemon_path(env::current_exe()?), &config_path)?;
            println!("Daemon started");
            Ok(())
        }
        Commands::Stop {} => {
            let process_name = env::current_exe()?;
            let stopped = kill_previous_servers(&to_daemon_path(process_name.clone()))?
                + kill_previous_servers(&process_name)?;
            println!("Stopped {stopped} process(es)");
            Ok(())
        }
        Commands::Serve {} => {
            start_daemon(Config::load(Some(&config_path))?).await?;
            Ok(())
        }
        Commands::Describe {} => {
            let file = ConfigFile::read(&config_path)?;
            let config = file.clone().validate()?;
            println!("# {config_path:?}");
            println!("{}", file.masked().to_toml()?);
            println!("# change log   {:?}", config.storage.change_log);
            println!("# capture log  {:?}", config.storage.capture_log);
            println!("# state file   {:?}", config.storage.state_file);
            println!("# reports      {:?}", config.summarizer.report_dir);
            Ok(())
        }
        Commands::Evidence { token_limit } => {
            let config = Config::load(Some(&config_path))?;
            let logs = open_logs(&config);
            let payload = report::current_payload(
                &logs,
                token_limit.unwrap_or(config.summarizer.token_limit),
            )
            .await?;
            println!("{}", payload.render());
            println!();
            println!("{}", report::describe_payload(&payload));
            Ok(())
        }
        Commands::Summarize { date } => {
            let config = Config::load(Some(&config_path))?;
            let summarizer = build_summarizer(&config.llm)?;
            let reports = MarkdownReportStore::new(config.summarizer.report_dir.clone());
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            match report::summarize_now(
                &open_logs(&config),
                summarizer.as_ref(),
                &reports,
                date,
                config.summarizer.token_limit,
            )
            .await?
            {
                Some(path) => println!("Report written to {path:?}"),
                None => println!("Nothing to report"),
            }
            Ok(())
        }
        Commands::Check {} => {
            let config = Config::load(Some(&config_path))?;
            let summarizer = build_summarizer(&config.llm)?;
            println!("Asking {}", summarizer.describe());
            let answer =
                report::check_provider(summarizer.as_ref(), Local::now().date_naive()).await?;
            println!("{answer}");
            Ok(())
        }
    }
}

fn open_logs(config: &Config) -> FileEvidenceLogs {
    FileEvidenceLogs::open(
        config.storage.change_log.clone(),
        config.storage.capture_log.clone(),
    )
}
