use chrono::Local;
use clap::Parser;
use dated_backup::backup::backup_config::BackupConfig;
use dated_backup::backup::result_error::error::Error;
use dated_backup::backup::result_error::result::Result;
use dated_backup::backup::result_error::AddMsg;
use dated_backup::backup::runner::Runner;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Mutex;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Archive folders and dump databases into today's backup directory, drop
/// the expired one and mirror the result to FTP.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Location of config file
    #[arg(short, long)]
    config: PathBuf,
    /// Also append log events to this file
    #[arg(short, long)]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let file_layer = log_file
        .map(|path| {
            File::options()
                .append(true)
                .create(true)
                .open(path)
                .map_err(Error::from)
                .add_msg(format!("Cannot open log file {:?}", path))
                .map(|file| fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        })
        .transpose()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_file.as_deref()) {
        eprintln!("{e}");
        exit(1);
    }

    let res = BackupConfig::load(&args.config)
        .and_then(|config| Runner::new(config).run(Local::now().date_naive()));

    if let Err(e) = res {
        error!("{e}");
        exit(1);
    }
}
