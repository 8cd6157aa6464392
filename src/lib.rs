//! # dated-backup
//!
//! A single-host backup runner. Every run writes into a directory named after
//! the current date.
//!
//! ## Features
//!
//! - **Folder archives**: one archive per configured folder, or one per child
//!   for folders whose name ends in `.each`
//! - **Database dumps**: `pg_dump`/`mysqldump` piped into a compressor
//! - **Archivers**: 7zip, bzip2 or gzip, run as external programs
//! - **Worker pool**: jobs run on a fixed number of worker threads
//! - **Retention**: the run directory that falls out of the window is removed
//! - **Remote mirror**: name-based FTP sync of the whole backup root
//! - **Notifications**: SMTP e-mail or Pushover, log-only when unset
//!
//! ## Quick Start
//!
//! ```no_run
//! use dated_backup::backup::backup_config::BackupConfig;
//! use dated_backup::backup::runner::Runner;
//!
//! let config = BackupConfig::load("config.yml")?;
//! let report = Runner::new(config).run(chrono::Local::now().date_naive())?;
//! println!("{} job(s) failed", report.jobs.failed);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
