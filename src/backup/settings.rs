use crate::backup::archiver::{ArchiverFamily, FileExtProvider};
use crate::backup::backup_config::BackupConfig;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use chrono::NaiveDate;
use getset::{CopyGetters, Getters};
use std::path::{Path, PathBuf};

/// Name format of the per-day output directories.
pub static DATE_FORMAT: &str = "%Y-%m-%d";

pub fn dated_dir_name(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Run settings after resolution, read-only for the rest of the run.
#[derive(Clone, Debug, Getters, CopyGetters)]
pub struct Settings {
    #[getset(get_copy = "pub")]
    archiver: ArchiverFamily,
    #[getset(get = "pub")]
    out_root: PathBuf,
    #[getset(get_copy = "pub")]
    date: NaiveDate,
    #[getset(get = "pub")]
    dated_dir: PathBuf,
    #[getset(get_copy = "pub")]
    retention_days: Option<u32>,
    #[getset(get_copy = "pub")]
    workers: usize,
}

impl Settings {
    /// Fails when no archiver is configured. Touches nothing on disk.
    pub fn new(config: &BackupConfig, date: NaiveDate) -> Result<Self> {
        let archiver = config
            .archiver
            .ok_or_else(|| Error::missing_setting("archiver"))?;

        Ok(Self {
            archiver,
            out_root: config.out_dir.clone(),
            date,
            dated_dir: config.out_dir.join(dated_dir_name(date)),
            retention_days: config.retention_days,
            workers: config.workers.max(1),
        })
    }

    pub fn create_dated_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dated_dir)
            .map_err(Error::from)
            .add_msg(format!("Cannot create backup directory {:?}", self.dated_dir))
    }

    /// `new` followed by `create_dated_dir`. Both failures abort the run
    /// before anything is archived.
    pub fn resolve(config: &BackupConfig, date: NaiveDate) -> Result<Self> {
        let settings = Self::new(config, date)?;
        settings.create_dated_dir()?;
        Ok(settings)
    }

    /// `<dated dir>/<relative>.<archive extension>`
    pub fn archive_path<P: AsRef<Path>>(&self, relative: P) -> PathBuf {
        with_ext(self.dated_dir.join(relative), self.archiver.file_ext())
    }

    /// `<dated dir>/<dump name>.<dump extension>`
    pub fn dump_path(&self, dump_name: &str) -> PathBuf {
        with_ext(
            self.dated_dir.join(dump_name),
            self.archiver.dump_compressor().file_ext(),
        )
    }
}

/// Appends rather than replaces, `a.txt` becomes `a.txt.7z`.
fn with_ext(path: PathBuf, ext: &str) -> PathBuf {
    let mut path = path.into_os_string();
    path.push(".");
    path.push(ext);
    path.into()
}
