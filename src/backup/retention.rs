use crate::backup::function_path;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::settings::{dated_dir_name, Settings};
use chrono::{Days, NaiveDate};
use function_name::named;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    Removed(PathBuf),
    /// Nothing was backed up on the cutoff day, or it was already removed.
    NotFound(PathBuf),
}

/// Removes the dated output directory that just left the retention window.
///
/// Only the directory exactly `retention_days` old is considered; older
/// ones were handled by earlier runs.
#[derive(Clone, Debug)]
pub struct RetentionSweeper {
    out_root: PathBuf,
    today: NaiveDate,
    retention_days: u32,
}

impl RetentionSweeper {
    /// Fails when no retention window is configured.
    pub fn new(settings: &Settings) -> Result<Self> {
        let retention_days = settings
            .retention_days()
            .ok_or_else(|| Error::missing_setting("retention_days"))?;
        Ok(Self {
            out_root: settings.out_root().clone(),
            today: settings.date(),
            retention_days,
        })
    }

    pub fn cutoff_date(&self) -> NaiveDate {
        self.today
            .checked_sub_days(Days::new(self.retention_days.into()))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn cutoff_dir(&self) -> PathBuf {
        self.out_root.join(dated_dir_name(self.cutoff_date()))
    }

    #[named]
    pub fn sweep(&self) -> Result<SweepOutcome> {
        let dir = self.cutoff_dir();
        if !dir.exists() {
            tracing::info!("No expired backup at {:?}", dir);
            return Ok(SweepOutcome::NotFound(dir));
        }

        std::fs::remove_dir_all(&dir)
            .map_err(Error::from)
            .add_msg(format!("Cannot remove expired backup {:?}", dir))
            .add_fn_name(function_path!())?;
        tracing::info!("Removed expired backup {:?}", dir);
        Ok(SweepOutcome::Removed(dir))
    }
}
