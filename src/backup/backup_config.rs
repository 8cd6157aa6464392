use crate::backup::archiver::ArchiverFamily;
use crate::backup::database::DatabaseTarget;
use crate::backup::notifications::NotificationConfig;
use crate::backup::remote::RemoteConfig;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::AddMsg;
use crate::backup::target::BackupTarget;
use crate::backup::validate::{validate_folder_targets, validate_writable_dir};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use validator::{Validate, ValidationError};

fn default_workers() -> usize {
    1
}

/// Every database dump lands in the same dated directory.
fn validate_unique_dump_names(config: &BackupConfig) -> std::result::Result<(), ValidationError> {
    let mut seen = std::collections::BTreeSet::new();
    for target in &config.databases {
        for database in target.databases() {
            let name = target.dump_name(database);
            if !seen.insert(name.clone()) {
                return Err(ValidationError::new("DuplicateDatabase").with_message(
                    format!("Database {:?} is configured twice ({})", database, name).into(),
                ));
            }
        }
    }
    Ok(())
}

/// The YAML configuration file.
///
/// `archiver` and `retention_days` are optional here so that their absence
/// is reported as a missing setting by `Settings`/`RetentionSweeper` rather
/// than as a generic parse error.
#[skip_serializing_none]
#[derive(Clone, Serialize, Deserialize, Debug, Validate)]
#[serde(deny_unknown_fields)]
#[validate(schema(function = validate_unique_dump_names))]
pub struct BackupConfig {
    pub archiver: Option<ArchiverFamily>,
    #[validate(custom(function = validate_writable_dir))]
    pub out_dir: PathBuf,
    #[validate(range(min = 1))]
    pub retention_days: Option<u32>,
    #[serde(default = "default_workers")]
    #[validate(range(min = 1, max = 64))]
    pub workers: usize,
    #[serde(default)]
    #[validate(custom(function = validate_folder_targets))]
    pub folders: BTreeMap<String, PathBuf>,
    #[serde(default)]
    #[validate(nested)]
    pub databases: Vec<DatabaseTarget>,
    #[validate(nested)]
    pub notification: Option<NotificationConfig>,
    #[validate(nested)]
    pub remote: Option<RemoteConfig>,
}

impl BackupConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = File::open(path)
            .map_err(Error::from)
            .add_msg(format!("Cannot open config file {:?}", path))
            .and_then(|f| {
                serde_yml::from_reader::<_, BackupConfig>(f)
                    .map_err(Error::from)
                    .add_msg(format!("Parse YAML config failed: {:?}", path))
            })?;
        config
            .validate()
            .map_err(Error::from)
            .add_msg(format!("Config validation failed: {:?}", path))?;
        Ok(config)
    }

    pub fn folder_targets(&self) -> Vec<BackupTarget> {
        self.folders
            .iter()
            .map(|(name, src)| BackupTarget::from_config_entry(name, src))
            .collect()
    }
}
