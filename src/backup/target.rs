use getset::Getters;
use std::path::PathBuf;

/// Folder names ending in this suffix archive each child of the folder
/// separately instead of the folder as a whole.
pub static RECURSIVE_EXPAND_SUFFIX: &str = ".each";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    Plain,
    /// One level deep only, grandchildren end up inside their parent's archive.
    RecursiveExpand,
}

#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct BackupTarget {
    name: String,
    source: PathBuf,
    kind: TargetKind,
}

impl BackupTarget {
    pub fn plain<S: Into<String>, P: Into<PathBuf>>(name: S, source: P) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            kind: TargetKind::Plain,
        }
    }

    pub fn recursive_expand<S: Into<String>, P: Into<PathBuf>>(name: S, source: P) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            kind: TargetKind::RecursiveExpand,
        }
    }

    /// Applies the naming convention of the `folders` config section.
    pub fn from_config_entry<P: Into<PathBuf>>(configured_name: &str, source: P) -> Self {
        match configured_name.strip_suffix(RECURSIVE_EXPAND_SUFFIX) {
            Some(name) if !name.is_empty() => Self::recursive_expand(name, source),
            _ => Self::plain(configured_name, source),
        }
    }
}
