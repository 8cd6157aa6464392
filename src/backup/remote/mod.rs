//! Mirrors the local backup root to a remote directory.
//!
//! Only names are compared. An entry present on both sides is left alone
//! even if its content changed, which is fine for dated backup sets that
//! are never modified after their run.

pub mod ftp;

use crate::backup::redacted::RedactedString;
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::{convert_error_vec, Result};
use crate::backup::result_error::AddMsg;
use bon::Builder;
use getset::Getters;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use validator::Validate;

fn default_port() -> u16 {
    21
}

fn default_remote_dir() -> String {
    "/".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, Getters)]
#[serde(deny_unknown_fields)]
#[getset(get = "pub")]
pub struct RemoteConfig {
    #[validate(length(min = 1))]
    #[builder(into)]
    host: String,
    #[serde(default = "default_port")]
    #[builder(default = default_port())]
    port: u16,
    /// Anonymous login when absent.
    #[builder(into)]
    user: Option<String>,
    #[validate(nested)]
    password: Option<RedactedString>,
    #[serde(default = "default_remote_dir")]
    #[validate(length(min = 1))]
    #[builder(default = default_remote_dir(), into)]
    remote_dir: String,
}

/// Stateful remote file-listing protocol, every call is relative to the
/// current remote directory.
pub trait RemoteFs {
    fn change_dir(&mut self, path: &str) -> Result<()>;
    fn parent_dir(&mut self) -> Result<()>;
    fn list_names(&mut self) -> Result<BTreeSet<String>>;
    /// Names of the subdirectories of the current directory, or `None` when
    /// the protocol cannot tell files from directories.
    fn directory_names(&mut self) -> Result<Option<BTreeSet<String>>> {
        Ok(None)
    }
    fn make_dir(&mut self, name: &str) -> Result<()>;
    fn store(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64>;
    fn delete_file(&mut self, name: &str) -> Result<()>;
    fn remove_dir(&mut self, name: &str) -> Result<()>;
    fn quit(&mut self) -> Result<()>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncDiff {
    pub transfer: BTreeSet<String>,
    pub delete: BTreeSet<String>,
}

impl SyncDiff {
    pub fn compute(local: &BTreeSet<String>, remote: &BTreeSet<String>) -> Self {
        Self {
            transfer: local.difference(remote).cloned().collect(),
            delete: remote.difference(local).cloned().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transfer.is_empty() && self.delete.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub diff: SyncDiff,
    pub uploaded_files: usize,
    pub created_dirs: usize,
    pub deleted_files: usize,
    pub removed_dirs: usize,
}

pub fn local_names<P: AsRef<Path>>(dir: P) -> Result<BTreeSet<String>> {
    let dir = dir.as_ref();
    std::fs::read_dir(dir)
        .map_err(Error::from)
        .add_msg(format!("Cannot list {:?}", dir))?
        .map(|entry| {
            entry
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .map_err(Error::from)
        })
        .collect()
}

/// Children sorted by name, files first, so uploads happen before descending.
fn local_children(dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let (dirs, files): (Vec<_>, Vec<_>) = std::fs::read_dir(dir)
        .map_err(Error::from)
        .add_msg(format!("Cannot list {:?}", dir))?
        .map(|entry| entry.map(|e| e.path()).map_err(Error::from))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .sorted()
        .partition(|p| p.is_dir());
    Ok((files, dirs))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub struct RemoteSync<R: RemoteFs> {
    remote: R,
    report: SyncReport,
}

impl<R: RemoteFs> RemoteSync<R> {
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            report: SyncReport::default(),
        }
    }

    pub fn into_inner(self) -> R {
        self.remote
    }

    /// Applies the name diff between `local_root` and the current remote
    /// directory. Failing entries are collected and returned next to the
    /// report; the remaining entries are still processed.
    pub fn sync<P: AsRef<Path>>(&mut self, local_root: P) -> (SyncReport, Option<Error>) {
        let local_root = local_root.as_ref();
        self.report = SyncReport::default();

        let listed = local_names(local_root).and_then(|local| {
            let remote = self
                .remote
                .list_names()
                .add_msg("Cannot list remote directory")?;
            Ok((local, remote))
        });
        let (local, remote) = match listed {
            Ok(listed) => listed,
            Err(e) => return (std::mem::take(&mut self.report), Some(e)),
        };

        let diff = SyncDiff::compute(&local, &remote);
        tracing::info!("Transferring to remote: {:?}", diff.transfer);
        tracing::info!("Deleting from remote: {:?}", diff.delete);

        let mut errors = Vec::new();
        let remote_dirs = self.directory_names_or_probe();

        for name in &diff.transfer {
            let path = local_root.join(name);
            let res = if path.is_dir() {
                self.mirror_dir(&path, name, &mut errors)
            } else {
                self.upload(&path, name)
            };
            if let Err(e) = res {
                errors.push(e.add_msg(format!("Transfer of {:?} failed", name)));
            }
        }

        for name in &diff.delete {
            let is_dir = remote_dirs.as_ref().map(|dirs| dirs.contains(name));
            if let Err(e) = self.delete_tree(name, is_dir) {
                errors.push(e.add_msg(format!("Remote delete of {:?} failed", name)));
            }
        }

        self.report.diff = diff;
        let report = std::mem::take(&mut self.report);
        (report, convert_error_vec(errors).err())
    }

    fn directory_names_or_probe(&mut self) -> Option<BTreeSet<String>> {
        match self.remote.directory_names() {
            Ok(dirs) => dirs,
            Err(e) => {
                tracing::debug!("Remote entry types unavailable, probing instead: {e}");
                None
            }
        }
    }

    fn upload(&mut self, path: &Path, name: &str) -> Result<()> {
        let mut file = File::open(path)
            .map_err(Error::from)
            .add_msg(format!("Cannot open {:?}", path))?;
        let bytes = self.remote.store(name, &mut file)?;
        tracing::debug!("Uploaded {:?} ({} bytes)", path, bytes);
        self.report.uploaded_files += 1;
        Ok(())
    }

    /// Errors below `name` are pushed to `errors`; the returned error means
    /// the directory itself could not be created or entered and left.
    fn mirror_dir(&mut self, local: &Path, name: &str, errors: &mut Vec<Error>) -> Result<()> {
        self.remote.make_dir(name)?;
        self.report.created_dirs += 1;
        self.remote.change_dir(name)?;

        match local_children(local) {
            Ok((files, dirs)) => {
                for file in files {
                    let child = file_name(&file);
                    if let Err(e) = self.upload(&file, &child) {
                        errors.push(e.add_msg(format!("Transfer of {:?} failed", file)));
                    }
                }
                for dir in dirs {
                    let child = file_name(&dir);
                    if let Err(e) = self.mirror_dir(&dir, &child, errors) {
                        errors.push(e.add_msg(format!("Transfer of {:?} failed", dir)));
                    }
                }
            }
            Err(e) => errors.push(e),
        }

        self.remote.parent_dir()
    }

    /// `is_dir` comes from the listing when the protocol reports entry
    /// types; without it, entering the entry decides.
    fn delete_tree(&mut self, name: &str, is_dir: Option<bool>) -> Result<()> {
        let entered = match is_dir {
            Some(false) => false,
            Some(true) => {
                self.remote.change_dir(name)?;
                true
            }
            None => self.remote.change_dir(name).is_ok(),
        };

        if !entered {
            self.remote.delete_file(name)?;
            self.report.deleted_files += 1;
            return Ok(());
        }

        let cleared = self.clear_current_dir();
        self.remote.parent_dir()?;
        cleared?;
        self.remote.remove_dir(name)?;
        self.report.removed_dirs += 1;
        Ok(())
    }

    fn clear_current_dir(&mut self) -> Result<()> {
        let names = self.remote.list_names()?;
        let dirs = self.directory_names_or_probe();
        let errors = names
            .iter()
            .filter_map(|name| {
                let is_dir = dirs.as_ref().map(|d| d.contains(name));
                self.delete_tree(name, is_dir).err()
            })
            .collect_vec();
        convert_error_vec(errors)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub(crate) enum Node {
        File(Vec<u8>),
        Dir(BTreeMap<String, Node>),
    }

    fn fail(msg: String) -> Error {
        Error::from(std::io::Error::other(msg))
    }

    /// In-memory remote. `reports_types` switches between a listing with
    /// entry types and one that forces probing by changing directory.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryRemote {
        pub(crate) root: BTreeMap<String, Node>,
        pub(crate) cwd: Vec<String>,
        pub(crate) reports_types: bool,
        /// Names whose upload fails.
        pub(crate) rejects: BTreeSet<String>,
        pub(crate) stored: usize,
        pub(crate) quit: bool,
    }

    impl MemoryRemote {
        fn current(&mut self) -> Result<&mut BTreeMap<String, Node>> {
            let mut dir = &mut self.root;
            for name in &self.cwd {
                dir = match dir.get_mut(name) {
                    Some(Node::Dir(children)) => children,
                    _ => return Err(fail(format!("{name} vanished"))),
                };
            }
            Ok(dir)
        }
    }

    impl RemoteFs for MemoryRemote {
        fn change_dir(&mut self, path: &str) -> Result<()> {
            match self.current()?.get(path) {
                Some(Node::Dir(_)) => {
                    self.cwd.push(path.to_string());
                    Ok(())
                }
                _ => Err(fail(format!("550 {path}: not a directory"))),
            }
        }

        fn parent_dir(&mut self) -> Result<()> {
            self.cwd.pop();
            Ok(())
        }

        fn list_names(&mut self) -> Result<BTreeSet<String>> {
            Ok(self.current()?.keys().cloned().collect())
        }

        fn directory_names(&mut self) -> Result<Option<BTreeSet<String>>> {
            if !self.reports_types {
                return Ok(None);
            }
            Ok(Some(
                self.current()?
                    .iter()
                    .filter(|(_, node)| matches!(node, Node::Dir(_)))
                    .map(|(name, _)| name.clone())
                    .collect(),
            ))
        }

        fn make_dir(&mut self, name: &str) -> Result<()> {
            let dir = self.current()?;
            if dir.contains_key(name) {
                return Err(fail(format!("550 {name}: exists")));
            }
            dir.insert(name.to_string(), Node::Dir(BTreeMap::new()));
            Ok(())
        }

        fn store(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64> {
            if self.rejects.contains(name) {
                return Err(fail(format!("451 {name}: rejected")));
            }
            let mut content = Vec::new();
            reader.read_to_end(&mut content)?;
            let len = content.len() as u64;
            self.current()?.insert(name.to_string(), Node::File(content));
            self.stored += 1;
            Ok(len)
        }

        fn delete_file(&mut self, name: &str) -> Result<()> {
            let dir = self.current()?;
            match dir.get(name) {
                Some(Node::File(_)) => {
                    dir.remove(name);
                    Ok(())
                }
                _ => Err(fail(format!("550 {name}: not a file"))),
            }
        }

        fn remove_dir(&mut self, name: &str) -> Result<()> {
            let dir = self.current()?;
            match dir.get(name) {
                Some(Node::Dir(children)) if children.is_empty() => {
                    dir.remove(name);
                    Ok(())
                }
                _ => Err(fail(format!("550 {name}: not an empty directory"))),
            }
        }

        fn quit(&mut self) -> Result<()> {
            self.quit = true;
            Ok(())
        }
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn file(content: &str) -> Node {
        Node::File(content.as_bytes().to_vec())
    }

    fn dir<const N: usize>(children: [(&str, Node); N]) -> Node {
        Node::Dir(
            children
                .into_iter()
                .map(|(name, node)| (name.to_string(), node))
                .collect(),
        )
    }

    fn local_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let today = tmp.path().join("2024-03-10");
        std::fs::create_dir_all(today.join("homes").join("alice")).unwrap();
        std::fs::write(today.join("etc.7z"), "etc").unwrap();
        std::fs::write(today.join("homes").join("bob.7z"), "bob").unwrap();
        std::fs::write(today.join("homes").join("alice").join("notes.7z"), "n").unwrap();
        std::fs::create_dir_all(tmp.path().join("2024-03-09")).unwrap();
        std::fs::write(tmp.path().join("2024-03-09").join("etc.7z"), "old").unwrap();
        tmp
    }

    fn remote(reports_types: bool) -> MemoryRemote {
        MemoryRemote {
            root: [
                ("2024-03-09".to_string(), dir([("etc.7z", file("old"))])),
                (
                    "2024-03-02".to_string(),
                    dir([
                        ("etc.7z", file("expired")),
                        ("homes", dir([("bob.7z", file("b")), ("empty", dir([]))])),
                    ]),
                ),
                ("stray.txt".to_string(), file("x")),
            ]
            .into_iter()
            .collect(),
            reports_types,
            ..Default::default()
        }
    }

    #[test]
    fn test_diff_is_name_based_set_difference() {
        let diff = SyncDiff::compute(&set(&["a", "b", "c"]), &set(&["b", "c", "d"]));
        assert_eq!(diff.transfer, set(&["a"]));
        assert_eq!(diff.delete, set(&["d"]));

        let same = SyncDiff::compute(&set(&["a", "b"]), &set(&["a", "b"]));
        assert!(same.is_empty());
    }

    #[test]
    fn test_sync_mirrors_and_deletes_recursively() {
        for reports_types in [true, false] {
            let local = local_tree();
            let mut sync = RemoteSync::new(remote(reports_types));

            let (report, error) = sync.sync(local.path());
            assert!(error.is_none(), "{error:?}");
            assert_eq!(report.diff.transfer, set(&["2024-03-10"]));
            assert_eq!(report.diff.delete, set(&["2024-03-02", "stray.txt"]));
            assert_eq!(report.uploaded_files, 3);
            assert_eq!(report.created_dirs, 3);
            assert_eq!(report.deleted_files, 3);
            assert_eq!(report.removed_dirs, 3);

            let remote = sync.into_inner();
            assert_eq!(
                remote.root.get("2024-03-10"),
                Some(&dir([
                    ("etc.7z", file("etc")),
                    (
                        "homes",
                        dir([("alice", dir([("notes.7z", file("n"))])), ("bob.7z", file("bob"))])
                    ),
                ]))
            );
            assert!(!remote.root.contains_key("2024-03-02"));
            assert!(!remote.root.contains_key("stray.txt"));
            assert_eq!(remote.root.get("2024-03-09"), Some(&dir([("etc.7z", file("old"))])));
        }
    }

    #[test]
    fn test_second_sync_is_a_noop() {
        let local = local_tree();
        let mut sync = RemoteSync::new(remote(true));
        sync.sync(local.path());
        let stored = sync.remote.stored;

        let (report, error) = sync.sync(local.path());
        assert!(error.is_none());
        assert!(report.diff.is_empty());
        assert_eq!(report, SyncReport::default());
        assert_eq!(sync.remote.stored, stored);
    }

    #[test]
    fn test_changed_content_with_same_name_is_not_uploaded() {
        let local = local_tree();
        std::fs::write(local.path().join("2024-03-09").join("etc.7z"), "changed").unwrap();
        let mut sync = RemoteSync::new(remote(true));

        let (report, _) = sync.sync(local.path());
        assert!(!report.diff.transfer.contains("2024-03-09"));
        let remote = sync.into_inner();
        assert_eq!(remote.root.get("2024-03-09"), Some(&dir([("etc.7z", file("old"))])));
    }

    #[test]
    fn test_failed_entry_does_not_stop_the_rest() {
        let local = local_tree();
        std::fs::write(local.path().join("new.txt"), "n").unwrap();
        let mut remote = remote(false);
        remote.rejects.insert("etc.7z".to_string());
        let mut sync = RemoteSync::new(remote);

        let (report, error) = sync.sync(local.path());
        assert!(error.unwrap().to_string().contains("etc.7z"));
        assert_eq!(report.uploaded_files, 3);
        let remote = sync.into_inner();
        assert_eq!(remote.root.get("new.txt"), Some(&file("n")));
        assert_eq!(
            remote.root.get("2024-03-10"),
            Some(&dir([(
                "homes",
                dir([("alice", dir([("notes.7z", file("n"))])), ("bob.7z", file("bob"))])
            )]))
        );
        assert!(!remote.root.contains_key("stray.txt"));
        assert!(!remote.root.contains_key("2024-03-02"));
    }

    #[test]
    fn test_missing_local_root_is_reported() {
        let mut sync = RemoteSync::new(remote(true));
        let (report, error) = sync.sync("/nonexistent/backup/root");
        assert!(error.is_some());
        assert_eq!(report, SyncReport::default());
        assert!(sync.into_inner().root.contains_key("stray.txt"));
    }
}
