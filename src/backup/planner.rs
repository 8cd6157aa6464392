//! Turns folder and database targets into jobs.

use crate::backup::database::DatabaseTarget;
use crate::backup::function_path;
use crate::backup::job::{Job, JobCommand};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use crate::backup::settings::Settings;
use crate::backup::target::{BackupTarget, TargetKind};
use function_name::named;
use itertools::Itertools;
use std::path::Path;
use walkdir::WalkDir;

/// Children of a recursive-expand target that get their own archive.
/// Dot entries are skipped unless they are regular files.
pub fn is_included_child(name: &str, is_file: bool) -> bool {
    !name.starts_with('.') || is_file
}

pub struct BackupPlanner<'a> {
    settings: &'a Settings,
}

impl<'a> BackupPlanner<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Returns the jobs that could be planned, plus the errors of targets
    /// that could not be enumerated. Those targets are skipped, the rest
    /// still run.
    pub fn plan_folder_jobs(&self, targets: &[BackupTarget]) -> (Vec<Job>, Option<Error>) {
        let mut jobs = Vec::new();
        let mut errors = Vec::new();

        for target in targets {
            match target.kind() {
                TargetKind::Plain => jobs.push(self.archive_job(
                    target.name().clone(),
                    Path::new(target.name()),
                    target.source(),
                )),
                TargetKind::RecursiveExpand => {
                    let (mut child_jobs, mut child_errors) = self.plan_recursive_expand(target);
                    jobs.append(&mut child_jobs);
                    errors.append(&mut child_errors);
                }
            }
        }

        let error = if errors.is_empty() {
            None
        } else {
            Some(Error::from(errors))
        };
        (jobs, error)
    }

    #[named]
    fn plan_recursive_expand(&self, target: &BackupTarget) -> (Vec<Job>, Vec<Error>) {
        let out_dir = self.settings.dated_dir().join(target.name());
        if let Err(e) = std::fs::create_dir_all(&out_dir) {
            return (
                vec![],
                vec![Error::from(e)
                    .add_msg(format!("Cannot create output directory {:?}", out_dir))
                    .add_fn_name(function_path!())],
            );
        }

        let (entries, errors): (Vec<_>, Vec<_>) = WalkDir::new(target.source())
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(|res| {
                res.map_err(Error::from)
                    .add_msg(format!("Cannot list {:?}", target.source()))
                    .add_fn_name(function_path!())
            })
            .partition_result();

        let jobs = entries
            .into_iter()
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy();
                let included = is_included_child(&name, entry.file_type().is_file());
                if !included {
                    tracing::debug!("Skipping hidden entry {:?}", entry.path());
                }
                included
            })
            .map(|entry| {
                let relative = Path::new(target.name()).join(entry.file_name());
                self.archive_job(
                    relative.to_string_lossy().into_owned(),
                    &relative,
                    entry.path(),
                )
            })
            .collect();

        (jobs, errors)
    }

    fn archive_job(&self, name: String, relative: &Path, source: &Path) -> Job {
        let output = self.settings.archive_path(relative);
        let command = self.settings.archiver().folder_command(&output, source);
        Job::new(name, JobCommand::Exec(command))
    }

    /// One `dump | compress > file` job per database name.
    pub fn plan_database_jobs(&self, target: &DatabaseTarget) -> Vec<Job> {
        let compressor = self.settings.archiver().dump_compressor();
        target
            .databases()
            .iter()
            .map(|database| {
                Job::new(
                    format!("{} database {}", target.engine(), database),
                    JobCommand::Pipeline {
                        producer: target.dump_command(database),
                        consumer: compressor.command(),
                        output: self.settings.dump_path(&target.dump_name(database)),
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::archiver::ArchiverFamily;
    use crate::backup::database::DatabaseEngine;
    use crate::backup::settings::tests::config;
    use chrono::NaiveDate;
    use std::ffi::OsString;
    use tempfile::TempDir;

    fn settings(out: &Path, family: ArchiverFamily) -> Settings {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        Settings::resolve(&config(out, Some(family)), date).unwrap()
    }

    #[test]
    fn test_inclusion_predicate_table() {
        let table = [
            ("a.txt", true, true),
            ("docs", false, true),
            (".env", true, true),
            (".hidden", false, false),
            (".cache", false, false),
        ];
        for (name, is_file, included) in table {
            assert_eq!(is_included_child(name, is_file), included, "{name}");
        }
    }

    #[test]
    fn test_plain_target_yields_one_job() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), ArchiverFamily::SevenZip);
        let planner = BackupPlanner::new(&settings);

        let (jobs, error) = planner.plan_folder_jobs(&[BackupTarget::plain("etc", "/etc")]);
        assert!(error.is_none());
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name(), "etc");

        let JobCommand::Exec(spec) = jobs[0].command() else {
            panic!("Expected a single process");
        };
        let args = spec.args();
        let output = tmp.path().join("2024-03-10").join("etc.7z");
        assert_eq!(args[args.len() - 2], OsString::from(output));
        assert_eq!(args[args.len() - 1], OsString::from("/etc"));
    }

    #[test]
    fn test_recursive_expand_counts_qualifying_children() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(src.join(".hidden")).unwrap();
        std::fs::create_dir_all(src.join("projects")).unwrap();
        std::fs::write(src.join("a.txt"), "a").unwrap();
        std::fs::write(src.join(".env"), "x=1").unwrap();
        let out = tmp.path().join("out");
        let settings = settings(&out, ArchiverFamily::Gzip);
        let planner = BackupPlanner::new(&settings);

        let (jobs, error) =
            planner.plan_folder_jobs(&[BackupTarget::recursive_expand("homes", &src)]);
        assert!(error.is_none());
        let names = jobs.iter().map(|j| j.name().as_str()).collect_vec();
        assert_eq!(names, ["homes/.env", "homes/a.txt", "homes/projects"]);
        assert!(out.join("2024-03-10").join("homes").is_dir());

        let JobCommand::Exec(spec) = jobs[1].command() else {
            panic!("Expected a single process");
        };
        assert!(spec
            .args()
            .contains(&OsString::from(out.join("2024-03-10/homes/a.txt.tar.gz"))));
    }

    #[test]
    fn test_unreadable_expand_target_is_not_fatal() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), ArchiverFamily::Gzip);
        let planner = BackupPlanner::new(&settings);

        let (jobs, error) = planner.plan_folder_jobs(&[
            BackupTarget::recursive_expand("gone", tmp.path().join("missing")),
            BackupTarget::plain("etc", "/etc"),
        ]);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name(), "etc");
        assert!(error.unwrap().to_string().contains("missing"));
    }

    #[test]
    fn test_database_jobs_one_per_database() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), ArchiverFamily::SevenZip);
        let planner = BackupPlanner::new(&settings);
        let target = DatabaseTarget::builder()
            .engine(DatabaseEngine::Postgres)
            .user("backup")
            .databases(vec!["app".to_string(), "billing".to_string()])
            .build();

        let jobs = planner.plan_database_jobs(&target);
        assert_eq!(jobs.len(), 2);
        assert_eq!(
            jobs[0].command().to_string(),
            format!(
                "pg_dump -h localhost -U backup app | xz -9 -c > {}",
                tmp.path().join("2024-03-10/postgres-localhost-app.sql.xz").display()
            )
        );
        assert_eq!(jobs[1].name(), "postgres database billing");
    }

    #[test]
    fn test_same_database_name_on_two_servers_gets_two_files() {
        let tmp = TempDir::new().unwrap();
        let settings = settings(tmp.path(), ArchiverFamily::Gzip);
        let planner = BackupPlanner::new(&settings);
        let pg = DatabaseTarget::builder()
            .engine(DatabaseEngine::Postgres)
            .user("backup")
            .databases(vec!["app".to_string()])
            .build();
        let my = DatabaseTarget::builder()
            .engine(DatabaseEngine::Mysql)
            .user("root")
            .databases(vec!["app".to_string()])
            .build();

        let outputs = [pg, my]
            .iter()
            .flat_map(|target| planner.plan_database_jobs(target))
            .map(|job| match job.command() {
                JobCommand::Pipeline { output, .. } => output.clone(),
                JobCommand::Exec(_) => panic!("Expected a pipeline"),
            })
            .collect_vec();
        let dated = tmp.path().join("2024-03-10");
        assert_eq!(
            outputs,
            [
                dated.join("postgres-localhost-app.sql.gz"),
                dated.join("mysql-localhost-app.sql.gz")
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_hidden_symlink_to_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.txt"), "a").unwrap();
        std::os::unix::fs::symlink(src.join("a.txt"), src.join(".link")).unwrap();
        let settings = settings(&tmp.path().join("out"), ArchiverFamily::Gzip);
        let planner = BackupPlanner::new(&settings);

        let (jobs, error) =
            planner.plan_folder_jobs(&[BackupTarget::recursive_expand("homes", &src)]);
        assert!(error.is_none());
        let names = jobs.iter().map(|j| j.name().as_str()).collect_vec();
        assert_eq!(names, ["homes/a.txt"]);
    }
}
