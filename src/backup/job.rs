//! A job is one external process (or a two process pipeline) plus a name.
//!
//! Commands are kept as program + argument vectors and are launched without
//! a shell, so paths and database names never get interpreted as shell
//! syntax. `Display` renders a shell-like line for logs only.

use crate::backup::function_path;
use crate::backup::notifications::{Notifier, Priority};
use crate::backup::redacted::{RedactedString, REDACTED_SECRET};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use function_name::named;
use getset::Getters;
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fmt::{Display, Formatter};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

#[derive(Clone, Debug, PartialEq, Eq, Getters)]
#[getset(get = "pub")]
pub struct ProcessSpec {
    program: OsString,
    args: Vec<OsString>,
    env: Vec<(String, RedactedString)>,
}

impl ProcessSpec {
    pub fn new<S: Into<OsString>>(program: S) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg<S: Into<OsString>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Passes a secret through the environment instead of the command line.
    pub fn secret_env<K: Into<String>>(mut self, key: K, value: RedactedString) -> Self {
        self.env.push((key.into(), value));
        self
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value.inner());
        }
        command
    }

    fn check(&self, status: ExitStatus) -> Result<()> {
        if status.success() {
            Ok(())
        } else {
            Err(Error::command_failed(self.to_string(), status))
        }
    }
}

fn quote(arg: &OsStr) -> Cow<'_, str> {
    let arg = arg.to_string_lossy();
    if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '\'') {
        Cow::Owned(format!("'{}'", arg.replace('\'', "'\\''")))
    } else {
        arg
    }
}

impl Display for ProcessSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (key, _) in &self.env {
            write!(f, "{}={} ", key, REDACTED_SECRET)?;
        }
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobCommand {
    Exec(ProcessSpec),
    /// `producer | consumer > output`
    Pipeline {
        producer: ProcessSpec,
        consumer: ProcessSpec,
        output: PathBuf,
    },
}

impl Display for JobCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JobCommand::Exec(spec) => write!(f, "{spec}"),
            JobCommand::Pipeline {
                producer,
                consumer,
                output,
            } => write!(
                f,
                "{} | {} > {}",
                producer,
                consumer,
                quote(output.as_os_str())
            ),
        }
    }
}

impl JobCommand {
    /// Blocks until every spawned process exited.
    pub fn execute(&self) -> Result<()> {
        match self {
            JobCommand::Exec(spec) => {
                let status = spec
                    .to_command()
                    .status()
                    .map_err(Error::from)
                    .add_msg(format!("Cannot launch {:?}", spec.program))?;
                spec.check(status)
            }
            JobCommand::Pipeline {
                producer,
                consumer,
                output,
            } => {
                let res = run_pipeline(producer, consumer, output);
                if res.is_err() && output.exists() {
                    if let Err(e) = std::fs::remove_file(output) {
                        tracing::warn!("Cannot remove partial output {:?}: {}", output, e);
                    }
                }
                res
            }
        }
    }
}

fn run_pipeline(producer: &ProcessSpec, consumer: &ProcessSpec, output: &Path) -> Result<()> {
    let out = File::create(output)
        .map_err(Error::from)
        .add_msg(format!("Cannot create {:?}", output))?;

    let mut producer_child = producer
        .to_command()
        .stdout(Stdio::piped())
        .spawn()
        .map_err(Error::from)
        .add_msg(format!("Cannot launch {:?}", producer.program))?;
    let producer_stdout = producer_child
        .stdout
        .take()
        .ok_or_else(|| Error::from(std::io::Error::other("producer stdout was not captured")))?;

    // The consumer holds the only read end: a failed spawn closes it.
    let consumer_status = consumer
        .to_command()
        .stdin(Stdio::from(producer_stdout))
        .stdout(Stdio::from(out))
        .status()
        .map_err(Error::from)
        .add_msg(format!("Cannot launch {:?}", consumer.program));
    let producer_status = producer_child.wait().map_err(Error::from);

    let mut errors: Vec<Error> = [
        producer_status.and_then(|s| producer.check(s)),
        consumer_status.and_then(|s| consumer.check(s)),
    ]
    .into_iter()
    .filter_map(|r| r.err())
    .collect();

    if errors.len() > 1 {
        Err(errors.into())
    } else {
        errors.pop().map_or(Ok(()), Err)
    }
}

#[derive(Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct Job {
    name: String,
    command: JobCommand,
}

impl Job {
    pub fn new<S: Into<String>>(name: S, command: JobCommand) -> Self {
        Self {
            name: name.into(),
            command,
        }
    }

    /// Runs the command and reports the outcome exactly once, to the log and
    /// to `notifier`, before returning it.
    #[named]
    pub fn run(&self, notifier: &dyn Notifier) -> Result<()> {
        tracing::info!("Starting {}: {}", self.name, self.command);
        let res = self
            .command
            .execute()
            .add_msg(format!("Backup job {:?} failed", self.name))
            .add_fn_name(function_path!());

        let (message, priority) = match &res {
            Ok(()) => {
                tracing::info!("Finished {}", self.name);
                (format!("Backup {} completed", self.name), Priority::Low)
            }
            Err(e) => {
                tracing::error!("{e}");
                (format!("Backup {} failed: {e}", self.name), Priority::Urgent)
            }
        };

        if let Err(e) = notifier.notify(&message, priority) {
            tracing::warn!("Notification for {} was not delivered: {e}", self.name);
        }

        res
    }
}
