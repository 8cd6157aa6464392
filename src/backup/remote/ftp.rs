use crate::backup::function_path;
use crate::backup::remote::{RemoteConfig, RemoteFs};
use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{AddFunctionName, AddMsg};
use function_name::named;
use std::collections::BTreeSet;
use std::io::Read;
use suppaftp::list::File as ListEntry;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpResult, FtpStream, Mode, Status};

static ANONYMOUS_USER: &str = "anonymous";
static ANONYMOUS_PASSWORD: &str = "anonymous@";

/// Plain FTP session, passive mode, binary transfers.
pub struct FtpRemote {
    stream: FtpStream,
}

impl FtpRemote {
    /// Connects, logs in and enters the configured remote directory.
    #[named]
    pub fn connect(config: &RemoteConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host(), config.port());
        let mut stream = FtpStream::connect(addr.as_str())
            .map_err(Error::from)
            .add_msg(format!("Cannot connect to {}", addr))
            .add_fn_name(function_path!())?;
        stream.set_mode(Mode::Passive);

        let (user, password) = match config.user() {
            Some(user) => (
                user.as_str(),
                config
                    .password()
                    .as_ref()
                    .map(|p| p.inner().as_str())
                    .unwrap_or_default(),
            ),
            None => (ANONYMOUS_USER, ANONYMOUS_PASSWORD),
        };
        stream
            .login(user, password)
            .map_err(Error::from)
            .add_msg(format!("Login to {} as {} failed", addr, user))
            .add_fn_name(function_path!())?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(Error::from)
            .add_fn_name(function_path!())?;
        stream
            .cwd(config.remote_dir())
            .map_err(Error::from)
            .add_msg(format!("Cannot enter remote directory {}", config.remote_dir()))
            .add_fn_name(function_path!())?;

        tracing::info!("Connected to ftp://{}{}", addr, config.remote_dir());
        Ok(Self { stream })
    }
}

/// NLST may answer with paths, keep the last segment.
fn entry_name(line: &str) -> Option<String> {
    let name = line.trim_end_matches(['\r', '\n']);
    let name = name.rsplit('/').next().unwrap_or(name);
    match name {
        "" | "." | ".." => None,
        _ => Some(name.to_string()),
    }
}

/// Servers answer NLST of an empty directory with 450 or 550 instead of an
/// empty listing.
fn nlst_names(listing: FtpResult<Vec<String>>) -> Result<BTreeSet<String>> {
    match listing {
        Ok(lines) => Ok(lines.iter().filter_map(|line| entry_name(line)).collect()),
        Err(FtpError::UnexpectedResponse(response))
            if matches!(
                response.status,
                Status::RequestFileActionIgnored | Status::FileUnavailable
            ) =>
        {
            Ok(BTreeSet::new())
        }
        Err(e) => Err(e.into()),
    }
}

/// Directory names from a LIST answer, `None` if any line is not understood.
fn parse_directories(lines: &[String]) -> Option<BTreeSet<String>> {
    let mut dirs = BTreeSet::new();
    for line in lines {
        let entry = line.parse::<ListEntry>().ok()?;
        if entry.is_directory() {
            if let Some(name) = entry_name(entry.name()) {
                dirs.insert(name);
            }
        }
    }
    Some(dirs)
}

impl RemoteFs for FtpRemote {
    fn change_dir(&mut self, path: &str) -> Result<()> {
        Ok(self.stream.cwd(path)?)
    }

    fn parent_dir(&mut self) -> Result<()> {
        Ok(self.stream.cdup()?)
    }

    fn list_names(&mut self) -> Result<BTreeSet<String>> {
        nlst_names(self.stream.nlst(None))
    }

    fn directory_names(&mut self) -> Result<Option<BTreeSet<String>>> {
        let lines = self.stream.list(None)?;
        Ok(parse_directories(&lines))
    }

    fn make_dir(&mut self, name: &str) -> Result<()> {
        Ok(self.stream.mkdir(name)?)
    }

    fn store(&mut self, name: &str, mut reader: &mut dyn Read) -> Result<u64> {
        Ok(self.stream.put_file(name, &mut reader)?)
    }

    fn delete_file(&mut self, name: &str) -> Result<()> {
        Ok(self.stream.rm(name)?)
    }

    fn remove_dir(&mut self, name: &str) -> Result<()> {
        Ok(self.stream.rmdir(name)?)
    }

    fn quit(&mut self) -> Result<()> {
        Ok(self.stream.quit()?)
    }
}
