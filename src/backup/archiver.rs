//! The three supported archiver families.
//!
//! Each family fixes, in one place, the folder archive command, the
//! compressor used behind database dumps and both file extensions, so the
//! derived values can never disagree with the configured family.

use crate::backup::job::ProcessSpec;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[cfg(windows)]
const SEVEN_ZIP_PROGRAM: &str = "7z.exe";
#[cfg(not(windows))]
const SEVEN_ZIP_PROGRAM: &str = "7za";

pub trait FileExtProvider {
    fn file_ext(&self) -> &'static str;
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiverFamily {
    #[serde(rename = "7zip", alias = "7z", alias = "lzma")]
    #[display("7zip")]
    SevenZip,
    #[serde(rename = "bzip2")]
    #[display("bzip2")]
    Bzip2,
    #[serde(rename = "gzip")]
    #[display("gzip")]
    Gzip,
}

impl FileExtProvider for ArchiverFamily {
    fn file_ext(&self) -> &'static str {
        match self {
            ArchiverFamily::SevenZip => "7z",
            ArchiverFamily::Bzip2 => "tar.bz2",
            ArchiverFamily::Gzip => "tar.gz",
        }
    }
}

impl ArchiverFamily {
    /// Archives `source` into `output`.
    ///
    /// Every family expects the archive path right before the source path;
    /// swapping them makes the tool archive into the source instead.
    pub fn folder_command(&self, output: &Path, source: &Path) -> ProcessSpec {
        let spec = match self {
            ArchiverFamily::SevenZip => {
                ProcessSpec::new(SEVEN_ZIP_PROGRAM).with_args(["a", "-mx=9", "-mfb=64"])
            }
            ArchiverFamily::Bzip2 => ProcessSpec::new("tar").arg("-cvjSf"),
            ArchiverFamily::Gzip => ProcessSpec::new("tar").arg("-zcvf"),
        };
        spec.arg(output).arg(source)
    }

    pub fn dump_compressor(&self) -> DumpCompressor {
        match self {
            ArchiverFamily::SevenZip => DumpCompressor::Xz,
            ArchiverFamily::Bzip2 => DumpCompressor::Bzip2,
            ArchiverFamily::Gzip => DumpCompressor::Gzip,
        }
    }
}

/// Stream compressor sitting behind a database dump in a pipeline.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum DumpCompressor {
    #[display("xz")]
    Xz,
    #[display("bzip2")]
    Bzip2,
    #[display("gzip")]
    Gzip,
}

impl FileExtProvider for DumpCompressor {
    fn file_ext(&self) -> &'static str {
        match self {
            DumpCompressor::Xz => "sql.xz",
            DumpCompressor::Bzip2 => "sql.bz2",
            DumpCompressor::Gzip => "sql.gz",
        }
    }
}

impl DumpCompressor {
    /// Reads stdin, writes the compressed stream to stdout.
    pub fn command(&self) -> ProcessSpec {
        match self {
            DumpCompressor::Xz => ProcessSpec::new("xz").with_args(["-9", "-c"]),
            DumpCompressor::Bzip2 => ProcessSpec::new("bzip2").with_args(["-9", "-c"]),
            DumpCompressor::Gzip => ProcessSpec::new("gzip").with_args(["-9", "-c"]),
        }
    }
}
