//! This module defines types used to configure the storage core.

use std::path::PathBuf;

use crate::BLOCK_LEN;

/// The global configuration for a storage core instance.
#[derive(Clone, Debug)]
pub struct Conf {
    pub torrent: TorrentConf,
}

impl Conf {
    /// Returns the configuration with reasonable defaults, except for the
    /// download directory, as it is not sensible to guess that for the user.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            torrent: TorrentConf::new(download_dir),
        }
    }
}

/// Configuration for a torrent's on-disk storage.
///
/// The engine will have a default instance of this applied to all torrents
/// by default, but individual torrents may override this configuration.
#[derive(Clone, Debug)]
pub struct TorrentConf {
    /// The directory under which a torrent's files and scratch data are
    /// placed upon download and from which completed files are seeded.
    pub download_dir: PathBuf,

    /// Whether allocating a torrent whose root directory already contains an
    /// entry at the final file path is an error. When false, an existing
    /// file is left in place and piece data is written into it as usual
    /// (the resume-a-download case); when true, allocation fails with
    /// [`crate::error::NewTorrentError::AlreadyExists`].
    pub allow_existing_files: bool,

    /// The length, in bytes, of the blocks a piece is split into for
    /// incremental writes. Does not need to evenly divide the piece length;
    /// the last block of a piece is simply shorter.
    pub block_len: u32,
}

impl TorrentConf {
    /// Returns the torrent configuration with reasonable defaults, except
    /// for the download directory, as it is not sensible to guess that for
    /// the user.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            allow_existing_files: true,
            block_len: BLOCK_LEN,
        }
    }
}
