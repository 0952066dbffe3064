//! Error types for the storage core.
//!
//! Mirrors the split the rest of the ecosystem uses: a crate-wide [`Error`]
//! for fatal/unexpected conditions, plus narrow, non-fatal error types per
//! operation (["NewTorrentError"], [`WriteError`], [`ReadError`]) that
//! calling code can match on and recover from.

use std::io;

use crate::metainfo::MetadataError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("torrent metadata is malformed: {0}")]
    Metadata(#[from] MetadataError),

    #[error("invalid piece index")]
    InvalidPieceIndex,

    #[error("invalid torrent id")]
    InvalidTorrentId,

    #[error("channel closed")]
    Channel,

    #[error("{0}")]
    Io(#[from] io::Error),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::Channel
    }
}

/// Error type returned on failed torrent allocations (root directory setup
/// and layout planning).
///
/// Non-fatal: the caller may retry with a different root or corrected
/// metadata, so this is not grouped with the crate-wide [`Error`].
#[derive(Debug, thiserror::Error)]
pub enum NewTorrentError {
    #[error("torrent entry already exists")]
    AlreadyExists,

    #[error("torrent metadata is malformed: {0}")]
    Metadata(#[from] MetadataError),

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Error type returned on failed piece/scratch writes.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("invalid piece index")]
    InvalidPieceIndex,

    #[error("piece data length does not match the declared piece length")]
    InvalidLength,

    #[error("{0}")]
    Io(#[from] io::Error),
}

/// Error type returned on failed piece/block reads.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("invalid piece index")]
    InvalidPieceIndex,

    #[error("requested block falls outside of piece bounds")]
    InvalidBlockRange,

    #[error(
        "piece data missing from both scratch and embedded locations \
         (logic bug or external tampering)"
    )]
    UnexpectedMissingScratch,

    #[error("{0}")]
    Io(#[from] io::Error),
}
