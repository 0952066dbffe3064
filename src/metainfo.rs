//! Decoding of the bencoded torrent metadata dictionary into the flat
//! [`TorrentInfo`] the Layout Planner consumes.
//!
//! This module only concerns itself with the `info` dictionary (§6 of the
//! spec): piece length, the concatenated piece hashes, and either a single
//! file or a list of files. Tracker announce/response shapes are out of
//! scope for the storage core and are not modelled here.

use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};

use crate::Sha1Hash;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("bencode decode error: {0}")]
    Bencode(#[from] serde_bencode::Error),

    #[error("piece length must be positive")]
    InvalidPieceLength,

    #[error("`pieces` length {0} is not a multiple of 20")]
    MalformedPieceHashes(usize),

    #[error("multi-file torrent must declare at least one file")]
    EmptyFileList,

    #[error("a file entry has a negative length or empty path")]
    InvalidFilePath,

    #[error("neither `length` nor `files` present in info dictionary")]
    MissingContent,

    #[error("torrent declares a total length of zero")]
    EmptyTorrent,
}

/// Raw, wire-shaped bencode dictionary, deserialized verbatim so that the
/// original bytes of `info` can still be sliced out for info-hash
/// computation (re-encoding is not safe - see [`Metainfo::info_hash_of_slice`]).
#[derive(Debug, Deserialize)]
pub struct Metainfo {
    pub info: RawInfo,
}

#[derive(Debug, Deserialize)]
pub struct RawInfo {
    pub name: String,
    #[serde(rename = "piece length")]
    pub piece_length: i64,
    #[serde(with = "serde_bytes")]
    pub pieces: ByteBuf,
    pub length: Option<i64>,
    pub files: Option<Vec<RawFile>>,
    pub private: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct RawFile {
    pub path: Vec<String>,
    pub length: i64,
}

impl Metainfo {
    pub fn from_bytes(buf: &[u8]) -> Result<Self, MetadataError> {
        Ok(serde_bencode::from_bytes(buf)?)
    }

    /// Computes the SHA-1 info-hash over the original bencoded bytes of the
    /// `info` dictionary. Re-encoding via serde is deliberately avoided here
    /// in favor of the caller passing in the exact slice it was parsed from,
    /// since a re-encode is only guaranteed byte-identical if the original
    /// bencoding used canonical (sorted-key, minimal-integer) form.
    pub fn info_hash_of_slice(info_bytes: &[u8]) -> Sha1Hash {
        let digest = Sha1::digest(info_bytes);
        let mut info_hash = [0; 20];
        info_hash.copy_from_slice(&digest);
        info_hash
    }

    /// Validates and flattens the raw dictionary into a [`TorrentInfo`].
    pub fn into_torrent_info(self) -> Result<TorrentInfo, MetadataError> {
        if self.info.piece_length <= 0 {
            return Err(MetadataError::InvalidPieceLength);
        }
        let piece_len = self.info.piece_length as u32;

        let pieces = self.info.pieces.into_vec();
        if pieces.len() % 20 != 0 {
            return Err(MetadataError::MalformedPieceHashes(pieces.len()));
        }
        let piece_hashes = pieces
            .chunks_exact(20)
            .map(|c| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(c);
                hash
            })
            .collect();

        let content = match (self.info.length, self.info.files) {
            (Some(len), None) => {
                if len < 0 {
                    return Err(MetadataError::InvalidFilePath);
                }
                Content::Single(FileEntry {
                    path: vec![self.info.name],
                    len: len as u64,
                })
            }
            (None, Some(files)) => {
                if files.is_empty() {
                    return Err(MetadataError::EmptyFileList);
                }
                let mut entries = Vec::with_capacity(files.len());
                for f in files {
                    if f.length < 0 || f.path.is_empty() {
                        return Err(MetadataError::InvalidFilePath);
                    }
                    entries.push(FileEntry {
                        path: f.path,
                        len: f.length as u64,
                    });
                }
                Content::Multi {
                    name: self.info.name,
                    files: entries,
                }
            }
            _ => return Err(MetadataError::MissingContent),
        };

        let total_len = match &content {
            Content::Single(file) => file.len,
            Content::Multi { files, .. } => files.iter().map(|f| f.len).sum(),
        };
        if total_len == 0 {
            return Err(MetadataError::EmptyTorrent);
        }

        Ok(TorrentInfo {
            piece_len,
            piece_hashes,
            content,
        })
    }
}

/// The flattened, validated view of torrent metadata the Layout Planner
/// consumes. Everything downstream of this type depends only on
/// `piece_len`, the file list and a root directory, never on the raw
/// bencoded bytes again.
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    pub piece_len: u32,
    pub piece_hashes: Vec<Sha1Hash>,
    pub content: Content,
}

impl TorrentInfo {
    /// The sum of the declared lengths of all logical files.
    pub fn total_len(&self) -> u64 {
        match &self.content {
            Content::Single(file) => file.len,
            Content::Multi { files, .. } => files.iter().map(|f| f.len).sum(),
        }
    }

    /// The number of pieces implied by `total_len` and `piece_len`.
    pub fn piece_count(&self) -> usize {
        let total_len = self.total_len();
        let piece_len = self.piece_len as u64;
        ((total_len + piece_len - 1) / piece_len) as usize
    }
}

#[derive(Debug, Clone)]
pub enum Content {
    Single(FileEntry),
    Multi { name: String, files: Vec<FileEntry> },
}

/// A single logical file as declared in torrent metadata: its path
/// (relative, as path *segments*, never pre-joined) and declared length.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: Vec<String>,
    pub len: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_file_content() {
        let info = TorrentInfo {
            piece_len: 4,
            piece_hashes: vec![[0; 20]; 2],
            content: Content::Single(FileEntry {
                path: vec!["hello.txt".into()],
                len: 5,
            }),
        };
        assert_eq!(info.total_len(), 5);
        assert_eq!(info.piece_count(), 2);
    }

    #[test]
    fn test_rejects_non_multiple_of_20_pieces() {
        let raw = Metainfo {
            info: RawInfo {
                name: "a".into(),
                piece_length: 4,
                pieces: ByteBuf::from(vec![0u8; 19]),
                length: Some(4),
                files: None,
                private: None,
            },
        };
        assert!(matches!(
            raw.into_torrent_info(),
            Err(MetadataError::MalformedPieceHashes(19))
        ));
    }

    #[test]
    fn test_rejects_both_length_and_files() {
        let raw = Metainfo {
            info: RawInfo {
                name: "a".into(),
                piece_length: 4,
                pieces: ByteBuf::from(vec![0u8; 20]),
                length: Some(4),
                files: Some(vec![RawFile {
                    path: vec!["x".into()],
                    length: 4,
                }]),
                private: None,
            },
        };
        assert!(matches!(
            raw.into_torrent_info(),
            Err(MetadataError::MissingContent)
        ));
    }

    #[test]
    fn test_rejects_zero_total_length() {
        let raw = Metainfo {
            info: RawInfo {
                name: "a".into(),
                piece_length: 4,
                pieces: ByteBuf::from(vec![0u8; 20]),
                length: Some(0),
                files: None,
                private: None,
            },
        };
        assert!(matches!(
            raw.into_torrent_info(),
            Err(MetadataError::EmptyTorrent)
        ));
    }

    #[test]
    fn test_rejects_empty_file_list() {
        let raw = Metainfo {
            info: RawInfo {
                name: "a".into(),
                piece_length: 4,
                pieces: ByteBuf::from(vec![0u8; 20]),
                length: None,
                files: Some(vec![]),
                private: None,
            },
        };
        assert!(matches!(
            raw.into_torrent_info(),
            Err(MetadataError::EmptyFileList)
        ));
    }
}
