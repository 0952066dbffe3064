//! The Layout Planner: turns validated torrent metadata plus a root
//! directory into a [`FileStructure`] describing where every piece's bytes
//! live on disk before and after merge.
//!
//! This is the delicate part of the storage core (§4.1 of the spec): a
//! multi-file torrent's pieces may straddle file boundaries, and the
//! planner has to walk the file list once, carrying a small amount of state
//! across the boundary, to produce a fully-specified per-piece recipe.

use std::path::{Path, PathBuf};

use crate::error::NewTorrentError;
use crate::metainfo::{Content, TorrentInfo};
use crate::storage_info::{FileInfo, PieceSizing};
use crate::PieceIndex;

/// Per-piece scratch recipe for a multi-file torrent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SplitPiece {
    /// The whole piece lives in one scratch file.
    Normal(PathBuf),
    /// The piece crosses a file boundary: the first `prefix_len` bytes go to
    /// `path_a` (the end-of-file scratch of the earlier file), the rest to
    /// `path_b` (the start-of-file scratch of the later file).
    Straddling {
        prefix_len: u32,
        path_a: PathBuf,
        path_b: PathBuf,
    },
}

/// The static, on-disk file layout of a torrent: piece index -> scratch
/// location(s), and final file -> scratch dependency list.
#[derive(Clone, Debug)]
pub enum FileStructure {
    /// A single logical file: one scratch file per piece.
    Simple {
        file: FileInfo,
        final_path: PathBuf,
        scratch: Vec<PathBuf>,
    },
    /// Multiple logical files, possibly with pieces straddling boundaries.
    Multi {
        files: Vec<FileInfo>,
        split: Vec<SplitPiece>,
        /// `(final file path, ordered scratch dependencies)` pairs, one per
        /// logical file, in declared order.
        dependencies: Vec<(PathBuf, Vec<PathBuf>)>,
    },
}

impl FileStructure {
    /// The logical files backing this structure, in declared order.
    pub fn files(&self) -> &[FileInfo] {
        match self {
            Self::Simple { file, .. } => std::slice::from_ref(file),
            Self::Multi { files, .. } => files,
        }
    }

    /// `(final file path, ordered scratch dependencies)` pairs covering
    /// every logical file, regardless of structure shape.
    pub fn final_entries(&self) -> Vec<(&Path, &[PathBuf])> {
        match self {
            Self::Simple { final_path, scratch, .. } => {
                vec![(final_path.as_path(), scratch.as_slice())]
            }
            Self::Multi { dependencies, .. } => dependencies
                .iter()
                .map(|(path, deps)| (path.as_path(), deps.as_slice()))
                .collect(),
        }
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

/// Joins path segments under `root`, with no validation. Used once a file's
/// segments are already known to be well-formed (i.e. after
/// [`join_segments`] has accepted them once for the same metadata).
pub(crate) fn final_path(root: &Path, segments: &[String]) -> PathBuf {
    let mut path = root.to_path_buf();
    for seg in segments {
        path.push(seg);
    }
    path
}

/// Joins path *segments* under `root`, rejecting any segment that itself
/// contains a path separator (the typed-path safety posture flagged in the
/// spec's design notes).
fn join_segments(root: &Path, segments: &[String]) -> Result<PathBuf, NewTorrentError> {
    for seg in segments {
        if seg.contains('/') || seg.contains('\\') || seg == ".." || seg.is_empty() {
            return Err(NewTorrentError::Metadata(
                crate::metainfo::MetadataError::InvalidFilePath,
            ));
        }
    }
    Ok(final_path(root, segments))
}

struct Carry {
    /// Scratch file already holding `prefix_len` bytes from the earlier
    /// file (the `.end` scratch of that file).
    path_a: PathBuf,
    prefix_len: u32,
    /// Bytes still needed from the next file to complete the piece.
    pending_suffix_len: u64,
    /// The piece this carry will complete.
    piece_index: PieceIndex,
}

/// Builds the [`FileStructure`] for validated torrent metadata. This is a
/// pure computation over `info` and `root`; no filesystem I/O happens here.
pub fn plan(
    info: &TorrentInfo,
    root: &Path,
) -> Result<FileStructure, NewTorrentError> {
    let sizing = PieceSizing::new(info);

    match &info.content {
        Content::Single(entry) => {
            let final_path = join_segments(root, &entry.path)?;
            let file = FileInfo {
                path: entry.path.clone(),
                len: entry.len,
                torrent_offset: 0,
            };
            let scratch = (0..sizing.piece_count)
                .map(|i| root.join(format!("piece-{}.bin", i)))
                .collect();
            Ok(FileStructure::Simple {
                file,
                final_path,
                scratch,
            })
        }
        Content::Multi { files: entries, .. } => {
            if entries.is_empty() {
                return Err(NewTorrentError::Metadata(
                    crate::metainfo::MetadataError::EmptyFileList,
                ));
            }

            let piece_len = info.piece_len as u64;
            let mut files = Vec::with_capacity(entries.len());
            let mut offset = 0u64;
            for entry in entries {
                files.push(FileInfo {
                    path: entry.path.clone(),
                    len: entry.len,
                    torrent_offset: offset,
                });
                offset += entry.len;
            }

            let mut split: Vec<Option<SplitPiece>> =
                vec![None; sizing.piece_count];
            let mut dependencies = Vec::with_capacity(files.len());
            let mut next_piece = 0usize;
            let mut carry: Option<Carry> = None;

            for (file_idx, file) in files.iter().enumerate() {
                let is_last_file = file_idx == files.len() - 1;
                let final_path = join_segments(root, &file.path)?;
                let file_dir = final_path
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());

                let mut deps = Vec::new();
                let mut effective_len = file.len;

                debug_assert_eq!(
                    carry.is_some(),
                    !file.starts_on_piece_boundary(piece_len),
                    "carry state disagrees with {:?}'s piece-boundary alignment",
                    file.path
                );

                if let Some(c) = carry.take() {
                    let start_path = append_suffix(&final_path, ".start");
                    split[c.piece_index] = Some(SplitPiece::Straddling {
                        prefix_len: c.prefix_len,
                        path_a: c.path_a,
                        path_b: start_path.clone(),
                    });
                    deps.push(start_path);
                    // the carry's piece is already placed; the next
                    // unplaced piece follows it.
                    next_piece = c.piece_index + 1;
                    effective_len = file
                        .len
                        .checked_sub(c.pending_suffix_len)
                        .unwrap_or(0);
                }

                let q = effective_len / piece_len;
                let r = effective_len % piece_len;

                debug_assert_eq!(
                    r == 0,
                    file.ends_on_piece_boundary(piece_len),
                    "remainder disagrees with {:?}'s piece-boundary alignment",
                    file.path
                );

                for k in 0..q {
                    let piece_idx = next_piece + k as usize;
                    let p = file_dir.join(format!("piece-{}.bin", piece_idx));
                    split[piece_idx] = Some(SplitPiece::Normal(p.clone()));
                    deps.push(p);
                }

                if r == 0 {
                    next_piece += q as usize;
                } else if !is_last_file {
                    let boundary_piece = next_piece + q as usize;
                    let end_path = append_suffix(&final_path, ".end");
                    deps.push(end_path.clone());
                    carry = Some(Carry {
                        path_a: end_path,
                        prefix_len: r as u32,
                        pending_suffix_len: piece_len - r,
                        piece_index: boundary_piece,
                    });
                    next_piece += q as usize + 1;
                } else {
                    // The short last piece of the torrent lives wholly in
                    // this (the last) file. Its scratch lives at the root,
                    // not under the file's own directory: this mirrors the
                    // source's `makePiecePath absRoot maxPiece` convention
                    // (an explicit Open-Question decision, see DESIGN.md).
                    let last_idx = next_piece + q as usize;
                    let p = root.join(format!("piece-{}.bin", last_idx));
                    split[last_idx] = Some(SplitPiece::Normal(p.clone()));
                    deps.push(p);
                    next_piece += q as usize + 1;
                }

                dependencies.push((final_path, deps));
            }

            debug_assert!(carry.is_none(), "multi-file walk ended with an unresolved straddle");

            let split = split
                .into_iter()
                .enumerate()
                .map(|(i, s)| {
                    s.unwrap_or_else(|| {
                        panic!("piece {} was never placed by the layout planner", i)
                    })
                })
                .collect();

            Ok(FileStructure::Multi {
                files,
                split,
                dependencies,
            })
        }
    }
}
