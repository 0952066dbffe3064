//! Piece Mapping: for every piece, a read recipe that works both before and
//! after that piece's owning file(s) have been merged.
//!
//! A piece is read through 1 or 2 [`Segment`]s (2 only for a straddling
//! piece). Each segment carries both its scratch location (valid before
//! merge) and its embedded location inside the final file (valid after
//! merge). A reader always tries scratch first: during the merge race
//! window the scratch file can still be present even though the final file
//! already holds the same bytes, and scratch is authoritative until it is
//! unlinked.

use std::path::{Path, PathBuf};

use crate::layout::{final_path, FileStructure, SplitPiece};
use crate::storage_info::{FileInfo, PieceSizing};
use crate::PieceIndex;

/// Where a segment's bytes live once its owning file has been merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddedLocation {
    pub path: PathBuf,
    pub offset: u64,
}

/// One contiguous run of a piece's bytes, with both its pre-merge (scratch)
/// and post-merge (embedded) locations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub scratch_path: PathBuf,
    pub embedded: EmbeddedLocation,
    pub len: u32,
}

/// The read recipe for every piece of a torrent, built once from a
/// [`FileStructure`] and never mutated afterwards: it does not change as
/// pieces are written or merged, only which of a segment's two locations
/// currently holds valid data does.
#[derive(Clone, Debug)]
pub struct PieceMapping {
    segments: Vec<Vec<Segment>>,
}

impl PieceMapping {
    /// The segments making up `piece_index`, in order, or `None` if the
    /// index is out of range.
    pub fn segments(&self, piece_index: PieceIndex) -> Option<&[Segment]> {
        self.segments.get(piece_index).map(Vec::as_slice)
    }

    pub fn piece_count(&self) -> usize {
        self.segments.len()
    }
}

/// Finds the file whose byte range contains `offset`, via binary search over
/// the (sorted, contiguous) file list.
fn file_containing(files: &[FileInfo], offset: u64) -> &FileInfo {
    let idx = files.partition_point(|f| f.torrent_end_offset() <= offset);
    let file = &files[idx.min(files.len() - 1)];
    debug_assert!(
        file.byte_range().contains(&offset),
        "offset {} not covered by {:?}",
        offset,
        file.path
    );
    file
}

/// Builds the piece mapping for `structure`, whose files live under `root`.
pub fn build(root: &Path, structure: &FileStructure, sizing: &PieceSizing) -> PieceMapping {
    let segments = match structure {
        FileStructure::Simple {
            final_path: path,
            scratch,
            ..
        } => {
            let path = path.clone();
            (0..sizing.piece_count)
                .map(|i| {
                    let len = sizing.piece_len(i).expect("index within piece_count");
                    let offset = i as u64 * sizing.piece_len as u64;
                    vec![Segment {
                        scratch_path: scratch[i].clone(),
                        embedded: EmbeddedLocation {
                            path: path.clone(),
                            offset,
                        },
                        len,
                    }]
                })
                .collect()
        }
        FileStructure::Multi { files, split, .. } => split
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let piece_len = sizing.piece_len(i).expect("index within piece_count") as u64;
                let piece_start = i as u64 * sizing.piece_len as u64;
                match s {
                    SplitPiece::Normal(scratch_path) => {
                        let file = file_containing(files, piece_start);
                        let offset = piece_start - file.torrent_offset;
                        vec![Segment {
                            scratch_path: scratch_path.clone(),
                            embedded: EmbeddedLocation {
                                path: final_path(root, &file.path),
                                offset,
                            },
                            len: piece_len as u32,
                        }]
                    }
                    SplitPiece::Straddling {
                        prefix_len,
                        path_a,
                        path_b,
                    } => {
                        let file_a = file_containing(files, piece_start);
                        let file_b = file_containing(files, piece_start + *prefix_len as u64);
                        let suffix_len = piece_len as u32 - *prefix_len;
                        vec![
                            Segment {
                                scratch_path: path_a.clone(),
                                embedded: EmbeddedLocation {
                                    path: final_path(root, &file_a.path),
                                    offset: piece_start - file_a.torrent_offset,
                                },
                                len: *prefix_len,
                            },
                            Segment {
                                scratch_path: path_b.clone(),
                                embedded: EmbeddedLocation {
                                    path: final_path(root, &file_b.path),
                                    offset: 0,
                                },
                                len: suffix_len,
                            },
                        ]
                    }
                }
            })
            .collect(),
    };
    PieceMapping { segments }
}
