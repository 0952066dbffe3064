//! `writeBatch`: writes a batch of completed pieces to their scratch
//! locations, then opportunistically merges any final file whose
//! dependencies are now all present.
//!
//! Runs on a blocking thread pool; every function in this module performs
//! synchronous file IO.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::WriteError;
use crate::layout::{FileStructure, SplitPiece};
use crate::storage_info::PieceSizing;
use crate::PieceIndex;

/// Running totals for a writer process, accumulated across batches.
#[derive(Clone, Copy, Debug, Default)]
pub struct Stats {
    pub bytes_written: u64,
    pub pieces_skipped: u64,
    pub merges_completed: u64,
}

impl Stats {
    pub fn accumulate(&mut self, other: Stats) {
        self.bytes_written += other.bytes_written;
        self.pieces_skipped += other.pieces_skipped;
        self.merges_completed += other.merges_completed;
    }
}

/// Maps every scratch path appearing in any dependency list to the final
/// file it belongs to, so a piece write can be checked against that file's
/// merge-completion state before touching disk.
fn owning_files(structure: &FileStructure) -> HashMap<&Path, &Path> {
    let mut owners = HashMap::new();
    for (final_path, deps) in structure.final_entries() {
        for dep in deps {
            owners.insert(dep.as_path(), final_path);
        }
    }
    owners
}

/// A final file is merge-complete when it exists and none of its
/// dependencies do: every dep was appended then unlinked already.
fn merged_files(structure: &FileStructure) -> HashMap<&Path, bool> {
    structure
        .final_entries()
        .into_iter()
        .map(|(final_path, deps)| {
            let complete = final_path.exists() && deps.iter().all(|d| !d.exists());
            (final_path, complete)
        })
        .collect()
}

fn is_merged(owners: &HashMap<&Path, &Path>, merged: &HashMap<&Path, bool>, path: &Path) -> bool {
    owners
        .get(path)
        .and_then(|f| merged.get(f))
        .copied()
        .unwrap_or(false)
}

pub fn write_batch(
    structure: &FileStructure,
    sizing: &PieceSizing,
    pieces: &[(PieceIndex, Vec<u8>)],
) -> Result<Stats, WriteError> {
    let mut stats = Stats::default();

    // Snapshot merge completion once, before this batch's writes: a piece
    // whose owning file already finished merging must not be rewritten,
    // or the next merge check would see a resurrected dependency and
    // re-append bytes the final file already has.
    let owners = owning_files(structure);
    let merged = merged_files(structure);

    for (index, bytes) in pieces {
        write_piece(structure, sizing, &owners, &merged, *index, bytes, &mut stats)?;
    }

    for (final_path, deps) in structure.final_entries() {
        merge_if_complete(final_path, deps, &mut stats)?;
    }

    Ok(stats)
}

fn write_piece(
    structure: &FileStructure,
    sizing: &PieceSizing,
    owners: &HashMap<&Path, &Path>,
    merged: &HashMap<&Path, bool>,
    index: PieceIndex,
    bytes: &[u8],
    stats: &mut Stats,
) -> Result<(), WriteError> {
    let expected_len = sizing.piece_len(index).ok_or(WriteError::InvalidPieceIndex)?;
    if bytes.len() != expected_len as usize {
        return Err(WriteError::InvalidLength);
    }

    match structure {
        FileStructure::Simple { scratch, .. } => {
            let path = &scratch[index];
            if is_merged(owners, merged, path) {
                stats.pieces_skipped += 1;
            } else {
                fs::write(path, bytes)?;
                stats.bytes_written += bytes.len() as u64;
            }
        }
        FileStructure::Multi { split, .. } => match &split[index] {
            SplitPiece::Normal(path) => {
                if is_merged(owners, merged, path) {
                    stats.pieces_skipped += 1;
                } else {
                    fs::write(path, bytes)?;
                    stats.bytes_written += bytes.len() as u64;
                }
            }
            SplitPiece::Straddling {
                prefix_len,
                path_a,
                path_b,
            } => {
                let (prefix, suffix) = bytes.split_at(*prefix_len as usize);
                if is_merged(owners, merged, path_a) {
                    stats.pieces_skipped += 1;
                } else {
                    fs::write(path_a, prefix)?;
                    stats.bytes_written += prefix.len() as u64;
                }
                if is_merged(owners, merged, path_b) {
                    stats.pieces_skipped += 1;
                } else {
                    fs::write(path_b, suffix)?;
                    stats.bytes_written += suffix.len() as u64;
                }
            }
        },
    }

    Ok(())
}

/// Appends `deps`, in order, into `final_path` and unlinks each dep right
/// after its bytes are durably appended, if and only if every dep is
/// currently present. The ordering (sync before unlink, one dep at a time)
/// is what keeps a crash mid-merge safe to retry.
fn merge_if_complete(final_path: &Path, deps: &[PathBuf], stats: &mut Stats) -> Result<(), WriteError> {
    if deps.is_empty() || !deps.iter().all(|d| d.exists()) {
        return Ok(());
    }

    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(final_path)?;
    for dep in deps {
        let data = fs::read(dep)?;
        out.write_all(&data)?;
        out.sync_data()?;
        fs::remove_file(dep)?;
    }
    stats.merges_completed += 1;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;
    use crate::metainfo::{Content, FileEntry, TorrentInfo};
    use std::fs;
    use tempfile::tempdir;

    fn single_file_info(len: u64, piece_len: u32) -> TorrentInfo {
        TorrentInfo {
            piece_len,
            piece_hashes: vec![],
            content: Content::Single(FileEntry {
                path: vec!["hello.txt".into()],
                len,
            }),
        }
    }

    // S1
    #[test]
    fn test_single_piece_merges_on_first_batch() {
        let dir = tempdir().unwrap();
        let info = single_file_info(5, 16384);
        let sizing = PieceSizing::new(&info);
        let structure = layout::plan(&info, dir.path()).unwrap();

        let stats = write_batch(&structure, &sizing, &[(0, b"HELLO".to_vec())]).unwrap();
        assert_eq!(stats.merges_completed, 1);

        let final_path = dir.path().join("hello.txt");
        assert_eq!(fs::read(&final_path).unwrap(), b"HELLO");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    // S2 - out of order delivery across three batches
    #[test]
    fn test_out_of_order_batches_multi_piece() {
        let dir = tempdir().unwrap();
        let info = single_file_info(10, 4);
        let sizing = PieceSizing::new(&info);
        let structure = layout::plan(&info, dir.path()).unwrap();

        write_batch(&structure, &sizing, &[(2, b"IJ".to_vec())]).unwrap();
        write_batch(&structure, &sizing, &[(0, b"ABCD".to_vec())]).unwrap();
        let stats = write_batch(&structure, &sizing, &[(1, b"EFGH".to_vec())]).unwrap();

        assert_eq!(stats.merges_completed, 1);
        let final_path = dir.path().join("hello.txt");
        assert_eq!(fs::read(&final_path).unwrap(), b"ABCDEFGHIJ");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    // Idempotence (invariant 5): replaying an already-merged piece must not
    // duplicate bytes in the final file.
    #[test]
    fn test_replaying_merged_piece_is_idempotent() {
        let dir = tempdir().unwrap();
        let info = single_file_info(5, 16384);
        let sizing = PieceSizing::new(&info);
        let structure = layout::plan(&info, dir.path()).unwrap();

        write_batch(&structure, &sizing, &[(0, b"HELLO".to_vec())]).unwrap();
        let stats = write_batch(&structure, &sizing, &[(0, b"HELLO".to_vec())]).unwrap();
        assert_eq!(stats.pieces_skipped, 1);
        assert_eq!(stats.merges_completed, 0);

        let final_path = dir.path().join("hello.txt");
        assert_eq!(fs::read(&final_path).unwrap(), b"HELLO");
    }

    // S3
    #[test]
    fn test_straddling_write_and_merge() {
        let dir = tempdir().unwrap();
        let info = TorrentInfo {
            piece_len: 4,
            piece_hashes: vec![],
            content: Content::Multi {
                name: "t".into(),
                files: vec![
                    FileEntry { path: vec!["A".into()], len: 3 },
                    FileEntry { path: vec!["B".into()], len: 5 },
                ],
            },
        };
        let sizing = PieceSizing::new(&info);
        let structure = layout::plan(&info, dir.path()).unwrap();

        write_batch(
            &structure,
            &sizing,
            &[
                (0, vec![b'a', b'b', b'c', b'd']),
                (1, vec![b'e', b'f', b'g', b'h']),
            ],
        )
        .unwrap();

        assert_eq!(fs::read(dir.path().join("A")).unwrap(), b"abc");
        assert_eq!(fs::read(dir.path().join("B")).unwrap(), b"defgh");
        // no scratch left: just A and B in the root.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let dir = tempdir().unwrap();
        let info = single_file_info(5, 16384);
        let sizing = PieceSizing::new(&info);
        let structure = layout::plan(&info, dir.path()).unwrap();
        let err = write_batch(&structure, &sizing, &[(0, b"HI".to_vec())]).unwrap_err();
        assert!(matches!(err, WriteError::InvalidLength));
    }
}
