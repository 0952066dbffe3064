//! The Writer Process: a long-running task holding the layout planner's
//! output and the piece mapping, dispatching inbound peer messages to the
//! writer or the reader and replying on the peer's own channel.

mod reader;
mod writer;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task;

use crate::conf::TorrentConf;
use crate::error::NewTorrentError;
use crate::layout::{self, FileStructure};
use crate::mapping::{self, PieceMapping};
use crate::metainfo::TorrentInfo;
use crate::storage_info::PieceSizing;
use crate::{BlockIndex, BlockInfo, PieceIndex};

pub use writer::Stats;

/// A concurrency-safe handle to the shared, in-memory piece buffer owned by
/// the peer-facing half of the engine. `drain_completed_pieces` must be
/// atomic: each piece it returns is returned exactly once across all calls.
pub trait PieceBuffer: Send + Sync {
    fn drain_completed_pieces(&self) -> Vec<(PieceIndex, Vec<u8>)>;
}

pub type PieceBufferHandle = Arc<dyn PieceBuffer>;

/// Channel a requesting peer task is replied to on.
pub type PeerReplyTx = mpsc::UnboundedSender<WriterToPeer>;

/// Messages the writer process accepts.
#[derive(Debug)]
pub enum PeerToWriter {
    /// The shared piece buffer has newly-verified pieces ready to drain.
    BufferWritten,
    /// A peer-serving task wants a block; the reply goes to `reply`.
    PieceRequest(PeerReplyTx, BlockInfo),
}

/// Messages the writer process sends back to a requesting peer task.
#[derive(Debug)]
pub enum WriterToPeer {
    PieceFulfilled(BlockIndex, Vec<u8>),
    /// The read backing a `PieceRequest` failed; the request is dropped
    /// rather than answered with partial or incorrect data.
    Error(BlockIndex, String),
}

pub type WriterInboxTx = mpsc::UnboundedSender<PeerToWriter>;
pub type WriterInboxRx = mpsc::UnboundedReceiver<PeerToWriter>;

/// Owns `(FileStructure, PieceMapping)` plus a handle to the shared piece
/// buffer, and runs until its inbox is closed.
pub struct WriterProcess {
    structure: Arc<FileStructure>,
    mapping: Arc<PieceMapping>,
    sizing: PieceSizing,
    inbox: WriterInboxRx,
    piece_buffer: PieceBufferHandle,
    stats: Stats,
}

impl WriterProcess {
    /// Plans the on-disk layout for `info` under `root`, creates whatever
    /// directories are needed, and returns a process ready to `run`, plus
    /// the sender side of its inbox.
    pub fn allocate(
        root: &Path,
        conf: &TorrentConf,
        info: TorrentInfo,
        piece_buffer: PieceBufferHandle,
    ) -> Result<(Self, WriterInboxTx), NewTorrentError> {
        fs::create_dir_all(root)?;

        let structure = layout::plan(&info, root)?;
        for (final_path, _) in structure.final_entries() {
            if !conf.allow_existing_files && final_path.exists() {
                log::warn!("final path {:?} already exists", final_path);
                return Err(NewTorrentError::AlreadyExists);
            }
            if let Some(parent) = final_path.parent() {
                if !parent.exists() {
                    log::debug!("creating torrent subdir {:?}", parent);
                    fs::create_dir_all(parent)?;
                }
            }
        }

        let sizing = PieceSizing::new(&info);
        let mapping = mapping::build(root, &structure, &sizing);
        let (tx, rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                structure: Arc::new(structure),
                mapping: Arc::new(mapping),
                sizing,
                inbox: rx,
                piece_buffer,
                stats: Stats::default(),
            },
            tx,
        ))
    }

    /// Runs the writer process event loop until its inbox closes.
    pub async fn run(mut self) {
        log::info!("starting writer process");
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                PeerToWriter::BufferWritten => self.handle_buffer_written().await,
                PeerToWriter::PieceRequest(reply, block) => {
                    self.handle_piece_request(reply, block).await
                }
            }
        }
        log::info!("writer process inbox closed, exiting");
    }

    async fn handle_buffer_written(&mut self) {
        let pieces = self.piece_buffer.drain_completed_pieces();
        if pieces.is_empty() {
            return;
        }
        log::debug!("draining {} newly completed pieces", pieces.len());

        let structure = Arc::clone(&self.structure);
        let sizing = self.sizing;
        let result = task::spawn_blocking(move || writer::write_batch(&structure, &sizing, &pieces))
            .await
            .expect("writer task panicked");

        match result {
            Ok(stats) => {
                log::debug!(
                    "batch complete: {} bytes written, {} merges",
                    stats.bytes_written,
                    stats.merges_completed
                );
                self.stats.accumulate(stats);
            }
            Err(e) => log::warn!("batch write failed: {}", e),
        }
    }

    async fn handle_piece_request(&mut self, reply: PeerReplyTx, block: BlockInfo) {
        log::trace!("serving piece request {:?}", block);
        let mapping = Arc::clone(&self.mapping);
        let result = task::spawn_blocking(move || reader::read_block(&mapping, block))
            .await
            .expect("reader task panicked");

        let index = BlockIndex {
            piece_index: block.piece_index,
            offset: block.offset,
        };
        let msg = match result {
            Ok(bytes) => WriterToPeer::PieceFulfilled(index, bytes),
            Err(e) => {
                log::warn!("read failed for {:?}: {}", block, e);
                WriterToPeer::Error(index, e.to_string())
            }
        };
        if reply.send(msg).is_err() {
            log::warn!("peer reply channel closed before reply was sent");
        }
    }
}
