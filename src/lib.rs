#[macro_use]
extern crate serde_derive;

pub mod conf;
mod disk;
pub mod error;
pub mod layout;
pub mod mapping;
pub mod metainfo;
pub mod storage_info;

pub use disk::{
    PeerReplyTx, PeerToWriter, PieceBuffer, PieceBufferHandle, Stats, WriterInboxRx,
    WriterInboxTx, WriterProcess, WriterToPeer,
};

/// The type of a piece's index.
///
/// On the wire all integers are sent as 4-byte big endian integers, but in
/// the source code we use `usize` to be consistent with other index types
/// in Rust.
pub type PieceIndex = usize;

/// A SHA-1 hash digest, 20 bytes long.
pub type Sha1Hash = [u8; 20];

/// This is the only block length we're dealing with (except for possibly
/// the last block). It is the widely used and accepted 16 KiB.
pub const BLOCK_LEN: u32 = 0x4000;

/// A block is a fixed size chunk of a piece, which in turn is a fixed size
/// chunk of a torrent. Block-level requests are the unit peers exchange
/// over the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockInfo {
    /// The index of the piece of which this is a block.
    pub piece_index: PieceIndex,
    /// The zero-based byte offset into the piece.
    pub offset: u32,
    /// The block's length in bytes.
    pub len: u32,
}

/// Identifies a block without its length, as used when fulfilling a request
/// back to the peer that asked for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockIndex {
    pub piece_index: PieceIndex,
    pub offset: u32,
}
