//! Abstraction over process-memory producers.
//!
//! The [`ChunkSource`] trait is the seam between the search engine and the
//! OS-specific machinery that enumerates and reads a foreign process's
//! memory regions. Live readers (a debugger driver on macOS, a
//! `ReadProcessMemory`-style reader on Windows) plug in from outside; the
//! in-repo [`dump::DumpFileSource`] streams a saved memory image through
//! the same contract.

pub mod dump;

use crossbeam_channel::Sender;

use crate::cancel::CancelToken;
use crate::errors::ExtractResult;

/// Upper bound on a single emitted chunk.
pub const MAX_CHUNK: usize = 32 * 1024 * 1024;

/// Overlap between consecutive chunks of one contiguous region, so that any
/// 32-byte window is wholly contained in at least one chunk.
pub const CHUNK_OVERLAP: usize = 4096;

/// A producer of memory chunks.
///
/// # Contract
///
/// - Each emitted chunk is at most [`MAX_CHUNK`] bytes.
/// - Any 32-byte window of the logical memory range appears contiguously in
///   at least one chunk (implementations overlap consecutive chunks).
/// - On cancellation the source stops emitting and returns promptly.
/// - The channel is closed (by dropping `out`) when the source returns;
///   chunks are consumed at most once.
pub trait ChunkSource: Send {
    /// Stream chunks into `out` until the range is exhausted or `token`
    /// is cancelled.
    fn read(&mut self, token: &CancelToken, out: &Sender<Vec<u8>>) -> ExtractResult<()>;
}
