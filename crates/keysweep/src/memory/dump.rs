//! Memory-dump file source.
//!
//! Streams a saved memory image (e.g. a core dump or a raw region capture)
//! through the [`ChunkSource`] contract via a read-only memory map.

use std::fs::File;
use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use memmap2::Mmap;
use tracing::debug;

use super::{ChunkSource, CHUNK_OVERLAP, MAX_CHUNK};
use crate::cancel::CancelToken;
use crate::errors::ExtractResult;

/// A [`ChunkSource`] over a memory-mapped dump file.
pub struct DumpFileSource {
    #[allow(dead_code)]
    path: PathBuf,
    mmap: Mmap,
    chunk_size: usize,
}

impl DumpFileSource {
    /// Map `path` read-only.
    pub fn open(path: impl AsRef<Path>) -> ExtractResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(path = %path.display(), len = mmap.len(), "mapped memory dump");
        Ok(DumpFileSource {
            path,
            mmap,
            chunk_size: MAX_CHUNK,
        })
    }

    /// Override the chunk size (tests use small chunks to exercise the
    /// overlap handling). Clamped to leave room for the overlap.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(CHUNK_OVERLAP * 2);
        self
    }
}

impl ChunkSource for DumpFileSource {
    fn read(&mut self, token: &CancelToken, out: &Sender<Vec<u8>>) -> ExtractResult<()> {
        let data = &self.mmap[..];
        let step = self.chunk_size - CHUNK_OVERLAP;

        let mut offset = 0;
        while offset < data.len() {
            if token.is_cancelled() {
                debug!("dump source cancelled");
                return Ok(());
            }
            let end = (offset + self.chunk_size).min(data.len());
            // A send fails only when every worker is gone; stop quietly.
            if out.send(data[offset..end].to_vec()).is_err() {
                return Ok(());
            }
            if end == data.len() {
                break;
            }
            offset += step;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn dump_with(content: &[u8]) -> (NamedTempFile, DumpFileSource) {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(content).unwrap();
        tmp.flush().unwrap();
        let src = DumpFileSource::open(tmp.path()).unwrap();
        (tmp, src)
    }

    fn drain(src: &mut DumpFileSource, token: &CancelToken) -> Vec<Vec<u8>> {
        let (tx, rx) = bounded(64);
        src.read(token, &tx).unwrap();
        drop(tx);
        rx.iter().collect()
    }

    #[test]
    fn test_small_file_is_one_chunk() {
        let (_tmp, mut src) = dump_with(&[0xaa; 1000]);
        let chunks = drain(&mut src, &CancelToken::new());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 1000);
    }

    #[test]
    fn test_chunks_overlap_so_windows_survive_boundaries() {
        // 3 chunks of 8 KiB with 4 KiB overlap over 16 KiB + change.
        let mut content = vec![0u8; 18 * 1024];
        // A 32-byte marker straddling the first chunk boundary at 8 KiB.
        let marker: Vec<u8> = (0u8..32).collect();
        let pos = 8 * 1024 - 16;
        content[pos..pos + 32].copy_from_slice(&marker);

        let (_tmp, mut src) = dump_with(&content);
        src = src.with_chunk_size(8 * 1024);
        let chunks = drain(&mut src, &CancelToken::new());

        assert!(chunks.len() > 1);
        let containing = chunks
            .iter()
            .filter(|c| c.windows(32).any(|w| w == marker.as_slice()))
            .count();
        assert!(containing >= 1, "marker must be whole in some chunk");
    }

    #[test]
    fn test_cancelled_source_stops_emitting() {
        let (_tmp, mut src) = dump_with(&[0xbb; 64 * 1024]);
        src = src.with_chunk_size(8 * 1024);
        let token = CancelToken::new();
        token.cancel();
        let chunks = drain(&mut src, &token);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_missing_file_errors() {
        assert!(DumpFileSource::open("/nonexistent/mem.dump").is_err());
    }
}
