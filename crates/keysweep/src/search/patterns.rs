//! Pattern-anchored key search.
//!
//! Raw keys sit at fixed distances from recognizable neighbors in the
//! client's heap. Each [`KeyPattern`] pairs a needle with the candidate
//! offsets to try relative to an anchor; the tables below were recovered
//! empirically from production heaps and are carried as plain data.
//!
//! Scanning walks the buffer from the end using a reverse finder, so later
//! occurrences are tried first. The all-zero needle is special: its anchor
//! is the start of the zero run that ends at the match, i.e. the candidate
//! is read from just before the run.

use memchr::memmem;

use crate::cancel::CancelToken;

/// A needle plus the candidate offsets to try around each anchor.
#[derive(Debug, Clone, Copy)]
pub struct KeyPattern {
    pub needle: &'static [u8],
    pub offsets: &'static [isize],
}

/// ` fts5(%\0`, a compile-time FTS5 configuration string that the client
/// links near its data key.
const FTS5_NEEDLE: &[u8] = &[0x20, 0x66, 0x74, 0x73, 0x35, 0x28, 0x25, 0x00];

/// A 16-byte zero run marking the end of a preceding allocation.
const ZERO_RUN: &[u8] = &[0u8; 16];

/// Raw data-key anchors for version 4 clients.
pub const V4_KEY_PATTERNS: &[KeyPattern] = &[
    KeyPattern {
        needle: FTS5_NEEDLE,
        offsets: &[16, -80, 64],
    },
    KeyPattern {
        needle: ZERO_RUN,
        offsets: &[-32],
    },
];

/// Image-key anchors for version 4 clients.
pub const V4_IMG_KEY_PATTERNS: &[KeyPattern] = &[KeyPattern {
    needle: ZERO_RUN,
    offsets: &[-32],
}];

/// Scan `memory` for a `key_len`-byte candidate accepted by `try_candidate`.
///
/// Candidates containing two consecutive zero bytes are rejected up front
/// (a cheap false-positive filter; real keys essentially never carry a zero
/// word). `try_candidate` is expected to deduplicate and validate; the scan
/// stops at the first acceptance.
pub fn scan_patterns<F>(
    memory: &[u8],
    patterns: &[KeyPattern],
    key_len: usize,
    token: &CancelToken,
    mut try_candidate: F,
) -> Option<Vec<u8>>
where
    F: FnMut(&[u8]) -> bool,
{
    for kp in patterns {
        let finder = memmem::FinderRev::new(kp.needle);
        let zero_run = kp.needle.iter().all(|&b| b == 0);

        let mut end = memory.len();
        loop {
            if token.is_cancelled() {
                return None;
            }

            let Some(found) = finder.rfind(&memory[..end]) else {
                break;
            };

            let anchor = if zero_run {
                // Walk back over the whole zero run; the anchor is its start.
                match memory[..found].iter().rposition(|&b| b != 0) {
                    Some(p) => p + 1,
                    None => break,
                }
            } else {
                found
            };

            for &off in kp.offsets {
                let Some(start) = anchor.checked_add_signed(off) else {
                    continue;
                };
                let Some(stop) = start.checked_add(key_len) else {
                    continue;
                };
                if stop > memory.len() {
                    continue;
                }

                let candidate = &memory[start..stop];
                if candidate.windows(2).any(|w| w == [0, 0]) {
                    continue;
                }
                if try_candidate(candidate) {
                    return Some(candidate.to_vec());
                }
            }

            // Resume before the current anchor.
            end = if zero_run { anchor.saturating_sub(1) } else { found };
            if end == 0 {
                break;
            }
        }
    }
    None
}
