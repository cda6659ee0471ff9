//! The producer/consumer key-search pipeline.
//!
//! One producer task streams memory chunks from a [`ChunkSource`] into a
//! bounded channel; a clamped pool of worker threads consumes it. Each
//! worker runs three searches per chunk: the brute-force derived-key scan
//! (while databases remain unmatched), the pattern-anchored raw-key search,
//! and the pattern-anchored image-key search.
//!
//! Raw and image keys travel through a size-1 result channel; a confirmed
//! raw + image pair cancels the whole pipeline. Derived keys never touch
//! the result channel. They accumulate in a shared set, because every
//! database needs its own derived key and the scan must keep going until
//! the producer closes.

pub mod patterns;

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

use pagecipher::KEY_LEN;

use crate::cancel::CancelToken;
use crate::errors::ExtractResult;
use crate::memory::ChunkSource;
use crate::model::{DataKey, IMG_KEY_LEN};
use crate::validator::Validator;

use patterns::{scan_patterns, V4_IMG_KEY_PATTERNS, V4_KEY_PATTERNS};

/// Worker pool bounds.
const MIN_WORKERS: usize = 2;
const MAX_WORKERS: usize = 8;

/// Depth of the chunk channel between producer and workers.
const CHUNK_CHANNEL_DEPTH: usize = 200;

/// Brute-force scan stride and window.
const DERIVED_STRIDE: usize = 8;
const DERIVED_WINDOW: usize = KEY_LEN;

/// Windows with more zero bytes than this are skipped outright.
const MAX_ZERO_BYTES: usize = 24;

/// How often (in scanned bytes) the brute-force loop polls for
/// cancellation and completion.
const POLL_INTERVAL: usize = 8 * 1024;

/// Raw/image keys found by one worker, as published on the result channel.
type WorkerResult = (Option<[u8; KEY_LEN]>, Option<[u8; IMG_KEY_LEN]>);

/// What a finished pipeline produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOutcome {
    pub data_key: Option<DataKey>,
    pub img_key: Option<[u8; IMG_KEY_LEN]>,
}

/// Append-only set of fixed-size candidates already offered to a validator.
struct SeenSet<const N: usize>(Mutex<HashSet<[u8; N]>>);

impl<const N: usize> SeenSet<N> {
    fn new() -> Self {
        SeenSet(Mutex::new(HashSet::new()))
    }

    /// Insert `candidate`; `true` when it had not been seen before.
    fn first_seen(&self, candidate: &[u8]) -> bool {
        match <[u8; N]>::try_from(candidate) {
            Ok(key) => self.0.lock().insert(key),
            Err(_) => false,
        }
    }
}

/// The shared state of one extraction run.
pub struct SearchEngine {
    validator: Arc<Validator>,
    processed_raw: SeenSet<KEY_LEN>,
    processed_derived: SeenSet<KEY_LEN>,
    processed_img: SeenSet<IMG_KEY_LEN>,
    found_derived: Mutex<BTreeSet<[u8; KEY_LEN]>>,
}

impl SearchEngine {
    pub fn new(validator: Arc<Validator>) -> Arc<Self> {
        Arc::new(SearchEngine {
            validator,
            processed_raw: SeenSet::new(),
            processed_derived: SeenSet::new(),
            processed_img: SeenSet::new(),
            found_derived: Mutex::new(BTreeSet::new()),
        })
    }

    /// Run the pipeline to completion (or cancellation) and aggregate.
    pub fn run(
        self: Arc<Self>,
        mut source: Box<dyn ChunkSource>,
        token: &CancelToken,
    ) -> ExtractResult<SearchOutcome> {
        let (chunk_tx, chunk_rx) = bounded::<Vec<u8>>(CHUNK_CHANNEL_DEPTH);
        let (result_tx, result_rx) = bounded::<WorkerResult>(1);

        let worker_count = num_cpus::get().clamp(MIN_WORKERS, MAX_WORKERS);
        debug!(worker_count, "starting key search");

        let mut workers = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            let engine = Arc::clone(&self);
            let rx = chunk_rx.clone();
            let tx = result_tx.clone();
            let tok = token.clone();
            workers.push(
                thread::Builder::new()
                    .name(format!("keysweep-worker-{i}"))
                    .spawn(move || engine.worker(&rx, &tx, &tok))?,
            );
        }
        drop(chunk_rx);
        drop(result_tx);

        let producer_token = token.clone();
        let producer = thread::Builder::new()
            .name("keysweep-producer".into())
            .spawn(move || {
                // chunk_tx is dropped on return, closing the channel.
                if let Err(e) = source.read(&producer_token, &chunk_tx) {
                    error!(error = %e, "memory source failed; cancelling pipeline");
                    producer_token.cancel();
                }
            })?;

        // Collect raw/image results until all workers hang up. A confirmed
        // raw + image pair is enough to stop everything early.
        let mut final_raw = None;
        let mut final_img = None;
        for (raw, img) in result_rx.iter() {
            if raw.is_some() {
                final_raw = raw;
            }
            if img.is_some() {
                final_img = img;
            }
            if final_raw.is_some() && final_img.is_some() {
                token.cancel();
                break;
            }
        }

        for handle in workers {
            if handle.join().is_err() {
                error!("search worker panicked");
            }
        }
        if producer.join().is_err() {
            error!("memory producer panicked");
        }

        debug!(
            matched = self.validator.matched_count(),
            total = self.validator.total_db_count(),
            "derived-key coverage after search"
        );

        let derived = self.found_derived_keys();
        let data_key = if !derived.is_empty() {
            debug!(count = derived.len(), "derived keys collected");
            Some(DataKey::Derived(derived))
        } else {
            final_raw.map(DataKey::Raw)
        };

        Ok(SearchOutcome {
            data_key,
            img_key: final_img,
        })
    }

    /// Per-worker loop: drain the chunk channel, keep local raw/image
    /// state, publish on change and once more at shutdown.
    fn worker(&self, chunk_rx: &Receiver<Vec<u8>>, result_tx: &Sender<WorkerResult>, token: &CancelToken) {
        let mut raw_key: Option<[u8; KEY_LEN]> = None;
        let mut img_key: Option<[u8; IMG_KEY_LEN]> = None;

        loop {
            if token.is_cancelled() {
                return;
            }
            let Ok(chunk) = chunk_rx.recv() else {
                // Producer is done; hand over whatever this worker holds.
                if raw_key.is_some() || img_key.is_some() {
                    let _ = result_tx.try_send((raw_key, img_key));
                }
                return;
            };

            if !self.validator.all_derived_found() {
                self.search_all_derived_keys(&chunk, token);
            }

            if raw_key.is_none() {
                if let Some(key) = self.search_raw_key(&chunk, token) {
                    debug!(key = %hex::encode(key), "raw data key found");
                    raw_key = Some(key);
                    send_result(result_tx, (raw_key, img_key), token);
                }
            }

            if img_key.is_none() {
                if let Some(key) = self.search_img_key(&chunk, token) {
                    debug!(key = %hex::encode(key), "image key found");
                    img_key = Some(key);
                    send_result(result_tx, (raw_key, img_key), token);
                }
            }
        }
    }

    /// Pattern-anchored raw-key search over one chunk.
    pub fn search_raw_key(&self, memory: &[u8], token: &CancelToken) -> Option<[u8; KEY_LEN]> {
        let found = scan_patterns(memory, V4_KEY_PATTERNS, KEY_LEN, token, |cand| {
            self.processed_raw.first_seen(cand) && self.validator.validate_raw(cand)
        })?;
        found.as_slice().try_into().ok()
    }

    /// Pattern-anchored image-key search over one chunk.
    pub fn search_img_key(&self, memory: &[u8], token: &CancelToken) -> Option<[u8; IMG_KEY_LEN]> {
        let found = scan_patterns(memory, V4_IMG_KEY_PATTERNS, IMG_KEY_LEN, token, |cand| {
            self.processed_img.first_seen(cand) && self.validator.validate_img(cand)
        })?;
        found.as_slice().try_into().ok()
    }

    /// Brute-force derived-key scan: every 8-byte-aligned 32-byte window.
    ///
    /// Accepted keys land in the shared `found_derived` set. Returns how
    /// many new keys this call validated. Polls cancellation and the
    /// all-found signal every 8 KiB of progress.
    pub fn search_all_derived_keys(&self, memory: &[u8], token: &CancelToken) -> usize {
        if memory.len() < DERIVED_WINDOW {
            return 0;
        }

        let mut count = 0;
        let mut pos = 0;
        while pos + DERIVED_WINDOW <= memory.len() {
            if pos % POLL_INTERVAL == 0
                && (token.is_cancelled() || self.validator.all_derived_found())
            {
                return count;
            }

            let window = &memory[pos..pos + DERIVED_WINDOW];
            pos += DERIVED_STRIDE;

            if window.iter().filter(|&&b| b == 0).count() > MAX_ZERO_BYTES {
                continue;
            }
            if !self.processed_derived.first_seen(window) {
                continue;
            }
            if self.validator.validate_derived(window) {
                if let Ok(key) = <[u8; KEY_LEN]>::try_from(window) {
                    debug!(key = %hex::encode(key), offset = pos - DERIVED_STRIDE,
                        "derived data key found via brute-force scan");
                    self.found_derived.lock().insert(key);
                    count += 1;
                }
            }
        }
        count
    }

    /// Snapshot of every validated derived key.
    pub fn found_derived_keys(&self) -> Vec<[u8; KEY_LEN]> {
        self.found_derived.lock().iter().copied().collect()
    }
}

/// Publish a worker result without deadlocking a full size-1 channel:
/// block in short slices, giving up on cancellation or hang-up.
fn send_result(tx: &Sender<WorkerResult>, result: WorkerResult, token: &CancelToken) {
    loop {
        match tx.send_timeout(result, Duration::from_millis(50)) {
            Ok(()) => return,
            Err(crossbeam_channel::SendTimeoutError::Timeout(_)) => {
                if token.is_cancelled() {
                    return;
                }
            }
            Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => return,
        }
    }
}
