// ============================================================
// Layer 4 — Shuffled Batch Generator
// ============================================================
// Feeds the training loop with an endless stream of batches.
//
// How one pass works:
//   1. Build the index order 0..n (shuffled unless disabled)
//   2. Cut it into floor(n / batch_size) windows
//   3. Yield each window as one batch of exactly batch_size
//   4. The leftover n % batch_size indices are dropped; the
//      next pass reshuffles, so they are seen in later epochs
//
// Example with n=10, batch_size=4:
//   order:   [7 2 9 0 4 1 8 3 6 5]
//   batches: [7 2 9 0] [4 1 8 3]     (6 5 dropped)
//   then a fresh shuffle ...
//
// Worker threads:
//   SharedGenerator puts the generator behind Arc<Mutex<_>> so
//   several threads can take batches from it safely. PrefetchPool
//   runs `workers` threads that each:
//     lock → take next index batch → unlock
//     → copy those rows out of the SpectraSet
//     → send the samples into a bounded channel
//   The channel capacity (max_queue_size) limits how far ahead the
//   workers run. Dropping the pool closes the channel, so every
//   blocked send fails and the workers exit.
//
// Reference: Rust Book §16 (Fearless Concurrency)
//            crossbeam-channel documentation

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::{bail, Result};
use crossbeam::channel::{bounded, Receiver};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::spectrum::{SpectraSet, SpectrumSample};

/// Default bound on batches prepared ahead of the training loop
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 20;

// ─── ShuffledBatches ──────────────────────────────────────────────────────────
/// Infinite iterator of index batches, reshuffled every pass.
pub struct ShuffledBatches {
    n:          usize,
    batch_size: usize,
    shuffle:    bool,
    rng:        StdRng,
    order:      Vec<usize>,
    /// Index of the next batch within the current pass
    cursor:     usize,
}

impl ShuffledBatches {
    /// Fails if there are fewer samples than one batch,
    /// since no full batch could ever be produced.
    pub fn new(n: usize, batch_size: usize, shuffle: bool, seed: Option<u64>) -> Result<Self> {
        if batch_size == 0 {
            bail!("batch size must be at least 1");
        }
        if n < batch_size {
            bail!("{n} samples is fewer than one batch of {batch_size}");
        }
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None    => StdRng::from_entropy(),
        };
        let mut gen = Self {
            n,
            batch_size,
            shuffle,
            rng,
            order: (0..n).collect(),
            cursor: 0,
        };
        gen.start_pass();
        Ok(gen)
    }

    /// Number of full batches in one pass over the data
    pub fn batches_per_pass(&self) -> usize {
        self.n / self.batch_size
    }

    fn start_pass(&mut self) {
        self.order = (0..self.n).collect();
        if self.shuffle {
            self.order.shuffle(&mut self.rng);
        }
        self.cursor = 0;
    }
}

impl Iterator for ShuffledBatches {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.cursor >= self.batches_per_pass() {
            self.start_pass();
        }
        let start = self.cursor * self.batch_size;
        self.cursor += 1;
        Some(self.order[start..start + self.batch_size].to_vec())
    }
}

// ─── SharedGenerator ──────────────────────────────────────────────────────────
/// Thread-safe handle to a ShuffledBatches; clones share one stream.
#[derive(Clone)]
pub struct SharedGenerator {
    inner: Arc<Mutex<ShuffledBatches>>,
}

impl SharedGenerator {
    pub fn new(gen: ShuffledBatches) -> Self {
        Self { inner: Arc::new(Mutex::new(gen)) }
    }

    /// Take the next index batch. None only if another thread
    /// panicked while holding the lock.
    pub fn next_batch(&self) -> Option<Vec<usize>> {
        let mut guard = self.inner.lock().ok()?;
        guard.next()
    }
}

// ─── PrefetchPool ─────────────────────────────────────────────────────────────
/// Worker threads turning index batches into sample batches ahead of time.
pub struct PrefetchPool {
    receiver: Option<Receiver<Vec<SpectrumSample>>>,
    workers:  Vec<JoinHandle<()>>,
}

impl PrefetchPool {
    pub fn spawn(
        data:           Arc<SpectraSet>,
        generator:      SharedGenerator,
        workers:        usize,
        max_queue_size: usize,
    ) -> Self {
        let (tx, rx) = bounded(max_queue_size.max(1));
        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let tx        = tx.clone();
                let data      = Arc::clone(&data);
                let generator = generator.clone();
                std::thread::spawn(move || {
                    while let Some(indices) = generator.next_batch() {
                        let samples: Vec<SpectrumSample> = indices
                            .iter()
                            .filter_map(|&i| data.sample(i))
                            .collect();
                        if tx.send(samples).is_err() {
                            break;
                        }
                    }
                    tracing::trace!("Prefetch worker {} stopped", worker_id);
                })
            })
            .collect();

        Self { receiver: Some(rx), workers: handles }
    }

    /// Block until the next batch is ready
    pub fn next_batch(&self) -> Result<Vec<SpectrumSample>> {
        match self.receiver.as_ref().map(|rx| rx.recv()) {
            Some(Ok(batch)) => Ok(batch),
            _ => bail!("all prefetch workers have stopped"),
        }
    }
}

impl Drop for PrefetchPool {
    fn drop(&mut self) {
        // Closing the channel unblocks every worker stuck in send()
        self.receiver.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
