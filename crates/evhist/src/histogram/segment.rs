//! Page segments and the runner that executes one operator per segment.
//!
//! A histogram is cut along its page (z) axis into contiguous [`Segment`]s.
//! Each segment is handed to an operator together with a disjoint view of
//! its pages, so workers never share mutable cells.

use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use ndarray::{ArrayView3, ArrayViewMut3, Axis};

use crate::config::HistogramConfig;
use crate::error::{HistogramError, SegmentError};
use crate::utils::Parallelism;

// =============================================================================
// Segment
// =============================================================================

/// A contiguous block of pages handled by a single operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    pub pages: Range<usize>,
}

impl Segment {
    #[inline]
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    #[inline]
    pub fn first_page(&self) -> usize {
        self.pages.start
    }
}

/// Split `n_pages` into at most `n_segments` contiguous blocks.
///
/// Every block gets `n_pages / n` pages; the last one also takes the
/// remainder. The number of blocks is reduced to `n_pages` for thin volumes.
pub fn split_pages(n_pages: usize, n_segments: usize) -> Vec<Segment> {
    let n = n_segments.min(n_pages).max(1);
    let step = n_pages / n;
    (0..n)
        .map(|i| {
            let start = i * step;
            let end = if i + 1 == n { n_pages } else { start + step };
            Segment {
                index: i,
                pages: start..end,
            }
        })
        .collect()
}

/// Cut `cells` into one mutable page view per segment.
pub(crate) fn split_pages_mut<'a>(
    cells: ArrayViewMut3<'a, f32>,
    segments: &[Segment],
) -> Vec<ArrayViewMut3<'a, f32>> {
    let mut views = Vec::with_capacity(segments.len());
    let mut rest = cells;
    for segment in segments {
        let (head, tail) = rest.split_at(Axis(0), segment.len());
        views.push(head);
        rest = tail;
    }
    views
}

/// Cut `cells` into one read-only page view per segment.
pub(crate) fn split_pages_ref<'a>(
    cells: ArrayView3<'a, f32>,
    segments: &[Segment],
) -> Vec<ArrayView3<'a, f32>> {
    let mut views = Vec::with_capacity(segments.len());
    let mut rest = cells;
    for segment in segments {
        let (head, tail) = rest.split_at(Axis(0), segment.len());
        views.push(head);
        rest = tail;
    }
    views
}

// =============================================================================
// SegmentStats
// =============================================================================

/// Partial aggregate returned by a binning or scanning operator.
///
/// Sums are kept per page so that the histogram total is folded in page
/// order, whatever the segment decomposition.
#[derive(Clone, Debug, PartialEq)]
pub struct SegmentStats {
    /// Sum of the cells of each page of the segment, in page order.
    pub page_sums: Vec<f64>,
    /// Smallest cell value in the segment's pages.
    pub min: f32,
    /// Largest cell value in the segment's pages.
    pub max: f32,
    /// Number of events that landed in the segment.
    pub binned: u64,
}

impl SegmentStats {
    /// Identity element of [`merge`](Self::merge).
    pub const EMPTY: Self = Self {
        page_sums: Vec::new(),
        min: f32::INFINITY,
        max: f32::NEG_INFINITY,
        binned: 0,
    };

    /// Append `other`, which must cover the pages following `self`.
    pub fn merge(mut self, other: Self) -> Self {
        self.page_sums.extend(other.page_sums);
        Self {
            page_sums: self.page_sums,
            min: self.min.min(other.min),
            max: self.max.max(other.max),
            binned: self.binned + other.binned,
        }
    }

    /// Fold partial results in segment order.
    pub fn reduce<I: IntoIterator<Item = Self>>(parts: I) -> Self {
        parts.into_iter().fold(Self::EMPTY, Self::merge)
    }

    /// Sum of all pages, accumulated in page order.
    pub fn sum(&self) -> f64 {
        self.page_sums.iter().fold(0.0, |acc, &s| acc + s)
    }

    /// Reject results that would corrupt the cached aggregates.
    pub fn validate(&self, segment: usize) -> Result<(), SegmentError> {
        if self.page_sums.iter().any(|s| s.is_nan()) {
            return Err(SegmentError::InvalidResult {
                segment,
                reason: "sum is NaN".to_string(),
            });
        }
        if self.min > self.max {
            return Err(SegmentError::InvalidResult {
                segment,
                reason: format!("min {} exceeds max {}", self.min, self.max),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Deadline
// =============================================================================

/// Cooperative time limit shared by all operators of one batch.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline `timeout` from now. Timeouts too large to represent never expire.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(timeout),
        }
    }

    /// A deadline that never expires.
    pub fn never() -> Self {
        Self { at: None }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Fail with [`SegmentError::TimedOut`] once the deadline has passed.
    #[inline]
    pub fn check(&self, segment: usize) -> Result<(), SegmentError> {
        if self.is_expired() {
            Err(SegmentError::TimedOut { segment })
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// SegmentRunner
// =============================================================================

/// Executes one operator per segment and joins the results.
///
/// With one thread the operators run in order on the calling thread;
/// otherwise they run on a dedicated rayon pool. The caller blocks until every
/// operator has finished.
#[derive(Debug)]
pub struct SegmentRunner {
    pool: Option<rayon::ThreadPool>,
    timeout: Duration,
}

impl SegmentRunner {
    /// Build a runner for `config`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the pool cannot be created.
    pub fn new(config: &HistogramConfig) -> Result<Self, HistogramError> {
        config.validate()?;
        let pool = match config.parallelism() {
            Parallelism::Sequential => None,
            Parallelism::Parallel => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(config.n_threads)
                    .thread_name(|i| format!("evhist-segment-{i}"))
                    .build()?,
            ),
        };
        Ok(Self {
            pool,
            timeout: config.timeout,
        })
    }

    /// Number of worker threads.
    pub fn n_threads(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    #[inline]
    pub fn parallelism(&self) -> Parallelism {
        if self.pool.is_some() {
            Parallelism::Parallel
        } else {
            Parallelism::Sequential
        }
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `op` on every task and return the results in task order.
    ///
    /// `op` receives the task's position in `tasks`, the task and the batch
    /// deadline. The batch fails if any operator fails or panics, or if the
    /// batch as a whole exceeds the timeout. Results of successful operators
    /// are discarded on failure.
    pub fn run<T, R, F>(&self, tasks: Vec<T>, op: F) -> Result<Vec<R>, SegmentError>
    where
        T: Send,
        R: Send,
        F: Fn(usize, T, &Deadline) -> Result<R, SegmentError> + Sync + Send,
    {
        let n_tasks = tasks.len();
        let deadline = Deadline::after(self.timeout);
        let start = Instant::now();
        log::debug!(
            "dispatching {n_tasks} segment operators on {} thread(s)",
            self.n_threads()
        );

        let guarded = |(index, task): (usize, T)| -> Result<R, SegmentError> {
            let started = Instant::now();
            let result = match catch_unwind(AssertUnwindSafe(|| op(index, task, &deadline))) {
                Ok(result) => result,
                Err(payload) => Err(SegmentError::Panicked {
                    segment: index,
                    message: panic_message(payload.as_ref()),
                }),
            };
            log::trace!("segment {index} finished in {:?}", started.elapsed());
            result
        };

        let indexed: Vec<(usize, T)> = tasks.into_iter().enumerate().collect();
        let parallelism = self.parallelism();
        let results = match &self.pool {
            Some(pool) => pool.install(|| parallelism.maybe_par_map(indexed, guarded)),
            None => parallelism.maybe_par_map(indexed, guarded),
        };

        let elapsed = start.elapsed();
        let mut outputs = Vec::with_capacity(n_tasks);
        for result in results {
            match result {
                Ok(output) => outputs.push(output),
                Err(err) => {
                    log::warn!("segment batch failed: {err}");
                    return Err(err);
                }
            }
        }
        if elapsed > self.timeout {
            let err = SegmentError::BatchTimedOut {
                elapsed,
                timeout: self.timeout,
            };
            log::warn!("{err}");
            return Err(err);
        }
        log::debug!("{n_tasks} segment operators joined in {elapsed:?}");
        Ok(outputs)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
