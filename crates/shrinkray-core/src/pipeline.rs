//! Sequential batch conversion over a working set.
//!
//! A run is a lazy iterator: each call to `next` converts exactly one item,
//! so at most one decoded image and one encode are live at a time. A failed
//! item is recorded and the run moves on.

use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::convert::Converter;
use crate::decode::Decoder;
use crate::encode::{OutputFormat, RasterSurface};
use crate::error::ConvertError;
use crate::item::{ConversionItem, ConversionRequest, ItemId};
use crate::ledger::HandleReleaser;
use crate::working_set::WorkingSet;

/// Which items a run visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchMode {
    /// Every item, converted or not.
    All,
    /// Items without a result for the request the builder produces.
    Remaining,
}

/// Progress after each processed item. Failures count as completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

/// What a successful batch conversion produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConvertedSummary {
    pub format: OutputFormat,
    pub byte_size: u64,
    pub quality: f32,
}

impl ConvertedSummary {
    fn of(item: &ConversionItem) -> Option<Self> {
        item.last_result().map(|result| Self {
            format: result.format,
            byte_size: result.byte_size(),
            quality: item.quality(),
        })
    }
}

/// Outcome for one item of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub id: ItemId,
    pub outcome: Result<ConvertedSummary, ConvertError>,
}

/// Counts reported once a run is over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub converted: usize,
    pub failed: usize,
    /// The run ended early on a stop request.
    pub stopped: bool,
}

/// Requests that a run stop before its next item.
///
/// The item being converted when the stop arrives runs to completion.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Starts batch runs with one converter.
#[derive(Debug)]
pub struct BatchPipeline<'c, D, S> {
    converter: &'c Converter<D, S>,
}

impl<'c, D: Decoder, S: RasterSurface> BatchPipeline<'c, D, S> {
    pub fn new(converter: &'c Converter<D, S>) -> Self {
        Self { converter }
    }

    /// Convert every item in order.
    pub fn run_all<'s, R, B, P>(
        &self,
        set: &'s mut WorkingSet<R>,
        builder: B,
        on_progress: P,
    ) -> BatchRun<'s, 'c, R, D, S, P>
    where
        R: HandleReleaser,
        B: FnMut(&ConversionItem) -> ConversionRequest,
        P: FnMut(BatchProgress),
    {
        self.run(BatchMode::All, set, builder, on_progress)
    }

    /// Convert the items that don't already hold a result for their request.
    pub fn run_remaining<'s, R, B, P>(
        &self,
        set: &'s mut WorkingSet<R>,
        builder: B,
        on_progress: P,
    ) -> BatchRun<'s, 'c, R, D, S, P>
    where
        R: HandleReleaser,
        B: FnMut(&ConversionItem) -> ConversionRequest,
        P: FnMut(BatchProgress),
    {
        self.run(BatchMode::Remaining, set, builder, on_progress)
    }

    /// Start a run in `mode`. Requests are built up front, in item order.
    pub fn run<'s, R, B, P>(
        &self,
        mode: BatchMode,
        set: &'s mut WorkingSet<R>,
        builder: B,
        on_progress: P,
    ) -> BatchRun<'s, 'c, R, D, S, P>
    where
        R: HandleReleaser,
        B: FnMut(&ConversionItem) -> ConversionRequest,
        P: FnMut(BatchProgress),
    {
        let plan = BatchPlan::new(mode, set, builder);
        BatchRun {
            set,
            converter: self.converter,
            plan,
            on_progress,
        }
    }
}

/// The queued work and counts of one batch, owned apart from the set.
///
/// A plan borrows nothing, so a caller that has to yield between items can
/// hold it across calls and drive it with [`BatchPlan::step`]. [`BatchRun`]
/// is the iterator over a plan for callers that can borrow the set
/// throughout.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    queue: VecDeque<(ItemId, ConversionRequest)>,
    total: usize,
    completed: usize,
    summary: BatchSummary,
    stop: StopHandle,
    done: bool,
}

impl BatchPlan {
    /// Queue the items of `set` for `mode`, building each request now.
    pub fn new<R, B>(mode: BatchMode, set: &WorkingSet<R>, mut builder: B) -> Self
    where
        R: HandleReleaser,
        B: FnMut(&ConversionItem) -> ConversionRequest,
    {
        let queue: VecDeque<(ItemId, ConversionRequest)> = set
            .iter()
            .filter_map(|item| {
                let request = builder(item);
                match mode {
                    BatchMode::Remaining if item.is_converted_with(&request) => None,
                    _ => Some((item.id(), request)),
                }
            })
            .collect();

        let total = queue.len();
        info!(?mode, total, items = set.len(), "batch started");

        Self {
            queue,
            total,
            completed: 0,
            summary: BatchSummary::default(),
            stop: StopHandle::default(),
            done: false,
        }
    }

    /// Handle for stopping this batch from elsewhere.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request a stop before the next item.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Number of items this batch will process if not stopped.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Items processed so far, failed ones included.
    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Items still queued.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Counts so far.
    pub fn summary(&self) -> BatchSummary {
        self.summary
    }

    /// Whether a step has already returned `None`.
    pub fn is_finished(&self) -> bool {
        self.done
    }

    /// Convert the next queued item, or return `None` once the queue is
    /// empty or a stop was requested.
    pub fn step<R, D, S, P>(
        &mut self,
        set: &mut WorkingSet<R>,
        converter: &Converter<D, S>,
        on_progress: &mut P,
    ) -> Option<BatchOutcome>
    where
        R: HandleReleaser,
        D: Decoder,
        S: RasterSurface,
        P: FnMut(BatchProgress),
    {
        if self.done {
            return None;
        }
        if self.stop.is_stopped() && !self.queue.is_empty() {
            self.summary.stopped = true;
            self.queue.clear();
        }
        match self.queue.pop_front() {
            Some((id, request)) => {
                Some(self.process(set, converter, on_progress, id, request))
            }
            None => {
                self.end();
                None
            }
        }
    }

    fn process<R, D, S, P>(
        &mut self,
        set: &mut WorkingSet<R>,
        converter: &Converter<D, S>,
        on_progress: &mut P,
        id: ItemId,
        request: ConversionRequest,
    ) -> BatchOutcome
    where
        R: HandleReleaser,
        D: Decoder,
        S: RasterSurface,
        P: FnMut(BatchProgress),
    {
        let outcome = set
            .convert_item(id, request, converter)
            .and_then(|item| {
                ConvertedSummary::of(item)
                    .ok_or_else(|| ConvertError::Unknown(format!("item {} has no result", id)))
            });

        match &outcome {
            Ok(converted) => {
                self.summary.converted += 1;
                debug!(
                    %id,
                    format = ?converted.format,
                    bytes = converted.byte_size,
                    "item converted"
                );
            }
            Err(err) => {
                self.summary.failed += 1;
                warn!(
                    %id,
                    error = %err,
                    recoverable = err.is_recoverable(),
                    "item failed"
                );
            }
        }

        self.completed += 1;
        on_progress(BatchProgress {
            completed: self.completed,
            total: self.total,
        });

        BatchOutcome { id, outcome }
    }

    fn end(&mut self) {
        if !self.done {
            self.done = true;
            info!(
                converted = self.summary.converted,
                failed = self.summary.failed,
                stopped = self.summary.stopped,
                "batch finished"
            );
        }
    }
}

/// A batch run in progress. Yields one [`BatchOutcome`] per processed item.
///
/// Not restartable: once exhausted it only returns `None`.
pub struct BatchRun<'s, 'c, R: HandleReleaser, D, S, P> {
    set: &'s mut WorkingSet<R>,
    converter: &'c Converter<D, S>,
    plan: BatchPlan,
    on_progress: P,
}

impl<R, D, S, P> BatchRun<'_, '_, R, D, S, P>
where
    R: HandleReleaser,
    D: Decoder,
    S: RasterSurface,
    P: FnMut(BatchProgress),
{
    /// Handle for stopping this run from elsewhere.
    pub fn stop_handle(&self) -> StopHandle {
        self.plan.stop_handle()
    }

    /// Number of items this run will process if not stopped.
    pub fn total(&self) -> usize {
        self.plan.total()
    }

    /// Counts so far.
    pub fn summary(&self) -> BatchSummary {
        self.plan.summary()
    }

    /// Drive the run to its end and return the final counts.
    pub fn finish(mut self) -> BatchSummary {
        for _ in self.by_ref() {}
        self.plan.summary()
    }
}

impl<R, D, S, P> Iterator for BatchRun<'_, '_, R, D, S, P>
where
    R: HandleReleaser,
    D: Decoder,
    S: RasterSurface,
    P: FnMut(BatchProgress),
{
    type Item = BatchOutcome;

    fn next(&mut self) -> Option<BatchOutcome> {
        self.plan.step(self.set, self.converter, &mut self.on_progress)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.plan.is_finished() {
            (0, Some(0))
        } else {
            (0, Some(self.plan.remaining()))
        }
    }
}

impl<R, D, S, P> FusedIterator for BatchRun<'_, '_, R, D, S, P>
where
    R: HandleReleaser,
    D: Decoder,
    S: RasterSurface,
    P: FnMut(BatchProgress),
{
}
