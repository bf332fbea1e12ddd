//! Debounced, cancellation-aware scheduling of pipeline runs.
//!
//! [`Debouncer`] is the state machine on its own, driven by explicit instants so it can
//! be exercised without a runtime. [`PreviewScheduler`] drives it on a single task:
//! edits come in over an `mpsc` channel, committed results go out over another.
//!
//! Ordering is enforced by sequence numbers, not by aborting work. A run that is
//! overtaken by a newer edit completes normally and its result is discarded.

use std::future::{self, Future};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use crate::pipeline::{Edit, RenderResult, Renderer};

/// A pipeline the scheduler can run for one edit.
pub trait RenderPipeline {
    fn render(&mut self, edit: &Edit) -> impl Future<Output = RenderResult>;
}

impl RenderPipeline for Renderer {
    fn render(&mut self, edit: &Edit) -> impl Future<Output = RenderResult> {
        future::ready(self.render_edit(edit))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DebounceState {
    #[default]
    Idle,
    /// Timer armed for `edit`.
    Pending { deadline: Instant, edit: Edit },
    /// The pipeline is running for `sequence`.
    Rendering { sequence: u64 },
}

/// What to do with a finished run's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Newest result so far: apply it to the display.
    Commit(RenderResult),
    /// A newer edit arrived while the run was in flight; the result is discarded.
    Superseded { sequence: u64 },
    /// Not newer than the last committed result; discarded.
    Stale { sequence: u64 },
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    state: DebounceState,
    /// Edit that arrived while rendering; at most one, the latest.
    queued: Option<Edit>,
    latest_sequence: u64,
    last_committed: Option<u64>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: DebounceState::Idle,
            queued: None,
            latest_sequence: 0,
            last_committed: None,
        }
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    pub fn last_committed(&self) -> Option<u64> {
        self.last_committed
    }

    /// Registers a new edit and returns its sequence number. A pending edit is
    /// superseded and the timer rearmed; during a run the edit is queued.
    pub fn submit(&mut self, text: impl Into<String>, now: Instant) -> u64 {
        self.latest_sequence += 1;
        let edit = Edit::new(self.latest_sequence, text);
        let sequence = edit.sequence;

        if let DebounceState::Rendering { sequence: running } = self.state {
            trace!(sequence, running, "edit queued behind running pipeline");
            self.queued = Some(edit);
            return sequence;
        }

        match &self.state {
            DebounceState::Pending { edit: pending, .. } => {
                trace!(sequence, superseded = pending.sequence, "timer rearmed")
            }
            _ => trace!(sequence, "timer armed"),
        }
        self.state = DebounceState::Pending {
            deadline: now + self.window,
            edit,
        };
        sequence
    }

    /// When the armed timer fires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DebounceState::Pending { deadline, .. } => Some(*deadline),
            _ => None,
        }
    }

    /// Moves to `Rendering` and hands out the pending edit once its deadline passed.
    pub fn fire(&mut self, now: Instant) -> Option<Edit> {
        if self.deadline().is_some_and(|deadline| deadline <= now) {
            self.start_rendering()
        } else {
            None
        }
    }

    /// Hands out the pending edit regardless of its deadline.
    pub fn flush(&mut self) -> Option<Edit> {
        match self.state {
            DebounceState::Pending { .. } => self.start_rendering(),
            _ => None,
        }
    }

    fn start_rendering(&mut self) -> Option<Edit> {
        let DebounceState::Pending { edit, .. } = std::mem::take(&mut self.state) else {
            return None;
        };
        debug!(sequence = edit.sequence, "pipeline run started");
        self.state = DebounceState::Rendering {
            sequence: edit.sequence,
        };
        Some(edit)
    }

    /// Settles a finished run. When an edit was queued during the run, `Pending` is
    /// re-entered for it with a fresh window.
    pub fn finish(&mut self, result: RenderResult, now: Instant) -> Completion {
        if let DebounceState::Rendering { .. } = self.state {
            self.state = match self.queued.take() {
                Some(edit) => DebounceState::Pending {
                    deadline: now + self.window,
                    edit,
                },
                None => DebounceState::Idle,
            };
        }

        let sequence = result.sequence;
        if sequence < self.latest_sequence {
            debug!(sequence, latest = self.latest_sequence, "discarded superseded result");
            return Completion::Superseded { sequence };
        }
        if self.last_committed.is_some_and(|last| sequence <= last) {
            debug!(sequence, last_committed = ?self.last_committed, "discarded stale result");
            return Completion::Stale { sequence };
        }

        self.last_committed = Some(sequence);
        debug!(sequence, "committed result");
        Completion::Commit(result)
    }
}

/// Runs a [`RenderPipeline`] behind a [`Debouncer`] on the current task.
pub struct PreviewScheduler<P> {
    pipeline: P,
    debouncer: Debouncer,
    edits: mpsc::Receiver<String>,
    commits: mpsc::Sender<RenderResult>,
}

impl<P: RenderPipeline> PreviewScheduler<P> {
    pub fn new(
        pipeline: P,
        window: Duration,
        edits: mpsc::Receiver<String>,
        commits: mpsc::Sender<RenderResult>,
    ) -> Self {
        Self {
            pipeline,
            debouncer: Debouncer::new(window),
            edits,
            commits,
        }
    }

    /// Processes edits until the edit channel closes. A pending edit is rendered
    /// immediately on close. Also returns early when the commit receiver is dropped.
    pub async fn run(mut self) -> P {
        let mut open = true;
        loop {
            if !open {
                match self.debouncer.flush() {
                    Some(edit) => {
                        if !self.render(edit, &mut open).await {
                            break;
                        }
                        continue;
                    }
                    None => break,
                }
            }

            let deadline = self.debouncer.deadline();
            tokio::select! {
                received = self.edits.recv() => match received {
                    Some(text) => {
                        self.debouncer.submit(text, Instant::now());
                    }
                    None => open = false,
                },
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(edit) = self.debouncer.fire(Instant::now())
                        && !self.render(edit, &mut open).await
                    {
                        break;
                    }
                }
            }
        }
        debug!(last_committed = ?self.debouncer.last_committed(), "scheduler stopped");
        self.pipeline
    }

    /// Runs the pipeline for `edit`, still accepting edits meanwhile. Returns `false`
    /// once nobody listens for commits.
    async fn render(&mut self, edit: Edit, open: &mut bool) -> bool {
        let run = self.pipeline.render(&edit);
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                result = &mut run => break result,
                received = self.edits.recv(), if *open => match received {
                    Some(text) => {
                        self.debouncer.submit(text, Instant::now());
                    }
                    None => *open = false,
                },
            }
        };

        match self.debouncer.finish(result, Instant::now()) {
            Completion::Commit(result) => self.commits.send(result).await.is_ok(),
            Completion::Superseded { .. } | Completion::Stale { .. } => true,
        }
    }
}
