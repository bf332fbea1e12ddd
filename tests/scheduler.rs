use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use mathpad::{Edit, PreviewScheduler, RenderPipeline, RenderResult};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, sleep_until};

const WINDOW: Duration = Duration::from_millis(200);

/// Records when each run starts and takes `delay` to finish.
#[derive(Clone)]
struct RecordingPipeline {
    runs: Rc<RefCell<Vec<(Duration, Edit)>>>,
    start: Instant,
    delay: Duration,
}

impl RecordingPipeline {
    fn new(start: Instant, delay: Duration) -> Self {
        Self {
            runs: Rc::default(),
            start,
            delay,
        }
    }

    fn runs(&self) -> Vec<(Duration, Edit)> {
        self.runs.borrow().clone()
    }
}

impl RenderPipeline for RecordingPipeline {
    fn render(&mut self, edit: &Edit) -> impl Future<Output = RenderResult> {
        self.runs
            .borrow_mut()
            .push((Instant::now() - self.start, edit.clone()));
        let delay = self.delay;
        let sequence = edit.sequence;
        let html = format!("<p>{}</p>\n", edit.text);
        async move {
            sleep(delay).await;
            RenderResult {
                sequence,
                html,
                has_math: false,
                placeholders: Vec::new(),
                fallback: false,
            }
        }
    }
}

async fn drain(mut commits: mpsc::Receiver<RenderResult>) -> Vec<RenderResult> {
    let mut committed = Vec::new();
    while let Some(result) = commits.recv().await {
        committed.push(result);
    }
    committed
}

/// Sends `text` at each offset from `start`, then keeps the channel open until `close_at`.
async fn feed(edits: mpsc::Sender<String>, start: Instant, schedule: &[(u64, &str)], close_at: u64) {
    for &(at, text) in schedule {
        sleep_until(start + Duration::from_millis(at)).await;
        edits.send(text.to_string()).await.expect("scheduler alive");
    }
    sleep_until(start + Duration::from_millis(close_at)).await;
}

#[tokio::test(start_paused = true)]
async fn burst_within_window_runs_once_with_latest_text() {
    let start = Instant::now();
    let pipeline = RecordingPipeline::new(start, Duration::ZERO);
    let (edit_tx, edit_rx) = mpsc::channel(16);
    let (commit_tx, commit_rx) = mpsc::channel(16);
    let scheduler = PreviewScheduler::new(pipeline.clone(), WINDOW, edit_rx, commit_tx);

    let schedule = [(0, "a"), (50, "ab"), (80, "abc")];
    let (_, _, committed) = tokio::join!(
        scheduler.run(),
        feed(edit_tx, start, &schedule, 1_000),
        drain(commit_rx)
    );

    let runs = pipeline.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].0, Duration::from_millis(280));
    assert_eq!(runs[0].1, Edit::new(3, "abc"));

    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].sequence, 3);
    assert_eq!(committed[0].html, "<p>abc</p>\n");
}

#[tokio::test(start_paused = true)]
async fn spaced_edits_each_run() {
    let start = Instant::now();
    let pipeline = RecordingPipeline::new(start, Duration::ZERO);
    let (edit_tx, edit_rx) = mpsc::channel(16);
    let (commit_tx, commit_rx) = mpsc::channel(16);
    let scheduler = PreviewScheduler::new(pipeline.clone(), WINDOW, edit_rx, commit_tx);

    let schedule = [(0, "one"), (300, "two"), (600, "three")];
    let (_, _, committed) = tokio::join!(
        scheduler.run(),
        feed(edit_tx, start, &schedule, 2_000),
        drain(commit_rx)
    );

    let started: Vec<_> = pipeline.runs().iter().map(|(at, _)| *at).collect();
    assert_eq!(
        started,
        vec![
            Duration::from_millis(200),
            Duration::from_millis(500),
            Duration::from_millis(800)
        ]
    );
    let sequences: Vec<_> = committed.iter().map(|result| result.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn edit_during_slow_run_discards_stale_result() {
    let start = Instant::now();
    let pipeline = RecordingPipeline::new(start, Duration::from_millis(100));
    let (edit_tx, edit_rx) = mpsc::channel(16);
    let (commit_tx, commit_rx) = mpsc::channel(16);
    let scheduler = PreviewScheduler::new(pipeline.clone(), WINDOW, edit_rx, commit_tx);

    // The first run covers 200..300ms; "new" lands in the middle of it.
    let schedule = [(0, "old"), (250, "new")];
    let (_, _, committed) = tokio::join!(
        scheduler.run(),
        feed(edit_tx, start, &schedule, 2_000),
        drain(commit_rx)
    );

    let runs = pipeline.runs();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0], (Duration::from_millis(200), Edit::new(1, "old")));
    // Pending is re-entered when the superseded run completes at 300ms.
    assert_eq!(runs[1], (Duration::from_millis(500), Edit::new(2, "new")));

    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].sequence, 2);
    assert_eq!(committed[0].html, "<p>new</p>\n");
}

#[tokio::test(start_paused = true)]
async fn closing_the_edit_channel_flushes_pending_edit() {
    let start = Instant::now();
    let pipeline = RecordingPipeline::new(start, Duration::ZERO);
    let (edit_tx, edit_rx) = mpsc::channel(16);
    let (commit_tx, commit_rx) = mpsc::channel(16);
    let scheduler = PreviewScheduler::new(pipeline.clone(), WINDOW, edit_rx, commit_tx);

    let schedule = [(0, "draft"), (10, "final")];
    let (_, _, committed) = tokio::join!(
        scheduler.run(),
        feed(edit_tx, start, &schedule, 20),
        drain(commit_rx)
    );

    let runs = pipeline.runs();
    assert_eq!(runs, vec![(Duration::from_millis(20), Edit::new(2, "final"))]);
    assert_eq!(committed.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn commits_are_strictly_increasing() {
    let start = Instant::now();
    let pipeline = RecordingPipeline::new(start, Duration::from_millis(150));
    let (edit_tx, edit_rx) = mpsc::channel(64);
    let (commit_tx, commit_rx) = mpsc::channel(64);
    let scheduler = PreviewScheduler::new(pipeline.clone(), WINDOW, edit_rx, commit_tx);

    let texts: Vec<String> = (0..20).map(|n| format!("edit {n}")).collect();
    let schedule: Vec<(u64, &str)> = texts
        .iter()
        .enumerate()
        .map(|(n, text)| (n as u64 * 250, text.as_str()))
        .collect();
    let (_, _, committed) = tokio::join!(
        scheduler.run(),
        feed(edit_tx, start, &schedule, 10_000),
        drain(commit_rx)
    );

    assert!(!committed.is_empty());
    assert!(committed.windows(2).all(|pair| pair[0].sequence < pair[1].sequence));
    let last = committed.last().expect("at least one commit");
    assert_eq!(last.sequence, 20);
    assert_eq!(last.html, "<p>edit 19</p>\n");
}
