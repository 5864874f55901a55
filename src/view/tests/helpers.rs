use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing_subscriber::EnvFilter;

use crate::ViewConfig;
use crate::cursor::{BoxCursor, Cursor, CursorError, EmptyCursor, RunId, TaggedCursor};
use crate::keys::{BytewiseComparator, Comparator};
use crate::merge::MergeCursor;
use crate::provider::{RunProvider, RunSet};
use crate::run::Run;
use crate::view::AnchorIndex;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn cmp() -> Arc<dyn Comparator> {
    Arc::new(BytewiseComparator)
}

/// Value stored for `key` in run `run`.
pub fn value_for(run: RunId, key: &[u8]) -> Vec<u8> {
    let mut v = format!("r{run}:").into_bytes();
    v.extend_from_slice(key);
    v
}

/// Run set with one level-0 file per entry of `runs`; run ids follow
/// slice order.
pub fn run_set<K: AsRef<[u8]>>(runs: &[Vec<K>]) -> RunSet {
    let mut builder = RunSet::builder(cmp());
    for (run, keys) in runs.iter().enumerate() {
        let entries = keys
            .iter()
            .map(|k| (k.as_ref().to_vec(), value_for(run, k.as_ref())))
            .collect();
        let sorted = Run::from_unsorted(entries, cmp()).expect("test run must not repeat keys");
        builder = builder.level(0, Arc::new(sorted));
    }
    builder.build()
}

pub fn config(key_num_perseg: usize) -> ViewConfig {
    ViewConfig {
        key_num_perseg,
        ..ViewConfig::default()
    }
}

/// Builds an index over `runs` with segment capacity `key_num_perseg`.
pub fn build_index<K: AsRef<[u8]>>(
    runs: &[Vec<K>],
    key_num_perseg: usize,
) -> Arc<AnchorIndex<RunSet>> {
    init_tracing();
    let index = AnchorIndex::build(Arc::new(run_set(runs)), config(key_num_perseg)).unwrap();
    Arc::new(index)
}

/// Keys of all runs in merged order, with the run each came from. A key
/// held by several runs is listed once per run, lower run id first.
pub fn merged<K: AsRef<[u8]>>(runs: &[Vec<K>]) -> Vec<(Vec<u8>, RunId)> {
    let mut all: Vec<(Vec<u8>, RunId)> = runs
        .iter()
        .enumerate()
        .flat_map(|(run, keys)| keys.iter().map(move |k| (k.as_ref().to_vec(), run)))
        .collect();
    all.sort();
    all
}

/// Spreads `total` distinct zero-padded keys over `runs_num` runs at random.
pub fn random_runs(rng: &mut StdRng, runs_num: usize, total: usize) -> Vec<Vec<Vec<u8>>> {
    let mut runs = vec![Vec::new(); runs_num];
    for i in 0..total {
        let key = format!("key{:06}", i * 3).into_bytes();
        runs[rng.random_range(0..runs_num)].push(key);
    }
    runs
}

/// Like [`random_runs`], but every key lands in one to three runs, so the
/// merged stream repeats keys.
pub fn random_overlapping_runs(
    rng: &mut StdRng,
    runs_num: usize,
    total: usize,
) -> Vec<Vec<Vec<u8>>> {
    let mut runs = vec![Vec::new(); runs_num];
    for i in 0..total {
        let key = format!("key{:06}", i * 3).into_bytes();
        let copies = rng.random_range(1..=runs_num.min(3));
        let mut owners: Vec<usize> = (0..runs_num).collect();
        owners.shuffle(rng);
        for &run in &owners[..copies] {
            runs[run].push(key.clone());
        }
    }
    runs
}

/// Walks the index forward from the first key, collecting `(key, value)`.
pub fn scan_all<C: Cursor + ?Sized>(cursor: &mut C) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    cursor.seek_to_first();
    while cursor.valid() {
        out.push((cursor.key().to_vec(), cursor.value().to_vec()));
        cursor.next();
    }
    out
}

/// Asserts every structural invariant of a built index.
pub fn check_invariants<P: RunProvider>(index: &AnchorIndex<P>) {
    let cmp = Arc::clone(index.comparator());
    let cap = index.config().key_num_perseg;
    let mut previous: Option<Vec<u8>> = None;
    let mut rows = 0;

    assert!(index.segment_count() <= index.max_segment_size());

    for (seg_idx, segment) in index.segments().iter().enumerate() {
        assert!(!segment.is_empty(), "segment {seg_idx} is empty");
        assert!(segment.len() <= cap, "segment {seg_idx} exceeds capacity");
        assert_eq!(index.anchor(seg_idx), segment.first_key());

        let mut seen = vec![0usize; index.runs_num()];
        for row in segment.rows() {
            if let Some(prev) = &previous {
                assert_ne!(
                    cmp.compare(prev, &row.key),
                    std::cmp::Ordering::Greater,
                    "rows out of order in segment {seg_idx}"
                );
            }
            previous = Some(row.key.clone());

            assert_eq!(row.step, seen[row.run], "bad step in segment {seg_idx}");
            if row.step == 0 {
                assert_eq!(segment.reference_key(row.run), Some(row.key.as_slice()));
            }
            seen[row.run] += 1;
            rows += 1;
        }

        for (run, count) in seen.iter().enumerate() {
            assert_eq!(segment.run_count(run), *count);
            assert_eq!(segment.reference_key(run).is_some(), *count > 0);
        }
        assert_eq!(
            segment.cached_cursors(),
            seen.iter().filter(|c| **c > 0).count()
        );
    }
    assert_eq!(index.len(), rows);

    let anchors: Vec<&[u8]> = index.anchors().collect();
    for pair in anchors.windows(2) {
        assert_ne!(cmp.compare(pair[0], pair[1]), std::cmp::Ordering::Greater);
    }
}

// ------------------------------------------------------------------------------------------------
// Fault injection
// ------------------------------------------------------------------------------------------------

/// Provider wrapper that fails on demand.
pub struct FaultyProvider {
    pub inner: RunSet,

    /// Served by `new_run_cursor` instead of `inner` while `diverged` is set.
    pub replacement: Option<RunSet>,

    /// Child of the merge cursor replaced by an error-carrying cursor.
    pub broken_merge_child: Option<RunId>,

    /// `merge_cursor()` itself fails.
    pub merge_unavailable: bool,

    /// Reported by the merge cursor in place of the real run count.
    pub reported_runs: Option<usize>,

    pub fail_run_cursors: AtomicBool,
    pub diverged: AtomicBool,
}

impl FaultyProvider {
    pub fn new(inner: RunSet) -> Self {
        Self {
            inner,
            replacement: None,
            broken_merge_child: None,
            merge_unavailable: false,
            reported_runs: None,
            fail_run_cursors: AtomicBool::new(false),
            diverged: AtomicBool::new(false),
        }
    }
}

/// Merge cursor that misreports its run count.
struct MiscountedMerge {
    inner: MergeCursor,
    runs_num: usize,
}

impl Cursor for MiscountedMerge {
    fn valid(&self) -> bool {
        self.inner.valid()
    }
    fn seek_to_first(&mut self) {
        self.inner.seek_to_first()
    }
    fn seek_to_last(&mut self) {
        self.inner.seek_to_last()
    }
    fn seek(&mut self, target: &[u8]) {
        self.inner.seek(target)
    }
    fn next(&mut self) {
        self.inner.next()
    }
    fn prev(&mut self) {
        self.inner.prev()
    }
    fn key(&self) -> &[u8] {
        self.inner.key()
    }
    fn value(&self) -> &[u8] {
        self.inner.value()
    }
    fn status(&self) -> Result<(), CursorError> {
        self.inner.status()
    }
}

impl TaggedCursor for MiscountedMerge {
    fn provenance_tag(&self) -> RunId {
        self.inner.provenance_tag()
    }
    fn runs_num(&self) -> usize {
        self.runs_num
    }
}

impl RunProvider for FaultyProvider {
    fn runs_num(&self) -> usize {
        self.inner.runs_num()
    }

    fn comparator(&self) -> Arc<dyn Comparator> {
        self.inner.comparator()
    }

    fn merge_cursor(&self) -> Result<Box<dyn TaggedCursor>, CursorError> {
        if self.merge_unavailable {
            return Err(CursorError::Internal("merge cursor unavailable".into()));
        }

        let children: Vec<BoxCursor> = (0..self.inner.runs_num())
            .map(|run| -> BoxCursor {
                if self.broken_merge_child == Some(run) {
                    Box::new(EmptyCursor::with_error(CursorError::Corruption(format!(
                        "run {run} unreadable"
                    ))))
                } else {
                    Box::new(self.inner.run(run).unwrap().cursor())
                }
            })
            .collect();
        let merge = MergeCursor::new(self.comparator(), children);

        match self.reported_runs {
            Some(runs_num) => Ok(Box::new(MiscountedMerge {
                inner: merge,
                runs_num,
            })),
            None => Ok(Box::new(merge)),
        }
    }

    fn new_run_cursor(&self, run: RunId) -> Result<BoxCursor, CursorError> {
        if self.fail_run_cursors.load(Ordering::SeqCst) {
            return Err(CursorError::Corruption(format!("run {run} cursor failed")));
        }
        match (&self.replacement, self.diverged.load(Ordering::SeqCst)) {
            (Some(replacement), true) => replacement.new_run_cursor(run),
            _ => self.inner.new_run_cursor(run),
        }
    }
}
