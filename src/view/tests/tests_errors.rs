//! Provider failure tests.
//!
//! Build-time failures abort the build and surface as `ViewError`.
//! Query-time failures leave the iterator invalid with the provider's error
//! in `status()`; the next successful seek clears it.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use crate::cursor::{Cursor, CursorError};
    use crate::view::tests::helpers::*;
    use crate::view::{AnchorIndex, ViewError};

    fn faulty(runs: &[Vec<&str>]) -> FaultyProvider {
        init_tracing();
        FaultyProvider::new(run_set(runs))
    }

    // ----------------------------------------------------------------
    // Build
    // ----------------------------------------------------------------

    #[test]
    fn unavailable_merge_cursor_fails_build() {
        let provider = FaultyProvider {
            merge_unavailable: true,
            ..faulty(&[vec!["a"]])
        };

        let err = AnchorIndex::build(Arc::new(provider), config(2)).unwrap_err();
        assert!(matches!(err, ViewError::Provider(CursorError::Internal(_))));
    }

    /// # Scenario
    /// One run cannot be read during the build pass.
    ///
    /// # Expected behavior
    /// The merge cursor's error status is checked after the pass and the
    /// build fails with it; no partial index is returned.
    #[test]
    fn merge_status_error_fails_build() {
        let provider = FaultyProvider {
            broken_merge_child: Some(1),
            ..faulty(&[vec!["a", "c"], vec!["b"]])
        };

        let err = AnchorIndex::build(Arc::new(provider), config(2)).unwrap_err();
        match err {
            ViewError::Provider(CursorError::Corruption(msg)) => {
                assert_eq!(msg, "run 1 unreadable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn miscounted_merge_cursor_fails_build() {
        let provider = FaultyProvider {
            reported_runs: Some(3),
            ..faulty(&[vec!["a"], vec!["b"]])
        };

        let err = AnchorIndex::build(Arc::new(provider), config(2)).unwrap_err();
        assert!(matches!(err, ViewError::Internal(_)));
    }

    #[test]
    fn run_cursor_failure_during_build_fails_build() {
        let provider = faulty(&[vec!["a"]]);
        provider.fail_run_cursors.store(true, Ordering::SeqCst);

        let err = AnchorIndex::build(Arc::new(provider), config(2)).unwrap_err();
        assert!(matches!(err, ViewError::Provider(CursorError::Corruption(_))));
    }

    // ----------------------------------------------------------------
    // Query
    // ----------------------------------------------------------------

    /// # Scenario
    /// The provider stops handing out run cursors after the build.
    ///
    /// # Actions
    /// 1. Seek while cursors fail.
    /// 2. Restore the provider and seek again.
    ///
    /// # Expected behavior
    /// 1. Invalid, with the provider's error in `status()`.
    /// 2. Valid again, status cleared.
    #[test]
    fn seek_failure_invalidates_then_recovers() {
        let index = Arc::new(
            AnchorIndex::build(Arc::new(faulty(&[vec!["a", "c"], vec!["b"]])), config(2)).unwrap(),
        );
        let mut it = index.new_iterator();

        index.provider().fail_run_cursors.store(true, Ordering::SeqCst);
        it.seek(b"b");
        assert!(!it.valid());
        assert_eq!(it.position(), None);
        assert!(matches!(it.status(), Err(CursorError::Corruption(_))));

        index.provider().fail_run_cursors.store(false, Ordering::SeqCst);
        it.seek(b"b");
        assert!(it.valid());
        assert_eq!(it.key(), b"b");
        assert_eq!(it.status(), Ok(()));
    }

    #[test]
    fn next_across_runs_fails_when_cursor_unavailable() {
        let index = Arc::new(
            AnchorIndex::build(Arc::new(faulty(&[vec!["a", "c"], vec!["b"]])), config(4)).unwrap(),
        );
        let mut it = index.new_iterator();
        it.seek_to_first();
        assert_eq!(it.key(), b"a");

        index.provider().fail_run_cursors.store(true, Ordering::SeqCst);
        it.next();
        assert!(!it.valid());
        assert!(it.status().is_err());
    }

    /// # Scenario
    /// Steps that stay on the same run never ask the provider for a cursor.
    ///
    /// # Expected behavior
    /// With cursor creation failing, a scan of a single run started before
    /// the failure still completes.
    #[test]
    fn same_run_steps_survive_provider_failure() {
        let index = Arc::new(
            AnchorIndex::build(Arc::new(faulty(&[vec!["a", "b", "c", "d"]])), config(2)).unwrap(),
        );
        let mut it = index.new_iterator();
        it.seek_to_first();

        index.provider().fail_run_cursors.store(true, Ordering::SeqCst);
        let mut seen = Vec::new();
        while it.valid() {
            seen.push(it.key().to_vec());
            it.next();
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(it.status(), Ok(()));
    }

    /// # Scenario
    /// The store changed underneath the index.
    ///
    /// # Starting environment
    /// Index built over run 0 = {a, b, c}; afterwards the provider serves
    /// run 0 = {a, b0, b1, c}.
    ///
    /// # Expected behavior
    /// Replaying two steps from `a` lands on `b1`, not `c`: the iterator
    /// reports corruption instead of returning the wrong entry.
    #[test]
    fn diverged_run_is_reported_as_corruption() {
        let provider = FaultyProvider {
            replacement: Some(run_set(&[vec!["a", "b0", "b1", "c"]])),
            ..faulty(&[vec!["a", "b", "c"]])
        };
        let index = Arc::new(AnchorIndex::build(Arc::new(provider), config(4)).unwrap());
        let mut it = index.new_iterator();

        index.provider().diverged.store(true, Ordering::SeqCst);
        it.seek(b"c");
        assert!(!it.valid());
        assert!(matches!(it.status(), Err(CursorError::Corruption(_))));

        // The reference key itself still resolves.
        it.seek(b"a");
        assert_eq!(it.key(), b"a");
        assert_eq!(it.status(), Ok(()));
    }

    // ----------------------------------------------------------------
    // Display
    // ----------------------------------------------------------------

    #[test]
    fn errors_render_readably() {
        assert_eq!(
            ViewError::DuplicateKey(b"abc".to_vec()).to_string(),
            "Duplicate key (3 bytes)"
        );
        assert_eq!(
            ViewError::RunOutOfRange {
                run: 4,
                runs_num: 2
            }
            .to_string(),
            "Run 4 out of range (runs_num = 2)"
        );
        assert_eq!(
            ViewError::from(CursorError::RunNotFound(1)).to_string(),
            "Provider error: Run 1 not found"
        );
    }
}
