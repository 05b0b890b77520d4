//! C2 — Conflict Resolver: a pure decision function over two metadata
//! snapshots and a strategy (§4.2).

use crate::task::ConflictStrategy;

/// Lightweight (size, mtime) snapshot of one side of a potential conflict.
/// No hashing at this layer — that's the hash-method per-file sync's job
/// (§4.3), layered on top of this probe.
#[derive(Debug, Clone, Copy)]
pub struct FileMeta {
    pub exists: bool,
    pub size: u64,
    pub mtime: u64,
}

impl FileMeta {
    pub fn absent() -> Self {
        Self { exists: false, size: 0, mtime: 0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Copy,
    KeepBoth,
    Skip,
}

/// Callback invoked for `ConflictStrategy::AskUser`. Must not block the
/// caller indefinitely — the queue worker is single-threaded and this runs
/// inline on it (§9's "callbacks must not block the caller").
pub trait AskUserCallback: Send + Sync {
    fn resolve(&self, source: &FileMeta, target: &FileMeta) -> Verdict;
}

/// A conflict exists unless either side is absent, or size and mtime match
/// bit-for-bit (§4.2's probe — no hashing here).
pub fn conflict_exists(source: &FileMeta, target: &FileMeta) -> bool {
    if !source.exists || !target.exists {
        return false;
    }
    !(source.size == target.size && source.mtime == target.mtime)
}

/// Resolve a conflict per the decision table in §4.2.
pub fn resolve(
    source: &FileMeta,
    target: &FileMeta,
    strategy: ConflictStrategy,
    ask_user: Option<&dyn AskUserCallback>,
) -> Verdict {
    match strategy {
        ConflictStrategy::NewestWins => match source.mtime.cmp(&target.mtime) {
            std::cmp::Ordering::Greater => Verdict::Copy,
            std::cmp::Ordering::Less => Verdict::Skip,
            std::cmp::Ordering::Equal => Verdict::Skip,
        },
        ConflictStrategy::SourceWins => Verdict::Copy,
        ConflictStrategy::TargetWins => Verdict::Skip,
        ConflictStrategy::KeepBoth => Verdict::KeepBoth,
        ConflictStrategy::Skip => Verdict::Skip,
        ConflictStrategy::AskUser => match ask_user {
            Some(cb) => cb.resolve(source, target),
            None => Verdict::Skip,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(size: u64, mtime: u64) -> FileMeta {
        FileMeta { exists: true, size, mtime }
    }

    #[test]
    fn no_conflict_when_metadata_matches() {
        assert!(!conflict_exists(&meta(10, 5), &meta(10, 5)));
    }

    #[test]
    fn no_conflict_when_either_side_absent() {
        assert!(!conflict_exists(&FileMeta::absent(), &meta(10, 5)));
        assert!(!conflict_exists(&meta(10, 5), &FileMeta::absent()));
    }

    #[test]
    fn conflict_when_metadata_differs() {
        assert!(conflict_exists(&meta(10, 5), &meta(11, 5)));
    }

    #[test]
    fn newest_wins_is_antisymmetric_up_to_strict_greater() {
        assert_eq!(resolve(&meta(1, 10), &meta(1, 5), ConflictStrategy::NewestWins, None), Verdict::Copy);
        assert_eq!(resolve(&meta(1, 5), &meta(1, 10), ConflictStrategy::NewestWins, None), Verdict::Skip);
        assert_eq!(resolve(&meta(1, 5), &meta(1, 5), ConflictStrategy::NewestWins, None), Verdict::Skip);
    }

    #[test]
    fn source_wins_always_copies() {
        assert_eq!(resolve(&meta(1, 1), &meta(9, 9), ConflictStrategy::SourceWins, None), Verdict::Copy);
    }

    #[test]
    fn target_wins_always_skips() {
        assert_eq!(resolve(&meta(1, 9), &meta(9, 1), ConflictStrategy::TargetWins, None), Verdict::Skip);
    }

    #[test]
    fn ask_user_without_callback_behaves_as_skip() {
        assert_eq!(resolve(&meta(1, 1), &meta(2, 2), ConflictStrategy::AskUser, None), Verdict::Skip);
    }

    struct AlwaysCopy;
    impl AskUserCallback for AlwaysCopy {
        fn resolve(&self, _source: &FileMeta, _target: &FileMeta) -> Verdict {
            Verdict::Copy
        }
    }

    #[test]
    fn ask_user_delegates_to_callback() {
        assert_eq!(resolve(&meta(1, 1), &meta(2, 2), ConflictStrategy::AskUser, Some(&AlwaysCopy)), Verdict::Copy);
    }
}
