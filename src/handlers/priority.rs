//! # Priority levels and continuation decisions.
//!
//! Handlers are ordered by [`Priority`], highest precedence first:
//!
//! ```text
//! FirstOne ─► First ─► Secondary ─► Normal ─► Unimportant ─► AllowNotRun ─► LastOne
//! (slot)      └──────────────── buckets (insertion order) ────────────┘     (slot)
//! ```
//!
//! ## Rules
//! - `FirstOne` and `LastOne` are singleton slots: at most one handler each.
//! - `FirstOne` runs before interception is checked; `LastOne` runs even when the
//!   event was intercepted.
//! - Buckets keep insertion order; a handler lives in exactly one bucket or slot.

/// Ordered priority tier of a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    /// Singleton slot, runs first and is never skipped by interception.
    FirstOne,
    First,
    Secondary,
    #[default]
    Normal,
    Unimportant,
    AllowNotRun,
    /// Singleton slot, runs last and is never skipped by interception.
    LastOne,
}

impl Priority {
    /// Bucketed levels in walk order.
    pub const BUCKETED: [Priority; 5] = [
        Priority::First,
        Priority::Secondary,
        Priority::Normal,
        Priority::Unimportant,
        Priority::AllowNotRun,
    ];

    /// True for `FirstOne` and `LastOne`.
    #[inline]
    pub const fn is_singleton(self) -> bool {
        matches!(self, Priority::FirstOne | Priority::LastOne)
    }

    /// Position in [`Priority::BUCKETED`]; `None` for the singleton slots.
    #[inline]
    pub(crate) const fn bucket_index(self) -> Option<usize> {
        match self {
            Priority::FirstOne | Priority::LastOne => None,
            Priority::First => Some(0),
            Priority::Secondary => Some(1),
            Priority::Normal => Some(2),
            Priority::Unimportant => Some(3),
            Priority::AllowNotRun => Some(4),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub const fn as_label(self) -> &'static str {
        match self {
            Priority::FirstOne => "first_one",
            Priority::First => "first",
            Priority::Secondary => "secondary",
            Priority::Normal => "normal",
            Priority::Unimportant => "unimportant",
            Priority::AllowNotRun => "allow_not_run",
            Priority::LastOne => "last_one",
        }
    }
}

/// What a handler wants after an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Decision {
    /// Stay registered.
    #[default]
    Continue,
    /// Remove this handler once the current invocation returns.
    Unregister,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_precedence() {
        assert!(Priority::FirstOne < Priority::First);
        assert!(Priority::Secondary < Priority::Normal);
        assert!(Priority::AllowNotRun < Priority::LastOne);
        let mut sorted = Priority::BUCKETED;
        sorted.sort();
        assert_eq!(sorted, Priority::BUCKETED);
    }

    #[test]
    fn bucket_index_matches_walk_order() {
        for (i, level) in Priority::BUCKETED.iter().enumerate() {
            assert_eq!(level.bucket_index(), Some(i));
            assert!(!level.is_singleton());
        }
        assert_eq!(Priority::FirstOne.bucket_index(), None);
        assert_eq!(Priority::LastOne.bucket_index(), None);
        assert!(Priority::FirstOne.is_singleton());
        assert!(Priority::LastOne.is_singleton());
    }

    #[test]
    fn defaults() {
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(Decision::default(), Decision::Continue);
    }
}
