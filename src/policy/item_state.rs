use std::fmt;

/// Refresh state of a single item key
///
/// ```text
/// Unseen --fetch ok--> Fresh[T] --now >= T--> Stale --fetch ok--> Fresh[T'] ...
/// ```
///
/// A failed fetch never moves an item: it stays `Unseen`, `Fresh` or `Stale`
/// with its previous `next_eligible_at`. There is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemState {
    /// No record exists for the key
    Unseen,

    /// A record exists and `now < next_eligible_at`
    Fresh,

    /// A record exists and `now >= next_eligible_at`
    Stale,
}

impl ItemState {
    /// Returns true if an item in this state should be (re)fetched
    pub fn should_fetch(&self) -> bool {
        !matches!(self, Self::Fresh)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unseen => "unseen",
            Self::Fresh => "fresh",
            Self::Stale => "stale",
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
