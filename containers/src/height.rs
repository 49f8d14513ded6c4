use serde::{Deserialize, Serialize};
use std::fmt;

/// Block height (index) on the chain.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Height(pub u64);

impl Height {
    pub const MAX: Height = Height(u64::MAX);

    /// The height directly above this one, saturating at `Height::MAX`.
    pub fn next(self) -> Height {
        Height(self.0.saturating_add(1))
    }

    /// Iterate every height in `[self, end]`.
    ///
    /// Yields nothing when `end` is below `self`.
    pub fn up_to(self, end: Height) -> impl Iterator<Item = Height> {
        (self.0..=end.0).map(Height)
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Height {
    fn from(value: u64) -> Self {
        Height(value)
    }
}
