use std::fmt;

use serde::{Deserialize, Serialize};

const UNBOUNDED_MAX: i32 = -1;

/// Hop-count window a read statement may traverse from its anchor.
///
/// Built from a caller depth by clamping: `max = max(0, depth)` and
/// `min = min(0, max)`. Negative depths therefore collapse onto `DepthBound::new(0)`
/// and never mean "unbounded"; unbounded traversal is only reachable through
/// [`DepthBound::unbounded`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DepthBound {
    min: i32,
    max: i32,
}

impl DepthBound {
    pub fn new(depth: i32) -> Self {
        let max = depth.max(0);
        let min = max.min(0);
        Self { min, max }
    }

    pub const fn unbounded() -> Self {
        Self {
            min: 0,
            max: UNBOUNDED_MAX,
        }
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn is_unbounded(&self) -> bool {
        self.max == UNBOUNDED_MAX
    }

    /// True when no relationship is traversed at all.
    pub fn is_zero(&self) -> bool {
        self.max == 0
    }

    /// Whether a traversal that already took `taken` hops may take one more.
    pub fn allows(&self, taken: u32) -> bool {
        self.is_unbounded() || i64::from(taken) < i64::from(self.max)
    }

    /// Window left after `hops` have already been taken from the anchor.
    pub fn after(&self, hops: i32) -> Self {
        if self.is_unbounded() {
            *self
        } else {
            Self::new(self.max - hops)
        }
    }

    /// Variable-length pattern fragment, e.g. `*0..2` or `*0..`.
    pub fn pattern(&self) -> String {
        if self.is_unbounded() {
            format!("*{}..", self.min)
        } else {
            format!("*{}..{}", self.min, self.max)
        }
    }
}

impl Default for DepthBound {
    fn default() -> Self {
        Self::new(1)
    }
}

impl From<i32> for DepthBound {
    fn from(depth: i32) -> Self {
        Self::new(depth)
    }
}

impl fmt::Display for DepthBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            write!(f, "[{}..]", self.min)
        } else {
            write!(f, "[{}..{}]", self.min, self.max)
        }
    }
}
