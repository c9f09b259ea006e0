use serde::{Deserialize, Serialize};

/// Opaque identifier of one logical tile.
///
/// A handle never owns tile memory, it only names the tile for dependency
/// bookkeeping. Ids are never recycled, so a handle cannot come back to life
/// for a different tile after it has been unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileHandle(pub u64);

impl std::fmt::Display for TileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// Identifier of a submitted task. Doubles as the submission sequence
/// number: ids are handed out in strictly increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// How a task touches a tile.
///
/// Variants are ordered by strictness, so `max` of two modes gives the one a
/// task must be treated with when it names the same handle twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    /// Whether the access modifies the tile.
    pub fn is_write(self) -> bool {
        !matches!(self, AccessMode::Read)
    }

    /// The stricter of two modes.
    pub fn merge(self, other: AccessMode) -> AccessMode {
        self.max(other)
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessMode::Read => write!(f, "R"),
            AccessMode::Write => write!(f, "W"),
            AccessMode::ReadWrite => write!(f, "RW"),
        }
    }
}

/// One declared tile access of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    pub handle: TileHandle,
    pub mode: AccessMode,
}

impl Access {
    pub fn read(handle: TileHandle) -> Self {
        Self { handle, mode: AccessMode::Read }
    }

    pub fn write(handle: TileHandle) -> Self {
        Self { handle, mode: AccessMode::Write }
    }

    pub fn read_write(handle: TileHandle) -> Self {
        Self { handle, mode: AccessMode::ReadWrite }
    }
}

impl From<(TileHandle, AccessMode)> for Access {
    fn from((handle, mode): (TileHandle, AccessMode)) -> Self {
        Self { handle, mode }
    }
}

/// Collapse an access list to one entry per handle, keeping the strictest
/// mode, sorted by handle id.
///
/// The ascending order is the lock order used during submission.
pub fn normalize_accesses(accesses: &[Access]) -> Vec<Access> {
    let mut merged: Vec<Access> = accesses.to_vec();
    merged.sort_by_key(|a| a.handle);
    merged.dedup_by(|later, kept| {
        if later.handle == kept.handle {
            kept.mode = kept.mode.merge(later.mode);
            true
        } else {
            false
        }
    });
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_strictness_ordering() {
        assert!(AccessMode::Read < AccessMode::Write);
        assert!(AccessMode::Write < AccessMode::ReadWrite);
        assert_eq!(AccessMode::Read.merge(AccessMode::Write), AccessMode::Write);
        assert_eq!(AccessMode::ReadWrite.merge(AccessMode::Read), AccessMode::ReadWrite);
        assert_eq!(AccessMode::Write.merge(AccessMode::ReadWrite), AccessMode::ReadWrite);
    }

    #[test]
    fn is_write() {
        assert!(!AccessMode::Read.is_write());
        assert!(AccessMode::Write.is_write());
        assert!(AccessMode::ReadWrite.is_write());
    }

    #[test]
    fn normalize_merges_duplicates() {
        let h1 = TileHandle(1);
        let h7 = TileHandle(7);
        let accesses = [
            Access::read(h7),
            Access::read(h1),
            Access::write(h7),
            Access::read(h7),
        ];
        let merged = normalize_accesses(&accesses);
        assert_eq!(merged, vec![Access::read(h1), Access::write(h7)]);
    }

    #[test]
    fn normalize_keeps_distinct_handles_sorted() {
        let accesses = [
            Access::read_write(TileHandle(3)),
            Access::read(TileHandle(2)),
            Access::read(TileHandle(1)),
        ];
        let merged = normalize_accesses(&accesses);
        let handles: Vec<u64> = merged.iter().map(|a| a.handle.0).collect();
        assert_eq!(handles, vec![1, 2, 3]);
    }

    #[test]
    fn normalize_empty() {
        assert!(normalize_accesses(&[]).is_empty());
    }

    #[test]
    fn display_formats() {
        assert_eq!(TileHandle(4).to_string(), "h4");
        assert_eq!(TaskId(12).to_string(), "t12");
        assert_eq!(AccessMode::ReadWrite.to_string(), "RW");
    }
}
