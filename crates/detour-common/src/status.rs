//! Status codes for Detour operations

/// Status enum for Detour operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Operation was successful
    Success,
    /// Operation failed due to an unknown reason
    Failure,
    /// Provided parameter was invalid
    InvalidParam,
    /// Operation ran out of memory
    OutOfMemory,
    /// Pathfinding failed; no valid path found
    PathInvalid,
    /// Result did not fit in the provided buffer
    BufferTooSmall,
    /// Query already in progress
    InProgress,
    /// Tile slot or location is already occupied
    AlreadyOccupied,
    /// Value does not exist or is not found
    NotFound,
    /// Operation partially succeeded
    PartialResult,
    /// The search ran out of nodes
    OutOfNodes,
    /// Input data is corrupted or invalid
    DataCorrupted,
    /// Data has wrong magic number
    WrongMagic,
    /// Data has wrong version
    WrongVersion,
}

impl Status {
    /// Checks if the status is a failure
    pub fn is_failure(&self) -> bool {
        !self.is_success() && *self != Status::InProgress
    }

    /// Checks if the status is a success
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Status::Success | Status::PartialResult | Status::BufferTooSmall | Status::OutOfNodes
        )
    }

    /// Checks if the status signals work still pending
    pub fn is_in_progress(&self) -> bool {
        *self == Status::InProgress
    }
}

impl std::error::Error for Status {}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Success => write!(f, "Success"),
            Status::Failure => write!(f, "Failure"),
            Status::InvalidParam => write!(f, "Invalid parameter"),
            Status::OutOfMemory => write!(f, "Out of memory"),
            Status::PathInvalid => write!(f, "Invalid path"),
            Status::BufferTooSmall => write!(f, "Buffer too small"),
            Status::InProgress => write!(f, "Operation in progress"),
            Status::AlreadyOccupied => write!(f, "Already occupied"),
            Status::NotFound => write!(f, "Value not found"),
            Status::PartialResult => write!(f, "Partial result"),
            Status::OutOfNodes => write!(f, "Out of nodes"),
            Status::DataCorrupted => write!(f, "Data corrupted"),
            Status::WrongMagic => write!(f, "Wrong magic number"),
            Status::WrongVersion => write!(f, "Wrong version"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert!(Status::Success.is_success());
        assert!(Status::PartialResult.is_success());
        assert!(!Status::InProgress.is_success());
        assert!(!Status::InProgress.is_failure());
        assert!(Status::WrongMagic.is_failure());
        assert!(Status::InvalidParam.is_failure());
    }
}
