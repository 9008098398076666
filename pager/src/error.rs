use std::{fmt, io};

use thiserror::Error;

use crate::{FrameIndex, PageNumber};

pub type Result<T> = std::result::Result<T, VmError>;

/// Which side of the backing store contract failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    Load,
    Store,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOp::Load => f.write_str("load"),
            StoreOp::Store => f.write_str("store"),
        }
    }
}

#[derive(Error, Debug)]
pub enum VmError {
    /// The address decomposes to a page outside the address space. Nothing
    /// was mutated.
    #[error("address {address:#010X} maps to page {page}, outside the {page_count}-page address space")]
    Address {
        address: u32,
        page: PageNumber,
        page_count: usize,
    },

    #[error("page {page} is outside the {page_count}-page address space")]
    PageOutOfRange { page: PageNumber, page_count: usize },

    /// A fault could not be serviced. The caller may retry.
    #[error("backing store {op} of page {page} failed: {source}")]
    BackingStore {
        op: StoreOp,
        page: PageNumber,
        #[source]
        source: io::Error,
    },

    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
}

impl VmError {
    /// Address and backing store errors leave the engine consistent; an
    /// invariant violation does not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, VmError::Invariant(_))
    }
}

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("eviction requested while no resident page is tracked")]
    EmptyReplacer,

    #[error("eviction candidate page {0} is not resident")]
    VictimNotResident(PageNumber),

    #[error("page {page} residency disagrees between the page table and the replacer")]
    ResidencyMismatch { page: PageNumber },

    #[error("frame {frame} is mapped by both page {first} and page {second}")]
    FrameAliased {
        frame: FrameIndex,
        first: PageNumber,
        second: PageNumber,
    },

    #[error("page {page} maps frame {frame}, which is out of range or marked free")]
    BadFrame { page: PageNumber, frame: FrameIndex },

    #[error("{resident} pages resident with only {frame_count} frames")]
    CapacityExceeded { resident: usize, frame_count: usize },

    #[error("replacer tracks {tracked} pages but {resident} are resident")]
    TrackerSizeMismatch { tracked: usize, resident: usize },

    #[error("{free} free + {resident} resident frames does not add up to {frame_count}")]
    FramesLeaked {
        free: usize,
        resident: usize,
        frame_count: usize,
    },
}
