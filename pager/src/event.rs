use std::fmt;

use crate::{FrameIndex, PageNumber};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

/// Diagnostics emitted by the engine. Observing them never changes what
/// the engine does.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PagingEvent {
    PageFault {
        page: PageNumber,
        access: Access,
    },
    Eviction {
        victim: PageNumber,
        frame: FrameIndex,
        written_back: bool,
    },
    PageLoaded {
        page: PageNumber,
        frame: FrameIndex,
    },
}

impl fmt::Display for PagingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PagingEvent::PageFault { page, access } => {
                write!(f, "page fault on {access} of page {page:#06X}")
            }
            PagingEvent::Eviction {
                victim,
                frame,
                written_back,
            } => write!(
                f,
                "evicted page {victim:#06X} from frame {frame:#04X} (written back: {written_back})"
            ),
            PagingEvent::PageLoaded { page, frame } => {
                write!(f, "loaded page {page:#06X} into frame {frame:#04X}")
            }
        }
    }
}

pub trait PagingObserver {
    fn on_event(&mut self, event: &PagingEvent);
}

impl<F: FnMut(&PagingEvent)> PagingObserver for F {
    fn on_event(&mut self, event: &PagingEvent) {
        self(event)
    }
}
