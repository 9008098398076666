use crate::{error::Result, FrameIndex, PageNumber, VmError};

#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct PageTableEntry {
    pub frame_index: Option<FrameIndex>,
    pub present: bool,
    /// Only meaningful while `present`.
    pub dirty: bool,
}

pub struct PageTable<const PAGE_TABLE_SIZE: usize> {
    table: [PageTableEntry; PAGE_TABLE_SIZE],
}

impl<const PAGE_TABLE_SIZE: usize> PageTable<PAGE_TABLE_SIZE> {
    pub fn new() -> Self {
        PageTable {
            table: [PageTableEntry::default(); PAGE_TABLE_SIZE],
        }
    }

    fn entry_mut(&mut self, page_number: PageNumber) -> Result<&mut PageTableEntry> {
        self.table.get_mut(page_number).ok_or(VmError::PageOutOfRange {
            page: page_number,
            page_count: PAGE_TABLE_SIZE,
        })
    }

    pub fn lookup(&self, page_number: PageNumber) -> Result<PageTableEntry> {
        self.table
            .get(page_number)
            .copied()
            .ok_or(VmError::PageOutOfRange {
                page: page_number,
                page_count: PAGE_TABLE_SIZE,
            })
    }

    /// Maps the page to `frame_index` and clears its dirty flag.
    pub fn mark_present(&mut self, page_number: PageNumber, frame_index: FrameIndex) -> Result<()> {
        *self.entry_mut(page_number)? = PageTableEntry {
            frame_index: Some(frame_index),
            present: true,
            dirty: false,
        };

        Ok(())
    }

    pub fn mark_absent(&mut self, page_number: PageNumber) -> Result<()> {
        *self.entry_mut(page_number)? = PageTableEntry::default();

        Ok(())
    }

    /// Returns true if the page went from clean to dirty. Absent pages are
    /// left untouched.
    pub fn mark_dirty(&mut self, page_number: PageNumber) -> Result<bool> {
        let entry = self.entry_mut(page_number)?;

        let newly_dirty = entry.present && !entry.dirty;
        entry.dirty |= entry.present;

        Ok(newly_dirty)
    }

    pub fn mark_clean(&mut self, page_number: PageNumber) -> Result<()> {
        self.entry_mut(page_number)?.dirty = false;

        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (PageNumber, &PageTableEntry)> {
        self.table.iter().enumerate()
    }

    pub fn resident_count(&self) -> usize {
        self.table.iter().filter(|entry| entry.present).count()
    }
}

impl<const PAGE_TABLE_SIZE: usize> Default for PageTable<PAGE_TABLE_SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
