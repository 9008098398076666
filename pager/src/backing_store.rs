use std::{collections::HashMap, io};

use crate::PageNumber;

/// Durable home of pages that are not resident.
///
/// Both calls block from the engine's point of view. An implementation is
/// free to do its I/O asynchronously internally, as long as it has finished
/// by the time it returns.
pub trait BackingStore {
    /// Fills `target` (exactly one page long) with the contents of
    /// `page_number`.
    fn load(&mut self, page_number: PageNumber, target: &mut [u8]) -> io::Result<()>;

    fn store(&mut self, page_number: PageNumber, buffer: &[u8]) -> io::Result<()>;
}

impl<T: BackingStore + ?Sized> BackingStore for &mut T {
    fn load(&mut self, page_number: PageNumber, target: &mut [u8]) -> io::Result<()> {
        (**self).load(page_number, target)
    }

    fn store(&mut self, page_number: PageNumber, buffer: &[u8]) -> io::Result<()> {
        (**self).store(page_number, buffer)
    }
}

impl<T: BackingStore + ?Sized> BackingStore for Box<T> {
    fn load(&mut self, page_number: PageNumber, target: &mut [u8]) -> io::Result<()> {
        (**self).load(page_number, target)
    }

    fn store(&mut self, page_number: PageNumber, buffer: &[u8]) -> io::Result<()> {
        (**self).store(page_number, buffer)
    }
}

/// Keeps stored pages in a map. Pages never stored read back as zeros.
#[derive(Default, Debug)]
pub struct MemoryBackingStore {
    pages: HashMap<PageNumber, Box<[u8]>>,
    loads: usize,
    stores: usize,
}

impl MemoryBackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, page_number: PageNumber) -> Option<&[u8]> {
        self.pages.get(&page_number).map(|page| &page[..])
    }

    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn stores(&self) -> usize {
        self.stores
    }
}

impl BackingStore for MemoryBackingStore {
    fn load(&mut self, page_number: PageNumber, target: &mut [u8]) -> io::Result<()> {
        match self.pages.get(&page_number) {
            Some(page) if page.len() != target.len() => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "page {page_number} was stored with {} bytes, {} requested",
                        page.len(),
                        target.len()
                    ),
                ));
            }
            Some(page) => target.copy_from_slice(page),
            None => target.fill(0),
        }

        self.loads += 1;

        Ok(())
    }

    fn store(&mut self, page_number: PageNumber, buffer: &[u8]) -> io::Result<()> {
        self.pages.insert(page_number, buffer.into());
        self.stores += 1;

        Ok(())
    }
}
