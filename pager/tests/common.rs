#![allow(dead_code)]

use std::{collections::HashMap, io};

use pager::{BackingStore, PageNumber};

/// Round-trips page contents and records every call. Loads or stores of a
/// given page can be made to fail.
#[derive(Default, Debug)]
pub struct ScriptedStore {
    pub pages: HashMap<PageNumber, Vec<u8>>,
    pub loads: Vec<PageNumber>,
    pub stores: Vec<(PageNumber, Vec<u8>)>,
    pub fail_load: Option<PageNumber>,
    pub fail_store: Option<PageNumber>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_pages(&self) -> Vec<PageNumber> {
        self.stores.iter().map(|(page, _)| *page).collect()
    }
}

impl BackingStore for ScriptedStore {
    fn load(&mut self, page_number: PageNumber, target: &mut [u8]) -> io::Result<()> {
        if self.fail_load == Some(page_number) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected load failure"));
        }

        match self.pages.get(&page_number) {
            Some(page) => target.copy_from_slice(page),
            None => target.fill(0),
        }

        self.loads.push(page_number);

        Ok(())
    }

    fn store(&mut self, page_number: PageNumber, buffer: &[u8]) -> io::Result<()> {
        if self.fail_store == Some(page_number) {
            return Err(io::Error::new(io::ErrorKind::Other, "injected store failure"));
        }

        self.pages.insert(page_number, buffer.to_vec());
        self.stores.push((page_number, buffer.to_vec()));

        Ok(())
    }
}
