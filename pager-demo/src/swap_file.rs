//! SwapFile - a `BackingStore` that keeps pages in a single file on disk.
//!
//! The file holds a header followed by an unordered list of page records.
//!
//! The header maps each page number to a position in the record list. An
//! index of 0 means the page has never been written to the file; an index
//! `i != 0` means the page lives in record `i - 1`.
//!
//! Loading page `page_number` therefore goes:
//!
//! 1. Look at `indices[page_number]` in the (cached) header;
//! 2. If it is 0, the page is not in the file and reads back as zeros;
//! 3. Otherwise seek to the first byte after the header, then another
//!    `(i - 1) * page_size` bytes;
//! 4. Read `page_size` contiguous bytes into the frame.
//!
//! Storing an existing page overwrites its record in place. Storing a page
//! for the first time appends a record and patches its index in the header.
//!
//! Layout (all integers little-endian `u64`):
//!
//! | field            | size                   |
//! |------------------|------------------------|
//! | header           | 16 + n_pages * 8 bytes |
//! | record i_0       | page_size bytes        |
//! | record i_1       | page_size bytes        |
//! | ...              | ...                    |
//! | record i_N       | page_size bytes        |
//!
//! Header:
//!
//! | field            | size              |
//! |------------------|-------------------|
//! | page count       | 8 bytes           |
//! | page size        | 8 bytes           |
//! | record indices   | n_pages * 8 bytes |

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};

use log::debug;
use pager::{BackingStore, PageNumber};

const WORD: usize = std::mem::size_of::<u64>();

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn read_word(file: &mut File) -> io::Result<u64> {
    let mut buf = [0u8; WORD];
    file.read_exact(&mut buf)?;

    Ok(u64::from_le_bytes(buf))
}

#[derive(Debug)]
pub struct SwapFile<const N_PAGES: usize, const PAGE_SIZE: usize> {
    file: File,
    /// Cached copy of the header's record indices.
    indices: Vec<u64>,
    records: u64,
}

impl<const N_PAGES: usize, const PAGE_SIZE: usize> SwapFile<N_PAGES, PAGE_SIZE> {
    const HEADER_LEN: u64 = (2 * WORD + N_PAGES * WORD) as u64;

    /// Creates (or truncates) `path` and writes an empty header.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut header = Vec::with_capacity(Self::HEADER_LEN as usize);
        header.extend_from_slice(&(N_PAGES as u64).to_le_bytes());
        header.extend_from_slice(&(PAGE_SIZE as u64).to_le_bytes());
        header.resize(Self::HEADER_LEN as usize, 0);

        file.write_all(&header)?;

        Ok(SwapFile {
            file,
            indices: vec![0; N_PAGES],
            records: 0,
        })
    }

    /// Opens an existing swap file, checking that its geometry matches.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = File::options()
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let n_pages = read_word(&mut file)?;
        if n_pages != N_PAGES as u64 {
            return Err(invalid_data(format!(
                "swap file holds {n_pages} pages, expected {N_PAGES}"
            )));
        }

        let page_size = read_word(&mut file)?;
        if page_size != PAGE_SIZE as u64 {
            return Err(invalid_data(format!(
                "swap file page size is {page_size}, expected {PAGE_SIZE}"
            )));
        }

        let indices = (0..N_PAGES)
            .map(|_| read_word(&mut file))
            .collect::<io::Result<Vec<_>>>()?;

        let data_len = file.metadata()?.len().saturating_sub(Self::HEADER_LEN);
        let records = data_len / PAGE_SIZE as u64;

        if let Some(bad) = indices.iter().find(|&&index| index > records) {
            return Err(invalid_data(format!(
                "record index {bad} past the {records} records in the file"
            )));
        }

        Ok(SwapFile {
            file,
            indices,
            records,
        })
    }

    pub fn open_or_create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Number of page records in the data section.
    pub fn records(&self) -> u64 {
        self.records
    }

    fn record_offset(index: u64) -> u64 {
        Self::HEADER_LEN + (index - 1) * PAGE_SIZE as u64
    }

    fn check(page_number: PageNumber, len: usize) -> io::Result<()> {
        if page_number >= N_PAGES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("page {page_number} outside the {N_PAGES}-page swap file"),
            ));
        }

        if len != PAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer of {len} bytes, swap file pages are {PAGE_SIZE}"),
            ));
        }

        Ok(())
    }
}

impl<const N_PAGES: usize, const PAGE_SIZE: usize> BackingStore for SwapFile<N_PAGES, PAGE_SIZE> {
    fn load(&mut self, page_number: PageNumber, target: &mut [u8]) -> io::Result<()> {
        Self::check(page_number, target.len())?;

        let index = self.indices[page_number];

        if index == 0 {
            debug!("swap_file: page {:#06X} not in file, zero-filling", page_number);

            target.fill(0);

            return Ok(());
        }

        self.file.seek(SeekFrom::Start(Self::record_offset(index)))?;
        self.file.read_exact(target)
    }

    fn store(&mut self, page_number: PageNumber, buffer: &[u8]) -> io::Result<()> {
        Self::check(page_number, buffer.len())?;

        let index = self.indices[page_number];

        if index != 0 {
            self.file.seek(SeekFrom::Start(Self::record_offset(index)))?;

            return self.file.write_all(buffer);
        }

        let new_index = self.records + 1;

        self.file.seek(SeekFrom::Start(Self::record_offset(new_index)))?;
        self.file.write_all(buffer)?;

        let index_offset = (2 * WORD + page_number * WORD) as u64;

        self.file.seek(SeekFrom::Start(index_offset))?;
        self.file.write_all(&new_index.to_le_bytes())?;

        self.indices[page_number] = new_index;
        self.records = new_index;

        debug!("swap_file: page {:#06X} appended as record {}", page_number, new_index);

        Ok(())
    }
}
