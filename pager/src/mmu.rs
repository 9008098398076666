use log::{debug, error, info, warn};

use crate::{
    backing_store::BackingStore,
    error::{InvariantViolation, Result, StoreOp, VmError},
    event::{Access, PagingEvent, PagingObserver},
    frame_pool::{Frame, FramePool},
    page_replacer::{LruPageReplacer, PageReplacer},
    page_table::PageTable,
    FrameIndex, PageNumber, DEFAULT_FRAME_COUNT, DEFAULT_PAGE_COUNT, DEFAULT_PAGE_SIZE,
};

/// Counters for completed operations. A fault that failed is not counted.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct MmuStats {
    pub reads: u64,
    pub writes: u64,
    pub hits: u64,
    pub faults: u64,
    pub evictions: u64,
    pub write_backs: u64,
}

pub type DefaultMmu<LOADER> =
    Mmu<DEFAULT_PAGE_SIZE, DEFAULT_FRAME_COUNT, DEFAULT_PAGE_COUNT, LruPageReplacer, LOADER>;

/// The paging engine: one address space of `PAGE_COUNT` pages backed by
/// `FRAME_COUNT` frames of `PAGE_SIZE` bytes.
///
/// Not internally synchronized. A fault touches the frame pool, page table,
/// replacer and backing store in sequence; callers sharing an `Mmu` must
/// hold an exclusive lock across each `read`/`write`.
pub struct Mmu<
    const PAGE_SIZE: usize,
    const FRAME_COUNT: usize,
    const PAGE_COUNT: usize,
    REPLACER: PageReplacer,
    LOADER: BackingStore,
> {
    frames: Vec<Frame>,
    frame_pool: FramePool,
    page_table: PageTable<PAGE_COUNT>,
    replacer: REPLACER,
    loader: LOADER,
    observer: Option<Box<dyn PagingObserver + Send>>,
    stats: MmuStats,
}

impl<const PAGE_SIZE: usize, const FRAME_COUNT: usize, const PAGE_COUNT: usize, LOADER>
    Mmu<PAGE_SIZE, FRAME_COUNT, PAGE_COUNT, LruPageReplacer, LOADER>
where
    LOADER: BackingStore,
{
    pub fn new(loader: LOADER) -> Self {
        Self::with_replacer(LruPageReplacer::with_capacity(FRAME_COUNT), loader)
    }
}

impl<const PAGE_SIZE: usize, const FRAME_COUNT: usize, const PAGE_COUNT: usize, REPLACER, LOADER>
    Mmu<PAGE_SIZE, FRAME_COUNT, PAGE_COUNT, REPLACER, LOADER>
where
    REPLACER: PageReplacer,
    LOADER: BackingStore,
{
    const VALID_GEOMETRY: () = assert!(
        PAGE_SIZE > 0 && FRAME_COUNT > 0 && PAGE_COUNT > 0,
        "page size, frame count and page count must all be non-zero"
    );

    /// `replacer` must be empty.
    pub fn with_replacer(replacer: REPLACER, loader: LOADER) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_GEOMETRY;

        Mmu {
            frames: (0..FRAME_COUNT).map(|_| Frame::new(PAGE_SIZE)).collect(),
            frame_pool: FramePool::new(FRAME_COUNT),
            page_table: PageTable::new(),
            replacer,
            loader,
            observer: None,
            stats: MmuStats::default(),
        }
    }

    pub fn set_observer<O>(&mut self, observer: O)
    where
        O: PagingObserver + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    pub fn stats(&self) -> MmuStats {
        self.stats
    }

    pub fn loader(&self) -> &LOADER {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut LOADER {
        &mut self.loader
    }

    pub fn into_loader(self) -> LOADER {
        self.loader
    }

    fn emit(&mut self, event: PagingEvent) {
        info!("mmu: {event}");

        if let Some(observer) = self.observer.as_mut() {
            observer.on_event(&event);
        }
    }

    /// Splits `address` into (page number, offset) without touching any state.
    pub fn translate(&self, address: u32) -> Result<(PageNumber, usize)> {
        let address_usize = address as usize;

        let page_number = address_usize / PAGE_SIZE;
        let page_offset = address_usize % PAGE_SIZE;

        if page_number >= PAGE_COUNT {
            return Err(VmError::Address {
                address,
                page: page_number,
                page_count: PAGE_COUNT,
            });
        }

        Ok((page_number, page_offset))
    }

    pub fn is_resident(&self, page_number: PageNumber) -> bool {
        self.frame_of(page_number).is_some()
    }

    pub fn is_dirty(&self, page_number: PageNumber) -> bool {
        self.page_table
            .lookup(page_number)
            .map(|entry| entry.present && entry.dirty)
            .unwrap_or(false)
    }

    pub fn frame_of(&self, page_number: PageNumber) -> Option<FrameIndex> {
        self.page_table
            .lookup(page_number)
            .ok()
            .filter(|entry| entry.present)
            .and_then(|entry| entry.frame_index)
    }

    /// Resident pages, most recently used first.
    pub fn resident_pages(&self) -> Vec<PageNumber> {
        self.replacer.pages()
    }

    /// Frees a frame by evicting the least recently used page. Nothing is
    /// mutated unless the write-back (if any) succeeds.
    fn evict(&mut self) -> Result<FrameIndex> {
        let victim = self
            .replacer
            .evict_candidate()
            .ok_or_else(|| fatal(InvariantViolation::EmptyReplacer))?;

        let evicted_page = self
            .page_table
            .lookup(victim)
            .map_err(|_| fatal(InvariantViolation::VictimNotResident(victim)))?;

        let frame_index = match evicted_page.frame_index {
            Some(frame_index) if evicted_page.present => frame_index,
            _ => return Err(fatal(InvariantViolation::VictimNotResident(victim))),
        };

        if evicted_page.dirty {
            info!("mmu: page {:#06X} dirty, writing back before reuse", victim);

            let frame = self.frames[frame_index].as_slice();

            if let Err(source) = self.loader.store(victim, frame) {
                warn!("mmu: write-back of page {:#06X} failed, fault aborted: {}", victim, source);

                return Err(VmError::BackingStore {
                    op: StoreOp::Store,
                    page: victim,
                    source,
                });
            }

            self.stats.write_backs += 1;
        }

        self.page_table.mark_absent(victim)?;
        self.replacer.remove(victim);
        self.stats.evictions += 1;

        self.emit(PagingEvent::Eviction {
            victim,
            frame: frame_index,
            written_back: evicted_page.dirty,
        });

        Ok(frame_index)
    }

    fn handle_page_fault(&mut self, page_number: PageNumber, access: Access) -> Result<FrameIndex> {
        self.emit(PagingEvent::PageFault {
            page: page_number,
            access,
        });

        let frame_idx = match self.frame_pool.try_acquire_free() {
            Some(empty_idx) => empty_idx,
            None => self.evict()?,
        };

        let frame = self.frames[frame_idx].as_mut_slice();

        if let Err(source) = self.loader.load(page_number, frame) {
            warn!(
                "mmu: load of page {:#06X} failed, frame {:#04X} released: {}",
                page_number, frame_idx, source
            );

            self.frame_pool.release(frame_idx);

            return Err(VmError::BackingStore {
                op: StoreOp::Load,
                page: page_number,
                source,
            });
        }

        self.page_table.mark_present(page_number, frame_idx)?;
        self.replacer.touch(page_number);
        self.stats.faults += 1;

        self.emit(PagingEvent::PageLoaded {
            page: page_number,
            frame: frame_idx,
        });

        Ok(frame_idx)
    }

    /// Resolves `address` to a resident frame, faulting it in if needed, and
    /// records the access for recency. Each access touches the replacer
    /// exactly once.
    fn resolve(&mut self, address: u32, access: Access) -> Result<(PageNumber, FrameIndex, usize)> {
        let (page_number, page_offset) = self.translate(address)?;

        debug!(
            "mmu: {} addr {:#010X} page_num={:#06X} page_offset={:#05X}",
            access, address, page_number, page_offset
        );

        let entry = self.page_table.lookup(page_number)?;

        let frame_idx = match entry.frame_index {
            Some(frame_idx) if entry.present => {
                debug!("mmu: page hit");

                self.replacer.touch(page_number);
                self.stats.hits += 1;

                frame_idx
            }
            _ => self.handle_page_fault(page_number, access)?,
        };

        debug!("mmu: page {:#06X} mapped to frame {:#04X}", page_number, frame_idx);

        Ok((page_number, frame_idx, page_offset))
    }

    pub fn read(&mut self, address: u32) -> Result<u8> {
        let (_, frame_idx, page_offset) = self.resolve(address, Access::Read)?;

        self.stats.reads += 1;

        Ok(self.frames[frame_idx].as_slice()[page_offset])
    }

    pub fn write(&mut self, address: u32, value: u8) -> Result<()> {
        let (page_number, frame_idx, page_offset) = self.resolve(address, Access::Write)?;

        self.frames[frame_idx].as_mut_slice()[page_offset] = value;
        self.page_table.mark_dirty(page_number)?;

        self.stats.writes += 1;

        Ok(())
    }

    /// Writes every dirty resident page back, least recently used first, and
    /// marks it clean. Residency and recency are unchanged. Returns how many
    /// pages were written.
    pub fn flush(&mut self) -> Result<usize> {
        let mut written = 0;

        for page_number in self.replacer.pages().into_iter().rev() {
            let entry = self.page_table.lookup(page_number)?;

            if !entry.dirty {
                continue;
            }

            let frame_idx = match entry.frame_index {
                Some(frame_idx) if entry.present => frame_idx,
                _ => return Err(fatal(InvariantViolation::ResidencyMismatch { page: page_number })),
            };

            self.loader
                .store(page_number, self.frames[frame_idx].as_slice())
                .map_err(|source| VmError::BackingStore {
                    op: StoreOp::Store,
                    page: page_number,
                    source,
                })?;

            self.page_table.mark_clean(page_number)?;
            self.stats.write_backs += 1;
            written += 1;
        }

        debug!("mmu: flushed {} dirty pages", written);

        Ok(written)
    }

    /// Checks that the page table, frame pool and replacer agree: present
    /// pages map pairwise distinct, claimed frames, the replacer tracks
    /// exactly the present pages, and residency fits in the frame pool.
    pub fn check_invariants(&self) -> std::result::Result<(), InvariantViolation> {
        let resident = self.page_table.resident_count();

        if resident > FRAME_COUNT {
            return Err(InvariantViolation::CapacityExceeded {
                resident,
                frame_count: FRAME_COUNT,
            });
        }

        let mut owners: Vec<Option<PageNumber>> = vec![None; FRAME_COUNT];

        for (page, entry) in self.page_table.iter() {
            match (entry.present, entry.frame_index) {
                (true, Some(frame)) => {
                    if frame >= FRAME_COUNT || self.frame_pool.is_free(frame) {
                        return Err(InvariantViolation::BadFrame { page, frame });
                    }

                    if let Some(first) = owners[frame] {
                        return Err(InvariantViolation::FrameAliased {
                            frame,
                            first,
                            second: page,
                        });
                    }

                    owners[frame] = Some(page);

                    if !self.replacer.contains(page) {
                        return Err(InvariantViolation::ResidencyMismatch { page });
                    }
                }
                (false, None) if !entry.dirty && !self.replacer.contains(page) => {}
                _ => return Err(InvariantViolation::ResidencyMismatch { page }),
            }
        }

        if self.replacer.len() != resident {
            return Err(InvariantViolation::TrackerSizeMismatch {
                tracked: self.replacer.len(),
                resident,
            });
        }

        if self.frame_pool.free_count() + resident != self.frame_pool.capacity() {
            return Err(InvariantViolation::FramesLeaked {
                free: self.frame_pool.free_count(),
                resident,
                frame_count: FRAME_COUNT,
            });
        }

        Ok(())
    }
}

fn fatal(violation: InvariantViolation) -> VmError {
    error!("mmu: {}", violation);

    VmError::Invariant(violation)
}

#[cfg(test)]
mod tests {
    use std::{io, sync::mpsc};

    use super::*;
    use crate::backing_store::MemoryBackingStore;

    type SmallMmu = Mmu<16, 2, 4, LruPageReplacer, MemoryBackingStore>;

    /// A replacer that forgets everything it is told.
    #[derive(Default)]
    struct AmnesicReplacer;

    impl PageReplacer for AmnesicReplacer {
        fn touch(&mut self, _page_number: PageNumber) {}

        fn evict_candidate(&self) -> Option<PageNumber> {
            None
        }

        fn remove(&mut self, _page_number: PageNumber) -> bool {
            false
        }

        fn contains(&self, _page_number: PageNumber) -> bool {
            false
        }

        fn len(&self) -> usize {
            0
        }

        fn pages(&self) -> Vec<PageNumber> {
            Vec::new()
        }
    }

    #[test]
    fn translate_splits_address() {
        let mmu = SmallMmu::new(MemoryBackingStore::new());

        assert_eq!(mmu.translate(0).unwrap(), (0, 0));
        assert_eq!(mmu.translate(17).unwrap(), (1, 1));
        assert_eq!(mmu.translate(63).unwrap(), (3, 15));
        assert!(matches!(
            mmu.translate(64),
            Err(VmError::Address { address: 64, page: 4, page_count: 4 })
        ));
    }

    #[test]
    fn out_of_range_access_mutates_nothing() {
        let mut mmu = SmallMmu::new(MemoryBackingStore::new());

        let err = mmu.write(0xFFFF_FFFF, 1).unwrap_err();

        assert!(err.is_recoverable());
        assert_eq!(mmu.stats(), MmuStats::default());
        assert!(mmu.resident_pages().is_empty());
        assert_eq!(mmu.loader().loads(), 0);
    }

    #[test]
    fn first_touch_faults_once() {
        let mut mmu = SmallMmu::new(MemoryBackingStore::new());

        assert_eq!(mmu.read(0).unwrap(), 0);
        assert_eq!(mmu.read(1).unwrap(), 0);
        mmu.write(2, 5).unwrap();

        let stats = mmu.stats();
        assert_eq!(stats.faults, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.writes, 1);
        assert_eq!(mmu.frame_of(0), Some(0));
    }

    #[test]
    fn read_never_dirties() {
        let mut mmu = SmallMmu::new(MemoryBackingStore::new());

        mmu.read(20).unwrap();
        assert!(!mmu.is_dirty(1));

        mmu.write(20, 1).unwrap();
        assert!(mmu.is_dirty(1));
    }

    #[test]
    fn clean_victim_skips_write_back() {
        let mut mmu = SmallMmu::new(MemoryBackingStore::new());

        mmu.read(0).unwrap();
        mmu.read(16).unwrap();
        mmu.read(32).unwrap();

        assert!(!mmu.is_resident(0));
        assert_eq!(mmu.loader().stores(), 0);
        assert_eq!(mmu.stats().evictions, 1);
        assert_eq!(mmu.stats().write_backs, 0);
    }

    #[test]
    fn events_are_reported_in_order() {
        let (tx, rx) = mpsc::channel();
        let mut mmu = SmallMmu::new(MemoryBackingStore::new());

        mmu.set_observer(move |event: &PagingEvent| {
            let _ = tx.send(*event);
        });

        mmu.write(0, 1).unwrap();
        mmu.read(16).unwrap();
        mmu.read(32).unwrap();
        mmu.read(33).unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                PagingEvent::PageFault { page: 0, access: Access::Write },
                PagingEvent::PageLoaded { page: 0, frame: 0 },
                PagingEvent::PageFault { page: 1, access: Access::Read },
                PagingEvent::PageLoaded { page: 1, frame: 1 },
                PagingEvent::PageFault { page: 2, access: Access::Read },
                PagingEvent::Eviction { victim: 0, frame: 0, written_back: true },
                PagingEvent::PageLoaded { page: 2, frame: 0 },
            ]
        );
    }

    #[test]
    fn flush_cleans_without_evicting() {
        let mut mmu = SmallMmu::new(MemoryBackingStore::new());

        mmu.write(0, 7).unwrap();
        mmu.write(16, 8).unwrap();
        mmu.read(16).unwrap();

        assert_eq!(mmu.flush().unwrap(), 2);
        assert_eq!(mmu.flush().unwrap(), 0);

        assert_eq!(mmu.resident_pages(), vec![1, 0]);
        assert!(!mmu.is_dirty(0) && !mmu.is_dirty(1));
        assert_eq!(mmu.loader().page(0).unwrap()[0], 7);
        assert_eq!(mmu.loader().page(1).unwrap()[0], 8);
        mmu.check_invariants().unwrap();
    }

    #[test]
    fn empty_replacer_is_fatal() {
        let mut mmu =
            Mmu::<16, 1, 4, _, _>::with_replacer(AmnesicReplacer, MemoryBackingStore::new());

        mmu.read(0).unwrap();

        let err = mmu.read(16).unwrap_err();

        assert!(matches!(err, VmError::Invariant(InvariantViolation::EmptyReplacer)));
        assert!(!err.is_recoverable());
        assert_eq!(mmu.frame_of(0), Some(0));
        assert!(!mmu.is_resident(1));
    }

    /// A replacer that always names the same page, resident or not.
    struct FixedVictimReplacer(PageNumber);

    impl PageReplacer for FixedVictimReplacer {
        fn touch(&mut self, _page_number: PageNumber) {}

        fn evict_candidate(&self) -> Option<PageNumber> {
            Some(self.0)
        }

        fn remove(&mut self, _page_number: PageNumber) -> bool {
            false
        }

        fn contains(&self, page_number: PageNumber) -> bool {
            page_number == self.0
        }

        fn len(&self) -> usize {
            1
        }

        fn pages(&self) -> Vec<PageNumber> {
            vec![self.0]
        }
    }

    #[test]
    fn out_of_range_victim_is_fatal() {
        let mut mmu = Mmu::<16, 1, 4, _, _>::with_replacer(
            FixedVictimReplacer(99),
            MemoryBackingStore::new(),
        );

        mmu.read(0).unwrap();

        let err = mmu.read(16).unwrap_err();

        assert!(matches!(
            err,
            VmError::Invariant(InvariantViolation::VictimNotResident(99))
        ));
        assert!(!err.is_recoverable());
        assert_eq!(mmu.frame_of(0), Some(0));
        assert!(!mmu.is_resident(1));
    }

    #[test]
    fn absent_victim_is_fatal() {
        let mut mmu = Mmu::<16, 1, 4, _, _>::with_replacer(
            FixedVictimReplacer(3),
            MemoryBackingStore::new(),
        );

        mmu.write(0, 4).unwrap();

        let err = mmu.read(16).unwrap_err();

        assert!(matches!(
            err,
            VmError::Invariant(InvariantViolation::VictimNotResident(3))
        ));
        assert!(!err.is_recoverable());
        assert!(mmu.is_dirty(0));
        assert_eq!(mmu.frame_of(0), Some(0));
        assert_eq!(mmu.loader().stores(), 0);
    }

    #[test]
    fn invariant_check_spots_untracked_page() {
        let mut mmu =
            Mmu::<16, 2, 4, _, _>::with_replacer(AmnesicReplacer, MemoryBackingStore::new());

        mmu.read(0).unwrap();

        assert_eq!(
            mmu.check_invariants(),
            Err(InvariantViolation::ResidencyMismatch { page: 0 })
        );
    }

    struct BrokenStore;

    impl BackingStore for BrokenStore {
        fn load(&mut self, _page_number: PageNumber, _target: &mut [u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }

        fn store(&mut self, _page_number: PageNumber, _buffer: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    #[test]
    fn failed_load_releases_frame() {
        let mut mmu = Mmu::<16, 2, 4, _, _>::new(BrokenStore);

        let err = mmu.read(0).unwrap_err();

        assert!(matches!(
            err,
            VmError::BackingStore { op: StoreOp::Load, page: 0, .. }
        ));
        assert!(!mmu.is_resident(0));
        assert_eq!(mmu.stats().faults, 0);
        mmu.check_invariants().unwrap();
    }

    /// Round-trips pages in memory but refuses to store one page.
    struct PickyStore {
        inner: MemoryBackingStore,
        refuse: PageNumber,
    }

    impl BackingStore for PickyStore {
        fn load(&mut self, page_number: PageNumber, target: &mut [u8]) -> io::Result<()> {
            self.inner.load(page_number, target)
        }

        fn store(&mut self, page_number: PageNumber, buffer: &[u8]) -> io::Result<()> {
            if page_number == self.refuse {
                return Err(io::Error::new(io::ErrorKind::Other, "read-only sector"));
            }

            self.inner.store(page_number, buffer)
        }
    }

    #[test]
    fn failed_flush_keeps_remaining_pages_dirty() {
        let mut mmu = Mmu::<16, 2, 4, _, _>::new(PickyStore {
            inner: MemoryBackingStore::new(),
            refuse: 1,
        });

        mmu.write(0, 7).unwrap();
        mmu.write(16, 8).unwrap();

        let err = mmu.flush().unwrap_err();

        assert!(matches!(
            err,
            VmError::BackingStore { op: StoreOp::Store, page: 1, .. }
        ));
        assert!(!mmu.is_dirty(0));
        assert!(mmu.is_dirty(1));
        assert_eq!(mmu.loader().inner.page(0).unwrap()[0], 7);
        assert_eq!(mmu.loader().inner.page(1), None);
        assert_eq!(mmu.resident_pages(), vec![1, 0]);
        assert_eq!(mmu.stats().write_backs, 1);
        mmu.check_invariants().unwrap();
    }
}
