//! Page-table and TLB entries share one shape, since a TLB slot is just a
//! cached copy of a page-table row plus the same use/dirty/access-time
//! bookkeeping.

/// One translation: a virtual page mapped (or not) to a physical frame.
#[derive(Debug, Clone, Copy)]
pub struct PageTableEntry {
    pub virtual_page: usize,
    pub physical_page: usize,
    pub valid: bool,
    pub read_only: bool,
    pub used: bool,
    pub dirty: bool,
    /// Logical tick of last reference, used by LRU TLB and page replacement.
    pub last_access_time: u64,
}

impl PageTableEntry {
    pub fn invalid(virtual_page: usize) -> Self {
        Self {
            virtual_page,
            physical_page: 0,
            valid: false,
            read_only: false,
            used: false,
            dirty: false,
            last_access_time: 0,
        }
    }
}

/// A process's linear page table: one entry per virtual page, indexed by
/// virtual page number.
#[derive(Debug, Clone)]
pub struct PageTable {
    entries: Vec<PageTableEntry>,
}

impl PageTable {
    pub fn new(num_pages: usize) -> Self {
        Self { entries: (0..num_pages).map(PageTableEntry::invalid).collect() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, vpn: usize) -> Option<&PageTableEntry> {
        self.entries.get(vpn)
    }

    pub fn get_mut(&mut self, vpn: usize) -> Option<&mut PageTableEntry> {
        self.entries.get_mut(vpn)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PageTableEntry> {
        self.entries.iter_mut()
    }

    /// The page table row with the smallest `last_access_time` among valid
    /// entries: the LRU eviction candidate.
    pub fn least_recently_used(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.valid)
            .min_by_key(|(_, e)| e.last_access_time)
            .map(|(vpn, _)| vpn)
    }
}
