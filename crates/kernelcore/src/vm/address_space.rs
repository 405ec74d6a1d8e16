//! Per-process virtual memory state: the page table, the per-process
//! resident-page quota, and the backing store pages are demand-loaded
//! from (and swapped out to).

use std::sync::{Arc, Mutex};

use crate::vm::page_table::PageTable;

/// Where a faulted-in page's bytes come from, and where a dirty evicted
/// page goes back to. Backed by the user program's executable file in the
/// original (`currentThread->space->getFileName()`); a distinct type here
/// so the VM core does not depend on the filesystem module directly.
pub trait SwapBacking: Send + Sync {
    fn read_page(&self, vpn: usize, page_size: usize, buf: &mut [u8]);
    fn write_page(&self, vpn: usize, page_size: usize, buf: &[u8]);
}

pub struct AddressSpace {
    pub page_table: PageTable,
    /// Resident-page quota remaining before this process must start
    /// evicting its own pages (`availNumPages` in the original, seeded from
    /// `KernelConfig::default_quota`).
    pub avail_page_num: usize,
    pub backing: std::sync::Arc<dyn SwapBacking>,
}

impl AddressSpace {
    pub fn new(num_pages: usize, default_quota: usize, backing: std::sync::Arc<dyn SwapBacking>) -> Self {
        Self { page_table: PageTable::new(num_pages), avail_page_num: default_quota, backing }
    }

    pub fn num_pages(&self) -> usize {
        self.page_table.len()
    }

    /// Forks a child address space: `child_backing` (a fresh swap file)
    /// first receives a verbatim page-by-page copy of this space's
    /// backing store, then this process's resident dirty pages are
    /// written into it at their same virtual-page offset, overriding the
    /// stale copy with the live bytes `resident_page` reads out of
    /// physical memory for a given frame. The child's page table starts
    /// fully invalid (no resident pages) at `default_quota`, matching
    /// `AddrSpace::AddrSpace(AddrSpace *parentSpace)` in the original,
    /// which copies the parent's swap file and then overlays dirty
    /// frames before the child ever faults anything in.
    pub fn fork(&self, child_backing: Arc<dyn SwapBacking>, page_size: usize, default_quota: usize, mut resident_page: impl FnMut(usize) -> Vec<u8>) -> Self {
        let mut buf = vec![0u8; page_size];
        for vpn in 0..self.page_table.len() {
            self.backing.read_page(vpn, page_size, &mut buf);
            child_backing.write_page(vpn, page_size, &buf);
        }

        for vpn in 0..self.page_table.len() {
            let entry = self.page_table.get(vpn).expect("vpn within this page table's range");
            if entry.valid && entry.dirty {
                let bytes = resident_page(entry.physical_page);
                child_backing.write_page(vpn, page_size, &bytes);
            }
        }

        Self::new(self.page_table.len(), default_quota, child_backing)
    }
}

/// A swap file with no filesystem underneath it: each virtual page is a
/// byte vector, grown on first write. Stands in for a real file-backed
/// swap store anywhere one is needed but no program loader has created an
/// on-disk swap file yet (forking a process, in particular).
#[derive(Default)]
pub struct MemoryBacking {
    pages: Mutex<Vec<Vec<u8>>>,
}

impl MemoryBacking {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SwapBacking for MemoryBacking {
    fn read_page(&self, vpn: usize, page_size: usize, buf: &mut [u8]) {
        let pages = self.pages.lock().unwrap();
        match pages.get(vpn) {
            Some(page) => buf[..page_size.min(page.len())].copy_from_slice(&page[..page_size.min(page.len())]),
            None => buf.fill(0),
        }
    }

    fn write_page(&self, vpn: usize, _page_size: usize, buf: &[u8]) {
        let mut pages = self.pages.lock().unwrap();
        if pages.len() <= vpn {
            pages.resize(vpn + 1, Vec::new());
        }
        pages[vpn] = buf.to_vec();
    }
}
