//! Page-fault handling: the demand-paging algorithm from `pageManager.cc`'s
//! `loadPage`/`swapPage`.
//!
//! A fault either finds a free frame (if the process is still under its
//! resident-page quota and physical memory has a clean frame) or evicts the
//! process's own least-recently-used resident page, writing it back to the
//! backing store first if dirty.

use tracing::debug;

use crate::vm::address_space::AddressSpace;
use crate::vm::frame_table::FrameTable;
use crate::vm::memory::PhysicalMemory;

/// Services a page fault for `vpn` in `space`, installing a fresh
/// translation in the page table. Does not touch the TLB; the caller
/// re-translates afterward and lets the TLB miss path refill normally.
pub fn handle_page_fault(
    space: &mut AddressSpace,
    frames: &mut FrameTable,
    memory: &mut PhysicalMemory,
    page_size: usize,
    vpn: usize,
    now: u64,
) {
    debug!(vpn, "page fault");

    let frame = if space.avail_page_num == 0 || frames.num_free() == 0 {
        let victim_vpn = space
            .page_table
            .least_recently_used()
            .expect("a full address space always has a resident page to evict");
        evict(space, memory, page_size, victim_vpn)
    } else {
        let frame = frames.allocate().expect("num_free() > 0 was just checked");
        space.avail_page_num -= 1;
        frame
    };

    frames.mark(frame);
    space.backing.read_page(vpn, page_size, memory.frame_mut(frame, page_size));

    let entry = space.page_table.get_mut(vpn).expect("vpn is within the address space");
    entry.valid = true;
    entry.physical_page = frame;
    entry.virtual_page = vpn;
    entry.used = false;
    entry.dirty = false;
    entry.read_only = false;
    entry.last_access_time = now;

    debug!(vpn, frame, "page loaded");
}

/// Writes `victim_vpn`'s resident page back to the backing store if dirty,
/// invalidates its translation, and returns the freed frame number.
fn evict(space: &mut AddressSpace, memory: &PhysicalMemory, page_size: usize, victim_vpn: usize) -> usize {
    let entry = space.page_table.get_mut(victim_vpn).expect("LRU victim must exist");
    let frame = entry.physical_page;
    entry.valid = false;

    if entry.dirty {
        debug!(vpn = victim_vpn, frame, "evicting dirty page, writing back");
        space.backing.write_page(victim_vpn, page_size, memory.frame(frame, page_size));
    } else {
        debug!(vpn = victim_vpn, frame, "evicting clean page");
    }

    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::address_space::SwapBacking;
    use std::sync::{Arc, Mutex};

    struct FakeBacking {
        pages: Mutex<Vec<Vec<u8>>>,
    }

    impl SwapBacking for FakeBacking {
        fn read_page(&self, vpn: usize, page_size: usize, buf: &mut [u8]) {
            let pages = self.pages.lock().unwrap();
            if let Some(page) = pages.get(vpn) {
                buf.copy_from_slice(page);
            } else {
                buf.fill(0);
            }
            let _ = page_size;
        }

        fn write_page(&self, vpn: usize, _page_size: usize, buf: &[u8]) {
            let mut pages = self.pages.lock().unwrap();
            if pages.len() <= vpn {
                pages.resize(vpn + 1, Vec::new());
            }
            pages[vpn] = buf.to_vec();
        }
    }

    #[test]
    fn fault_on_a_fresh_quota_allocates_a_free_frame() {
        let backing = Arc::new(FakeBacking { pages: Mutex::new(vec![vec![7u8; 4]]) });
        let mut space = AddressSpace::new(2, 1, backing);
        let mut frames = FrameTable::new(2);
        let mut memory = PhysicalMemory::new(2, 4);

        handle_page_fault(&mut space, &mut frames, &mut memory, 4, 0, 1);

        let entry = space.page_table.get(0).unwrap();
        assert!(entry.valid);
        assert_eq!(memory.frame(entry.physical_page, 4), &[7, 7, 7, 7]);
        assert_eq!(space.avail_page_num, 0);
    }

    #[test]
    fn fault_past_the_quota_evicts_the_lru_resident_page() {
        let backing = Arc::new(FakeBacking { pages: Mutex::new(vec![vec![1u8; 4], vec![2u8; 4]]) });
        let mut space = AddressSpace::new(2, 1, backing);
        let mut frames = FrameTable::new(1);
        let mut memory = PhysicalMemory::new(1, 4);

        handle_page_fault(&mut space, &mut frames, &mut memory, 4, 0, 1);
        assert!(space.page_table.get(0).unwrap().valid);

        handle_page_fault(&mut space, &mut frames, &mut memory, 4, 1, 2);
        assert!(!space.page_table.get(0).unwrap().valid);
        assert!(space.page_table.get(1).unwrap().valid);
        assert_eq!(memory.frame(space.page_table.get(1).unwrap().physical_page, 4), &[2, 2, 2, 2]);
    }
}
