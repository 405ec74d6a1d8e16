//! Software-managed translation lookaside buffer: a small associative cache
//! in front of the page table. Its contents are only meaningful for the
//! address space currently scheduled, so a context switch flushes it.

use crate::vm::page_table::PageTableEntry;

pub struct Tlb {
    slots: Vec<Option<PageTableEntry>>,
}

impl Tlb {
    pub fn new(size: usize) -> Self {
        Self { slots: vec![None; size] }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn lookup(&mut self, vpn: usize, now: u64) -> Option<&mut PageTableEntry> {
        let slot = self.slots.iter_mut().flatten().find(|e| e.valid && e.virtual_page == vpn)?;
        slot.last_access_time = now;
        Some(slot)
    }

    /// Flushes every entry. Called on every address-space switch, since the
    /// TLB has no notion of which process a slot belongs to.
    pub fn flush(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Installs `entry` into the TLB, evicting the least-recently-used slot
    /// (preferring an empty slot first) per `translate.cc`'s `TLBSwapLRU`.
    /// Returns the evicted entry, if one was dirty and needs writing back to
    /// the page table.
    pub fn install_lru(&mut self, entry: PageTableEntry) -> Option<PageTableEntry> {
        let slot_index = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .unwrap_or_else(|| {
                self.slots
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, s)| s.as_ref().map(|e| e.last_access_time).unwrap_or(0))
                    .map(|(i, _)| i)
                    .expect("TLB has at least one slot")
            });
        let evicted = self.slots[slot_index].take();
        self.slots[slot_index] = Some(entry);
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(vpn: usize, t: u64) -> PageTableEntry {
        let mut e = PageTableEntry::invalid(vpn);
        e.valid = true;
        e.physical_page = vpn;
        e.last_access_time = t;
        e
    }

    #[test]
    fn install_fills_empty_slots_before_evicting() {
        let mut tlb = Tlb::new(2);
        assert!(tlb.install_lru(entry(0, 1)).is_none());
        assert!(tlb.install_lru(entry(1, 2)).is_none());
    }

    #[test]
    fn install_evicts_the_least_recently_used_slot_once_full() {
        let mut tlb = Tlb::new(2);
        tlb.install_lru(entry(0, 5));
        tlb.install_lru(entry(1, 1));
        let evicted = tlb.install_lru(entry(2, 9));
        assert_eq!(evicted.unwrap().virtual_page, 1);
    }

    #[test]
    fn lookup_updates_last_access_time() {
        let mut tlb = Tlb::new(1);
        tlb.install_lru(entry(0, 1));
        let found = tlb.lookup(0, 42).unwrap();
        assert_eq!(found.last_access_time, 42);
    }
}
