//! Machine-wide sizing constants.
//!
//! Every tunable the component design names (`NumPhysPages`, `PageSize`,
//! `SectorSize`, `TLBSize`, ...) lives here rather than as module-level
//! `const`s, so a single [`KernelConfig`] value can be threaded through
//! [`crate::context::KernelContext`] and varied per test.

/// Sizing knobs for one simulated machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Number of physical page frames.
    pub num_phys_pages: usize,
    /// Size in bytes of a page / a disk sector (the two are equal).
    pub page_size: usize,
    /// Number of TLB entries. Zero disables the TLB: translation falls back
    /// to a direct page-table lookup, as in `translate.cc`'s `tlb == NULL`
    /// path.
    pub tlb_size: usize,
    /// Hard cap on simultaneously-live threads.
    pub max_threads: usize,
    /// Number of entries in a directory's fixed-capacity entry table.
    pub num_dir_entries: usize,
    /// Number of sectors on the simulated disk.
    pub disk_num_sectors: usize,
    /// Number of cache slots in the optional hot-sector cache.
    pub num_cache_blocks: usize,
}

impl KernelConfig {
    /// `SectorSize` and `PageSize` are the same quantity in this design
    /// (a page occupies exactly one sector's worth of swap file).
    pub fn sector_size(&self) -> usize {
        self.page_size
    }

    /// Per-address-space resident-page budget: `NumPhysPages / 4`.
    pub fn default_quota(&self) -> usize {
        self.num_phys_pages / 4
    }
}

impl Default for KernelConfig {
    /// Defaults sized for fast, deterministic tests rather than for
    /// realism: a handful of physical pages is enough to exercise
    /// eviction, and a small disk is enough to exercise the bitmap and
    /// two-level file header.
    fn default() -> Self {
        Self {
            num_phys_pages: 32,
            page_size: 128,
            tlb_size: 4,
            max_threads: 128,
            num_dir_entries: 10,
            disk_num_sectors: 512,
            num_cache_blocks: 8,
        }
    }
}
