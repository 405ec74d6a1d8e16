//! Virtual-to-physical address translation, via the TLB when present or
//! directly through the page table otherwise.
//!
//! Ported from `Machine::Translate`: check alignment, resolve the virtual
//! page either through the TLB or (if the TLB is disabled, `tlb_size == 0`)
//! directly through the page table, reject a read-only page being written,
//! and set the access-time/dirty bookkeeping on the entry actually used.

use crate::error::VmError;
use crate::vm::page_table::PageTable;
use crate::vm::tlb::Tlb;

pub fn translate(
    addr: usize,
    size: usize,
    writing: bool,
    page_size: usize,
    num_phys_pages: usize,
    tlb: Option<&mut Tlb>,
    page_table: &mut PageTable,
    now: u64,
) -> Result<usize, VmError> {
    if (size == 4 && addr & 0x3 != 0) || (size == 2 && addr & 0x1 != 0) {
        return Err(VmError::AddressError { addr, size });
    }

    let vpn = addr / page_size;
    let offset = addr % page_size;

    let (physical_page, read_only) = match tlb {
        Some(tlb) => {
            let entry = tlb.lookup(vpn, now).ok_or(VmError::TlbMiss { vpn })?;
            entry.last_access_time = now;
            entry.used = true;
            if writing {
                entry.dirty = true;
            }
            (entry.physical_page, entry.read_only)
        }
        None => {
            let entry = page_table.get_mut(vpn).ok_or(VmError::AddressError { addr, size })?;
            if !entry.valid {
                return Err(VmError::PageFault { vpn });
            }
            entry.last_access_time = now;
            entry.used = true;
            if writing {
                entry.dirty = true;
            }
            (entry.physical_page, entry.read_only)
        }
    };

    if read_only && writing {
        return Err(VmError::ReadOnly { vpn });
    }
    if physical_page >= num_phys_pages {
        return Err(VmError::BusError { frame: physical_page });
    }

    let physical_addr = physical_page * page_size + offset;
    Ok(physical_addr)
}
