//! Two-level indexed file header (the on-disk i-node): a fixed number of
//! direct sectors, plus a handful of indirect index sectors for files that
//! outgrow direct addressing. Sized so one header fits in exactly one
//! sector, the way `filehdr.h`'s field layout was hand-tuned to do.

use crate::error::FsError;
use crate::fs::bitmap::Bitmap;
use crate::machine::SynchDisk;
use crate::threads::ThreadId;

/// Indirect index sectors a header can point at. A constant independent of
/// sector size, same as the original's `SecondDirect`.
pub const SECOND_DIRECT: usize = 5;

pub const fn num_direct(sector_size: usize) -> usize {
    (sector_size - 7 * 4 - SECOND_DIRECT * 4) / 4
}

pub const fn num_first_direct(sector_size: usize) -> usize {
    sector_size / 4
}

pub const fn total_direct(sector_size: usize) -> usize {
    num_direct(sector_size) + SECOND_DIRECT * num_first_direct(sector_size)
}

pub const fn max_file_size(sector_size: usize) -> usize {
    total_direct(sector_size) * sector_size
}

fn total_entries(sector_size: usize) -> usize {
    num_direct(sector_size) + SECOND_DIRECT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

#[derive(Debug, Clone)]
pub struct FileHeader {
    pub num_bytes: usize,
    pub num_sectors: usize,
    pub kind: FileKind,
    pub create_time: u64,
    pub access_time: u64,
    pub modify_time: u64,
    pub parent_sector: Option<usize>,
    /// `data_sectors[..num_direct]` are direct data sectors;
    /// `data_sectors[num_direct..]` are indirect index sectors, each
    /// holding up to `num_first_direct` further data-sector numbers.
    data_sectors: Vec<usize>,
    sector_size: usize,
}

impl FileHeader {
    pub fn new(sector_size: usize, kind: FileKind, parent_sector: Option<usize>, now: u64) -> Self {
        Self {
            num_bytes: 0,
            num_sectors: 0,
            kind,
            create_time: now,
            access_time: now,
            modify_time: now,
            parent_sector,
            data_sectors: vec![0; total_entries(sector_size)],
            sector_size,
        }
    }

    pub fn file_length(&self) -> usize {
        self.num_bytes
    }

    /// Allocates `file_size` bytes' worth of disk sectors from `bitmap`,
    /// including any indirect index sectors needed. Leaves `bitmap`
    /// untouched on failure (the caller wraps this in a
    /// [`crate::fs::bitmap::BitmapTransaction`]).
    pub fn allocate(&mut self, bitmap: &mut Bitmap, disk: &SynchDisk, tid: ThreadId, file_size: usize) -> Result<(), FsError> {
        self.change_size(bitmap, disk, tid, file_size)
    }

    /// Extends the file to hold `new_size` bytes, allocating whatever
    /// additional direct and indirect sectors are needed. A no-op (besides
    /// updating `num_bytes`) if the file already spans enough sectors.
    pub fn change_size(&mut self, bitmap: &mut Bitmap, disk: &SynchDisk, tid: ThreadId, new_size: usize) -> Result<(), FsError> {
        let sector_size = self.sector_size;
        if new_size > max_file_size(sector_size) {
            return Err(FsError::NoSpace { needed: div_round_up(new_size, sector_size), available: bitmap.num_clear() });
        }
        let new_sector_count = div_round_up(new_size, sector_size);
        if new_sector_count <= self.num_sectors {
            self.num_bytes = new_size;
            return Ok(());
        }
        let needed = new_sector_count - self.num_sectors;
        let needed_index_sectors = index_sectors_needed(new_sector_count, sector_size) - index_sectors_needed(self.num_sectors, sector_size);
        if bitmap.num_clear() < needed + needed_index_sectors {
            return Err(FsError::NoSpace { needed: needed + needed_index_sectors, available: bitmap.num_clear() });
        }

        self.grow_data_sectors(bitmap, disk, tid, new_sector_count)?;
        self.num_sectors = new_sector_count;
        self.num_bytes = new_size;
        Ok(())
    }

    /// Grows `data_sectors` (and the indirect index sectors on disk they
    /// point into) from `self.num_sectors` up to `target_sectors`.
    fn grow_data_sectors(&mut self, bitmap: &mut Bitmap, disk: &SynchDisk, tid: ThreadId, target_sectors: usize) -> Result<(), FsError> {
        let sector_size = self.sector_size;
        let direct_cap = num_direct(sector_size);
        let first_direct_cap = num_first_direct(sector_size);
        let no_space = || FsError::NoSpace { needed: 1, available: 0 };

        let mut filled = self.num_sectors.min(direct_cap);
        while filled < target_sectors.min(direct_cap) {
            self.data_sectors[filled] = bitmap.find().ok_or_else(no_space)?;
            filled += 1;
        }
        if target_sectors <= direct_cap {
            return Ok(());
        }

        let indirect_total = target_sectors - direct_cap;
        let already_indirect = self.num_sectors.saturating_sub(direct_cap);
        let num_index_sectors = div_round_up(indirect_total, first_direct_cap);

        for idx in 0..num_index_sectors {
            let slot = direct_cap + idx;
            let range_start = idx * first_direct_cap;
            let range_end = ((idx + 1) * first_direct_cap).min(indirect_total);
            let use_count = range_end - range_start;
            let already_used_here = already_indirect.saturating_sub(range_start).min(use_count);
            if already_used_here == use_count {
                continue; // this index sector is already fully populated
            }

            let index_sector = if already_indirect > range_start {
                self.data_sectors[slot]
            } else {
                let s = bitmap.find().ok_or_else(no_space)?;
                self.data_sectors[slot] = s;
                s
            };

            let mut buf = vec![0u8; sector_size];
            if already_used_here > 0 {
                disk.read_sector(tid, index_sector, &mut buf);
            }
            for j in already_used_here..use_count {
                let data_sector = bitmap.find().ok_or_else(no_space)?;
                buf[j * 4..j * 4 + 4].copy_from_slice(&(data_sector as u32).to_le_bytes());
            }
            disk.write_sector(tid, index_sector, &buf);
        }
        Ok(())
    }

    /// De-allocates every sector this header owns back into `bitmap`,
    /// reading each indirect index sector to reach the data sectors it
    /// names.
    pub fn deallocate(&self, bitmap: &mut Bitmap, disk: &SynchDisk, tid: ThreadId) {
        let sector_size = self.sector_size;
        let direct_cap = num_direct(sector_size);
        let first_direct_cap = num_first_direct(sector_size);

        for &sector in self.data_sectors.iter().take(direct_cap.min(self.num_sectors)) {
            bitmap.clear(sector);
        }
        if self.num_sectors <= direct_cap {
            return;
        }

        let mut left = self.num_sectors - direct_cap;
        let mut i = 0;
        while left > 0 {
            let use_count = left.min(first_direct_cap);
            let index_sector = self.data_sectors[direct_cap + i];
            let mut buf = vec![0u8; sector_size];
            disk.read_sector(tid, index_sector, &mut buf);
            for j in 0..use_count {
                let sector = u32::from_le_bytes(buf[j * 4..j * 4 + 4].try_into().unwrap()) as usize;
                bitmap.clear(sector);
            }
            bitmap.clear(index_sector);
            i += 1;
            left -= use_count;
        }
    }

    /// Maps a byte offset within the file to the disk sector storing it.
    pub fn byte_to_sector(&self, offset: usize, disk: &SynchDisk, tid: ThreadId) -> usize {
        let sector_size = self.sector_size;
        let direct_cap = num_direct(sector_size);
        let first_direct_cap = num_first_direct(sector_size);
        let mut sector_index = offset / sector_size;

        if sector_index < direct_cap {
            return self.data_sectors[sector_index];
        }
        sector_index -= direct_cap;
        let which_index = sector_index / first_direct_cap;
        let offset_in_index = sector_index % first_direct_cap;
        let index_sector = self.data_sectors[direct_cap + which_index];
        let mut buf = vec![0u8; sector_size];
        disk.read_sector(tid, index_sector, &mut buf);
        u32::from_le_bytes(buf[offset_in_index * 4..offset_in_index * 4 + 4].try_into().unwrap()) as usize
    }

    pub fn fetch_from(disk: &SynchDisk, tid: ThreadId, sector: usize) -> Self {
        let sector_size = disk.sector_size();
        let mut buf = vec![0u8; sector_size];
        disk.read_sector(tid, sector, &mut buf);
        Self::decode(&buf, sector_size)
    }

    pub fn write_back(&self, disk: &SynchDisk, tid: ThreadId, sector: usize) {
        let buf = self.encode();
        disk.write_sector(tid, sector, &buf);
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.sector_size];
        let mut w = 0;
        let mut put_u32 = |buf: &mut Vec<u8>, value: u32, w: &mut usize| {
            buf[*w..*w + 4].copy_from_slice(&value.to_le_bytes());
            *w += 4;
        };
        put_u32(&mut buf, self.num_bytes as u32, &mut w);
        put_u32(&mut buf, self.num_sectors as u32, &mut w);
        put_u32(&mut buf, if self.kind == FileKind::Directory { 1 } else { 0 }, &mut w);
        put_u32(&mut buf, self.create_time as u32, &mut w);
        put_u32(&mut buf, self.access_time as u32, &mut w);
        put_u32(&mut buf, self.modify_time as u32, &mut w);
        put_u32(&mut buf, self.parent_sector.map(|s| s as u32).unwrap_or(u32::MAX), &mut w);
        for &sector in &self.data_sectors {
            put_u32(&mut buf, sector as u32, &mut w);
        }
        buf
    }

    fn decode(buf: &[u8], sector_size: usize) -> Self {
        let mut r = 0;
        let mut get_u32 = |buf: &[u8], r: &mut usize| {
            let value = u32::from_le_bytes(buf[*r..*r + 4].try_into().unwrap());
            *r += 4;
            value
        };
        let num_bytes = get_u32(buf, &mut r) as usize;
        let num_sectors = get_u32(buf, &mut r) as usize;
        let kind = if get_u32(buf, &mut r) == 1 { FileKind::Directory } else { FileKind::File };
        let create_time = get_u32(buf, &mut r) as u64;
        let access_time = get_u32(buf, &mut r) as u64;
        let modify_time = get_u32(buf, &mut r) as u64;
        let parent_raw = get_u32(buf, &mut r);
        let parent_sector = if parent_raw == u32::MAX { None } else { Some(parent_raw as usize) };
        let entries = total_entries(sector_size);
        let mut data_sectors = Vec::with_capacity(entries);
        for _ in 0..entries {
            data_sectors.push(get_u32(buf, &mut r) as usize);
        }
        Self { num_bytes, num_sectors, kind, create_time, access_time, modify_time, parent_sector, data_sectors, sector_size }
    }
}

fn div_round_up(n: usize, d: usize) -> usize {
    (n + d - 1) / d
}

fn index_sectors_needed(data_sectors: usize, sector_size: usize) -> usize {
    let direct_cap = num_direct(sector_size);
    if data_sectors <= direct_cap {
        return 0;
    }
    div_round_up(data_sectors - direct_cap, num_first_direct(sector_size))
}
