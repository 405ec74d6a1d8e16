//! A directory is an ordinary file whose data is an array of fixed-size
//! entries: in-use flag, name, and the sector holding that name's file
//! header. `.` and `..` are regular entries pointing at the directory
//! itself and its parent.

use crate::error::FsError;
use crate::fs::file_header::{FileHeader, FileKind};
use crate::fs::open_file::OpenFile;
use crate::machine::SynchDisk;
use crate::threads::ThreadId;

pub const NAME_MAX_LEN: usize = 32;

#[derive(Debug, Clone)]
struct Entry {
    in_use: bool,
    sector: usize,
    name: String,
}

pub struct Directory {
    entries: Vec<Entry>,
}

impl Directory {
    pub fn new(num_entries: usize) -> Self {
        Self { entries: (0..num_entries).map(|_| Entry { in_use: false, sector: 0, name: String::new() }).collect() }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.entries.iter().find(|e| e.in_use && e.name == name).map(|e| e.sector)
    }

    pub fn add(&mut self, name: &str, sector: usize) -> Result<(), FsError> {
        if self.find(name).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        let slot = self.entries.iter_mut().find(|e| !e.in_use).ok_or_else(|| FsError::DirectoryFull(name.to_string()))?;
        slot.in_use = true;
        slot.sector = sector;
        slot.name = name.to_string();
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<usize, FsError> {
        let slot = self.entries.iter_mut().find(|e| e.in_use && e.name == name).ok_or_else(|| FsError::NoSuchPath(name.to_string()))?;
        let sector = slot.sector;
        slot.in_use = false;
        slot.name.clear();
        Ok(sector)
    }

    pub fn is_empty_of_entries(&self) -> bool {
        self.entries.iter().filter(|e| e.in_use).all(|e| e.name == "." || e.name == "..")
    }

    /// Every real entry (skipping `.`/`..`), for a recursive directory
    /// walk.
    pub fn entries_excluding_dots(&self) -> Vec<(String, usize)> {
        self.entries.iter().filter(|e| e.in_use && e.name != "." && e.name != "..").map(|e| (e.name.clone(), e.sector)).collect()
    }

    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().filter(|e| e.in_use).map(|e| e.name.as_str()).collect()
    }

    pub fn fetch_from(disk: &SynchDisk, tid: ThreadId, file: &OpenFile, num_entries: usize) -> Self {
        let mut dir = Self::new(num_entries);
        let mut buf = vec![0u8; num_entries * Self::entry_size()];
        file.read_at(disk, tid, &mut buf, 0);
        for (i, slot) in dir.entries.iter_mut().enumerate() {
            let base = i * Self::entry_size();
            slot.in_use = buf[base] == 1;
            slot.sector = u32::from_le_bytes(buf[base + 1..base + 5].try_into().unwrap()) as usize;
            let name_bytes = &buf[base + 5..base + 5 + NAME_MAX_LEN];
            let len = name_bytes.iter().position(|&b| b == 0).unwrap_or(NAME_MAX_LEN);
            slot.name = String::from_utf8_lossy(&name_bytes[..len]).into_owned();
        }
        dir
    }

    pub fn write_back(&self, disk: &SynchDisk, tid: ThreadId, file: &mut OpenFile) {
        let mut buf = vec![0u8; self.entries.len() * Self::entry_size()];
        for (i, slot) in self.entries.iter().enumerate() {
            let base = i * Self::entry_size();
            buf[base] = if slot.in_use { 1 } else { 0 };
            buf[base + 1..base + 5].copy_from_slice(&(slot.sector as u32).to_le_bytes());
            let name_bytes = slot.name.as_bytes();
            let len = name_bytes.len().min(NAME_MAX_LEN);
            buf[base + 5..base + 5 + len].copy_from_slice(&name_bytes[..len]);
        }
        file.write_at(disk, tid, &buf, 0, None).expect("a directory never grows past its initial allocation");
    }

    fn entry_size() -> usize {
        1 + 4 + NAME_MAX_LEN
    }

    pub fn byte_size(num_entries: usize) -> usize {
        num_entries * Self::entry_size()
    }
}

pub fn new_directory_header(sector_size: usize, num_entries: usize, parent_sector: Option<usize>, now: u64) -> FileHeader {
    FileHeader::new(sector_size, FileKind::Directory, parent_sector, now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_find_resolves_the_sector() {
        let mut dir = Directory::new(4);
        dir.add("foo", 7).unwrap();
        assert_eq!(dir.find("foo"), Some(7));
    }

    #[test]
    fn adding_a_duplicate_name_fails() {
        let mut dir = Directory::new(4);
        dir.add("foo", 7).unwrap();
        assert!(matches!(dir.add("foo", 9), Err(FsError::AlreadyExists(_))));
    }

    #[test]
    fn directory_full_once_every_slot_used() {
        let mut dir = Directory::new(1);
        dir.add("foo", 1).unwrap();
        assert!(matches!(dir.add("bar", 2), Err(FsError::DirectoryFull(_))));
    }

    #[test]
    fn remove_frees_the_slot_for_reuse() {
        let mut dir = Directory::new(1);
        dir.add("foo", 1).unwrap();
        dir.remove("foo").unwrap();
        dir.add("bar", 2).unwrap();
        assert_eq!(dir.find("bar"), Some(2));
    }

    #[test]
    fn only_dot_entries_counts_as_empty() {
        let mut dir = Directory::new(4);
        dir.add(".", 1).unwrap();
        dir.add("..", 0).unwrap();
        assert!(dir.is_empty_of_entries());
        dir.add("file", 2).unwrap();
        assert!(!dir.is_empty_of_entries());
    }
}
