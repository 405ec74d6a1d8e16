//! The filesystem proper: formats a disk, resolves paths, and implements
//! `Create`/`Open`/`Remove`/`CreateDirectory`/`RemoveDirectory` over the
//! bitmap, file headers, and directories above. Ported from `filesys.cc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::FsError;
use crate::fs::bitmap::{Bitmap, BitmapTransaction};
use crate::fs::cache::SectorCache;
use crate::fs::coordination::OpenFileTable;
use crate::fs::directory::Directory;
use crate::fs::file_header::{FileHeader, FileKind};
use crate::fs::open_file::OpenFile;
use crate::machine::SynchDisk;
use crate::threads::ThreadId;

/// Fixed well-known sectors, matching the original's `BitmapSector` (0) and
/// `DirectorySector` (1).
pub const BITMAP_SECTOR: usize = 0;
pub const DIRECTORY_SECTOR: usize = 1;

pub struct FileSystem {
    disk: Arc<SynchDisk>,
    cache: Option<SectorCache>,
    num_dir_entries: usize,
    open_files: OpenFileTable,
    /// A monotonic counter standing in for wall-clock time in the cache's
    /// LRU ordering; only relative order between accesses matters here.
    clock: AtomicU64,
}

impl FileSystem {
    /// Formats a fresh disk: allocates the bitmap's own sectors and the
    /// root directory's, then writes an empty root directory.
    pub fn format(disk: Arc<SynchDisk>, tid: ThreadId, num_dir_entries: usize, use_cache: bool, open_files: OpenFileTable) -> Self {
        info!("formatting filesystem");
        let sector_size = disk.sector_size();
        let num_sectors = disk.num_sectors();
        let mut bitmap = Bitmap::new(num_sectors);

        let bitmap_header_sectors = Bitmap::sectors_needed(num_sectors, sector_size);
        for s in 0..bitmap_header_sectors {
            bitmap.mark(s);
        }
        bitmap.mark(BITMAP_SECTOR);
        bitmap.mark(DIRECTORY_SECTOR);

        let mut dir_header = FileHeader::new(sector_size, FileKind::Directory, None, 0);
        dir_header
            .allocate(&mut bitmap, &disk, tid, Directory::byte_size(num_dir_entries))
            .expect("a freshly formatted disk always has room for the root directory");
        dir_header.write_back(&disk, tid, DIRECTORY_SECTOR);

        let mut root_file = OpenFile::new(DIRECTORY_SECTOR, dir_header);
        let mut root = Directory::new(num_dir_entries);
        root.add(".", DIRECTORY_SECTOR).unwrap();
        root.add("..", DIRECTORY_SECTOR).unwrap();
        root.write_back(&disk, tid, &mut root_file);

        bitmap.write_back(&disk, tid, BITMAP_SECTOR);

        Self { disk, cache: use_cache.then(|| SectorCache::new(sector_size)), num_dir_entries, open_files, clock: AtomicU64::new(0) }
    }

    /// Mounts an already-formatted disk without reinitializing it.
    pub fn mount(disk: Arc<SynchDisk>, num_dir_entries: usize, use_cache: bool, open_files: OpenFileTable) -> Self {
        let sector_size = disk.sector_size();
        Self { disk, cache: use_cache.then(|| SectorCache::new(sector_size)), num_dir_entries, open_files, clock: AtomicU64::new(0) }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn read_directory(&self, tid: ThreadId, sector: usize) -> (Directory, OpenFile) {
        let header = FileHeader::fetch_from(&self.disk, tid, sector);
        let file = OpenFile::new(sector, header);
        let dir = Directory::fetch_from(&self.disk, tid, &file, self.num_dir_entries);
        (dir, file)
    }

    /// Resolves a `/`-separated path to the sector of its final component,
    /// starting from the root directory.
    pub fn find(&self, tid: ThreadId, path: &str) -> Result<usize, FsError> {
        let mut sector = DIRECTORY_SECTOR;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let (dir, _) = self.read_directory(tid, sector);
            sector = dir.find(component).ok_or_else(|| FsError::NoSuchPath(path.to_string()))?;
        }
        Ok(sector)
    }

    fn split_parent(path: &str) -> (&str, &str) {
        match path.rsplit_once('/') {
            Some((parent, name)) if !parent.is_empty() => (parent, name),
            Some((_, name)) => ("/", name),
            None => ("", path),
        }
    }

    pub fn create(&self, tid: ThreadId, path: &str, initial_size: usize) -> Result<(), FsError> {
        let (parent_path, name) = Self::split_parent(path);
        let parent_sector = if parent_path.is_empty() { DIRECTORY_SECTOR } else { self.find(tid, parent_path)? };
        let (mut dir, mut dir_file) = self.read_directory(tid, parent_sector);

        if dir.find(name).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let mut bitmap = Bitmap::fetch_from(&self.disk, tid, BITMAP_SECTOR, self.disk.num_sectors());
        let mut txn = BitmapTransaction::begin(&mut bitmap);

        let header_sector = txn.bitmap_mut().find().ok_or(FsError::NoSpace { needed: 1, available: 0 })?;
        dir.add(name, header_sector)?;

        let mut header = FileHeader::new(self.disk.sector_size(), FileKind::File, Some(parent_sector), 0);
        header.allocate(txn.bitmap_mut(), &self.disk, tid, initial_size)?;
        header.write_back(&self.disk, tid, header_sector);

        dir.write_back(&self.disk, tid, &mut dir_file);
        txn.commit();
        bitmap.write_back(&self.disk, tid, BITMAP_SECTOR);
        debug!(path, header_sector, "file created");
        Ok(())
    }

    pub fn create_directory(&self, tid: ThreadId, path: &str) -> Result<(), FsError> {
        let (parent_path, name) = Self::split_parent(path);
        let parent_sector = if parent_path.is_empty() { DIRECTORY_SECTOR } else { self.find(tid, parent_path)? };
        let (mut dir, mut dir_file) = self.read_directory(tid, parent_sector);

        if dir.find(name).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let mut bitmap = Bitmap::fetch_from(&self.disk, tid, BITMAP_SECTOR, self.disk.num_sectors());
        let mut txn = BitmapTransaction::begin(&mut bitmap);

        let header_sector = txn.bitmap_mut().find().ok_or(FsError::NoSpace { needed: 1, available: 0 })?;
        dir.add(name, header_sector)?;

        let sector_size = self.disk.sector_size();
        let mut header = FileHeader::new(sector_size, FileKind::Directory, Some(parent_sector), 0);
        header.allocate(txn.bitmap_mut(), &self.disk, tid, Directory::byte_size(self.num_dir_entries))?;
        header.write_back(&self.disk, tid, header_sector);

        let mut new_file = OpenFile::new(header_sector, header);
        let mut new_dir = Directory::new(self.num_dir_entries);
        new_dir.add(".", header_sector).unwrap();
        new_dir.add("..", parent_sector).unwrap();
        new_dir.write_back(&self.disk, tid, &mut new_file);

        dir.write_back(&self.disk, tid, &mut dir_file);
        txn.commit();
        bitmap.write_back(&self.disk, tid, BITMAP_SECTOR);
        debug!(path, header_sector, "directory created");
        Ok(())
    }

    pub fn open(&self, tid: ThreadId, path: &str) -> Result<OpenFile, FsError> {
        let sector = self.find(tid, path)?;
        let header = FileHeader::fetch_from(&self.disk, tid, sector);
        self.open_files.open(sector);
        Ok(OpenFile::new(sector, header))
    }

    pub fn close(&self, sector: usize) {
        self.open_files.close(sector);
    }

    pub fn remove(&self, tid: ThreadId, path: &str) -> Result<(), FsError> {
        let (parent_path, name) = Self::split_parent(path);
        let parent_sector = if parent_path.is_empty() { DIRECTORY_SECTOR } else { self.find(tid, parent_path)? };
        let (mut dir, mut dir_file) = self.read_directory(tid, parent_sector);

        let sector = dir.find(name).ok_or_else(|| FsError::NoSuchPath(path.to_string()))?;
        if self.open_files.refcount(sector) > 0 {
            return Err(FsError::Busy(name.to_string()));
        }

        let header = FileHeader::fetch_from(&self.disk, tid, sector);
        if header.kind == FileKind::Directory {
            return Err(FsError::WrongType(name.to_string()));
        }

        let mut bitmap = Bitmap::fetch_from(&self.disk, tid, BITMAP_SECTOR, self.disk.num_sectors());
        let mut txn = BitmapTransaction::begin(&mut bitmap);
        header.deallocate(txn.bitmap_mut(), &self.disk, tid);
        txn.bitmap_mut().clear(sector);
        dir.remove(name)?;
        dir.write_back(&self.disk, tid, &mut dir_file);
        txn.commit();
        bitmap.write_back(&self.disk, tid, BITMAP_SECTOR);
        Ok(())
    }

    /// Removes a directory and everything under it, mirroring
    /// `RecursiveDelete` + `RemoveDirectory`'s depth-first walk: every file
    /// and nested directory inside `path` is deallocated before the
    /// directory's own header and entry table are.
    pub fn remove_directory(&self, tid: ThreadId, path: &str) -> Result<(), FsError> {
        let (parent_path, name) = Self::split_parent(path);
        let parent_sector = if parent_path.is_empty() { DIRECTORY_SECTOR } else { self.find(tid, parent_path)? };
        let (mut parent_dir, mut parent_file) = self.read_directory(tid, parent_sector);

        let sector = parent_dir.find(name).ok_or_else(|| FsError::NoSuchPath(path.to_string()))?;
        let header = FileHeader::fetch_from(&self.disk, tid, sector);
        if header.kind != FileKind::Directory {
            return Err(FsError::WrongType(name.to_string()));
        }

        self.remove_directory_contents(tid, sector)?;

        let mut bitmap = Bitmap::fetch_from(&self.disk, tid, BITMAP_SECTOR, self.disk.num_sectors());
        let mut txn = BitmapTransaction::begin(&mut bitmap);
        header.deallocate(txn.bitmap_mut(), &self.disk, tid);
        txn.bitmap_mut().clear(sector);
        parent_dir.remove(name)?;
        parent_dir.write_back(&self.disk, tid, &mut parent_file);
        txn.commit();
        bitmap.write_back(&self.disk, tid, BITMAP_SECTOR);
        Ok(())
    }

    /// Deallocates every file and subdirectory inside the directory at
    /// `sector`, depth first, without touching `sector`'s own header or
    /// entry table (the caller reclaims those once this returns).
    fn remove_directory_contents(&self, tid: ThreadId, sector: usize) -> Result<(), FsError> {
        let (dir, _) = self.read_directory(tid, sector);
        for (name, child_sector) in dir.entries_excluding_dots() {
            let child_header = FileHeader::fetch_from(&self.disk, tid, child_sector);
            if child_header.kind == FileKind::Directory {
                self.remove_directory_contents(tid, child_sector)?;
            }
            if self.open_files.refcount(child_sector) > 0 {
                return Err(FsError::Busy(name));
            }

            let mut bitmap = Bitmap::fetch_from(&self.disk, tid, BITMAP_SECTOR, self.disk.num_sectors());
            let mut txn = BitmapTransaction::begin(&mut bitmap);
            child_header.deallocate(txn.bitmap_mut(), &self.disk, tid);
            txn.bitmap_mut().clear(child_sector);
            txn.commit();
            bitmap.write_back(&self.disk, tid, BITMAP_SECTOR);
        }
        Ok(())
    }

    pub fn list(&self, tid: ThreadId, path: &str) -> Result<Vec<String>, FsError> {
        let sector = if path.is_empty() || path == "/" { DIRECTORY_SECTOR } else { self.find(tid, path)? };
        let (dir, _) = self.read_directory(tid, sector);
        Ok(dir.list().into_iter().map(String::from).collect())
    }

    /// Reads `buf.len()` bytes from `file` at `offset`. When a sector cache
    /// is configured, each resolved data sector goes through it instead of
    /// straight to disk; index-sector lookups inside `byte_to_sector`
    /// bypass the cache, since they are already infrequent relative to data
    /// reads.
    pub fn read_at(&self, tid: ThreadId, file: &OpenFile, buf: &mut [u8], offset: usize) -> usize {
        let Some(cache) = &self.cache else {
            return file.read_at(&self.disk, tid, buf, offset);
        };

        let sector_size = self.disk.sector_size();
        let file_len = file.length();
        if offset >= file_len {
            return 0;
        }
        let to_read = buf.len().min(file_len - offset);
        let mut done = 0;
        let mut sector_buf = vec![0u8; sector_size];
        while done < to_read {
            let abs = offset + done;
            let sector = file.header().byte_to_sector(abs, &self.disk, tid);
            cache.read_sector(&self.disk, tid, self.tick(), sector, &mut sector_buf);
            let in_sector_offset = abs % sector_size;
            let chunk = (sector_size - in_sector_offset).min(to_read - done);
            buf[done..done + chunk].copy_from_slice(&sector_buf[in_sector_offset..in_sector_offset + chunk]);
            done += chunk;
        }
        done
    }

    pub fn write_at(&self, tid: ThreadId, file: &mut OpenFile, data: &[u8], offset: usize) -> Result<usize, FsError> {
        let mut bitmap = Bitmap::fetch_from(&self.disk, tid, BITMAP_SECTOR, self.disk.num_sectors());
        let mut txn = BitmapTransaction::begin(&mut bitmap);
        let written = file.write_at(&self.disk, tid, data, offset, Some(txn.bitmap_mut()))?;
        txn.commit();
        bitmap.write_back(&self.disk, tid, BITMAP_SECTOR);

        // `OpenFile::write_at` always goes straight to disk; if any touched
        // sector is already cached, refresh that entry so later cached
        // reads don't see stale data.
        if let Some(cache) = &self.cache {
            let sector_size = self.disk.sector_size();
            let mut sector_buf = vec![0u8; sector_size];
            let mut covered = 0;
            while covered < written {
                let abs = offset + covered;
                let sector = file.header().byte_to_sector(abs, &self.disk, tid);
                self.disk.read_sector(tid, sector, &mut sector_buf);
                cache.write_sector(&self.disk, tid, self.tick(), sector, &sector_buf);
                let in_sector_offset = abs % sector_size;
                covered += sector_size - in_sector_offset;
            }
        }
        Ok(written)
    }

    pub fn open_files(&self) -> &OpenFileTable {
        &self.open_files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::threads::Scheduler;

    fn test_fs(num_sectors: usize, sector_size: usize) -> (FileSystem, ThreadId) {
        let config = KernelConfig { disk_num_sectors: num_sectors, ..KernelConfig::default() };
        let scheduler = Scheduler::new(config.clone());
        let tid = scheduler.bootstrap_main_thread("main");
        let disk = Arc::new(SynchDisk::new(
            Arc::new(crate::machine::InMemoryDisk::new(num_sectors, sector_size, std::time::Duration::ZERO)),
            Arc::clone(&scheduler),
        ));
        let open_files = OpenFileTable::new(scheduler);
        let fs = FileSystem::format(disk, tid, config.num_dir_entries, false, open_files);
        (fs, tid)
    }

    #[test]
    fn create_then_open_then_write_then_read_round_trips() {
        let (fs, tid) = test_fs(128, 64);
        fs.create(tid, "greeting", 0).unwrap();
        let mut file = fs.open(tid, "greeting").unwrap();
        fs.write_at(tid, &mut file, b"hello", 0).unwrap();
        let mut buf = vec![0u8; 5];
        let n = fs.read_at(tid, &file, &mut buf, 0);
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn read_through_the_sector_cache_matches_uncached_reads() {
        let config = KernelConfig { disk_num_sectors: 128, ..KernelConfig::default() };
        let scheduler = Scheduler::new(config);
        let tid = scheduler.bootstrap_main_thread("main");
        let disk = Arc::new(SynchDisk::new(
            Arc::new(crate::machine::InMemoryDisk::new(128, 64, std::time::Duration::ZERO)),
            Arc::clone(&scheduler),
        ));
        let open_files = OpenFileTable::new(scheduler);
        let fs = FileSystem::format(disk, tid, config.num_dir_entries, true, open_files);

        fs.create(tid, "greeting", 0).unwrap();
        let mut file = fs.open(tid, "greeting").unwrap();
        fs.write_at(tid, &mut file, b"cached bytes", 0).unwrap();
        let mut buf = vec![0u8; 12];
        fs.read_at(tid, &file, &mut buf, 0);
        assert_eq!(&buf, b"cached bytes");
    }

    #[test]
    fn create_duplicate_name_fails() {
        let (fs, tid) = test_fs(128, 64);
        fs.create(tid, "a", 0).unwrap();
        assert!(matches!(fs.create(tid, "a", 0), Err(FsError::AlreadyExists(_))));
    }

    #[test]
    fn removing_an_open_file_is_rejected() {
        let (fs, tid) = test_fs(128, 64);
        fs.create(tid, "a", 0).unwrap();
        let file = fs.open(tid, "a").unwrap();
        assert!(matches!(fs.remove(tid, "a"), Err(FsError::Busy(_))));
        fs.close(file.header_sector);
        fs.remove(tid, "a").unwrap();
    }

    #[test]
    fn nested_directories_resolve_by_path() {
        let (fs, tid) = test_fs(256, 64);
        fs.create_directory(tid, "sub").unwrap();
        fs.create(tid, "sub/file", 0).unwrap();
        let sector = fs.find(tid, "sub/file").unwrap();
        assert_ne!(sector, 0);
    }

    #[test]
    fn removing_a_nonempty_directory_recursively_deletes_its_contents() {
        let (fs, tid) = test_fs(256, 64);
        let bitmap_before = Bitmap::fetch_from(&fs.disk, tid, BITMAP_SECTOR, fs.disk.num_sectors());

        fs.create_directory(tid, "A").unwrap();
        fs.create_directory(tid, "A/B").unwrap();
        fs.create(tid, "A/B/f", 1000).unwrap();

        fs.remove_directory(tid, "A").unwrap();

        assert!(matches!(fs.find(tid, "A"), Err(FsError::NoSuchPath(_))));
        let bitmap_after = Bitmap::fetch_from(&fs.disk, tid, BITMAP_SECTOR, fs.disk.num_sectors());
        assert_eq!(bitmap_after.num_clear(), bitmap_before.num_clear());
        for i in 0..bitmap_before.len() {
            assert_eq!(bitmap_after.test(i), bitmap_before.test(i), "sector {i} differs");
        }
    }

    #[test]
    fn removing_a_busy_nested_file_aborts_the_recursive_delete() {
        let (fs, tid) = test_fs(256, 64);
        fs.create_directory(tid, "A").unwrap();
        fs.create(tid, "A/f", 0).unwrap();
        let _open = fs.open(tid, "A/f").unwrap();

        assert!(matches!(fs.remove_directory(tid, "A"), Err(FsError::Busy(_))));
        assert!(fs.find(tid, "A").is_ok());
    }
}
