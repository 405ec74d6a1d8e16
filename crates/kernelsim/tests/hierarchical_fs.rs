//! Scenario 6: `mkdir /A`, `mkdir /A/B`, write a 1000-byte file at
//! `/A/B/f`, then `rmdir /A`. The removal recurses through the populated
//! tree, and the free-sector bitmap must end up exactly where it started
//! before the first `mkdir`.

use std::sync::Arc;
use std::time::Duration;

use kernelcore::config::KernelConfig;
use kernelcore::fs::coordination::OpenFileTable;
use kernelcore::fs::{Bitmap, FileSystem, BITMAP_SECTOR};
use kernelcore::machine::{InMemoryDisk, SynchDisk};
use kernelcore::threads::Scheduler;

#[test]
fn rmdir_recursively_deletes_a_populated_tree_and_restores_the_bitmap() {
    let config = KernelConfig { disk_num_sectors: 256, page_size: 64, ..KernelConfig::default() };
    let scheduler = Scheduler::new(config);
    let tid = scheduler.bootstrap_main_thread("main");
    let disk = Arc::new(SynchDisk::new(Arc::new(InMemoryDisk::new(config.disk_num_sectors, config.page_size, Duration::ZERO)), Arc::clone(&scheduler)));
    let open_files = OpenFileTable::new(Arc::clone(&scheduler));
    let fs = FileSystem::format(disk.clone(), tid, config.num_dir_entries, true, open_files);

    let bitmap_before = Bitmap::fetch_from(&disk, tid, BITMAP_SECTOR, disk.num_sectors());

    fs.create_directory(tid, "A").unwrap();
    fs.create_directory(tid, "A/B").unwrap();
    fs.create(tid, "A/B/f", 1000).unwrap();
    {
        let mut file = fs.open(tid, "A/B/f").unwrap();
        file.write_at(&disk, tid, &vec![0x42u8; 1000], 0, None).unwrap();
        fs.close(file.header_sector);
    }

    assert!(fs.find(tid, "A/B/f").is_ok());

    fs.remove_directory(tid, "A").unwrap();

    assert!(matches!(fs.find(tid, "A"), Err(kernelcore::error::FsError::NoSuchPath(_))));

    let bitmap_after = Bitmap::fetch_from(&disk, tid, BITMAP_SECTOR, disk.num_sectors());
    assert_eq!(bitmap_after.num_clear(), bitmap_before.num_clear());
    for i in 0..bitmap_before.len() {
        assert_eq!(bitmap_after.test(i), bitmap_before.test(i), "sector {i} differs after rmdir");
    }
}
