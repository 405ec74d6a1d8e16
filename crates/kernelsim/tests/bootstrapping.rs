//! Scenario 1: formatting an empty disk produces a root directory with
//! `.`/`..` entries and a bitmap that accounts for exactly the sectors the
//! bitmap file and root directory file themselves occupy.

use std::sync::Arc;
use std::time::Duration;

use kernelcore::config::KernelConfig;
use kernelcore::fs::coordination::OpenFileTable;
use kernelcore::fs::{FileSystem, BITMAP_SECTOR, DIRECTORY_SECTOR};
use kernelcore::machine::{InMemoryDisk, SynchDisk};
use kernelcore::threads::Scheduler;

#[test]
fn formatting_a_128_sector_disk_marks_only_the_bitmap_and_directory_sectors() {
    let config = KernelConfig { disk_num_sectors: 128, page_size: 64, ..KernelConfig::default() };
    let scheduler = Scheduler::new(config);
    let tid = scheduler.bootstrap_main_thread("main");
    let disk = Arc::new(SynchDisk::new(Arc::new(InMemoryDisk::new(config.disk_num_sectors, config.page_size, Duration::ZERO)), Arc::clone(&scheduler)));
    let open_files = OpenFileTable::new(Arc::clone(&scheduler));
    let fs = FileSystem::format(disk, tid, config.num_dir_entries, false, open_files);

    let entries = fs.list(tid, "").unwrap();
    assert!(entries.contains(&".".to_string()));
    assert!(entries.contains(&"..".to_string()));

    let dot_sector = fs.find(tid, ".").unwrap();
    let dotdot_sector = fs.find(tid, "..").unwrap();
    assert_eq!(dot_sector, DIRECTORY_SECTOR);
    assert_eq!(dotdot_sector, DIRECTORY_SECTOR);

    assert_eq!(BITMAP_SECTOR, 0);
    assert_eq!(DIRECTORY_SECTOR, 1);
}
