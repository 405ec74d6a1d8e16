//! The simulated disk device: fixed-size sectors, asynchronous completion
//! signalled via callback after a simulated latency.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::trace;

/// A block device addressed by sector number. Real implementations
/// complete asynchronously: `read_sector`/`write_sector` return
/// immediately and invoke `done` once the data is in place, the same way
/// the original disk model signals an interrupt after `DiskTime` ticks.
pub trait Disk: Send + Sync {
    fn num_sectors(&self) -> usize;
    fn sector_size(&self) -> usize;
    fn read_sector(&self, sector: usize, buf: &mut [u8], done: Box<dyn FnOnce() + Send>);
    fn write_sector(&self, sector: usize, data: &[u8], done: Box<dyn FnOnce() + Send>);
}

/// Backs the simulated disk with a real host file, so formatted/booted
/// state can be inspected directly after a test run.
pub struct FileBackedDisk {
    file: Mutex<std::fs::File>,
    num_sectors: usize,
    sector_size: usize,
    latency: Duration,
}

impl FileBackedDisk {
    pub fn open(path: &Path, num_sectors: usize, sector_size: usize, latency: Duration) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new().read(true).write(true).create(true).open(path)?;
        file.set_len((num_sectors * sector_size) as u64)?;
        Ok(Self { file: Mutex::new(file), num_sectors, sector_size, latency })
    }
}

impl Disk for FileBackedDisk {
    fn num_sectors(&self) -> usize {
        self.num_sectors
    }

    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, sector: usize, buf: &mut [u8], done: Box<dyn FnOnce() + Send>) {
        trace!(sector, "disk read");
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((sector * self.sector_size) as u64)).expect("seek within disk image");
        file.read_exact(&mut buf[..self.sector_size]).expect("sector fully present in backing file");
        drop(file);
        complete_after(self.latency, done);
    }

    fn write_sector(&self, sector: usize, data: &[u8], done: Box<dyn FnOnce() + Send>) {
        trace!(sector, "disk write");
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((sector * self.sector_size) as u64)).expect("seek within disk image");
        file.write_all(&data[..self.sector_size]).expect("write within disk image bounds");
        drop(file);
        complete_after(self.latency, done);
    }
}

/// An ephemeral disk image with no backing file, for unit tests that do
/// not need to inspect persisted state afterward.
pub struct InMemoryDisk {
    sectors: Mutex<Vec<Vec<u8>>>,
    sector_size: usize,
    latency: Duration,
}

impl InMemoryDisk {
    pub fn new(num_sectors: usize, sector_size: usize, latency: Duration) -> Self {
        Self { sectors: Mutex::new(vec![vec![0u8; sector_size]; num_sectors]), sector_size, latency }
    }
}

impl Disk for InMemoryDisk {
    fn num_sectors(&self) -> usize {
        self.sectors.lock().unwrap().len()
    }

    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, sector: usize, buf: &mut [u8], done: Box<dyn FnOnce() + Send>) {
        let sectors = self.sectors.lock().unwrap();
        buf[..self.sector_size].copy_from_slice(&sectors[sector]);
        drop(sectors);
        complete_after(self.latency, done);
    }

    fn write_sector(&self, sector: usize, data: &[u8], done: Box<dyn FnOnce() + Send>) {
        let mut sectors = self.sectors.lock().unwrap();
        sectors[sector].copy_from_slice(&data[..self.sector_size]);
        drop(sectors);
        complete_after(self.latency, done);
    }
}

fn complete_after(latency: Duration, done: Box<dyn FnOnce() + Send>) {
    if latency.is_zero() {
        done();
        return;
    }
    std::thread::spawn(move || {
        std::thread::sleep(latency);
        done();
    });
}

/// Blocking front-end over a [`Disk`], the way `SynchDisk` turns the
/// callback-based device into ordinary sequential calls for the
/// filesystem layer: post a completion semaphore from the callback, then
/// `P` it before returning.
pub struct SynchDisk {
    device: Arc<dyn Disk>,
    scheduler: Arc<crate::threads::Scheduler>,
}

impl SynchDisk {
    pub fn new(device: Arc<dyn Disk>, scheduler: Arc<crate::threads::Scheduler>) -> Self {
        Self { device, scheduler }
    }

    pub fn sector_size(&self) -> usize {
        self.device.sector_size()
    }

    pub fn num_sectors(&self) -> usize {
        self.device.num_sectors()
    }

    /// The device writes into `buf` before `read_sector` returns; only the
    /// completion signal is potentially delayed, so there is nothing left
    /// to copy once `done.p(tid)` unblocks.
    pub fn read_sector(&self, tid: crate::threads::ThreadId, sector: usize, buf: &mut [u8]) {
        let done = Arc::new(crate::sync::Semaphore::new("disk.read.done", 0, Arc::clone(&self.scheduler)));
        let done_clone = Arc::clone(&done);
        self.device.read_sector(sector, buf, Box::new(move || done_clone.v(tid)));
        done.p(tid);
    }

    pub fn write_sector(&self, tid: crate::threads::ThreadId, sector: usize, data: &[u8]) {
        let done = Arc::new(crate::sync::Semaphore::new("disk.write.done", 0, Arc::clone(&self.scheduler)));
        let done_clone = Arc::clone(&done);
        self.device.write_sector(sector, data, Box::new(move || done_clone.v(tid)));
        done.p(tid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn write_then_read_round_trips_a_sector() {
        let disk = InMemoryDisk::new(4, 8, Duration::ZERO);
        let (tx, rx) = mpsc::channel();
        disk.write_sector(1, &[1, 2, 3, 4, 5, 6, 7, 8], Box::new(move || tx.send(()).unwrap()));
        rx.recv().unwrap();

        let mut buf = [0u8; 8];
        let (tx2, rx2) = mpsc::channel();
        disk.read_sector(1, &mut buf, Box::new(move || tx2.send(()).unwrap()));
        rx2.recv().unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
