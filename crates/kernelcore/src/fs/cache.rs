//! A small fully-associative, LRU-eviction sector cache in front of the
//! disk, for the hot sectors (bitmap, directory, file headers) that get
//! re-read constantly. Ported from `fileCache.cc`'s `NumBlock`-slot cache.

use std::sync::Mutex;

use tracing::debug;

use crate::machine::SynchDisk;
use crate::threads::ThreadId;

pub const NUM_BLOCKS: usize = 8;

struct Block {
    valid: bool,
    dirty: bool,
    sector: usize,
    last_access_time: u64,
    data: Vec<u8>,
}

pub struct SectorCache {
    blocks: Mutex<Vec<Block>>,
    sector_size: usize,
}

impl SectorCache {
    pub fn new(sector_size: usize) -> Self {
        let blocks = (0..NUM_BLOCKS)
            .map(|_| Block { valid: false, dirty: false, sector: usize::MAX, last_access_time: 0, data: vec![0u8; sector_size] })
            .collect();
        Self { blocks: Mutex::new(blocks), sector_size }
    }

    pub fn read_sector(&self, disk: &SynchDisk, tid: ThreadId, now: u64, sector: usize, buf: &mut [u8]) {
        let mut blocks = self.blocks.lock().unwrap();
        if let Some(block) = blocks.iter_mut().find(|b| b.valid && b.sector == sector) {
            buf[..self.sector_size].copy_from_slice(&block.data);
            block.last_access_time = now;
            return;
        }
        drop(blocks);
        self.load_block(disk, tid, now, sector);

        let mut blocks = self.blocks.lock().unwrap();
        let block = blocks.iter_mut().find(|b| b.valid && b.sector == sector).expect("just loaded");
        buf[..self.sector_size].copy_from_slice(&block.data);
        block.last_access_time = now;
    }

    pub fn write_sector(&self, disk: &SynchDisk, tid: ThreadId, now: u64, sector: usize, data: &[u8]) {
        {
            let mut blocks = self.blocks.lock().unwrap();
            if let Some(block) = blocks.iter_mut().find(|b| b.valid && b.sector == sector) {
                block.data[..self.sector_size].copy_from_slice(data);
                block.last_access_time = now;
                block.dirty = true;
                return;
            }
        }
        self.load_block(disk, tid, now, sector);
        let mut blocks = self.blocks.lock().unwrap();
        let block = blocks.iter_mut().find(|b| b.valid && b.sector == sector).expect("just loaded");
        block.data[..self.sector_size].copy_from_slice(data);
        block.last_access_time = now;
        block.dirty = true;
    }

    fn load_block(&self, disk: &SynchDisk, tid: ThreadId, now: u64, sector: usize) {
        let slot = self.find_empty_block(disk, tid);
        let mut buf = vec![0u8; self.sector_size];
        disk.read_sector(tid, sector, &mut buf);
        let mut blocks = self.blocks.lock().unwrap();
        blocks[slot] = Block { valid: true, dirty: false, sector, last_access_time: now, data: buf };
    }

    fn find_empty_block(&self, disk: &SynchDisk, tid: ThreadId) -> usize {
        {
            let blocks = self.blocks.lock().unwrap();
            if let Some(i) = blocks.iter().position(|b| !b.valid) {
                return i;
            }
        }
        self.evict_one(disk, tid);
        let blocks = self.blocks.lock().unwrap();
        blocks.iter().position(|b| !b.valid).expect("eviction always frees one slot")
    }

    fn evict_one(&self, disk: &SynchDisk, tid: ThreadId) {
        let (victim, sector, dirty, data) = {
            let blocks = self.blocks.lock().unwrap();
            let victim = blocks.iter().enumerate().min_by_key(|(_, b)| b.last_access_time).map(|(i, _)| i).unwrap();
            (victim, blocks[victim].sector, blocks[victim].dirty, blocks[victim].data.clone())
        };
        if dirty {
            debug!(sector, "evicting dirty cached sector, writing back");
            disk.write_sector(tid, sector, &data);
        }
        self.blocks.lock().unwrap()[victim].valid = false;
    }
}
