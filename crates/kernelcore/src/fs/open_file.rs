//! A file opened for reading and writing: the in-memory header plus a
//! current seek position, reading and writing through whatever sectors
//! `ByteToSector` resolves to.

use crate::error::FsError;
use crate::fs::bitmap::Bitmap;
use crate::fs::file_header::FileHeader;
use crate::machine::SynchDisk;
use crate::threads::ThreadId;

pub struct OpenFile {
    pub header_sector: usize,
    header: FileHeader,
    position: usize,
}

impl OpenFile {
    pub fn new(header_sector: usize, header: FileHeader) -> Self {
        Self { header_sector, header, position: 0 }
    }

    pub fn length(&self) -> usize {
        self.header.file_length()
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    pub fn seek_position(&self) -> usize {
        self.position
    }

    /// Moves the current position forward by `n` bytes, the way a
    /// sequential `Read`/`Write` syscall advances past what it just
    /// transferred.
    pub fn advance(&mut self, n: usize) {
        self.position += n;
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Reads into `buf` starting at `offset`, sector by sector, truncating
    /// at end-of-file. Returns the number of bytes actually read.
    pub fn read_at(&self, disk: &SynchDisk, tid: ThreadId, buf: &mut [u8], offset: usize) -> usize {
        let sector_size = disk.sector_size();
        let file_len = self.header.file_length();
        if offset >= file_len {
            return 0;
        }
        let to_read = buf.len().min(file_len - offset);
        let mut done = 0;
        let mut sector_buf = vec![0u8; sector_size];
        while done < to_read {
            let abs = offset + done;
            let sector = self.header.byte_to_sector(abs, disk, tid);
            disk.read_sector(tid, sector, &mut sector_buf);
            let in_sector_offset = abs % sector_size;
            let chunk = (sector_size - in_sector_offset).min(to_read - done);
            buf[done..done + chunk].copy_from_slice(&sector_buf[in_sector_offset..in_sector_offset + chunk]);
            done += chunk;
        }
        done
    }

    /// Writes `data` at `offset`, growing the file (and allocating sectors
    /// from `bitmap`) if the write extends past the current length.
    /// `bitmap` is `None` for fixed-size files (directories) that must
    /// never grow past their initial allocation.
    pub fn write_at(
        &mut self,
        disk: &SynchDisk,
        tid: ThreadId,
        data: &[u8],
        offset: usize,
        bitmap: Option<&mut Bitmap>,
    ) -> Result<usize, FsError> {
        let sector_size = disk.sector_size();
        let needed_len = offset + data.len();
        if needed_len > self.header.file_length() {
            match bitmap {
                Some(bitmap) => {
                    self.header.change_size(bitmap, disk, tid, needed_len)?;
                    self.header.write_back(disk, tid, self.header_sector);
                }
                None => return Err(FsError::NoSpace { needed: needed_len, available: 0 }),
            }
        }

        let mut done = 0;
        let mut sector_buf = vec![0u8; sector_size];
        while done < data.len() {
            let abs = offset + done;
            let sector = self.header.byte_to_sector(abs, disk, tid);
            let in_sector_offset = abs % sector_size;
            let chunk = (sector_size - in_sector_offset).min(data.len() - done);
            if chunk < sector_size {
                disk.read_sector(tid, sector, &mut sector_buf);
            }
            sector_buf[in_sector_offset..in_sector_offset + chunk].copy_from_slice(&data[done..done + chunk]);
            disk.write_sector(tid, sector, &sector_buf);
            done += chunk;
        }
        Ok(done)
    }
}
