//! Write-read smoke test for the file system: create a file, write it in
//! fixed-size chunks, reopen, and read back the same chunks.

use kernelcore::fs::FileSystem;
use kernelcore::threads::ThreadId;

/// Creates `name` of `total_len` bytes, writes `chunk` repeated to fill it,
/// then reopens and reads it back in `chunk.len()`-sized pieces, returning
/// each piece read.
pub fn run_write_read(fs: &FileSystem, tid: ThreadId, name: &str, total_len: usize, chunk: &[u8]) -> Vec<Vec<u8>> {
    fs.create(tid, name, total_len).expect("create");
    let mut file = fs.open(tid, name).expect("open for write");

    let mut offset = 0;
    while offset < total_len {
        let write_len = chunk.len().min(total_len - offset);
        fs.write_at(tid, &mut file, &chunk[..write_len], offset).expect("write_at");
        offset += write_len;
    }

    let read_file = fs.open(tid, name).expect("reopen for read");
    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < total_len {
        let read_len = chunk.len().min(total_len - offset);
        let mut buf = vec![0u8; read_len];
        let n = fs.read_at(tid, &read_file, &mut buf, offset);
        buf.truncate(n);
        chunks.push(buf);
        offset += read_len;
    }
    chunks
}
