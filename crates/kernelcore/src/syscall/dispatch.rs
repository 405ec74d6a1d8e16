//! Syscall dispatch: classifies a trap, decodes its arguments out of
//! registers, and executes the corresponding kernel operation against a
//! [`KernelContext`]. Ported from `exception.cc`'s `ExceptionHandler`.

use std::sync::Arc;

use tracing::{debug, info};

use crate::context::{KernelContext, CONSOLE_INPUT_FD, CONSOLE_OUTPUT_FD};
use crate::error::SyscallError;
use crate::syscall::ops::{PrintMode, RawArgs, Syscall, CONSOLE_INPUT, CONSOLE_OUTPUT};
use crate::threads::ThreadId;
use crate::userprog::CpuRegisters;
use crate::vm::{MemoryBacking, SwapBacking};

const FILE_NAME_MAX_LEN: usize = 32;

/// Reads a NUL-terminated string out of `tid`'s virtual address space
/// starting at `base_addr`, the Rust equivalent of `getStringFromMem`'s
/// byte-at-a-time `ReadMem` loop.
fn read_c_string(ctx: &KernelContext, tid: ThreadId, base_addr: usize) -> Result<String, SyscallError> {
    let mut bytes = Vec::new();
    for i in 0..FILE_NAME_MAX_LEN {
        let mut byte = [0u8];
        ctx.read_virtual(tid, base_addr + i, &mut byte).map_err(|e| SyscallError::IoError(e.to_string()))?;
        if byte[0] == 0 {
            break;
        }
        bytes.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Dispatches one trapped syscall for `tid`, mutating `cpu`'s registers
/// with any return value and advancing the program counter past the trap
/// instruction, exactly as `exception.cc` does before resuming.
///
/// Returns `Ok(true)` if the simulator should halt (the `Halt` syscall).
pub fn dispatch<C: CpuRegisters>(ctx: &KernelContext, tid: ThreadId, cpu: &mut C) -> Result<bool, SyscallError> {
    let code = cpu.read_register(C::SYSCALL_REG);
    let syscall = Syscall::from_code(code).ok_or_else(|| SyscallError::IoError(format!("unknown syscall code {code}")))?;
    let args = RawArgs::read(cpu);

    let mut halt = false;
    let mut ret = 0i32;

    match syscall {
        Syscall::Halt => {
            info!("halt requested by user program");
            halt = true;
        }
        Syscall::Exit => {
            info!(exit_code = args.a0, "thread exiting");
            ctx.remove_process(tid);
        }
        Syscall::Yield => {
            ctx.scheduler.yield_now(tid);
        }
        Syscall::Join => {
            ctx.scheduler.join(tid, ThreadId(args.a0 as u64));
        }
        Syscall::Create => {
            let name = read_c_string(ctx, tid, args.a0 as usize)?;
            ctx.filesystem.create(tid, &name, 0)?;
        }
        Syscall::Open => {
            let name = read_c_string(ctx, tid, args.a0 as usize)?;
            let file = ctx.filesystem.open(tid, &name)?;
            let fd = ctx.with_process(tid, |p| p.install_open_file(file)).ok_or_else(|| SyscallError::IoError("no such process".into()))?;
            debug!(%name, fd, "file opened");
            ret = fd;
        }
        Syscall::Close => {
            let fd = args.a0;
            let closed = ctx.with_process(tid, |p| p.close_file(fd)).flatten();
            if let Some(file) = closed {
                ctx.filesystem.close(file.header_sector);
            }
        }
        Syscall::Write => {
            let base_addr = args.a0 as usize;
            let size = args.a1 as usize;
            let fd = args.a2;
            let mut buf = vec![0u8; size];
            ctx.read_virtual(tid, base_addr, &mut buf).map_err(|e| SyscallError::IoError(e.to_string()))?;

            if fd == CONSOLE_OUTPUT || fd == CONSOLE_OUTPUT_FD {
                for &byte in &buf {
                    ctx.console.write(tid, byte);
                }
            } else {
                let position = ctx.with_process(tid, |p| p.open_file(fd).map(|f| f.seek_position())).flatten().ok_or(SyscallError::BadFileDescriptor(fd))?;
                let written = ctx.with_process(tid, |p| match p.open_file_mut(fd) {
                    Some(file) => Some(ctx.filesystem.write_at(tid, file, &buf, position)),
                    None => None,
                });
                let written = written.flatten().transpose()?.ok_or(SyscallError::BadFileDescriptor(fd))?;
                ctx.with_process(tid, |p| {
                    if let Some(file) = p.open_file_mut(fd) {
                        file.advance(written);
                    }
                });
            }
        }
        Syscall::Read => {
            let base_addr = args.a0 as usize;
            let size = args.a1 as usize;
            let fd = args.a2;
            let mut buf = vec![0u8; size];

            let real_size = if fd == CONSOLE_INPUT || fd == CONSOLE_INPUT_FD {
                for slot in buf.iter_mut() {
                    *slot = ctx.console.read(tid);
                }
                size
            } else {
                let position = ctx.with_process(tid, |p| p.open_file(fd).map(|f| f.seek_position())).flatten().ok_or(SyscallError::BadFileDescriptor(fd))?;
                let n = ctx
                    .with_process(tid, |p| p.open_file_mut(fd).map(|file| ctx.filesystem.read_at(tid, file, &mut buf, position)))
                    .flatten()
                    .ok_or(SyscallError::BadFileDescriptor(fd))?;
                ctx.with_process(tid, |p| {
                    if let Some(file) = p.open_file_mut(fd) {
                        file.advance(n);
                    }
                });
                n
            };

            ctx.write_virtual(tid, base_addr, &buf[..real_size]).map_err(|e| SyscallError::IoError(e.to_string()))?;
            ret = real_size as i32;
        }
        Syscall::Print => {
            let value = args.a0;
            match PrintMode::from_code(args.a1) {
                Some(PrintMode::Int) => print!("{value}"),
                Some(PrintMode::Char) => print!("{}", value as u8 as char),
                _ => {
                    let s = read_c_string(ctx, tid, value as usize)?;
                    print!("{s}");
                }
            }
        }
        Syscall::Exec => {
            return Err(SyscallError::IoError(format!("{syscall:?} requires a program loader, out of scope for this dispatcher")));
        }
        Syscall::Fork => {
            // The original spawns the child onto a trampoline that resumes
            // user code at the function pointer passed in a0, via the MIPS
            // interpreter this dispatcher has none of; the child thread here
            // carries the duplicated address space but runs no body of its
            // own, matching Exec's lack of a program loader.
            let child_backing: Arc<dyn SwapBacking> = Arc::new(MemoryBacking::new());
            let child_tid = ctx.scheduler.fork("forked-child", 0, |_scheduler, _tid| {})?;
            ctx.fork_process(tid, child_tid, child_backing);
            debug!(parent = %tid, child = %child_tid, "address space forked");
            ret = child_tid.0 as i32;
        }
    }

    cpu.write_register(C::RETURN_REG, ret);
    cpu.advance_pc();
    Ok(halt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::fs::coordination::OpenFileTable;
    use crate::machine::{InMemoryConsole, InMemoryDisk};
    use crate::threads::Scheduler;
    use crate::userprog::{CpuRegisterLayout, FakeCpu};
    use crate::vm::{AddressSpace, SwapBacking};
    use std::sync::Arc;
    use std::time::Duration;

    struct FakeBacking;

    impl SwapBacking for FakeBacking {
        fn read_page(&self, _vpn: usize, _page_size: usize, buf: &mut [u8]) {
            buf.fill(0);
        }

        fn write_page(&self, _vpn: usize, _page_size: usize, _buf: &[u8]) {}
    }

    fn test_context(config: KernelConfig) -> (KernelContext, ThreadId) {
        let scheduler = Scheduler::new(config);
        let tid = scheduler.bootstrap_main_thread("main");
        let disk = Arc::new(SynchDisk::new(
            Arc::new(InMemoryDisk::new(config.disk_num_sectors, config.page_size, Duration::ZERO)),
            Arc::clone(&scheduler),
        ));
        let open_files = OpenFileTable::new(Arc::clone(&scheduler));
        let fs = FileSystem::format(Arc::clone(&disk), tid, config.num_dir_entries, false, open_files);
        let console = SynchConsole::new(Arc::new(InMemoryConsole::new([])), Arc::clone(&scheduler));
        let ctx = KernelContext::new(config, scheduler, fs, disk, console);
        ctx.register_process(tid, AddressSpace::new(4, 4, Arc::new(FakeBacking)));
        (ctx, tid)
    }

    fn set_args(cpu: &mut FakeCpu, code: i32, a0: i32, a1: i32, a2: i32, a3: i32) {
        cpu.write_register(FakeCpu::SYSCALL_REG, code);
        cpu.write_register(FakeCpu::ARG_REGS[0], a0);
        cpu.write_register(FakeCpu::ARG_REGS[1], a1);
        cpu.write_register(FakeCpu::ARG_REGS[2], a2);
        cpu.write_register(FakeCpu::ARG_REGS[3], a3);
    }

    #[test]
    fn halt_reports_true_and_advances_the_pc() {
        let (ctx, tid) = test_context(KernelConfig::default());
        let mut cpu = FakeCpu::new();
        set_args(&mut cpu, 0, 0, 0, 0, 0);
        cpu.write_register(FakeCpu::NEXT_PC_REG, 4);

        let halted = dispatch(&ctx, tid, &mut cpu).unwrap();
        assert!(halted);
        assert_eq!(cpu.read_register(FakeCpu::PC_REG), 4);
    }

    #[test]
    fn yield_and_exit_do_not_halt() {
        let (ctx, tid) = test_context(KernelConfig::default());
        let mut cpu = FakeCpu::new();
        set_args(&mut cpu, 10, 0, 0, 0, 0);
        assert!(!dispatch(&ctx, tid, &mut cpu).unwrap());

        set_args(&mut cpu, 1, 0, 0, 0, 0);
        assert!(!dispatch(&ctx, tid, &mut cpu).unwrap());
    }

    #[test]
    fn console_write_then_read_syscalls_round_trip_through_virtual_memory() {
        let (ctx, tid) = test_context(KernelConfig::default());
        let mut cpu = FakeCpu::new();

        let base_addr = 0usize;
        ctx.write_virtual(tid, base_addr, b"hi").unwrap();

        set_args(&mut cpu, 7, base_addr as i32, 2, CONSOLE_OUTPUT, 0);
        dispatch(&ctx, tid, &mut cpu).unwrap();

        assert_eq!(ctx.console.read(tid), b'h');
        assert_eq!(ctx.console.read(tid), b'i');
    }

    #[test]
    fn create_open_write_read_close_round_trips_through_the_filesystem() {
        let (ctx, tid) = test_context(KernelConfig::default());
        let mut cpu = FakeCpu::new();

        let name_addr = 0usize;
        ctx.write_virtual(tid, name_addr, b"greeting\0").unwrap();

        set_args(&mut cpu, 4, name_addr as i32, 0, 0, 0);
        dispatch(&ctx, tid, &mut cpu).unwrap();

        set_args(&mut cpu, 5, name_addr as i32, 0, 0, 0);
        dispatch(&ctx, tid, &mut cpu).unwrap();
        let fd = cpu.read_register(FakeCpu::RETURN_REG);
        assert!(fd > CONSOLE_OUTPUT_FD);

        let data_addr = 16usize;
        ctx.write_virtual(tid, data_addr, b"hello").unwrap();
        set_args(&mut cpu, 7, data_addr as i32, 5, fd, 0);
        dispatch(&ctx, tid, &mut cpu).unwrap();

        let read_addr = 32usize;
        set_args(&mut cpu, 6, read_addr as i32, 5, fd, 0);
        dispatch(&ctx, tid, &mut cpu).unwrap();
        assert_eq!(cpu.read_register(FakeCpu::RETURN_REG), 5);

        let mut buf = [0u8; 5];
        ctx.read_virtual(tid, read_addr, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        set_args(&mut cpu, 8, fd, 0, 0, 0);
        dispatch(&ctx, tid, &mut cpu).unwrap();
    }

    #[test]
    fn read_or_write_on_an_unknown_descriptor_reports_bad_file_descriptor() {
        let (ctx, tid) = test_context(KernelConfig::default());
        let mut cpu = FakeCpu::new();
        set_args(&mut cpu, 7, 0, 1, 99, 0);
        let err = dispatch(&ctx, tid, &mut cpu).unwrap_err();
        assert!(matches!(err, SyscallError::BadFileDescriptor(99)));
    }

    #[test]
    fn exec_is_rejected_without_a_program_loader() {
        let (ctx, tid) = test_context(KernelConfig::default());
        let mut cpu = FakeCpu::new();
        set_args(&mut cpu, 2, 0, 0, 0, 0);
        assert!(dispatch(&ctx, tid, &mut cpu).is_err());
    }

    #[test]
    fn fork_duplicates_the_parent_address_space_into_a_new_thread() {
        let (ctx, tid) = test_context(KernelConfig::default());
        let mut cpu = FakeCpu::new();
        set_args(&mut cpu, 9, 0, 0, 0, 0);
        assert!(!dispatch(&ctx, tid, &mut cpu).unwrap());

        let child = ThreadId(cpu.read_register(FakeCpu::RETURN_REG) as u64);
        assert_ne!(child, tid);
        ctx.scheduler.join(tid, child);
        ctx.scheduler.join_os_threads();

        let resident = ctx.with_process(child, |p| p.address_space.num_pages()).unwrap();
        assert_eq!(resident, 4);
    }
}
