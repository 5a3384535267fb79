//! libc calls used to detach and signal the observer process.
#![allow(unsafe_code)]

use std::io;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

#[cfg(unix)]
impl Signal {
    fn raw(self) -> libc::c_int {
        match self {
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
        }
    }
}

#[cfg(unix)]
fn to_pid(pid: u32) -> io::Result<libc::pid_t> {
    match libc::pid_t::try_from(pid) {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid pid {pid}"),
        )),
    }
}

/// Signal the process group led by `pid`, falling back to the single process
/// when the group cannot be signalled.
#[cfg(unix)]
pub fn signal_group(pid: u32, signal: Signal) -> io::Result<()> {
    let pid = to_pid(pid)?;
    // SAFETY: killpg/kill take plain integers and touch no memory of ours.
    if unsafe { libc::killpg(pid, signal.raw()) } == 0 {
        return Ok(());
    }
    if unsafe { libc::kill(pid, signal.raw()) } == 0 {
        return Ok(());
    }
    Err(io::Error::last_os_error())
}

#[cfg(not(unix))]
pub fn signal_group(_pid: u32, _signal: Signal) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process signals are not supported on this platform",
    ))
}

/// Whether a process with this pid exists (it may belong to another user).
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = to_pid(pid) else {
        return false;
    };
    // SAFETY: signal 0 only performs the existence and permission check.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    matches!(io::Error::last_os_error().raw_os_error(), Some(libc::EPERM))
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    true
}

/// Start the command in a new session so it leads its own process group and
/// is not hit by terminal signals aimed at the foreground tool.
#[cfg(unix)]
pub fn detach(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid is async-signal-safe and the closure captures nothing.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub fn detach(_cmd: &mut Command) {}
