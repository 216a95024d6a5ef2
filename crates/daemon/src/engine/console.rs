// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Console plumbing for spawned jobs.
//!
//! Runs in the forked child before exec, so everything here sticks to raw
//! syscalls on pre-built paths.

use nix::errno::Errno;
use std::ffi::CStr;
use vigil_core::ConsoleMode;

pub const CONSOLE_PATH: &CStr = c"/dev/console";
pub const NULL_PATH: &CStr = c"/dev/null";

/// Attach stdin/stdout/stderr according to the class's console mode.
///
/// `Output`, `Owner`, and `Logged` all open the system console; `None`
/// attaches the null device. The caller handles the documented fallback
/// from `Output` to `None`.
#[allow(unsafe_code)]
pub fn setup_console(mode: ConsoleMode) -> Result<(), Errno> {
    let path = match mode {
        ConsoleMode::None => NULL_PATH,
        ConsoleMode::Output | ConsoleMode::Owner | ConsoleMode::Logged => CONSOLE_PATH,
    };

    unsafe {
        let fd = nix::libc::open(path.as_ptr(), nix::libc::O_RDWR | nix::libc::O_NOCTTY);
        if fd < 0 {
            return Err(Errno::last());
        }

        #[cfg(target_os = "linux")]
        if mode == ConsoleMode::Owner {
            // Take the console as our controlling terminal.
            if nix::libc::ioctl(fd, nix::libc::TIOCSCTTY as _, 0) < 0 {
                let errno = Errno::last();
                nix::libc::close(fd);
                return Err(errno);
            }
        }

        for stdio in 0..=2 {
            if nix::libc::dup2(fd, stdio) < 0 {
                let errno = Errno::last();
                nix::libc::close(fd);
                return Err(errno);
            }
        }
        if fd > 2 {
            nix::libc::close(fd);
        }
    }
    Ok(())
}
