// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Process spawner: fork, set the child up, exec, and report setup failures
//! back over a close-on-exec pipe.
//!
//! The child half runs between fork and exec in a process that may have been
//! forked from a multi-threaded parent, so it performs syscalls only; every
//! string it needs is built before the fork.

use crate::engine::console::setup_console;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{raise, sigprocmask, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::stat::{umask, Mode};
use nix::unistd::{chdir, chroot, execvpe, fork, pipe, setsid, ForkResult};
use std::ffi::{CStr, CString};
use std::io::Read;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use thiserror::Error;
use tracing::{info, warn};
use vigil_core::{ConsoleMode, Environ, JobClass, Pid, ProcessDef, ProcessKind, ResourceKind};

/// Shell used for script processes and commands with shell metacharacters.
pub const SHELL: &str = "/bin/sh";

/// Characters that force a command through the shell.
const SHELL_CHARS: &str = "~`!$^&*()=|\\{}[];\"'<>?";

/// How a command line will be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandPlan {
    /// Split on whitespace and exec'd directly with PATH search.
    Direct { argv: Vec<String> },
    /// `sh -e -c <line>` for scripts that fit on one line.
    ShellCommand { line: String },
    /// `sh -e /proc/self/fd/N`, with the body fed through a pipe.
    ShellFeed { body: String },
}

/// Decide how a process definition gets executed.
pub fn plan_command(def: &ProcessDef) -> CommandPlan {
    if def.script || def.command.contains(|c| SHELL_CHARS.contains(c)) {
        // Prepend exec for plain commands routed through the shell so the
        // shell gets out of the way after parsing.
        let script = if def.script {
            def.command.clone()
        } else {
            format!("exec {}", def.command)
        };

        // Single-line scripts go on the command line; anything longer is
        // piped in.
        match script.find('\n') {
            Some(nl) if script[nl..].trim_matches('\n').is_empty() => {
                CommandPlan::ShellCommand { line: script[..nl].to_string() }
            }
            None => CommandPlan::ShellCommand { line: script },
            Some(_) => CommandPlan::ShellFeed { body: script },
        }
    } else {
        CommandPlan::Direct {
            argv: def.command.split_whitespace().map(str::to_owned).collect(),
        }
    }
}

/// Setup steps the child reports over the error pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SetupStep {
    Console = 0,
    Rlimit = 1,
    Priority = 2,
    OomAdj = 3,
    Chroot = 4,
    Chdir = 5,
    Ptrace = 6,
    Exec = 7,
}

impl SetupStep {
    fn from_wire(value: u32) -> Option<Self> {
        Some(match value {
            0 => SetupStep::Console,
            1 => SetupStep::Rlimit,
            2 => SetupStep::Priority,
            3 => SetupStep::OomAdj,
            4 => SetupStep::Chroot,
            5 => SetupStep::Chdir,
            6 => SetupStep::Ptrace,
            7 => SetupStep::Exec,
            _ => return None,
        })
    }
}

vigil_core::simple_display! {
    SetupStep {
        Console => "console",
        Rlimit => "rlimit",
        Priority => "priority",
        OomAdj => "oom-adj",
        Chroot => "chroot",
        Chdir => "chdir",
        Ptrace => "ptrace",
        Exec => "exec",
    }
}

/// Fixed-size record transmitted child-to-parent on setup failure:
/// `{ step: u32, arg: i32, errno: i32 }`, native endianness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupErrorRecord {
    pub step: u32,
    /// Meaningful only for `Rlimit`: index into the class's limit table.
    pub arg: i32,
    pub errno: i32,
}

impl SetupErrorRecord {
    pub const WIRE_LEN: usize = 12;

    pub fn encode(&self) -> [u8; Self::WIRE_LEN] {
        let mut buf = [0u8; Self::WIRE_LEN];
        buf[0..4].copy_from_slice(&self.step.to_ne_bytes());
        buf[4..8].copy_from_slice(&self.arg.to_ne_bytes());
        buf[8..12].copy_from_slice(&self.errno.to_ne_bytes());
        buf
    }

    pub fn decode(buf: &[u8; Self::WIRE_LEN]) -> Self {
        let mut step = [0u8; 4];
        let mut arg = [0u8; 4];
        let mut errno = [0u8; 4];
        step.copy_from_slice(&buf[0..4]);
        arg.copy_from_slice(&buf[4..8]);
        errno.copy_from_slice(&buf[8..12]);
        Self {
            step: u32::from_ne_bytes(step),
            arg: i32::from_ne_bytes(arg),
            errno: i32::from_ne_bytes(errno),
        }
    }
}

/// Why a spawn failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpawnError {
    /// fork itself failed; retryable.
    #[error("temporary spawn failure: {0}")]
    Fork(Errno),

    #[error("unable to set up console: {0}")]
    Console(Errno),

    #[error("unable to set \"{kind}\" resource limit: {errno}")]
    Rlimit { kind: ResourceKind, errno: Errno },

    #[error("unable to set priority: {0}")]
    Priority(Errno),

    #[error("unable to adjust OOM score: {0}")]
    OomAdj(Errno),

    #[error("unable to change root directory: {0}")]
    Chroot(Errno),

    #[error("unable to change working directory: {0}")]
    Chdir(Errno),

    #[error("unable to set trace: {0}")]
    Ptrace(Errno),

    #[error("unable to execute: {0}")]
    Exec(Errno),

    /// The child died without writing a well-formed record.
    #[error("unreadable setup error from child")]
    BadRecord,
}

impl SpawnError {
    /// Reconstruct the typed error from a wire record.
    pub fn from_record(record: SetupErrorRecord, class: &JobClass) -> Self {
        let errno = Errno::from_raw(record.errno);
        match SetupStep::from_wire(record.step) {
            Some(SetupStep::Console) => SpawnError::Console(errno),
            Some(SetupStep::Rlimit) => {
                let kind = class
                    .limits
                    .get(record.arg as usize)
                    .map(|(kind, _)| *kind)
                    .unwrap_or(ResourceKind::Core);
                SpawnError::Rlimit { kind, errno }
            }
            Some(SetupStep::Priority) => SpawnError::Priority(errno),
            Some(SetupStep::OomAdj) => SpawnError::OomAdj(errno),
            Some(SetupStep::Chroot) => SpawnError::Chroot(errno),
            Some(SetupStep::Chdir) => SpawnError::Chdir(errno),
            Some(SetupStep::Ptrace) => SpawnError::Ptrace(errno),
            Some(SetupStep::Exec) => SpawnError::Exec(errno),
            None => SpawnError::BadRecord,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, SpawnError::Fork(_))
    }
}

/// The write end of the script-feed pipe plus the body to send. The caller
/// writes the body off the main loop and closes the pipe so the shell sees
/// EOF.
pub struct ScriptFeed {
    pub fd: OwnedFd,
    pub body: String,
}

/// Everything the child needs, converted to C strings before fork.
struct ChildPlan {
    argv: Vec<CString>,
    envp: Vec<CString>,
    console: ConsoleMode,
    limits: Vec<(Resource, Option<u64>, Option<u64>)>,
    umask_bits: Mode,
    nice: i32,
    oom_adj: Option<CString>,
    chroot_path: Option<CString>,
    chdir_path: CString,
    debug: bool,
    trace: bool,
}

fn cstring(s: &str) -> Result<CString, SpawnError> {
    CString::new(s).map_err(|_| SpawnError::Exec(Errno::EINVAL))
}

fn resource_of(kind: ResourceKind) -> Resource {
    match kind {
        ResourceKind::As => Resource::RLIMIT_AS,
        ResourceKind::Core => Resource::RLIMIT_CORE,
        ResourceKind::Cpu => Resource::RLIMIT_CPU,
        ResourceKind::Data => Resource::RLIMIT_DATA,
        ResourceKind::Fsize => Resource::RLIMIT_FSIZE,
        ResourceKind::Memlock => Resource::RLIMIT_MEMLOCK,
        ResourceKind::Msgqueue => Resource::RLIMIT_MSGQUEUE,
        ResourceKind::Nice => Resource::RLIMIT_NICE,
        ResourceKind::Nofile => Resource::RLIMIT_NOFILE,
        ResourceKind::Nproc => Resource::RLIMIT_NPROC,
        ResourceKind::Rss => Resource::RLIMIT_RSS,
        ResourceKind::Rtprio => Resource::RLIMIT_RTPRIO,
        ResourceKind::Sigpending => Resource::RLIMIT_SIGPENDING,
        ResourceKind::Stack => Resource::RLIMIT_STACK,
    }
}

/// Spawn one process of a class.
///
/// Retries transient fork failures until the kernel cooperates; returns a
/// permanent [`SpawnError`] when any child setup step fails. On success the
/// child is running (or trace-stopped when `trace` is set), and the caller
/// must deliver any returned [`ScriptFeed`].
pub fn spawn_process(
    class: &JobClass,
    kind: ProcessKind,
    plan: &CommandPlan,
    env: &Environ,
    trace: bool,
) -> Result<(Pid, Option<ScriptFeed>), SpawnError> {
    // Script-feed pipe first: its fd number appears in argv.
    let feed_pipe = match plan {
        CommandPlan::ShellFeed { .. } => {
            let (read_end, write_end) = pipe().map_err(SpawnError::Fork)?;
            set_cloexec(&write_end)?;
            Some((read_end, write_end))
        }
        _ => None,
    };

    let argv: Vec<String> = match plan {
        CommandPlan::Direct { argv } => argv.clone(),
        CommandPlan::ShellCommand { line } => vec![
            SHELL.to_string(),
            "-e".to_string(),
            "-c".to_string(),
            line.clone(),
            SHELL.to_string(),
        ],
        CommandPlan::ShellFeed { .. } => {
            let read_raw = feed_pipe
                .as_ref()
                .map(|(r, _)| r.as_raw_fd())
                .unwrap_or_default();
            vec![
                SHELL.to_string(),
                "-e".to_string(),
                format!("/proc/self/fd/{read_raw}"),
            ]
        }
    };
    if argv.is_empty() {
        return Err(SpawnError::Exec(Errno::ENOENT));
    }

    let child = ChildPlan {
        argv: argv.iter().map(|a| cstring(a)).collect::<Result<_, _>>()?,
        envp: env.entries().map(cstring).collect::<Result<_, _>>()?,
        console: class.console,
        limits: class
            .limits
            .iter()
            .map(|(kind, spec)| (resource_of(*kind), spec.soft, spec.hard))
            .collect(),
        umask_bits: Mode::from_bits_truncate(class.umask),
        nice: class.nice,
        oom_adj: match class.oom_adj {
            Some(adj) => Some(cstring(&adj.to_string())?),
            None => None,
        },
        chroot_path: match &class.chroot {
            Some(path) => Some(cstring(&path.to_string_lossy())?),
            None => None,
        },
        chdir_path: match &class.chdir {
            Some(path) => cstring(&path.to_string_lossy())?,
            None => cstring("/")?,
        },
        debug: class.debug,
        trace,
    };

    let mut warned = false;
    loop {
        match spawn_once(&child, feed_pipe.as_ref().map(|(r, _)| r), class) {
            Ok(pid) => {
                info!(job = %class.name, process = %kind, pid = pid.0, "spawned");
                let feed = match (feed_pipe, plan) {
                    (Some((_, write_end)), CommandPlan::ShellFeed { body }) => {
                        Some(ScriptFeed { fd: write_end, body: body.clone() })
                    }
                    _ => None,
                };
                return Ok((pid, feed));
            }
            Err(err) if err.is_temporary() => {
                if !warned {
                    warn!(job = %class.name, process = %kind, error = %err,
                        "temporary process spawn error");
                    warned = true;
                }
            }
            Err(err) => return Err(err),
        }
    }
}

fn set_cloexec(fd: &OwnedFd) -> Result<(), SpawnError> {
    fcntl(fd.as_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
        .map(|_| ())
        .map_err(SpawnError::Fork)
}

#[allow(unsafe_code)]
fn spawn_once(
    child: &ChildPlan,
    feed_read: Option<&OwnedFd>,
    class: &JobClass,
) -> Result<Pid, SpawnError> {
    let (err_read, err_write) = pipe().map_err(SpawnError::Fork)?;
    set_cloexec(&err_write)?;

    // Block every signal over the fork so the child can't run our handlers
    // before it resets them.
    let mut orig_mask = SigSet::empty();
    sigprocmask(SigmaskHow::SIG_BLOCK, Some(&SigSet::all()), Some(&mut orig_mask))
        .map_err(SpawnError::Fork)?;

    let fork_result = unsafe { fork() };
    match fork_result {
        Ok(ForkResult::Parent { child: pid }) => {
            let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&orig_mask), None);
            drop(err_write);
            if class.debug {
                info!(job = %class.name, pid = pid.as_raw(), "pausing for debug before exec");
            }
            read_spawn_outcome(err_read, class).map(|_| Pid(pid.as_raw()))
        }
        Ok(ForkResult::Child) => {
            // Our half of the error pipe; the write end is close-on-exec.
            drop(err_read);
            // Never returns.
            child_setup(child, feed_read, err_write, &orig_mask)
        }
        Err(errno) => {
            let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&orig_mask), None);
            Err(SpawnError::Fork(errno))
        }
    }
}

/// Parent side: an empty EOF means the child exec'd; a full record is a
/// decoded setup failure.
fn read_spawn_outcome(err_read: OwnedFd, class: &JobClass) -> Result<(), SpawnError> {
    let mut pipe = std::fs::File::from(err_read);
    let mut buf = [0u8; SetupErrorRecord::WIRE_LEN];
    let mut got = 0;
    while got < buf.len() {
        match pipe.read(&mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    match got {
        0 => Ok(()),
        SetupErrorRecord::WIRE_LEN => {
            Err(SpawnError::from_record(SetupErrorRecord::decode(&buf), class))
        }
        _ => Err(SpawnError::BadRecord),
    }
}

/// Child side: session, console, limits, identity, trace, exec. Syscalls
/// only; all strings were prepared by the parent.
#[allow(unsafe_code)]
fn child_setup(
    plan: &ChildPlan,
    feed_read: Option<&OwnedFd>,
    err_write: OwnedFd,
    orig_mask: &SigSet,
) -> ! {
    let err_fd = err_write.as_raw_fd();
    // Keep the feed pipe's read end open across exec.
    if let Some(fd) = feed_read {
        let _ = fcntl(fd.as_fd(), FcntlArg::F_SETFD(FdFlag::empty()));
    }

    let _ = setsid();

    // Console, with the documented fallback from output to null.
    if let Err(errno) = setup_console(plan.console) {
        if plan.console == ConsoleMode::Output {
            if setup_console(ConsoleMode::None).is_err() {
                child_abort(err_fd, SetupStep::Console, 0, errno);
            }
        } else {
            child_abort(err_fd, SetupStep::Console, 0, errno);
        }
    }

    for (index, (resource, soft, hard)) in plan.limits.iter().enumerate() {
        let soft = soft.unwrap_or(nix::libc::RLIM_INFINITY);
        let hard = hard.unwrap_or(nix::libc::RLIM_INFINITY);
        if let Err(errno) = setrlimit(*resource, soft, hard) {
            child_abort(err_fd, SetupStep::Rlimit, index as i32, errno);
        }
    }

    umask(plan.umask_bits);

    let rc = unsafe { nix::libc::setpriority(nix::libc::PRIO_PROCESS, 0, plan.nice) };
    if rc < 0 {
        child_abort(err_fd, SetupStep::Priority, 0, Errno::last());
    }

    if let Some(adj) = &plan.oom_adj {
        if let Err(errno) = write_oom_adj(adj) {
            child_abort(err_fd, SetupStep::OomAdj, 0, errno);
        }
    }

    if let Some(root) = &plan.chroot_path {
        if let Err(errno) = chroot(root.as_c_str()) {
            child_abort(err_fd, SetupStep::Chroot, 0, errno);
        }
    }

    if let Err(errno) = chdir(plan.chdir_path.as_c_str()) {
        child_abort(err_fd, SetupStep::Chdir, 0, errno);
    }

    // Default every signal disposition and restore the original mask.
    for sig in Signal::iterator() {
        if sig == Signal::SIGKILL || sig == Signal::SIGSTOP {
            continue;
        }
        unsafe {
            let _ = nix::sys::signal::signal(sig, SigHandler::SigDfl);
        }
    }
    let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(orig_mask), None);

    if plan.debug {
        // The parent cannot learn the true outcome past this point; the
        // debugger owns the child now.
        drop(err_write);
        let _ = raise(Signal::SIGSTOP);
        exec_child(plan, None);
    } else {
        if plan.trace {
            if let Err(errno) = nix::sys::ptrace::traceme() {
                child_abort(err_fd, SetupStep::Ptrace, 0, errno);
            }
        }
        exec_child(plan, Some(err_fd));
    }
}

#[allow(unsafe_code)]
fn exec_child(plan: &ChildPlan, err_fd: Option<i32>) -> ! {
    let result = execvpe(&plan.argv[0], &plan.argv, &plan.envp);
    let errno = result.err().unwrap_or(Errno::EINVAL);
    match err_fd {
        Some(fd) => child_abort(fd, SetupStep::Exec, 0, errno),
        None => unsafe { nix::libc::_exit(255) },
    }
}

#[allow(unsafe_code)]
fn child_abort(err_fd: i32, step: SetupStep, arg: i32, errno: Errno) -> ! {
    let record = SetupErrorRecord { step: step as u32, arg, errno: errno as i32 };
    let buf = record.encode();
    let mut written = 0;
    while written < buf.len() {
        match unsafe {
            nix::libc::write(
                err_fd,
                buf[written..].as_ptr().cast(),
                buf.len() - written,
            )
        } {
            n if n > 0 => written += n as usize,
            _ => break,
        }
    }
    unsafe { nix::libc::_exit(255) }
}

/// Write the OOM adjustment for the current process; syscall-only.
#[allow(unsafe_code)]
fn write_oom_adj(value: &CStr) -> Result<(), Errno> {
    unsafe {
        let fd = nix::libc::open(
            c"/proc/self/oom_score_adj".as_ptr(),
            nix::libc::O_WRONLY,
        );
        if fd < 0 {
            return Err(Errno::last());
        }
        let bytes = value.to_bytes();
        let n = nix::libc::write(fd, bytes.as_ptr().cast(), bytes.len());
        nix::libc::close(fd);
        if n != bytes.len() as isize {
            return Err(Errno::EIO);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "spawn_tests.rs"]
mod tests;
