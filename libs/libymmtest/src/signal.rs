//! Signal handler installation
//!
//! All three probes route the same three signals to one handler: SIGINT and
//! SIGUSR1 clobber the register under test, SIGUSR2 only observes it.
//! Handlers are installed with `SA_SIGINFO` so they receive the saved
//! context (see [`crate::sigframe`]). `SA_RESTART` is never set: the
//! read-based probe depends on seeing `EINTR` from its blocking read.

use std::io;

/// An `SA_SIGINFO`-style handler.
pub type HandlerFn = extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void);

/// The signals every probe listens for.
pub const PROBE_SIGNALS: [libc::c_int; 3] = [libc::SIGINT, libc::SIGUSR1, libc::SIGUSR2];

/// Whether a probe handler overwrites the register for this signal.
pub fn clobbers(sig: libc::c_int) -> bool {
    sig == libc::SIGINT || sig == libc::SIGUSR1
}

/// Route `signals` to `handler`.
///
/// With `oneshot`, the disposition resets to default after the first
/// delivery (`SA_RESETHAND`); otherwise the handler stays installed.
///
/// # Example
/// ```ignore
/// extern "C" fn on_signal(sig: libc::c_int, _: *mut libc::siginfo_t, _: *mut libc::c_void) {
///     // raw writes only in here
/// }
///
/// install(&PROBE_SIGNALS, on_signal, false)?;
/// ```
pub fn install(signals: &[libc::c_int], handler: HandlerFn, oneshot: bool) -> io::Result<()> {
    let mut flags = libc::SA_SIGINFO;
    if oneshot {
        flags |= libc::SA_RESETHAND;
    }

    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handler as usize;
        action.sa_flags = flags;
        libc::sigemptyset(&mut action.sa_mask);

        for &sig in signals {
            if libc::sigaction(sig, &action, std::ptr::null_mut()) != 0 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

/// Signal name for diagnostics.
pub fn signame(sig: libc::c_int) -> &'static str {
    match sig {
        libc::SIGINT => "SIGINT",
        libc::SIGUSR1 => "SIGUSR1",
        libc::SIGUSR2 => "SIGUSR2",
        _ => "UNKNOWN",
    }
}
