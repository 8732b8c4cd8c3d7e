//! SIGINT/SIGTERM handling.
//!
//! The handler only stores into a static flag.  It is installed without
//! `SA_RESTART`, so a blocked readiness wait returns `EINTR`, which the loop
//! treats as a timeout before checking the flag.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::libc::c_int;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

static TERMINATE: AtomicBool = AtomicBool::new(false);

extern "C" fn on_terminate(_signal: c_int) {
    TERMINATE.store(true, Ordering::SeqCst);
}

/// Installs the termination handlers and returns the flag they raise.
pub fn install_termination_handlers() -> nix::Result<&'static AtomicBool> {
    let action = SigAction::new(
        SigHandler::Handler(on_terminate),
        SaFlags::empty(),
        SigSet::empty(),
    );
    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only performs an atomic store.
        unsafe { sigaction(signal, &action) }?;
    }
    Ok(&TERMINATE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::raise;

    #[test]
    fn test_sigterm_raises_flag() {
        // Arrange
        let flag = install_termination_handlers().unwrap();

        // Act
        raise(Signal::SIGTERM).unwrap();

        // Assert
        assert!(flag.load(Ordering::SeqCst));
    }
}
