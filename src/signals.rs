//! Termination-signal masking for the multi-file commit window.

/// Blocks termination signals until dropped, then restores the prior mask.
pub struct SignalGuard {
    #[cfg(unix)]
    previous: Option<libc::sigset_t>,
}

#[cfg(unix)]
const MASKED: [libc::c_int; 6] = [
    libc::SIGHUP,
    libc::SIGINT,
    libc::SIGPIPE,
    libc::SIGTERM,
    libc::SIGUSR1,
    libc::SIGUSR2,
];

impl SignalGuard {
    #[cfg(unix)]
    pub fn block() -> Self {
        // SAFETY: both sets are fully initialised by sigemptyset before use and
        // only this thread's mask is changed.
        let previous = unsafe {
            let mut blocked: libc::sigset_t = std::mem::zeroed();
            let mut previous: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut blocked);
            for signal in MASKED {
                libc::sigaddset(&mut blocked, signal);
            }
            (libc::pthread_sigmask(libc::SIG_BLOCK, &blocked, &mut previous) == 0)
                .then_some(previous)
        };
        if previous.is_none() {
            tracing::warn!("could not mask termination signals for commit");
        }
        Self { previous }
    }

    #[cfg(not(unix))]
    pub fn block() -> Self {
        Self {}
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(previous) = self.previous.take() {
            // SAFETY: restores a mask previously returned by pthread_sigmask.
            unsafe {
                libc::pthread_sigmask(libc::SIG_SETMASK, &previous, std::ptr::null_mut());
            }
        }
    }
}
