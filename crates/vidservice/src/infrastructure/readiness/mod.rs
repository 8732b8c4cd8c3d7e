//! Readiness waiting over the capture and input descriptors.

pub mod mock;

#[cfg(target_os = "linux")]
pub use poll::PollWaiter;

#[cfg(target_os = "linux")]
mod poll {
    use std::io;
    use std::os::fd::{AsFd, OwnedFd};
    use std::time::Duration;

    use nix::errno::Errno;
    use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

    use crate::application::event_loop::{Readiness, ReadinessWaiter};

    /// `poll(2)` over duplicated capture and input descriptors.
    ///
    /// Error conditions count as readiness so the owning component sees the
    /// failure on its next read.
    #[derive(Debug)]
    pub struct PollWaiter {
        capture: OwnedFd,
        input: OwnedFd,
    }

    impl PollWaiter {
        pub fn new(capture: OwnedFd, input: OwnedFd) -> Self {
            Self { capture, input }
        }
    }

    fn is_ready(fd: &PollFd<'_>) -> bool {
        fd.revents()
            .is_some_and(|events| events.intersects(PollFlags::POLLIN | PollFlags::POLLERR))
    }

    impl ReadinessWaiter for PollWaiter {
        fn wait(&mut self, timeout: Duration) -> io::Result<Readiness> {
            let mut fds = [
                PollFd::new(self.capture.as_fd(), PollFlags::POLLIN),
                PollFd::new(self.input.as_fd(), PollFlags::POLLIN),
            ];
            let millis = u16::try_from(timeout.as_millis()).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("poll timeout {timeout:?} exceeds {} ms", u16::MAX),
                )
            })?;

            match poll(&mut fds, PollTimeout::from(millis)) {
                Ok(0) | Err(Errno::EINTR) => Ok(Readiness::default()),
                Ok(_) => Ok(Readiness {
                    capture: is_ready(&fds[0]),
                    input: is_ready(&fds[1]),
                }),
                Err(errno) => Err(io::Error::from(errno)),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::io::Write;
        use std::os::unix::net::UnixStream;

        fn waiter() -> (PollWaiter, UnixStream, UnixStream) {
            let (capture_peer, capture) = UnixStream::pair().unwrap();
            let (input_peer, input) = UnixStream::pair().unwrap();
            let waiter = PollWaiter::new(OwnedFd::from(capture), OwnedFd::from(input));
            (waiter, capture_peer, input_peer)
        }

        #[test]
        fn test_idle_descriptors_time_out() {
            let (mut waiter, _capture, _input) = waiter();

            let ready = waiter.wait(Duration::from_millis(10)).unwrap();

            assert!(ready.is_timeout());
        }

        #[test]
        fn test_reports_only_the_readable_descriptor() {
            // Arrange
            let (mut waiter, _capture, mut input) = waiter();
            input.write_all(&[1]).unwrap();

            // Act
            let ready = waiter.wait(Duration::from_millis(100)).unwrap();

            // Assert
            assert_eq!(
                ready,
                Readiness {
                    capture: false,
                    input: true
                }
            );
        }

        #[test]
        fn test_timeout_beyond_poll_range_is_rejected() {
            let (mut waiter, _capture, _input) = waiter();

            let err = waiter
                .wait(Duration::from_millis(u64::from(u16::MAX) + 1))
                .unwrap_err();

            assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        }

        #[test]
        fn test_both_descriptors_ready() {
            let (mut waiter, mut capture, mut input) = waiter();
            capture.write_all(&[1]).unwrap();
            input.write_all(&[1]).unwrap();

            let ready = waiter.wait(Duration::from_millis(100)).unwrap();

            assert!(ready.capture && ready.input);
        }
    }
}
