//! Raw link-layer socket for ARP traffic.
//!
//! A thin wrapper over an `AF_PACKET` socket filtered to the ARP ethertype
//! and bound to a single interface. The descriptor is owned, non-blocking,
//! and close-on-exec; dropping the wrapper closes it on every exit path.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd as _, OwnedFd, RawFd};
use std::time::Duration;

use crate::frame::ArpFrame;

/// A non-blocking `AF_PACKET` socket carrying complete ARP frames.
#[derive(Debug)]
pub struct ArpSocket {
    fd: OwnedFd,
}

impl ArpSocket {
    /// Opens the socket and binds it to the interface with `if_index`.
    pub fn open(if_index: u32) -> io::Result<ArpSocket> {
        let protocol = (libc::ETH_P_ARP as u16).to_be() as libc::c_int;
        let fd = unsafe {
            let fd = libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                protocol,
            );
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }
            OwnedFd::from_raw_fd(fd)
        };

        let mut sa: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        sa.sll_family = libc::AF_PACKET as libc::sa_family_t;
        sa.sll_protocol = (libc::ETH_P_ARP as u16).to_be();
        sa.sll_ifindex = if_index as libc::c_int;
        let rc = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                &sa as *const libc::sockaddr_ll as *const libc::sockaddr,
                size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            log::error!("Failed to bind ARP socket to interface {if_index}: {err}");
            return Err(err);
        }
        Ok(ArpSocket { fd })
    }

    /// Sends one complete frame.
    pub fn send(&self, frame: &ArpFrame) -> io::Result<()> {
        let buf = frame.to_bytes();
        let n = unsafe {
            libc::send(
                self.fd.as_raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                0,
            )
        };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        if n as usize != buf.len() {
            return Err(io::Error::other("Short send on ARP socket"));
        }
        Ok(())
    }

    /// Receives the next well-formed ARP frame, or `None` once the socket
    /// has nothing pending. Frames that do not parse are discarded.
    pub fn recv(&self) -> io::Result<Option<ArpFrame>> {
        let mut buf = [0u8; 128];
        loop {
            let n = unsafe {
                libc::recv(
                    self.fd.as_raw_fd(),
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                )
            };
            if n < 0 {
                let err = io::Error::last_os_error();
                return match err.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                    _ => Err(err),
                };
            }
            if let Some(frame) = ArpFrame::from_slice(&buf[..n as usize]) {
                return Ok(Some(frame));
            }
        }
    }

    /// Waits until the socket is readable or `timeout` elapses. Returns
    /// whether data is pending; an interrupted wait counts as a timeout and
    /// the caller's deadline loop retries.
    pub fn poll_read(&self, timeout: Duration) -> io::Result<bool> {
        let mut fds = [libc::pollfd {
            fd: self.fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }];
        let millis = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), 1, millis) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(rc > 0 && fds[0].revents & libc::POLLIN != 0)
    }
}

impl AsRawFd for ArpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
