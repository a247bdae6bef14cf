//! Single-target ARP resolution.
//!
//! Resolves the MAC address owning an IPv4 address on the local subnet by
//! broadcasting requests and waiting for the matching reply. A helper thread
//! retransmits the request every 100 ms until the main thread either
//! validates a reply or runs out its deadline; an atomic stop flag is the
//! only coordination between the two, and the helper is joined before the
//! socket closes on every exit path.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::frame::{ArpFrame, ArpOperation};
use crate::inventory::NetInfoManager;
use crate::ipv4::Ipv4Addr;
use crate::mac::MacAddr;
use crate::socket::ArpSocket;

/// Interval between request retransmissions.
const RETRANSMIT_INTERVAL: Duration = Duration::from_millis(100);

/// Default overall wait for a reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Resolves `ip` with the default one-second timeout.
pub fn resolve(ip: Ipv4Addr) -> io::Result<MacAddr> {
    resolve_with_timeout(ip, DEFAULT_TIMEOUT)
}

/// Resolves the MAC address owning `ip`.
///
/// The best route to `ip` selects the egress interface; resolution fails
/// with an invalid-argument error when no route exists or the target is not
/// in the interface's subnet, and short-circuits when the target is the
/// interface itself. The request carries the route's preferred source
/// address, falling back to the interface address.
pub fn resolve_with_timeout(ip: Ipv4Addr, timeout: Duration) -> io::Result<MacAddr> {
    let manager = NetInfoManager::instance();
    let (if_name, route) = manager.get_best_routeinfo(ip)?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "No route to the target address")
    })?;
    let info = manager
        .get_netinfo(&if_name)?
        .ok_or_else(|| io::Error::other("Failed to get interface information"))?;
    if info.ip == ip {
        return Ok(info.mac);
    }
    if (info.ip & info.mask) != (ip & info.mask) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "The target address is not in the interface's network",
        ));
    }
    let if_index = manager
        .get_interface_index(&if_name)?
        .ok_or_else(|| io::Error::other("Failed to get interface index"))?;

    let socket = ArpSocket::open(if_index)?;
    let sender_ip = if route.prefsrc.is_unspecified() {
        info.ip
    } else {
        route.prefsrc
    };
    let request = ArpFrame::request(info.mac, sender_ip, ip);
    log::debug!("Resolving {ip} via {if_name} from {sender_ip}");

    let stop = AtomicBool::new(false);
    thread::scope(|scope| {
        scope.spawn(|| {
            while !stop.load(Ordering::Acquire) {
                if socket.send(&request).is_err() {
                    break;
                }
                thread::sleep(RETRANSMIT_INTERVAL);
            }
        });
        let outcome = wait_for_reply(&socket, &request, timeout);
        stop.store(true, Ordering::Release);
        outcome
    })
}

/// Drains the socket until a reply matches the request: the reply's sender
/// must be the address we asked about and its target our own sender
/// address. The first match wins.
fn wait_for_reply(socket: &ArpSocket, request: &ArpFrame, timeout: Duration) -> io::Result<MacAddr> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "No ARP reply before the timeout",
            ));
        }
        socket.poll_read(remaining)?;
        while let Some(reply) = socket.recv()? {
            if reply.operation == ArpOperation::Reply
                && reply.sender_ip == request.target_ip
                && reply.target_ip == request.sender_ip
            {
                return Ok(reply.sender_mac);
            }
        }
    }
}
