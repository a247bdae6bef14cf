//! # Batched ARP Subnet Sweep
//!
//! ## Purpose
//!
//! This module discovers live hosts by sending ARP requests to a list of
//! addresses in batches and streaming each discovered `(ip, mac)` pair to a
//! callback.
//!
//! ## How it works
//!
//! One raw socket serves the whole sweep. A receiver thread drains it and
//! matches replies against a mutex-guarded outstanding set; every hit is
//! removed from the set and reported through the callback, which the
//! receiver serializes. The main thread feeds the set one batch at a time:
//! it retransmits requests for whatever is still outstanding on every pass,
//! then waits a bounded drain period before declaring the leftovers timed
//! out. An atomic stop flag coordinates shutdown, and the receiver is
//! joined before the socket closes on every exit path.
//!
//! ## Main components
//!
//! - `sweep()`: the batched request/response engine.
//! - `receive_replies()`: the receiver loop.

use std::collections::HashSet;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::frame::{ArpFrame, ArpOperation};
use crate::inventory::NetInfoManager;
use crate::ipv4::Ipv4Addr;
use crate::mac::MacAddr;
use crate::socket::ArpSocket;

/// Default number of addresses in flight per batch.
pub const DEFAULT_BATCH: usize = 50;
/// Default number of send passes per batch.
pub const DEFAULT_RETRIES: u32 = 3;

/// Pause between send passes.
const PASS_INTERVAL: Duration = Duration::from_millis(100);
/// Poll interval while draining a batch.
const DRAIN_POLL: Duration = Duration::from_millis(50);
/// Total time budget per batch, shared between passes and draining.
const BATCH_BUDGET_MS: u64 = 500;

/// Sweeps `ips`, invoking `on_reply(ip, mac)` for every host that answers
/// and a terminal `on_reply(0.0.0.0, 00:00:00:00:00:00)` once the sweep
/// completes.
///
/// The route of the first address selects the egress interface; the caller
/// ensures all addresses share a network. Callbacks are serialized and the
/// sentinel strictly follows every other invocation. Addresses still
/// outstanding when their batch's drain budget runs out are dropped as
/// timed out.
pub fn sweep<F>(ips: &[Ipv4Addr], on_reply: F, batch: usize, retries: u32) -> io::Result<()>
where
    F: FnMut(Ipv4Addr, MacAddr) + Send,
{
    let invalid = |msg| io::Error::new(io::ErrorKind::InvalidInput, msg);
    if ips.is_empty() {
        return Err(invalid("The address list must contain at least one entry"));
    }
    if batch < 1 {
        return Err(invalid("The batch size must be at least 1"));
    }
    if retries < 1 {
        return Err(invalid("The retry count must be at least 1"));
    }

    let manager = NetInfoManager::instance();
    let (if_name, route) = manager
        .get_best_routeinfo(ips[0])?
        .ok_or_else(|| invalid("No route to the scanned network"))?;
    let info = manager
        .get_netinfo(&if_name)?
        .ok_or_else(|| io::Error::other("Failed to get interface information"))?;
    let if_index = manager
        .get_interface_index(&if_name)?
        .ok_or_else(|| io::Error::other("Failed to get interface index"))?;
    let sender_ip = if route.prefsrc.is_unspecified() {
        info.ip
    } else {
        route.prefsrc
    };
    let socket = ArpSocket::open(if_index)?;
    log::debug!(
        "Sweeping {} addresses via {if_name} in batches of {batch}",
        ips.len()
    );

    let stop = AtomicBool::new(false);
    let outstanding: Mutex<HashSet<Ipv4Addr>> = Mutex::new(HashSet::new());
    let on_reply = Mutex::new(on_reply);
    let receiver_error: Mutex<Option<io::Error>> = Mutex::new(None);
    let drain_budget =
        Duration::from_millis(BATCH_BUDGET_MS.saturating_sub(100 * u64::from(retries)));

    let send_result = thread::scope(|scope| -> io::Result<()> {
        scope.spawn(|| {
            receive_replies(
                &socket,
                sender_ip,
                &outstanding,
                &on_reply,
                &stop,
                &receiver_error,
            );
        });

        let mut result = Ok(());
        'batches: for window in ips.chunks(batch) {
            *outstanding.lock().unwrap() = window.iter().copied().collect();
            for _ in 0..retries {
                if stop.load(Ordering::Acquire) {
                    break 'batches; // Receiver went down
                }
                let pending: Vec<Ipv4Addr> =
                    outstanding.lock().unwrap().iter().copied().collect();
                for ip in pending {
                    let request = ArpFrame::request(info.mac, sender_ip, ip);
                    if let Err(err) = socket.send(&request) {
                        result = Err(err);
                        break 'batches;
                    }
                }
                thread::sleep(PASS_INTERVAL);
            }
            let deadline = Instant::now() + drain_budget;
            while !outstanding.lock().unwrap().is_empty() && Instant::now() < deadline {
                thread::sleep(DRAIN_POLL);
            }
            outstanding.lock().unwrap().clear(); // Leftovers timed out
        }
        stop.store(true, Ordering::Release);
        result
    });

    send_result?;
    if let Some(err) = receiver_error.lock().unwrap().take() {
        return Err(err);
    }
    let mut callback = on_reply.into_inner().unwrap();
    callback(Ipv4Addr::UNSPECIFIED, MacAddr::ZERO);
    Ok(())
}

/// Drains the socket until stopped. A reply counts when it targets our
/// sender address and its sender is still outstanding; the address is then
/// retired and reported. Socket failures are parked for the main thread and
/// flagged through `stop`.
fn receive_replies<F>(
    socket: &ArpSocket,
    sender_ip: Ipv4Addr,
    outstanding: &Mutex<HashSet<Ipv4Addr>>,
    on_reply: &Mutex<F>,
    stop: &AtomicBool,
    receiver_error: &Mutex<Option<io::Error>>,
) where
    F: FnMut(Ipv4Addr, MacAddr) + Send,
{
    let park = |err: io::Error| {
        *receiver_error.lock().unwrap() = Some(err);
        stop.store(true, Ordering::Release);
    };
    while !stop.load(Ordering::Acquire) {
        if let Err(err) = socket.poll_read(DRAIN_POLL) {
            park(err);
            return;
        }
        loop {
            match socket.recv() {
                Ok(Some(reply)) => {
                    if reply.operation != ArpOperation::Reply || reply.target_ip != sender_ip {
                        continue;
                    }
                    let hit = outstanding.lock().unwrap().remove(&reply.sender_ip);
                    if hit {
                        let mut callback = on_reply.lock().unwrap();
                        (*callback)(reply.sender_ip, reply.sender_mac);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    park(err);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sweep;
    use crate::ipv4::Ipv4Addr;
    use std::io;

    #[test]
    fn rejects_an_empty_address_list() {
        let err = sweep(&[], |_, _| {}, 50, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_a_zero_batch() {
        let ips = [Ipv4Addr::from(0xC0A8_0001)];
        let err = sweep(&ips, |_, _| {}, 0, 3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_zero_retries() {
        let ips = [Ipv4Addr::from(0xC0A8_0001)];
        let err = sweep(&ips, |_, _| {}, 50, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
