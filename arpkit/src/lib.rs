#![doc = include_str!("../../README.md")]

pub mod frame;
pub mod inventory;
pub mod ipv4;
pub mod mac;
pub mod mask;
pub mod netlink;
pub mod poison;
pub mod resolve;
pub mod socket;
pub mod sweep;

pub use frame::{ARP_FRAME_LEN, ArpFrame, ArpOperation};
pub use inventory::{NetInfo, NetInfoManager, RouteInfo};
pub use ipv4::Ipv4Addr;
pub use mac::MacAddr;
pub use mask::{SubnetMask, ip_range};
pub use poison::poison;
pub use resolve::{DEFAULT_TIMEOUT, resolve, resolve_with_timeout};
pub use socket::ArpSocket;
pub use sweep::{DEFAULT_BATCH, DEFAULT_RETRIES, sweep};
