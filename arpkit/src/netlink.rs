//! # Routing-Table Netlink Queries
//!
//! ## Purpose
//!
//! This module fetches the kernel's view of the host network over netlink:
//! interface links, their IPv4 addresses, and the main IPv4 routing table.
//! It is the only place the inventory touches the kernel.
//!
//! ## How it works
//!
//! It communicates with the kernel through a raw `NETLINK_ROUTE` socket. The
//! `netlink-packet` crates construct, serialize, and deserialize the
//! messages. A generic `netlink` function drives the dump-request pattern,
//! reading response datagrams until the kernel signals `Done`; the typed
//! query functions hand it a closure that picks the attributes they care
//! about out of each record.
//!
//! ## Main components
//!
//! - `netlink()`: the generic dump request/response loop.
//! - `get_links()`, `get_ipv4_addresses()`, `get_ipv4_routes()`: typed
//!   queries for link, address, and route records.
//! - `Link`, `InterfaceAddress`, `RouteRecord`: the raw records handed to
//!   the inventory.

use netlink_packet_core::{
    NLM_F_DUMP, NLM_F_REQUEST, NetlinkDeserializable, NetlinkMessage, NetlinkPayload,
    NetlinkSerializable,
};
use netlink_packet_route::{
    AddressFamily, RouteNetlinkMessage,
    address::{AddressAttribute, AddressMessage},
    link::{LinkAttribute, LinkMessage},
    route::{RouteAddress, RouteAttribute, RouteHeader, RouteMessage},
};
use netlink_sys::{Socket, SocketAddr};
use std::io;
use std::net::{IpAddr, Ipv4Addr};

/// A network interface link record.
#[derive(Clone, Debug, Default)]
pub struct Link {
    /// The kernel-assigned interface index.
    pub if_index: u32,
    /// The interface name (e.g., "eth0").
    pub name: String,
    /// The hardware address of the interface.
    pub mac: [u8; 6],
}

/// An IPv4 address assigned to an interface.
#[derive(Clone, Copy, Debug)]
pub struct InterfaceAddress {
    /// The index of the owning interface.
    pub if_index: u32,
    /// The locally configured address.
    pub ip: Ipv4Addr,
    /// The prefix length of the subnet the address lives in.
    pub prefix_len: u8,
}

/// An IPv4 route from the main routing table.
#[derive(Clone, Copy, Debug)]
pub struct RouteRecord {
    /// The destination prefix length (CIDR).
    pub dest_prefix: u8,
    /// The destination network address.
    pub destination: Ipv4Addr,
    /// The gateway address, if any.
    pub gateway: Option<Ipv4Addr>,
    /// The source address the kernel prefers for this route, if any.
    pub prefsrc: Option<Ipv4Addr>,
    /// The route priority. Lower values are preferred.
    pub metric: u32,
    /// The index of the egress interface.
    pub out_if_index: Option<u32>,
}

/// A generic function to send a netlink dump request and parse the response.
///
/// # How it works
///
/// It opens a `NETLINK_ROUTE` socket and binds it. The provided request is
/// flagged as a dump, serialized, and sent to the kernel. The response to a
/// dump spans one or more datagrams, each carrying several messages; every
/// inner message is passed to the closure `f`, whose `Some` results are
/// collected, until the terminating `Done` message arrives. A netlink-level
/// error response aborts the dump.
pub fn netlink<T, F, R>(mut req: NetlinkMessage<T>, f: F) -> Result<Vec<R>, io::Error>
where
    T: NetlinkSerializable + NetlinkDeserializable,
    F: Fn(NetlinkMessage<T>) -> Result<Option<R>, io::Error>,
{
    let mut socket = Socket::new(netlink_sys::constants::NETLINK_ROUTE)?;
    let kernel_addr = SocketAddr::new(0, 0);
    socket.bind(&kernel_addr)?;
    req.header.flags = NLM_F_REQUEST | NLM_F_DUMP;
    req.finalize();
    let mut send_buf = vec![0u8; req.buffer_len()];
    req.serialize(&mut send_buf);
    if socket.send(send_buf.as_slice(), 0)? != send_buf.len() {
        return Err(io::Error::other("Failed to send netlink request"));
    }

    let mut result = Vec::new();
    'dump: loop {
        let (recv_buf, _) = socket.recv_from_full()?;
        let mut buffer_view = &recv_buf[..];
        while !buffer_view.is_empty() {
            let msg = NetlinkMessage::<T>::deserialize(buffer_view).map_err(io::Error::other)?;
            let len = msg.header.length as usize;
            if len == 0 || len > buffer_view.len() {
                return Err(io::Error::other(
                    "Received a malformed netlink message (invalid length)",
                ));
            }
            match msg.payload {
                NetlinkPayload::Done(_) => break 'dump,
                NetlinkPayload::Error(ref err) => {
                    return Err(io::Error::other(format!("Netlink error response: {err:?}")));
                }
                _ => {
                    if let Some(r) = f(msg)? {
                        result.push(r);
                    }
                }
            }
            buffer_view = &buffer_view[len..];
        }
    }
    Ok(result)
}

/// Retrieves every network interface link from the kernel.
///
/// Links whose hardware address is not 6 bytes (non-Ethernet devices) are
/// skipped.
pub fn get_links() -> Result<Vec<Link>, io::Error> {
    let req = NetlinkMessage::from(RouteNetlinkMessage::GetLink(LinkMessage::default()));
    netlink(req, |msg| match msg.payload {
        NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewLink(ref link_msg)) => {
            let mut link = Link {
                if_index: link_msg.header.index,
                ..Default::default()
            };
            for attr in link_msg.attributes.iter() {
                match attr {
                    LinkAttribute::IfName(name) => {
                        link.name = name.to_string();
                    }
                    LinkAttribute::Address(mac) => {
                        if mac.len() == 6 {
                            link.mac = mac[0..6]
                                .try_into()
                                .map_err(|_| io::Error::from(io::ErrorKind::InvalidData))?;
                        } else {
                            return Ok(None);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Some(link))
        }
        _ => Ok(None),
    })
}

/// Retrieves the IPv4 addresses assigned to network interfaces, together
/// with their owning interface index and prefix length.
pub fn get_ipv4_addresses() -> Result<Vec<InterfaceAddress>, io::Error> {
    let mut req_msg = AddressMessage::default();
    req_msg.header.family = AddressFamily::Inet;
    let req = NetlinkMessage::from(RouteNetlinkMessage::GetAddress(req_msg));
    netlink(req, |msg| match msg.payload {
        NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewAddress(ref addr_msg)) => {
            for attr in addr_msg.attributes.iter() {
                // IFA_LOCAL is the interface's own address; IFA_ADDRESS is
                // the peer on point-to-point links.
                if let AddressAttribute::Local(IpAddr::V4(ip)) = attr {
                    return Ok(Some(InterfaceAddress {
                        if_index: addr_msg.header.index,
                        ip: *ip,
                        prefix_len: addr_msg.header.prefix_len,
                    }));
                }
            }
            Ok(None)
        }
        _ => Ok(None),
    })
}

/// Retrieves the IPv4 routes of the main routing table.
pub fn get_ipv4_routes() -> Result<Vec<RouteRecord>, io::Error> {
    let mut req_msg = RouteMessage::default();
    req_msg.header.address_family = AddressFamily::Inet;
    let req = NetlinkMessage::from(RouteNetlinkMessage::GetRoute(req_msg));
    netlink(req, |msg| match msg.payload {
        NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewRoute(ref route_msg)) => {
            if route_msg.header.table != RouteHeader::RT_TABLE_MAIN {
                return Ok(None); // Skip routes outside the main table
            }
            let mut route = RouteRecord {
                dest_prefix: route_msg.header.destination_prefix_length,
                destination: Ipv4Addr::UNSPECIFIED,
                gateway: None,
                prefsrc: None,
                metric: 0,
                out_if_index: None,
            };
            for attr in route_msg.attributes.iter() {
                match attr {
                    RouteAttribute::Destination(RouteAddress::Inet(dest)) => {
                        route.destination = *dest;
                    }
                    RouteAttribute::Gateway(RouteAddress::Inet(gateway)) => {
                        route.gateway = Some(*gateway);
                    }
                    RouteAttribute::PrefSource(RouteAddress::Inet(prefsrc)) => {
                        route.prefsrc = Some(*prefsrc);
                    }
                    RouteAttribute::Priority(priority) => {
                        route.metric = *priority;
                    }
                    RouteAttribute::Oif(oif) => {
                        route.out_if_index = Some(*oif);
                    }
                    _ => {}
                }
            }
            Ok(Some(route))
        }
        _ => Ok(None),
    })
}
