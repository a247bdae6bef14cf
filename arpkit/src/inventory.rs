//! # Host Network Inventory
//!
//! ## Purpose
//!
//! This module caches the host's interface and route configuration and
//! answers the queries the ARP engine needs: interface records, gateway
//! addresses, best routes, and scannable subnet ranges.
//!
//! ## How it works
//!
//! `NetInfoManager` is a process-wide singleton constructed on first access.
//! Loading dumps link, address, and route records over netlink, assembles
//! fresh tables, and swaps them in under the owning mutex, so a failed
//! reload leaves the previous tables intact. Getters trigger a lazy load
//! when their table is empty, always before taking the lock, and hand out
//! owned copies that stay valid across reloads.
//!
//! ## Main components
//!
//! - `NetInfo`, `RouteInfo`: one interface's configuration, one route.
//! - `NetInfoManager`: the singleton with its interface and route indexes.
//! - `build_interface_table()`, `build_route_table()`: pure assembly of the
//!   indexes from netlink records.

use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, OnceLock};

use crate::ipv4::Ipv4Addr;
use crate::mac::MacAddr;
use crate::mask::{SubnetMask, ip_range};
use crate::netlink::{self, InterfaceAddress, Link, RouteRecord};

/// One interface's link-layer and IPv4 configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetInfo {
    pub mac: MacAddr,
    pub ip: Ipv4Addr,
    pub mask: SubnetMask,
}

/// One route of the main routing table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RouteInfo {
    pub destination: Ipv4Addr,
    pub mask: SubnetMask,
    pub gateway: Ipv4Addr,
    pub prefsrc: Ipv4Addr,
    pub metric: u32,
}

#[derive(Debug, Default)]
struct IfTable {
    by_name: HashMap<String, NetInfo>,
    name_by_index: HashMap<u32, String>,
    index_by_name: HashMap<String, u32>,
}

/// Routes grouped by egress interface name.
pub type RouteTable = HashMap<String, Vec<RouteInfo>>;

/// The process-wide interface and route inventory.
///
/// Use [`NetInfoManager::instance`] for the shared singleton; tests that
/// need isolation construct their own instance with [`NetInfoManager::new`].
#[derive(Debug)]
pub struct NetInfoManager {
    interfaces: Mutex<IfTable>,
    routes: Mutex<RouteTable>,
}

impl NetInfoManager {
    /// The shared inventory, constructed on first access.
    pub fn instance() -> &'static NetInfoManager {
        static INSTANCE: OnceLock<NetInfoManager> = OnceLock::new();
        INSTANCE.get_or_init(NetInfoManager::new)
    }

    /// An empty inventory; every table loads on demand.
    pub fn new() -> NetInfoManager {
        NetInfoManager {
            interfaces: Mutex::new(IfTable::default()),
            routes: Mutex::new(RouteTable::new()),
        }
    }

    /// Dumps link and address records and replaces the interface index.
    pub fn load_netinfo(&self) -> io::Result<()> {
        let links = netlink::get_links()?;
        let addresses = netlink::get_ipv4_addresses()?;
        let table = build_interface_table(links, addresses);
        *self.interfaces.lock().unwrap() = table;
        Ok(())
    }

    /// Dumps the main routing table and replaces the route index. Loads the
    /// interface index first if it is still empty, since routes are grouped
    /// by interface name.
    pub fn load_routeinfo(&self) -> io::Result<()> {
        let needs_links = self.interfaces.lock().unwrap().by_name.is_empty();
        if needs_links {
            self.load_netinfo()?;
        }
        let records = netlink::get_ipv4_routes()?;
        let names = self.interfaces.lock().unwrap().name_by_index.clone();
        let table = build_route_table(records, &names);
        *self.routes.lock().unwrap() = table;
        Ok(())
    }

    /// Refreshes both indexes.
    pub fn reload(&self) -> io::Result<()> {
        self.load_netinfo()?;
        self.load_routeinfo()
    }

    fn ensure_interfaces(&self) -> io::Result<()> {
        let empty = self.interfaces.lock().unwrap().by_name.is_empty();
        if empty {
            self.load_netinfo()?;
        }
        Ok(())
    }

    fn ensure_routes(&self) -> io::Result<()> {
        let empty = self.routes.lock().unwrap().is_empty();
        if empty {
            self.load_routeinfo()?;
        }
        Ok(())
    }

    /// Every known interface, keyed by name.
    pub fn get_all_netinfo(&self) -> io::Result<HashMap<String, NetInfo>> {
        self.ensure_interfaces()?;
        Ok(self.interfaces.lock().unwrap().by_name.clone())
    }

    /// Every admitted route, grouped by egress interface name.
    pub fn get_all_routeinfo(&self) -> io::Result<RouteTable> {
        self.ensure_routes()?;
        Ok(self.routes.lock().unwrap().clone())
    }

    /// The configuration of the named interface.
    pub fn get_netinfo(&self, name: &str) -> io::Result<Option<NetInfo>> {
        if name.is_empty() {
            return Ok(None);
        }
        self.ensure_interfaces()?;
        Ok(self.interfaces.lock().unwrap().by_name.get(name).copied())
    }

    /// The kernel index of the named interface.
    pub fn get_interface_index(&self, name: &str) -> io::Result<Option<u32>> {
        self.ensure_interfaces()?;
        Ok(self
            .interfaces
            .lock()
            .unwrap()
            .index_by_name
            .get(name)
            .copied())
    }

    /// The name of the interface with the given kernel index.
    pub fn get_interface_name(&self, index: u32) -> io::Result<Option<String>> {
        self.ensure_interfaces()?;
        Ok(self
            .interfaces
            .lock()
            .unwrap()
            .name_by_index
            .get(&index)
            .cloned())
    }

    /// The first route on the named interface with a non-zero gateway.
    pub fn get_gateway_ip(&self, name: &str) -> io::Result<Option<Ipv4Addr>> {
        self.ensure_routes()?;
        Ok(self.routes.lock().unwrap().get(name).and_then(|list| {
            list.iter()
                .find(|route| !route.gateway.is_unspecified())
                .map(|route| route.gateway)
        }))
    }

    /// The most specific route covering `destination`: longest prefix first,
    /// lowest metric among equals. `None` when no route matches.
    pub fn get_best_routeinfo(
        &self,
        destination: Ipv4Addr,
    ) -> io::Result<Option<(String, RouteInfo)>> {
        self.ensure_routes()?;
        let routes = self.routes.lock().unwrap();
        let mut best: Option<(String, RouteInfo)> = None;
        for (name, list) in routes.iter() {
            for route in list {
                if (destination & route.mask) != route.destination {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((_, current)) => {
                        let (prefix, current_prefix) =
                            (route.mask.to_cidr(), current.mask.to_cidr());
                        prefix > current_prefix
                            || (prefix == current_prefix && route.metric < current.metric)
                    }
                };
                if better {
                    best = Some((name.clone(), *route));
                }
            }
        }
        Ok(best)
    }

    /// The default route: destination and mask both zero. When several
    /// defaults exist the one with the lowest metric wins.
    pub fn get_default_routeinfo(&self) -> io::Result<Option<(String, RouteInfo)>> {
        self.ensure_routes()?;
        let routes = self.routes.lock().unwrap();
        let mut best: Option<(String, RouteInfo)> = None;
        for (name, list) in routes.iter() {
            for route in list {
                if !route.destination.is_unspecified() || route.mask != SubnetMask::ZERO {
                    continue;
                }
                let better = match &best {
                    None => true,
                    Some((_, current)) => route.metric < current.metric,
                };
                if better {
                    best = Some((name.clone(), *route));
                }
            }
        }
        Ok(best)
    }

    /// The scannable host range of the named interface's subnet. With
    /// `maximum_mask` set, the numerically larger mask wins, capping how
    /// much of the subnet a sweep covers.
    pub fn get_ip_range(
        &self,
        name: &str,
        maximum_mask: Option<SubnetMask>,
    ) -> io::Result<(Ipv4Addr, Ipv4Addr)> {
        if name.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Empty interface name",
            ));
        }
        let info = self.get_netinfo(name)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Unknown interface name")
        })?;
        let mask = match maximum_mask {
            Some(maximum) if maximum > info.mask => maximum,
            _ => info.mask,
        };
        Ok(ip_range(info.ip, mask))
    }
}

impl Default for NetInfoManager {
    fn default() -> Self {
        NetInfoManager::new()
    }
}

/// Merges link and address records by kernel index into the interface
/// index. Addresses whose interface did not appear in the link dump are
/// dropped.
fn build_interface_table(links: Vec<Link>, addresses: Vec<InterfaceAddress>) -> IfTable {
    let mut table = IfTable::default();
    let mut by_index: HashMap<u32, NetInfo> = HashMap::new();
    for link in links {
        by_index.insert(
            link.if_index,
            NetInfo {
                mac: MacAddr::from_octets(link.mac),
                ..Default::default()
            },
        );
        table.index_by_name.insert(link.name.clone(), link.if_index);
        table.name_by_index.insert(link.if_index, link.name);
    }
    for addr in addresses {
        if let Some(info) = by_index.get_mut(&addr.if_index) {
            info.ip = Ipv4Addr::from(addr.ip);
            info.mask = SubnetMask::from_cidr(addr.prefix_len);
        }
    }
    for (index, info) in by_index {
        if let Some(name) = table.name_by_index.get(&index) {
            table.by_name.insert(name.clone(), info);
        }
    }
    table
}

/// Groups route records by egress interface name. A route is admitted only
/// when it carries a preferred source or a gateway; anything else is
/// unusable for ARP work.
fn build_route_table(records: Vec<RouteRecord>, names: &HashMap<u32, String>) -> RouteTable {
    let mut table = RouteTable::new();
    for record in records {
        let info = RouteInfo {
            destination: Ipv4Addr::from(record.destination),
            mask: SubnetMask::from_cidr(record.dest_prefix),
            gateway: record.gateway.map(Ipv4Addr::from).unwrap_or_default(),
            prefsrc: record.prefsrc.map(Ipv4Addr::from).unwrap_or_default(),
            metric: record.metric,
        };
        if info.prefsrc.is_unspecified() && info.gateway.is_unspecified() {
            continue;
        }
        let Some(name) = record.out_if_index.and_then(|index| names.get(&index)) else {
            continue;
        };
        table.entry(name.clone()).or_default().push(info);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn route(dest: &str, prefix: u8, gateway: &str, prefsrc: &str, metric: u32) -> RouteInfo {
        RouteInfo {
            destination: ip(dest),
            mask: SubnetMask::from_cidr(prefix),
            gateway: ip(gateway),
            prefsrc: ip(prefsrc),
            metric,
        }
    }

    fn manager_with_routes(routes: Vec<(&str, Vec<RouteInfo>)>) -> NetInfoManager {
        let manager = NetInfoManager::new();
        let table: RouteTable = routes
            .into_iter()
            .map(|(name, list)| (name.to_string(), list))
            .collect();
        *manager.routes.lock().unwrap() = table;
        manager
    }

    #[test]
    fn best_route_prefers_longest_prefix_then_metric() {
        let manager = manager_with_routes(vec![(
            "en0",
            vec![
                route("0.0.0.0", 0, "10.0.0.1", "0.0.0.0", 100),
                route("10.0.0.0", 24, "0.0.0.0", "10.0.0.5", 0),
            ],
        )]);

        let (name, best) = manager.get_best_routeinfo(ip("10.0.0.5")).unwrap().unwrap();
        assert_eq!(name, "en0");
        assert_eq!(best.mask.to_cidr(), 24);

        let (_, best) = manager.get_best_routeinfo(ip("8.8.8.8")).unwrap().unwrap();
        assert_eq!(best.mask.to_cidr(), 0);
        assert_eq!(best.gateway, ip("10.0.0.1"));
    }

    #[test]
    fn best_route_breaks_prefix_ties_by_metric() {
        let manager = manager_with_routes(vec![
            ("en0", vec![route("10.0.0.0", 24, "10.0.0.1", "0.0.0.0", 600)]),
            ("en1", vec![route("10.0.0.0", 24, "10.0.0.2", "0.0.0.0", 100)]),
        ]);
        let (name, best) = manager.get_best_routeinfo(ip("10.0.0.9")).unwrap().unwrap();
        assert_eq!(name, "en1");
        assert_eq!(best.metric, 100);
    }

    #[test]
    fn best_route_returns_none_without_a_match() {
        let manager = manager_with_routes(vec![(
            "en0",
            vec![route("10.0.0.0", 24, "0.0.0.0", "10.0.0.5", 0)],
        )]);
        assert!(manager.get_best_routeinfo(ip("8.8.8.8")).unwrap().is_none());
    }

    #[test]
    fn default_route_takes_the_lowest_metric() {
        let manager = manager_with_routes(vec![
            ("en0", vec![route("0.0.0.0", 0, "10.0.0.1", "0.0.0.0", 100)]),
            ("wl0", vec![route("0.0.0.0", 0, "172.16.0.1", "0.0.0.0", 600)]),
        ]);
        let (name, best) = manager.get_default_routeinfo().unwrap().unwrap();
        assert_eq!(name, "en0");
        assert_eq!(best.gateway, ip("10.0.0.1"));
    }

    #[test]
    fn gateway_is_the_first_nonzero_entry() {
        let manager = manager_with_routes(vec![(
            "en0",
            vec![
                route("10.0.0.0", 24, "0.0.0.0", "10.0.0.5", 0),
                route("0.0.0.0", 0, "10.0.0.1", "0.0.0.0", 100),
            ],
        )]);
        assert_eq!(
            manager.get_gateway_ip("en0").unwrap(),
            Some(ip("10.0.0.1"))
        );
        assert_eq!(manager.get_gateway_ip("wl0").unwrap(), None);
    }

    #[test]
    fn route_admission_requires_prefsrc_or_gateway() {
        let names: HashMap<u32, String> = [(2u32, "en0".to_string())].into();
        let records = vec![
            RouteRecord {
                dest_prefix: 24,
                destination: "10.0.0.0".parse().unwrap(),
                gateway: None,
                prefsrc: None,
                metric: 0,
                out_if_index: Some(2),
            },
            RouteRecord {
                dest_prefix: 24,
                destination: "10.1.0.0".parse().unwrap(),
                gateway: Some("10.1.0.1".parse().unwrap()),
                prefsrc: None,
                metric: 0,
                out_if_index: Some(2),
            },
            RouteRecord {
                dest_prefix: 24,
                destination: "10.2.0.0".parse().unwrap(),
                gateway: None,
                prefsrc: Some("10.2.0.7".parse().unwrap()),
                metric: 0,
                out_if_index: Some(2),
            },
            // No egress interface, dropped even with a gateway.
            RouteRecord {
                dest_prefix: 24,
                destination: "10.3.0.0".parse().unwrap(),
                gateway: Some("10.3.0.1".parse().unwrap()),
                prefsrc: None,
                metric: 0,
                out_if_index: None,
            },
        ];
        let table = build_route_table(records, &names);
        let admitted = &table["en0"];
        assert_eq!(admitted.len(), 2);
        assert!(admitted.iter().all(|r| r.destination != ip("10.0.0.0")));
    }

    #[test]
    fn interface_table_merges_by_kernel_index() {
        let links = vec![
            Link {
                if_index: 1,
                name: "lo".to_string(),
                mac: [0; 6],
            },
            Link {
                if_index: 2,
                name: "en0".to_string(),
                mac: [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF],
            },
        ];
        let addresses = vec![
            InterfaceAddress {
                if_index: 2,
                ip: "192.168.1.37".parse().unwrap(),
                prefix_len: 24,
            },
            // Unknown interface index, dropped.
            InterfaceAddress {
                if_index: 9,
                ip: "10.0.0.1".parse().unwrap(),
                prefix_len: 8,
            },
        ];
        let table = build_interface_table(links, addresses);
        assert_eq!(table.by_name.len(), 2);
        let en0 = table.by_name["en0"];
        assert_eq!(en0.mac.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(en0.ip, ip("192.168.1.37"));
        assert_eq!(en0.mask.to_cidr(), 24);
        assert_eq!(table.index_by_name["en0"], 2);
        assert_eq!(table.name_by_index[&2], "en0");
    }

    #[test]
    fn ip_range_uses_the_larger_mask() {
        let manager = NetInfoManager::new();
        let mut table = IfTable::default();
        table.by_name.insert(
            "en0".to_string(),
            NetInfo {
                mac: MacAddr::ZERO,
                ip: ip("192.168.1.37"),
                mask: SubnetMask::from_cidr(24),
            },
        );
        table.index_by_name.insert("en0".to_string(), 2);
        table.name_by_index.insert(2, "en0".to_string());
        *manager.interfaces.lock().unwrap() = table;

        let (first, last) = manager.get_ip_range("en0", None).unwrap();
        assert_eq!(first, ip("192.168.1.1"));
        assert_eq!(last, ip("192.168.1.254"));

        // A shorter maximum mask does not widen the range.
        let (first, last) = manager
            .get_ip_range("en0", Some(SubnetMask::from_cidr(16)))
            .unwrap();
        assert_eq!(first, ip("192.168.1.1"));
        assert_eq!(last, ip("192.168.1.254"));

        // A longer one narrows it.
        let (first, last) = manager
            .get_ip_range("en0", Some(SubnetMask::from_cidr(28)))
            .unwrap();
        assert_eq!(first, ip("192.168.1.33"));
        assert_eq!(last, ip("192.168.1.46"));

        assert!(manager.get_ip_range("", None).is_err());
    }
}
