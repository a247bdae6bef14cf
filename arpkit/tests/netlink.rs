//! Live netlink queries against the host the tests run on. These only read
//! kernel state and need no privileges; they print what they find instead of
//! asserting on environment-specific contents.

use arpkit::NetInfoManager;
use arpkit::netlink::{get_ipv4_addresses, get_ipv4_routes, get_links};

#[test]
fn list_links() {
    let links = get_links().unwrap();
    for link in links {
        println!("Link: {link:#?}");
    }
}

#[test]
fn list_addresses() {
    let addresses = get_ipv4_addresses().unwrap();
    println!("Addresses: {addresses:#?}");
}

#[test]
fn list_routes() {
    let routes = get_ipv4_routes().unwrap();
    for route in routes {
        println!("Route: {route:#?}");
    }
}

#[test]
fn inventory_loads_from_the_kernel() {
    let manager = NetInfoManager::new();
    let interfaces = manager.get_all_netinfo().unwrap();
    for (name, info) in &interfaces {
        println!("{name} : {}, {}/{}", info.mac, info.ip, info.mask.to_cidr());
    }
    let routes = manager.get_all_routeinfo().unwrap();
    for (name, list) in &routes {
        for route in list {
            println!(
                "{name} : {}/{}, {}, {}",
                route.destination,
                route.mask.to_cidr(),
                route.gateway,
                route.metric
            );
        }
    }
    let default = manager.get_default_routeinfo().unwrap();
    println!("default: {default:?}");
}
