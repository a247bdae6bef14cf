//! The `arpkit` command: inventory listings and the privileged ARP
//! operations, dispatching into the library.

use std::process::ExitCode;

use anyhow::{Context as _, bail};
use clap::{Parser, Subcommand};
use ipnet::Ipv4Net;

use arpkit::{
    DEFAULT_BATCH, DEFAULT_RETRIES, Ipv4Addr, NetInfoManager, SubnetMask, ip_range, poison, sweep,
};

#[derive(Parser, Debug)]
#[command(name = "arpkit", version, about = "ARP reconnaissance and disruption toolkit")]
#[command(arg_required_else_help = true)]
#[command(after_help = "You will need CAP_NET_RAW (root) to run the ARP commands.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the network interface list
    Interfaces,
    /// Print the main routing table
    Routes,
    /// Scan for devices in the network of <TARGET> (interface name or CIDR)
    Arpscan { target: String },
    /// Block the network connection of <IP> until interrupted
    Arpblock { ip: String },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders help and usage itself; usage violations exit 1
            let _ = err.print();
            return ExitCode::from(1);
        }
    };
    let result = match cli.command {
        Command::Interfaces => show_interfaces(),
        Command::Routes => show_routes(),
        Command::Arpscan { target } => require_net_raw().and_then(|()| arpscan(&target)),
        Command::Arpblock { ip } => require_net_raw().and_then(|()| arpblock(&ip)),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn require_net_raw() -> anyhow::Result<()> {
    let allowed = caps::has_cap(
        None,
        caps::CapSet::Effective,
        caps::Capability::CAP_NET_RAW,
    )
    .map_err(|err| anyhow::anyhow!("Failed to read process capabilities: {err}"))?;
    if !allowed {
        bail!("You need CAP_NET_RAW (run as root) for ARP commands");
    }
    Ok(())
}

fn show_interfaces() -> anyhow::Result<()> {
    let manager = NetInfoManager::instance();
    let interfaces = manager
        .get_all_netinfo()
        .context("Failed to load the interface inventory")?;
    let mut names: Vec<&String> = interfaces.keys().collect();
    names.sort();
    for name in names {
        let info = &interfaces[name];
        print!("{name} : {}, {}/{}", info.mac, info.ip, info.mask.to_cidr());
        match manager.get_gateway_ip(name)? {
            Some(gateway) => println!(", {gateway}"),
            None => println!(),
        }
    }
    Ok(())
}

fn show_routes() -> anyhow::Result<()> {
    let routes = NetInfoManager::instance()
        .get_all_routeinfo()
        .context("Failed to load the routing inventory")?;
    let mut names: Vec<&String> = routes.keys().collect();
    names.sort();
    for name in names {
        for route in &routes[name] {
            println!(
                "{name} : {}/{}, {}, {}",
                route.destination,
                route.mask.to_cidr(),
                route.gateway,
                route.metric
            );
        }
    }
    Ok(())
}

fn arpscan(target: &str) -> anyhow::Result<()> {
    let (first, last) = if let Ok(net) = target.parse::<Ipv4Net>() {
        ip_range(
            Ipv4Addr::from(net.addr()),
            SubnetMask::from_cidr(net.prefix_len()),
        )
    } else {
        NetInfoManager::instance()
            .get_ip_range(target, None)
            .context("Failed to determine the scan range")?
    };
    if first > last {
        bail!("The network of {target} has no scannable hosts");
    }
    let ips: Vec<Ipv4Addr> = (u32::from(first)..=u32::from(last))
        .map(Ipv4Addr::from)
        .collect();
    log::info!("Scanning {} hosts ({first} - {last})", ips.len());
    sweep(
        &ips,
        |ip, mac| {
            if !ip.is_unspecified() {
                println!("{ip} {mac}");
            }
        },
        DEFAULT_BATCH,
        DEFAULT_RETRIES,
    )
    .context("ARP sweep failed")?;
    Ok(())
}

fn arpblock(ip: &str) -> anyhow::Result<()> {
    let victim: Ipv4Addr = ip.parse().context("Invalid victim IP address")?;
    poison(victim).context("ARP blocking failed")?;
    Ok(())
}
