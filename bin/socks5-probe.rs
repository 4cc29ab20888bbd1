use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::info;

use socks5_tunnel::config::{parse_duration, parse_endpoint, ClientFileConfig, FileConfig};
use socks5_tunnel::socks5::{Address, ConnectTunnel, UdpAssociateTunnel, UdpOverTcpTunnel};
use socks5_tunnel::telemetry;
use socks5_tunnel::TunnelClient;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Connect,
    UdpOverTcp,
    UdpAssociate,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Open a tunnel through a SOCKS5 server and print the relay address", long_about = None)]
struct Args {
    #[arg(short, long, help = "SOCKS5 server, host:port or [v6]:port")]
    server: Option<String>,

    #[arg(short, long, help = "Path to a JSON client config")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Username for RFC 1929 authentication")]
    user: Option<String>,

    #[arg(short, long, help = "Password for RFC 1929 authentication")]
    password: Option<String>,

    #[arg(short, long, value_enum, default_value_t = Mode::Connect)]
    mode: Mode,

    #[arg(short, long, help = "Tunnel target for connect mode, or the local UDP source for udp-associate")]
    target: Option<String>,

    #[arg(short, long, help = "Local address to bind the TCP socket to")]
    bind: Option<SocketAddr>,

    #[arg(long, help = "Connect plus handshake timeout, e.g. 5s or 500ms")]
    timeout: Option<String>,

    #[arg(long, help = "trace, debug, info, warn or error")]
    log_level: Option<String>,

    #[arg(long, help = "Print handshake counters as JSON on exit")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level_as_tracing())
        .with_writer(std::io::stderr)
        .init();

    let client = TunnelClient::from_config(&config)?;
    let (host, port) = client.server();
    info!(server = %format!("{}:{}", host, port), mode = ?args.mode, "opening tunnel");

    let result = run(&client, &args).await;

    if args.stats {
        println!("{}", serde_json::to_string_pretty(&telemetry::handshake_snapshot())?);
    }
    result
}

async fn run(
    client: &TunnelClient,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match args.mode {
        Mode::Connect => {
            let target = args
                .target
                .as_deref()
                .ok_or("--target is required in connect mode")?;
            let mut tunnel = ConnectTunnel::new(parse_target(target)?);
            if let Some(bind) = args.bind {
                tunnel = tunnel.with_source(bind);
            }
            let (tunnel, _stream) = client.establish(tunnel).await?;
            match tunnel.bound_address() {
                Some(bound) => println!("{}", bound),
                None => println!("connected"),
            }
        }
        Mode::UdpOverTcp => {
            let mut tunnel = UdpOverTcpTunnel::new();
            if let Some(bind) = args.bind {
                tunnel = tunnel.with_source(bind);
            }
            let (tunnel, _stream) = client.establish(tunnel).await?;
            match tunnel.relay_address() {
                Some(relay) => println!("{}", relay),
                None => println!("connected"),
            }
        }
        Mode::UdpAssociate => {
            let mut tunnel = UdpAssociateTunnel::new();
            if let Some(target) = args.target.as_deref() {
                tunnel = tunnel.with_local(target.parse()?);
            }
            if let Some(bind) = args.bind {
                tunnel = tunnel.with_source(bind);
            }
            let (tunnel, control) = client.establish(tunnel).await?;
            let relay = tunnel
                .relay_endpoint(control.peer_addr()?)
                .ok_or("server returned no relay")?;
            println!("{}", relay);
        }
    }
    Ok(())
}

/// Flags take precedence over the config file; the result is validated.
fn resolve_config(args: &Args) -> Result<ClientFileConfig, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match &args.config {
        Some(path) => ClientFileConfig::load_from_file(path)?,
        None => ClientFileConfig::default(),
    };

    if let Some(server) = &args.server {
        config.server_addr = server.clone();
    }
    if args.user.is_some() || args.password.is_some() {
        config.username = args.user.clone();
        config.password = args.password.clone();
    }
    if let Some(timeout) = &args.timeout {
        config.connect_timeout = parse_duration(timeout)?;
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn parse_target(target: &str) -> Result<Address, Box<dyn std::error::Error + Send + Sync>> {
    let (host, port) = parse_endpoint(target)?;
    Ok(match host.parse::<IpAddr>() {
        Ok(ip) => Address::Ip(SocketAddr::new(ip, port)),
        Err(_) => Address::domain(host, port),
    })
}
