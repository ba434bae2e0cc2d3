use anyhow::anyhow;
use clap::{ArgAction, CommandFactory, Parser};
use clap::error::ErrorKind;
use clap_derive::{Args, Parser};
use std::net::SocketAddr;
use std::process::exit;
use tracing::Level;
use udp_quality::config::{QualityConfig, RoleConfig, DEFAULT_BURST_BYTES, DEFAULT_COUNT, DEFAULT_MTU};
use udp_quality::size_literal;

/// Measures packet loss, reordering and corruption on a UDP path
#[derive(Parser)]
#[command(version)]
struct CliArgs {
    #[command(flatten)]
    mode: Mode,

    /// send rate limit in bytes per second, e.g. 10MB; 0 is unlimited
    #[arg(long, value_parser = size_literal::parse, default_value = "0")]
    rate: u32,

    /// bytes sent per burst (client only)
    #[arg(long, value_parser = size_literal::parse, default_value_t = DEFAULT_BURST_BYTES)]
    size: u32,

    /// number of bursts (client only)
    #[arg(long, default_value_t = DEFAULT_COUNT)]
    count: u32,

    /// bytes the server sends back on its own per burst (client only)
    #[arg(long, value_parser = size_literal::parse, default_value = "0")]
    talkback: u32,

    /// have the server echo every DATA packet (client only)
    #[arg(long)]
    echo: bool,

    /// size of DATA datagrams including the header (client only)
    #[arg(long, default_value_t = DEFAULT_MTU)]
    mtu: usize,

    /// socket receive and send buffer size
    #[arg(long, value_parser = size_literal::parse)]
    buf: Option<u32>,

    #[arg(long, value_parser = size_literal::parse)]
    rcvbuf: Option<u32>,

    #[arg(long, value_parser = size_literal::parse)]
    sndbuf: Option<u32>,

    /// wait for the socket to become writable when sending (default)
    #[arg(long, overrides_with = "nonblocking")]
    blocking: bool,

    /// a send that would block counts as failed
    #[arg(long, overrides_with = "blocking")]
    nonblocking: bool,

    /// select the low level socket implementation
    #[arg(long)]
    udpc: bool,

    /// -v for debug output, -vv for trace output
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Mode {
    /// run as server on the given port
    #[arg(long, visible_alias = "server", value_name = "PORT")]
    listen: Option<u16>,

    /// run as client against the given server
    #[arg(long, visible_aliases = ["connect", "address"], value_name = "IP:PORT")]
    client: Option<SocketAddr>,

    /// run as bridge on the given port, relaying to the given server
    #[arg(long, num_args = 2, value_names = ["PORT", "IP:PORT"])]
    bridge: Option<Vec<String>>,
}

impl CliArgs {
    fn into_config(self) -> anyhow::Result<QualityConfig> {
        let role = if let Some(listen_port) = self.mode.listen {
            RoleConfig::Server { listen_port }
        }
        else if let Some(server_addr) = self.mode.client {
            RoleConfig::Client { server_addr }
        }
        else if let Some(bridge) = self.mode.bridge {
            match bridge.as_slice() {
                [port, forward] => RoleConfig::Bridge {
                    listen_port: port.parse().map_err(|e| anyhow!("invalid bridge port {:?}: {}", port, e))?,
                    forward_addr: forward.parse().map_err(|e| anyhow!("invalid bridge target {:?}: {}", forward, e))?,
                },
                _ => return Err(anyhow!("--bridge requires a port and a target address")),
            }
        }
        else {
            return Err(anyhow!("one of --listen, --client or --bridge is required"));
        };

        let mut config = QualityConfig::new(role);
        config.session.rate_limit = self.rate;
        config.session.burst_bytes = self.size;
        config.session.count = self.count;
        config.session.talkback_bytes = self.talkback;
        config.session.echo = self.echo;
        config.session.mtu = self.mtu;

        config.socket.recv_buffer_size = self.rcvbuf.or(self.buf);
        config.socket.send_buffer_size = self.sndbuf.or(self.buf);
        config.socket.blocking = !self.nonblocking;
        config.socket.udpc = self.udpc;

        config.validate()?;
        Ok(config)
    }
}

fn parse_args() -> CliArgs {
    match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            exit(0);
        }
        Err(e) => {
            let _ = e.print();
            let _ = CliArgs::command().print_help();
            exit(1);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
pub async fn main() -> anyhow::Result<()> {
    let args = parse_args();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {:#}\n", e);
            let _ = CliArgs::command().print_help();
            exit(1);
        }
    };

    udp_quality::run(config).await
}
