//! A harness for measuring the quality of a UDP path: packet loss, reordering, duplication and
//!  payload corruption, optionally through a relay in the middle.
//!
//! ```ascii
//!  Client                      (Bridge)                     Server
//!    |---- STATUS INIT ---------->|---------------------------->|
//!    |<---------------------------|<----------- STATUS INIT ----|
//!    |                            |                             |
//!    |---- STATUS BURST_START --->|---------------------------->|  per iteration
//!    |---- DATA 0..burst_count -->|---------------------------->|
//!    |<---------------------------|<----- DATA (echo/talkback) -|
//!    |---- STATUS BURST_FINISH -->|---------------------------->|
//!    |<---------------------------|<---- STATUS BURST_FINISH ---|  summaries
//!    |                            |                             |
//!    |---- STATUS FINISHED ------>|---------------------------->|
//! ```
//!
//! Every datagram is one packet: a fixed size little-endian header (see [packet::PacketHeader]),
//!  followed by a deterministic payload for DATA packets so the receiver can detect corruption.
//!  STATUS packets carry the sender's counters toward its counterpart, so each side can compare
//!  what was sent with what arrived.
//!
//! The client drives the measurement and terminates after `count` iterations. Server and bridge
//!  run until they are stopped, and a new INIT from a client starts a new session.
//!
//! Datagrams are routed by the sender role in their header, which is how a bridge tells
//!  client traffic from server traffic without knowing the client up front.

pub mod config;
pub mod endpoint;
pub mod packet;
pub mod packet_range;
pub mod payload;
pub mod rate_limiter;
pub mod session;
pub mod size_literal;
pub mod summary;
pub mod traffic;

use crate::config::{QualityConfig, RoleConfig};
use crate::endpoint::UdpEndpoint;
use crate::session::bridge::Bridge;
use crate::session::client::Client;
use crate::session::server::Server;
use tracing::{info, info_span, Instrument};

/// Runs the configured role. For a client this returns after the last iteration, while server
///  and bridge only return if their socket fails.
pub async fn run(config: QualityConfig) -> anyhow::Result<()> {
    config.validate()?;

    let endpoint = UdpEndpoint::bind(config.listen_port(), &config.socket, config.session.rate_limit)?;

    match config.role {
        RoleConfig::Client { server_addr } => {
            info!("mode: CLIENT connecting to {}", server_addr);
            Client::new(endpoint, server_addr, &config.session)
                .run()
                .instrument(info_span!("client", server = %server_addr))
                .await?;
        }
        RoleConfig::Server { listen_port } => {
            info!("mode: SERVER listening on port {}", listen_port);
            Server::new(endpoint, &config.session)
                .run()
                .instrument(info_span!("server", port = listen_port))
                .await?;
        }
        RoleConfig::Bridge { listen_port, forward_addr } => {
            info!("mode: BRIDGE listening on port {} forwarding to {}", listen_port, forward_addr);
            Bridge::new(endpoint, forward_addr, &config.session)
                .run()
                .instrument(info_span!("bridge", port = listen_port, server = %forward_addr))
                .await?;
        }
    }
    Ok(())
}
