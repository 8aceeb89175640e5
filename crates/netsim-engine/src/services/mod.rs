//! Transport/services layer: DHCP client/server, and the ping facade
//! used by `executePing` (§4.6).

pub mod dhcp;
pub mod ping;

pub use dhcp::{DhcpClient, DhcpClientStage, DhcpLedger, DhcpOffer, DhcpPool, DhcpServer};
pub use ping::{PingClient, PingOutcome, DEFAULT_PING_TIMEOUT_MS};
