//! netmon-probe: connectivity checks run once per target per cycle.
//!
//! Two probe kinds share one error taxonomy:
//!
//! ```text
//! EchoProber (trait)
//!   └── IcmpProber      raw-socket echo burst → EchoStats
//! EndpointProber        single HTTP GET       → status code
//! ```
//!
//! A probe never retries. Every failure (bad address, missing privilege,
//! socket or TLS error, timeout) comes back as a [`ProbeError`] for the
//! caller to record; nothing here panics or aborts a sibling probe.

pub mod error;
pub mod http;
pub mod icmp;

pub use error::{ProbeError, ProbeOutcome};
pub use http::EndpointProber;
pub use icmp::{EchoProber, EchoStats, IcmpConfig, IcmpProber};
