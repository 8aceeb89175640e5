//! Error taxonomy shared across the engine.
//!
//! The taxonomy is a *kind*, not a single Rust type: configuration-layer
//! failures ([`AddressError`]) propagate to the caller as ordinary
//! `Result`s, while data-plane failures ([`DiagnosticKind`]) never
//! unwind a call stack — they are recorded as diagnostic events on the
//! node that observed them (see `netsim-engine`'s node diagnostics ring)
//! and the affected flow simply stalls or drops.

use serde::Serialize;
use thiserror::Error;

// ─── Configuration-layer errors ─────────────────────────────────────────────

/// Errors from parsing or validating address literals supplied by
/// configuration (never raised mid-simulation).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid address format: {0}")]
    Format(String),
    #[error("mask is not a contiguous run of leading ones")]
    InvalidMask,
}

// ─── Data-plane diagnostics ──────────────────────────────────────────────────

/// The kind of a data-plane failure. These never propagate as `Result`s;
/// they are recorded as [`Diagnostic`] events on the node that observed
/// them and the affected packet/frame is silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Routing lookup found no matching entry and no default route.
    NoRoute,
    /// ARP resolution timed out; queued packets for that next-hop were dropped.
    HostUnreachable,
    /// Egress MTU exceeded with the Don't-Fragment flag set.
    FragmentationRequired,
    /// An ICMP echo or DHCP exchange gave up waiting for a reply.
    Timeout,
    /// A frame was dropped by spanning-tree port state or switch policy.
    DroppedByPolicy,
}

/// A single diagnostic event, timestamped in simulated milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub at_sim_ms: u64,
    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, at_sim_ms: u64, detail: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            at_sim_ms,
            detail: detail.into(),
        }
    }
}

/// A bounded ring buffer of the most recent diagnostics on a node.
///
/// Presentation layers and tests consult this to see *why* a flow
/// stalled, without the data plane ever raising an error across layers.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiagnosticLog {
    capacity: usize,
    events: std::collections::VecDeque<Diagnostic>,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        DiagnosticLog {
            capacity: capacity.max(1),
            events: std::collections::VecDeque::new(),
        }
    }

    pub fn record(&mut self, diag: Diagnostic) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(diag);
    }

    pub fn recent(&self) -> impl Iterator<Item = &Diagnostic> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ─── Fatal invariant violations ──────────────────────────────────────────────

/// Panics with full context. The only error kind in the taxonomy that is
/// ever allowed to halt — every other kind is recoverable by construction.
#[track_caller]
pub fn assert_invariant(condition: bool, context: impl std::fmt::Display) {
    if !condition {
        panic!("internal invariant violation: {context}");
    }
}
