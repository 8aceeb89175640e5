//! The link arena: an index-based graph of nodes and cabling.
//!
//! Bidirectional links between nodes that can form cycles don't fit
//! Rust's ownership model as a tree of owning references, so the graph
//! is an arena: nodes and links live in `Vec`s, and every cross-reference
//! is a plain integer index (§9's cyclic-graphs redesign flag).

use std::collections::{HashMap, VecDeque};

use netsim_common::MacAddress;
use netsim_engine::datalink::{EthernetFrame, ForwardDecision};
use netsim_engine::phy::{Link, Speed};
use netsim_scheduler::Scheduler;

use crate::node::{Host, Router, Switch};

pub type NodeId = usize;
pub type LinkId = usize;

/// One endpoint of a link: which node, and which port/interface index on
/// that node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub node: NodeId,
    pub port: u8,
}

/// A node living in the arena. Switch ports carry no IP layer; hosts and
/// routers carry one `NetworkInterface` per port.
pub enum Node {
    Host(Host),
    Router(Router),
    Switch(Switch),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::Host(h) => h.name(),
            Node::Router(r) => r.name(),
            Node::Switch(s) => s.name(),
        }
    }

    fn port_up(&self, port: u8) -> bool {
        match self {
            Node::Host(h) => h
                .interfaces()
                .get(port as usize)
                .is_some_and(|(_, i)| i.hardware.is_up()),
            Node::Router(r) => r
                .interfaces()
                .get(port as usize)
                .is_some_and(|(_, i)| i.hardware.is_up()),
            Node::Switch(s) => s.ports().get(port as usize).is_some_and(|p| p.is_up()),
        }
    }

    fn port_speed(&self, port: u8) -> Speed {
        match self {
            Node::Host(h) => h
                .interfaces()
                .get(port as usize)
                .map(|(_, i)| i.hardware.speed)
                .unwrap_or(Speed::Auto),
            Node::Router(r) => r
                .interfaces()
                .get(port as usize)
                .map(|(_, i)| i.hardware.speed)
                .unwrap_or(Speed::Auto),
            Node::Switch(s) => s.ports().get(port as usize).map(|p| p.speed).unwrap_or(Speed::Auto),
        }
    }
}

struct LinkEdge {
    link: Link,
    endpoints: [Endpoint; 2],
}

/// What happened when a scheduled delivery came due.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    /// The frame reached an end-host or router port and is handed back to
    /// the caller to feed into the protocol stack (ARP/IP processing is a
    /// layer above what the arena itself understands).
    Arrived { node: NodeId, port: u8, frame: EthernetFrame },
    /// A switch port received it, learned/forwarded per its STP state, and
    /// the resulting flood/unicast sends (if any) were scheduled in turn.
    ForwardedBySwitch { node: NodeId, decision: ForwardDecision },
    /// The ingress port or link was down by the time the frame arrived.
    DroppedLinkDown,
}

struct PendingDelivery {
    frame: EthernetFrame,
    at: Endpoint,
}

/// The arena: every node and link in a built scenario, plus the
/// in-flight deliveries the scheduler is currently counting down.
#[derive(Default)]
pub struct Topology {
    nodes: Vec<Node>,
    links: Vec<LinkEdge>,
    /// `(node, port) -> link` for O(1) "what's on the other end of this
    /// port" lookups.
    port_link: HashMap<(NodeId, u8), LinkId>,
    pending: HashMap<u64, PendingDelivery>,
    next_callback_id: u64,
}

impl Topology {
    pub fn new() -> Self {
        Topology::default()
    }

    pub fn add_host(&mut self, host: Host) -> NodeId {
        self.nodes.push(Node::Host(host));
        self.nodes.len() - 1
    }

    pub fn add_router(&mut self, router: Router) -> NodeId {
        self.nodes.push(Node::Router(router));
        self.nodes.len() - 1
    }

    pub fn add_switch(&mut self, switch: Switch) -> NodeId {
        self.nodes.push(Node::Switch(switch));
        self.nodes.len() - 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Cable two `(node, port)` pairs together. Each port may carry at
    /// most one link — connecting an already-cabled port replaces the
    /// old link's record for that side without tearing down the other
    /// end, matching a real patch-cable swap.
    pub fn connect(&mut self, a: Endpoint, b: Endpoint, link: Link) -> LinkId {
        self.links.push(LinkEdge {
            link,
            endpoints: [a, b],
        });
        let id = self.links.len() - 1;
        self.port_link.insert((a.node, a.port), id);
        self.port_link.insert((b.node, b.port), id);
        id
    }

    pub fn disconnect(&mut self, link_id: LinkId) {
        let endpoints = self.links[link_id].endpoints;
        for ep in endpoints {
            self.port_link.remove(&(ep.node, ep.port));
        }
    }

    fn peer_of(&self, from: Endpoint) -> Option<Endpoint> {
        let link_id = *self.port_link.get(&(from.node, from.port))?;
        let edge = &self.links[link_id];
        if edge.endpoints[0] == from {
            Some(edge.endpoints[1])
        } else if edge.endpoints[1] == from {
            Some(edge.endpoints[0])
        } else {
            None
        }
    }

    /// Every neighbor reachable in exactly one hop from `node` over an
    /// active link, used to build the undirected graph BFS walks.
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for edge in &self.links {
            if edge.endpoints[0].node == node {
                out.push(edge.endpoints[1].node);
            } else if edge.endpoints[1].node == node {
                out.push(edge.endpoints[0].node);
            }
        }
        out
    }

    /// Fewest hops from `from` to `to` over the undirected link graph, or
    /// `None` if they're not connected. Used by anycast selection (§4.8)
    /// and by tests asserting a topology's shape.
    pub fn hop_count(&self, from: NodeId, to: NodeId) -> Option<usize> {
        if from == to {
            return Some(0);
        }
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::new();
        visited[from] = true;
        queue.push_back((from, 0));
        while let Some((node, dist)) = queue.pop_front() {
            for neighbor in self.neighbors(node) {
                if neighbor == to {
                    return Some(dist + 1);
                }
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    queue.push_back((neighbor, dist + 1));
                }
            }
        }
        None
    }

    /// Put `frame` on the wire out of `from`: looks up the link, computes
    /// propagation + serialization delay from the sender's negotiated
    /// speed, and schedules a delivery. Returns `None` (no-op, nothing
    /// scheduled) if the port has no link or is down.
    pub fn send_frame(&mut self, scheduler: &mut Scheduler, from: Endpoint, frame: EthernetFrame) -> Option<u64> {
        if !self.nodes[from.node].port_up(from.port) {
            return None;
        }
        let peer = self.peer_of(from)?;
        let link_id = self.port_link[&(from.node, from.port)];
        let delay_ms = self.links[link_id]
            .link
            .total_delay_ms(frame.bit_len(), self.nodes[from.node].port_speed(from.port));

        let callback_id = self.next_callback_id;
        self.next_callback_id += 1;
        self.pending.insert(callback_id, PendingDelivery { frame, at: peer });
        scheduler.schedule(callback_id, scheduler.now_sim_ms() + delay_ms.ceil() as u64);
        Some(callback_id)
    }

    /// Resolve a fired `callback_id` from [`Scheduler::advance`] into its
    /// delivery. Switch forwarding recurses into further `send_frame`
    /// calls for flooded/unicast ports; the caller only ever needs to
    /// drive the outer `advance`/`deliver` loop.
    pub fn deliver(&mut self, scheduler: &mut Scheduler, callback_id: u64) -> Option<DeliveryOutcome> {
        let PendingDelivery { frame, at } = self.pending.remove(&callback_id)?;

        if !self.nodes[at.node].port_up(at.port) {
            return Some(DeliveryOutcome::DroppedLinkDown);
        }

        let now = scheduler.now_sim_ms();
        if let Node::Switch(switch) = &mut self.nodes[at.node] {
            let decision = switch.forwarding_mut().receive(&frame, at.port, now);
            match &decision {
                ForwardDecision::Flood { ports } => {
                    for &port in ports {
                        self.send_frame(scheduler, Endpoint { node: at.node, port }, frame.clone());
                    }
                }
                ForwardDecision::Unicast { port } => {
                    self.send_frame(scheduler, Endpoint { node: at.node, port: *port }, frame.clone());
                }
                ForwardDecision::Drop => {}
            }
            return Some(DeliveryOutcome::ForwardedBySwitch { node: at.node, decision });
        }

        Some(DeliveryOutcome::Arrived {
            node: at.node,
            port: at.port,
            frame,
        })
    }

    /// Drain every callback id that came due, applying each delivery in
    /// turn. Switch-forwarded frames that schedule further hops are
    /// picked up on a later `advance`, not within this call.
    pub fn deliver_due(&mut self, scheduler: &mut Scheduler, due: Vec<u64>) -> Vec<DeliveryOutcome> {
        due.into_iter()
            .filter_map(|id| self.deliver(scheduler, id))
            .collect()
    }
}
