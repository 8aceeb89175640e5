//! Fixed 8-node unicast/broadcast/multicast/anycast demo: `pc0` as the
//! sending source, two switches, and `pc1..pc5` as the five reachable
//! PCs, with BFS-precomputed paths (§4.8, scenario S5).

use netsim_common::observe::Subject;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

pub const SOURCE: usize = 0; // pc0
pub const SWITCH_A: usize = 1;
pub const SWITCH_B: usize = 2;
pub const PC1: usize = 3;
pub const PC2: usize = 4;
pub const PC3: usize = 5;
pub const PC4: usize = 6;
pub const PC5: usize = 7;

pub const PCS: [usize; 5] = [PC1, PC2, PC3, PC4, PC5];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CastKind {
    Unicast,
    Broadcast,
    Multicast,
    Anycast,
}

#[derive(Debug, Clone, Serialize)]
pub struct CastStats {
    pub unicast_sent: u64,
    pub broadcast_sent: u64,
    pub multicast_sent: u64,
    pub anycast_sent: u64,
    pub total_packets: u64,
    pub total_hops: u64,
}

impl CastStats {
    fn new() -> Self {
        CastStats {
            unicast_sent: 0,
            broadcast_sent: 0,
            multicast_sent: 0,
            anycast_sent: 0,
            total_packets: 0,
            total_hops: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct L2CastState {
    pub stats: CastStats,
    pub last_kind: Option<CastKind>,
    pub last_targets: Vec<usize>,
    pub last_hops: u64,
}

impl L2CastState {
    pub fn create_initial() -> Self {
        L2CastState { stats: CastStats::new(), last_kind: None, last_targets: Vec::new(), last_hops: 0 }
    }
}

/// `pc0 -- switchA -- {pc1, pc2}`, `switchA -- switchB -- {pc3, pc4,
/// pc5}`: pc1/pc2 sit two hops from the source, pc3..pc5 sit three.
fn fixed_edges() -> Vec<(usize, usize)> {
    vec![
        (SOURCE, SWITCH_A),
        (SWITCH_A, PC1),
        (SWITCH_A, PC2),
        (SWITCH_A, SWITCH_B),
        (SWITCH_B, PC3),
        (SWITCH_B, PC4),
        (SWITCH_B, PC5),
    ]
}

fn bfs_hops(edges: &[(usize, usize)], from: usize) -> HashMap<usize, usize> {
    let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
    for &(a, b) in edges {
        adjacency.entry(a).or_default().push(b);
        adjacency.entry(b).or_default().push(a);
    }
    let mut hops = HashMap::new();
    hops.insert(from, 0);
    let mut queue = VecDeque::new();
    queue.push_back(from);
    while let Some(node) = queue.pop_front() {
        let current_hops = hops[&node];
        if let Some(neighbors) = adjacency.get(&node) {
            for &next in neighbors {
                if !hops.contains_key(&next) {
                    hops.insert(next, current_hops + 1);
                    queue.push_back(next);
                }
            }
        }
    }
    hops
}

pub struct L2Cast {
    subject: Subject<L2CastState>,
    rng: StdRng,
    hops_from_source: HashMap<usize, usize>,
}

impl L2Cast {
    pub fn new(seed: u64) -> Self {
        let edges = fixed_edges();
        let hops_from_source = bfs_hops(&edges, SOURCE);
        L2Cast {
            subject: Subject::new(L2CastState::create_initial()),
            rng: StdRng::seed_from_u64(seed),
            hops_from_source,
        }
    }

    pub fn set_listener(&mut self, listener: impl FnMut(&L2CastState) + Send + 'static) {
        self.subject.set_listener(listener);
    }

    pub fn get_state(&self) -> L2CastState {
        self.subject.get_state()
    }

    pub fn reset(&mut self) {
        self.subject.mutate(|s| *s = L2CastState::create_initial());
    }

    pub fn dispose(&mut self) {
        self.subject.clear_listener();
    }

    fn hops_to(&self, target: usize) -> u64 {
        *self.hops_from_source.get(&target).expect("fixed topology covers every node") as u64
    }

    pub fn send_unicast(&mut self) -> usize {
        let target = PCS[self.rng.random_range(0..PCS.len())];
        let hops = self.hops_to(target);
        self.subject.mutate(|s| {
            s.stats.unicast_sent += 1;
            s.stats.total_packets += 1;
            s.stats.total_hops += hops;
            s.last_kind = Some(CastKind::Unicast);
            s.last_targets = vec![target];
            s.last_hops = hops;
        });
        target
    }

    pub fn send_broadcast(&mut self) -> Vec<usize> {
        let targets: Vec<usize> = PCS.to_vec();
        let hops: u64 = targets.iter().map(|&t| self.hops_to(t)).sum();
        self.subject.mutate(|s| {
            s.stats.broadcast_sent += 1;
            s.stats.total_packets += targets.len() as u64;
            s.stats.total_hops += hops;
            s.last_kind = Some(CastKind::Broadcast);
            s.last_targets = targets.clone();
            s.last_hops = hops;
        });
        targets
    }

    pub fn send_multicast(&mut self, targets: Vec<usize>) -> Vec<usize> {
        let hops: u64 = targets.iter().map(|&t| self.hops_to(t)).sum();
        self.subject.mutate(|s| {
            s.stats.multicast_sent += 1;
            s.stats.total_packets += targets.len() as u64;
            s.stats.total_hops += hops;
            s.last_kind = Some(CastKind::Multicast);
            s.last_targets = targets.clone();
            s.last_hops = hops;
        });
        targets
    }

    /// Picks the PC with the fewest hops from the source; ties break on
    /// iteration order over `PCS`, left-to-right.
    pub fn send_anycast(&mut self) -> usize {
        let target = PCS
            .iter()
            .copied()
            .min_by_key(|&pc| self.hops_to(pc))
            .expect("PCS is non-empty");
        let hops = self.hops_to(target);
        self.subject.mutate(|s| {
            s.stats.anycast_sent += 1;
            s.stats.total_packets += 1;
            s.stats.total_hops += hops;
            s.last_kind = Some(CastKind::Anycast);
            s.last_targets = vec![target];
            s.last_hops = hops;
        });
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_anycast_prefers_pc1_over_the_farther_pcs() {
        let mut cast = L2Cast::new(1);
        let target = cast.send_anycast();
        assert_eq!(target, PC1);
        assert_eq!(cast.get_state().last_hops, 2);
    }

    #[test]
    fn broadcast_reaches_every_pc_and_counts_total_hops() {
        let mut cast = L2Cast::new(2);
        let targets = cast.send_broadcast();
        assert_eq!(targets.len(), 5);
        let state = cast.get_state();
        assert_eq!(state.stats.broadcast_sent, 1);
        assert_eq!(state.stats.total_packets, 5);
        assert_eq!(state.stats.total_hops, 2 + 2 + 3 + 3 + 3);
    }

    #[test]
    fn unicast_always_lands_on_one_of_the_five_pcs() {
        let mut cast = L2Cast::new(3);
        for _ in 0..20 {
            let target = cast.send_unicast();
            assert!(PCS.contains(&target));
        }
        assert_eq!(cast.get_state().stats.unicast_sent, 20);
    }

    #[test]
    fn multicast_counts_only_the_selected_subset() {
        let mut cast = L2Cast::new(4);
        cast.send_multicast(vec![PC1, PC3]);
        let state = cast.get_state();
        assert_eq!(state.stats.multicast_sent, 1);
        assert_eq!(state.stats.total_packets, 2);
        assert_eq!(state.last_targets, vec![PC1, PC3]);
    }

    #[test]
    fn reset_clears_all_counters() {
        let mut cast = L2Cast::new(5);
        cast.send_broadcast();
        cast.reset();
        let state = cast.get_state();
        assert_eq!(state.stats.total_packets, 0);
        assert!(state.last_kind.is_none());
    }
}
