//! IPv4 fragmentation on the forwarding path, plus the pacing/queueing
//! contract used by the fragmentation demo kernel (§4.5, §4.8 S2/S3).

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("fragmentation required but DF is set")]
pub struct FragmentationRequired;

const IPV4_HEADER_BYTES: u32 = 20;

/// One fragment of an oversized packet. `existing_id` carries visual
/// continuity: only the first fragment of a split inherits the input's
/// id, every later fragment is a fresh one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub original_packet_id: u64,
    pub fragment_index: u32,
    pub offset: u16,
    pub size: u32,
    pub more_fragments: bool,
    pub existing_id: Option<u32>,
}

/// Split a `total_len`-byte IPv4 datagram for an `mtu`-byte link.
/// Returns `None` if it already fits (the boundary case "size == MTU"
/// included — no fragmentation is ever a no-op, not a single-element
/// split). Each fragment's payload is 8-byte aligned, per §4.5.
pub fn split(
    total_len: u32,
    mtu: u32,
    input_fragment_index: u32,
    input_existing_id: Option<u32>,
    original_packet_id: u64,
) -> Option<Vec<Fragment>> {
    if total_len <= mtu {
        return None;
    }
    let payload_len = total_len - IPV4_HEADER_BYTES;
    let max_payload_per_fragment = ((mtu - IPV4_HEADER_BYTES) / 8) * 8;
    let fragment_count = payload_len.div_ceil(max_payload_per_fragment);

    let mut fragments = Vec::with_capacity(fragment_count as usize);
    let mut remaining = payload_len;
    for i in 0..fragment_count {
        let size = remaining.min(max_payload_per_fragment);
        remaining -= size;
        fragments.push(Fragment {
            original_packet_id,
            fragment_index: input_fragment_index * 1000 + i,
            offset: (i * max_payload_per_fragment) as u16,
            size,
            more_fragments: i + 1 < fragment_count,
            existing_id: if i == 0 { input_existing_id } else { None },
        });
    }
    Some(fragments)
}

/// Split with an explicit `DF` flag: a set flag on an oversized packet is
/// a hard failure (the caller should drop and emit ICMP unreachable)
/// rather than a silent fragmentation.
pub fn split_checked(
    total_len: u32,
    mtu: u32,
    df_flag: bool,
    input_fragment_index: u32,
    input_existing_id: Option<u32>,
    original_packet_id: u64,
) -> Result<Option<Vec<Fragment>>, FragmentationRequired> {
    if total_len > mtu && df_flag {
        return Err(FragmentationRequired);
    }
    Ok(split(
        total_len,
        mtu,
        input_fragment_index,
        input_existing_id,
        original_packet_id,
    ))
}

/// Once-per-split notification: `added_count` new fragments were created
/// beyond the original one, at `added_count * 20` bytes of header
/// overhead.
#[derive(Debug, Clone)]
pub struct FragmentEvent {
    pub fragments: Vec<Fragment>,
    pub added_count: u32,
    pub added_overhead_bytes: u32,
}

/// Each emitted fragment paired with the simulated-ms offset (from
/// enqueue time) it should leave the router at.
pub type ScheduledFragment = (u64, Fragment);

/// A router that fragments, queues, and paces its output per §4.5's
/// implementation contract: `processing_delay_ms` before the first
/// fragment leaves, `pacing_ms` between each subsequent one.
pub struct FragmentingRouter {
    mtu: u32,
    processing_delay_ms: u64,
    pacing_ms: u64,
}

impl FragmentingRouter {
    pub fn new(mtu: u32, processing_delay_ms: u64, pacing_ms: u64) -> Self {
        FragmentingRouter {
            mtu,
            processing_delay_ms,
            pacing_ms,
        }
    }

    /// Enqueue one incoming fragment for forwarding. In IPv6 mode it is
    /// always forwarded as a single output regardless of size. In IPv4
    /// mode it is split if it exceeds the MTU, pacing each resulting
    /// fragment `pacing_ms` apart; `fragmentation` is `Some` exactly once
    /// per split, `None` when the fragment passed through unsplit.
    pub fn enqueue(
        &self,
        incoming: Fragment,
        ip_version: IpVersion,
        incoming_total_len: u32,
    ) -> (Vec<ScheduledFragment>, Option<FragmentEvent>) {
        if ip_version == IpVersion::V6 {
            return (vec![(self.processing_delay_ms, incoming)], None);
        }

        match split(
            incoming_total_len,
            self.mtu,
            incoming.fragment_index,
            incoming.existing_id,
            incoming.original_packet_id,
        ) {
            None => (vec![(self.processing_delay_ms, incoming)], None),
            Some(fragments) => {
                let emissions: Vec<ScheduledFragment> = fragments
                    .iter()
                    .enumerate()
                    .map(|(i, f)| (self.processing_delay_ms + i as u64 * self.pacing_ms, f.clone()))
                    .collect();
                let added_count = fragments.len() as u32 - 1;
                let event = FragmentEvent {
                    fragments,
                    added_count,
                    added_overhead_bytes: added_count * IPV4_HEADER_BYTES,
                };
                (emissions, Some(event))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_size_equal_to_mtu_needs_no_split() {
        assert_eq!(split(1000, 1000, 0, None, 1), None);
    }

    #[test]
    fn fragment_exceeding_mtu_by_one_splits_into_two() {
        let frags = split(1001, 1000, 0, None, 1).unwrap();
        assert_eq!(frags.len(), 2);
    }

    #[test]
    fn scenario_s2_2000_byte_packet_1000_mtu_splits_into_at_least_three() {
        let frags = split(2000, 1000, 5, Some(42), 7).unwrap();
        assert!(frags.len() >= 3);
        for (i, f) in frags.iter().enumerate() {
            assert_eq!(f.fragment_index, 5000 + i as u32);
        }
        assert_eq!(frags[0].existing_id, Some(42));
        assert!(frags[1..].iter().all(|f| f.existing_id.is_none()));
    }

    #[test]
    fn offsets_are_8_byte_aligned_and_payload_sums_to_input() {
        let frags = split(2000, 1000, 0, None, 1).unwrap();
        let payload_len = 2000 - IPV4_HEADER_BYTES;
        let total: u32 = frags.iter().map(|f| f.size).sum();
        assert_eq!(total, payload_len);
        for f in &frags {
            assert_eq!(f.offset % 8, 0);
        }
    }

    #[test]
    fn exactly_one_fragment_has_more_fragments_false() {
        let frags = split(2000, 1000, 0, None, 1).unwrap();
        let last_flags = frags.iter().filter(|f| !f.more_fragments).count();
        assert_eq!(last_flags, 1);
        assert!(!frags.last().unwrap().more_fragments);
    }

    #[test]
    fn df_flag_on_oversize_packet_is_rejected() {
        assert!(split_checked(2000, 1000, true, 0, None, 1).is_err());
        assert!(split_checked(2000, 1000, false, 0, None, 1).unwrap().is_some());
    }

    #[test]
    fn ipv6_never_fragments_regardless_of_size() {
        let router = FragmentingRouter::new(1000, 10, 5);
        let incoming = Fragment {
            original_packet_id: 1,
            fragment_index: 0,
            offset: 0,
            size: 2000,
            more_fragments: false,
            existing_id: None,
        };
        let (emissions, event) = router.enqueue(incoming, IpVersion::V6, 2000);
        assert_eq!(emissions.len(), 1);
        assert!(event.is_none());
    }

    #[test]
    fn ipv4_split_paces_fragments_and_reports_event_once() {
        let router = FragmentingRouter::new(1000, 10, 5);
        let incoming = Fragment {
            original_packet_id: 1,
            fragment_index: 5,
            offset: 0,
            size: 2000,
            more_fragments: false,
            existing_id: Some(42),
        };
        let (emissions, event) = router.enqueue(incoming, IpVersion::V4, 2000);
        assert!(emissions.len() >= 3);
        let event = event.unwrap();
        assert_eq!(event.added_count, emissions.len() as u32 - 1);
        assert_eq!(event.added_overhead_bytes, event.added_count * 20);
        // first emission at processing delay, each subsequent `pacing_ms` later
        assert_eq!(emissions[0].0, 10);
        assert_eq!(emissions[1].0, 15);
        assert_eq!(emissions[2].0, 20);
    }
}
