//! Animates `FragmentingRouter`'s output pacing for the teaching demo
//! (§4.8, scenarios S2/S3).

use netsim_common::observe::Subject;
use netsim_engine::net::fragmentation::{Fragment, FragmentEvent, FragmentingRouter, IpVersion};
use netsim_scheduler::Scheduler;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct EmittedFragment {
    pub fragment_index: u32,
    pub offset: u16,
    pub size: u32,
    pub more_fragments: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FragDemoState {
    pub ip_version_is_v4: bool,
    pub mtu: u32,
    pub emitted: Vec<EmittedFragment>,
    pub added_count: u32,
    pub added_overhead_bytes: u32,
    pub fragmentation_occurred: bool,
    pub is_running: bool,
}

impl FragDemoState {
    pub fn create_initial(ip_version_is_v4: bool, mtu: u32) -> Self {
        FragDemoState {
            ip_version_is_v4,
            mtu,
            emitted: Vec::new(),
            added_count: 0,
            added_overhead_bytes: 0,
            fragmentation_occurred: false,
            is_running: false,
        }
    }
}

struct PendingEmission {
    callback_id: u64,
    fragment: Fragment,
}

/// Wraps a `FragmentingRouter`, scheduling each paced emission and
/// surfacing the ones that have actually left as `emitted`.
pub struct FragDemo {
    subject: Subject<FragDemoState>,
    scheduler: Scheduler,
    router: FragmentingRouter,
    pending: Vec<PendingEmission>,
    next_callback_id: u64,
}

impl FragDemo {
    pub fn new(mtu: u32, processing_delay_ms: u64, pacing_ms: u64, ip_version_is_v4: bool) -> Self {
        FragDemo {
            subject: Subject::new(FragDemoState::create_initial(ip_version_is_v4, mtu)),
            scheduler: Scheduler::new(),
            router: FragmentingRouter::new(mtu, processing_delay_ms, pacing_ms),
            pending: Vec::new(),
            next_callback_id: 1,
        }
    }

    pub fn set_listener(&mut self, listener: impl FnMut(&FragDemoState) + Send + 'static) {
        self.subject.set_listener(listener);
    }

    pub fn get_state(&self) -> FragDemoState {
        self.subject.get_state()
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.scheduler.reset();
        self.subject.mutate(|s| {
            let (ip_version_is_v4, mtu) = (s.ip_version_is_v4, s.mtu);
            *s = FragDemoState::create_initial(ip_version_is_v4, mtu);
        });
    }

    pub fn dispose(&mut self) {
        self.subject.mutate(|s| s.is_running = false);
        self.subject.clear_listener();
    }

    /// Enqueues one incoming datagram described by its total length and
    /// input fragment bookkeeping; schedules each resulting emission.
    pub fn enqueue(&mut self, total_len: u32, input_fragment_index: u32, input_existing_id: Option<u32>, original_packet_id: u64) {
        let ip_version = if self.subject.state().ip_version_is_v4 { IpVersion::V4 } else { IpVersion::V6 };
        let incoming = Fragment {
            original_packet_id,
            fragment_index: input_fragment_index,
            offset: 0,
            size: total_len - 20,
            more_fragments: false,
            existing_id: input_existing_id,
        };
        let (emissions, event) = self.router.enqueue(incoming, ip_version, total_len);

        self.subject.mutate_quiet(|s| s.is_running = true);
        for (delay_ms, fragment) in emissions {
            let callback_id = self.next_callback_id;
            self.next_callback_id += 1;
            self.scheduler.schedule(callback_id, self.scheduler.now_sim_ms() + delay_ms);
            self.pending.push(PendingEmission { callback_id, fragment });
        }

        if let Some(FragmentEvent { added_count, added_overhead_bytes, .. }) = event {
            self.subject.mutate_quiet(|s| {
                s.added_count = added_count;
                s.added_overhead_bytes = added_overhead_bytes;
                s.fragmentation_occurred = true;
            });
        }

        self.subject.emit();
    }

    pub fn tick(&mut self, delta_ms: u64) {
        if !self.subject.state().is_running {
            return;
        }
        let fired = self.scheduler.advance(delta_ms);
        if fired.is_empty() {
            return;
        }
        let mut newly_emitted = Vec::new();
        self.pending.retain(|p| {
            if fired.contains(&p.callback_id) {
                newly_emitted.push(EmittedFragment {
                    fragment_index: p.fragment.fragment_index,
                    offset: p.fragment.offset,
                    size: p.fragment.size,
                    more_fragments: p.fragment.more_fragments,
                });
                false
            } else {
                true
            }
        });
        if !newly_emitted.is_empty() {
            self.subject.mutate_quiet(|s| s.emitted.extend(newly_emitted));
        }
        if self.pending.is_empty() {
            self.subject.mutate_quiet(|s| s.is_running = false);
        }
        self.subject.emit();
    }
}
