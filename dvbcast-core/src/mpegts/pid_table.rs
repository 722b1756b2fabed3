//! The per-frontend PID filter table.
//!
//! `desired` and `opened` only mutate under the frontend write lock; the
//! per-PID statistics are atomics because the streaming thread updates them
//! while holding only the read lock (single writer per PID, so relaxed
//! ordering is enough).

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use super::NULL_PID;

/// Number of PIDs a 13-bit packet identifier can address.
pub const MAX_PIDS: usize = 8192;

const CC_UNSET: u8 = 0xFF;

#[derive(Default)]
struct PidStats {
    packets: AtomicU64,
    cc_errors: AtomicU64,
    last_cc: AtomicU8,
    pmt: AtomicBool,
}

impl PidStats {
    fn reset(&self) {
        self.packets.store(0, Ordering::Relaxed);
        self.cc_errors.store(0, Ordering::Relaxed);
        self.last_cc.store(CC_UNSET, Ordering::Relaxed);
        self.pmt.store(false, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct PidEntry {
    desired: bool,
    opened: bool,
    stats: PidStats,
}

/// Dense table of all 8192 PIDs with desired/opened state and counters.
pub struct PidTable {
    entries: Vec<PidEntry>,
    changed: bool,
}

impl Default for PidTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PidTable {
    pub fn new() -> Self {
        let mut entries = Vec::with_capacity(MAX_PIDS);
        entries.resize_with(MAX_PIDS, PidEntry::default);
        let mut table = PidTable {
            entries,
            changed: false,
        };
        for entry in &mut table.entries {
            entry.stats.last_cc.store(CC_UNSET, Ordering::Relaxed);
        }
        table
    }

    /// Mark a PID as wanted or unwanted; flags the table on any change.
    pub fn set_desired(&mut self, pid: u16, desired: bool) {
        let entry = &mut self.entries[pid as usize];
        if entry.desired != desired {
            entry.desired = desired;
            self.changed = true;
        }
    }

    /// Desire every PID (the `pids=all` literal).
    pub fn set_all_desired(&mut self) {
        for pid in 0..MAX_PIDS as u16 {
            self.set_desired(pid, true);
        }
    }

    /// Clear the whole desired set (the `pids=none` literal).
    pub fn clear_desired(&mut self) {
        for pid in 0..MAX_PIDS as u16 {
            self.set_desired(pid, false);
        }
    }

    pub fn desired(&self, pid: u16) -> bool {
        self.entries[pid as usize].desired
    }

    pub fn opened(&self, pid: u16) -> bool {
        self.entries[pid as usize].opened
    }

    pub fn should_open(&self, pid: u16) -> bool {
        let entry = &self.entries[pid as usize];
        entry.desired && !entry.opened
    }

    pub fn should_close(&self, pid: u16) -> bool {
        let entry = &self.entries[pid as usize];
        entry.opened && !entry.desired
    }

    pub fn set_opened(&mut self, pid: u16) {
        self.entries[pid as usize].opened = true;
    }

    /// Mark a PID filter closed and drop its lifetime counters.
    pub fn set_closed(&mut self, pid: u16) {
        let entry = &mut self.entries[pid as usize];
        entry.opened = false;
        entry.stats.reset();
    }

    /// PIDs with an installed filter.
    pub fn opened_pids(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.opened)
            .map(|(pid, _)| pid as u16)
    }

    pub fn desired_count(&self) -> usize {
        self.entries.iter().filter(|e| e.desired).count()
    }

    pub fn opened_count(&self) -> usize {
        self.entries.iter().filter(|e| e.opened).count()
    }

    /// Sorted desired set, for the describe string.
    pub fn desired_pids(&self) -> Vec<u16> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.desired)
            .map(|(pid, _)| pid as u16)
            .collect()
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn reset_changed(&mut self) {
        self.changed = false;
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Account one TS packet seen on the wire, counting continuity-counter
    /// discontinuities. The null PID carries no meaningful counter.
    pub fn record_packet(&self, pid: u16, cc: u8, has_payload: bool) {
        let stats = &self.entries[pid as usize].stats;
        stats.packets.fetch_add(1, Ordering::Relaxed);
        if pid == NULL_PID || !has_payload {
            return;
        }
        let last = stats.last_cc.swap(cc, Ordering::Relaxed);
        if last != CC_UNSET && cc != (last + 1) & 0x0F {
            stats.cc_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn mark_pmt(&self, pid: u16) {
        self.entries[pid as usize].stats.pmt.store(true, Ordering::Relaxed);
    }

    pub fn is_pmt(&self, pid: u16) -> bool {
        self.entries[pid as usize].stats.pmt.load(Ordering::Relaxed)
    }

    pub fn packet_count(&self, pid: u16) -> u64 {
        self.entries[pid as usize].stats.packets.load(Ordering::Relaxed)
    }

    pub fn cc_errors(&self, pid: u16) -> u64 {
        self.entries[pid as usize]
            .stats
            .cc_errors
            .load(Ordering::Relaxed)
    }
}
