mod common;

use std::time::Duration;

use common::{Browser, Tab, XorShift};
use tabsync_core::config::DEFAULT_LEASE_KEY;
use tabsync_core::Role;

const MAX_TABS: usize = 5;
const TICK: Duration = Duration::from_millis(500);

/// Tabs of one browser opening, closing, crashing and polling in a
/// seeded order. Storage change notices reach every other tab after each
/// write, in shuffled order. A race opens two tabs that both read the
/// lease before either write lands.
struct Simulation {
    browser: Browser,
    rng: XorShift,
    tabs: Vec<Tab>,
    opened: usize,
}

impl Simulation {
    fn new(seed: u64) -> Self {
        Self {
            browser: Browser::default(),
            rng: XorShift::new(seed),
            tabs: Vec::new(),
            opened: 0,
        }
    }

    fn leaders(&self) -> usize {
        self.tabs
            .iter()
            .filter(|t| t.role() == Some(Role::Leader))
            .count()
    }

    fn run_on<F: FnOnce(&mut Tab)>(&mut self, index: usize, op: F) {
        let before = self.browser.lease_raw();
        op(&mut self.tabs[index]);
        if self.browser.lease_raw() != before {
            self.notify_others(Some(index));
        }
    }

    fn notify_others(&mut self, origin: Option<usize>) {
        let mut order: Vec<usize> = (0..self.tabs.len()).filter(|i| Some(*i) != origin).collect();
        self.rng.shuffle(&mut order);
        for i in order {
            self.run_on(i, |t| t.handle_storage_change(DEFAULT_LEASE_KEY));
        }
    }

    fn open(&mut self) {
        let before = self.browser.lease_raw();
        let index = self.open_quietly();
        if self.browser.lease_raw() != before {
            self.notify_others(Some(index));
        }
    }

    fn open_quietly(&mut self) -> usize {
        self.opened += 1;
        let (tab, _) = self.browser.open_tab(&format!("tab-{}", self.opened));
        self.tabs.push(tab);
        self.tabs.len() - 1
    }

    /// Open two tabs whose lease reads both happen before either write.
    /// With `notify`, the notices of both writes then arrive in a
    /// shuffled order; without it they are lost.
    fn race(&mut self, notify: bool) {
        self.browser.pin_lease_reads();
        let first = self.open_quietly();
        let second = self.open_quietly();
        self.browser.unpin_lease_reads();

        if notify {
            let mut writers = [first, second];
            self.rng.shuffle(&mut writers);
            for writer in writers {
                self.notify_others(Some(writer));
            }
        }
    }

    fn close(&mut self) {
        let index = self.rng.below(self.tabs.len());
        let before = self.browser.lease_raw();
        let mut tab = self.tabs.remove(index);
        tab.shutdown();
        if self.browser.lease_raw() != before {
            self.notify_others(None);
        }
    }

    fn crash(&mut self) {
        let index = self.rng.below(self.tabs.len());
        drop(self.tabs.remove(index));
    }

    fn poll_all(&mut self) {
        let mut order: Vec<usize> = (0..self.tabs.len()).collect();
        self.rng.shuffle(&mut order);
        for i in order {
            self.run_on(i, |t| t.poll());
        }
        self.browser.bus.drain();
    }

    fn step(&mut self) {
        self.browser.clock.advance(TICK);
        match self.rng.below(12) {
            0 | 1 if self.tabs.len() < MAX_TABS => self.open(),
            2 if !self.tabs.is_empty() => self.close(),
            3 if !self.tabs.is_empty() => self.crash(),
            4 if self.tabs.len() + 2 <= MAX_TABS => self.race(true),
            _ => {}
        }
        self.poll_all();
    }

    fn quiet_step(&mut self) {
        self.browser.clock.advance(TICK);
        self.poll_all();
    }
}

#[test]
fn test_at_most_one_leader_across_interleavings() {
    for seed in 1..=40 {
        let mut sim = Simulation::new(seed);
        for step in 0..400 {
            sim.step();
            assert!(
                sim.leaders() <= 1,
                "seed {seed} step {step}: {} leaders",
                sim.leaders()
            );
        }
    }
}

#[test]
fn test_one_leader_emerges_once_tabs_settle() {
    for seed in 1..=40 {
        let mut sim = Simulation::new(seed);
        for _ in 0..200 {
            sim.step();
        }
        if sim.tabs.is_empty() {
            sim.open();
        }
        // Lease TTL plus one safety-check interval, with margin.
        for _ in 0..60 {
            sim.quiet_step();
        }
        assert_eq!(sim.leaders(), 1, "seed {seed}");
    }
}

#[test]
fn test_racing_claims_settle_to_one_leader() {
    for seed in 1..=40 {
        let mut sim = Simulation::new(seed);
        for _ in 0..100 {
            sim.step();
        }
        while !sim.tabs.is_empty() {
            sim.crash();
        }
        // Past the lease TTL, so both racers find the lease stale.
        for _ in 0..21 {
            sim.quiet_step();
        }

        sim.race(false);
        assert_eq!(sim.leaders(), 2, "seed {seed}: no race");

        for _ in 0..60 {
            sim.quiet_step();
        }
        assert_eq!(sim.leaders(), 1, "seed {seed}");
    }
}
