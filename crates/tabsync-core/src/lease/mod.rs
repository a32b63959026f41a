//! Leader election between the tabs of one browser.
//!
//! A tab leads while it keeps a fresh [`LeaseRecord`] under the lease key.
//! Other tabs follow until that record goes stale, then the first one to
//! re-evaluate takes over. There is no lock and no atomic
//! read-modify-write: every step is idempotent and the next evaluation
//! corrects whatever a race left behind.

pub mod model;
pub mod store;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{after, earliest};
use crate::config::LeaderConfig;
use crate::error::{StorageError, TabSyncError, TabSyncResult};
use model::{LeaseRecord, Role};
use store::LeaseStore;

/// Decides whether this tab may hold the live connection.
pub struct LeaderCoordinator {
    tab_id: String,
    store: LeaseStore,
    config: LeaderConfig,
    role: Option<Role>,
    renew_at: Option<DateTime<Utc>>,
    check_at: Option<DateTime<Utc>>,
    storage_failure_logged: bool,
}

impl LeaderCoordinator {
    /// Create a coordinator with a fresh random tab identity.
    pub fn new(store: LeaseStore, config: LeaderConfig) -> TabSyncResult<Self> {
        Self::with_tab_id(Uuid::new_v4().to_string(), store, config)
    }

    /// Create a coordinator with an explicit tab identity.
    pub fn with_tab_id(
        tab_id: impl Into<String>,
        store: LeaseStore,
        config: LeaderConfig,
    ) -> TabSyncResult<Self> {
        let tab_id = tab_id.into();
        if tab_id.trim().is_empty() {
            return Err(TabSyncError::missing_identity("tab id must not be empty"));
        }
        config.validate()?;

        Ok(Self {
            tab_id,
            store,
            config,
            role: None,
            renew_at: None,
            check_at: None,
            storage_failure_logged: false,
        })
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn config(&self) -> &LeaderConfig {
        &self.config
    }

    /// Current role, `None` before the first evaluation or after release.
    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn is_leader(&self) -> bool {
        self.role == Some(Role::Leader)
    }

    /// Whether lease renewal writes are scheduled.
    pub fn is_renewing(&self) -> bool {
        self.renew_at.is_some()
    }

    /// First evaluation; also starts the periodic safety check.
    pub fn init(&mut self, now: DateTime<Utc>) -> Option<Role> {
        self.check_at = Some(after(now, self.config.safety_check_interval()));
        self.evaluate(now)
    }

    /// Run the election. Returns the new role only if it changed.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> Option<Role> {
        let role = self.decide(now);
        self.set_role(role)
    }

    /// Another tab wrote to storage. Changes to unrelated keys are ignored.
    pub fn on_external_change(&mut self, now: DateTime<Utc>, key: &str) -> Option<Role> {
        if key != self.config.lease_key || self.role.is_none() {
            return None;
        }
        debug!(tab_id = %self.tab_id, "Lease key changed in another tab, re-evaluating");
        self.evaluate(now)
    }

    /// Fire due renewal and safety-check deadlines.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<Role> {
        let before = self.role;

        if self.renew_at.is_some_and(|at| at <= now) {
            self.renew(now);
        }
        if self.check_at.is_some_and(|at| at <= now) {
            self.check_at = Some(after(now, self.config.safety_check_interval()));
            self.evaluate(now);
        }

        if self.role != before {
            self.role
        } else {
            None
        }
    }

    /// Earliest pending renewal or safety check.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        earliest(self.renew_at, self.check_at)
    }

    /// Stop all activity and clear the lease if this tab holds it, so a
    /// follower can take over without waiting for the TTL.
    pub fn release(&mut self) {
        self.renew_at = None;
        self.check_at = None;

        if self.role == Some(Role::Leader) && self.store.is_supported() {
            let key = &self.config.lease_key;
            match self.store.read(key) {
                Ok(Some(record)) if record.is_owned_by(&self.tab_id) => {
                    if let Err(e) = self.store.remove(key) {
                        debug!(tab_id = %self.tab_id, error = %e, "Failed to clear lease on release");
                    } else {
                        info!(tab_id = %self.tab_id, "Released leader lease");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(tab_id = %self.tab_id, error = %e, "Failed to read lease on release");
                }
            }
        }

        self.role = None;
    }

    fn decide(&mut self, now: DateTime<Utc>) -> Role {
        if !self.store.is_supported() {
            self.renew_at = None;
            self.note_storage_failure(&StorageError::Unavailable);
            return Role::Leader;
        }

        match self.store.read(&self.config.lease_key) {
            Ok(Some(record)) if !record.is_stale(now, self.config.lease_ttl) => {
                if record.is_owned_by(&self.tab_id) {
                    if self.renew_at.is_none() {
                        self.renew_at = Some(after(now, self.config.heartbeat_interval));
                    }
                    Role::Leader
                } else {
                    self.renew_at = None;
                    Role::Follower
                }
            }
            Ok(stale_or_absent) => {
                if let Some(record) = stale_or_absent {
                    debug!(
                        tab_id = %self.tab_id,
                        previous_owner = %record.owner_id,
                        "Lease is stale, reclaiming"
                    );
                }
                self.acquire(now)
            }
            Err(e) => {
                self.note_storage_failure(&e);
                self.renew_at = None;
                Role::Leader
            }
        }
    }

    fn acquire(&mut self, now: DateTime<Utc>) -> Role {
        let record = LeaseRecord::new(self.tab_id.clone(), now);
        match self.store.write(&self.config.lease_key, &record) {
            Ok(()) => {
                self.renew_at = Some(after(now, self.config.heartbeat_interval));
            }
            Err(e) => {
                self.note_storage_failure(&e);
                self.renew_at = None;
            }
        }
        Role::Leader
    }

    /// Refresh the lease, unless another tab's record has appeared.
    fn renew(&mut self, now: DateTime<Utc>) {
        let key = &self.config.lease_key;
        match self.store.read(key) {
            Ok(Some(record)) if !record.is_owned_by(&self.tab_id) => {
                info!(
                    tab_id = %self.tab_id,
                    owner = %record.owner_id,
                    "Lease now held by another tab, stopping renewal"
                );
                self.renew_at = None;
                self.evaluate(now);
                return;
            }
            Ok(_) => {
                let record = LeaseRecord::new(self.tab_id.clone(), now);
                if let Err(e) = self.store.write(key, &record) {
                    self.note_storage_failure(&e);
                }
            }
            Err(e) => self.note_storage_failure(&e),
        }
        self.renew_at = Some(after(now, self.config.heartbeat_interval));
    }

    fn set_role(&mut self, role: Role) -> Option<Role> {
        if self.role == Some(role) {
            return None;
        }
        info!(tab_id = %self.tab_id, from = ?self.role, to = %role, "Tab role changed");
        self.role = Some(role);
        Some(role)
    }

    fn note_storage_failure(&mut self, error: &StorageError) {
        if self.storage_failure_logged {
            debug!(tab_id = %self.tab_id, error = %error, "Lease storage still failing");
        } else {
            warn!(
                tab_id = %self.tab_id,
                error = %error,
                "Lease storage unavailable, running as single-tab leader"
            );
            self.storage_failure_logged = true;
        }
    }
}
