//! Tag-indexed auras on a unit.
//!
//! Auras are grouped by tag in a stable order (first application first). An aura is
//! never removed from the index once applied; it is deactivated instead, so a
//! re-application keeps its slot and iteration order stays deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{AuraId, AuraTag, Expiry, SimTime};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aura {
    pub id: AuraId,
    pub tag: AuraTag,
    pub expires: Expiry,
    pub active: bool,
    pub applied_at: SimTime,
    /// Due time of the one expiry check queued for this aura, if any.
    #[serde(default)]
    pub expiry_check: Option<SimTime>,
}

impl Aura {
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Result of a successful [`AuraTagIndex::extend_expiration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryExtension {
    pub from: SimTime,
    pub to: SimTime,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuraTagIndex {
    by_tag: BTreeMap<AuraTag, SmallVec<[Aura; 2]>>,
}

impl AuraTagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Active auras under `tag`, in application order. Re-query after mutating.
    pub fn with_tag<'a>(&'a self, tag: &AuraTag) -> impl Iterator<Item = &'a Aura> + Clone + 'a {
        self.by_tag
            .get(tag)
            .map(|auras| auras.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|aura| aura.active)
    }

    pub fn get(&self, id: &AuraId) -> Option<&Aura> {
        self.by_tag.values().flatten().find(|aura| &aura.id == id)
    }

    fn get_mut(&mut self, id: &AuraId) -> Option<&mut Aura> {
        self.by_tag.values_mut().flatten().find(|aura| &aura.id == id)
    }

    /// Insert an aura, or refresh it in place if one with the same id exists.
    pub fn apply(&mut self, id: AuraId, tag: AuraTag, expires: Expiry, now: SimTime) {
        if let Some(existing) = self.get_mut(&id) {
            existing.expires = expires;
            existing.active = true;
            existing.applied_at = now;
            return;
        }
        self.by_tag.entry(tag.clone()).or_default().push(Aura {
            id,
            tag,
            expires,
            active: true,
            applied_at: now,
            expiry_check: None,
        });
    }

    /// Push the expiry of an active, finite aura out to `new_expiry`. Never
    /// shortens, never touches `Expiry::Never`, ignores inactive auras.
    pub fn extend_expiration(&mut self, id: &AuraId, new_expiry: SimTime) -> Option<ExpiryExtension> {
        let aura = self.get_mut(id)?;
        if !aura.active {
            return None;
        }
        match aura.expires {
            Expiry::At(current) if new_expiry > current => {
                aura.expires = Expiry::At(new_expiry);
                Some(ExpiryExtension {
                    from: current,
                    to: new_expiry,
                })
            }
            Expiry::At(_) | Expiry::Never => None,
        }
    }

    /// Returns `true` if the aura was active.
    pub fn deactivate(&mut self, id: &AuraId) -> bool {
        match self.get_mut(id) {
            Some(aura) if aura.active => {
                aura.active = false;
                true
            }
            _ => false,
        }
    }

    /// Record a check queued for `at`. Returns `false` when a check is already
    /// queued at or before `at`; that one re-arms if the aura outlives it.
    pub fn arm_expiry_check(&mut self, id: &AuraId, at: SimTime) -> bool {
        let Some(aura) = self.get_mut(id) else {
            return false;
        };
        if aura.expiry_check.is_some_and(|queued| queued <= at) {
            return false;
        }
        aura.expiry_check = Some(at);
        true
    }

    /// Take the check queued for `at`. `None` if a later arm superseded it.
    pub fn claim_expiry_check(&mut self, id: &AuraId, at: SimTime) -> Option<&Aura> {
        let aura = self.get_mut(id)?;
        if aura.expiry_check != Some(at) {
            return None;
        }
        aura.expiry_check = None;
        Some(&*aura)
    }

    /// Active auras with a finite expiry, with that expiry.
    pub fn finite_active(&self) -> Vec<(AuraId, SimTime)> {
        self.by_tag
            .values()
            .flatten()
            .filter(|aura| aura.active)
            .filter_map(|aura| match aura.expires {
                Expiry::At(at) => Some((aura.id.clone(), at)),
                Expiry::Never => None,
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.by_tag.values().flatten().filter(|aura| aura.active).count()
    }
}
