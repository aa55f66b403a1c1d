// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::HashMap;
use std::rc::Rc;
use tabgrid_app::ProfileKey;

use crate::render::TargetHandle;
use crate::view::ViewState;

/// What a tab switch does with a cached render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebuildPolicy {
    /// Discard the cached target and rebuild from the cached configuration.
    #[default]
    Always,
    /// Remount the cached target when it was built after its data loaded.
    ReuseIfFresh,
}

impl RebuildPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::ReuseIfFresh => "reuse_if_fresh",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "always" => Some(Self::Always),
            "reuse_if_fresh" => Some(Self::ReuseIfFresh),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileCacheEntry {
    pub target: TargetHandle,
    pub view: ViewState,
}

impl ProfileCacheEntry {
    pub fn new(view: ViewState) -> Self {
        Self {
            target: Rc::clone(&view.target),
            view,
        }
    }

    pub fn is_fresh(&self) -> bool {
        let target = self.target.borrow();
        target.committed.is_some() && target.built_at >= self.view.loaded_at
    }
}

/// Last-built target and view per profile. Entries are replaced wholesale
/// and only removed when their tab closes.
#[derive(Debug, Default)]
pub struct ProfileCache {
    entries: HashMap<ProfileKey, ProfileCacheEntry>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, profile: &ProfileKey) -> Option<&ProfileCacheEntry> {
        self.entries.get(profile)
    }

    pub fn get_mut(&mut self, profile: &ProfileKey) -> Option<&mut ProfileCacheEntry> {
        self.entries.get_mut(profile)
    }

    pub fn put(&mut self, view: ViewState) {
        self.entries
            .insert(view.profile.clone(), ProfileCacheEntry::new(view));
    }

    pub fn remove(&mut self, profile: &ProfileKey) -> Option<ProfileCacheEntry> {
        self.entries.remove(profile)
    }

    pub fn contains(&self, profile: &ProfileKey) -> bool {
        self.entries.contains_key(profile)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ProfileKey> {
        self.entries.keys()
    }

    /// Forgets every cached depth; used when a preference changes what the
    /// depth computation returns.
    pub fn clear_depths(&mut self) {
        for entry in self.entries.values_mut() {
            entry.view.clear_depths();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ProfileCache, RebuildPolicy};
    use crate::enrichment::DepthTable;
    use crate::render::RenderBody;
    use crate::view::ViewState;
    use tabgrid_app::{ProfileKey, ProfilePayload, RowId, SwitchToken};

    fn view(name: &str) -> ViewState {
        let payload = ProfilePayload {
            columns: Vec::new(),
            rows: Vec::new(),
        };
        ViewState::from_payload(ProfileKey::from(name), &payload)
    }

    #[test]
    fn put_replaces_whole_entry() {
        let mut cache = ProfileCache::new();
        let first = view("a");
        let first_target = first.target.clone();
        cache.put(first);
        cache.put(view("a"));

        assert_eq!(cache.len(), 1);
        let Some(entry) = cache.get(&ProfileKey::from("a")) else {
            panic!("entry should exist");
        };
        assert!(!std::rc::Rc::ptr_eq(&entry.target, &first_target));
        assert!(cache.remove(&ProfileKey::from("a")).is_some());
        assert!(cache.is_empty());
    }

    #[test]
    fn freshness_requires_a_commit_after_load() {
        let mut cache = ProfileCache::new();
        let view = view("a");
        let target = view.target.clone();
        cache.put(view);
        let Some(entry) = cache.get(&ProfileKey::from("a")) else {
            panic!("entry should exist");
        };
        assert!(!entry.is_fresh());

        target.borrow_mut().commit(RenderBody::Empty, SwitchToken::random());
        assert!(entry.is_fresh());
    }

    #[test]
    fn clear_depths_reaches_every_entry() {
        let mut cache = ProfileCache::new();
        for name in ["a", "b"] {
            let mut view = view(name);
            view.merge_depths(&DepthTable::from([(RowId::new(1), 2)]));
            cache.put(view);
        }
        cache.clear_depths();
        assert!(cache.keys().all(|key| {
            cache
                .get(key)
                .is_some_and(|entry| entry.view.depths.is_empty())
        }));
    }

    #[test]
    fn policy_parses_config_names() {
        for policy in [RebuildPolicy::Always, RebuildPolicy::ReuseIfFresh] {
            assert_eq!(RebuildPolicy::parse(policy.as_str()), Some(policy));
        }
        assert_eq!(RebuildPolicy::parse("never"), None);
    }
}
