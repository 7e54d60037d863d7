use std::collections::{BTreeMap, BTreeSet};

/// Category tag -> service ids understood by the filtering service.
///
/// Categories are a view over a device's blocked services, not stored state:
/// a category reads as on when any of its services is blocked.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    categories: BTreeMap<String, BTreeSet<String>>,
}

/// A category switched on or off, resolved against whichever blocked set
/// ends up being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryToggle {
    pub services: BTreeSet<String>,
    pub enabled: bool,
}

impl CategoryToggle {
    /// Union when switching on, difference when switching off
    pub fn apply_to(&self, blocked: &BTreeSet<String>) -> BTreeSet<String> {
        if self.enabled {
            blocked.union(&self.services).cloned().collect()
        } else {
            blocked.difference(&self.services).cloned().collect()
        }
    }
}

impl CategoryTable {
    pub fn new(categories: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self { categories }
    }

    pub fn services(&self, category: &str) -> Option<&BTreeSet<String>> {
        self.categories.get(category)
    }

    pub fn as_map(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.categories
    }

    /// Delta for switching `category` on or off. `None` for an unknown category.
    pub fn toggle(&self, category: &str, enabled: bool) -> Option<CategoryToggle> {
        let services = self.services(category)?;
        Some(CategoryToggle {
            services: services.clone(),
            enabled,
        })
    }

    pub fn is_active(&self, category: &str, blocked: &BTreeSet<String>) -> bool {
        self.services(category)
            .is_some_and(|services| !services.is_disjoint(blocked))
    }

    /// Displayed on/off state of every category for one device
    pub fn view(&self, blocked: &BTreeSet<String>) -> BTreeMap<String, bool> {
        self.categories
            .keys()
            .map(|name| (name.clone(), self.is_active(name, blocked)))
            .collect()
    }
}
