// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Class registry: named job classes and their instances.
//!
//! The registry is the root of the object graph. Classes own their
//! instances; an instance holds an `Arc` of the class it was started under,
//! so superseding a class never changes a running instance's definition.

use indexmap::IndexMap;
use smol_str::SmolStr;
use std::sync::Arc;
use vigil_core::{Instance, JobClass, JobHandle};

/// A registered class plus its live instances, keyed by instance name.
pub struct ClassEntry {
    pub class: Arc<JobClass>,
    pub instances: IndexMap<SmolStr, Instance>,
    /// The definition was unloaded; no new instances, entry retired once
    /// the last instance stops.
    pub deleted: bool,
}

#[derive(Default)]
pub struct Registry {
    classes: IndexMap<SmolStr, ClassEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class, superseding any existing one with the same name.
    ///
    /// Existing instances keep running under the definition they started
    /// with; only new instances see the replacement.
    pub fn register(&mut self, class: JobClass) -> Arc<JobClass> {
        let name = class.name.clone();
        let class = Arc::new(class);
        match self.classes.get_mut(&name) {
            Some(entry) => {
                entry.class = Arc::clone(&class);
                entry.deleted = false;
            }
            None => {
                self.classes.insert(
                    name,
                    ClassEntry {
                        class: Arc::clone(&class),
                        instances: IndexMap::new(),
                        deleted: false,
                    },
                );
            }
        }
        class
    }

    /// Remove a class. The caller is responsible for stopping any returned
    /// instances first.
    pub fn unregister(&mut self, name: &str) -> Option<ClassEntry> {
        self.classes.shift_remove(name)
    }

    pub fn lookup(&self, name: &str) -> Option<&ClassEntry> {
        self.classes.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut ClassEntry> {
        self.classes.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn instance(&self, handle: &JobHandle) -> Option<&Instance> {
        self.classes.get(&handle.class)?.instances.get(&handle.instance)
    }

    pub fn instance_mut(&mut self, handle: &JobHandle) -> Option<&mut Instance> {
        self.classes.get_mut(&handle.class)?.instances.get_mut(&handle.instance)
    }

    /// Retire a class: no new instances may be created, and the entry is
    /// dropped once the last instance stops. Returns the live handles so
    /// the caller can stop them.
    pub fn mark_deleted(&mut self, name: &str) -> Vec<JobHandle> {
        match self.classes.get_mut(name) {
            Some(entry) => {
                entry.deleted = true;
                entry.instances.values().map(Instance::handle).collect()
            }
            None => Vec::new(),
        }
    }

    /// Drop a retired class entry once it has no instances left.
    pub fn collect_deleted(&mut self, name: &str) {
        if self
            .classes
            .get(name)
            .is_some_and(|entry| entry.deleted && entry.instances.is_empty())
        {
            self.classes.shift_remove(name);
        }
    }

    /// Get or create the named instance of a class, using the entry's
    /// current definition for new instances. Retired classes refuse new
    /// instances.
    pub fn ensure_instance(&mut self, class_name: &str, instance: &str) -> Option<&mut Instance> {
        let entry = self.classes.get_mut(class_name)?;
        if entry.deleted && !entry.instances.contains_key(instance) {
            return None;
        }
        let key = SmolStr::new(instance);
        if !entry.instances.contains_key(&key) {
            let inst = Instance::new(Arc::clone(&entry.class), key.clone());
            entry.instances.insert(key.clone(), inst);
        }
        entry.instances.get_mut(&key)
    }

    pub fn remove_instance(&mut self, handle: &JobHandle) -> Option<Instance> {
        self.classes.get_mut(&handle.class)?.instances.shift_remove(&handle.instance)
    }

    pub fn class_names(&self) -> Vec<SmolStr> {
        self.classes.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &ClassEntry)> {
        self.classes.iter()
    }

    /// Every live instance handle, across all classes.
    pub fn handles(&self) -> Vec<JobHandle> {
        self.classes
            .values()
            .flat_map(|entry| entry.instances.values().map(Instance::handle))
            .collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
