// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! Event-to-job binder: when an event enters handling, decide which classes
//! start and which instances stop, and attach the event as a blocker so it
//! stays open until those jobs settle.

use crate::engine::supervisor::{expand_instance, ProcessAdapter, Supervisor};
use crate::engine::trace::Ptracer;
use tracing::{debug, warn};
use vigil_core::{Blocker, Clock, Environ, EventId, JobHandle};

impl<P, T, C> Supervisor<P, T, C>
where
    P: ProcessAdapter,
    T: Ptracer,
    C: Clock,
{
    /// Run the binder over one handling event.
    pub(crate) fn bind_event(&mut self, id: EventId) {
        let (name, env) = match self.bus.get(id) {
            Some(event) => (event.name.clone(), event.env.clone()),
            None => return,
        };

        for class_name in self.registry.class_names() {
            let Some(entry) = self.registry.lookup(&class_name) else {
                continue;
            };
            if entry.deleted {
                continue;
            }
            let class = std::sync::Arc::clone(&entry.class);

            if class.start_on.as_ref().is_some_and(|expr| expr.matches(&name, &env)) {
                self.bind_start(id, &class_name, &class, &env);
            }

            if class.stop_on.as_ref().is_some_and(|expr| expr.matches(&name, &env)) {
                self.bind_stop(id, &class_name, &class, &env);
            }
        }
    }

    fn bind_start(
        &mut self,
        id: EventId,
        class_name: &str,
        class: &vigil_core::JobClass,
        env: &Environ,
    ) {
        let instance_name = match expand_instance(class, env) {
            Ok(instance_name) => instance_name,
            Err(missing) => {
                warn!(job = class_name, event = %id, %missing,
                    "instance expansion failed; event fails");
                if let Some(event) = self.bus.get_mut(id) {
                    event.failed = true;
                }
                return;
            }
        };

        let Some(inst) = self.registry.ensure_instance(class_name, &instance_name) else {
            return;
        };
        if inst.goal.is_start() {
            // A conflicting instance is already underway; the event records
            // the failure once everything else has resolved.
            debug!(job = %inst.handle(), "already starting; event fails");
            if let Some(event) = self.bus.get_mut(id) {
                event.failed = true;
            }
            return;
        }

        let handle = inst.handle();
        let mut out = Vec::new();
        inst.blocking.push(id);
        inst.start(env.clone(), &mut out);
        if let Some(event) = self.bus.get_mut(id) {
            event.block(Blocker::Job { job: handle.clone() });
        }
        debug!(job = %handle, event = %id, "start bound to event");
        self.run_actions(&handle, out);
    }

    fn bind_stop(
        &mut self,
        id: EventId,
        class_name: &str,
        class: &vigil_core::JobClass,
        env: &Environ,
    ) {
        // With an instance template, stop only the matching instance;
        // otherwise stop every instance of the class.
        let targets: Vec<JobHandle> = match expand_instance(class, env) {
            Ok(instance_name) if class.instance.is_some() => {
                vec![JobHandle::new(class_name, instance_name.as_str())]
            }
            _ => self
                .registry
                .lookup(class_name)
                .map(|entry| entry.instances.values().map(|i| i.handle()).collect())
                .unwrap_or_default(),
        };

        for handle in targets {
            let Some(inst) = self.registry.instance_mut(&handle) else {
                continue;
            };
            if !inst.goal.is_start() {
                continue;
            }
            let mut out = Vec::new();
            inst.blocking.push(id);
            inst.stop(env.clone(), &mut out);
            if let Some(event) = self.bus.get_mut(id) {
                event.block(Blocker::Job { job: handle.clone() });
            }
            debug!(job = %handle, event = %id, "stop bound to event");
            self.run_actions(&handle, out);
        }
    }
}

#[cfg(test)]
#[path = "binder_tests.rs"]
mod tests;
