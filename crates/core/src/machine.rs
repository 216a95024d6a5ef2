// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

//! The per-instance state machine.
//!
//! Every external stimulus (goal changes, spawn outcomes, child
//! terminations, event completions, timer expiry) enters through one of the
//! methods here. Each runs the entry logic for any states it moves through
//! and appends the side effects to the caller's [`Action`] list; the daemon
//! executes them in order.
//!
//! Transitions for a single instance are strictly serial: a method returns
//! before the next stimulus is dispatched, and entry logic never recurses
//! into another stimulus.

use crate::action::{Action, ProcessSignal};
use crate::class::{ExpectMode, ProcessKind};
use crate::clock::Clock;
use crate::environ::Environ;
use crate::event::{names, EventId, EventSeed};
use crate::instance::{ExitStatus, FailRecord, Goal, Instance, Pid, State, TraceState};

/// Exit status recorded when a process could not be spawned at all.
pub const SPAWN_FAILED_STATUS: i32 = -1;

impl Instance {
    /// Ask the instance to start, carrying the stimulus environment.
    pub fn start(&mut self, env: Environ, out: &mut Vec<Action>) {
        self.start_env = env;
        self.change_goal(Goal::Start, out);
    }

    /// Ask the instance to stop, capturing the stop environment.
    pub fn stop(&mut self, env: Environ, out: &mut Vec<Action>) {
        self.stop_env = Some(env);
        self.change_goal(Goal::Stop, out);
    }

    /// Update the goal. Transitions immediately only out of the two rest
    /// states; everywhere else the machine observes the new goal at its
    /// next decision point.
    pub fn change_goal(&mut self, goal: Goal, out: &mut Vec<Action>) {
        if self.goal == goal {
            return;
        }
        self.goal = goal;

        match goal {
            Goal::Start | Goal::Respawn if self.state == State::Waiting => {
                self.change_state(self.next_state(), out);
            }
            Goal::Stop if self.state == State::Running => {
                self.change_state(self.next_state(), out);
            }
            _ => {}
        }
    }

    /// The state the machine moves to next, given the current state and
    /// goal.
    pub fn next_state(&self) -> State {
        let stopping = self.goal == Goal::Stop;
        match self.state {
            State::Waiting => {
                if self.goal.is_start() {
                    State::Starting
                } else {
                    State::Waiting
                }
            }
            State::Starting => {
                if stopping {
                    State::Stopping
                } else {
                    State::PreStart
                }
            }
            State::PreStart => {
                if stopping {
                    State::Stopping
                } else {
                    State::Spawned
                }
            }
            State::Spawned => {
                if stopping || !self.main_alive() {
                    State::Stopping
                } else {
                    State::PostStart
                }
            }
            State::PostStart => {
                if stopping {
                    State::Stopping
                } else {
                    State::Running
                }
            }
            State::Running => {
                if stopping && self.class.has_process(ProcessKind::PreStop) && self.main_alive() {
                    State::PreStop
                } else {
                    State::Stopping
                }
            }
            State::PreStop => {
                if stopping {
                    State::Stopping
                } else {
                    State::Running
                }
            }
            State::Stopping => State::Killed,
            State::Killed => State::PostStop,
            State::PostStop => {
                if stopping {
                    State::Waiting
                } else {
                    State::Starting
                }
            }
        }
    }

    /// Move to `state`, running entry logic and chaining onward through any
    /// states whose entry completes synchronously.
    pub fn change_state(&mut self, state: State, out: &mut Vec<Action>) {
        let mut state = state;
        loop {
            let old_state = self.state;
            self.state = state;

            match state {
                State::Starting => {
                    // A fresh cycle: the previous failure is history.
                    self.failed = None;
                    self.capture_env();
                    out.push(Action::Emit {
                        seed: EventSeed::with_env(names::STARTING, self.event_env()),
                        block: true,
                    });
                    return;
                }

                State::PreStart => {
                    if self.class.has_process(ProcessKind::PreStart) {
                        out.push(Action::Spawn { kind: ProcessKind::PreStart });
                        return;
                    }
                    state = self.next_state();
                }

                State::Spawned => {
                    out.push(Action::Spawn { kind: ProcessKind::Main });
                    return;
                }

                State::PostStart => {
                    if self.class.has_process(ProcessKind::PostStart) {
                        out.push(Action::Spawn { kind: ProcessKind::PostStart });
                        return;
                    }
                    state = self.next_state();
                }

                State::Running => {
                    if old_state == State::PreStop {
                        // Stop was rescinded during pre-stop.
                        self.stop_env = None;
                        return;
                    }
                    if self.goal == Goal::Respawn && !self.main_alive() {
                        // The main process died while an auxiliary process
                        // finished the start sequence; keep cycling.
                        state = State::Stopping;
                        continue;
                    }
                    out.push(Action::Emit {
                        seed: EventSeed::with_env(names::STARTED, self.event_env()),
                        block: false,
                    });
                    if !self.class.task {
                        out.push(Action::ReleaseBlocked { failed: false });
                    }
                    return;
                }

                State::PreStop => {
                    if self.class.has_process(ProcessKind::PreStop) {
                        out.push(Action::Spawn { kind: ProcessKind::PreStop });
                        return;
                    }
                    state = self.next_state();
                }

                State::Stopping => {
                    out.push(Action::Emit {
                        seed: EventSeed::with_env(names::STOPPING, self.result_env()),
                        block: true,
                    });
                    return;
                }

                State::Killed => {
                    if self.main_alive() {
                        out.push(Action::Signal {
                            kind: ProcessKind::Main,
                            signal: ProcessSignal::Term,
                        });
                        self.kill_timer = Some(ProcessKind::Main);
                        out.push(Action::SetKillTimer {
                            kind: ProcessKind::Main,
                            secs: self.class.kill_timeout_secs,
                        });
                        return;
                    }
                    state = self.next_state();
                }

                State::PostStop => {
                    if self.class.has_process(ProcessKind::PostStop) {
                        out.push(Action::Spawn { kind: ProcessKind::PostStop });
                        return;
                    }
                    state = self.next_state();
                }

                State::Waiting => {
                    debug_assert_eq!(self.goal, Goal::Stop);
                    out.push(Action::Emit {
                        seed: EventSeed::with_env(names::STOPPED, self.result_env()),
                        block: true,
                    });
                    out.push(Action::ReleaseBlocked { failed: self.failed.is_some() });
                    return;
                }
            }
        }
    }

    /// A process was spawned. For the main process this may complete the
    /// spawned state immediately, depending on the expect mode.
    pub fn on_spawned(&mut self, kind: ProcessKind, pid: Pid, out: &mut Vec<Action>) {
        self.set_pid(kind, pid);
        if kind == ProcessKind::Main {
            self.trace_forks = 0;
            self.trace =
                if self.class.traced() { TraceState::New } else { TraceState::None };
            if self.state == State::Spawned && self.class.expect == ExpectMode::None {
                self.change_state(self.next_state(), out);
            }
        }
    }

    /// A process could not be spawned (permanent setup error).
    pub fn on_spawn_failed(&mut self, kind: ProcessKind, out: &mut Vec<Action>) {
        let status = ExitStatus::from_code(SPAWN_FAILED_STATUS);
        match (self.state, kind) {
            (State::PreStart, ProcessKind::PreStart)
            | (State::Spawned, ProcessKind::Main)
            | (State::PostStop, ProcessKind::PostStop) => {
                self.record_failure(kind, status);
                self.change_goal(Goal::Stop, out);
                self.change_state(self.next_state(), out);
            }
            // Auxiliary processes are best-effort; carry on without them.
            (State::PostStart, ProcessKind::PostStart)
            | (State::PreStop, ProcessKind::PreStop) => {
                self.change_state(self.next_state(), out);
            }
            _ => {}
        }
    }

    /// A supervised process terminated.
    pub fn on_child_terminated(
        &mut self,
        kind: ProcessKind,
        status: ExitStatus,
        clock: &impl Clock,
        out: &mut Vec<Action>,
    ) {
        let mut failed = false;
        let mut stop = false;
        let mut advance = true;

        match kind {
            ProcessKind::Main => {
                // Wait for a live auxiliary process before moving on, but
                // keep the pid table current.
                if self.state == State::PostStart
                    && self.pid(ProcessKind::PostStart).is_some()
                {
                    advance = false;
                } else if self.state == State::PreStop
                    && self.pid(ProcessKind::PreStop).is_some()
                {
                    advance = false;
                }

                if self.state == State::Killed {
                    // We killed it; not a failure.
                } else if self.state == State::Stopping {
                    // Still waiting on the stopping event; the goal may yet
                    // flip back, so neither fail nor advance.
                    advance = false;
                } else {
                    // A respawnable service counts a clean exit as failure
                    // too, unless listed in normal-exit.
                    if !status.is_success() || (self.class.respawn && !self.class.task) {
                        failed = !self.class.normal_exit.contains_encoded(status.encoded());

                        if failed && self.class.respawn {
                            failed = false;
                            if self.catch_runaway(clock) {
                                self.record_failure(ProcessKind::Main, status);
                            } else {
                                self.change_goal(Goal::Respawn, out);
                                stop = false;
                                self.finish_termination(kind, failed, status, advance, stop, out);
                                return;
                            }
                        }
                    }
                    stop = true;
                }
            }

            ProcessKind::PreStart => {
                debug_assert_eq!(self.state, State::PreStart);
                if !status.is_success() {
                    failed = true;
                    stop = true;
                }
            }

            // Post-start and pre-stop results never fail the instance.
            ProcessKind::PostStart => {
                debug_assert_eq!(self.state, State::PostStart);
            }
            ProcessKind::PreStop => {
                debug_assert_eq!(self.state, State::PreStop);
            }

            ProcessKind::PostStop => {
                debug_assert_eq!(self.state, State::PostStop);
                if !status.is_success() {
                    failed = true;
                    stop = true;
                }
            }
        }

        self.finish_termination(kind, failed, status, advance, stop, out);
    }

    fn finish_termination(
        &mut self,
        kind: ProcessKind,
        failed: bool,
        status: ExitStatus,
        mut advance: bool,
        stop: bool,
        out: &mut Vec<Action>,
    ) {
        if self.kill_timer.take().is_some() {
            out.push(Action::CancelKillTimer);
        }
        self.clear_pid(kind);
        if kind == ProcessKind::Main {
            self.trace = TraceState::None;
            self.trace_forks = 0;
        }

        if failed {
            self.record_failure(kind, status);
        }

        if stop {
            // Stopping from running changes state as a goal side effect;
            // don't do it twice.
            if self.state == State::Running {
                advance = false;
            }
            self.change_goal(Goal::Stop, out);
        }

        if advance {
            self.change_state(self.next_state(), out);
        }
    }

    /// An event this instance parked on has finished.
    pub fn on_event_finished(&mut self, id: EventId, out: &mut Vec<Action>) {
        if self.blocker != Some(id) {
            return;
        }
        self.blocker = None;

        match self.state {
            State::Starting | State::Stopping => {
                self.change_state(self.next_state(), out);
            }
            State::Waiting => {
                if self.goal == Goal::Stop {
                    out.push(Action::Destroy);
                }
            }
            _ => {}
        }
    }

    /// A supervised process was stopped by `SIGSTOP`. Only meaningful for a
    /// main process we are expecting to stop itself when ready.
    pub fn on_child_stopped(&mut self, kind: ProcessKind, out: &mut Vec<Action>) {
        if kind == ProcessKind::Main
            && self.state == State::Spawned
            && self.class.expect == ExpectMode::Stop
        {
            out.push(Action::Signal { kind: ProcessKind::Main, signal: ProcessSignal::Cont });
            self.change_state(self.next_state(), out);
        }
    }

    /// The kill timer fired: escalate from TERM to KILL, exactly once.
    pub fn on_kill_timeout(&mut self, out: &mut Vec<Action>) {
        let Some(kind) = self.kill_timer.take() else {
            return;
        };
        if self.pid(kind).is_some() {
            out.push(Action::Signal { kind, signal: ProcessSignal::Kill });
        }
    }

    /// The fork tracer finished following the main process; its final pid is
    /// already bound in the pid table.
    pub fn on_trace_done(&mut self, out: &mut Vec<Action>) {
        self.trace = TraceState::None;
        if self.state == State::Spawned {
            self.change_state(self.next_state(), out);
        }
    }

    /// Record the first failure of this lifecycle; later ones keep the
    /// original cause.
    fn record_failure(&mut self, process: ProcessKind, status: ExitStatus) {
        if self.failed.is_none() {
            self.failed = Some(FailRecord { process, status });
        }
    }

    /// Count a respawn against the class's window; true when the instance
    /// is respawning too fast and must be stopped instead.
    fn catch_runaway(&mut self, clock: &impl Clock) -> bool {
        if self.class.respawn_limit == 0 || self.class.respawn_interval_secs == 0 {
            return false;
        }
        let now = clock.epoch_ms();
        let window_ms = self.class.respawn_interval_secs * 1000;
        if now.saturating_sub(self.respawn_time_ms) < window_ms {
            self.respawn_count += 1;
            if self.respawn_count > self.class.respawn_limit {
                return true;
            }
        } else {
            self.respawn_time_ms = now;
            self.respawn_count = 1;
        }
        false
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
