//! Coalescing of view updates that arrive faster than they can be sorted.
//!
//! At most one sort is in flight. Requests arriving meanwhile overwrite a
//! single pending slot, so once the running sort completes exactly one more
//! run is started with the newest view, and only if that view differs from
//! the one the finished run used.

#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerState<V> {
    Idle,
    Running { started: V },
    RunningWithPending { started: V, latest: V },
}

#[derive(Debug, Clone)]
pub struct UpdateScheduler<V> {
    state: SchedulerState<V>,
}

impl<V> Default for UpdateScheduler<V> {
    fn default() -> Self {
        Self {
            state: SchedulerState::Idle,
        }
    }
}

impl<V: Clone + PartialEq> UpdateScheduler<V> {
    pub fn state(&self) -> &SchedulerState<V> {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, SchedulerState::Idle)
    }

    /// Records a new view. Returns the view to start sorting immediately, or
    /// `None` if a sort is already running.
    pub fn request(&mut self, view: V) -> Option<V> {
        match std::mem::replace(&mut self.state, SchedulerState::Idle) {
            SchedulerState::Idle => {
                self.state = SchedulerState::Running {
                    started: view.clone(),
                };
                Some(view)
            }
            SchedulerState::Running { started }
            | SchedulerState::RunningWithPending { started, .. } => {
                self.state = SchedulerState::RunningWithPending {
                    started,
                    latest: view,
                };
                None
            }
        }
    }

    /// Marks the in-flight sort as finished. Returns the view for the single
    /// follow-up run, if the newest request differs from the finished one.
    pub fn complete(&mut self) -> Option<V> {
        match std::mem::replace(&mut self.state, SchedulerState::Idle) {
            SchedulerState::RunningWithPending { started, latest } if latest != started => {
                self.state = SchedulerState::Running {
                    started: latest.clone(),
                };
                Some(latest)
            }
            _ => None,
        }
    }
}
