//! Read-only observation of the thread set.

use std::fmt;

use serde::Serialize;

use rethread_core::{ProcessState, ThreadId, ThreadState, Tick};

/// Threads that have not run for this many ticks show as sleeping.
const SLEEPING_AFTER_TICKS: Tick = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Running,
    Sleeping,
    Suspended,
}

impl RunState {
    pub fn of(state: &ThreadState, now: Tick) -> Self {
        if state.next_execution.is_none() {
            RunState::Suspended
        } else if state.last_execution.saturating_add(SLEEPING_AFTER_TICKS) < now {
            RunState::Sleeping
        } else {
            RunState::Running
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Running => "Running",
            RunState::Sleeping => "Sleeping",
            RunState::Suspended => "Suspended",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadSummary {
    pub id: ThreadId,
    pub name: String,
    pub state: RunState,
    pub children: usize,
    pub restarts: u32,
    pub crashes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopReport {
    pub tick: Tick,
    /// Sorted by name.
    pub threads: Vec<ThreadSummary>,
}

impl TopReport {
    pub fn from_state(state: &ProcessState, now: Tick) -> Self {
        let mut threads: Vec<ThreadSummary> = state
            .active_thread_states
            .values()
            .map(|t| ThreadSummary {
                id: t.id,
                name: t.name.clone(),
                state: RunState::of(t, now),
                children: t.child_thread_ids.len(),
                restarts: t.num_restarts,
                crashes: t.num_crashes,
            })
            .collect();
        threads.sort_by(|a, b| a.name.cmp(&b.name));
        Self { tick: now, threads }
    }

    fn rows(&self) -> Vec<[String; 6]> {
        let mut rows = vec![[
            "Id".to_string(),
            "Name".to_string(),
            "State".to_string(),
            "Children".to_string(),
            "Restarts".to_string(),
            "Crashes".to_string(),
        ]];
        rows.extend(self.threads.iter().map(|t| {
            [
                t.id.to_string(),
                t.name.clone(),
                t.state.to_string(),
                t.children.to_string(),
                t.restarts.to_string(),
                t.crashes.to_string(),
            ]
        }));
        rows
    }
}

impl fmt::Display for TopReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.rows();
        let mut widths = [0usize; 6];
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }
        for row in &rows {
            for (width, cell) in widths.iter().zip(row) {
                write!(f, "| {:<width$} ", cell, width = width)?;
            }
            writeln!(f, "|")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn thread(id: ThreadId, name: &str) -> ThreadState {
        ThreadState::new(id, name.to_string(), None, "main_task", 0, json!({}))
    }

    #[test]
    fn derives_run_state() {
        let mut t = thread(0, "main");
        t.last_execution = 10;
        assert_eq!(RunState::of(&t, 12), RunState::Running);
        assert_eq!(RunState::of(&t, 15), RunState::Running);
        assert_eq!(RunState::of(&t, 16), RunState::Sleeping);

        t.next_execution = None;
        assert_eq!(RunState::of(&t, 12), RunState::Suspended);
    }

    #[test]
    fn sorts_by_name_and_renders_table() {
        let mut state = ProcessState::default();
        let mut main = thread(0, "main");
        main.child_thread_ids = vec![1];
        main.num_restarts = 3;
        main.last_execution = 4;
        let mut child = thread(1, "main.colony");
        child.num_crashes = 2;
        child.next_execution = None;
        state.active_thread_states.insert(1, child);
        state.active_thread_states.insert(0, main);

        let report = TopReport::from_state(&state, 4);
        let names: Vec<&str> = report.threads.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["main", "main.colony"]);

        let rendered = report.to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "| Id | Name        | State     | Children | Restarts | Crashes |");
        assert_eq!(lines[1], "| 0  | main        | Running   | 1        | 3        | 0       |");
        assert_eq!(lines[2], "| 1  | main.colony | Suspended | 0        | 0        | 2       |");
    }
}
