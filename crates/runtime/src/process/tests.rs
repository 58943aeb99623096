use std::cell::Cell;
use std::rc::Rc;

use serde_json::{json, Value};

use rethread_core::{MemoryStore, ProcessState, RuntimeConfig, SchedError, ThreadState};

use crate::task::{display_name, FnTask, Task};
use crate::thread::{SpawnOptions, Thread};

use super::{execution, Process, ProcessConfig};

async fn idle(thread: Thread) -> anyhow::Result<()> {
    thread.suspend().await?;
    Ok(())
}

async fn spawn_two_idlers(thread: Thread) -> anyhow::Result<()> {
    thread.start_sub_thread("idle_task", json!({}), SpawnOptions::default())?;
    thread.start_sub_thread("idle_task", json!({ "room": "W1N1" }), SpawnOptions::default())?;
    thread.suspend().await?;
    Ok(())
}

async fn ticker(thread: Thread, count: Rc<Cell<u32>>) -> anyhow::Result<()> {
    loop {
        count.set(count.get() + 1);
        thread.sleep_tick().await?;
    }
}

async fn memo_then_suspend(thread: Thread) -> anyhow::Result<()> {
    let _seed: u32 = thread.memo(|| 7)?;
    thread.suspend().await?;
    Ok(())
}

async fn exit_first(thread: Thread) -> anyhow::Result<()> {
    thread.exit().await?;
    Ok(())
}

async fn chain(thread: Thread) -> anyhow::Result<()> {
    thread.start_sub_thread("chain_task", json!({}), SpawnOptions::default())?;
    thread.suspend().await?;
    Ok(())
}

async fn foreign_pending(_thread: Thread) -> anyhow::Result<()> {
    futures::future::pending::<()>().await;
    Ok(())
}

async fn failing_loop(thread: Thread) -> anyhow::Result<()> {
    thread.loop_while(|| Err(anyhow::anyhow!("bad loop"))).await?;
    Ok(())
}

fn config(tasks: Vec<Rc<dyn Task>>, store: &MemoryStore) -> ProcessConfig {
    let root = tasks[0].name().to_string();
    ProcessConfig::new(root, tasks, ()).with_store(store.clone())
}

fn process(tasks: Vec<Rc<dyn Task>>) -> Process {
    Process::new(config(tasks, &MemoryStore::new())).unwrap()
}

fn persisted(task: &str, program_counter: u64, memoed_values: Vec<Value>) -> MemoryStore {
    let mut state = ProcessState::default();
    let id = state.allocate_thread_id();
    let mut thread = ThreadState::new(id, display_name(task).to_string(), None, task, 0, json!({}));
    thread.program_counter = program_counter;
    thread.memoed_values = memoed_values;
    thread.next_execution = None;
    state.active_thread_states.insert(id, thread);
    MemoryStore::with_state(state)
}

fn idle_tasks() -> Vec<Rc<dyn Task>> {
    vec![
        FnTask::new("main_task", spawn_two_idlers).into_rc(),
        FnTask::new("idle_task", idle).into_rc(),
    ]
}

#[test]
fn sibling_names_stay_unique() {
    let mut p = process(idle_tasks());
    p.execute(0).unwrap();

    let names: Vec<String> = p.threads().iter().map(|t| t.name().unwrap()).collect();
    assert_eq!(names, vec!["main", "main.idle", "main.idle#2"]);
    assert_eq!(p.thread_by_name("main.idle#2").unwrap().id(), 2);
}

#[test]
fn custom_name_overrides_suffix() {
    let room_name = |props: &Value| props["room"].as_str().unwrap_or("lobby").to_string();
    let mut p = process(vec![
        FnTask::new("main_task", spawn_two_idlers).into_rc(),
        FnTask::new("idle_task", idle).with_custom_name(room_name).into_rc(),
    ]);
    p.execute(0).unwrap();

    assert!(p.thread_by_name("main.lobby").is_ok());
    assert!(p.thread_by_name("main.W1N1").is_ok());
}

#[test]
fn only_one_waiter_per_target() {
    let mut p = process(idle_tasks());
    p.execute(0).unwrap();

    let mut inner = p.shared.borrow_mut();
    inner.join(1, 2).unwrap();
    assert!(matches!(
        inner.join(0, 2),
        Err(SchedError::JoinConflict { target: 2, existing: 1, requester: 0 })
    ));
    // The same waiter may join again.
    inner.join(1, 2).unwrap();
    // Joining something already gone is a no-op.
    inner.join(0, 42).unwrap();
    assert_eq!(inner.thread_state(0).unwrap().blocked_on_thread_id, None);
}

#[test]
fn exit_releases_waiter_and_detaches_from_parent() {
    let mut p = process(idle_tasks());
    p.execute(0).unwrap();

    let mut inner = p.shared.borrow_mut();
    inner.join(1, 2).unwrap();
    inner.dirty = false;
    let released = inner.exit_thread(2).unwrap();

    assert!(inner.dirty);
    assert_eq!(inner.thread_state(1).unwrap().blocked_on_thread_id, None);
    assert_eq!(inner.thread_state(0).unwrap().child_thread_ids, vec![1]);
    assert!(matches!(inner.thread_state(2), Err(SchedError::ThreadNotFound(2))));
    assert_eq!(inner.order, vec![0, 1]);
    drop(inner);
    drop(released);
}

#[test]
fn vanished_join_target_no_longer_blocks() {
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    let mut p = process(vec![FnTask::new("main_task", move |t| ticker(t, Rc::clone(&c))).into_rc()]);

    p.execute(0).unwrap();
    assert_eq!(count.get(), 1);

    p.shared.borrow_mut().thread_state_mut(0).unwrap().blocked_on_thread_id = Some(99);
    p.execute(1).unwrap();
    assert_eq!(count.get(), 2);
    assert_eq!(p.snapshot().active_thread_states[&0].blocked_on_thread_id, None);
}

#[test]
fn hydrating_twice_is_rejected() {
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    let mut p = process(vec![FnTask::new("main_task", move |t| ticker(t, Rc::clone(&c))).into_rc()]);
    p.execute(0).unwrap();

    assert!(matches!(
        execution::hydrate(&p.shared, 0),
        Err(SchedError::AlreadyHydrated(name)) if name == "main"
    ));
}

#[test]
fn replay_past_end_of_body_fails() {
    let store = persisted("main_task", 2, vec![]);
    let result = Process::new(config(vec![FnTask::new("main_task", idle).into_rc()], &store));
    assert!(matches!(result, Err(SchedError::Hydration { thread, .. }) if thread == "main"));
}

#[test]
fn replay_without_logged_memo_fails() {
    let store = persisted("main_task", 1, vec![]);
    let result = Process::new(config(vec![FnTask::new("main_task", memo_then_suspend).into_rc()], &store));
    assert!(matches!(
        result,
        Err(SchedError::Hydration { cause, .. }) if cause.contains("no memoized value at index 0")
    ));
}

#[test]
fn replay_uses_logged_memo() {
    let store = persisted("main_task", 1, vec![json!(7)]);
    let mut p = Process::new(config(vec![FnTask::new("main_task", memo_then_suspend).into_rc()], &store)).unwrap();
    p.execute(3).unwrap();

    let state = &p.snapshot().active_thread_states[&0];
    assert_eq!(state.program_counter, 1);
    assert_eq!(state.memoed_values, vec![json!(7)]);
}

#[test]
fn exit_during_replay_is_fatal() {
    let store = persisted("main_task", 1, vec![]);
    let result = Process::new(config(vec![FnTask::new("main_task", exit_first).into_rc()], &store));
    assert!(matches!(
        result,
        Err(SchedError::Hydration { cause, .. }) if cause.contains("Unexpected exit")
    ));
}

#[test]
fn durable_state_naming_unregistered_task_is_fatal() {
    let store = persisted("retired_task", 0, vec![]);
    let result = Process::new(config(vec![FnTask::new("main_task", idle).into_rc()], &store));
    assert!(matches!(result, Err(SchedError::UnknownTask(name)) if name == "retired_task"));
}

#[test]
fn pass_limit_ends_cycle_and_persists() {
    let store = MemoryStore::new();
    let runtime = RuntimeConfig {
        max_passes_per_cycle: 3,
        ..RuntimeConfig::default()
    };
    let mut p = Process::new(
        config(vec![FnTask::new("chain_task", chain).into_rc()], &store).with_runtime(runtime),
    )
    .unwrap();

    let report = p.execute(0).unwrap();
    assert_eq!(report.passes, 3);
    assert_eq!(report.live_threads, 4);
    assert_eq!(store.current().unwrap().active_thread_states.len(), 4);
    assert!(p.thread_by_name("chain.chain.chain.chain").is_ok());
}

#[test]
fn foreign_pending_is_a_crash() {
    let mut p = process(vec![FnTask::new("main_task", foreign_pending).into_rc()]);
    p.execute(0).unwrap();

    let state = &p.snapshot().active_thread_states[&0];
    assert_eq!(state.num_crashes, 1);
    assert_eq!(state.num_restarts, 1);
    assert_eq!(state.program_counter, 0);
    assert_eq!(state.next_execution, Some(1));
}

#[test]
fn loop_error_is_a_crash() {
    let mut p = process(vec![FnTask::new("main_task", failing_loop).into_rc()]);
    p.execute(0).unwrap();
    p.execute(1).unwrap();

    let state = &p.snapshot().active_thread_states[&0];
    assert_eq!(state.num_crashes, 2);
    assert_eq!(state.next_execution, Some(2));
}

#[test]
fn interrupt_handlers_follow_thread_lifetime() {
    let pings = Rc::new(Cell::new(0));
    let counter = Rc::clone(&pings);
    let listener = FnTask::new("main_task", idle).with_interrupts(move |thread: &Thread| {
        let counter = Rc::clone(&counter);
        thread.register_interrupt("PING", move || {
            counter.set(counter.get() + 1);
            Ok(())
        })
    });
    let store = MemoryStore::new();
    let mut p = Process::new(config(vec![listener.into_rc()], &store)).unwrap();
    p.execute(0).unwrap();

    p.interrupt("PING").unwrap();
    assert_eq!(pings.get(), 1);
    p.interrupt("UNKNOWN").unwrap();

    let main = p.thread_by_id(0).unwrap();
    assert_eq!(main.interrupts(), vec!["PING"]);
    assert!(matches!(
        main.register_interrupt("PING", || Ok(())),
        Err(SchedError::DuplicateInterrupt { thread: 0, .. })
    ));

    main.exit().detach().unwrap();
    p.interrupt("PING").unwrap();
    assert_eq!(pings.get(), 1);
    assert!(!main.is_running());
}

#[test]
fn interrupt_handlers_are_rebuilt_on_hydrate() {
    let pings = Rc::new(Cell::new(0));
    let make_tasks = |pings: &Rc<Cell<u32>>| -> Vec<Rc<dyn Task>> {
        let counter = Rc::clone(pings);
        vec![FnTask::new("main_task", idle)
            .with_interrupts(move |thread: &Thread| {
                let counter = Rc::clone(&counter);
                thread.register_interrupt("PING", move || {
                    counter.set(counter.get() + 1);
                    Ok(())
                })
            })
            .into_rc()]
    };

    let store = MemoryStore::new();
    let mut first = Process::new(config(make_tasks(&pings), &store)).unwrap();
    first.execute(0).unwrap();
    drop(first);

    let second = Process::new(config(make_tasks(&pings), &store)).unwrap();
    second.interrupt("PING").unwrap();
    assert_eq!(pings.get(), 1);
}

#[test]
fn dropping_process_releases_shared_state() {
    let mut p = process(idle_tasks());
    p.execute(0).unwrap();
    let weak = Rc::downgrade(&p.shared);

    drop(p);
    assert!(weak.upgrade().is_none());
}
