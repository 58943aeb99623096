//! Demo tasks run by the `rethread` binary.

use std::rc::Rc;

use rethread_core::Handle;
use rethread_runtime::{FnTask, SpawnOptions, Task, Thread};
use serde::{Deserialize, Serialize};

use crate::world::{Source, World, WORLD_CHANGED};

pub const ROOT_TASK: &str = "init_task";
pub const HEARTBEAT_TASK: &str = "heartbeat_task";
pub const CENSUS_TASK: &str = "census_task";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeartbeatProps {
    pub every_secs: f64,
}

pub fn all() -> Vec<Rc<dyn Task<World>>> {
    vec![
        FnTask::new(ROOT_TASK, init).into_rc(),
        FnTask::new(HEARTBEAT_TASK, heartbeat).into_rc(),
        FnTask::new(CENSUS_TASK, census)
            .with_interrupts(|thread| {
                let census = thread.clone();
                thread.register_interrupt(WORLD_CHANGED, move || census.restart().detach())
            })
            .into_rc(),
    ]
}

async fn init(thread: Thread<World>) -> anyhow::Result<()> {
    thread.start_sub_thread(
        HEARTBEAT_TASK,
        HeartbeatProps { every_secs: 5.0 },
        SpawnOptions::default(),
    )?;
    thread.start_sub_thread(CENSUS_TASK, (), SpawnOptions::default())?;
    thread.log("Children started");
    loop {
        thread.suspend().await?;
    }
}

async fn heartbeat(thread: Thread<World>) -> anyhow::Result<()> {
    let props: HeartbeatProps = thread.props()?;
    let tick = thread.ctx().borrow().tick();
    thread.log(format!("alive at tick {tick}"));
    thread.sleep_seconds(props.every_secs).await?;
    thread.restart().await?;
    Ok(())
}

/// Pick the richest source once, then report on it every tick. The handle is
/// memoized and resolved against the current world on each step, so a layout
/// change surfaces as an error unless the restart interrupt gets there first.
async fn census(thread: Thread<World>) -> anyhow::Result<()> {
    let ctx = thread.ctx();
    let target: Option<Handle<Source>> = thread.memo(|| {
        ctx.borrow()
            .richest_source()
            .map(|source| Handle::new(source.id.clone()))
    })?;

    let Some(handle) = target else {
        thread.log("No sources visible, waiting for the world to change");
        thread.suspend().await?;
        thread.restart().await?;
        return Ok(());
    };

    let reporter = thread.clone();
    thread
        .loop_while(move || {
            let source = handle.resolve(&*ctx.borrow())?;
            reporter.log(format!(
                "{} at {}/{}",
                source.id, source.energy, source.capacity
            ));
            Ok(true)
        })
        .await?;
    Ok(())
}
