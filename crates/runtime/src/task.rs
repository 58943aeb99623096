use std::collections::HashMap;
use std::future::Future;
use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde_json::Value;
use tracing::debug;

use rethread_core::SchedError;

use crate::thread::Thread;

/// Every registered task name must end with this marker; it is stripped when
/// deriving thread names.
pub const TASK_NAME_SUFFIX: &str = "_task";

/// A resumable task body. Control operations on [`Thread`] are the only
/// suspension points it may await.
pub type TaskBody = LocalBoxFuture<'static, anyhow::Result<()>>;

/// A named, versioned, resumable unit of logic.
///
/// The body must reach a suspension point before it returns; returning is
/// treated as a crash. After `restart` or `exit` the body is dropped, so any
/// code following those awaits never runs.
pub trait Task<C: 'static = ()>: 'static {
    /// Globally unique, ends in [`TASK_NAME_SUFFIX`].
    fn name(&self) -> &str;

    /// Bumping the version restarts every live thread bound to this task on
    /// its next scheduled cycle.
    fn version(&self) -> u32 {
        0
    }

    /// Create a fresh body. Called on spawn, restart and hydration.
    fn run(&self, thread: Thread<C>) -> TaskBody;

    /// (Re)register the thread's interrupt subscriptions. Called once per
    /// thread instantiation, both on spawn and on rehydrate.
    fn interrupts(&self, _thread: &Thread<C>) -> Result<(), SchedError> {
        Ok(())
    }

    /// Override the thread-name suffix derived from the task name.
    fn custom_name(&self, _props: &Value) -> Option<String> {
        None
    }
}

/// Display form of a task name: the name with [`TASK_NAME_SUFFIX`] stripped.
pub fn display_name(task_name: &str) -> &str {
    task_name.strip_suffix(TASK_NAME_SUFFIX).unwrap_or(task_name)
}

type RunFn<C> = Box<dyn Fn(Thread<C>) -> TaskBody>;
type InterruptsFn<C> = Box<dyn Fn(&Thread<C>) -> Result<(), SchedError>>;
type NameFn = Box<dyn Fn(&Value) -> String>;

/// A [`Task`] assembled from closures.
pub struct FnTask<C: 'static = ()> {
    name: String,
    version: u32,
    run: RunFn<C>,
    interrupts: Option<InterruptsFn<C>>,
    custom_name: Option<NameFn>,
}

impl<C: 'static> FnTask<C> {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(Thread<C>) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Self {
            name: name.into(),
            version: 0,
            run: Box::new(move |thread| Box::pin(run(thread))),
            interrupts: None,
            custom_name: None,
        }
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_interrupts<F>(mut self, register: F) -> Self
    where
        F: Fn(&Thread<C>) -> Result<(), SchedError> + 'static,
    {
        self.interrupts = Some(Box::new(register));
        self
    }

    pub fn with_custom_name<F>(mut self, name: F) -> Self
    where
        F: Fn(&Value) -> String + 'static,
    {
        self.custom_name = Some(Box::new(name));
        self
    }

    pub fn into_rc(self) -> Rc<dyn Task<C>> {
        Rc::new(self)
    }
}

impl<C: 'static> Task<C> for FnTask<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn run(&self, thread: Thread<C>) -> TaskBody {
        (self.run)(thread)
    }

    fn interrupts(&self, thread: &Thread<C>) -> Result<(), SchedError> {
        match &self.interrupts {
            Some(register) => register(thread),
            None => Ok(()),
        }
    }

    fn custom_name(&self, props: &Value) -> Option<String> {
        self.custom_name.as_ref().map(|name| name(props))
    }
}

/// Name-indexed task definitions, loaded once at process construction.
pub struct TaskRegistry<C: 'static = ()> {
    tasks: HashMap<String, Rc<dyn Task<C>>>,
}

impl<C: 'static> TaskRegistry<C> {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Register a task. Malformed and duplicate names are configuration errors.
    pub fn register(&mut self, task: Rc<dyn Task<C>>) -> Result<(), SchedError> {
        let name = task.name().to_string();
        if !name.ends_with(TASK_NAME_SUFFIX) || name.len() == TASK_NAME_SUFFIX.len() {
            return Err(SchedError::InvalidTaskName(name));
        }
        if self.tasks.contains_key(&name) {
            return Err(SchedError::DuplicateTask(name));
        }
        debug!(task = %name, version = task.version(), "Registered task");
        self.tasks.insert(name, task);
        Ok(())
    }

    pub fn from_tasks(tasks: impl IntoIterator<Item = Rc<dyn Task<C>>>) -> Result<Self, SchedError> {
        let mut registry = Self::new();
        for task in tasks {
            registry.register(task)?;
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Result<Rc<dyn Task<C>>, SchedError> {
        self.tasks
            .get(name)
            .cloned()
            .ok_or_else(|| SchedError::UnknownTask(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<C: 'static> Default for TaskRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
