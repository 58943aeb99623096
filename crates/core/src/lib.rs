pub mod codec;
pub mod config;
pub mod error;
pub mod handle;
pub mod state;
pub mod store;

pub use codec::{MemoCodec, PassthroughCodec};
pub use config::{RuntimeConfig, StateFormat};
pub use error::SchedError;
pub use handle::{Handle, Resolve};
pub use state::{ProcessState, ThreadId, ThreadState, Tick, ASAP};
pub use store::{FileStore, MemoryStore, StateStore};
