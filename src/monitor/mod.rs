//! The monitoring pipeline: one coordinator task owns history, settings and the running
//! adapters; everything else talks to it through a [`MonitorHandle`].

mod coordinator;
mod events;
mod handle;

pub use coordinator::{spawn_monitor, MonitorDeps, MonitorTiming};
pub use events::{MonitorEvent, MonitorSnapshot, SourceSnapshot};
pub use handle::MonitorHandle;
