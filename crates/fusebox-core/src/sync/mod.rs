mod engine;
mod state;

pub use engine::{ReconcileCallback, SyncCallback, SyncEngine, UpdateKind, UpdateOptions};
pub use state::{Point, SyncPatch, SyncState, WindowLevel};
