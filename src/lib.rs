pub mod config;
pub mod dom;
pub mod heap;
pub mod resume;
pub mod snapshot;
pub mod util;

pub use config::SnapshotConfig;
pub use dom::{Document, NodeId};
pub use heap::{Heap, Object, ObjRef, Subscriber, Value};
pub use resume::{ChunkLoader, Container, LoadError, SymbolRegistry};
pub use snapshot::{
    pause, DecodeError, Registry, Root, SerializeError, Snapshot, SnapshotData, SnapshotStats,
};
