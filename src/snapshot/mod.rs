//! Pausing: freezing a live heap into snapshot text embedded in the document.
//!
//! The state text is a JSON object:
//!
//! ```text
//! {"roots": ["<ord>", ...], "objs": [<cell>, ...], "subs": [[<edge>, ...], ...]}
//! ```
//!
//! `subs` is aligned with the first `subs.len()` entries of `objs`; the collector
//! sorts subscribed objects first so no other cell needs an entry.

pub mod collector;
pub mod encoder;
pub mod error;
pub mod inspect;
pub mod registry;
pub mod serializers;
pub mod subs;
pub mod tags;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SnapshotConfig;
use crate::dom::{node_map, Document};
use crate::heap::Heap;

pub use collector::{collect, CellKey, Collected, Collector, PrimitiveKey, Root};
pub use error::{DecodeError, SerializeError};
pub use registry::{DecodeContext, EncodeContext, Registry, RegistryError, Serializer};
pub use subs::EdgeSpec;
pub use tags::Tag;

/// The wire container, before and after JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    /// Base-36 root ordinals, `!`-suffixed when the root is a store wrapper.
    pub roots: Vec<String>,
    pub objs: Vec<serde_json::Value>,
    #[serde(default)]
    pub subs: Vec<Vec<serde_json::Value>>,
}

impl SnapshotData {
    /// JSON text safe to place inside a script element.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(json.replace("</", "<\\/"))
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    pub cells: usize,
    pub subscribed: usize,
    pub roots: usize,
    pub excluded: usize,
    pub retained_nodes: usize,
    pub bytes: usize,
}

/// A finished pause: the embedded state text and node map.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: String,
    pub node_map: String,
    pub stats: SnapshotStats,
}

/// Collects everything reachable from `roots`, encodes it, and embeds the result in `doc`.
///
/// Pending promises are awaited before encoding. Every element the graph refers to
/// must already be attached to `doc`.
pub async fn pause(
    heap: &mut Heap,
    doc: &mut Document,
    roots: &[Root],
    registry: &Registry,
    config: &SnapshotConfig,
) -> Result<Snapshot, SerializeError> {
    let collected = collect(heap, registry, roots, config).await?;

    if let Some(detached) = collected.retained.iter().find(|node| !doc.is_attached(**node)) {
        return Err(SerializeError::DetachedNode(detached.to_string()));
    }
    let nodes = node_map::encode(doc, &collected.retained);

    let data = encoder::encode(heap, registry, &collected, &nodes.index, config)?;
    let state = data.to_text()?;
    doc.embed_snapshot(&state, &nodes.instructions);

    let stats = SnapshotStats {
        cells: collected.cells.len(),
        subscribed: collected.subscribed,
        roots: collected.roots.len(),
        excluded: collected.excluded.len(),
        retained_nodes: nodes.index.len(),
        bytes: state.len(),
    };
    info!(
        cells = stats.cells,
        subscribed = stats.subscribed,
        bytes = stats.bytes,
        "Paused container"
    );

    Ok(Snapshot {
        state,
        node_map: nodes.instructions,
        stats,
    })
}
