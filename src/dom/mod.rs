//! Minimal host document: enough structure to embed a snapshot, find it again,
//! and re-link element references after resume.

pub mod node_map;

use std::fmt;

/// Attribute on the container root holding `paused` / `resumed`.
pub const CONTAINER_STATE_ATTR: &str = "sw:container";
/// Attribute on the container root holding the node map side-channel.
pub const NODE_MAP_ATTR: &str = "sw:nodes";
/// `type` of the script element carrying the state text.
pub const SNAPSHOT_SCRIPT_TYPE: &str = "statewire/json";

pub const STATE_PAUSED: &str = "paused";
pub const STATE_RESUMED: &str = "resumed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    /// Virtual boundary around a component's output; has no DOM presence of its own.
    Fragment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// One pre-order walk step. Elements carry no exit event; fragments do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkEvent {
    Element(NodeId),
    Text(NodeId),
    EnterFragment(NodeId),
    ExitFragment(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    /// Creates a document whose container root is an element named `root_tag`.
    pub fn new(root_tag: &str) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        doc.root = doc.push(NodeKind::Element {
            tag: root_tag.to_string(),
            attrs: Vec::new(),
        });
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_string(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.push(NodeKind::Fragment)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(old_parent) = self.nodes[child.index()].parent {
            self.nodes[old_parent.index()].children.retain(|c| *c != child);
        }
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    /// Creates an element and appends it to `parent` in one step.
    pub fn append_element(&mut self, parent: NodeId, tag: &str) -> NodeId {
        let id = self.create_element(tag);
        self.append_child(parent, id);
        id
    }

    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        let id = self.create_text(text);
        self.append_child(parent, id);
        id
    }

    pub fn append_fragment(&mut self, parent: NodeId) -> NodeId {
        let id = self.create_fragment();
        self.append_child(parent, id);
        id
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.node(id)?.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Sets an attribute; a no-op on non-element nodes.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(Node {
            kind: NodeKind::Element { attrs, .. },
            ..
        }) = self.nodes.get_mut(id.index())
        {
            match attrs.iter_mut().find(|(k, _)| k == name) {
                Some((_, slot)) => *slot = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: &str) {
        if let Some(Node {
            kind: NodeKind::Text(text),
            ..
        }) = self.nodes.get_mut(id.index())
        {
            *text = value.to_string();
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id)?.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// Whether `id` is the root or hangs below it.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.root {
                return true;
            }
            current = self.node(node).and_then(|n| n.parent);
        }
        false
    }

    /// Pre-order walk of the root's descendants, skipping the root and the snapshot script.
    pub fn walk(&self) -> Vec<WalkEvent> {
        let mut events = Vec::new();
        let script = self.snapshot_script();
        for child in self.children(self.root) {
            if Some(*child) == script {
                continue;
            }
            self.walk_into(*child, &mut events);
        }
        events
    }

    fn walk_into(&self, id: NodeId, events: &mut Vec<WalkEvent>) {
        let Some(node) = self.node(id) else {
            return;
        };
        match node.kind {
            NodeKind::Element { .. } => {
                events.push(WalkEvent::Element(id));
                for child in &node.children {
                    self.walk_into(*child, events);
                }
            }
            NodeKind::Text(_) => events.push(WalkEvent::Text(id)),
            NodeKind::Fragment => {
                events.push(WalkEvent::EnterFragment(id));
                for child in &node.children {
                    self.walk_into(*child, events);
                }
                events.push(WalkEvent::ExitFragment(id));
            }
        }
    }

    /// The script element carrying the snapshot state, if one was embedded.
    pub fn snapshot_script(&self) -> Option<NodeId> {
        self.children(self.root).iter().copied().find(|id| {
            self.tag(*id) == Some("script")
                && self.attribute(*id, "type") == Some(SNAPSHOT_SCRIPT_TYPE)
        })
    }

    /// Text content of the embedded snapshot script.
    pub fn snapshot_text(&self) -> Option<&str> {
        let script = self.snapshot_script()?;
        let text = *self.children(script).first()?;
        self.text(text)
    }

    /// Stores the state text and node map on the container root and marks it paused.
    ///
    /// A previously embedded snapshot is replaced.
    pub fn embed_snapshot(&mut self, state: &str, node_map: &str) {
        let root = self.root;
        match self.snapshot_script() {
            Some(script) => {
                if let Some(&text) = self.children(script).first() {
                    self.set_text(text, state);
                } else {
                    self.append_text(script, state);
                }
            }
            None => {
                let script = self.append_element(root, "script");
                self.set_attribute(script, "type", SNAPSHOT_SCRIPT_TYPE);
                self.append_text(script, state);
            }
        }
        self.set_attribute(root, NODE_MAP_ATTR, node_map);
        self.set_attribute(root, CONTAINER_STATE_ATTR, STATE_PAUSED);
    }

    pub fn container_state(&self) -> Option<&str> {
        self.attribute(self.root, CONTAINER_STATE_ATTR)
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }
}
