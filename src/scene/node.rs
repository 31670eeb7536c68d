use crate::foundation::core::{Color, Point, Rect, RoundedRect, Vec2};
use crate::surface::pool::SurfaceId;
use smallvec::SmallVec;

/// Index of a node in a [`SceneGraph`] arena. Only valid for the frame it was created in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Oriented half-plane: points `p` with `dot(p, normal) >= distance` are kept.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipPlane {
    /// Unit normal pointing into the kept region.
    pub normal: Vec2,
    /// Signed offset along `normal`.
    pub distance: f64,
}

impl ClipPlane {
    /// Return `true` when `p` lies in the kept half-plane.
    pub fn contains(&self, p: Point) -> bool {
        p.to_vec2().dot(self.normal) >= self.distance
    }
}

/// Four planes bounding `rect` (top, bottom, left, right).
pub fn clip_planes_for_rect(rect: Rect) -> SmallVec<[ClipPlane; 4]> {
    let r = rect.abs();
    smallvec::smallvec![
        ClipPlane {
            normal: Vec2::new(0.0, 1.0),
            distance: r.y0,
        },
        ClipPlane {
            normal: Vec2::new(0.0, -1.0),
            distance: -r.y1,
        },
        ClipPlane {
            normal: Vec2::new(1.0, 0.0),
            distance: r.x0,
        },
        ClipPlane {
            normal: Vec2::new(-1.0, 0.0),
            distance: -r.x1,
        },
    ]
}

/// How a shape node is filled.
#[derive(Clone, Debug, PartialEq)]
pub enum Material {
    /// Flat color; used when there is no rasterized content.
    Color(Color),
    /// Contents of a pooled surface.
    Texture(SurfaceId),
}

/// Node-kind specific payload.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Tree root; children are replaced every frame.
    Root,
    /// Grouping node for a frame: depth offset plus the frame's clip.
    Entity {
        /// Diagnostic label.
        label: Option<String>,
        /// Depth offset applied to the subtree.
        elevation: f32,
        /// Clip half-planes, empty until the frame's geometry is known.
        clip_planes: SmallVec<[ClipPlane; 4]>,
    },
    /// Decomposed 2D transform.
    Transform {
        /// Translation in parent units.
        translation: Vec2,
        /// Rotation in radians.
        rotation: f64,
        /// Per-axis scale.
        scale: Vec2,
    },
    /// Standalone clip.
    Clip {
        /// Clip half-planes.
        planes: SmallVec<[ClipPlane; 4]>,
    },
    /// Group opacity in `[0, 1)`.
    Opacity {
        /// Opacity factor.
        opacity: f32,
    },
    /// Rounded-rect shape positioned at its center.
    Shape {
        /// Shape geometry in local units.
        rrect: RoundedRect,
        /// Center of the shape's bounds.
        center: Point,
        /// Fill.
        material: Material,
    },
}

/// One entry in the scene arena.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    /// Parent link for upward traversal; `None` for the root.
    pub parent: Option<NodeId>,
    /// Children in paint order.
    pub children: Vec<NodeId>,
    /// Payload.
    pub kind: NodeKind,
}

/// Command stream describing a frame's tree to the compositor.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneCommand {
    /// Drop every child of `node`.
    DetachChildren {
        /// Node whose children are detached.
        node: NodeId,
    },
    /// Create `node` with `kind`.
    CreateNode {
        /// New node id.
        node: NodeId,
        /// Payload.
        kind: NodeKind,
    },
    /// Attach `child` under `parent`.
    AddChild {
        /// Parent node.
        parent: NodeId,
        /// Child node.
        child: NodeId,
    },
}

/// Arena of scene nodes rebuilt from scratch each frame.
#[derive(Clone, Debug)]
pub struct SceneGraph {
    nodes: Vec<SceneNode>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    /// A graph holding only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![SceneNode {
                parent: None,
                children: Vec::new(),
                kind: NodeKind::Root,
            }],
        }
    }

    /// Root node id.
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Discard every node except the root.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[0].children.clear();
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Return `true` when only the root exists.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Node lookup.
    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.index())
    }

    /// Append a node under `parent`.
    pub(crate) fn add_child(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(SceneNode {
            parent: Some(parent),
            children: Vec::new(),
            kind,
        });
        if let Some(p) = self.nodes.get_mut(parent.index()) {
            p.children.push(id);
        }
        id
    }

    /// Iterate `id`'s ancestors, nearest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.get(id).and_then(|n| n.parent), move |p| {
            self.get(*p).and_then(|n| n.parent)
        })
    }

    /// Nodes in depth-first pre-order, root first.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(n) = self.get(id) {
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    /// Nodes of kind `Shape`, in pre-order.
    pub fn shapes(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> + '_ {
        self.preorder()
            .into_iter()
            .filter_map(|id| self.get(id).map(|n| (id, n)))
            .filter(|(_, n)| matches!(n.kind, NodeKind::Shape { .. }))
    }

    /// Full-replacement command stream: clear the root, then recreate every node.
    pub fn commands(&self) -> Vec<SceneCommand> {
        let root = self.root();
        let mut out = Vec::with_capacity(self.nodes.len() * 2);
        out.push(SceneCommand::DetachChildren { node: root });
        for id in self.preorder() {
            if id == root {
                continue;
            }
            let Some(n) = self.get(id) else {
                continue;
            };
            out.push(SceneCommand::CreateNode {
                node: id,
                kind: n.kind.clone(),
            });
            if let Some(parent) = n.parent {
                out.push(SceneCommand::AddChild { parent, child: id });
            }
        }
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/node.rs"]
mod tests;
