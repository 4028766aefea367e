//! Activities and the activity tree.
//!
//! Concrete activities (interest, feeding, breeding...) implement [`Activity`].
//! The tree is built once per simulation from [`ActivityNode`]s; each child is
//! tagged when it is attached, so traversal never has to ask what a child is.

use crate::error::RequestError;
use crate::registry::ResourceRegistry;
use crate::request::ResourceRequest;
use crate::shortfall::ShortfallNotifier;

/// Domain behaviour plugged into an [`ActivityNode`].
pub trait Activity<R: ResourceRegistry> {
    /// Requests for the current step. `None` or an empty list means the
    /// activity is not subject to allocation this step.
    fn determine_resources_needed(
        &mut self,
        registry: &R,
    ) -> Result<Option<Vec<ResourceRequest>>, RequestError>;

    /// Apply the activity's effect. Only called when the execution gate passed;
    /// `requests` carries the final `available`/`provided` values.
    fn perform_activity(&mut self, requests: &[ResourceRequest], registry: &mut R);

    /// End-of-step hook, run after the whole tree has been resolved.
    fn end_of_step(&mut self, _registry: &mut R) {}
}

/// A child slot in the tree, tagged at attach time.
pub enum ChildNode<R: ResourceRegistry> {
    /// Created at run time by its parent; visited before declared children.
    Dynamic(ActivityNode<R>),
    /// Declared in the farm model.
    Declared(ActivityNode<R>),
    /// A model in the tree that is not an activity. Never visited.
    Inert(String),
}

impl<R: ResourceRegistry> ChildNode<R> {
    pub fn as_activity(&self) -> Option<&ActivityNode<R>> {
        match self {
            ChildNode::Dynamic(node) | ChildNode::Declared(node) => Some(node),
            ChildNode::Inert(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ChildNode::Dynamic(node) | ChildNode::Declared(node) => node.label(),
            ChildNode::Inert(name) => name,
        }
    }
}

/// One activity in the farm tree.
pub struct ActivityNode<R: ResourceRegistry> {
    label: String,
    behaviour: Box<dyn Activity<R>>,
    /// Run the activity even when some requests stay unmet.
    pub perform_with_partial: bool,
    requests: Vec<ResourceRequest>,
    children: Vec<ChildNode<R>>,
    shortfall: ShortfallNotifier,
}

impl<R: ResourceRegistry> ActivityNode<R> {
    pub fn new(label: impl Into<String>, behaviour: Box<dyn Activity<R>>) -> Self {
        Self {
            label: label.into(),
            behaviour,
            perform_with_partial: false,
            requests: Vec::new(),
            children: Vec::new(),
            shortfall: ShortfallNotifier::new(),
        }
    }

    pub fn with_partial(mut self, perform_with_partial: bool) -> Self {
        self.perform_with_partial = perform_with_partial;
        self
    }

    pub fn with_child(mut self, child: ActivityNode<R>) -> Self {
        self.add_child(child);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Attach a declared child activity.
    pub fn add_child(&mut self, child: ActivityNode<R>) {
        self.children.push(ChildNode::Declared(child));
    }

    /// Attach an activity created while the simulation is running.
    pub fn add_dynamic_child(&mut self, child: ActivityNode<R>) {
        self.children.push(ChildNode::Dynamic(child));
    }

    /// Attach a non-activity model (kept for tree shape only).
    pub fn add_inert_child(&mut self, name: impl Into<String>) {
        self.children.push(ChildNode::Inert(name.into()));
    }

    pub fn children(&self) -> &[ChildNode<R>] {
        &self.children
    }

    /// Requests from the most recent resolution of this node.
    pub fn requests(&self) -> &[ResourceRequest] {
        &self.requests
    }

    pub fn shortfall_notifier(&mut self) -> &mut ShortfallNotifier {
        &mut self.shortfall
    }

    /// Depth-first search by label, in traversal order.
    pub fn find(&self, label: &str) -> Option<&ActivityNode<R>> {
        if self.label == label {
            return Some(self);
        }
        self.ordered_children().find_map(|c| c.find(label))
    }

    pub fn find_mut(&mut self, label: &str) -> Option<&mut ActivityNode<R>> {
        if self.label == label {
            return Some(self);
        }
        self.ordered_children_mut()
            .into_iter()
            .find_map(|c| c.find_mut(label))
    }

    /// Activity children in visiting order: dynamic first, then declared.
    pub fn ordered_children(&self) -> impl Iterator<Item = &ActivityNode<R>> {
        let dynamic = self.children.iter().filter_map(|c| match c {
            ChildNode::Dynamic(n) => Some(n),
            _ => None,
        });
        let declared = self.children.iter().filter_map(|c| match c {
            ChildNode::Declared(n) => Some(n),
            _ => None,
        });
        dynamic.chain(declared)
    }

    pub(crate) fn ordered_children_mut(&mut self) -> Vec<&mut ActivityNode<R>> {
        let (mut dynamic, mut declared) = (Vec::new(), Vec::new());
        for child in &mut self.children {
            match child {
                ChildNode::Dynamic(n) => dynamic.push(n),
                ChildNode::Declared(n) => declared.push(n),
                ChildNode::Inert(_) => {}
            }
        }
        dynamic.append(&mut declared);
        dynamic
    }

    /// Call `f` on this node and every activity node beneath it, in traversal order.
    pub fn for_each_node_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut ActivityNode<R>),
    {
        f(self);
        for child in self.ordered_children_mut() {
            child.for_each_node_mut(f);
        }
    }

    /// Number of activities in this subtree, this node included.
    pub fn activity_count(&self) -> usize {
        1 + self
            .ordered_children()
            .map(ActivityNode::activity_count)
            .sum::<usize>()
    }

    pub(crate) fn behaviour_mut(&mut self) -> &mut dyn Activity<R> {
        self.behaviour.as_mut()
    }

    /// Split borrow used by the engine during one resolution.
    pub(crate) fn resolution_parts(
        &mut self,
    ) -> (
        &mut dyn Activity<R>,
        &mut Vec<ResourceRequest>,
        &mut ShortfallNotifier,
    ) {
        (self.behaviour.as_mut(), &mut self.requests, &mut self.shortfall)
    }
}

impl<R: ResourceRegistry> std::fmt::Debug for ActivityNode<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityNode")
            .field("label", &self.label)
            .field("perform_with_partial", &self.perform_with_partial)
            .field("requests", &self.requests.len())
            .field("children", &self.children.len())
            .finish()
    }
}
