use std::collections::{HashMap, HashSet};

use crate::quads::frame::{ResourceId, TransferableResource};

/// Handle for one producer's resource namespace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChildId(pub u32);

/// Child resource id to display resource id.
pub type ResourceIdMap = HashMap<ResourceId, ResourceId>;

#[derive(Debug)]
struct ChildResource {
    child_id: ChildId,
    child_resource_id: ResourceId,
    transferable: TransferableResource,
}

#[derive(Debug, Default)]
struct Child {
    child_to_parent: ResourceIdMap,
}

/// Owns every resource the display currently holds and maps producer-local ids into one
/// display-global namespace.
///
/// A resource stays alive from the frame that first lists it until a later frame of the same
/// child stops using it, or the child is destroyed.
#[derive(Debug)]
pub struct DisplayResourceProvider {
    next_child: u32,
    next_resource: u32,
    children: HashMap<ChildId, Child>,
    resources: HashMap<ResourceId, ChildResource>,
}

impl Default for DisplayResourceProvider {
    fn default() -> Self {
        Self {
            next_child: 1,
            next_resource: 1,
            children: HashMap::new(),
            resources: HashMap::new(),
        }
    }
}

impl DisplayResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_child(&mut self) -> ChildId {
        let id = ChildId(self.next_child);
        self.next_child += 1;
        self.children.insert(id, Child::default());
        id
    }

    /// Drop a child and every resource it still holds. Returns the released ids in the
    /// child's namespace.
    pub fn destroy_child(&mut self, child: ChildId) -> Vec<ResourceId> {
        let Some(state) = self.children.remove(&child) else {
            return Vec::new();
        };
        let mut released: Vec<ResourceId> = state
            .child_to_parent
            .into_iter()
            .map(|(child_id, parent_id)| {
                self.resources.remove(&parent_id);
                child_id
            })
            .collect();
        released.sort();
        released
    }

    /// Import `resources` from `child`. Ids the child already transferred keep their display id.
    pub fn receive_from_child(&mut self, child: ChildId, resources: &[TransferableResource]) {
        let Some(state) = self.children.get_mut(&child) else {
            tracing::warn!(child = child.0, "resources received for unknown child");
            return;
        };
        for resource in resources {
            if state.child_to_parent.contains_key(&resource.id) {
                continue;
            }
            let parent_id = ResourceId(self.next_resource);
            self.next_resource += 1;
            state.child_to_parent.insert(resource.id, parent_id);
            self.resources.insert(
                parent_id,
                ChildResource {
                    child_id: child,
                    child_resource_id: resource.id,
                    transferable: resource.clone(),
                },
            );
        }
    }

    pub fn get_child_to_parent_map(&self, child: ChildId) -> Option<&ResourceIdMap> {
        self.children.get(&child).map(|c| &c.child_to_parent)
    }

    /// Release every resource of `child` that is not in `used` (child ids). Returns the
    /// released ids in the child's namespace so they can be handed back to the producer.
    pub fn declare_used_resources_from_child(
        &mut self,
        child: ChildId,
        used: &HashSet<ResourceId>,
    ) -> Vec<ResourceId> {
        let Some(state) = self.children.get_mut(&child) else {
            return Vec::new();
        };
        let mut released = Vec::new();
        state.child_to_parent.retain(|child_id, parent_id| {
            if used.contains(child_id) {
                return true;
            }
            self.resources.remove(parent_id);
            released.push(*child_id);
            false
        });
        released.sort();
        released
    }

    /// Producer-side view of a display resource.
    pub fn resource(&self, id: ResourceId) -> Option<(ChildId, ResourceId, &TransferableResource)> {
        self.resources
            .get(&id)
            .map(|r| (r.child_id, r.child_resource_id, &r.transferable))
    }

    pub fn num_resources(&self) -> usize {
        self.resources.len()
    }

    pub fn num_children(&self) -> usize {
        self.children.len()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/resources/provider.rs"]
mod tests;
