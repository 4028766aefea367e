//! Grouping node with no demand of its own.

use wholefarm_logic::{Activity, RequestError, ResourceRequest};

use crate::resources::FarmResources;

#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityFolder;

impl Activity<FarmResources> for ActivityFolder {
    fn determine_resources_needed(
        &mut self,
        _resources: &FarmResources,
    ) -> Result<Option<Vec<ResourceRequest>>, RequestError> {
        Ok(None)
    }

    fn perform_activity(&mut self, _requests: &[ResourceRequest], _resources: &mut FarmResources) {}
}
