// ABOUTME: Validated domain types shared across the agent.
// ABOUTME: Project directory names and deployment timestamp identifiers.

mod deployment_id;
mod short_name;

pub use deployment_id::{DEPLOYMENT_ID_FORMAT, DeploymentId, DeploymentIdError, IdAllocator};
pub use short_name::{ShortName, ShortNameError};
