pub mod error;
pub mod onboarding;
pub mod roles;
pub mod types;

pub use error::{ParticipantError, Result};
pub use onboarding::onboard_participant;
pub use roles::{assign_role, merge_role_map, AssignRoleOutcome};
pub use types::{render_onboard_welcome, render_participant_profile, RoleMap, RolesFile};
