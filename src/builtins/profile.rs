use crate::plugin::{Plugin, PluginArgs, PluginClass, PluginError};
use crate::profile::{Profile, ProfileSlot};
use crate::render::Renderer;
use crate::session::Session;
use serde_json::Value;
use std::sync::Arc;

/// `profile`: show the loaded profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileClass;

impl PluginClass for ProfileClass {
    fn name(&self) -> &str {
        "profile"
    }

    fn doc(&self) -> &str {
        "Show the loaded profile and its metadata."
    }

    fn is_active(&self, profile: Option<&Profile>) -> bool {
        profile.is_some()
    }

    fn instantiate(
        &self,
        session: &Session,
        _args: &PluginArgs,
    ) -> Result<Box<dyn Plugin>, PluginError> {
        match session.profile() {
            ProfileSlot::Loaded(profile) => Ok(Box::new(ProfileView {
                profile: Arc::clone(profile),
            })),
            ProfileSlot::Unset { reason } => {
                Err(PluginError::Failed(format!("No profile loaded: {}", reason)))
            }
        }
    }
}

struct ProfileView {
    profile: Arc<Profile>,
}

impl Plugin for ProfileView {
    fn name(&self) -> &str {
        "profile"
    }

    fn render(&mut self, renderer: &mut dyn Renderer) -> Result<(), PluginError> {
        renderer.section(&format!("Profile {}", self.profile.name()))?;
        renderer.write_line(&format!("Location: {}", self.profile.location()))?;
        renderer.table_header(&["key", "value"])?;
        for (key, value) in self.profile.metadata() {
            renderer.table_row(&[Value::String(key.clone()), value.clone()])?;
        }
        Ok(())
    }
}
