use crate::plugin::{Plugin, PluginArgs, PluginClass, PluginError};
use crate::render::Renderer;
use crate::session::Session;
use serde_json::Value;

/// `plugins`: list what can run under the current profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct PluginsClass;

impl PluginClass for PluginsClass {
    fn name(&self) -> &str {
        "plugins"
    }

    fn doc(&self) -> &str {
        "List the plugins active for the current profile."
    }

    fn instantiate(
        &self,
        session: &Session,
        _args: &PluginArgs,
    ) -> Result<Box<dyn Plugin>, PluginError> {
        let rows = session
            .registry()
            .iter()
            .map(|handle| {
                let summary = handle.class().doc().trim().lines().next().unwrap_or_default();
                (handle.name().to_string(), summary.to_string())
            })
            .collect();
        Ok(Box::new(Plugins { rows }))
    }
}

struct Plugins {
    rows: Vec<(String, String)>,
}

impl Plugin for Plugins {
    fn name(&self) -> &str {
        "plugins"
    }

    fn render(&mut self, renderer: &mut dyn Renderer) -> Result<(), PluginError> {
        renderer.table_header(&["plugin", "description"])?;
        for (name, summary) in &self.rows {
            renderer.table_row(&[Value::String(name.clone()), Value::String(summary.clone())])?;
        }
        Ok(())
    }
}
