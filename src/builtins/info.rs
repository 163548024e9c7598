use crate::plugin::{
    ArgKind, ArgSpec, Plugin, PluginArgs, PluginClass, PluginError, PluginInfo,
    PluginInfoProvider,
};
use crate::render::Renderer;
use crate::session::Session;

/// Documentation straight from the class.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfoProvider;

impl PluginInfoProvider for InfoProvider {
    fn describe(&self, class: &dyn PluginClass) -> PluginInfo {
        PluginInfo::from_class(class)
    }
}

/// `info <plugin>`: print a plugin's documentation and arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct InfoClass;

impl PluginClass for InfoClass {
    fn name(&self) -> &str {
        "info"
    }

    fn doc(&self) -> &str {
        "Describe a plugin: what it does and which arguments it takes."
    }

    fn args(&self) -> Vec<ArgSpec> {
        vec![ArgSpec::new(
            "plugin",
            ArgKind::Str,
            "Plugin to describe. May also be given positionally.",
        )]
    }

    fn instantiate(
        &self,
        session: &Session,
        args: &PluginArgs,
    ) -> Result<Box<dyn Plugin>, PluginError> {
        let target = args
            .get_str("plugin")
            .or_else(|| args.positional().first().and_then(|v| v.as_str()))
            .ok_or_else(|| PluginError::InvalidArgs("info needs a plugin name".into()))?;
        // Accept the `plugins.<name>` spelling used in hints.
        let target = target.strip_prefix("plugins.").unwrap_or(target);

        let class = session
            .directory()
            .iter()
            .filter(|c| c.name() == target)
            .last()
            .ok_or_else(|| PluginError::Failed(format!("No plugin named {}", target)))?;

        Ok(Box::new(Info {
            info: InfoProvider.describe(class.as_ref()),
            active: session.registry().contains(target),
        }))
    }
}

struct Info {
    info: PluginInfo,
    active: bool,
}

impl Plugin for Info {
    fn name(&self) -> &str {
        "info"
    }

    fn render(&mut self, renderer: &mut dyn Renderer) -> Result<(), PluginError> {
        for line in self.info.to_string().lines() {
            renderer.write_line(line)?;
        }
        if !self.active {
            renderer.write_line("")?;
            renderer.write_line("(not active for the current profile)")?;
        }
        Ok(())
    }
}
