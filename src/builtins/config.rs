use crate::plugin::{ArgKind, ArgSpec, Plugin, PluginArgs, PluginClass, PluginError};
use crate::render::Renderer;
use crate::session::Session;
use crate::ConfigValue;
use serde_json::Value;

/// `config`: dump both configuration layers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigClass;

impl PluginClass for ConfigClass {
    fn name(&self) -> &str {
        "config"
    }

    fn doc(&self) -> &str {
        "Show session configuration and cached values."
    }

    fn args(&self) -> Vec<ArgSpec> {
        vec![ArgSpec::new("cache", ArgKind::Bool, "Also show the cache layer.")]
    }

    fn instantiate(
        &self,
        session: &Session,
        args: &PluginArgs,
    ) -> Result<Box<dyn Plugin>, PluginError> {
        let state = non_null(session.state().iter());
        let cache = if args.get_bool("cache").unwrap_or(false) {
            Some(non_null(session.cache().iter()))
        } else {
            None
        };
        Ok(Box::new(Config { state, cache }))
    }
}

fn non_null<'a>(
    entries: impl Iterator<Item = (&'a str, &'a ConfigValue)>,
) -> Vec<(String, ConfigValue)> {
    entries
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

struct Config {
    state: Vec<(String, ConfigValue)>,
    cache: Option<Vec<(String, ConfigValue)>>,
}

fn dump(renderer: &mut dyn Renderer, entries: &[(String, ConfigValue)]) -> Result<(), PluginError> {
    renderer.table_header(&["key", "value"])?;
    for (key, value) in entries {
        renderer.table_row(&[Value::String(key.clone()), value.clone()])?;
    }
    Ok(())
}

impl Plugin for Config {
    fn name(&self) -> &str {
        "config"
    }

    fn render(&mut self, renderer: &mut dyn Renderer) -> Result<(), PluginError> {
        renderer.section("Configuration")?;
        dump(renderer, &self.state)?;
        if let Some(cache) = &self.cache {
            renderer.section("Cache")?;
            dump(renderer, cache)?;
        }
        Ok(())
    }
}
