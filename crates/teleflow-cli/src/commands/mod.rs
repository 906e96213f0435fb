pub mod check_config;
pub mod normalize_event;
pub mod normalize_stats;
pub mod validate;

use std::io::Read;
use std::path::Path;

use serde_json::Value;
use teleflow_config::settings::{self, Settings};
use teleflow_core::TeleflowError;
use teleflow_normalize::{Normalizer, Properties};

/// Settings from `path`, or the defaults when none is given.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, TeleflowError> {
    match path {
        Some(p) => Ok(settings::load(p)?),
        None => Ok(Settings::default()),
    }
}

/// Read a file, or stdin for "-".
pub fn read_input(path: &str) -> Result<String, TeleflowError> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

pub fn print_json(value: &Value) -> Result<(), TeleflowError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Normalizer for the configured properties definitions.
pub fn normalizer(settings: &Settings) -> Result<Normalizer, TeleflowError> {
    let properties = match &settings.normalize.properties_file {
        Some(path) => Properties::from_json(&std::fs::read_to_string(path)?)?,
        None => Properties::embedded()?,
    };
    let mut normalizer = Normalizer::new(&properties)?;
    normalizer.set_default_category(settings.normalize.events_default_category.clone());
    Ok(normalizer)
}
