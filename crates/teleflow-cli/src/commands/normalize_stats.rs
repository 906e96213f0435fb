use serde_json::Value;
use teleflow_config::settings::Settings;
use teleflow_core::TeleflowError;

pub fn run(settings: &Settings, file: String) -> Result<(), TeleflowError> {
    let normalizer = super::normalizer(settings)?;
    let raw: Value = serde_json::from_str(&super::read_input(&file)?)?;
    if !raw.is_object() {
        return Err(TeleflowError::Normalize(
            "stats input must be an object of endpoint to response".into(),
        ));
    }
    let record = normalizer.stats(&raw)?;
    super::print_json(&record)
}
