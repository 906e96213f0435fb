use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use teleflow_config::settings::Settings;
use teleflow_config::{
    DeviceType, LocalPlatform, ValidateOptions, ValidationContext, ValidatorEngine, ValidatorKind,
};
use teleflow_core::TeleflowError;
use tracing::info;

pub async fn run(
    settings: &Settings,
    file: String,
    namespace: bool,
    no_expand: bool,
    device_type: String,
) -> Result<(), TeleflowError> {
    let device = DeviceType::parse(&device_type)
        .ok_or_else(|| TeleflowError::Settings(format!("unknown device type '{device_type}'")))?;
    let ctx = ValidationContext::from_settings(
        &settings.validation,
        Arc::new(LocalPlatform::new(device)),
    )?;
    let engine = ValidatorEngine::new(ctx)?;

    let doc: Value = serde_json::from_str(&super::read_input(&file)?)?;
    let kind = if namespace {
        ValidatorKind::Namespace
    } else {
        ValidatorKind::Full
    };
    let opts = ValidateOptions {
        expand: no_expand.then_some(false),
    };

    let started = Instant::now();
    let validated = engine.validator(kind).validate(doc, &opts).await?;
    info!(
        validator = kind.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "declaration is valid"
    );
    super::print_json(&validated)
}
