use teleflow_config::settings::Settings;
use teleflow_core::TeleflowError;
use tracing::debug;

pub fn run(settings: &Settings, input: String) -> Result<(), TeleflowError> {
    let normalizer = super::normalizer(settings)?;
    let text = super::read_input(&input)?;

    let mut count = 0usize;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let event = normalizer.event(line);
        println!("{}", serde_json::to_string(&event)?);
        count += 1;
    }
    debug!(events = count, "events normalized");
    Ok(())
}
