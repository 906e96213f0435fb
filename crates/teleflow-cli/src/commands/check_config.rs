use std::path::PathBuf;

use teleflow_config::settings;
use teleflow_core::TeleflowError;

pub fn run(file: PathBuf) -> Result<(), TeleflowError> {
    let settings = settings::load(&file)?;
    let v = &settings.validation;

    println!("  Settings:       {}", file.display());
    println!("  Expand:         {}", v.expand);
    println!("  Conn timeout:   {}", v.connectivity_timeout);
    println!("  Conn poll:      {}", v.connectivity_poll_interval);
    println!("  Runtime:        {}", v.runtime_version()?);
    println!(
        "  Logging:        {} ({})",
        settings.logging.level, settings.logging.format
    );
    match &settings.normalize.properties_file {
        Some(path) => println!("  Properties:     {}", path.display()),
        None => println!("  Properties:     built-in"),
    }
    println!(
        "  Event category: {}",
        settings.normalize.events_default_category
    );

    // Properties are loaded too, so a broken definitions file is reported here.
    super::normalizer(&settings)?;
    println!("[teleflow] Settings OK");
    Ok(())
}
