//! Config command - show configuration.

use anyhow::Result;
use kbridge_core::adapters::ToolPaths;
use kbridge_core::ConfigStore;

use super::print_json;

pub async fn show(json: bool) -> Result<()> {
    let store = ConfigStore::new()?;
    let settings = store.load().await?;

    if json {
        return print_json(&settings);
    }

    let tools = ToolPaths::discover(&settings);
    let describe = |path: kbridge_core::Result<&std::path::PathBuf>| match path {
        Ok(path) => path.display().to_string(),
        Err(_) => "not found".to_string(),
    };

    println!("Config file: {}", store.config_path().display());
    println!();
    println!("telepresence:        {}", describe(tools.telepresence()));
    println!("kubectl:             {}", describe(tools.kubectl()));
    println!("Target port:         {}", settings.target_port);
    println!(
        "Env file dir:        {}",
        settings
            .env_file_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| std::env::temp_dir().display().to_string())
    );
    println!("Command timeout:     {}s", settings.command_timeout_secs);
    println!("Poll interval:       {}s", settings.poll_interval_secs);
    println!("Suppression window:  {}s", settings.suppression_window_secs);
    println!(
        "Termination:         {}ms grace, {}ms kill wait",
        settings.terminate_grace_ms, settings.kill_wait_ms
    );
    Ok(())
}
