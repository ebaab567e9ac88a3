//! Configuration display command.

use geoenrich::config::Settings;

fn mask(keys: &mut [String]) {
    for key in keys.iter_mut() {
        let visible: String = key.chars().take(4).collect();
        *key = format!("{}…", visible);
    }
}

/// Print the effective settings as TOML with credentials masked.
pub fn cmd_config(settings: &Settings) -> anyhow::Result<()> {
    let mut shown = settings.clone();
    mask(&mut shown.credentials.mapbox);
    mask(&mut shown.credentials.google);
    mask(&mut shown.credentials.openai);
    print!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}
