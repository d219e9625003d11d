use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use fusebox_core::config::ViewerConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write config to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Print or save the default ViewerConfig as TOML.
pub fn run(args: &ConfigArgs) -> Result<()> {
    let toml_str = toml::to_string_pretty(&ViewerConfig::default())?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &toml_str)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("Default config saved to {}", path.display());
    } else {
        print!("{}", toml_str);
    }

    Ok(())
}

/// Read and validate a viewer config file.
pub fn load(path: &Path) -> Result<ViewerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: ViewerConfig = toml::from_str(&contents).context("Invalid viewer config")?;
    config
        .validate()
        .with_context(|| format!("Rejected config {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use fusebox_core::config::PreloadMode;
    use fusebox_core::viewport::LayoutPreset;

    use super::*;

    #[test]
    fn test_default_config_survives_toml() {
        let text = toml::to_string_pretty(&ViewerConfig::default()).unwrap();
        let parsed: ViewerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, ViewerConfig::default());
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[layout]\ninitial = \"Quad\"\n\n[fusion]\npreload_mode = \"Inline\"").unwrap();
        let config = load(f.path()).unwrap();
        assert_eq!(config.layout.initial, LayoutPreset::Quad);
        assert_eq!(config.fusion.preload_mode, PreloadMode::Inline);
        assert_eq!(config.sync, ViewerConfig::default().sync);
    }

    #[test]
    fn test_load_rejects_invalid_threshold() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[fusion]\nready_threshold = 1.5").unwrap();
        assert!(load(f.path()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load(Path::new("/nonexistent/fusebox.toml")).is_err());
    }
}
