//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success};
use vt_core::config::{self, ConfigFile};

fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

/// Show the effective configuration, defaults included
pub fn config_show(config_path: Option<&Path>) -> Result<()> {
    let path = resolve_path(config_path);
    let effective = config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;

    if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
    } else {
        print_info(&format!("No configuration file at {:?}, showing defaults", path));
    }
    println!();
    println!("{}", render(&effective)?);
    Ok(())
}

/// Print the configuration file path
pub fn config_path(config_path: Option<&Path>) -> Result<()> {
    println!("{}", resolve_path(config_path).display());
    Ok(())
}

/// Write a configuration file with every default spelled out
pub fn config_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = resolve_path(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    config::save_config(&path, &ConfigFile::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;
    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}

fn render(config: &ConfigFile) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_has_all_sections() {
        let text = render(&ConfigFile::default()).unwrap();
        for section in ["[tunnel]", "[bootstrap]", "[api]", "[resolver]"] {
            assert!(text.contains(section), "missing {section}");
        }
        assert!(text.contains("bridge_port = 2222"));
    }

    #[test]
    fn test_init_writes_loadable_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        config_init(Some(&path), false).unwrap();
        let loaded: ConfigFile = config::load_config(&path).unwrap();
        assert_eq!(loaded.tunnel.relay_binary, "websocat");

        std::fs::write(&path, "[tunnel]\nbridge_port = 9000\n").unwrap();
        config_init(Some(&path), false).unwrap();
        let kept: ConfigFile = config::load_config(&path).unwrap();
        assert_eq!(kept.tunnel.bridge_port, 9000);

        config_init(Some(&path), true).unwrap();
        let reset: ConfigFile = config::load_config(&path).unwrap();
        assert_eq!(reset.tunnel.bridge_port, 2222);
    }
}
