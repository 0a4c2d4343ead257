//! Light/dark preference persisted between runs, mirroring the themed
//! chat surface of the hosted deployment.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreference {
    Light,
    #[default]
    Dark,
}

impl ThemePreference {
    pub fn label(self) -> &'static str {
        match self {
            ThemePreference::Light => "Light",
            ThemePreference::Dark => "Dark",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemePreference::Light => ThemePreference::Dark,
            ThemePreference::Dark => ThemePreference::Light,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ThemeFile {
    preference: ThemePreference,
}

fn theme_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("kagami").join("theme.toml"))
}

pub fn load() -> ThemePreference {
    theme_path().map(|path| load_from(&path)).unwrap_or_default()
}

pub fn save(preference: ThemePreference) -> anyhow::Result<()> {
    let Some(path) = theme_path() else {
        return Ok(());
    };
    save_to(&path, preference)
}

fn load_from(path: &Path) -> ThemePreference {
    fs::read_to_string(path)
        .ok()
        .and_then(|raw| toml::from_str::<ThemeFile>(&raw).ok())
        .map(|file| file.preference)
        .unwrap_or_default()
}

fn save_to(path: &Path, preference: ThemePreference) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create '{}'", parent.display()))?;
    }
    let raw = toml::to_string(&ThemeFile { preference })?;
    fs::write(path, raw).with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn temp_theme_path() -> PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir()
            .join(format!("kagami_theme_test_{suffix}"))
            .join("theme.toml")
    }

    #[test]
    fn missing_file_falls_back_to_dark() {
        assert_eq!(load_from(Path::new("/nonexistent/theme.toml")), ThemePreference::Dark);
    }

    #[test]
    fn preference_roundtrips_through_disk() {
        let path = temp_theme_path();
        save_to(&path, ThemePreference::Light).expect("save");
        assert_eq!(load_from(&path), ThemePreference::Light);

        save_to(&path, ThemePreference::Dark).expect("save again");
        assert_eq!(load_from(&path), ThemePreference::Dark);

        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }

    #[test]
    fn corrupt_file_falls_back_to_dark() {
        let path = temp_theme_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("dir");
        }
        fs::write(&path, "preference = 7").expect("write");
        assert_eq!(load_from(&path), ThemePreference::Dark);
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir_all(parent);
        }
    }
}
