use crate::error_util::AnyhowExt;
use anyhow::{bail, Result};
use image::imageops::FilterType;
use log::{debug, info};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::{
    collections::HashSet,
    env, fs,
    path::{Path, PathBuf},
};

/// One output of the icon table: `<name>.png` at `size`×`size` pixels.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IconSpec {
    pub name: String,
    pub size: u32,
}

impl IconSpec {
    fn new(name: &str, size: u32) -> Self {
        IconSpec {
            name: name.to_string(),
            size,
        }
    }
}

/// Icon set a Tauri bundle expects. `Square310x310Logo` is 312 on purpose.
static DEFAULT_ICONS: Lazy<Vec<IconSpec>> = Lazy::new(|| {
    vec![
        IconSpec::new("32x32", 32),
        IconSpec::new("128x128", 128),
        IconSpec::new("128x128@2x", 256),
        IconSpec::new("icon", 512),
        IconSpec::new("Square30x30Logo", 30),
        IconSpec::new("Square44x44Logo", 44),
        IconSpec::new("Square71x71Logo", 71),
        IconSpec::new("Square89x89Logo", 89),
        IconSpec::new("Square107x107Logo", 107),
        IconSpec::new("Square142x142Logo", 142),
        IconSpec::new("Square150x150Logo", 150),
        IconSpec::new("Square284x284Logo", 284),
        IconSpec::new("Square310x310Logo", 312),
        IconSpec::new("StoreLogo", 50),
    ]
});

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// What to read, where to write, and which sizes to produce.
///
/// Every field has a default, so a config file only needs the keys it
/// overrides.
#[derive(Clone, Debug, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_source")]
    pub source: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_icons")]
    pub icons: Vec<IconSpec>,
    #[serde(default)]
    pub filter: ResizeFilter,
    /// Frames embedded in `icon.ico`.
    #[serde(default = "default_ico_sizes")]
    pub ico_sizes: Vec<u32>,
    /// Table names whose rasters go into `icon.icns` next to the source.
    #[serde(default = "default_icns_entries")]
    pub icns_entries: Vec<String>,
}

fn default_source() -> PathBuf {
    PathBuf::from("icon-source.png")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("icons")
}

fn default_icons() -> Vec<IconSpec> {
    DEFAULT_ICONS.clone()
}

fn default_ico_sizes() -> Vec<u32> {
    vec![128]
}

fn default_icns_entries() -> Vec<String> {
    vec!["icon".to_string(), "128x128@2x".to_string()]
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            source: default_source(),
            output_dir: default_output_dir(),
            icons: default_icons(),
            filter: ResizeFilter::default(),
            ico_sizes: default_ico_sizes(),
            icns_entries: default_icns_entries(),
        }
    }
}

impl ExportConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ExportConfig = toml::from_str(s).anyhow()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        // an empty yaml document is `null`, not an empty mapping
        if s.trim().is_empty() {
            return Ok(ExportConfig::default());
        }
        let config: ExportConfig = serde_yaml::from_str(s).anyhow()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.output_dir.as_os_str().is_empty() {
            bail!("output_dir must not be empty");
        }
        if self.icons.is_empty() {
            bail!("icon table must not be empty");
        }
        let mut names = HashSet::new();
        for icon in &self.icons {
            if icon.name.is_empty() {
                bail!("icon name must not be empty");
            }
            if icon.size == 0 {
                bail!("icon `{}` has size 0", icon.name);
            }
            if !names.insert(icon.name.as_str()) {
                bail!("icon `{}` is listed more than once", icon.name);
            }
        }
        if self.ico_sizes.is_empty() {
            bail!("ico_sizes must name at least one frame");
        }
        if let Some(size) = self.ico_sizes.iter().find(|s| !(1..=256).contains(*s)) {
            bail!("ico frame size {} is outside 1..=256", size);
        }
        if let Some(name) = self
            .icns_entries
            .iter()
            .find(|n| !names.contains(n.as_str()))
        {
            bail!("icns entry `{}` is not in the icon table", name);
        }
        Ok(())
    }
}

fn find_config_file() -> Option<PathBuf> {
    let names = ["config.toml", "config.yaml"];
    let local = names.iter().map(|n| Path::new("config").join(n));
    let beside_exe = env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.join("config")))
        .into_iter()
        .flat_map(|dir| names.iter().map(move |n| dir.join(n)));
    local.chain(beside_exe).find(|p| p.exists())
}

pub fn load_config_from(path: &Path) -> Result<ExportConfig> {
    let content = fs::read_to_string(path).anyhow_at("read", path)?;
    let config = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => ExportConfig::from_yaml_str(&content),
        _ => ExportConfig::from_toml_str(&content),
    };
    config.map_err(|e| e.context(format!("invalid config {}", path.display())))
}

pub fn load_config() -> Result<ExportConfig> {
    match find_config_file() {
        Some(path) => {
            info!("loading config from {}", path.display());
            load_config_from(&path)
        }
        None => {
            debug!("no config file found, using defaults");
            let config = ExportConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}
