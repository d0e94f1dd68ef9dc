//! Configuration Vault – reads/writes `~/.tiltscan/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tiltscan_types::{ReconstructionConfig, SamplerConfig, SweepConfig};

/// Where range readings and servo commands go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Synthetic scene, no hardware attached.
    #[default]
    Sim,
    /// TFmini on a serial port plus two sysfs PWM servos.
    Serial,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Sim => write!(f, "sim"),
            Backend::Serial => write!(f, "serial"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sim" => Ok(Backend::Sim),
            "serial" => Ok(Backend::Serial),
            other => Err(format!("unknown backend '{other}' (expected sim or serial)")),
        }
    }
}

/// `[hardware]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub backend: Backend,
    /// Serial device of the rangefinder.
    pub serial_port: String,
    pub baud_rate: u32,
    /// Per-read timeout on the serial port.
    pub read_timeout_ms: u64,
    /// sysfs PWM chip driving both servos.
    pub pwm_chip: PathBuf,
    pub pan_channel: u32,
    pub tilt_channel: u32,
    pub slew_step_us: u32,
    pub settle_ms: u64,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            serial_port: "/dev/serial0".to_string(),
            baud_rate: tiltscan_hal::serial::DEFAULT_BAUD,
            read_timeout_ms: 100,
            pwm_chip: PathBuf::from("/sys/class/pwm/pwmchip0"),
            pan_channel: 0,
            tilt_channel: 1,
            slew_step_us: 8,
            settle_ms: 80,
        }
    }
}

/// Persisted user configuration stored in `~/.tiltscan/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP port of the cockpit.
    #[serde(default = "default_cockpit_port")]
    pub cockpit_port: u16,

    /// Directory that `/export` and `tiltscan scan` write into.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub hardware: HardwareConfig,

    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub reconstruction: ReconstructionConfig,
}

fn default_cockpit_port() -> u16 {
    tiltscan_cockpit::DEFAULT_PORT
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cockpit_port: default_cockpit_port(),
            output_dir: default_output_dir(),
            hardware: HardwareConfig::default(),
            sweep: SweepConfig::default(),
            sampler: SamplerConfig::default(),
            reconstruction: ReconstructionConfig::default(),
        }
    }
}

/// Return the path to `~/.tiltscan/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".tiltscan").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    Ok(load_from(&config_path())?.map(|mut cfg| {
        apply_env_overrides(&mut cfg);
        cfg
    }))
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Load the config, falling back to defaults (with env overrides) when the
/// file is missing or unreadable.
pub fn load_or_default() -> Config {
    match load() {
        Ok(Some(cfg)) => cfg,
        Ok(None) | Err(_) => {
            let mut cfg = Config::default();
            apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

/// Apply `TILTSCAN_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `TILTSCAN_BACKEND` | `hardware.backend` |
/// | `TILTSCAN_SERIAL_PORT` | `hardware.serial_port` |
/// | `TILTSCAN_COCKPIT_PORT` | `cockpit_port` |
/// | `TILTSCAN_OUTPUT_DIR` | `output_dir` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("TILTSCAN_BACKEND")
        && let Ok(backend) = v.parse::<Backend>()
    {
        cfg.hardware.backend = backend;
    }
    if let Ok(v) = std::env::var("TILTSCAN_SERIAL_PORT") {
        cfg.hardware.serial_port = v;
    }
    if let Ok(v) = std::env::var("TILTSCAN_COCKPIT_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.cockpit_port = port;
    }
    if let Ok(v) = std::env::var("TILTSCAN_OUTPUT_DIR")
        && !v.is_empty()
    {
        cfg.output_dir = PathBuf::from(v);
    }
}

/// Save the config to disk, creating `~/.tiltscan/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
