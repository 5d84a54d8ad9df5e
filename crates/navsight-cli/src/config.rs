//! Reads and writes `~/.navsight/config.toml`.

use navsight_runtime::NavigatorConfig;
use navsight_types::Side;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for the built-in simulated sensors used by `navsight run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Delay between simulated camera frames.
    pub frame_period_ms: u64,
    /// Stop automatically after this many seconds; `0` runs until Ctrl-C.
    pub run_seconds: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frame_period_ms: 100,
            run_seconds: 0,
        }
    }
}

/// Persisted configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub navigator: NavigatorConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Return the path to `~/.navsight/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".navsight").join("config.toml")
}

/// Load from `path`, or `None` if the file does not exist.  Environment
/// overrides are applied and the result is validated.
pub fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.navigator
        .validate()
        .map_err(|e| format!("Invalid config at {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `NAVSIGHT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `NAVSIGHT_FOV_DEG` | `navigator.camera.fov_deg` |
/// | `NAVSIGHT_BINS` | `navigator.fusion.bins` |
/// | `NAVSIGHT_EMERGENCY_CM` | `navigator.thresholds.emergency_dist_cm` |
/// | `NAVSIGHT_PREFERRED_DIRECTION` | `navigator.guidance.preferred_direction` |
/// | `NAVSIGHT_MIN_VOCAL_INTERVAL_S` | `navigator.outbound.min_vocal_interval_s` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    let nav = &mut cfg.navigator;
    if let Some(v) = env_parse::<f32>("NAVSIGHT_FOV_DEG") {
        nav.camera.fov_deg = v;
    }
    if let Some(v) = env_parse::<usize>("NAVSIGHT_BINS") {
        nav.fusion.bins = v;
    }
    if let Some(v) = env_parse::<f32>("NAVSIGHT_EMERGENCY_CM") {
        nav.thresholds.emergency_dist_cm = v;
    }
    if let Some(v) = env_parse::<Side>("NAVSIGHT_PREFERRED_DIRECTION") {
        nav.guidance.preferred_direction = v;
    }
    if let Some(v) = env_parse::<f32>("NAVSIGHT_MIN_VOCAL_INTERVAL_S") {
        nav.outbound.min_vocal_interval_s = v;
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

/// Save the config, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
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
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-var tests share process state.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn default_config_survives_toml() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.navigator.guidance.preferred_direction = Side::Left;
        cfg.demo.run_seconds = 30;
        save_to(&cfg, &path).expect("save");

        let _g = ENV_LOCK.lock().unwrap();
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[navigator.thresholds]\nemergency_dist_cm = 50.0\n").unwrap();

        let _g = ENV_LOCK.lock().unwrap();
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.navigator.thresholds.emergency_dist_cm, 50.0);
        assert_eq!(loaded.navigator.fusion.bins, 13);
        assert_eq!(loaded.demo, DemoConfig::default());
    }

    #[test]
    fn inconsistent_thresholds_fail_to_load() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[navigator.thresholds]\nemergency_dist_cm = 150.0\n").unwrap();

        let _g = ENV_LOCK.lock().unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Invalid config"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap()).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn config_path_points_to_navsight_dir() {
        let p = config_path_for_home("/home/walker");
        assert!(p.to_string_lossy().contains(".navsight"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let _g = ENV_LOCK.lock().unwrap();
        // SAFETY: ENV_LOCK serialises every test touching these variables.
        unsafe {
            std::env::set_var("NAVSIGHT_BINS", "9");
            std::env::set_var("NAVSIGHT_PREFERRED_DIRECTION", "left");
            std::env::set_var("NAVSIGHT_EMERGENCY_CM", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.navigator.fusion.bins, 9);
        assert_eq!(cfg.navigator.guidance.preferred_direction, Side::Left);
        assert_eq!(cfg.navigator.thresholds.emergency_dist_cm, 35.0);
        unsafe {
            std::env::remove_var("NAVSIGHT_BINS");
            std::env::remove_var("NAVSIGHT_PREFERRED_DIRECTION");
            std::env::remove_var("NAVSIGHT_EMERGENCY_CM");
        }
    }
}
