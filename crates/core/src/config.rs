use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VencoderConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub ffplay_path: String,
    /// Preview with ffplay instead of the system's default player
    pub use_ffplay: bool,
    pub output_dir: PathBuf,
    /// Key-value store handing the queue from `convert` to `resume`
    pub state_file: PathBuf,
    /// Where stderr of failed jobs is written
    pub log_dir: PathBuf,
    pub max_concurrent_jobs: usize,
    /// List every encodable video codec instead of the common ones
    pub show_all_codecs: bool,
    pub overwrite: OverwritePolicy,
}

/// What to do when an output file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    #[default]
    Ask,
    Always,
    Never,
}

impl Default for VencoderConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from);
        let output_dir = match home {
            Some(home) => home.join("Videos").join("vencoder"),
            None => PathBuf::from("vencoder"),
        };
        let temp = std::env::temp_dir();

        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            ffplay_path: "ffplay".to_string(),
            use_ffplay: true,
            output_dir,
            state_file: temp.join("vencoder").join("store.json"),
            log_dir: temp,
            max_concurrent_jobs: 1,
            show_all_codecs: false,
            overwrite: OverwritePolicy::Ask,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<VencoderConfig> {
    let config = if let Some(config_path) = path {
        if config_path.exists() {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

            toml::from_str::<VencoderConfig>(&contents)
                .map_err(|e| anyhow::anyhow!("Failed to parse TOML config: {}", e))?
        } else {
            #[cfg(not(test))]
            tracing::warn!("Config file not found at {:?}, using defaults", config_path);
            VencoderConfig::default()
        }
    } else {
        #[cfg(not(test))]
        tracing::info!("No config path provided, using defaults");
        VencoderConfig::default()
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &VencoderConfig) -> Result<()> {
    if config.ffmpeg_path.trim().is_empty() {
        anyhow::bail!("ffmpeg_path cannot be empty");
    }

    if config.ffprobe_path.trim().is_empty() {
        anyhow::bail!("ffprobe_path cannot be empty");
    }

    if config.use_ffplay && config.ffplay_path.trim().is_empty() {
        anyhow::bail!("ffplay_path cannot be empty when use_ffplay is set");
    }

    if config.max_concurrent_jobs == 0 {
        anyhow::bail!("max_concurrent_jobs must be at least 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn arb_overwrite_policy() -> impl Strategy<Value = OverwritePolicy> {
        prop_oneof![
            Just(OverwritePolicy::Ask),
            Just(OverwritePolicy::Always),
            Just(OverwritePolicy::Never),
        ]
    }

    fn arb_path() -> impl Strategy<Value = PathBuf> {
        "(/[a-zA-Z0-9 _.-]{1,12}){1,4}".prop_map(PathBuf::from)
    }

    fn arb_config() -> impl Strategy<Value = VencoderConfig> {
        (
            "[a-zA-Z0-9/_.-]{1,40}",
            "[a-zA-Z0-9/_.-]{1,40}",
            "[a-zA-Z0-9/_.-]{1,40}",
            any::<bool>(),
            arb_path(),
            arb_path(),
            arb_path(),
            1_usize..16_usize,
            any::<bool>(),
            arb_overwrite_policy(),
        )
            .prop_map(
                |(
                    ffmpeg_path,
                    ffprobe_path,
                    ffplay_path,
                    use_ffplay,
                    output_dir,
                    state_file,
                    log_dir,
                    max_concurrent_jobs,
                    show_all_codecs,
                    overwrite,
                )| VencoderConfig {
                    ffmpeg_path,
                    ffprobe_path,
                    ffplay_path,
                    use_ffplay,
                    output_dir,
                    state_file,
                    log_dir,
                    max_concurrent_jobs,
                    show_all_codecs,
                    overwrite,
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any valid configuration survives a trip through a TOML file
        #[test]
        fn prop_config_round_trip(config in arb_config()) {
            let toml_string = toml::to_string(&config)
                .expect("Failed to serialize config to TOML");

            let mut temp_file = NamedTempFile::new()
                .expect("Failed to create temp file");
            temp_file.write_all(toml_string.as_bytes())
                .expect("Failed to write to temp file");
            temp_file.flush()
                .expect("Failed to flush temp file");

            let loaded_config = load_config(Some(temp_file.path()))
                .expect("Failed to load config from file");

            prop_assert_eq!(config, loaded_config);
        }
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let config = load_config(Some(Path::new("/tmp/non_existent_vencoder_12345.toml")))
            .expect("Should load defaults");
        assert_eq!(config, VencoderConfig::default());
    }

    #[test]
    fn test_no_config_path_uses_defaults() {
        let config = load_config(None).expect("Should load defaults");
        assert_eq!(config, VencoderConfig::default());
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.overwrite, OverwritePolicy::Ask);
    }

    #[test]
    fn test_invalid_toml_syntax() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(b"ffmpeg_path = [unterminated")
            .expect("Failed to write");
        temp_file.flush().expect("Failed to flush");

        let result = load_config(Some(temp_file.path()));
        assert!(result.unwrap_err().to_string().contains("parse TOML"));
    }

    #[test]
    fn test_partial_config_with_defaults() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let partial_toml = r#"
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
overwrite = "never"
max_concurrent_jobs = 2
"#;
        temp_file
            .write_all(partial_toml.as_bytes())
            .expect("Failed to write");
        temp_file.flush().expect("Failed to flush");

        let config = load_config(Some(temp_file.path())).expect("Should load partial config");

        assert_eq!(config.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.overwrite, OverwritePolicy::Never);
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.ffprobe_path, VencoderConfig::default().ffprobe_path);
        assert_eq!(config.state_file, VencoderConfig::default().state_file);
    }

    #[test]
    fn test_validation_empty_tool_path() {
        let config = VencoderConfig {
            ffprobe_path: "  ".to_string(),
            ..Default::default()
        };

        let result = validate_config(&config);
        assert!(result.unwrap_err().to_string().contains("ffprobe_path"));
    }

    #[test]
    fn test_validation_ffplay_path_only_when_used() {
        let mut config = VencoderConfig {
            ffplay_path: String::new(),
            ..Default::default()
        };
        assert!(validate_config(&config)
            .unwrap_err()
            .to_string()
            .contains("ffplay_path"));

        config.use_ffplay = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_zero_concurrent_jobs() {
        let config = VencoderConfig {
            max_concurrent_jobs: 0,
            ..Default::default()
        };

        let result = validate_config(&config);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("max_concurrent_jobs"));
    }

    #[test]
    fn test_unknown_overwrite_policy_is_rejected() {
        let result = toml::from_str::<VencoderConfig>("overwrite = \"sometimes\"");
        assert!(result.is_err());
    }
}
