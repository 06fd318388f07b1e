use crate::errors::SlipResult;
use crate::ir::BaseDirEquality;
use console::style;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use toml;

static DEFAULT_CONFIG_TOML: &str = include_str!("../../default-slipguard.conf");

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Fixed-point budget: how many tree-changing cycles before the file is
    /// reported as non-converging.
    pub max_cycles: usize,

    /// Skip files that already use a safe bulk-extraction API, leaving them
    /// to the rewrite that promotes that idiom.
    pub respect_safe_extraction_api: bool,

    /// Separator-qualify weak canonical-string prefix checks in place.
    pub fix_weak_guards: bool,

    /// When do two base-directory expressions count as the same value.
    pub base_dir_equality: BaseDirEquality,
}
impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cycles: 10,
            respect_safe_extraction_api: true,
            fix_weak_guards: true,
            base_dir_equality: BaseDirEquality::Syntactic,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ScannerConfig {
    /// The maximum file size to scan, in megabytes.
    pub max_file_size_mb: Option<u64>,

    /// Directories to exclude from scanning.
    pub excluded_directories: Vec<String>,

    /// Excluded files
    pub excluded_files: Vec<String>,

    /// Whether to respect VCS ignore files (`.gitignore`, ..) or not.
    pub read_vcsignore: bool,

    /// Whether to follow symlinks or not.
    pub follow_symlinks: bool,

    /// Whether to scan hidden files or not.
    pub scan_hidden_files: bool,
}
impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: None,
            excluded_directories: vec!["target", "build", "out", ".git", ".idea", ".gradle"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            excluded_files: vec![],
            read_vcsignore: true,
            follow_symlinks: false,
            scan_hidden_files: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    /// The default output format.
    pub default_format: String,

    /// Whether to print anything to the console or not.
    pub quiet: bool,
}
impl Default for OutputConfig {
    fn default() -> Self {
        Self { default_format: "console".into(), quiet: false }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PerformanceConfig {
    /// The maximum number of worker threads to use, or `None` to auto-detect.
    pub worker_threads: Option<usize>,

    /// The maximum number of paths sent over the walker channel at once.
    pub batch_size: usize,

    /// capacity = threads × this
    pub channel_multiplier: usize,
}
impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { worker_threads: None, batch_size: 8, channel_multiplier: 4 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub engine: EngineConfig,
    pub scanner: ScannerConfig,
    pub output: OutputConfig,
    pub performance: PerformanceConfig,
}

impl Config {
    pub fn load(config_dir: &Path) -> SlipResult<Self> {
        let mut config = Config::default();

        let default_config_path = config_dir.join("slipguard.conf");
        if !default_config_path.exists() {
            create_example_config(config_dir)?;
        }

        let user_config_path = config_dir.join("slipguard.local");
        if user_config_path.exists() {
            let user_config_content = fs::read_to_string(&user_config_path)?;
            let user_config: Config = toml::from_str(&user_config_content)
                .map_err(|e| crate::errors::SlipError::Other(e.to_string()))?;

            config = merge_configs(config, user_config);

            if !config.output.quiet {
                println!(
                    "{}: Loaded user config from: {}\n",
                    style("note").green().bold(),
                    style(user_config_path.display()).underlined().white().bold()
                );
            }
        }

        Ok(config)
    }
}

fn create_example_config(config_dir: &Path) -> SlipResult<()> {
    let example_path = config_dir.join("slipguard.conf");
    if !example_path.exists() {
        fs::write(&example_path, DEFAULT_CONFIG_TOML)?;
        tracing::debug!("Example config created at: {}", example_path.display());
    }
    Ok(())
}

/// Merge user config into default config, preserving defaults where the user
/// didn't supply new exclusions and overriding everything else.
fn merge_configs(mut default: Config, user: Config) -> Config {
    // --- EngineConfig ---
    default.engine = user.engine;

    // --- ScannerConfig ---
    default.scanner.max_file_size_mb = user.scanner.max_file_size_mb;
    default.scanner.read_vcsignore = user.scanner.read_vcsignore;
    default.scanner.follow_symlinks = user.scanner.follow_symlinks;
    default.scanner.scan_hidden_files = user.scanner.scan_hidden_files;

    // Merge exclusion lists (default ⊔ user), then sort & dedupe
    default
        .scanner
        .excluded_directories
        .extend(user.scanner.excluded_directories);
    default.scanner.excluded_files.extend(user.scanner.excluded_files);
    default.scanner.excluded_directories.sort_unstable();
    default.scanner.excluded_directories.dedup();
    default.scanner.excluded_files.sort_unstable();
    default.scanner.excluded_files.dedup();

    // --- OutputConfig ---
    default.output.default_format = user.output.default_format;
    default.output.quiet = user.output.quiet;

    // --- PerformanceConfig ---
    default.performance.worker_threads = user.performance.worker_threads;
    default.performance.batch_size = user.performance.batch_size;
    default.performance.channel_multiplier = user.performance.channel_multiplier;

    default
}

#[test]
fn merge_configs_dedupes_and_keeps_order() {
    let mut default_cfg = Config::default();
    default_cfg.scanner.excluded_directories = vec!["build".into(), "target".into()];

    let mut user_cfg = Config::default();
    user_cfg.scanner.excluded_directories = vec!["bin".into(), "build".into()];

    let merged = merge_configs(default_cfg, user_cfg);

    assert_eq!(merged.scanner.excluded_directories, vec!["bin", "build", "target"]);
}

#[test]
fn load_creates_example_and_reads_user_overrides() {
    let cfg_dir = tempfile::tempdir().unwrap();
    let cfg_path = cfg_dir.path();

    let user_toml = r#"
        [engine]
        max_cycles = 3
        base_dir_equality = "strict"

        [output]
        quiet = true
    "#;
    fs::write(cfg_path.join("slipguard.local"), user_toml).unwrap();

    let cfg = Config::load(cfg_path).expect("Config::load should succeed");

    assert!(cfg_path.join("slipguard.conf").is_file());

    assert_eq!(cfg.engine.max_cycles, 3);
    assert_eq!(cfg.engine.base_dir_equality, BaseDirEquality::Strict);
    assert!(cfg.output.quiet);

    assert!(!cfg.scanner.follow_symlinks);
}
