use std::{path::PathBuf, sync::OnceLock, time::Duration};

use blob_encoder::Settings;

pub const DEFAULT_DISPLAY_NAME: &str = "Screen Recording 2025-10-06 at 17.21.59.gif";
pub const DEFAULT_IDENTIFIER: &str = "demo-file.bin";
pub const DEFAULT_ASSET_PATH: &str = "/Screen%20Recording%202025-10-06%20at%2017.21.59.gif";
pub const ANIMATION_TASK: &str = "animation";

const MIB: usize = 1024 * 1024;

/// Where the default payload comes from.
#[derive(Clone, Debug)]
pub enum AssetLocation {
    Http { base_url: String, path: String },
    File { path: PathBuf },
}

impl AssetLocation {
    pub fn describe(&self) -> String {
        match self {
            AssetLocation::Http { base_url, path } => {
                format!("{}{}", base_url.trim_end_matches('/'), path)
            }
            AssetLocation::File { path } => format!("file://{}", path.display()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DemoConfig {
    pub asset: AssetLocation,
    pub fetch_timeout: Duration,
    pub fallback_size: usize,
    pub fallback_seed: u64,
    pub default_display_name: String,
    pub default_identifier: String,
    pub animation_interval: Duration,
    pub phase_step: u32,
    pub input_interval: Duration,
    pub render_interval: Duration,
    pub rounds: u32,
    pub warmup: Duration,
    pub cooldown: Duration,
    pub encoder: Settings,
    pub selected_file: Option<PathBuf>,
    pub json_report: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            asset: AssetLocation::Http {
                base_url: "http://localhost:3000".to_string(),
                path: DEFAULT_ASSET_PATH.to_string(),
            },
            fetch_timeout: Duration::from_secs(30),
            fallback_size: 50 * MIB,
            fallback_seed: 0x5eed,
            default_display_name: DEFAULT_DISPLAY_NAME.to_string(),
            default_identifier: DEFAULT_IDENTIFIER.to_string(),
            animation_interval: Duration::from_millis(15),
            phase_step: 3,
            input_interval: Duration::from_millis(50),
            render_interval: Duration::from_millis(100),
            rounds: 1,
            warmup: Duration::from_millis(500),
            cooldown: Duration::from_millis(500),
            encoder: Settings::default(),
            selected_file: None,
            json_report: false,
        }
    }
}

impl DemoConfig {
    /// Sets the fallback size in MiB. The fallback must not be empty.
    pub fn fallback_size_mib(mut self, mib: usize) -> anyhow::Result<Self> {
        self.fallback_size = match mib.checked_mul(MIB) {
            Some(0) => return Err(anyhow::anyhow!("fallback size must be at least 1 MiB")),
            Some(size) => size,
            None => return Err(anyhow::anyhow!("fallback size of {} MiB is too large", mib)),
        };
        Ok(self)
    }
}

static CONFIG: OnceLock<DemoConfig> = OnceLock::new();

/// Installs the process-wide config. Only the first call wins.
pub fn init(config: DemoConfig) {
    if CONFIG.set(config).is_err() {
        log::warn!("config already initialized");
    }
}

pub fn config() -> &'static DemoConfig {
    CONFIG.get_or_init(DemoConfig::default)
}
