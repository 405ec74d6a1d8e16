//! Host-process configuration: every sizing knob `kernelcore::KernelConfig`
//! needs, loadable from a JSON file (`KERNELSIM_CONFIG`) or individual
//! `KERNELSIM_*` environment variables, the same way the daemon reads
//! `SISCTL_BIND` with a hardcoded fallback.

use kernelcore::KernelConfig;
use serde::{Deserialize, Serialize};

fn default_num_phys_pages() -> usize {
    32
}
fn default_page_size() -> usize {
    128
}
fn default_tlb_size() -> usize {
    4
}
fn default_max_threads() -> usize {
    128
}
fn default_num_dir_entries() -> usize {
    10
}
fn default_disk_num_sectors() -> usize {
    512
}
fn default_num_cache_blocks() -> usize {
    8
}
fn default_disk_path() -> String {
    "kernelsim.disk".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_num_phys_pages")]
    pub num_phys_pages: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_tlb_size")]
    pub tlb_size: usize,
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    #[serde(default = "default_num_dir_entries")]
    pub num_dir_entries: usize,
    #[serde(default = "default_disk_num_sectors")]
    pub disk_num_sectors: usize,
    #[serde(default = "default_num_cache_blocks")]
    pub num_cache_blocks: usize,
    /// Host file backing the simulated disk.
    #[serde(default = "default_disk_path")]
    pub disk_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_phys_pages: default_num_phys_pages(),
            page_size: default_page_size(),
            tlb_size: default_tlb_size(),
            max_threads: default_max_threads(),
            num_dir_entries: default_num_dir_entries(),
            disk_num_sectors: default_disk_num_sectors(),
            num_cache_blocks: default_num_cache_blocks(),
            disk_path: default_disk_path(),
        }
    }
}

impl Config {
    /// Loads from `KERNELSIM_CONFIG` (a path to a JSON file) if set,
    /// falling back to defaults, then applies any individual `KERNELSIM_*`
    /// overrides on top — the same layering the daemon uses for its bind
    /// address.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("KERNELSIM_CONFIG") {
            Ok(path) => {
                let text = std::fs::read_to_string(&path).map_err(|e| anyhow::anyhow!("reading config file {path}: {e}"))?;
                serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("parsing config file {path}: {e}"))?
            }
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("KERNELSIM_NUM_PHYS_PAGES") {
            if let Ok(n) = v.parse() {
                self.num_phys_pages = n;
            }
        }
        if let Ok(v) = std::env::var("KERNELSIM_PAGE_SIZE") {
            if let Ok(n) = v.parse() {
                self.page_size = n;
            }
        }
        if let Ok(v) = std::env::var("KERNELSIM_TLB_SIZE") {
            if let Ok(n) = v.parse() {
                self.tlb_size = n;
            }
        }
        if let Ok(v) = std::env::var("KERNELSIM_DISK_PATH") {
            self.disk_path = v;
        }
    }

    pub fn kernel_config(&self) -> KernelConfig {
        KernelConfig {
            num_phys_pages: self.num_phys_pages,
            page_size: self.page_size,
            tlb_size: self.tlb_size,
            max_threads: self.max_threads,
            num_dir_entries: self.num_dir_entries,
            disk_num_sectors: self.disk_num_sectors,
            num_cache_blocks: self.num_cache_blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_kernelcore_defaults() {
        let config = Config::default();
        assert_eq!(config.kernel_config(), KernelConfig::default());
    }

    #[test]
    fn env_override_wins_over_the_loaded_file() {
        std::env::set_var("KERNELSIM_TLB_SIZE", "0");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.tlb_size, 0);
        std::env::remove_var("KERNELSIM_TLB_SIZE");
    }
}
