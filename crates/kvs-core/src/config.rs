//! Scan job configuration.
//!
//! A `ScanConfig` is the serializable subset of settings a front end
//! usually wants to tweak. It can be loaded from and saved to TOML and
//! applied on top of a variant's default window descriptor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::window::{Compression, WindowDescriptor};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read or write config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unknown compression code 0x{0:02x}")]
    UnknownCompression(u8),
}

/// Scan settings applied on top of the device defaults.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Resolution in dpi, applied to both axes.
    pub resolution: Option<u16>,
    /// Paper width in inches.
    pub paper_width: Option<f64>,
    /// Paper height in inches.
    pub paper_height: Option<f64>,
    /// JPEG quality (or the K parameter for MR compression).
    pub quality: Option<u8>,
    /// Raw compression code; 0x81 selects JPEG.
    pub compression: Option<u8>,
    /// Pages per SET WINDOW / SCAN cycle; 255 scans continuously.
    pub block_size: Option<u8>,
    /// Scan both sides of each page.
    pub duplex: Option<bool>,
    /// Scan from the flatbed instead of the feeder.
    pub flatbed: Option<bool>,
}

impl ScanConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ScanConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply the configured overrides to a window descriptor.
    pub fn apply(&self, window: &mut WindowDescriptor) -> Result<(), ConfigError> {
        if let Some(dpi) = self.resolution {
            window.xres = dpi;
            window.yres = dpi;
        }
        if self.paper_width.is_some() || self.paper_height.is_some() {
            let width = self.paper_width.unwrap_or(8.5);
            let height = self.paper_height.unwrap_or(11.0);
            window.set_page_size_inches(width, height);
        }
        if let Some(quality) = self.quality {
            window.compression_argument = quality;
        }
        if let Some(code) = self.compression {
            window.compression =
                Compression::from_raw(code).ok_or(ConfigError::UnknownCompression(code))?;
        }
        if let Some(block) = self.block_size {
            window.pages_to_scan = block;
        }
        if let Some(flatbed) = self.flatbed {
            window.flatbed = flatbed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_overrides() {
        let config = ScanConfig {
            resolution: Some(600),
            paper_width: Some(8.27),
            paper_height: Some(11.69),
            quality: Some(90),
            compression: Some(0),
            block_size: Some(10),
            duplex: Some(true),
            flatbed: Some(true),
        };
        let mut window = WindowDescriptor::usb_defaults();
        config.apply(&mut window).unwrap();

        assert_eq!(window.xres, 600);
        assert_eq!(window.yres, 600);
        assert_eq!(window.width, 9924);
        assert_eq!(window.compression, Compression::None);
        assert_eq!(window.compression_argument, 90);
        assert_eq!(window.pages_to_scan, 10);
        assert!(window.flatbed);
    }

    #[test]
    fn test_empty_config_changes_nothing() {
        let mut window = WindowDescriptor::sg_defaults();
        let before = window.clone();
        ScanConfig::default().apply(&mut window).unwrap();
        assert_eq!(window, before);
    }

    #[test]
    fn test_unknown_compression_is_rejected() {
        let config = ScanConfig {
            compression: Some(0x42),
            ..Default::default()
        };
        let mut window = WindowDescriptor::usb_defaults();
        assert!(matches!(
            config.apply(&mut window),
            Err(ConfigError::UnknownCompression(0x42))
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ScanConfig {
            resolution: Some(300),
            duplex: Some(true),
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: ScanConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.resolution, Some(300));
        assert_eq!(parsed.duplex, Some(true));
        assert_eq!(parsed.quality, None);
    }
}
