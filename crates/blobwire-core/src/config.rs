//! Transfer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::pump::PumpConfig;
use crate::{
    DEFAULT_CHUNK_SIZE, DEFAULT_IMAGE_HIGH_WATER_MARK, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_VIDEO_HIGH_WATER_MARK,
};

/// Sender-side transfer parameters, as stored in configuration files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Chunk payload size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Backpressure mark for image frames, in bytes
    #[serde(default = "default_image_high_water_mark")]
    pub image_high_water_mark: usize,
    /// Backpressure mark for video frames, in bytes
    #[serde(default = "default_video_high_water_mark")]
    pub video_high_water_mark: usize,
    /// Buffered-amount poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_image_high_water_mark() -> usize {
    DEFAULT_IMAGE_HIGH_WATER_MARK
}

fn default_video_high_water_mark() -> usize {
    DEFAULT_VIDEO_HIGH_WATER_MARK
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            image_high_water_mark: default_image_high_water_mark(),
            video_high_water_mark: default_video_high_water_mark(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl TransferConfig {
    /// Validate the parameters
    ///
    /// # Errors
    ///
    /// Returns the first invalid parameter as `Error::Config`.
    pub fn validate(&self) -> Result<()> {
        self.to_pump_config().validate().map_err(Into::into)
    }

    /// Validated pump parameters
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate).
    pub fn pump_config(&self) -> std::result::Result<PumpConfig, ConfigError> {
        let config = self.to_pump_config();
        config.validate()?;
        Ok(config)
    }

    fn to_pump_config(&self) -> PumpConfig {
        PumpConfig {
            chunk_size: self.chunk_size,
            image_high_water_mark: self.image_high_water_mark,
            video_high_water_mark: self.video_high_water_mark,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
