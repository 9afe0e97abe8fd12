//! Unified error types for SubTrack.

use thiserror::Error;

/// Result type alias using SubTrackError.
pub type Result<T> = std::result::Result<T, SubTrackError>;

#[derive(Error, Debug)]
pub enum SubTrackError {
    // Calendar errors
    #[error("Lunar conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    // Store errors
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    // Channel errors
    #[error("Channel error: {0}")]
    Channel(String),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),
}

impl SubTrackError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Why a solar/lunar date could not be converted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("year {year} is outside the supported range 1900-2100")]
    OutOfRange { year: i32 },

    #[error("invalid solar date {year}-{month}-{day}")]
    InvalidSolarDate { year: i32, month: u32, day: u32 },

    #[error("invalid lunar date {year}/{month}/{day}")]
    InvalidLunarDate { year: i32, month: u32, day: u32 },

    #[error("lunar year {year} has no leap month {month}")]
    NoSuchLeapMonth { year: i32, month: u32 },

    #[error("lunar {year}/{month} has only {max} days, got {day}")]
    DayOverflow { year: i32, month: u32, day: u32, max: u32 },
}
