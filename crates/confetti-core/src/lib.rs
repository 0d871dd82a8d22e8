//! Core types for Confetti.
//!
//! This crate holds everything the birthday engine and its adapters share:
//!
//! - **Calendar**: working-day rules over a [`HolidaySet`]
//! - **Types**: birthday records, contributions, accounts and message content
//! - **Traits**: the collaborator seams (directory, messaging, storage,
//!   poem generation, administrative notices, clock)
//! - **Config**: the validated [`EngineConfig`] threaded into every component

pub mod calendar;
mod clock;
mod config;
mod error;
mod traits;
mod types;

pub use calendar::{
    HolidaySet, is_non_working_day, previous_working_day, subtract_working_days,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    DEFAULT_BATCH_PAUSE, DEFAULT_BATCH_SIZE, EngineConfig, OffsetMode, Stage, StageThresholds,
    parse_time_zone,
};
pub use error::{
    BirthDateError, ConfigError, DeliveryError, GenerationError, HolidayError, StoreError,
    ValidationError,
};
pub use traits::{BirthdayStore, Directory, Messaging, Notifier, NotificationClaim, PoemGenerator};
pub use types::*;

pub use chrono_tz::Tz;
