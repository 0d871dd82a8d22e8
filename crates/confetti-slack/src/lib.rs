//! Slack adapter for Confetti.
//!
//! - [`SlackClient`]: the Web API, implementing [`confetti_core::Directory`]
//!   and [`confetti_core::Messaging`]
//! - [`SocketModeListener`]: receives collection form submissions over
//!   Socket Mode and forwards them as [`SubmissionEvent`]s
//! - [`ChannelNotifier`]: administrative notices posted to a channel

mod blocks;
mod client;
mod error;
mod notifier;
mod socket;

pub use blocks::{SUBMIT_ACTION_ID, render_blocks};
pub use client::{DEFAULT_API_URL, SlackClient};
pub use error::SocketError;
pub use notifier::ChannelNotifier;
pub use socket::{SocketModeListener, SubmissionEvent, parse_submission};
