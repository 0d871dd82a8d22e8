//! Birthday notification engine for Confetti.
//!
//! This crate drives one occasion per celebrant per year:
//! - [`OccasionScheduler`]: daily tick mapping each celebrant's distance to
//!   their celebration date onto notification stages
//! - [`CollectionFanout`]: batched, paced delivery of the collection form
//! - [`SubmissionIntake`]: validates and stores contributor submissions
//! - [`CelebrationPublisher`]: posts the celebration thread and marks content sent
//!
//! Every component is built from a shared [`Services`] bundle of collaborators.

mod error;
mod fanout;
mod intake;
mod publisher;
mod scheduler;
mod services;

pub use error::EngineError;
pub use fanout::{
    CollectionFanout, DESCRIPTION_PROMPTS, FanoutOutcome, FanoutReport, eligible_recipients,
};
pub use intake::{Submission, SubmissionIntake, SubmissionReceipt, confirmation_text};
pub use publisher::{CelebrationPublisher, FALLBACK_POEM, PublishOutcome, PublishReport};
pub use scheduler::{
    FiredStage, OccasionScheduler, StageFailure, TickReport, celebration_date, next_trigger_after,
    stages_due,
};
pub use services::{Services, load_holidays};
