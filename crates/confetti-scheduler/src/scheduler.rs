//! Daily occasion scheduler.

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, TimeZone};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use confetti_core::{
    BirthDate, BirthdayRecord, ContributionKind, EngineConfig, HolidaySet, MessageContent,
    OffsetMode, Severity, Stage, mention, previous_working_day, subtract_working_days,
};

use crate::{
    CelebrationPublisher, CollectionFanout, EngineError, FanoutOutcome, PublishOutcome, Services,
};

/// The working day on which `birth_date` is celebrated in `year`.
///
/// `None` for the unknown sentinel.
pub fn celebration_date(
    birth_date: &BirthDate,
    year: i32,
    holidays: &HolidaySet,
) -> Option<NaiveDate> {
    birth_date
        .occurrence_in(year)
        .map(|nominal| previous_working_day(nominal, holidays))
}

/// Stages that fire on `today` for a celebration on `celebration`.
pub fn stages_due(
    config: &EngineConfig,
    celebration: NaiveDate,
    today: NaiveDate,
    holidays: &HolidaySet,
) -> Vec<Stage> {
    match config.offset_mode {
        OffsetMode::CalendarDays => config
            .stages
            .stages_at((celebration - today).num_days()),
        OffsetMode::WorkingDays => config
            .stages
            .iter()
            .filter(|(_, n)| subtract_working_days(celebration, *n, holidays) == today)
            .map(|(stage, _)| stage)
            .collect(),
    }
}

/// The first trigger instant strictly after `now`, in `now`'s time zone.
///
/// A trigger time skipped by a daylight-saving jump fires an hour later on
/// that day; a repeated one fires on its first occurrence.
pub fn next_trigger_after<Z: TimeZone>(now: &DateTime<Z>, trigger: NaiveTime) -> DateTime<Z> {
    let zone = now.timezone();
    let at = |date: NaiveDate| {
        let local = date.and_time(trigger);
        local.and_local_timezone(zone.clone()).earliest().or_else(|| {
            (local + TimeDelta::hours(1))
                .and_local_timezone(zone.clone())
                .earliest()
        })
    };

    let today = now.date_naive();
    match at(today) {
        Some(candidate) if candidate > *now => candidate,
        _ => today
            .succ_opt()
            .and_then(at)
            .unwrap_or_else(|| now.clone() + TimeDelta::days(1)),
    }
}

/// A stage that ran for a celebrant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredStage {
    pub person_id: String,
    pub stage: Stage,
    pub celebration: NaiveDate,
}

/// A stage that failed for a celebrant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub person_id: String,
    pub stage: Stage,
    pub error: String,
}

/// Summary of one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records with a known birth date.
    pub evaluated: usize,
    /// Sentinel records, which never fire.
    pub skipped_unknown: usize,
    pub fired: Vec<FiredStage>,
    pub failures: Vec<StageFailure>,
    /// The record list itself could not be read.
    pub error: Option<String>,
}

/// Drives every celebrant through their occasion stages once a day.
pub struct OccasionScheduler {
    services: Services,
    fanout: CollectionFanout,
    publisher: CelebrationPublisher,
}

impl OccasionScheduler {
    pub fn new(services: Services) -> Self {
        Self {
            fanout: CollectionFanout::new(services.clone()),
            publisher: CelebrationPublisher::new(services.clone()),
            services,
        }
    }

    /// Run the scheduler loop until shutdown.
    ///
    /// Sleeps until the next trigger instant in the configured time zone, ticks,
    /// and repeats. A tick in progress always completes.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("occasion scheduler starting");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let now = self.services.clock.now();
            let next = next_trigger_after(&now, self.services.config.trigger_time);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next = %next, "next tick scheduled");

            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("scheduler received shutdown signal");
                        break;
                    }
                    continue;
                }
                _ = sleep(wait) => {}
            }

            self.tick(next.date_naive()).await;
        }

        info!("occasion scheduler shut down gracefully");
    }

    /// Evaluate every celebrant for `today`. Never fails.
    #[instrument(skip(self))]
    pub async fn tick(&self, today: NaiveDate) -> TickReport {
        self.services.refresh_holidays().await;
        let holidays = self.services.holidays().await;
        let mut report = TickReport::default();

        let records = match self.services.store.list_birthdays().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "failed to list birthdays");
                self.services
                    .notifier
                    .notify(Severity::Error, &format!("Birthday tick failed: {}", e))
                    .await;
                report.error = Some(e.to_string());
                return report;
            }
        };

        for record in &records {
            if !record.birth_date.is_known() {
                report.skipped_unknown += 1;
                continue;
            }
            report.evaluated += 1;

            // Next year's occurrence covers stages that straddle New Year.
            for year in [today.year(), today.year() + 1] {
                let Some(celebration) = celebration_date(&record.birth_date, year, &holidays)
                else {
                    continue;
                };
                for stage in stages_due(&self.services.config, celebration, today, &holidays) {
                    self.run_stage(record, stage, celebration, today, &mut report)
                        .await;
                }
            }
        }

        info!(
            evaluated = report.evaluated,
            fired = report.fired.len(),
            failures = report.failures.len(),
            "tick complete"
        );
        report
    }

    async fn run_stage(
        &self,
        record: &BirthdayRecord,
        stage: Stage,
        celebration: NaiveDate,
        today: NaiveDate,
        report: &mut TickReport,
    ) {
        let person_id = record.person_id.as_str();
        debug!(person = %person_id, %stage, %celebration, "stage due");

        let result: Result<bool, String> = match stage {
            Stage::Collection => {
                if record.last_notification_date == Some(today) {
                    debug!(person = %person_id, "collection already sent today");
                    Ok(false)
                } else {
                    match self.fanout.trigger_collection_on(person_id, today).await {
                        FanoutOutcome::Delivered(_) => Ok(true),
                        FanoutOutcome::AlreadySent => Ok(false),
                        FanoutOutcome::Failed(e) => Err(e),
                    }
                }
            }
            Stage::Celebration => match self.publisher.publish(person_id).await {
                PublishOutcome::Default(_) | PublishOutcome::Thread(_) => Ok(true),
                PublishOutcome::Failed(e) => Err(e),
            },
            Stage::LeadershipDigest | Stage::CountDigest => {
                let digest = if stage == Stage::LeadershipDigest {
                    self.leadership_digest(person_id, celebration).await
                } else {
                    self.count_digest(person_id).await
                };
                match digest {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        error!(person = %person_id, %stage, error = %e, "digest failed");
                        self.services
                            .notifier
                            .notify(
                                Severity::Error,
                                &format!("Error sending {} for {}: {}", stage, mention(person_id), e),
                            )
                            .await;
                        Err(e.to_string())
                    }
                }
            }
        };

        match result {
            Ok(true) => report.fired.push(FiredStage {
                person_id: person_id.to_string(),
                stage,
                celebration,
            }),
            Ok(false) => {}
            Err(error) => report.failures.push(StageFailure {
                person_id: person_id.to_string(),
                stage,
                error,
            }),
        }
    }

    /// Remind management and HR of the celebration date. Each channel is
    /// attempted even if the other fails.
    async fn leadership_digest(
        &self,
        person_id: &str,
        celebration: NaiveDate,
    ) -> Result<(), EngineError> {
        let config = &self.services.config;
        let content = MessageContent::text(format!(
            ":calendar: Reminder: {}'s birthday will be celebrated on {}.",
            mention(person_id),
            celebration.format("%A, %-d %B %Y")
        ));

        let mut first_error = None;
        for channel in [&config.management_channel, &config.hr_channel] {
            if let Err(e) = self
                .services
                .messaging
                .post_message(channel, &content, None)
                .await
            {
                warn!(channel = %channel, error = %e, "failed to post leadership digest");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Tell admins how many messages have been collected so far.
    async fn count_digest(&self, person_id: &str) -> Result<(), EngineError> {
        let count = self
            .services
            .store
            .count_unsent(person_id, ContributionKind::Message)
            .await?;
        self.services
            .notifier
            .notify(
                Severity::Info,
                &format!(
                    "{} messages collected for upcoming birthday of {}",
                    count,
                    mention(person_id)
                ),
            )
            .await;
        Ok(())
    }
}
