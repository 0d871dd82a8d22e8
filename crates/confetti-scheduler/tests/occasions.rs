//! End-to-end occasion scenarios driven through the daily tick.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{NaiveDate, TimeZone};
use common::*;
use confetti_core::{BirthdayStore, HolidaySet, OffsetMode, Severity, Stage};
use confetti_scheduler::{FiredStage, OccasionScheduler};
use pretty_assertions::assert_eq;
use tokio::sync::watch;

fn christmas_holiday() -> HolidaySet {
    [date(2025, 12, 25)].into_iter().collect()
}

fn stages(report: &confetti_scheduler::TickReport) -> Vec<Stage> {
    report.fired.iter().map(|f| f.stage).collect()
}

#[tokio::test(start_paused = true)]
async fn test_christmas_birthday_full_cycle() {
    let harness = Harness::with_config(date(2025, 12, 17), config(), christmas_holiday());
    harness.add_birthday("CELEB", 25, 12).await;
    harness.set_accounts(vec![human("CELEB", "Celebrant"), human("U1", "Sam"), human("U2", "Kim")]);
    let scheduler = OccasionScheduler::new(harness.services.clone());

    // Seven days before the working day preceding the holiday.
    let report = scheduler.tick(date(2025, 12, 17)).await;
    assert_eq!(
        report.fired,
        vec![FiredStage {
            person_id: "CELEB".to_string(),
            stage: Stage::Collection,
            celebration: date(2025, 12, 24),
        }]
    );
    assert_eq!(harness.messenger.forms().len(), 2);

    // A second run the same day sends nothing new.
    let again = scheduler.tick(date(2025, 12, 17)).await;
    assert!(again.fired.is_empty());
    assert!(again.failures.is_empty());
    assert_eq!(harness.messenger.forms().len(), 2);

    harness.add_message("CELEB", "U1", "Sam", "Merry birthday!").await;

    let leadership = scheduler.tick(date(2025, 12, 19)).await;
    assert_eq!(stages(&leadership), vec![Stage::LeadershipDigest]);
    let reminder = ":calendar: Reminder: <@CELEB>'s birthday will be celebrated on Wednesday, 24 December 2025.";
    assert_eq!(harness.messenger.posts_to(MANAGEMENT_CHANNEL)[0].content.text, reminder);
    assert_eq!(harness.messenger.posts_to(HR_CHANNEL)[0].content.text, reminder);

    let count = scheduler.tick(date(2025, 12, 23)).await;
    assert_eq!(stages(&count), vec![Stage::CountDigest]);
    assert!(
        harness
            .notifier
            .with_severity(Severity::Info)
            .contains(&"1 messages collected for upcoming birthday of <@CELEB>".to_string())
    );

    let celebration = scheduler.tick(date(2025, 12, 24)).await;
    assert_eq!(stages(&celebration), vec![Stage::Celebration]);
    let thread = harness.messenger.posts_to(BIRTHDAY_CHANNEL);
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[1].content.text, "*Sam says:*\nMerry birthday!");

    // The nominal date itself is a holiday and fires nothing.
    let holiday = scheduler.tick(date(2025, 12, 25)).await;
    assert!(holiday.fired.is_empty());
    assert_eq!(harness.mark_sent_calls(), 1);
}

#[tokio::test]
async fn test_zero_contributions_post_single_greeting() {
    let harness = Harness::new(date(2025, 6, 10));
    harness.add_birthday("CELEB", 10, 6).await;

    let report = OccasionScheduler::new(harness.services.clone())
        .tick(date(2025, 6, 10))
        .await;

    assert_eq!(stages(&report), vec![Stage::Celebration]);
    let posts = harness.messenger.posts();
    assert_eq!(posts.len(), 1);
    assert!(posts.iter().all(|p| p.thread.is_none()));
    assert_eq!(harness.mark_sent_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_collection_straddles_new_year() {
    let harness = Harness::new(date(2025, 12, 26));
    // 2 January 2026 is a Friday.
    harness.add_birthday("CELEB", 2, 1).await;
    harness.set_accounts(vec![human("U1", "Sam")]);

    let report = OccasionScheduler::new(harness.services.clone())
        .tick(date(2025, 12, 26))
        .await;

    assert_eq!(
        report.fired,
        vec![FiredStage {
            person_id: "CELEB".to_string(),
            stage: Stage::Collection,
            celebration: date(2026, 1, 2),
        }]
    );
    let record = harness.store.get_birthday("CELEB").await.unwrap().unwrap();
    assert_eq!(record.last_notification_date, Some(date(2025, 12, 26)));
}

#[tokio::test(start_paused = true)]
async fn test_working_day_offsets() {
    let mut cfg = config();
    cfg.offset_mode = OffsetMode::WorkingDays;
    let harness = Harness::with_config(date(2025, 12, 15), cfg, christmas_holiday());
    harness.add_birthday("CELEB", 25, 12).await;
    harness.set_accounts(vec![human("U1", "Sam")]);
    let scheduler = OccasionScheduler::new(harness.services.clone());

    let expected: [(NaiveDate, Vec<Stage>); 5] = [
        (date(2025, 12, 15), vec![Stage::Collection]),
        (date(2025, 12, 16), vec![]),
        (date(2025, 12, 17), vec![Stage::LeadershipDigest]),
        (date(2025, 12, 23), vec![Stage::CountDigest]),
        (date(2025, 12, 24), vec![Stage::Celebration]),
    ];
    for (day, want) in expected {
        let report = scheduler.tick(day).await;
        assert_eq!(stages(&report), want, "on {}", day);
    }

    let form = &harness.messenger.forms()[0];
    assert_eq!(
        form.content.heading.as_deref(),
        Some("Hey! :birthday: *<@CELEB>* has a birthday coming up in 7 working days!")
    );
}

#[tokio::test]
async fn test_unknown_birthdays_are_skipped() {
    let harness = Harness::new(date(2025, 6, 10));
    harness.store.ensure_placeholder("GHOST").await.unwrap();
    harness.add_birthday("CELEB", 10, 6).await;

    let report = OccasionScheduler::new(harness.services.clone())
        .tick(date(2025, 6, 10))
        .await;

    assert_eq!(report.evaluated, 1);
    assert_eq!(report.skipped_unknown, 1);
    assert_eq!(report.fired.len(), 1);
    assert_eq!(report.fired[0].person_id, "CELEB");
}

#[tokio::test]
async fn test_store_failure_reported() {
    let harness = Harness::new(date(2025, 6, 10));
    harness.add_birthday("CELEB", 10, 6).await;
    harness.store.fail_listing.store(true, Ordering::SeqCst);

    let report = OccasionScheduler::new(harness.services.clone())
        .tick(date(2025, 6, 10))
        .await;

    assert!(report.error.is_some());
    assert!(report.fired.is_empty());
    assert!(harness.messenger.posts().is_empty());
    let errors = harness.notifier.with_severity(Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Birthday tick failed:"));
}

#[tokio::test]
async fn test_one_failing_celebrant_does_not_block_others() {
    let mut cfg = config();
    cfg.stages.leadership_digest = 3;
    let harness = Harness::with_config(date(2025, 6, 10), cfg, HolidaySet::new());
    harness.add_birthday("A", 10, 6).await;
    // B's leadership digest falls on the same day as A's celebration.
    harness.add_birthday("B", 13, 6).await;
    harness.messenger.fail_target(MANAGEMENT_CHANNEL);

    let report = OccasionScheduler::new(harness.services.clone())
        .tick(date(2025, 6, 10))
        .await;

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].person_id, "B");
    assert_eq!(report.failures[0].stage, Stage::LeadershipDigest);
    assert_eq!(stages(&report), vec![Stage::Celebration]);
    // HR still received the reminder.
    assert_eq!(harness.messenger.posts_to(HR_CHANNEL).len(), 1);
    let errors = harness.notifier.with_severity(Severity::Error);
    assert!(errors[0].starts_with("Error sending leadership_digest for <@B>"));
}

#[tokio::test]
async fn test_holiday_file_reloaded_each_tick() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("holidays.json");
    // Tuesday 10 June becomes a holiday, so Monday 9 June is the celebration.
    std::fs::write(&path, r#"["2025-06-10"]"#).unwrap();

    let harness = Harness::new(date(2025, 6, 9));
    harness.add_birthday("CELEB", 10, 6).await;
    let services = harness.services.clone().with_holiday_file(&path);
    let scheduler = OccasionScheduler::new(services.clone());

    let report = scheduler.tick(date(2025, 6, 9)).await;
    assert_eq!(stages(&report), vec![Stage::Celebration]);
    assert!(harness.notifier.with_severity(Severity::Warning).is_empty());

    std::fs::write(&path, "not json").unwrap();
    let report = scheduler.tick(date(2025, 6, 16)).await;
    assert!(report.error.is_none());
    assert!(services.holidays().await.contains(date(2025, 6, 10)));

    let warnings = harness.notifier.with_severity(Severity::Warning);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("Could not reload holidays"));
}

#[tokio::test(start_paused = true)]
async fn test_run_loop_ticks_at_trigger_time() {
    let harness = Harness::new(date(2025, 12, 17));
    harness.add_birthday("CELEB", 24, 12).await;
    harness.set_accounts(vec![human("U1", "Sam")]);
    harness
        .clock
        .set(chrono::Utc.with_ymd_and_hms(2025, 12, 17, 8, 59, 0).unwrap());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = OccasionScheduler::new(harness.services.clone());
    let handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(harness.messenger.forms().len(), 1);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
    assert_eq!(harness.messenger.forms().len(), 1);
}
