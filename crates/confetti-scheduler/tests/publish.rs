mod common;

use std::sync::atomic::Ordering;

use common::*;
use confetti_core::{BirthdayStore, ContributionKind, NewContribution, Severity};
use confetti_scheduler::{CelebrationPublisher, FALLBACK_POEM, PublishOutcome};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_no_messages_posts_default_greeting() {
    let harness = Harness::new(date(2025, 12, 24));
    harness.add_birthday("CELEB", 24, 12).await;

    let outcome = CelebrationPublisher::new(harness.services.clone())
        .publish("CELEB")
        .await;

    assert!(matches!(outcome, PublishOutcome::Default(_)));
    let posts = harness.messenger.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].target, BIRTHDAY_CHANNEL);
    assert!(posts[0].thread.is_none());
    assert!(posts[0].content.text.contains("Happy Birthday <@CELEB>!"));
    assert_eq!(harness.mark_sent_calls(), 0);
}

#[tokio::test]
async fn test_messages_threaded_in_creation_order() {
    let harness = Harness::new(date(2025, 12, 24));
    harness.add_birthday("CELEB", 24, 12).await;
    harness.add_message("CELEB", "U1", "Sam", "First!").await;
    harness.add_message("CELEB", "U2", "Kim", "Second").await;
    harness.add_message("CELEB", "U3", "Ana", "Third").await;

    let outcome = CelebrationPublisher::new(harness.services.clone())
        .publish("CELEB")
        .await;

    let PublishOutcome::Thread(report) = outcome else {
        panic!("expected a thread: {:?}", outcome);
    };
    assert_eq!(report.messages_posted, 3);
    assert_eq!(report.descriptions_posted, 0);
    assert!(!report.poem_generated);

    let posts = harness.messenger.posts();
    assert_eq!(posts[0].handle, report.root);
    let replies: Vec<String> = posts[1..]
        .iter()
        .map(|p| {
            assert_eq!(p.thread.as_ref(), Some(&report.root));
            p.content.text.clone()
        })
        .collect();
    assert_eq!(
        replies,
        vec![
            "*Sam says:*\nFirst!".to_string(),
            "*Kim says:*\nSecond".to_string(),
            "*Ana says:*\nThird".to_string(),
        ]
    );

    let stored = harness.contributions("CELEB", ContributionKind::Message);
    assert!(stored.iter().all(|c| c.sent));
    assert!(harness.poet.inputs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_descriptions_get_poem_and_digest() {
    let harness = Harness::new(date(2025, 12, 24));
    harness.add_birthday("CELEB", 24, 12).await;
    harness.add_message("CELEB", "U1", "Sam", "Happy birthday!").await;
    for (sender, name, body) in [("U1", "Sam", "Kind"), ("U2", "Kim", "Brilliant")] {
        harness
            .store
            .insert_contribution(NewContribution::description("CELEB", sender, name, body))
            .await
            .unwrap();
    }

    let outcome = CelebrationPublisher::new(harness.services.clone())
        .publish("CELEB")
        .await;

    let PublishOutcome::Thread(report) = outcome else {
        panic!("expected a thread: {:?}", outcome);
    };
    assert!(report.poem_generated);
    assert_eq!(report.descriptions_posted, 2);

    let texts: Vec<String> = harness
        .messenger
        .posts()
        .into_iter()
        .skip(1)
        .map(|p| p.content.text)
        .collect();
    assert_eq!(texts[0], "A poem about: Kind, Brilliant");
    assert_eq!(
        texts[1],
        "*Here's what your colleagues say about you:*\n\n• Kind — Sam\n• Brilliant — Kim"
    );
    assert_eq!(texts[2], "*Sam says:*\nHappy birthday!");

    assert!(
        harness
            .contributions("CELEB", ContributionKind::Description)
            .iter()
            .all(|c| c.sent)
    );
}

#[tokio::test]
async fn test_long_digest_is_sent_as_plain_text() {
    let harness = Harness::new(date(2025, 12, 24));
    harness.add_birthday("CELEB", 24, 12).await;
    harness.add_message("CELEB", "U1", "Sam", "Happy birthday!").await;
    for i in 0..40 {
        let body = format!(
            "Always the first to help out when a release goes sideways, number {}",
            i
        );
        harness
            .store
            .insert_contribution(NewContribution::description(
                "CELEB",
                &format!("U{}", i),
                &format!("Colleague {}", i),
                &body,
            ))
            .await
            .unwrap();
    }

    let outcome = CelebrationPublisher::new(harness.services.clone())
        .publish("CELEB")
        .await;

    let PublishOutcome::Thread(report) = outcome else {
        panic!("expected a thread: {:?}", outcome);
    };
    assert_eq!(report.descriptions_posted, 40);
    assert_eq!(report.messages_posted, 1);

    let digest = &harness.messenger.posts()[2].content;
    assert!(digest.text.chars().count() > 3000);
    assert!(digest.heading.is_none());
    assert!(digest.image.is_none());
    assert!(digest.form.is_none());
    assert!(digest.text.starts_with("*Here's what your colleagues say about you:*\n\n"));
    assert_eq!(digest.text.lines().filter(|l| l.starts_with("• ")).count(), 40);
}

#[tokio::test]
async fn test_poem_failure_uses_fallback() {
    let harness = Harness::new(date(2025, 12, 24));
    harness.add_birthday("CELEB", 24, 12).await;
    harness.add_message("CELEB", "U1", "Sam", "Happy birthday!").await;
    harness
        .store
        .insert_contribution(NewContribution::description("CELEB", "U1", "Sam", "Kind"))
        .await
        .unwrap();
    harness.poet.fail.store(true, Ordering::SeqCst);

    let outcome = CelebrationPublisher::new(harness.services.clone())
        .publish("CELEB")
        .await;

    let PublishOutcome::Thread(report) = outcome else {
        panic!("expected a thread: {:?}", outcome);
    };
    assert!(!report.poem_generated);
    assert_eq!(harness.messenger.posts()[1].content.text, FALLBACK_POEM);
}

#[tokio::test]
async fn test_rejected_image_falls_back_to_text() {
    let harness = Harness::new(date(2025, 12, 24));
    harness.add_birthday("CELEB", 24, 12).await;
    harness
        .store
        .insert_contribution(NewContribution::message(
            "CELEB",
            "U1",
            "Sam",
            "Cake time",
            Some("https://img.example/cake.gif".to_string()),
        ))
        .await
        .unwrap();
    harness.messenger.reject_images.store(true, Ordering::SeqCst);

    let outcome = CelebrationPublisher::new(harness.services.clone())
        .publish("CELEB")
        .await;

    let PublishOutcome::Thread(report) = outcome else {
        panic!("expected a thread: {:?}", outcome);
    };
    assert_eq!(report.image_fallbacks, 1);
    let posts = harness.messenger.posts();
    assert_eq!(posts.len(), 2);
    assert_eq!(
        posts[1].content.text,
        "*Sam says:*\nCake time\nhttps://img.example/cake.gif"
    );
    assert!(posts[1].content.image.is_none());
}

#[tokio::test]
async fn test_published_content_not_repeated() {
    let harness = Harness::new(date(2025, 12, 24));
    harness.add_birthday("CELEB", 24, 12).await;
    harness.add_message("CELEB", "U1", "Sam", "Happy birthday!").await;
    let publisher = CelebrationPublisher::new(harness.services.clone());

    assert!(matches!(publisher.publish("CELEB").await, PublishOutcome::Thread(_)));
    assert!(matches!(publisher.publish("CELEB").await, PublishOutcome::Default(_)));

    let late = harness.add_message("CELEB", "U2", "Kim", "Sorry I'm late").await;
    let unsent = harness
        .store
        .unsent_contributions("CELEB", ContributionKind::Message)
        .await
        .unwrap();
    assert_eq!(unsent.iter().map(|c| c.id).collect::<Vec<_>>(), vec![late.id]);
}

#[tokio::test]
async fn test_root_post_failure_notifies_admins() {
    let harness = Harness::new(date(2025, 12, 24));
    harness.add_birthday("CELEB", 24, 12).await;
    harness.add_message("CELEB", "U1", "Sam", "Happy birthday!").await;
    harness.messenger.fail_target(BIRTHDAY_CHANNEL);

    let outcome = CelebrationPublisher::new(harness.services.clone())
        .publish("CELEB")
        .await;

    assert!(matches!(outcome, PublishOutcome::Failed(_)));
    let errors = harness.notifier.with_severity(Severity::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Error posting birthday thread for <@CELEB>"));
    assert_eq!(harness.mark_sent_calls(), 0);
    assert!(
        harness
            .contributions("CELEB", ContributionKind::Message)
            .iter()
            .all(|c| !c.sent)
    );
}
