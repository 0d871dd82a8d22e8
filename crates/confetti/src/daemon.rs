//! Daemon command: Socket Mode intake alongside the daily scheduler.

use miette::Result;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use confetti_core::MessageContent;
use confetti_scheduler::{OccasionScheduler, Services, Submission, SubmissionIntake};
use confetti_slack::{SlackClient, SocketModeListener, SubmissionEvent};

/// Submissions buffered between the socket and the intake.
const SUBMISSION_QUEUE_SIZE: usize = 64;

/// Run until ctrl-c. A tick or submission in progress completes first.
pub async fn run(services: Services, app_token: &str) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx_clone.send(true);
    });

    let (events_tx, events_rx) = mpsc::channel(SUBMISSION_QUEUE_SIZE);
    let listener = SocketModeListener::new(SlackClient::new(app_token));
    let listener_shutdown = shutdown_rx.clone();
    let listener_handle = tokio::spawn(async move {
        if let Err(e) = listener.run(events_tx, listener_shutdown).await {
            error!(error = %e, "socket mode listener stopped, submissions will not be received");
        }
    });

    let intake_handle = tokio::spawn(consume_submissions(services.clone(), events_rx));

    info!(
        birthday_channel = %services.config.birthday_channel,
        trigger_time = %services.config.trigger_time,
        "confetti daemon started"
    );
    OccasionScheduler::new(services).run(shutdown_rx).await;

    // The listener drops its sender on shutdown, which lets the intake drain.
    if let Err(e) = listener_handle.await {
        warn!(error = %e, "socket listener task failed");
    }
    if let Err(e) = intake_handle.await {
        warn!(error = %e, "intake task failed");
    }
    drop(shutdown_tx);

    info!("confetti daemon stopped");
    Ok(())
}

async fn consume_submissions(services: Services, mut events: mpsc::Receiver<SubmissionEvent>) {
    let intake = SubmissionIntake::new(services.clone());

    while let Some(event) = events.recv().await {
        let sender_id = event.sender_id.clone();
        let submission = Submission {
            sender_display_name: display_name(&services, &event.sender_id).await,
            celebrant_id: event.celebrant_id,
            sender_id: event.sender_id,
            message: event.message,
            description: event.description,
            media_url: event.media_url,
            form: event.form,
        };

        match intake.submit(submission).await {
            Ok(receipt) => debug!(
                sender = %sender_id,
                placeholder = receipt.placeholder_created,
                "submission accepted"
            ),
            Err(e) => {
                warn!(sender = %sender_id, error = %e, "submission rejected");
                if let Some(hint) = e.user_message() {
                    tell_sender(&services, &sender_id, &hint).await;
                }
            }
        }
    }

    debug!("submission stream closed");
}

/// The contributor's display name, or their id if the directory can't say.
async fn display_name(services: &Services, user_id: &str) -> String {
    match services.directory.lookup_account(user_id).await {
        Ok(Some(account)) if !account.display_name.trim().is_empty() => account.display_name,
        Ok(_) => user_id.to_string(),
        Err(e) => {
            warn!(user = %user_id, error = %e, "failed to look up contributor");
            user_id.to_string()
        }
    }
}

async fn tell_sender(services: &Services, user_id: &str, text: &str) {
    let messaging = &services.messaging;
    let result = async {
        let channel = messaging.open_direct_channel(user_id).await?;
        messaging
            .post_message(&channel, &MessageContent::text(text), None)
            .await
    }
    .await;

    if let Err(e) = result {
        warn!(user = %user_id, error = %e, "failed to send submission hint");
    }
}
