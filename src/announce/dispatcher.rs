use crate::announce::channels::ChannelSet;
use crate::storage::Database;

/// One dispatch tick: atomically pop the announcement with the soonest
/// scheduled time and post it.
///
/// At most one announcement leaves the queue per tick: the dispatch
/// interval, not queue depth, bounds posting throughput, which keeps the
/// hub under the social platforms' rate limits. The pop deletes the row in
/// the same statement, so a crash mid-tick can lose one send but never
/// duplicate one.
///
/// Never returns an error: an empty queue is a no-op, and a failed send is
/// logged and dropped. Retrying here would risk double posts, because the
/// article's announcement counter was already incremented when the
/// announcement was queued.
pub async fn dispatch_tick(db: &Database, channels: &ChannelSet) {
    let announcement = match db.pop_next_announcement().await {
        Ok(Some(announcement)) => announcement,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(error = %e, "Failed to pop the announcement queue");
            return;
        }
    };

    let Some(channel) = channels.get(announcement.kind) else {
        tracing::warn!(
            kind = %announcement.kind,
            message = %announcement.message,
            "No client configured for channel, announcement dropped"
        );
        return;
    };

    match channel
        .post(
            &announcement.message,
            announcement.content_warning.as_deref(),
        )
        .await
    {
        Ok(()) => {
            tracing::info!(
                kind = %announcement.kind,
                id = announcement.id,
                "Announcement dispatched"
            );
        }
        Err(e) => {
            // The message text is logged so an operator can repost by hand
            tracing::warn!(
                kind = %announcement.kind,
                id = announcement.id,
                error = %e,
                message = %announcement.message,
                "Announcement dispatch failed, dropped without retry"
            );
        }
    }
}
