//! Awaiting a live event on a subscription.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{RendezvousError, RendezvousResult};
use crate::events::{CorrelationToken, LogRecord};
use crate::rendezvous::subscription::Subscription;

/// Wait for the first `event` record accepted by `predicate`.
///
/// The subscription is consumed and released on every exit path,
/// including when the returned future is dropped.
pub async fn await_event<P>(
    subscription: Subscription,
    event: &str,
    predicate: P,
    deadline: Duration,
) -> RendezvousResult<LogRecord>
where
    P: Fn(&LogRecord) -> bool,
{
    await_event_until(subscription, event, predicate, deadline, std::future::pending()).await
}

/// As [`await_event`], failing with `Cancelled` once `cancel` completes.
pub async fn await_event_until<P, F>(
    mut subscription: Subscription,
    event: &str,
    predicate: P,
    deadline: Duration,
    cancel: F,
) -> RendezvousResult<LogRecord>
where
    P: Fn(&LogRecord) -> bool,
    F: Future<Output = ()>,
{
    let result = tokio::select! {
        found = timeout(deadline, next_match(&mut subscription, event, &predicate)) => match found {
            Ok(found) => found,
            Err(_) => Err(RendezvousError::Timeout {
                stage: "event",
                elapsed: deadline,
            }),
        },
        _ = cancel => Err(RendezvousError::Cancelled),
    };

    subscription.release();
    match &result {
        Ok(record) => tracing::debug!(
            subscription = subscription.id(),
            event = %record.event,
            block = ?record.block_number,
            "Awaited event observed"
        ),
        Err(e) => tracing::debug!(subscription = subscription.id(), event, error = %e, "Event wait ended"),
    }
    result
}

async fn next_match<P>(subscription: &mut Subscription, event: &str, predicate: &P) -> RendezvousResult<LogRecord>
where
    P: Fn(&LogRecord) -> bool,
{
    loop {
        let observed = subscription
            .recv()
            .await
            .ok_or(RendezvousError::SubscriptionClosed)?;
        if observed.record.event == event && predicate(&observed.record) {
            return Ok(observed.record);
        }
    }
}

/// Predicate accepting any record.
pub fn any_record(_: &LogRecord) -> bool {
    true
}

/// Predicate accepting records whose `field` carries `token`.
pub fn token_matches(field: impl Into<String>, token: CorrelationToken) -> impl Fn(&LogRecord) -> bool {
    let field = field.into();
    move |record| record.token(&field).map_or(false, |found| found == token)
}
