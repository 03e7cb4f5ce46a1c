//! Metrics collection and exposition.
//!
//! # Metrics
//! - `rendezvous_submissions_total` (counter): submissions by outcome
//! - `rendezvous_confirmations_total` (counter): confirmation waits by outcome
//! - `rendezvous_confirmation_seconds` (histogram): time from submission to confirmation
//! - `rendezvous_fulfillments_total` (counter): fulfillment waits by outcome
//! - `rendezvous_rounds_total` (counter): protocol rounds by terminal state
//! - `rendezvous_active_subscriptions` (gauge): live hub subscriptions
//! - `rendezvous_armed_tickets` (gauge): correlation tickets awaiting a token
//! - `rendezvous_feed_records_total` (counter): decoded records published by the feed
//! - `rendezvous_feed_block` (gauge): last block scanned by the feed
//!
//! Recording is a no-op until [`init_metrics`] installs an exporter.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| e.to_string())?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_submission(outcome: &'static str) {
    counter!("rendezvous_submissions_total", "outcome" => outcome).increment(1);
}

pub fn record_confirmation(outcome: &'static str, elapsed: Duration) {
    counter!("rendezvous_confirmations_total", "outcome" => outcome).increment(1);
    if outcome == "confirmed" {
        histogram!("rendezvous_confirmation_seconds").record(elapsed.as_secs_f64());
    }
}

pub fn record_fulfillment(outcome: &'static str) {
    counter!("rendezvous_fulfillments_total", "outcome" => outcome).increment(1);
}

pub fn record_round(state: &'static str) {
    counter!("rendezvous_rounds_total", "state" => state).increment(1);
}

pub fn set_active_subscriptions(count: usize) {
    gauge!("rendezvous_active_subscriptions").set(count as f64);
}

pub fn set_armed_tickets(count: usize) {
    gauge!("rendezvous_armed_tickets").set(count as f64);
}

pub fn record_published(count: usize) {
    counter!("rendezvous_feed_records_total").increment(count as u64);
}

pub fn set_feed_block(block: u64) {
    gauge!("rendezvous_feed_block").set(block as f64);
}
