// ============================================================================
// Redelivery Integration Tests
// ============================================================================
//
// Replays the broker side of a requeue loop: each Requeued report is turned
// into the headers of the republished copy, which is fed back through
// redelivery_count and the controller. A classic queue sets no counters of
// its own, so the count has to come from x-redelivery-count.
//
// ============================================================================

mod test_utils;

use lapin::types::FieldTable;
use std::time::Duration;
use submission_listener::amqp::{redelivery_count, requeue_headers};
use submission_listener::delivery::{DeliveryReport, DeliveryState, Disposition, InboundMessage};
use test_utils::*;

const MAX_REDELIVERIES: u32 = 10;

/// Deliver until the message stops being requeued, at most `limit` times
async fn deliver_until_settled<F>(
    controller: &submission_listener::delivery::DeliveryController<F>,
    limit: usize,
) -> (Vec<u32>, DeliveryReport)
where
    F: submission_listener::gateway::EventForwarder,
{
    let payload = to_bytes(&pending_event());
    let mut headers: Option<FieldTable> = None;
    let mut counts = Vec::new();

    for _ in 0..limit {
        // Republished copies arrive without the redelivered flag
        let count = redelivery_count(headers.as_ref(), false);
        counts.push(count);

        let message = InboundMessage::new(payload.clone()).with_redelivery_count(count);
        let report = controller.process(&message).await;
        if report.disposition != Disposition::Requeue {
            return (counts, report);
        }
        headers = Some(requeue_headers(headers.as_ref(), count));
    }
    panic!("still requeued after {} deliveries", limit);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_message_exhausts_after_redelivery_limit() {
    let mut retry = retry_config(5);
    retry.max_redeliveries = MAX_REDELIVERIES;
    let controller = controller(FailingForwarder::throttled(Duration::from_secs(60)), retry);

    let (counts, report) = deliver_until_settled(&controller, 50).await;

    assert_eq!(report.state, DeliveryState::Exhausted);
    assert_eq!(report.disposition, Disposition::DeadLetter);
    assert_eq!(counts, (0..=MAX_REDELIVERIES).collect::<Vec<_>>());
    // One gateway call per delivery: the 60s hint is above the ceiling
    assert_eq!(controller.forwarder().calls(), MAX_REDELIVERIES + 1);
    assert!(report.cause.as_deref().unwrap_or_default().contains("redelivered 10 times"));
}

#[tokio::test(start_paused = true)]
async fn test_recovered_gateway_delivers_requeued_copy() {
    let mut retry = retry_config(5);
    retry.in_process_ceiling_ms = 300;
    let controller = controller(
        ScriptedForwarder::new(std::iter::repeat_with(server_error).take(6)),
        retry,
    );

    let (counts, report) = deliver_until_settled(&controller, 10).await;

    // 3 calls per delivery before the 400ms wait exceeds the ceiling
    assert_eq!(counts, vec![0, 1, 2]);
    assert_eq!(report.state, DeliveryState::Delivered);
    assert_eq!(controller.forwarder().calls(), 7);
}
