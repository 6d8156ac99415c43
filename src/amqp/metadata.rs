use crate::delivery::InboundMessage;
use lapin::message::Delivery;
use lapin::types::{AMQPValue, FieldTable, ShortString};

/// Set by quorum queues on every redelivery
pub const DELIVERY_COUNT_HEADER: &str = "x-delivery-count";
/// Appended by the broker each time a message is dead-lettered
pub const DEATH_HEADER: &str = "x-death";
/// Stamped by the listener on every copy it republishes to the queue
pub const REQUEUE_COUNT_HEADER: &str = "x-redelivery-count";

/// How many times this message has already been delivered and handed back.
///
/// `x-redelivery-count` carries the requeues done by republishing. On top of
/// that comes what the broker knows about the current copy: `x-delivery-count`,
/// else the summed `count` of all `x-death` entries, else 1 if only the
/// `redelivered` flag is set.
pub fn redelivery_count(headers: Option<&FieldTable>, redelivered: bool) -> u32 {
    let mut requeued = None;
    let mut delivery_count = None;
    let mut death_count = None;
    if let Some(headers) = headers {
        for (key, value) in headers.inner() {
            match key.as_str() {
                REQUEUE_COUNT_HEADER => requeued = as_u64(value),
                DELIVERY_COUNT_HEADER => delivery_count = as_u64(value),
                DEATH_HEADER => death_count = sum_death_counts(value),
                _ => {}
            }
        }
    }
    let broker = delivery_count
        .or(death_count)
        .unwrap_or(u64::from(redelivered));
    let total = requeued.unwrap_or(0).saturating_add(broker);
    u32::try_from(total).unwrap_or(u32::MAX)
}

/// Headers for the republished copy of a message seen `redelivery_count`
/// times. Broker counters are folded into `x-redelivery-count` and dropped,
/// since the copy starts with fresh ones.
pub fn requeue_headers(headers: Option<&FieldTable>, redelivery_count: u32) -> FieldTable {
    let mut next = FieldTable::default();
    if let Some(headers) = headers {
        for (key, value) in headers.inner() {
            match key.as_str() {
                REQUEUE_COUNT_HEADER | DELIVERY_COUNT_HEADER | DEATH_HEADER => {}
                _ => next.insert(key.clone(), value.clone()),
            }
        }
    }
    next.insert(
        ShortString::from(REQUEUE_COUNT_HEADER),
        AMQPValue::LongLongInt(i64::from(redelivery_count) + 1),
    );
    next
}

fn sum_death_counts(value: &AMQPValue) -> Option<u64> {
    let AMQPValue::FieldArray(entries) = value else {
        return None;
    };
    let mut total = 0u64;
    let mut seen = false;
    for entry in entries.as_slice() {
        if let AMQPValue::FieldTable(table) = entry {
            if let Some(count) = table
                .inner()
                .iter()
                .find(|(k, _)| k.as_str() == "count")
                .and_then(|(_, v)| as_u64(v))
            {
                total = total.saturating_add(count);
                seen = true;
            }
        }
    }
    seen.then_some(total)
}

fn as_u64(value: &AMQPValue) -> Option<u64> {
    match value {
        AMQPValue::ShortShortUInt(v) => Some(u64::from(*v)),
        AMQPValue::ShortUInt(v) => Some(u64::from(*v)),
        AMQPValue::LongUInt(v) => Some(u64::from(*v)),
        AMQPValue::ShortShortInt(v) => u64::try_from(*v).ok(),
        AMQPValue::ShortInt(v) => u64::try_from(*v).ok(),
        AMQPValue::LongInt(v) => u64::try_from(*v).ok(),
        AMQPValue::LongLongInt(v) => u64::try_from(*v).ok(),
        _ => None,
    }
}

impl From<&Delivery> for InboundMessage {
    fn from(delivery: &Delivery) -> Self {
        InboundMessage::new(delivery.data.clone())
            .with_delivery_tag(delivery.delivery_tag)
            .with_redelivery_count(redelivery_count(
                delivery.properties.headers().as_ref(),
                delivery.redelivered,
            ))
    }
}
