use crate::error::{ListenerError, ListenerResult};

/// Per-message lifecycle.
///
/// ```text
/// Received -> Validating -> Forwarding -> Delivered
///                  |            |  ^ |-> Exhausted
///                  v            |__| |-> Requeued
///               Rejected      (retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliveryState {
    Received,
    Validating,
    Forwarding,
    Delivered,
    Rejected,
    Exhausted,
    Requeued,
}

/// What happens to the broker message once a terminal state is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// basic.ack
    Ack,
    /// basic.nack with requeue=false
    DeadLetter,
    /// Back onto the queue: republish with the next redelivery count, then ack
    Requeue,
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Received => "Received",
            DeliveryState::Validating => "Validating",
            DeliveryState::Forwarding => "Forwarding",
            DeliveryState::Delivered => "Delivered",
            DeliveryState::Rejected => "Rejected",
            DeliveryState::Exhausted => "Exhausted",
            DeliveryState::Requeued => "Requeued",
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.disposition().is_some()
    }

    pub fn disposition(&self) -> Option<Disposition> {
        match self {
            DeliveryState::Delivered => Some(Disposition::Ack),
            DeliveryState::Rejected | DeliveryState::Exhausted => Some(Disposition::DeadLetter),
            DeliveryState::Requeued => Some(Disposition::Requeue),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: DeliveryState) -> bool {
        use DeliveryState::*;
        matches!(
            (self, next),
            (Received, Validating)
                | (Validating, Rejected)
                | (Validating, Forwarding)
                | (Forwarding, Forwarding)
                | (Forwarding, Delivered)
                | (Forwarding, Exhausted)
                | (Forwarding, Requeued)
        )
    }

    /// Checked transition
    pub fn transition(self, next: DeliveryState) -> ListenerResult<DeliveryState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ListenerError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
