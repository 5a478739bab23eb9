//! Placeholder notification transport
//!
//! Mail delivery is left to the host: it injects a `Transport` through
//! `configure_with`. The default refuses every send so a policy asking for
//! notifications still captures and persists.

use crashguard_core::error::TransportError;
use crashguard_core::kwarn;
use crashguard_core::message::{InteractiveMessage, SilentMessage};
use crashguard_core::traits::{InteractiveOutcome, Transport};

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTransport;

impl Transport for DisabledTransport {
    fn send_silent(&self, message: &SilentMessage<'_>) -> Result<(), TransportError> {
        kwarn!(
            "no mail transport configured, not sending '{}' to {}",
            message.subject,
            message.recipient
        );
        Err(TransportError::Unavailable)
    }

    fn send_interactive(&self, message: &InteractiveMessage<'_>) -> InteractiveOutcome {
        kwarn!("no mail transport configured, not composing '{}'", message.subject);
        InteractiveOutcome::Cancelled
    }
}
