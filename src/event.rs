//! Service event system.

use tokio::sync::broadcast;

/// Events emitted by the service.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// Service has started successfully.
    Started {
        /// Address the HTTP listener is bound to.
        address: String,
    },

    /// Service is shutting down.
    ShuttingDown,

    /// A diagnostic record was stored.
    RecordSubmitted {
        /// Record id.
        record_id: String,
    },

    /// A claim was filed.
    ClaimSubmitted {
        /// Claim id.
        claim_id: String,
    },

    /// The oracle verified a claim as payable.
    ClaimVerified {
        /// Claim id.
        claim_id: String,
        /// Computed payout.
        amount: f64,
    },

    /// A claim was rejected.
    ClaimRejected {
        /// Claim id.
        claim_id: String,
        /// Rejection reason.
        reason: String,
    },

    /// A claim was paid out.
    ClaimPaid {
        /// Claim id.
        claim_id: String,
        /// Ledger transaction reference.
        transaction_id: String,
    },

    /// A consent was granted.
    ConsentGranted {
        /// Consent id.
        consent_id: String,
    },

    /// A consent was revoked.
    ConsentRevoked {
        /// Consent id.
        consent_id: String,
    },

    /// The retention sweeper removed records.
    RecordsPurged {
        /// Number of records removed.
        count: usize,
    },

    /// Error occurred.
    Error {
        /// Error message.
        message: String,
    },
}

/// Channel for receiving service events.
pub type ServiceEventsChannel = broadcast::Receiver<ServiceEvent>;

/// Sender for service events.
pub type ServiceEventsSender = broadcast::Sender<ServiceEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (ServiceEventsSender, ServiceEventsChannel) {
    broadcast::channel(256)
}
