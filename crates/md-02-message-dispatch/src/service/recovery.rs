//! Bundle-advertisement recovery.
//!
//! Runs on every session miss, outbound or inbound. Every failure is logged
//! and swallowed; the triggering operation never fails because of it.

use dispatch_telemetry::{log_send_event, metric_inc, BUNDLE_ADVERTISEMENTS};
use shared_bus::DispatchEvent;
use shared_types::PublicKey;
use tracing::{debug, error, info};

use super::transport::hex_hash;
use super::MessageDispatcher;
use crate::domain::{DispatchError, RecoveryOutcome, SendContext};
use crate::ports::outbound::{EncryptionProtocol, ReplicatedLog, Transport};

impl<E, L, T> MessageDispatcher<E, L, T>
where
    E: EncryptionProtocol + 'static,
    L: ReplicatedLog + 'static,
    T: Transport + 'static,
{
    /// Advertise this node's bundle to `peer` if the encryption collaborator
    /// says it is due.
    ///
    /// The send is bounded by `bundle_advertisement_timeout` on top of `ctx`.
    pub async fn advertise_bundle(&self, ctx: &SendContext, peer: &PublicKey) -> RecoveryOutcome {
        let outcome = self.try_advertise_bundle(ctx, peer).await;
        metric_inc!(BUNDLE_ADVERTISEMENTS, &[outcome.as_str()]);
        outcome
    }

    async fn try_advertise_bundle(&self, ctx: &SendContext, peer: &PublicKey) -> RecoveryOutcome {
        let now = self.clock.now();
        match self.encryption.should_advertise_bundle(peer, now) {
            Ok(true) => {}
            Ok(false) => {
                debug!(peer = %peer, "Bundle advertisement not due");
                return RecoveryOutcome::NotDue;
            }
            Err(e) => {
                log_send_event!(error, "advertise_bundle", "Advertisement check failed", peer, error = %e);
                return RecoveryOutcome::Failed(e.to_string());
            }
        }

        let spec = match self
            .encryption
            .build_bundle_advertise_message(&self.identity, peer)
        {
            Ok(spec) => spec,
            Err(e) => {
                log_send_event!(error, "advertise_bundle", "Building advertisement failed", peer, error = %e);
                return RecoveryOutcome::Failed(e.to_string());
            }
        };

        let limit = self.config.bundle_advertisement_timeout();
        let bounded = tokio::time::timeout(limit, self.send_spec(peer, spec, &[]));
        let hash = match ctx.run(async { Ok::<_, DispatchError>(bounded.await) }).await {
            Ok(Ok(Ok((hash, _)))) => hash,
            Ok(Ok(Err(e))) => {
                log_send_event!(error, "advertise_bundle", "Advertisement send failed", peer, error = %e);
                return RecoveryOutcome::Failed(e.to_string());
            }
            Ok(Err(_elapsed)) => {
                log_send_event!(
                    error,
                    "advertise_bundle",
                    "Advertisement send timed out",
                    peer,
                    timeout_ms = limit.as_millis() as u64
                );
                return RecoveryOutcome::TimedOut;
            }
            Err(e) => {
                log_send_event!(error, "advertise_bundle", "Advertisement cancelled", peer, error = %e);
                return RecoveryOutcome::Failed(e.to_string());
            }
        };

        self.encryption.confirm_bundle_advertisement(peer, now);
        self.notifier
            .notify(DispatchEvent::BundleAdvertised {
                recipient: *peer,
                transport_hash: hash,
            })
            .await;
        info!(peer = %peer, hash = %hex_hash(&hash), "Bundle advertised");
        RecoveryOutcome::Advertised(hash)
    }
}
