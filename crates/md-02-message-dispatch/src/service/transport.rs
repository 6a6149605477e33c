//! Transport selector: path choice, envelope construction, tracking.

use dispatch_telemetry::{time_histogram, SEND_DURATION};
use shared_types::{MessageId, NetworkMessage, PublicKey, TransportHash};
use tracing::debug;

use super::MessageDispatcher;
use crate::domain::{network_message, select_path, DispatchError, MessageSpec, TransportPath};
use crate::ports::outbound::{EncryptionProtocol, ReplicatedLog, Transport};

impl<E, L, T> MessageDispatcher<E, L, T>
where
    E: EncryptionProtocol + 'static,
    L: ReplicatedLog + 'static,
    T: Transport + 'static,
{
    /// Send one descriptor to `recipient` and track `message_ids` under the
    /// resulting hash in a single call.
    ///
    /// The cost tier is taken from the ciphertext size.
    pub(crate) async fn send_spec(
        &self,
        recipient: &PublicKey,
        spec: MessageSpec,
        message_ids: &[MessageId],
    ) -> Result<(TransportHash, NetworkMessage), DispatchError> {
        let path = select_path(&spec);
        let MessageSpec {
            payload,
            shared_secret,
        } = spec;
        let message = network_message(payload, &self.config.network);

        // The topic must be live before anything is sent on it.
        if let (TransportPath::SharedSecret, Some(secret)) = (path, shared_secret.as_ref()) {
            self.transport
                .process_negotiated_secrets(vec![secret.clone()])
                .await?;
        }

        let hash = {
            let _timer = time_histogram!(SEND_DURATION);
            match (path, shared_secret) {
                (TransportPath::SharedSecret, Some(secret)) => {
                    self.transport
                        .send_private_with_shared_secret(&message, recipient, &secret)
                        .await?
                }
                _ => {
                    self.transport
                        .send_private_with_partitioned(&message, recipient)
                        .await?
                }
            }
        };

        debug!(
            recipient = %recipient,
            path = path.as_str(),
            hash = %hex_hash(&hash),
            size = message.payload.len(),
            pow_target = message.pow_target,
            "Envelope sent"
        );

        if !message_ids.is_empty() {
            self.transport.track(message_ids, hash, &message);
        }
        Ok((hash, message))
    }
}

pub(crate) fn hex_hash(hash: &TransportHash) -> String {
    format!("0x{}", hex::encode(hash))
}
