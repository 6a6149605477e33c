//! Inbound pipeline driver.
//!
//! Stage 1 is the only stage that can fail the call. Every later stage
//! yields a `StageOutcome`; drops are logged, counted and collected, and
//! never stop sibling messages.

use dispatch_telemetry::{log_stage_event, metric_inc, INBOUND_MESSAGES};
use shared_bus::DispatchEvent;
use shared_types::{PublicKey, TransportMessage};
use tracing::{debug, warn};

use super::transport::hex_hash;
use super::MessageDispatcher;
use crate::domain::{
    decode, message_id, unwrap, DecryptResult, DeliveryMode, DispatchError, DropReason,
    InboundReport, SendContext, SharedSecret, Stage, StageOutcome, StatusMessage,
};
use crate::ports::outbound::{EncryptionProtocol, ReplicatedLog, Transport};

impl<E, L, T> MessageDispatcher<E, L, T>
where
    E: EncryptionProtocol + 'static,
    L: ReplicatedLog + 'static,
    T: Transport + 'static,
{
    /// Run the inbound pipeline and report delivered and dropped messages.
    pub async fn process_incoming_report(
        &self,
        message: TransportMessage,
        want_application: bool,
    ) -> Result<InboundReport, DispatchError> {
        let hash = message.hash;
        let shell = match StatusMessage::from_transport(message) {
            Ok(shell) => shell,
            Err(e) => {
                let stage = Stage::TransportDecode.as_str();
                log_stage_event!(error, stage, "Transport decode failed", hex_hash(&hash), error = %e);
                metric_inc!(INBOUND_MESSAGES, &["dropped", stage]);
                return Err(DispatchError::TransportDecode(e));
            }
        };

        let mut report = InboundReport::default();
        let shell = self.decrypt_stage(shell, &mut report).await;
        if shell.payload.is_empty() {
            // Bundle advertisements and other control envelopes.
            debug!(hash = %hex_hash(&hash), "Envelope carried no application payload");
            return Ok(report);
        }

        let extracted = match self.extract_stage(&shell) {
            StageOutcome::Delivered(messages) => messages,
            StageOutcome::Dropped(reason) => {
                record_drop(reason, &mut report);
                return Ok(report);
            }
        };

        let final_stage = if want_application {
            Stage::Application
        } else {
            Stage::Metadata
        };
        for message in extracted {
            let outcome = metadata_stage(message).and_then(|message| {
                if want_application {
                    application_stage(message)
                } else {
                    StageOutcome::Delivered(message)
                }
            });
            match outcome {
                StageOutcome::Delivered(message) => {
                    metric_inc!(INBOUND_MESSAGES, &["delivered", final_stage.as_str()]);
                    report.messages.push(message);
                }
                StageOutcome::Dropped(reason) => record_drop(reason, &mut report),
            }
        }

        debug!(
            hash = %hex_hash(&hash),
            delivered = report.messages.len(),
            dropped = report.dropped.len(),
            "Inbound envelope processed"
        );
        Ok(report)
    }

    /// Stage 2. Always continues; on failure the envelope bytes go on.
    async fn decrypt_stage(
        &self,
        mut shell: StatusMessage,
        report: &mut InboundReport,
    ) -> StatusMessage {
        let sender = shell.transport_sender;
        let stage = Stage::Decryption.as_str();
        let hash = hex_hash(&shell.transport_hash);

        match self
            .encryption
            .decrypt(&self.identity, &sender, &shell.transport_payload)
        {
            DecryptResult::Decrypted {
                plaintext,
                negotiated,
            } => {
                shell.payload = plaintext;
                shell.decrypted = true;
                if !negotiated.is_empty() {
                    self.handle_negotiated_secrets(negotiated).await;
                }
            }
            DecryptResult::NoSession => {
                log_stage_event!(warn, stage, "No session with sender", hash, sender = %sender);
                let outcome = self
                    .advertise_bundle(&SendContext::background(), &sender)
                    .await;
                report.recovery = Some(outcome);
            }
            DecryptResult::Failed(e) => {
                log_stage_event!(debug, stage, "Not decrypted, continuing", hash, error = %e);
            }
        }
        shell
    }

    /// Stage 3. Only the replicated log batches; direct mode passes through.
    fn extract_stage(&self, shell: &StatusMessage) -> StageOutcome<Vec<StatusMessage>> {
        if self.config.delivery_mode != DeliveryMode::ReplicatedLog {
            return StageOutcome::Delivered(vec![shell.clone()]);
        }
        match self
            .log
            .extract_messages(&shell.transport_sender, &shell.payload)
        {
            Ok(bodies) => StageOutcome::Delivered(
                bodies
                    .into_iter()
                    .map(|body| shell.with_payload(body))
                    .collect(),
            ),
            Err(e) => StageOutcome::dropped(Stage::Extraction, shell.transport_hash, e),
        }
    }

    async fn handle_negotiated_secrets(&self, secrets: Vec<SharedSecret>) {
        let peers: Vec<PublicKey> = secrets.iter().map(|s| s.identity).collect();
        match self.transport.process_negotiated_secrets(secrets).await {
            Ok(()) => {
                debug!(peers = peers.len(), "Shared secrets installed");
                self.notifier
                    .notify(DispatchEvent::SharedSecretsNegotiated { peers })
                    .await;
            }
            Err(e) => warn!(error = %e, "Failed to install negotiated secrets"),
        }
    }
}

/// Stage 4. Recover the author and recompute the identifier from it.
fn metadata_stage(mut message: StatusMessage) -> StageOutcome<StatusMessage> {
    let hash = message.transport_hash;
    let envelope = match unwrap(&message.payload) {
        Ok(envelope) => envelope,
        Err(e) => return StageOutcome::dropped(Stage::Metadata, hash, e),
    };
    let signer = match envelope.recover_signer() {
        Ok(signer) => signer,
        Err(e) => return StageOutcome::dropped(Stage::Metadata, hash, e),
    };

    message.id = Some(message_id(&signer, &message.payload));
    message.signer = Some(signer);
    message.message_type = envelope.message_type;
    message.application_payload = envelope.payload;
    StageOutcome::Delivered(message)
}

/// Stage 5.
fn application_stage(mut message: StatusMessage) -> StageOutcome<StatusMessage> {
    match decode(message.message_type, &message.application_payload) {
        Ok(parsed) => {
            message.parsed = Some(parsed);
            StageOutcome::Delivered(message)
        }
        Err(e) => StageOutcome::dropped(Stage::Application, message.transport_hash, e),
    }
}

fn record_drop(reason: DropReason, report: &mut InboundReport) {
    let stage = reason.stage.as_str();
    let hash = hex_hash(&reason.hash);
    match reason.stage {
        Stage::Extraction | Stage::Decryption => {
            log_stage_event!(debug, stage, "Message dropped", hash, reason = %reason.reason)
        }
        _ => log_stage_event!(error, stage, "Message dropped", hash, reason = %reason.reason),
    }
    metric_inc!(INBOUND_MESSAGES, &["dropped", stage]);
    report.dropped.push(reason);
}
