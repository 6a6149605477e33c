//! Outbound send operations and the flush worker's dispatch path.

use dispatch_telemetry::{
    log_send_event, metric_inc, DATASYNC_BATCHES, MESSAGES_SENT, SEND_FAILURES,
};
use md_01_datasync::one_to_one_group_id;
use shared_bus::DispatchEvent;
use shared_types::{FlushBatch, GroupId, MessageId, PublicKey, TransportHash};
use std::fmt::Display;
use tracing::debug;

use super::transport::hex_hash;
use super::MessageDispatcher;
use crate::domain::{
    message_id, network_message, wrap, DeliveryMode, DispatchError,
    EncryptionError, RawMessage, SendContext,
};
use crate::ports::outbound::{EncryptionProtocol, ReplicatedLog, Transport};

impl<E, L, T> MessageDispatcher<E, L, T>
where
    E: EncryptionProtocol + 'static,
    L: ReplicatedLog + 'static,
    T: Transport + 'static,
{
    // =========================================================================
    // SEND OPERATIONS
    // =========================================================================

    pub(crate) async fn send_private_raw(
        &self,
        ctx: &SendContext,
        recipient: &PublicKey,
        message: RawMessage,
    ) -> Result<MessageId, DispatchError> {
        ctx.check()?;
        let (wrapped, id) = self.wrap_raw(&message)?;
        self.deliver_private(ctx, recipient, &wrapped, id)
            .await
            .inspect_err(|e| record_failure("send_private", recipient, e))?;
        Ok(id)
    }

    pub(crate) async fn send_group_raw(
        &self,
        ctx: &SendContext,
        recipients: &[PublicKey],
        message: RawMessage,
    ) -> Result<MessageId, DispatchError> {
        if recipients.is_empty() {
            return Err(DispatchError::InvalidInput("no recipients".into()));
        }
        ctx.check()?;

        // One id for every copy.
        let (wrapped, id) = self.wrap_raw(&message)?;
        for recipient in recipients {
            self.deliver_private(ctx, recipient, &wrapped, id)
                .await
                .inspect_err(|e| record_failure("send_group", recipient, e))?;
        }
        Ok(id)
    }

    pub(crate) async fn send_public_raw(
        &self,
        ctx: &SendContext,
        chat_name: &str,
        message: RawMessage,
    ) -> Result<MessageId, DispatchError> {
        if chat_name.is_empty() {
            return Err(DispatchError::InvalidInput("empty chat name".into()));
        }
        ctx.check()?;

        let (wrapped, id) = self.wrap_raw(&message)?;
        let envelope = network_message(wrapped, &self.config.network);
        let hash = ctx
            .run(async {
                Ok::<_, DispatchError>(self.transport.send_public(&envelope, chat_name).await?)
            })
            .await
            .inspect_err(|e| record_failure("send_public", chat_name, e))?;
        self.transport.track(&[id], hash, &envelope);

        metric_inc!(MESSAGES_SENT, &["public"]);
        self.notifier
            .notify(DispatchEvent::PublicMessageSent {
                chat_name: chat_name.to_string(),
                transport_hash: hash,
                message_id: id,
            })
            .await;
        debug!(chat_name, message_id = %id, hash = %hex_hash(&hash), "Public message sent");
        Ok(id)
    }

    pub(crate) async fn send_pair_installation_raw(
        &self,
        ctx: &SendContext,
        recipient: &PublicKey,
        message: RawMessage,
    ) -> Result<MessageId, DispatchError> {
        ctx.check()?;
        let (wrapped, id) = self.wrap_raw(&message)?;

        let result = async {
            let spec = self
                .encryption
                .build_dh_message(&self.identity, recipient, &wrapped)
                .map_err(DispatchError::Encryption)?;
            let (hash, _) = ctx.run(self.send_spec(recipient, spec, &[id])).await?;
            Ok::<_, DispatchError>(hash)
        }
        .await;
        let hash = result.inspect_err(|e| record_failure("send_pair_installation", recipient, e))?;

        metric_inc!(MESSAGES_SENT, &["pairing"]);
        self.notify_sent(recipient, hash, vec![id]).await;
        Ok(id)
    }

    // =========================================================================
    // DELIVERY MODES
    // =========================================================================

    async fn deliver_private(
        &self,
        ctx: &SendContext,
        recipient: &PublicKey,
        wrapped: &[u8],
        id: MessageId,
    ) -> Result<(), DispatchError> {
        match self.config.delivery_mode {
            DeliveryMode::ReplicatedLog => self.schedule(ctx, recipient, wrapped, id).await,
            DeliveryMode::Direct => self
                .send_direct(ctx, recipient, wrapped, &[id], DeliveryMode::Direct.as_str())
                .await
                .map(|_| ()),
        }
    }

    /// Append to the recipient's delivery group, joining it first if needed.
    async fn schedule(
        &self,
        ctx: &SendContext,
        recipient: &PublicKey,
        wrapped: &[u8],
        id: MessageId,
    ) -> Result<(), DispatchError> {
        ctx.check()?;
        let group = one_to_one_group_id(&self.public_key, recipient);
        let lock = self.group_lock(group);
        let appended = {
            let _guard = lock.lock();
            self.join_and_append(group, recipient, wrapped)
        };
        self.release_group_lock(&group, lock);
        appended?;

        metric_inc!(MESSAGES_SENT, &[DeliveryMode::ReplicatedLog.as_str()]);
        self.notifier
            .notify(DispatchEvent::MessageScheduled {
                recipient: *recipient,
                message_id: id,
            })
            .await;
        debug!(recipient = %recipient, message_id = %id, "Message scheduled on replicated log");
        Ok(())
    }

    /// Check-then-add and append. Callers hold the group's lock.
    fn join_and_append(
        &self,
        group: GroupId,
        recipient: &PublicKey,
        wrapped: &[u8],
    ) -> Result<(), DispatchError> {
        if !self.log.is_peer_in_group(&group, recipient)? {
            self.log.add_peer(group, *recipient)?;
            debug!(recipient = %recipient, "Recipient joined delivery group");
        }
        self.log.append_message(group, wrapped.to_vec())?;
        Ok(())
    }

    /// Encrypt `payload` for `recipient` and send it now.
    ///
    /// A session miss triggers a bundle advertisement and still fails the
    /// send with `NoSession`.
    async fn send_direct(
        &self,
        ctx: &SendContext,
        recipient: &PublicKey,
        payload: &[u8],
        message_ids: &[MessageId],
        mode: &'static str,
    ) -> Result<TransportHash, DispatchError> {
        ctx.check()?;
        let spec = match self
            .encryption
            .build_direct_message(&self.identity, recipient, payload)
        {
            Ok(spec) => spec,
            Err(EncryptionError::NoSession { peer }) => {
                log_send_event!(warn, mode, "No session with recipient", recipient);
                self.advertise_bundle(ctx, &peer).await;
                return Err(DispatchError::NoSession { peer });
            }
            Err(e) => return Err(DispatchError::Encryption(e)),
        };

        let (hash, _) = ctx.run(self.send_spec(recipient, spec, message_ids)).await?;
        metric_inc!(MESSAGES_SENT, &[mode]);
        if !message_ids.is_empty() {
            self.notify_sent(recipient, hash, message_ids.to_vec()).await;
        }
        Ok(hash)
    }

    // =========================================================================
    // FLUSH WORKER
    // =========================================================================

    /// Encrypt and send one batch the replicated log flushed.
    ///
    /// Runs on the flush worker. Failures are logged; the log retransmits.
    pub(crate) async fn dispatch_flush_batch(&self, batch: FlushBatch) {
        let ids: Vec<MessageId> = batch
            .bodies
            .iter()
            .map(|body| message_id(&self.public_key, body))
            .collect();

        let ctx = SendContext::background();
        match self
            .send_direct(&ctx, &batch.recipient, &batch.payload, &ids, "flush")
            .await
        {
            Ok(hash) => {
                metric_inc!(DATASYNC_BATCHES);
                debug!(
                    recipient = %batch.recipient,
                    messages = ids.len(),
                    hash = %hex_hash(&hash),
                    "Flush batch dispatched"
                );
            }
            Err(e) => record_failure("flush", &batch.recipient, &e),
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn wrap_raw(&self, message: &RawMessage) -> Result<(Vec<u8>, MessageId), DispatchError> {
        let wrapped = wrap(&message.payload, message.message_type, &self.identity)?;
        let id = message_id(&self.public_key, &wrapped);
        Ok((wrapped, id))
    }

    async fn notify_sent(
        &self,
        recipient: &PublicKey,
        transport_hash: TransportHash,
        message_ids: Vec<MessageId>,
    ) {
        self.notifier
            .notify(DispatchEvent::MessageSent {
                recipient: *recipient,
                transport_hash,
                message_ids,
            })
            .await;
    }
}

fn record_failure(site: &'static str, target: impl Display, err: &DispatchError) {
    log_send_event!(warn, site, "Send failed", target, error = %err);
    metric_inc!(SEND_FAILURES, &[site]);
}
