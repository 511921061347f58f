//! The dBFT service: drives a [`ConsensusContext`] from payloads and timer
//! ticks.
//!
//! The handlers are synchronous and deterministic; the async [`run`] wrapper
//! schedules timer ticks on the tokio runtime. All I/O happens through the
//! returned [`ConsensusEvent`]s, which the node relays to the network.
//!
//! [`run`]: ConsensusService::run

use crate::context::{validator_account, ConsensusContext, ConsensusSigner};
use crate::message::{
    ChangeView, ChangeViewCompact, ChangeViewReason, Commit, ConsensusMessage, ConsensusPayload,
    PrepareRequest, PrepareResponse, RecoveryRequest, CONSENSUS_CATEGORY,
};
use crate::{ConsensusError, ConsensusResult};
use neo3_core::{Block, ExtensiblePayload, UInt256, Verifiable, Witness};
use neo3_crypto::murmur128;
use neo3_io::SerializableExt;
use neo3_ledger::MemoryPool;
use neo3_vm::OpCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What the service asks the node to do.
#[derive(Debug, Clone)]
pub enum ConsensusEvent {
    /// Relay a consensus payload to the network.
    Broadcast(ExtensiblePayload),
    /// A block reached commit quorum; persist and relay it.
    BlockAccepted(Block),
    /// Re-arm the view timer for this many milliseconds.
    ResetTimer(u64),
}

/// One validator's consensus driver for one block height.
pub struct ConsensusService {
    context: ConsensusContext,
    signer: Arc<dyn ConsensusSigner>,
    pool: Arc<MemoryPool>,
    events: Vec<ConsensusEvent>,
}

impl ConsensusService {
    pub fn new(
        context: ConsensusContext,
        signer: Arc<dyn ConsensusSigner>,
        pool: Arc<MemoryPool>,
    ) -> Self {
        Self {
            context,
            signer,
            pool,
            events: Vec::new(),
        }
    }

    pub fn context(&self) -> &ConsensusContext {
        &self.context
    }

    /// Drains the events produced by the last handler call.
    pub fn take_events(&mut self) -> Vec<ConsensusEvent> {
        std::mem::take(&mut self.events)
    }

    /// Milliseconds the view timer runs for `view`: doubles per failed view.
    pub fn timer_interval(&self, view: u8) -> u64 {
        let base = self.context.settings.milliseconds_per_block as u64;
        base << (view as u64 + 1).min(16)
    }

    /// Arms the initial timer for this round.
    pub fn start(&mut self) {
        let interval = if self.context.is_primary() {
            self.context.settings.milliseconds_per_block as u64
        } else {
            self.timer_interval(self.context.view_number)
        };
        self.events.push(ConsensusEvent::ResetTimer(interval));
        debug!(
            index = self.context.block_index,
            primary = self.context.is_primary(),
            "consensus round started"
        );
    }

    /// The view timer fired.
    pub fn on_timer(&mut self, now_ms: u64) -> ConsensusResult<()> {
        if self.context.block_sent {
            return Ok(());
        }
        if self.context.is_primary() && !self.context.request_sent_or_received {
            self.send_prepare_request(now_ms)?;
        } else if self.context.commit_sent {
            // A committed node is locked into its vote; it can only help
            // others catch up.
            self.broadcast_recovery()?;
        } else {
            self.request_change_view(now_ms, ChangeViewReason::Timeout)?;
        }
        Ok(())
    }

    /// A consensus payload arrived from the network.
    pub fn on_payload(&mut self, payload: &ExtensiblePayload, now_ms: u64) -> ConsensusResult<()> {
        if payload.category != CONSENSUS_CATEGORY {
            return Err(ConsensusError::InvalidPayload("wrong category".into()));
        }
        let message = ConsensusMessage::from_array(&payload.data)?;
        if message.block_index != self.context.block_index {
            return Err(ConsensusError::Stale(format!(
                "message for height {}, local height {}",
                message.block_index, self.context.block_index
            )));
        }
        let validator_index = message.validator_index as usize;
        if validator_index >= self.context.n() {
            return Err(ConsensusError::InvalidPayload(format!(
                "validator index {validator_index} out of range"
            )));
        }
        if Some(message.validator_index) == self.context.my_index {
            return Ok(());
        }
        // The payload must come from the validator it claims to be.
        let expected = validator_account(&self.context.validators[validator_index]);
        if payload.sender != expected {
            return Err(ConsensusError::InvalidPayload(
                "sender does not match validator".into(),
            ));
        }
        if self.context.last_seen_view[validator_index] < message.view_number {
            self.context.last_seen_view[validator_index] = message.view_number;
        }

        match &message.payload {
            ConsensusPayload::ChangeView(change_view) => {
                self.on_change_view(&message, change_view)
            }
            ConsensusPayload::PrepareRequest(request) => {
                self.on_prepare_request(&message, payload, request)
            }
            ConsensusPayload::PrepareResponse(response) => {
                self.on_prepare_response(&message, response)
            }
            ConsensusPayload::Commit(commit) => self.on_commit(&message, commit),
            ConsensusPayload::RecoveryRequest(_) => {
                self.broadcast_recovery()?;
                Ok(())
            }
            ConsensusPayload::RecoveryMessage(recovery) => {
                self.on_recovery_message(&message, recovery, now_ms)
            }
        }
    }

    // ---- outbound ----

    fn send_prepare_request(&mut self, now_ms: u64) -> ConsensusResult<()> {
        let candidates = self
            .pool
            .get_sorted_verified_transactions(self.context.settings.max_transactions_per_block as usize);
        let selected = self.context.select_transactions(&candidates);
        self.context.transaction_hashes = selected.iter().map(|tx| tx.hash()).collect();
        self.context.transactions = selected
            .iter()
            .map(|tx| (tx.hash(), (**tx).clone()))
            .collect();
        self.context.timestamp = now_ms.max(self.context.prev_timestamp + 1);
        self.context.nonce = derive_nonce(&self.context.prev_hash, self.context.block_index);
        self.context.request_sent_or_received = true;

        let request = PrepareRequest {
            version: 0,
            prev_hash: self.context.prev_hash,
            timestamp: self.context.timestamp,
            nonce: self.context.nonce,
            transaction_hashes: self.context.transaction_hashes.clone(),
        };
        let payload = self
            .context
            .make_payload(self.signer.as_ref(), ConsensusPayload::PrepareRequest(request))?;
        if let Some(my_index) = self.context.my_index {
            self.context.preparations[my_index as usize] = Some(payload.hash());
        }
        self.context.preparation_hash = Some(payload.hash());
        info!(
            index = self.context.block_index,
            transactions = self.context.transaction_hashes.len(),
            "prepare request sent"
        );
        self.events.push(ConsensusEvent::Broadcast(payload));
        self.events.push(ConsensusEvent::ResetTimer(
            self.timer_interval(self.context.view_number),
        ));
        Ok(())
    }

    fn request_change_view(
        &mut self,
        now_ms: u64,
        reason: ChangeViewReason,
    ) -> ConsensusResult<()> {
        let new_view = self.context.view_number + 1;
        if let Some(my_index) = self.context.my_index {
            self.context.change_views[my_index as usize] = Some(ChangeViewCompact {
                validator_index: my_index,
                original_view_number: new_view,
                timestamp: now_ms,
            });
        }
        let payload = self.context.make_payload(
            self.signer.as_ref(),
            ConsensusPayload::ChangeView(ChangeView {
                timestamp: now_ms,
                reason,
            }),
        )?;
        warn!(
            view = self.context.view_number,
            new_view, ?reason, "requesting view change"
        );
        self.events.push(ConsensusEvent::Broadcast(payload));
        self.events.push(ConsensusEvent::ResetTimer(self.timer_interval(new_view)));
        self.check_change_views(new_view)
    }

    fn broadcast_recovery(&mut self) -> ConsensusResult<()> {
        let recovery = self.context.make_recovery_message();
        let payload = self.context.make_payload(
            self.signer.as_ref(),
            ConsensusPayload::RecoveryMessage(Box::new(recovery)),
        )?;
        self.events.push(ConsensusEvent::Broadcast(payload));
        Ok(())
    }

    // ---- inbound ----

    fn on_change_view(
        &mut self,
        message: &ConsensusMessage,
        change_view: &ChangeView,
    ) -> ConsensusResult<()> {
        let new_view = message.view_number + 1;
        self.context.change_views[message.validator_index as usize] = Some(ChangeViewCompact {
            validator_index: message.validator_index,
            original_view_number: new_view,
            timestamp: change_view.timestamp,
        });
        self.check_change_views(new_view)
    }

    fn check_change_views(&mut self, view: u8) -> ConsensusResult<()> {
        if self.context.commit_sent {
            return Ok(());
        }
        if self.context.count_change_views(view) >= self.context.m() {
            info!(view, "view change quorum reached");
            self.context.reset(view);
            self.events
                .push(ConsensusEvent::ResetTimer(self.timer_interval(view)));
        }
        Ok(())
    }

    fn on_prepare_request(
        &mut self,
        message: &ConsensusMessage,
        payload: &ExtensiblePayload,
        request: &PrepareRequest,
    ) -> ConsensusResult<()> {
        if message.view_number != self.context.view_number {
            return Err(ConsensusError::Stale("prepare request for another view".into()));
        }
        if message.validator_index != self.context.primary_index(self.context.view_number) {
            return Err(ConsensusError::InvalidPayload(
                "prepare request not from the primary".into(),
            ));
        }
        if self.context.request_sent_or_received {
            return Ok(());
        }
        if request.prev_hash != self.context.prev_hash {
            return Err(ConsensusError::InvalidPayload("wrong previous hash".into()));
        }
        if request.timestamp <= self.context.prev_timestamp {
            return Err(ConsensusError::InvalidPayload("timestamp not advancing".into()));
        }

        self.context.timestamp = request.timestamp;
        self.context.nonce = request.nonce;
        self.context.transaction_hashes = request.transaction_hashes.clone();
        self.context.request_sent_or_received = true;
        self.context.preparation_hash = Some(payload.hash());
        self.context.preparations[message.validator_index as usize] = Some(payload.hash());

        // Pull the referenced transactions from the pool.
        self.context.transactions.clear();
        for hash in &self.context.transaction_hashes {
            if let Some(tx) = self.pool.try_get(hash) {
                self.context.transactions.insert(*hash, (*tx).clone());
            }
        }
        let missing = self
            .context
            .transaction_hashes
            .iter()
            .any(|hash| !self.context.transactions.contains_key(hash));
        if missing {
            // The node must fetch the missing transactions before it can
            // endorse; dBFT waits rather than rejecting.
            debug!("prepare request references unknown transactions");
            return Ok(());
        }

        if self.context.my_index.is_some() && !self.context.response_sent {
            let response = PrepareResponse {
                preparation_hash: payload.hash(),
            };
            let response_payload = self.context.make_payload(
                self.signer.as_ref(),
                ConsensusPayload::PrepareResponse(response),
            )?;
            if let Some(my_index) = self.context.my_index {
                self.context.preparations[my_index as usize] = Some(payload.hash());
            }
            self.context.response_sent = true;
            self.events.push(ConsensusEvent::Broadcast(response_payload));
        }
        self.check_preparations()
    }

    fn on_prepare_response(
        &mut self,
        message: &ConsensusMessage,
        response: &PrepareResponse,
    ) -> ConsensusResult<()> {
        if message.view_number != self.context.view_number {
            return Err(ConsensusError::Stale("response for another view".into()));
        }
        if let Some(expected) = self.context.preparation_hash {
            if response.preparation_hash != expected {
                return Err(ConsensusError::InvalidPayload(
                    "response endorses a different proposal".into(),
                ));
            }
        }
        self.context.preparations[message.validator_index as usize] =
            Some(response.preparation_hash);
        self.check_preparations()
    }

    fn check_preparations(&mut self) -> ConsensusResult<()> {
        if !self.context.preparations_reached_quorum() || self.context.commit_sent {
            return Ok(());
        }
        let header = self.context.make_header();
        let signature = self
            .signer
            .sign(&header.sign_data(self.context.settings.network))
            .ok_or(ConsensusError::SigningFailed)?;
        if let Some(my_index) = self.context.my_index {
            self.context.commits[my_index as usize] = Some(signature);
        }
        self.context.commit_sent = true;
        info!(index = self.context.block_index, "commit sent");
        let payload = self.context.make_payload(
            self.signer.as_ref(),
            ConsensusPayload::Commit(Commit { signature }),
        )?;
        self.events.push(ConsensusEvent::Broadcast(payload));
        self.check_commits()
    }

    fn on_commit(&mut self, message: &ConsensusMessage, commit: &Commit) -> ConsensusResult<()> {
        if message.view_number != self.context.view_number {
            // Commits from other views are retained: the signer is locked.
            self.context.record_commit(message.validator_index, commit);
            return Ok(());
        }
        // Verify the signature once the proposal is known; before that the
        // commit is only recorded (its sender is locked either way).
        if self.context.request_sent_or_received {
            let header = self.context.make_header();
            let pubkey = &self.context.validators[message.validator_index as usize];
            if !pubkey.verify_signature(
                &header.sign_data(self.context.settings.network),
                &commit.signature,
            ) {
                return Err(ConsensusError::InvalidPayload("bad commit signature".into()));
            }
        }
        self.context.record_commit(message.validator_index, commit);
        self.check_commits()
    }

    fn check_commits(&mut self) -> ConsensusResult<()> {
        if !self.context.commits_reached_quorum() || self.context.block_sent {
            return Ok(());
        }
        let witness = self.make_block_witness()?;
        let Some(block) = self.context.create_block(witness) else {
            return Ok(());
        };
        self.context.block_sent = true;
        info!(index = block.index(), hash = %block.hash(), "block accepted by commit quorum");
        self.events.push(ConsensusEvent::BlockAccepted(block));
        Ok(())
    }

    /// The m-of-n witness assembled from the collected commit signatures, in
    /// validator order.
    fn make_block_witness(&self) -> ConsensusResult<Witness> {
        let m = self.context.m();
        let keys: Vec<[u8; 33]> = self
            .context
            .validators
            .iter()
            .map(|key| key.encode_compressed())
            .collect();
        let verification = neo3_vm::multisig_contract_script(m, &keys).ok_or_else(|| {
            ConsensusError::InvalidPayload("cannot build consensus multisig".into())
        })?;
        let mut invocation = Vec::with_capacity(m * 66);
        let mut used = 0;
        for slot in &self.context.commits {
            if used == m {
                break;
            }
            if let Some(signature) = slot {
                invocation.push(OpCode::PushData1 as u8);
                invocation.push(64);
                invocation.extend_from_slice(signature);
                used += 1;
            }
        }
        if used < m {
            return Err(ConsensusError::InvalidPayload(
                "not enough commit signatures".into(),
            ));
        }
        Ok(Witness::new(invocation, verification))
    }

    fn on_recovery_message(
        &mut self,
        message: &ConsensusMessage,
        recovery: &crate::message::RecoveryMessage,
        now_ms: u64,
    ) -> ConsensusResult<()> {
        let _ = now_ms;
        for compact in &recovery.change_view_messages {
            if (compact.validator_index as usize) < self.context.n() {
                self.context.change_views[compact.validator_index as usize] =
                    Some(compact.clone());
            }
        }
        if message.view_number == self.context.view_number {
            if let Some(request) = &recovery.prepare_request {
                if !self.context.request_sent_or_received
                    && request.prev_hash == self.context.prev_hash
                {
                    self.context.timestamp = request.timestamp;
                    self.context.nonce = request.nonce;
                    self.context.transaction_hashes = request.transaction_hashes.clone();
                    self.context.request_sent_or_received = true;
                    self.context.transactions.clear();
                    for hash in &self.context.transaction_hashes {
                        if let Some(tx) = self.pool.try_get(hash) {
                            self.context.transactions.insert(*hash, (*tx).clone());
                        }
                    }
                }
            }
            for compact in &recovery.preparation_messages {
                if (compact.validator_index as usize) < self.context.n() {
                    if let Some(hash) = self.context.preparation_hash {
                        self.context.preparations[compact.validator_index as usize] = Some(hash);
                    }
                }
            }
        }
        for compact in &recovery.commit_messages {
            self.context.record_commit(
                compact.validator_index,
                &Commit {
                    signature: compact.signature,
                },
            );
        }
        self.check_preparations()?;
        self.check_commits()
    }

    /// Drives the service on the tokio runtime: payloads come in through
    /// `payloads`, events go out through `events`, and timer ticks are
    /// scheduled as requested by the handlers.
    pub async fn run(
        mut self,
        mut payloads: tokio::sync::mpsc::Receiver<ExtensiblePayload>,
        events: tokio::sync::mpsc::Sender<ConsensusEvent>,
    ) {
        use tokio::time::{sleep_until, Duration, Instant};

        self.start();
        let mut deadline = Instant::now() + Duration::from_millis(
            self.context.settings.milliseconds_per_block as u64,
        );
        loop {
            for event in self.take_events() {
                if let ConsensusEvent::ResetTimer(interval) = &event {
                    deadline = Instant::now() + Duration::from_millis(*interval);
                    continue;
                }
                if events.send(event).await.is_err() {
                    return;
                }
            }
            tokio::select! {
                maybe_payload = payloads.recv() => {
                    let Some(payload) = maybe_payload else { return };
                    let now = now_unix_ms();
                    if let Err(error) = self.on_payload(&payload, now) {
                        debug!(%error, "consensus payload rejected");
                    }
                }
                _ = sleep_until(deadline) => {
                    let now = now_unix_ms();
                    deadline = Instant::now()
                        + Duration::from_millis(self.timer_interval(self.context.view_number));
                    if let Err(error) = self.on_timer(now) {
                        warn!(%error, "consensus timer handling failed");
                    }
                }
            }
            if self.context.block_sent {
                for event in self.take_events() {
                    if matches!(event, ConsensusEvent::ResetTimer(_)) {
                        continue;
                    }
                    let _ = events.send(event).await;
                }
                return;
            }
        }
    }
}

/// Deterministic proposal nonce derived from the chain position.
fn derive_nonce(prev_hash: &UInt256, block_index: u32) -> u64 {
    let mut seed = Vec::with_capacity(36);
    seed.extend_from_slice(prev_hash.get_span());
    seed.extend_from_slice(&block_index.to_le_bytes());
    let digest = murmur128(&seed, 0);
    u64::from_le_bytes(digest[..8].try_into().expect("8 bytes of a digest"))
}

fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}
