//! Multi-validator dBFT rounds driven message by message.

use neo3_config::ProtocolSettings;
use neo3_consensus::{
    ConsensusContext, ConsensusEvent, ConsensusService, ConsensusSigner,
};
use neo3_core::{ExtensiblePayload, UInt160, UInt256, Verifiable};
use neo3_crypto::{verify_multisig, ECPoint, KeyPair};
use neo3_ledger::MemoryPool;
use neo3_vm::multisig_contract_script;
use std::sync::Arc;

struct TestSigner {
    pair: KeyPair,
}

impl ConsensusSigner for TestSigner {
    fn public_key(&self) -> ECPoint {
        *self.pair.public_key()
    }

    fn sign(&self, data: &[u8]) -> Option<[u8; 64]> {
        self.pair.sign(data).ok()
    }
}

struct Network {
    services: Vec<ConsensusService>,
    signers: Vec<Arc<TestSigner>>,
    blocks: Vec<neo3_core::Block>,
}

impl Network {
    /// Builds `count` validators for block 1 over a fake genesis.
    fn new(count: usize) -> Network {
        let settings = Arc::new(ProtocolSettings::default());
        let mut pairs: Vec<KeyPair> = (0..count).map(|_| KeyPair::generate()).collect();
        pairs.sort_by(|a, b| a.public_key().cmp(b.public_key()));
        let validators: Vec<ECPoint> = pairs.iter().map(|pair| *pair.public_key()).collect();

        let m = count - (count - 1) / 3;
        let keys: Vec<[u8; 33]> = validators.iter().map(|key| key.encode_compressed()).collect();
        let next_consensus =
            UInt160::from_script(&multisig_contract_script(m, &keys).expect("valid multisig"));

        let signers: Vec<Arc<TestSigner>> = pairs
            .into_iter()
            .map(|pair| Arc::new(TestSigner { pair }))
            .collect();
        let services = signers
            .iter()
            .map(|signer| {
                let context = ConsensusContext::new(
                    Arc::clone(&settings),
                    validators.clone(),
                    Some(&signer.public_key()),
                    1,
                    UInt256::digest(b"genesis"),
                    1_000,
                    next_consensus,
                );
                ConsensusService::new(
                    context,
                    Arc::clone(signer) as Arc<dyn ConsensusSigner>,
                    Arc::new(MemoryPool::new(Arc::clone(&settings))),
                )
            })
            .collect();
        Network {
            services,
            signers,
            blocks: Vec::new(),
        }
    }

    fn primary_position(&self) -> usize {
        let view = self.services[0].context().view_number;
        self.services[0].context().primary_index(view) as usize
    }

    /// Delivers `payload` to every service, collecting broadcasts and any
    /// accepted blocks.
    fn deliver(&mut self, payload: &ExtensiblePayload, now: u64) -> Vec<ExtensiblePayload> {
        let mut out = Vec::new();
        for service in &mut self.services {
            let _ = service.on_payload(payload, now);
            for event in service.take_events() {
                match event {
                    ConsensusEvent::Broadcast(broadcast) => out.push(broadcast),
                    ConsensusEvent::BlockAccepted(block) => self.blocks.push(block),
                    ConsensusEvent::ResetTimer(_) => {}
                }
            }
        }
        out
    }

    fn accepted_blocks(&mut self) -> Vec<neo3_core::Block> {
        std::mem::take(&mut self.blocks)
    }
}

#[test]
fn primary_rotates_with_block_index_and_view() {
    let network = Network::new(7);
    let context = network.services[0].context();
    // primary = (block_index - view) mod n
    assert_eq!(context.primary_index(0), 1);
    assert_eq!(context.primary_index(1), 0);
    assert_eq!(context.primary_index(2), 6);
}

#[test]
fn quorum_thresholds_follow_the_safety_formula() {
    for (n, f, m) in [(4usize, 1usize, 3usize), (7, 2, 5), (10, 3, 7)] {
        let network = Network::new(n);
        let context = network.services[0].context();
        assert_eq!(context.f(), f);
        assert_eq!(context.m(), m);
    }
}

#[test]
fn full_round_reaches_commit_quorum_and_accepts_a_block() {
    let mut network = Network::new(4);
    let primary = network.primary_position();

    // The primary proposes on its timer.
    network.services[primary].on_timer(2_000).unwrap();
    let mut proposals = Vec::new();
    for event in network.services[primary].take_events() {
        if let ConsensusEvent::Broadcast(payload) = event {
            proposals.push(payload);
        }
    }
    assert_eq!(proposals.len(), 1, "one prepare request expected");

    // Everyone sees the proposal; backups respond.
    let responses = network.deliver(&proposals[0], 2_100);
    assert_eq!(responses.len(), 3, "three prepare responses expected");

    // Responses circulate until commit quorum; commits circulate until the
    // block is out.
    let mut commits = Vec::new();
    for response in &responses {
        commits.extend(network.deliver(response, 2_200));
    }
    assert!(!commits.is_empty(), "commit quorum should produce commits");
    for commit in &commits {
        network.deliver(commit, 2_300);
    }

    for service in &network.services {
        assert!(service.context().block_sent, "validator did not accept the block");
    }
    let mut blocks = network.accepted_blocks();
    let block = blocks.pop().expect("at least one service surfaced the block");
    assert_eq!(block.index(), 1);
    assert_eq!(block.header.prev_hash, UInt256::digest(b"genesis"));
    assert!(block.verify_merkle_root());
}

#[test]
fn accepted_block_carries_a_valid_multisig_witness() {
    let mut network = Network::new(4);
    let primary = network.primary_position();
    let validators: Vec<ECPoint> = network.services[0].context().validators.clone();
    let settings_network = network.services[0].context().settings.network;

    network.services[primary].on_timer(2_000).unwrap();
    let proposal = network.services[primary]
        .take_events()
        .into_iter()
        .find_map(|event| match event {
            ConsensusEvent::Broadcast(payload) => Some(payload),
            _ => None,
        })
        .unwrap();

    let responses = network.deliver(&proposal, 2_100);
    let mut follow_ups: Vec<ExtensiblePayload> = Vec::new();
    for response in &responses {
        follow_ups.extend(network.deliver(response, 2_200));
    }
    for payload in &follow_ups {
        network.deliver(payload, 2_300);
    }
    let block = network
        .accepted_blocks()
        .pop()
        .expect("commit quorum produces a block");

    let sign_data = block.header.sign_data(settings_network);
    // Extract the 64-byte signatures from the invocation script.
    let signatures: Vec<Vec<u8>> = block
        .header
        .witness
        .invocation_script
        .chunks_exact(66)
        .map(|chunk| chunk[2..].to_vec())
        .collect();
    assert!(signatures.len() >= network.services[0].context().m());
    assert!(verify_multisig(&sign_data, &signatures, &validators));
}

#[test]
fn view_change_advances_after_quorum_of_requests() {
    let mut network = Network::new(4);
    let primary = network.primary_position();

    // Every backup times out and asks for view 1.
    let mut requests = Vec::new();
    for (index, service) in network.services.iter_mut().enumerate() {
        if index == primary {
            continue;
        }
        service.on_timer(20_000).unwrap();
        for event in service.take_events() {
            if let ConsensusEvent::Broadcast(payload) = event {
                requests.push(payload);
            }
        }
    }
    assert_eq!(requests.len(), 3);

    for request in &requests {
        network.deliver(request, 21_000);
    }
    for (index, service) in network.services.iter().enumerate() {
        if index == primary {
            continue;
        }
        assert_eq!(
            service.context().view_number,
            1,
            "backup {index} did not advance"
        );
    }
}

#[test]
fn timer_interval_doubles_per_view() {
    let network = Network::new(4);
    let service = &network.services[0];
    assert_eq!(service.timer_interval(1), 2 * service.timer_interval(0));
    assert_eq!(service.timer_interval(2), 4 * service.timer_interval(0));
}

#[test]
fn recovery_request_is_answered_with_the_prepare_evidence() {
    let mut network = Network::new(4);
    let primary = network.primary_position();
    network.services[primary].on_timer(2_000).unwrap();
    let proposal = network.services[primary]
        .take_events()
        .into_iter()
        .find_map(|event| match event {
            ConsensusEvent::Broadcast(payload) => Some(payload),
            _ => None,
        })
        .unwrap();
    network.deliver(&proposal, 2_100);
    // Drain the responses so only the recovery answer remains observable.
    for service in &mut network.services {
        service.take_events();
    }

    // A backup asks for recovery.
    let backup = (primary + 1) % 4;
    let request = network.services[backup]
        .context()
        .make_payload(
            network.signers[backup].as_ref(),
            neo3_consensus::ConsensusPayload::RecoveryRequest(neo3_consensus::RecoveryRequest {
                timestamp: 9_000,
            }),
        )
        .unwrap();

    let _ = network.services[primary].on_payload(&request, 9_100);
    let answer = network.services[primary]
        .take_events()
        .into_iter()
        .find_map(|event| match event {
            ConsensusEvent::Broadcast(payload) => Some(payload),
            _ => None,
        })
        .expect("primary answers recovery requests");

    use neo3_io::SerializableExt;
    let message = neo3_consensus::ConsensusMessage::from_array(&answer.data).unwrap();
    match message.payload {
        neo3_consensus::ConsensusPayload::RecoveryMessage(recovery) => {
            let request = recovery.prepare_request.expect("evidence includes the proposal");
            assert_eq!(request.prev_hash, UInt256::digest(b"genesis"));
        }
        other => panic!("expected a recovery message, got {other:?}"),
    }
}
