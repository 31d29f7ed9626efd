//! The coordination engine - single owner of all mesh state
//!
//! Sans-IO core: the engine consumes datagrams and explicit clock
//! readings, and produces outbound frames and observer events through
//! queues. The runtime decides how sockets and timers feed it; tests
//! drive it with a synthetic clock and hand-built frames. Everything
//! the protocol does - admission, election, epoch custody, resync -
//! happens inside one `&mut self` call at a time, so there is exactly
//! one writer per node and snapshots are always consistent.

use std::collections::VecDeque;
use std::net::SocketAddr;

use kedge_core::{
    AuthorityRank, KedgeResult, MeshConfig, MeshEvent, NodeId, NodeStatus, PeerRecord, Persona,
    Timestamp, ZoneId,
};
use kedge_crypto::{
    compute_tag, derive_zone_id, seal_secret, EpochSecret, Identity, PublicIdentity,
};
use kedge_wire::{
    peek_kind, Announcement, EpochRequest, EpochResponse, EpochTag, MessageKind,
};

use crate::elector::AnchorElector;
use crate::epochs::EpochKeyManager;
use crate::gate::{GateVerdict, IntegrityGate};
use crate::limit::{RequestLimiter, ResyncThrottle};
use crate::table::{PeerTable, UpsertOutcome};

/// A frame the runtime should put on the wire
#[derive(Clone, Debug)]
pub enum Outbound {
    /// Multicast to the zone's coordination group
    Broadcast(bytes::Bytes),
    /// Unicast to one peer
    Unicast(bytes::Bytes, SocketAddr),
}

/// Best signature-backed Anchor claim heard while unable to tag-verify
///
/// Used only to address `REQ_EPOCH`; it never feeds the election.
#[derive(Clone, Copy, Debug)]
struct AnchorHint {
    id: NodeId,
    addr: SocketAddr,
    rank: AuthorityRank,
    heard_at: Timestamp,
}

/// Monotonic counters for operator surfaces
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineStats {
    pub pulses_sent: u64,
    pub pulses_accepted: u64,
    pub pulses_unsynced: u64,
    pub pulses_dropped: u64,
    pub malformed_datagrams: u64,
    pub peers_expired: u64,
    pub epoch_requests_sent: u64,
    pub epoch_requests_served: u64,
    pub epoch_requests_refused: u64,
    pub epoch_responses_adopted: u64,
    pub epoch_responses_discarded: u64,
}

/// Consistent point-in-time view for external observers
#[derive(Clone, Debug)]
pub struct MeshSnapshot {
    pub local_id: NodeId,
    pub persona: Persona,
    pub status: NodeStatus,
    pub authority_score: u16,
    pub seniority: Timestamp,
    pub anchor: Option<NodeId>,
    pub is_anchor: bool,
    pub epoch_generation: u32,
    pub synced: bool,
    pub peers: Vec<PeerRecord>,
}

pub struct CoordinationEngine {
    config: MeshConfig,
    zone: ZoneId,
    identity: Identity,
    status: NodeStatus,
    /// Write-once first-activation time of this node
    seniority: Timestamp,
    table: PeerTable,
    gate: IntegrityGate,
    elector: AnchorElector,
    epochs: EpochKeyManager,
    resync: ResyncThrottle,
    requests: RequestLimiter,
    hint: Option<AnchorHint>,
    resync_wanted: bool,
    outbound: VecDeque<Outbound>,
    events: VecDeque<MeshEvent>,
    stats: EngineStats,
}

impl CoordinationEngine {
    pub fn new(config: MeshConfig, identity: Identity, now: Timestamp) -> KedgeResult<Self> {
        config.validate()?;
        let zone = derive_zone_id(&config.zone);
        let local = identity.node_id();
        tracing::info!(
            "engine starting: node {} persona {} zone {}",
            local,
            config.persona.label(),
            zone
        );
        Ok(CoordinationEngine {
            zone,
            gate: IntegrityGate::new(zone, local),
            elector: AnchorElector::new(config.hysteresis_window),
            epochs: EpochKeyManager::new(config.epoch_rotation_period, config.epoch_grace_period),
            resync: ResyncThrottle::new(config.req_epoch_timeout, config.resync_backoff_cap),
            requests: RequestLimiter::new(config.req_epoch_rate_limit),
            table: PeerTable::new(config.integrity_failure_threshold),
            identity,
            status: NodeStatus::Ready,
            seniority: now,
            hint: None,
            // A fresh node holds no epoch secret and wants one.
            resync_wanted: true,
            outbound: VecDeque::new(),
            events: VecDeque::new(),
            stats: EngineStats::default(),
            config,
        })
    }

    #[inline]
    pub fn local_id(&self) -> NodeId {
        self.identity.node_id()
    }

    #[inline]
    pub fn zone(&self) -> ZoneId {
        self.zone
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    pub fn is_anchor(&self) -> bool {
        self.elector.is_anchor(self.local_id())
    }

    pub fn anchor(&self) -> Option<NodeId> {
        self.elector.anchor().map(|a| a.id)
    }

    /// Update the self-reported health carried in announcements.
    pub fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Queue the periodic announcement.
    ///
    /// Tagged with the current epoch secret when one is held; bare
    /// otherwise (pre-epoch bootstrap or a node still resyncing).
    pub fn pulse(&mut self) {
        let mut ann = Announcement::unsigned(
            self.zone,
            self.local_id(),
            self.identity.verifying_key_bytes(),
            self.config.persona,
            self.status,
            self.config.authority_score,
            self.seniority,
        );
        ann.signature = self.identity.sign(&ann.signed_region());
        if let Some(secret) = self.epochs.current() {
            let message = ann.tag_message(secret.generation);
            ann.epoch = Some(EpochTag {
                generation: secret.generation,
                tag: compute_tag(secret.key(), &message),
            });
        }
        self.outbound.push_back(Outbound::Broadcast(ann.encode()));
        self.stats.pulses_sent += 1;
    }

    /// Feed one received datagram through the protocol.
    ///
    /// Never returns an error: everything unacceptable is dropped
    /// silently and at most reflected in [`EngineStats`].
    pub fn ingest(&mut self, datagram: &[u8], src: SocketAddr, now: Timestamp) {
        let kind = match peek_kind(datagram) {
            Ok(kind) => kind,
            Err(_) => {
                self.stats.malformed_datagrams += 1;
                return;
            }
        };
        match kind {
            MessageKind::Pulse => match Announcement::parse(datagram) {
                Ok(ann) => self.handle_pulse(ann, src, now),
                Err(_) => self.stats.malformed_datagrams += 1,
            },
            MessageKind::EpochRequest => match EpochRequest::parse(datagram) {
                Ok(req) => self.handle_epoch_request(req, src, now),
                Err(_) => self.stats.malformed_datagrams += 1,
            },
            MessageKind::EpochResponse => match EpochResponse::parse(datagram) {
                Ok(resp) => self.handle_epoch_response(resp, src, now),
                Err(_) => self.stats.malformed_datagrams += 1,
            },
        }
    }

    /// Periodic housekeeping: eviction, hint aging, re-election, resync.
    pub fn tick(&mut self, now: Timestamp) {
        for record in self.table.expire(now, self.config.peer_expiry_timeout) {
            self.stats.peers_expired += 1;
            tracing::debug!("peer {} expired", record.id);
            self.events.push_back(MeshEvent::PeerExpired { id: record.id });
        }
        if self
            .hint
            .as_ref()
            .is_some_and(|h| now.since(h.heard_at) > self.config.peer_expiry_timeout)
        {
            self.hint = None;
        }
        self.run_election(now);
        self.maybe_request_epoch(now);
        self.requests.prune(now, self.config.peer_expiry_timeout);
    }

    /// Rotate the epoch secret if this node is the authority and the
    /// period has elapsed. Returns whether a rotation happened.
    pub fn rotate_epoch(&mut self, now: Timestamp) -> bool {
        self.epochs.rotate_if_due(now).is_some()
    }

    pub fn pop_outbound(&mut self) -> Option<Outbound> {
        self.outbound.pop_front()
    }

    pub fn pop_event(&mut self) -> Option<MeshEvent> {
        self.events.pop_front()
    }

    pub fn snapshot(&self) -> MeshSnapshot {
        MeshSnapshot {
            local_id: self.local_id(),
            persona: self.config.persona,
            status: self.status,
            authority_score: self.config.authority_score,
            seniority: self.seniority,
            anchor: self.anchor(),
            is_anchor: self.is_anchor(),
            epoch_generation: self.epochs.generation(),
            synced: self.epochs.synced(),
            peers: self.table.snapshot(),
        }
    }

    fn handle_pulse(&mut self, ann: Announcement, src: SocketAddr, now: Timestamp) {
        match self.gate.assess(&ann, src, &self.table, &self.epochs, now) {
            GateVerdict::Accept { record } => {
                self.stats.pulses_accepted += 1;
                let id = record.id;
                let persona = record.persona;
                match self.table.upsert(record) {
                    UpsertOutcome::Inserted => {
                        tracing::info!("peer {} joined as {}", id, persona.label());
                        self.events.push_back(MeshEvent::PeerJoined { id, persona });
                    }
                    UpsertOutcome::Updated {
                        trust_changed: Some(trust),
                    } => {
                        self.events
                            .push_back(MeshEvent::PeerTrustChanged { id, trust });
                    }
                    UpsertOutcome::Updated {
                        trust_changed: None,
                    } => {}
                }
                self.run_election(now);
            }
            GateVerdict::Unsynced => {
                self.stats.pulses_unsynced += 1;
                // Only a tagged pulse is evidence that an epoch exists
                // which we failed to verify; a bare one means the sender
                // has nothing we could fetch.
                if ann.epoch.is_some() {
                    self.note_anchor_claim(&ann, src, now);
                    self.resync_wanted = true;
                    self.maybe_request_epoch(now);
                }
            }
            GateVerdict::Reject(reason) => {
                self.stats.pulses_dropped += 1;
                tracing::debug!("dropped pulse from {}: {}", src, reason.label());
                if reason.charges_sender() {
                    if let Some(trust) = self.table.mark_failure(ann.sender) {
                        self.events.push_back(MeshEvent::PeerTrustChanged {
                            id: ann.sender,
                            trust,
                        });
                        // Trust changes can unseat a candidate.
                        self.run_election(now);
                    }
                }
            }
        }
    }

    fn handle_epoch_request(&mut self, req: EpochRequest, src: SocketAddr, now: Timestamp) {
        if req.zone != self.zone || req.requester == self.local_id() {
            self.stats.epoch_requests_refused += 1;
            return;
        }
        if !self.epochs.is_authority() {
            self.stats.epoch_requests_refused += 1;
            tracing::trace!("ignoring epoch request from {}: not the authority", req.requester);
            return;
        }
        // Rate limit before any signature work so floods stay cheap.
        if !self.requests.allow(req.requester, now) {
            self.stats.epoch_requests_refused += 1;
            return;
        }
        let Some(requester) = PublicIdentity::from_bytes(&req.public_key) else {
            self.stats.epoch_requests_refused += 1;
            return;
        };
        if requester.node_id() != req.requester
            || !requester.verify(&req.signed_region(), &req.signature)
        {
            self.stats.epoch_requests_refused += 1;
            return;
        }

        let Some(secret) = self.epochs.current() else {
            self.stats.epoch_requests_refused += 1;
            return;
        };
        let generation = secret.generation;
        let valid_from = secret.issued_at;
        let valid_until = secret.expires_at;
        let (exchange_key, sealed_secret) =
            match seal_secret(&req.exchange_key, req.requester, generation, secret.key()) {
                Ok(pair) => pair,
                Err(e) => {
                    self.stats.epoch_requests_refused += 1;
                    tracing::debug!("refusing epoch request from {}: {}", req.requester, e);
                    return;
                }
            };

        let mut resp = EpochResponse::unsigned(
            self.zone,
            self.local_id(),
            self.identity.verifying_key_bytes(),
            exchange_key,
            req.requester,
            generation,
            valid_from,
            valid_until,
            sealed_secret,
        );
        resp.signature = self.identity.sign(&resp.signed_region());
        self.outbound.push_back(Outbound::Unicast(resp.encode(), src));
        self.stats.epoch_requests_served += 1;
        tracing::debug!("served epoch generation {} to {}", generation, req.requester);
    }

    fn handle_epoch_response(&mut self, resp: EpochResponse, src: SocketAddr, now: Timestamp) {
        if resp.zone != self.zone || resp.requester != self.local_id() {
            self.stats.epoch_responses_discarded += 1;
            return;
        }
        // Only the node we actually asked may answer.
        if self.resync.pending_target() != Some(resp.anchor) {
            self.stats.epoch_responses_discarded += 1;
            tracing::debug!("discarding unsolicited epoch response from {}", src);
            return;
        }
        let Some(responder) = PublicIdentity::from_bytes(&resp.public_key) else {
            self.stats.epoch_responses_discarded += 1;
            return;
        };
        if responder.node_id() != resp.anchor
            || !responder.verify(&resp.signed_region(), &resp.signature)
        {
            self.stats.epoch_responses_discarded += 1;
            return;
        }
        // Signature holds: only now is it safe to spend the one-shot
        // exchange half on this response.
        let Some(exchange) = self.resync.take_pending() else {
            self.stats.epoch_responses_discarded += 1;
            return;
        };
        match exchange.open(
            &resp.exchange_key,
            self.local_id(),
            resp.generation,
            &resp.sealed_secret,
        ) {
            Ok(key) => {
                let secret =
                    EpochSecret::from_parts(key, resp.generation, resp.valid_from, resp.valid_until);
                self.epochs.adopt(secret, now);
                self.resync.succeed();
                self.resync_wanted = false;
                self.stats.epoch_responses_adopted += 1;
                tracing::info!(
                    "adopted epoch generation {} from {}",
                    resp.generation,
                    resp.anchor
                );
            }
            Err(e) => {
                self.stats.epoch_responses_discarded += 1;
                tracing::debug!("failed to open sealed epoch secret from {}: {}", resp.anchor, e);
            }
        }
    }

    /// Remember the best-ranked claimant behind an unverifiable tag, as
    /// the address for a later `REQ_EPOCH`.
    fn note_anchor_claim(&mut self, ann: &Announcement, src: SocketAddr, now: Timestamp) {
        if !ann.persona.anchor_eligible() {
            return;
        }
        let rank = AuthorityRank::new(ann.authority_score, ann.seniority, ann.sender);
        let replace = match &self.hint {
            None => true,
            Some(hint) => hint.id == ann.sender || rank > hint.rank,
        };
        if replace {
            self.hint = Some(AnchorHint {
                id: ann.sender,
                addr: src,
                rank,
                heard_at: now,
            });
        }
    }

    /// Whom to address an epoch request to right now.
    fn request_target(&self) -> Option<(NodeId, SocketAddr)> {
        if self.epochs.is_authority() {
            // The minting authority defers only to a claimant that would
            // win the election outright if its claim is genuine.
            return self
                .hint
                .as_ref()
                .filter(|h| h.rank > self.local_rank())
                .map(|h| (h.id, h.addr));
        }
        if let Some(anchor) = self.elector.anchor() {
            if let Some(record) = self.table.get(anchor.id) {
                return Some((record.id, record.addr));
            }
        }
        self.hint.as_ref().map(|h| (h.id, h.addr))
    }

    fn maybe_request_epoch(&mut self, now: Timestamp) {
        if !self.resync_wanted {
            return;
        }
        let Some((target, addr)) = self.request_target() else {
            return;
        };
        if !self.resync.may_attempt(now) {
            return;
        }
        let exchange_key = self.resync.begin(now, target);
        let mut req = EpochRequest::unsigned(
            self.zone,
            self.local_id(),
            self.identity.verifying_key_bytes(),
            exchange_key,
            now,
        );
        req.signature = self.identity.sign(&req.signed_region());
        self.outbound.push_back(Outbound::Unicast(req.encode(), addr));
        self.stats.epoch_requests_sent += 1;
        tracing::debug!("requesting epoch secret from {}", target);
    }

    fn local_rank(&self) -> AuthorityRank {
        AuthorityRank::new(self.config.authority_score, self.seniority, self.local_id())
    }

    /// Pure recomputation of the election over the current view.
    fn run_election(&mut self, now: Timestamp) {
        let mut candidates = self
            .table
            .candidate_ranks(now, self.config.anchor_silence_limit());
        if self.config.persona.anchor_eligible() {
            candidates.push(self.local_rank());
        }
        let was_self = self.elector.is_anchor(self.local_id());
        if let Some(event) = self.elector.evaluate(&candidates, now) {
            if let MeshEvent::AnchorChanged { current, .. } = &event {
                if *current == Some(self.local_id()) {
                    self.epochs.assume_authority(now);
                    self.resync_wanted = false;
                } else {
                    if was_self {
                        self.epochs.resign();
                    }
                    // A different Anchor means a different epoch regime:
                    // fetch its secret even if an older one still verifies.
                    if current.is_some() {
                        self.resync_wanted = true;
                    }
                }
            }
            self.events.push_back(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use kedge_crypto::EpochExchange;
    use kedge_wire::{
        ANNOUNCEMENT_BARE_SIZE, ANNOUNCEMENT_TAGGED_SIZE, EPOCH_REQUEST_SIZE, EPOCH_RESPONSE_SIZE,
    };

    const ZONE_NAME: &str = "engine-test";

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn addr(host: u16) -> SocketAddr {
        format!("[fe80::{host:x}]:19541").parse().unwrap()
    }

    fn engine(persona: Persona, score: u16, now: Timestamp) -> CoordinationEngine {
        let config = MeshConfig {
            zone: ZONE_NAME.to_string(),
            persona,
            authority_score: score,
            ..MeshConfig::default()
        };
        CoordinationEngine::new(config, Identity::generate(), now).unwrap()
    }

    fn pulse_from(
        identity: &Identity,
        persona: Persona,
        score: u16,
        seniority: Timestamp,
    ) -> Announcement {
        let mut ann = Announcement::unsigned(
            derive_zone_id(ZONE_NAME),
            identity.node_id(),
            identity.verifying_key_bytes(),
            persona,
            NodeStatus::Ready,
            score,
            seniority,
        );
        ann.signature = identity.sign(&ann.signed_region());
        ann
    }

    fn drain_events(engine: &mut CoordinationEngine) -> Vec<MeshEvent> {
        std::iter::from_fn(|| engine.pop_event()).collect()
    }

    fn drain_outbound(engine: &mut CoordinationEngine) -> Vec<Outbound> {
        std::iter::from_fn(|| engine.pop_outbound()).collect()
    }

    #[test]
    fn test_lone_node_promotes_after_hysteresis() {
        let mut node = engine(Persona::Hub, 100, ts(100));

        node.pulse();
        match drain_outbound(&mut node).as_slice() {
            [Outbound::Broadcast(bytes)] => assert_eq!(bytes.len(), ANNOUNCEMENT_BARE_SIZE),
            other => panic!("unexpected outbound: {:?}", other),
        }

        node.tick(ts(100));
        assert!(drain_events(&mut node).is_empty());

        node.tick(ts(105));
        assert_eq!(
            drain_events(&mut node),
            vec![MeshEvent::AnchorChanged {
                previous: None,
                current: Some(node.local_id()),
            }]
        );
        assert!(node.is_anchor());

        let snapshot = node.snapshot();
        assert!(snapshot.synced);
        assert_eq!(snapshot.epoch_generation, 1);

        // Announcements carry the epoch tag from now on.
        node.pulse();
        match drain_outbound(&mut node).as_slice() {
            [Outbound::Broadcast(bytes)] => assert_eq!(bytes.len(), ANNOUNCEMENT_TAGGED_SIZE),
            other => panic!("unexpected outbound: {:?}", other),
        }
    }

    #[test]
    fn test_observer_never_promotes_itself() {
        let mut node = engine(Persona::Observer, 0, ts(100));

        node.tick(ts(100));
        node.tick(ts(105));
        node.tick(ts(200));
        assert!(drain_events(&mut node).is_empty());
        assert!(!node.is_anchor());
    }

    #[test]
    fn test_bootstrap_pulse_admits_peer() {
        let mut node = engine(Persona::Relay, 70, ts(100));
        let peer = Identity::generate();
        let ann = pulse_from(&peer, Persona::Relay, 70, ts(50));

        node.ingest(&ann.encode(), addr(2), ts(100));

        assert_eq!(
            drain_events(&mut node),
            vec![MeshEvent::PeerJoined {
                id: peer.node_id(),
                persona: Persona::Relay,
            }]
        );
        let snapshot = node.snapshot();
        assert_eq!(snapshot.peers.len(), 1);
        assert_eq!(snapshot.peers[0].trust, kedge_core::TrustState::Unverified);
        assert_eq!(node.stats().pulses_accepted, 1);
    }

    #[test]
    fn test_foreign_zone_pulse_produces_nothing() {
        let mut node = engine(Persona::Relay, 70, ts(100));
        let peer = Identity::generate();
        let mut ann = pulse_from(&peer, Persona::Relay, 70, ts(50));
        ann.zone = derive_zone_id("somewhere-else");
        ann.signature = peer.sign(&ann.signed_region());

        node.ingest(&ann.encode(), addr(2), ts(100));

        assert!(drain_events(&mut node).is_empty());
        assert!(drain_outbound(&mut node).is_empty());
        assert_eq!(node.stats().pulses_dropped, 1);
        assert!(node.snapshot().peers.is_empty());
    }

    #[test]
    fn test_malformed_datagrams_counted_not_answered() {
        let mut node = engine(Persona::Relay, 70, ts(100));

        node.ingest(&[0xFF, 0x00, 0x01], addr(2), ts(100));
        node.ingest(&[0x00, 0x00], addr(2), ts(100));

        assert_eq!(node.stats().malformed_datagrams, 2);
        assert!(drain_outbound(&mut node).is_empty());
        assert!(drain_events(&mut node).is_empty());
    }

    #[test]
    fn test_repeated_bad_signatures_mistrust_peer() {
        let mut node = engine(Persona::Relay, 70, ts(100));
        let peer = Identity::generate();

        let good = pulse_from(&peer, Persona::Relay, 70, ts(50));
        node.ingest(&good.encode(), addr(2), ts(100));
        drain_events(&mut node);

        let mut forged = good.clone();
        forged.signature[0] ^= 0x01;
        let bytes = forged.encode();
        for second in [101, 102, 103] {
            node.ingest(&bytes, addr(2), ts(second));
        }

        assert_eq!(
            drain_events(&mut node),
            vec![MeshEvent::PeerTrustChanged {
                id: peer.node_id(),
                trust: kedge_core::TrustState::Mistrusted,
            }]
        );
        assert_eq!(node.stats().pulses_dropped, 3);
        assert!(drain_outbound(&mut node).is_empty());
    }

    #[test]
    fn test_unverifiable_tag_requests_epoch_once_per_window() {
        let mut node = engine(Persona::Relay, 70, ts(100));
        let claimant = Identity::generate();
        let foreign = EpochSecret::generate(5, ts(90), Duration::from_secs(60));

        let mut ann = pulse_from(&claimant, Persona::Hub, 100, ts(40));
        let message = ann.tag_message(foreign.generation);
        ann.epoch = Some(EpochTag {
            generation: foreign.generation,
            tag: compute_tag(foreign.key(), &message),
        });
        let bytes = ann.encode();

        node.ingest(&bytes, addr(7), ts(100));

        // No table mutation, but a request went out toward the claimant.
        assert!(drain_events(&mut node).is_empty());
        assert!(node.snapshot().peers.is_empty());
        match drain_outbound(&mut node).as_slice() {
            [Outbound::Unicast(frame, dest)] => {
                assert_eq!(*dest, addr(7));
                assert_eq!(frame.len(), EPOCH_REQUEST_SIZE);
                let req = EpochRequest::parse(frame).unwrap();
                assert_eq!(req.requester, node.local_id());
            }
            other => panic!("unexpected outbound: {:?}", other),
        }

        // A second unverifiable pulse inside the window does not spam.
        node.ingest(&bytes, addr(7), ts(101));
        assert!(drain_outbound(&mut node).is_empty());
        assert_eq!(node.stats().pulses_unsynced, 2);
        assert_eq!(node.stats().epoch_requests_sent, 1);
    }

    #[test]
    fn test_epoch_exchange_end_to_end() {
        let mut anchor = engine(Persona::Hub, 100, ts(100));
        let mut member = engine(Persona::Relay, 70, ts(100));

        anchor.tick(ts(100));
        anchor.tick(ts(105));
        assert!(anchor.is_anchor());
        drain_events(&mut anchor);

        // Anchor's tagged pulse reaches the keyless member.
        anchor.pulse();
        let pulse = match drain_outbound(&mut anchor).as_slice() {
            [Outbound::Broadcast(bytes)] => bytes.clone(),
            other => panic!("unexpected outbound: {:?}", other),
        };
        member.ingest(&pulse, addr(1), ts(105));

        // Member asks the claimant for the secret.
        let request = match drain_outbound(&mut member).as_slice() {
            [Outbound::Unicast(frame, dest)] => {
                assert_eq!(*dest, addr(1));
                frame.clone()
            }
            other => panic!("unexpected outbound: {:?}", other),
        };
        anchor.ingest(&request, addr(2), ts(105));

        // Anchor answers with the sealed secret.
        let response = match drain_outbound(&mut anchor).as_slice() {
            [Outbound::Unicast(frame, dest)] => {
                assert_eq!(*dest, addr(2));
                assert_eq!(frame.len(), EPOCH_RESPONSE_SIZE);
                frame.clone()
            }
            other => panic!("unexpected outbound: {:?}", other),
        };
        member.ingest(&response, addr(1), ts(105));

        let snapshot = member.snapshot();
        assert!(snapshot.synced);
        assert_eq!(snapshot.epoch_generation, 1);
        assert_eq!(member.stats().epoch_responses_adopted, 1);

        // The member's next pulse tag-verifies at the anchor.
        member.pulse();
        let member_pulse = match drain_outbound(&mut member).as_slice() {
            [Outbound::Broadcast(bytes)] => {
                assert_eq!(bytes.len(), ANNOUNCEMENT_TAGGED_SIZE);
                bytes.clone()
            }
            other => panic!("unexpected outbound: {:?}", other),
        };
        anchor.ingest(&member_pulse, addr(2), ts(106));
        assert_eq!(
            drain_events(&mut anchor),
            vec![MeshEvent::PeerJoined {
                id: member.local_id(),
                persona: Persona::Relay,
            }]
        );
        let peers = anchor.snapshot().peers;
        assert_eq!(peers[0].trust, kedge_core::TrustState::Active);
    }

    #[test]
    fn test_anchor_rate_limits_epoch_requests() {
        let mut anchor = engine(Persona::Hub, 100, ts(100));
        anchor.tick(ts(100));
        anchor.tick(ts(105));

        let requester = Identity::generate();
        let exchange = EpochExchange::initiate();
        let mut req = EpochRequest::unsigned(
            derive_zone_id(ZONE_NAME),
            requester.node_id(),
            requester.verifying_key_bytes(),
            exchange.public_bytes(),
            ts(106),
        );
        req.signature = requester.sign(&req.signed_region());
        let bytes = req.encode();

        anchor.ingest(&bytes, addr(3), ts(106));
        anchor.ingest(&bytes, addr(3), ts(107));
        assert_eq!(anchor.stats().epoch_requests_served, 1);
        assert_eq!(anchor.stats().epoch_requests_refused, 1);
        assert_eq!(drain_outbound(&mut anchor).len(), 1);

        // Outside the spacing window the same identifier is served again.
        anchor.ingest(&bytes, addr(3), ts(108));
        assert_eq!(anchor.stats().epoch_requests_served, 2);
    }

    #[test]
    fn test_non_anchor_refuses_epoch_requests() {
        let mut node = engine(Persona::Relay, 70, ts(100));

        let requester = Identity::generate();
        let exchange = EpochExchange::initiate();
        let mut req = EpochRequest::unsigned(
            derive_zone_id(ZONE_NAME),
            requester.node_id(),
            requester.verifying_key_bytes(),
            exchange.public_bytes(),
            ts(100),
        );
        req.signature = requester.sign(&req.signed_region());

        node.ingest(&req.encode(), addr(3), ts(100));
        assert!(drain_outbound(&mut node).is_empty());
        assert_eq!(node.stats().epoch_requests_refused, 1);
    }

    #[test]
    fn test_failover_within_recovery_budget() {
        let mut node = engine(Persona::Relay, 70, ts(95));
        let hub = Identity::generate();

        node.ingest(&pulse_from(&hub, Persona::Hub, 100, ts(10)).encode(), addr(2), ts(100));
        node.ingest(&pulse_from(&hub, Persona::Hub, 100, ts(10)).encode(), addr(2), ts(105));
        assert_eq!(node.anchor(), Some(hub.node_id()));
        drain_events(&mut node);

        // The hub falls silent after its pulse at t=105.
        node.tick(ts(110));
        node.tick(ts(115));
        assert!(drain_events(&mut node).is_empty());

        // Exactly three missed intervals: loss is declared.
        node.tick(ts(120));
        assert_eq!(
            drain_events(&mut node),
            vec![MeshEvent::AnchorChanged {
                previous: Some(hub.node_id()),
                current: None,
            }]
        );

        // One hysteresis window later the survivor takes over: twenty
        // seconds after the last valid hub pulse.
        node.tick(ts(125));
        let events = drain_events(&mut node);
        assert!(events.contains(&MeshEvent::PeerExpired { id: hub.node_id() }));
        assert!(events.contains(&MeshEvent::AnchorChanged {
            previous: None,
            current: Some(node.local_id()),
        }));
        assert!(node.is_anchor());
        assert!(node.snapshot().synced);
    }

    #[test]
    fn test_status_change_carried_in_next_pulse() {
        let mut node = engine(Persona::Courier, 50, ts(100));
        node.set_status(NodeStatus::Stressed);
        node.pulse();

        match drain_outbound(&mut node).as_slice() {
            [Outbound::Broadcast(bytes)] => {
                let ann = Announcement::parse(bytes).unwrap();
                assert_eq!(ann.status, NodeStatus::Stressed);
            }
            other => panic!("unexpected outbound: {:?}", other),
        }
    }
}
