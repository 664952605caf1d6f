//! Transfer manager
//!
//! Owns every transfer this process takes part in, on two queues:
//!
//! - the **send list**: transfers this process serves to remote hosts
//! - the **receive list**: transfers this process downloads
//!
//! All work happens synchronously inside one of three kinds of call: a local
//! request (`request_*`, `register_xfer`, `abort_request_by_id`), an inbound
//! message ([`XferManager::dispatch`]), or the periodic tick
//! ([`XferManager::retransmit_unacked_packets`]). The manager is not shared
//! between threads; whoever owns the event loop owns the manager.
//!
//! # Admission control
//!
//! Sends to one host are limited to `max_outgoing_per_circuit` at a time; the
//! rest wait as pending and are started by the tick as slots free up. A host
//! whose active plus pending sends reach `hard_limit_outgoing_per_circuit` is
//! treated as flooding: its next request disables an untrusted circuit, while
//! a trusted circuit only earns a warning.

use crate::clock::{Clock, SystemClock};
use crate::completion::{Completion, same_completion};
use crate::config::XferConfig;
use crate::error::{ErrorCode, Result};
use crate::host_status::HostStatusTable;
use crate::ids::TransferId;
use crate::list::XferList;
use crate::packet::{
    MAX_INBOUND_PAYLOAD, PacketSize, decode_packet_num, is_last_packet, split_size_prefix,
};
use crate::security::{ExpectedFiles, check_requested_filename};
use crate::throttle::{ACK_COST_BITS, AckThrottle};
use crate::xfer::{FileXfer, MemoryXfer, ObjectXfer, Xfer, XferKind, XferState};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;
use xfer_files::{
    LocationKind, MemoryObjectStore, ObjectKey, ObjectStore, ObjectType, PathResolver,
    has_temp_suffix,
};
use xfer_transport::{
    AbortTransfer, ConfirmPacket, Inbound, MessageKind, MessageSystem, RequestTransfer,
    SendDataPacket, XferMessage, decode_message,
};

/// A confirmation held back by the ack throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckInfo {
    /// Transfer id
    pub id: TransferId,
    /// Sequence number being confirmed
    pub packet_num: u32,
    /// Host to confirm to
    pub remote_host: SocketAddr,
}

/// Parameters of a file download.
#[derive(Debug, Clone)]
pub struct FileRequest {
    /// Where the file lands locally
    pub local_path: PathBuf,
    /// Name on the remote host
    pub remote_filename: String,
    /// Location the remote name is relative to
    pub remote_location: LocationKind,
    /// Host serving the file
    pub remote_host: SocketAddr,
    /// Ask the remote host to delete its copy afterwards
    pub delete_remote_on_completion: bool,
    /// Notified once the download ends
    pub completion: Option<Completion>,
    /// Serve before non-priority downloads
    pub is_priority: bool,
    /// Use the large payload size
    pub use_big_packets: bool,
}

impl FileRequest {
    /// Download `remote_filename` from `remote_host` into `local_path`.
    pub fn new(
        local_path: impl Into<PathBuf>,
        remote_filename: impl Into<String>,
        remote_location: LocationKind,
        remote_host: SocketAddr,
    ) -> Self {
        Self {
            local_path: local_path.into(),
            remote_filename: remote_filename.into(),
            remote_location,
            remote_host,
            delete_remote_on_completion: false,
            completion: None,
            is_priority: false,
            use_big_packets: false,
        }
    }

    /// Notify `completion` when the download ends.
    #[must_use]
    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Ask the remote host to delete its copy afterwards.
    #[must_use]
    pub fn delete_remote_on_completion(mut self) -> Self {
        self.delete_remote_on_completion = true;
        self
    }

    /// Serve before non-priority downloads.
    #[must_use]
    pub fn priority(mut self) -> Self {
        self.is_priority = true;
        self
    }

    /// Use the large payload size.
    #[must_use]
    pub fn big_packets(mut self) -> Self {
        self.use_big_packets = true;
        self
    }
}

/// The transfer manager. See the module docs.
pub struct XferManager<M: MessageSystem> {
    transport: M,
    config: XferConfig,
    resolver: PathResolver,
    object_store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    send_list: XferList,
    receive_list: XferList,
    host_status: HostStatusTable,
    ack_queue: VecDeque<AckInfo>,
    ack_throttle: AckThrottle,
    expected_requests: ExpectedFiles,
    expected_transfers: ExpectedFiles,
}

impl<M: MessageSystem> XferManager<M> {
    /// Create a manager and register its message handlers with `transport`
    ///
    /// Objects are served from an empty in-memory store and time comes from
    /// the system clock until replaced with [`Self::with_object_store`] and
    /// [`Self::with_clock`].
    ///
    /// # Errors
    ///
    /// Returns `XferError::InvalidConfig` if `config` fails validation.
    pub fn new(mut transport: M, config: XferConfig) -> Result<Self> {
        config.validate()?;
        for kind in MessageKind::ALL {
            transport.register_handler(kind);
        }

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ack_throttle = AckThrottle::new(config.effective_ack_throttle_bps(), clock.now());
        tracing::debug!(
            "Xfer manager up: {} outgoing per circuit (hard limit {}), {} incoming",
            config.max_outgoing_per_circuit,
            config.hard_limit_outgoing_per_circuit,
            config.max_incoming_xfers
        );

        Ok(Self {
            transport,
            resolver: config.path_resolver(),
            config,
            object_store: Arc::new(MemoryObjectStore::new()),
            clock,
            send_list: XferList::new(),
            receive_list: XferList::new(),
            host_status: HostStatusTable::new(),
            ack_queue: VecDeque::new(),
            ack_throttle,
            expected_requests: ExpectedFiles::new(),
            expected_transfers: ExpectedFiles::new(),
        })
    }

    /// Use `clock` for every timeout.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.ack_throttle = AckThrottle::new(self.ack_throttle.rate_bps(), clock.now());
        self.clock = clock;
        self
    }

    /// Serve and store objects through `store`.
    #[must_use]
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = store;
        self
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> &XferConfig {
        &self.config
    }

    /// Message system
    #[must_use]
    pub fn transport(&self) -> &M {
        &self.transport
    }

    /// Message system, mutably
    pub fn transport_mut(&mut self) -> &mut M {
        &mut self.transport
    }

    /// Object store
    #[must_use]
    pub fn object_store(&self) -> &Arc<dyn ObjectStore> {
        &self.object_store
    }

    /// Outgoing transfers
    #[must_use]
    pub fn send_list(&self) -> &XferList {
        &self.send_list
    }

    /// Incoming transfers
    #[must_use]
    pub fn receive_list(&self) -> &XferList {
        &self.receive_list
    }

    /// Per-host send counters
    #[must_use]
    pub fn host_status(&self) -> &HostStatusTable {
        &self.host_status
    }

    /// Confirmations held back by the throttle
    #[must_use]
    pub fn ack_queue_len(&self) -> usize {
        self.ack_queue.len()
    }

    // Runtime knobs

    /// Set how many downloads may run at once.
    pub fn set_max_incoming_xfers(&mut self, max: usize) {
        self.config.max_incoming_xfers = max;
    }

    /// Set how many sends per host may run at once.
    pub fn set_max_outgoing_per_circuit(&mut self, max: usize) {
        self.config.max_outgoing_per_circuit = max;
    }

    /// Set the per-host flood threshold (0 disables it).
    pub fn set_hard_limit_outgoing_per_circuit(&mut self, max: usize) {
        self.config.hard_limit_outgoing_per_circuit = max;
    }

    /// Turn confirmation throttling on or off.
    pub fn set_use_ack_throttling(&mut self, enabled: bool) {
        self.config.use_ack_throttling = enabled;
    }

    /// Set the confirmation rate, clamped to what the incoming limit needs.
    pub fn set_ack_throttle_bps(&mut self, bps: f64) {
        self.config.ack_throttle_bps = bps;
        self.ack_throttle
            .set_rate(self.config.effective_ack_throttle_bps());
    }

    // Filename tokens

    /// Authorize one inbound offer of `filename`.
    pub fn expect_file_for_request(&mut self, filename: &str) {
        self.expected_requests.expect(filename);
    }

    /// Consume one inbound offer authorization for `filename`.
    pub fn validate_file_for_request(&mut self, filename: &str) -> bool {
        self.expected_requests.validate(filename)
    }

    /// Authorize one remote request to download `filename` (unrestricted location).
    pub fn expect_file_for_transfer(&mut self, filename: &str) {
        self.expected_transfers.expect(filename);
    }

    /// Consume one download authorization for `filename`.
    pub fn validate_file_for_transfer(&mut self, filename: &str) -> bool {
        self.expected_transfers.validate(filename)
    }

    // Downloads

    /// Download a remote file into a local path
    ///
    /// An identical request (same local path, remote name, location, host and
    /// completion) already on the receive list is not repeated; its id is
    /// returned instead.
    pub fn request_file(&mut self, request: FileRequest) -> TransferId {
        let FileRequest {
            local_path,
            remote_filename,
            remote_location,
            remote_host,
            delete_remote_on_completion,
            completion,
            is_priority,
            use_big_packets,
        } = request;

        let duplicate = self.receive_list.iter().find(|x| {
            x.remote_host() == Some(remote_host)
                && same_completion(x.completion(), completion.as_ref())
                && matches!(x.kind(), XferKind::File(f)
                    if f.matches_local_filename(&local_path)
                        && f.matches_remote_filename(&remote_filename, remote_location))
        });
        if let Some(existing) = duplicate {
            tracing::debug!(
                "Xfer for {} already requested as {}",
                local_path.display(),
                existing.id()
            );
            return existing.id();
        }

        // A stale temp file left over from a crash
        if delete_remote_on_completion && has_temp_suffix(&remote_filename) {
            match fs::remove_file(&local_path) {
                Ok(()) => tracing::info!("Removed stale {}", local_path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Could not remove stale {}: {}", local_path.display(), e),
            }
        }

        let id = TransferId::generate();
        let kind = XferKind::File(FileXfer::receiver(
            local_path,
            remote_filename,
            remote_location,
            delete_remote_on_completion,
            self.resolver.temp_filename(),
        ));
        self.enqueue_download(
            id,
            kind,
            PacketSize::from_big_packets(use_big_packets),
            remote_host,
            completion,
            is_priority,
        );
        id
    }

    /// Download a remote file into memory; the bytes arrive with the completion.
    pub fn request_memory(
        &mut self,
        remote_filename: &str,
        remote_location: LocationKind,
        remote_host: SocketAddr,
        delete_remote_on_completion: bool,
        completion: Option<Completion>,
        is_priority: bool,
    ) -> TransferId {
        let id = TransferId::generate();
        let kind = XferKind::Memory(MemoryXfer::receiver(
            remote_filename,
            remote_location,
            delete_remote_on_completion,
        ));
        self.enqueue_download(
            id,
            kind,
            PacketSize::Default,
            remote_host,
            completion,
            is_priority,
        );
        id
    }

    /// Download a buffer the remote host registered under `id`.
    pub fn request_registered_memory(
        &mut self,
        id: TransferId,
        remote_host: SocketAddr,
        completion: Option<Completion>,
        is_priority: bool,
    ) -> TransferId {
        let kind = XferKind::Memory(MemoryXfer::receiver("", LocationKind::None, false));
        self.enqueue_download(
            id,
            kind,
            PacketSize::Default,
            remote_host,
            completion,
            is_priority,
        );
        id
    }

    /// Download remote object `remote_id` into local object `local_id`
    ///
    /// Deduplicated like [`Self::request_file`].
    pub fn request_object(
        &mut self,
        local_id: Uuid,
        remote_id: Uuid,
        object_type: ObjectType,
        remote_host: SocketAddr,
        completion: Option<Completion>,
        is_priority: bool,
    ) -> TransferId {
        let local = ObjectKey::new(local_id, object_type);
        let remote = ObjectKey::new(remote_id, object_type);

        let duplicate = self.receive_list.iter().find(|x| {
            x.remote_host() == Some(remote_host)
                && same_completion(x.completion(), completion.as_ref())
                && matches!(x.kind(), XferKind::Object(o)
                    if o.matches_local_file(&local) && o.matches_remote_file(&remote))
        });
        if let Some(existing) = duplicate {
            tracing::debug!("Object {} already requested as {}", local, existing.id());
            return existing.id();
        }

        let id = TransferId::generate();
        let kind = XferKind::Object(ObjectXfer::receiver(
            Arc::clone(&self.object_store),
            local,
            remote,
        ));
        self.enqueue_download(
            id,
            kind,
            PacketSize::Default,
            remote_host,
            completion,
            is_priority,
        );
        id
    }

    fn enqueue_download(
        &mut self,
        id: TransferId,
        kind: XferKind,
        packet_size: PacketSize,
        remote_host: SocketAddr,
        completion: Option<Completion>,
        is_priority: bool,
    ) {
        let xfer = Xfer::download(
            id,
            kind,
            packet_size,
            self.config.max_buffer_size,
            remote_host,
            completion,
            self.clock.now(),
        );
        tracing::debug!(
            "Queued {} download {} ({}) from {}",
            xfer.kind().name(),
            id,
            xfer.describe(),
            remote_host
        );
        self.receive_list.add(xfer, is_priority);
        self.start_pending_downloads();
    }

    /// Start pending downloads until `max_incoming_xfers` are in progress
    ///
    /// Candidates are taken back to front, so older and priority requests
    /// go first. A download that fails to start is aborted and its slot
    /// goes to the next candidate.
    pub fn start_pending_downloads(&mut self) {
        let mut in_progress = 0usize;
        let mut pending = Vec::new();
        for xfer in self.receive_list.iter() {
            match xfer.state() {
                XferState::Pending => pending.push(xfer.id()),
                XferState::InProgress => in_progress += 1,
                _ => {}
            }
        }
        pending.reverse();

        let mut start_count = self.config.max_incoming_xfers.saturating_sub(in_progress);
        tracing::debug!(
            "Downloads in progress: {} pending: {} starting: {}",
            in_progress,
            pending.len(),
            start_count.min(pending.len())
        );

        let now = self.clock.now();
        for id in pending {
            if start_count == 0 {
                break;
            }
            start_count -= 1;
            let Some(xfer) = self.receive_list.find_mut(id) else {
                continue;
            };
            if let Err(code) = xfer.start_download(&mut self.transport, now) {
                xfer.abort(code, &mut self.transport);
                self.receive_list.remove(id);
                start_count += 1;
            }
        }
    }

    /// Cancel a download
    ///
    /// The completion fires with `code`. Returns `false` if no download has `id`.
    pub fn abort_request_by_id(&mut self, id: TransferId, code: ErrorCode) -> bool {
        let Some(mut xfer) = self.receive_list.remove(id) else {
            return false;
        };
        if xfer.state() == XferState::InProgress {
            xfer.abort(code, &mut self.transport);
        } else {
            xfer.process_eof(Err(code));
        }
        self.start_pending_downloads();
        true
    }

    // Serving

    /// Offer `data` to a future bare-id request
    ///
    /// The buffer is dropped if nobody requests it within the registration timeout.
    pub fn register_xfer(&mut self, data: Vec<u8>) -> TransferId {
        let id = TransferId::generate();
        let now = self.clock.now();
        let size = data.len();
        let mut xfer = Xfer::new(
            id,
            XferKind::Memory(MemoryXfer::sender(data)),
            PacketSize::Default,
            self.config.max_buffer_size,
            now,
        );
        xfer.register(now);
        self.send_list.push_front(xfer);
        tracing::info!("Registered memory xfer {} ({} bytes)", id, size);
        id
    }

    // Inbound messages

    /// Route an inbound message to its handler.
    pub fn dispatch(&mut self, inbound: Inbound) {
        let Inbound { sender, message } = inbound;
        tracing::trace!("{} from {}", message.kind(), sender);
        match message {
            XferMessage::Request(m) => self.process_file_request(sender, &m),
            XferMessage::Data(m) => self.process_receive_data(sender, &m),
            XferMessage::Confirm(m) => self.process_confirmation(sender, &m),
            XferMessage::Abort(m) => self.process_abort(sender, &m),
        }
    }

    /// Decode an encoded frame and route it
    ///
    /// # Errors
    ///
    /// Returns `XferError::Codec` if the frame does not decode.
    pub fn dispatch_frame(&mut self, sender: SocketAddr, frame: &[u8]) -> Result<()> {
        let message = decode_message(frame)?;
        self.dispatch(Inbound::new(sender, message));
        Ok(())
    }

    /// Serve an inbound request
    ///
    /// Object requests need a known object type; file requests must pass the
    /// filename policy; a request with neither starts a registered memory
    /// transfer. Refused requests are dropped without a reply.
    pub fn process_file_request(&mut self, sender: SocketAddr, request: &RequestTransfer) {
        let id = TransferId::from_raw(request.transfer_id);
        let now = self.clock.now();
        tracing::info!("xfer request id: {} from {}", id, sender);

        let started = if request.object_id.is_nil() && request.filename.is_empty() {
            tracing::info!("Starting memory transfer {} to {}", id, sender);
            match self.send_list.find_mut(id) {
                Some(xfer) if xfer.state() == XferState::Registered => {
                    xfer.set_packet_size(PacketSize::from_big_packets(request.use_big_packets));
                    Some(xfer.start_send(sender, now))
                }
                Some(xfer) => {
                    tracing::warn!(
                        "Memory transfer {} requested again by {} while {}",
                        id,
                        sender,
                        xfer.state()
                    );
                    return;
                }
                None => {
                    tracing::info!("Memory transfer {} not found", id);
                    None
                }
            }
        } else {
            let Some(mut xfer) = self.build_outgoing(sender, request, now) else {
                return;
            };
            let status = xfer.start_send(sender, now);
            self.send_list.push_front(xfer);
            Some(status)
        };

        match started {
            None => {
                let code = ErrorCode::FileNotFound;
                tracing::info!("Aborting xfer {} to {} with error: {}", id, sender, code);
                self.transport.send_message(
                    sender,
                    XferMessage::Abort(AbortTransfer {
                        transfer_id: id.as_u64(),
                        result_code: code.to_wire(),
                    }),
                );
            }
            Some(Err(code)) => {
                if let Some(mut xfer) = self.send_list.remove(id) {
                    xfer.abort(code, &mut self.transport);
                }
            }
            Some(Ok(())) => self.admit_send(id, sender, now),
        }
    }

    fn build_outgoing(
        &mut self,
        sender: SocketAddr,
        request: &RequestTransfer,
        now: Instant,
    ) -> Option<Xfer> {
        let id = TransferId::from_raw(request.transfer_id);
        let packet_size = PacketSize::from_big_packets(request.use_big_packets);

        let kind = if !request.object_id.is_nil() {
            let object_type = ObjectType(request.object_type);
            if !object_type.is_known() {
                tracing::warn!(
                    "Invalid type for xfer request: {}:{} from {}",
                    request.object_id,
                    request.object_type,
                    sender
                );
                return None;
            }
            let key = ObjectKey::new(request.object_id, object_type);
            tracing::info!("Starting object transfer: {} to {}", key, sender);
            XferKind::Object(ObjectXfer::sender(Arc::clone(&self.object_store), key))
        } else {
            let location = LocationKind::from_u8(request.location);
            let approved = match check_requested_filename(
                &request.filename,
                location,
                &mut self.expected_transfers,
            ) {
                Ok(approved) => approved,
                Err(rejection) => {
                    tracing::warn!("{} from {}", rejection, sender);
                    return None;
                }
            };
            let Some(path) = self.resolver.expand(approved.location, &approved.name) else {
                tracing::warn!(
                    "No directory for location {} requested by {}",
                    approved.location,
                    sender
                );
                return None;
            };
            tracing::info!("Starting file transfer: {} to {}", path.display(), sender);
            let delete_on_completion =
                request.delete_on_completion && has_temp_suffix(&approved.name);
            XferKind::File(FileXfer::sender(path, delete_on_completion))
        };

        Some(Xfer::new(
            id,
            kind,
            packet_size,
            self.config.max_buffer_size,
            now,
        ))
    }

    /// Start a freshly requested send, queue it, or treat the host as flooding.
    fn admit_send(&mut self, id: TransferId, host: SocketAddr, now: Instant) {
        let active = self.host_status.num_active(&host);
        let pending = self.host_status.num_pending(&host);
        let Some(xfer) = self.send_list.find_mut(id) else {
            return;
        };

        if active < self.config.max_outgoing_per_circuit {
            let sent = xfer.send_next_packet(&mut self.transport, now);
            match sent {
                Ok(()) => self.host_status.change_active(host, 1),
                Err(code) => {
                    xfer.abort(code, &mut self.transport);
                    self.send_list.remove(id);
                }
            }
            return;
        }

        xfer.close_handle();
        let hard_limit = self.config.hard_limit_outgoing_per_circuit;
        if hard_limit == 0 || active + pending < hard_limit {
            tracing::info!("Queueing xfer {}, {} ahead of this one", id, pending);
            self.host_status.change_pending(host, 1);
            return;
        }

        match self.transport.circuit_info(&host) {
            Some(circuit) if circuit.trusted => {
                tracing::warn!(
                    "Trusted circuit {} has {} active and {} pending xfers, over the limit of {}",
                    host,
                    active,
                    pending,
                    hard_limit
                );
                self.host_status.change_pending(host, 1);
            }
            circuit => {
                tracing::warn!(
                    "Disabling {} circuit {}: {} active and {} pending xfers, over the limit of {}",
                    if circuit.is_some() { "untrusted" } else { "unknown" },
                    host,
                    active,
                    pending,
                    hard_limit
                );
                self.transport.disable_circuit(&host);
                if let Some(mut xfer) = self.send_list.remove(id) {
                    xfer.terminate(ErrorCode::CircuitGone);
                }
            }
        }
    }

    /// Accept the next data packet of a download
    ///
    /// Out-of-order packets are never applied. A repeat of the previous
    /// packet is confirmed again, since its confirmation was probably lost.
    pub fn process_receive_data(&mut self, sender: SocketAddr, packet: &SendDataPacket) {
        let id = TransferId::from_raw(packet.transfer_id);
        if packet.data.len() > MAX_INBOUND_PAYLOAD {
            tracing::warn!(
                "Xfer {} from {} carries {} bytes, over the limit of {}",
                id,
                sender,
                packet.data.len(),
                MAX_INBOUND_PAYLOAD
            );
            return;
        }

        let Some(xfer) = self.receive_list.find_mut(id) else {
            tracing::warn!(
                "received xfer data from {} for non-existent xfer id: {}",
                sender,
                id
            );
            return;
        };
        if xfer.remote_host() != Some(sender) {
            tracing::warn!(
                "Xfer {} data from {}, expected {:?}",
                id,
                sender,
                xfer.remote_host()
            );
            return;
        }

        let packet_num = decode_packet_num(packet.packet_number);
        let expected = xfer.packet_num();
        if packet_num != expected {
            if packet_num == expected - 1 {
                tracing::info!("Reconfirming xfer {} packet {}", id, packet_num);
                self.send_confirm_packet(id, packet_num as u32, sender);
            } else {
                tracing::info!(
                    "Ignoring xfer {} packet {}; expecting {}",
                    id,
                    packet_num,
                    expected
                );
            }
            return;
        }

        let payload = if expected == 0 {
            match split_size_prefix(&packet.data) {
                Some((size, rest)) if size >= 0 => {
                    xfer.set_xfer_size(size as u64);
                    rest
                }
                _ => {
                    tracing::warn!("Xfer {} from {} has a bad size prefix", id, sender);
                    return;
                }
            }
        } else {
            &packet.data[..]
        };

        if let Err(code) = xfer.receive_data(payload) {
            xfer.abort(code, &mut self.transport);
            self.receive_list.remove(id);
            self.start_pending_downloads();
            return;
        }
        xfer.advance_packet();

        if self.config.use_ack_throttling {
            self.ack_queue.push_back(AckInfo {
                id,
                packet_num: packet_num as u32,
                remote_host: sender,
            });
        } else {
            self.send_confirm_packet(id, packet_num as u32, sender);
        }

        if is_last_packet(packet.packet_number) {
            if let Some(mut xfer) = self.receive_list.remove(id) {
                xfer.process_eof(Ok(()));
            }
            self.start_pending_downloads();
        }
    }

    fn send_confirm_packet(&mut self, id: TransferId, packet_num: u32, host: SocketAddr) {
        self.transport.send_message(
            host,
            XferMessage::Confirm(ConfirmPacket {
                transfer_id: id.as_u64(),
                packet_number: packet_num,
            }),
        );
    }

    /// Handle a confirmation for a send
    ///
    /// Only a confirmation of the packet just sent counts; anything else is
    /// a late duplicate and is ignored.
    pub fn process_confirmation(&mut self, sender: SocketAddr, confirm: &ConfirmPacket) {
        let id = TransferId::from_raw(confirm.transfer_id);
        let now = self.clock.now();
        let Some(xfer) = self.send_list.find_mut(id) else {
            tracing::debug!("Confirmation from {} for unknown xfer {}", sender, id);
            return;
        };
        if xfer.remote_host() != Some(sender) {
            tracing::warn!("Xfer {} confirmed by {}, expected {:?}", id, sender, xfer.remote_host());
            return;
        }
        if !xfer.confirms_last_packet(confirm.packet_number) {
            tracing::trace!(
                "Ignoring confirmation of packet {} for xfer {}",
                confirm.packet_number,
                id
            );
            return;
        }

        xfer.acknowledge();
        if xfer.is_final_packet_sent() {
            xfer.complete_send();
            tracing::info!("Xfer {} to {} complete", id, sender);
            self.send_list.remove(id);
            self.host_status.change_active(sender, -1);
        } else if xfer.state() == XferState::InProgress {
            if let Err(code) = xfer.send_next_packet(&mut self.transport, now) {
                xfer.abort(code, &mut self.transport);
                self.send_list.remove(id);
                self.host_status.change_active(sender, -1);
            }
        } else {
            self.send_list.remove(id);
        }
    }

    /// Handle an abort from the remote side of a transfer
    ///
    /// A download ends with the remote code and its slot is refilled; a send
    /// with the same id stops.
    pub fn process_abort(&mut self, sender: SocketAddr, abort: &AbortTransfer) {
        let id = TransferId::from_raw(abort.transfer_id);
        let code =
            ErrorCode::from_wire(abort.result_code).unwrap_or(ErrorCode::Other(abort.result_code));
        tracing::info!("Xfer {} aborted by {}: {}", id, sender, code);

        let from_sender = |x: &Xfer| x.id() == id && x.remote_host() == Some(sender);

        let download = self.receive_list.iter().position(from_sender);
        if let Some(index) = download {
            if let Some(mut xfer) = self.receive_list.remove_at(index) {
                xfer.process_eof(Err(code));
            }
            self.start_pending_downloads();
        }

        let send = self.send_list.iter().position(from_sender);
        if let Some(index) = send {
            if let Some(mut xfer) = self.send_list.remove_at(index) {
                match xfer.state() {
                    XferState::InProgress => self.host_status.change_active(sender, -1),
                    XferState::Pending => self.host_status.change_pending(sender, -1),
                    _ => {}
                }
                xfer.terminate(code);
            }
        }
    }

    // Tick

    /// Periodic tick: time out, retransmit, start queued sends, release
    /// throttled confirmations
    ///
    /// 1. Downloads from hosts whose circuit died end with `CircuitGone`.
    /// 2. Host counters are recounted from the send list.
    /// 3. Each send is checked: an unconfirmed packet older than the packet
    ///    timeout is resent, or the send aborted with `TcpTimeout` once it has
    ///    used up its retries; a registered buffer past the registration
    ///    timeout is dropped; aborted sends are removed; pending sends start
    ///    when their host has a free slot.
    /// 4. Queued confirmations go out as the throttle allows.
    pub fn retransmit_unacked_packets(&mut self) {
        let now = self.clock.now();

        let mut index = 0;
        while index < self.receive_list.len() {
            let dead = self.receive_list.get(index).is_some_and(|x| {
                x.state() == XferState::InProgress
                    && !x
                        .remote_host()
                        .is_some_and(|h| self.transport.is_circuit_alive(&h))
            });
            if dead {
                if let Some(mut xfer) = self.receive_list.remove_at(index) {
                    tracing::info!("Xfer {} found in progress on dead circuit, aborting", xfer.id());
                    xfer.process_eof(Err(ErrorCode::CircuitGone));
                }
            } else {
                index += 1;
            }
        }

        self.host_status.rebuild(&self.send_list);

        let packet_timeout = self.config.packet_timeout();
        let registration_timeout = self.config.registration_timeout();
        let retry_limit = self.config.retry_limit;
        let max_outgoing = self.config.max_outgoing_per_circuit;

        let mut index = 0;
        while index < self.send_list.len() {
            let Some(xfer) = self.send_list.get_mut(index) else {
                break;
            };
            let elapsed = xfer.elapsed_since_send(now);
            let host = xfer.remote_host();

            let remove = if xfer.is_waiting_for_ack() && elapsed > packet_timeout {
                if xfer.retries() > retry_limit {
                    tracing::info!(
                        "Dropping xfer {} to {:?}: packet retransmit limit exceeded",
                        xfer.id(),
                        host
                    );
                    xfer.abort(ErrorCode::TcpTimeout, &mut self.transport);
                    if let Some(h) = host {
                        self.host_status.change_active(h, -1);
                    }
                    true
                } else {
                    tracing::info!(
                        "Resending xfer {} to {:?}: packet {} unconfirmed after {:?}",
                        xfer.id(),
                        host,
                        xfer.packet_num(),
                        elapsed
                    );
                    xfer.resend_last_packet(&mut self.transport, now);
                    false
                }
            } else {
                match (xfer.state(), host) {
                    (XferState::Registered, _) if elapsed > registration_timeout => {
                        tracing::info!("Registered xfer {} never requested, dropped", xfer.id());
                        xfer.abort(ErrorCode::TcpTimeout, &mut self.transport);
                        true
                    }
                    (XferState::Aborted | XferState::Complete, _) => {
                        tracing::warn!("Removing {} xfer {}", xfer.state(), xfer.id());
                        true
                    }
                    (XferState::Pending, Some(h)) if !self.transport.is_circuit_alive(&h) => {
                        tracing::info!("Dropping queued xfer {}: circuit {} is gone", xfer.id(), h);
                        xfer.abort(ErrorCode::CircuitGone, &mut self.transport);
                        self.host_status.change_pending(h, -1);
                        true
                    }
                    (XferState::Pending, Some(h)) if self.host_status.num_active(&h) < max_outgoing => {
                        self.host_status.change_pending(h, -1);
                        let started = match xfer.reopen_handle() {
                            Ok(()) => xfer.send_next_packet(&mut self.transport, now),
                            Err(code) => Err(code),
                        };
                        match started {
                            Ok(()) => {
                                tracing::debug!("Starting queued xfer {} to {}", xfer.id(), h);
                                self.host_status.change_active(h, 1);
                                false
                            }
                            Err(code) => {
                                xfer.abort(code, &mut self.transport);
                                true
                            }
                        }
                    }
                    _ => false,
                }
            };

            if remove {
                self.send_list.remove_at(index);
            } else {
                index += 1;
            }
        }

        self.drain_ack_queue(now);
    }

    fn drain_ack_queue(&mut self, now: Instant) {
        while let Some(ack) = self.ack_queue.front().copied() {
            if self.ack_throttle.would_overflow(ACK_COST_BITS, now) {
                break;
            }
            self.ack_queue.pop_front();
            self.send_confirm_packet(ack.id, ack.packet_num, ack.remote_host);
            self.ack_throttle.consume(ACK_COST_BITS, now);
        }
    }

    // Host accounting

    /// Recount host counters from the send list.
    pub fn update_host_status(&mut self) {
        self.host_status.rebuild(&self.send_list);
    }

    /// Sends in progress to `host`.
    #[must_use]
    pub fn num_active_xfers(&self, host: &SocketAddr) -> usize {
        self.host_status.num_active(host)
    }

    /// Sends queued for `host`.
    #[must_use]
    pub fn num_pending_xfers(&self, host: &SocketAddr) -> usize {
        self.host_status.num_pending(host)
    }

    /// Whether `host` is within 80% of the hard limit.
    #[must_use]
    pub fn is_host_flooded(&self, host: &SocketAddr) -> bool {
        let hard_limit = self.config.hard_limit_outgoing_per_circuit;
        if hard_limit == 0 {
            return false;
        }
        let total = self.num_active_xfers(host) + self.num_pending_xfers(host);
        total as f64 >= 0.8 * hard_limit as f64
    }

    /// Log the per-host counters.
    pub fn log_host_status(&self) {
        if self.host_status.is_empty() {
            return;
        }
        tracing::info!("Outgoing xfers:");
        for status in self.host_status.iter() {
            tracing::info!(
                "    {}  active: {}  pending: {}",
                status.host,
                status.num_active,
                status.num_pending
            );
        }
    }
}
