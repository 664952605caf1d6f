//! Transfer units
//!
//! One [`Xfer`] models one transfer, in either direction. The unit owns the
//! protocol bookkeeping (packet number, window buffer, retry count, ack
//! timer, completion); its [`XferKind`] decides where bytes come from and
//! go to. Units never change state on their own: the manager calls into
//! them and decides which list they live on.
//!
//! # Sending
//!
//! ```text
//! start_send        open source, learn total size         -> Pending
//! send_next_packet  packet_num += 1, send it reliably     -> InProgress
//! resend_last_packet  resend verbatim, retries += 1
//! complete_send     final packet confirmed                -> Complete
//! ```
//!
//! # Receiving
//!
//! ```text
//! start_download    prepare destination, send request     -> InProgress
//! set_xfer_size     packet 0 carried the total size
//! receive_data      buffer bytes, flushing when the window fills
//! process_eof       commit or discard destination         -> Complete | Aborted
//! ```

mod file;
mod memory;
mod object;

pub use file::FileXfer;
pub use memory::MemoryXfer;
pub use object::ObjectXfer;

use crate::completion::{Completion, XferOutcome};
use crate::error::{ErrorCode, XferStatus};
use crate::ids::TransferId;
use crate::packet::{
    PacketSize, SIZE_PREFIX_LEN, decode_packet_num, encode_packet_num, encode_size_prefix,
};
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use uuid::Uuid;
use xfer_files::{LocationKind, ObjectKey, ObjectType};
use xfer_transport::{
    AbortTransfer, MessageSystem, RequestTransfer, SendDataPacket, XferMessage,
};

/// Transfer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XferState {
    /// Created, nothing done yet
    Uninitialized,
    /// Memory buffer offered for a future request
    Registered,
    /// Queued, waiting for a concurrency slot
    Pending,
    /// Packets flowing
    InProgress,
    /// Finished successfully
    Complete,
    /// Terminated early
    Aborted,
}

impl fmt::Display for XferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Registered => "registered",
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Complete => "complete",
            Self::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// What a download asks the remote host for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemoteSource {
    pub filename: String,
    pub location: LocationKind,
    pub delete_on_completion: bool,
    pub object: Option<ObjectKey>,
}

/// Byte source and destination of one transfer variant.
///
/// Sender-only and receiver-only operations are both here; a variant
/// constructed for one role answers the other role's calls with an error
/// or a no-op.
pub(crate) trait Endpoint {
    /// Open the source and return its size.
    fn open_source(&mut self) -> Result<u64, ErrorCode>;

    /// Read up to `max_len` source bytes at `offset`.
    fn read_source(&mut self, offset: u64, max_len: usize) -> Result<Vec<u8>, ErrorCode>;

    /// Release the source handle while the send is queued.
    fn close_handle(&mut self) {}

    /// Reacquire the source handle before a queued send starts.
    fn reopen_handle(&mut self) -> XferStatus {
        Ok(())
    }

    /// The final packet was confirmed.
    fn finish_send(&mut self) {}

    /// Received bytes stay in the window instead of going to a sink.
    fn buffers_in_memory(&self) -> bool {
        false
    }

    /// Create (or reset) the destination.
    fn prepare_sink(&mut self) -> XferStatus;

    /// Append flushed bytes to the destination.
    fn write_sink(&mut self, data: &[u8]) -> XferStatus;

    /// Move the destination into its final place.
    fn commit_sink(&mut self) -> XferStatus;

    /// Throw the destination away.
    fn discard_sink(&mut self);

    /// Request fields for a download.
    fn request(&self) -> RemoteSource;

    /// Short human-readable name for logs.
    fn describe(&self) -> String;
}

/// Where a transfer's bytes come from and go to
#[derive(Debug)]
pub enum XferKind {
    /// Local file
    File(FileXfer),
    /// In-process buffer
    Memory(MemoryXfer),
    /// Content-addressed store entry
    Object(ObjectXfer),
}

impl XferKind {
    fn endpoint(&self) -> &dyn Endpoint {
        match self {
            Self::File(x) => x,
            Self::Memory(x) => x,
            Self::Object(x) => x,
        }
    }

    fn endpoint_mut(&mut self) -> &mut dyn Endpoint {
        match self {
            Self::File(x) => x,
            Self::Memory(x) => x,
            Self::Object(x) => x,
        }
    }

    /// Variant name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Memory(_) => "memory",
            Self::Object(_) => "object",
        }
    }
}

/// Bytes of the current window: a slice of the source while sending, the
/// not yet flushed tail of the payload while receiving.
#[derive(Debug, Default)]
struct Window {
    data: Vec<u8>,
    start_offset: u64,
    contains_eof: bool,
}

impl Window {
    fn end_offset(&self) -> u64 {
        self.start_offset + self.data.len() as u64
    }

    fn covers(&self, start: u64, end: u64) -> bool {
        start >= self.start_offset && end <= self.end_offset()
    }

    fn reset(&mut self) {
        self.data.clear();
        self.start_offset = 0;
        self.contains_eof = false;
    }
}

/// One transfer
#[derive(Debug)]
pub struct Xfer {
    id: TransferId,
    remote_host: Option<SocketAddr>,
    packet_num: i32,
    total_size: u64,
    packet_size: PacketSize,
    window: Window,
    max_buffer_size: usize,
    state: XferState,
    waiting_for_ack: bool,
    retries: u32,
    ack_timer: Instant,
    last_sent: Option<SendDataPacket>,
    final_packet_sent: bool,
    announced: bool,
    completion: Option<Completion>,
    kind: XferKind,
}

impl Xfer {
    pub(crate) fn new(
        id: TransferId,
        kind: XferKind,
        packet_size: PacketSize,
        max_buffer_size: usize,
        now: Instant,
    ) -> Self {
        Self {
            id,
            remote_host: None,
            packet_num: 0,
            total_size: 0,
            packet_size,
            window: Window::default(),
            max_buffer_size,
            state: XferState::Uninitialized,
            waiting_for_ack: false,
            retries: 0,
            ack_timer: now,
            last_sent: None,
            final_packet_sent: false,
            announced: false,
            completion: None,
            kind,
        }
    }

    /// A download from `remote_host`, queued as pending.
    pub(crate) fn download(
        id: TransferId,
        kind: XferKind,
        packet_size: PacketSize,
        max_buffer_size: usize,
        remote_host: SocketAddr,
        completion: Option<Completion>,
        now: Instant,
    ) -> Self {
        let mut xfer = Self::new(id, kind, packet_size, max_buffer_size, now);
        xfer.remote_host = Some(remote_host);
        xfer.completion = completion;
        xfer.state = XferState::Pending;
        xfer
    }

    /// Transfer id
    #[must_use]
    pub fn id(&self) -> TransferId {
        self.id
    }

    /// Remote host, once known
    #[must_use]
    pub fn remote_host(&self) -> Option<SocketAddr> {
        self.remote_host
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> XferState {
        self.state
    }

    /// Next packet expected (receiving) or last packet sent (sending)
    #[must_use]
    pub fn packet_num(&self) -> i32 {
        self.packet_num
    }

    /// Total payload size, 0 until known
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Negotiated payload size
    #[must_use]
    pub fn packet_size(&self) -> PacketSize {
        self.packet_size
    }

    /// Resends of the current packet
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Waiting for the last sent packet to be confirmed
    #[must_use]
    pub fn is_waiting_for_ack(&self) -> bool {
        self.waiting_for_ack
    }

    /// Variant
    #[must_use]
    pub fn kind(&self) -> &XferKind {
        &self.kind
    }

    /// Completion handler, if one is still pending
    #[must_use]
    pub fn completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    /// Short human-readable name for logs
    #[must_use]
    pub fn describe(&self) -> String {
        self.kind.endpoint().describe()
    }

    /// Time since the last send (or since registration)
    #[must_use]
    pub fn elapsed_since_send(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.ack_timer)
    }

    pub(crate) fn set_packet_size(&mut self, packet_size: PacketSize) {
        self.packet_size = packet_size;
    }

    pub(crate) fn register(&mut self, now: Instant) {
        self.state = XferState::Registered;
        self.ack_timer = now;
    }

    // Sending

    pub(crate) fn start_send(&mut self, remote_host: SocketAddr, now: Instant) -> XferStatus {
        self.remote_host = Some(remote_host);
        self.announced = true;
        self.packet_num = -1;
        self.window.reset();
        self.last_sent = None;
        self.final_packet_sent = false;
        self.waiting_for_ack = false;
        self.retries = 0;
        self.ack_timer = now;

        let size = self.kind.endpoint_mut().open_source()?;
        if size == 0 {
            return Err(ErrorCode::FileEmpty);
        }
        if size > i32::MAX as u64 {
            tracing::warn!(
                "Xfer {} source {} is too large ({} bytes)",
                self.id,
                self.describe(),
                size
            );
            return Err(ErrorCode::CannotOpenFile);
        }
        self.total_size = size;
        self.state = XferState::Pending;
        Ok(())
    }

    pub(crate) fn close_handle(&mut self) {
        self.kind.endpoint_mut().close_handle();
    }

    pub(crate) fn reopen_handle(&mut self) -> XferStatus {
        self.kind.endpoint_mut().reopen_handle()
    }

    pub(crate) fn send_next_packet<M: MessageSystem>(
        &mut self,
        transport: &mut M,
        now: Instant,
    ) -> XferStatus {
        self.retries = 0;
        self.packet_num += 1;
        self.send_packet(transport, now)
    }

    fn send_packet<M: MessageSystem>(&mut self, transport: &mut M, now: Instant) -> XferStatus {
        let Some(host) = self.remote_host else {
            return Err(ErrorCode::CircuitGone);
        };
        let packet_index = u64::try_from(self.packet_num).map_err(|_| ErrorCode::CannotOpenFile)?;
        let chunk = self.packet_size.bytes() as u64;
        let start = packet_index * chunk;
        if start >= self.total_size {
            tracing::warn!(
                "Xfer {} packet {} starts past the end of {} ({} bytes)",
                self.id,
                self.packet_num,
                self.describe(),
                self.total_size
            );
            return Err(ErrorCode::CannotOpenFile);
        }
        let end = (start + chunk).min(self.total_size);

        if !self.window.covers(start, end) {
            self.fill_window(start)?;
            if !self.window.covers(start, end) {
                tracing::warn!("Xfer {} source {} shrank while sending", self.id, self.describe());
                return Err(ErrorCode::CannotOpenFile);
            }
        }

        let from = (start - self.window.start_offset) as usize;
        let to = (end - self.window.start_offset) as usize;
        let is_last = self.window.contains_eof && to >= self.window.data.len();

        let mut data = Vec::with_capacity(to - from + SIZE_PREFIX_LEN);
        if packet_index == 0 {
            data.extend_from_slice(&encode_size_prefix(self.total_size as i32));
        }
        data.extend_from_slice(&self.window.data[from..to]);

        let packet = SendDataPacket {
            transfer_id: self.id.as_u64(),
            packet_number: encode_packet_num(self.packet_num, is_last),
            data,
        };
        tracing::trace!(
            "Xfer {} sending packet {}{} ({} bytes) to {}",
            self.id,
            self.packet_num,
            if is_last { " (last)" } else { "" },
            packet.data.len(),
            host
        );
        transport.send_reliable(host, XferMessage::Data(packet.clone()));

        self.last_sent = Some(packet);
        self.final_packet_sent = is_last;
        self.waiting_for_ack = true;
        self.ack_timer = now;
        self.state = XferState::InProgress;
        Ok(())
    }

    fn fill_window(&mut self, offset: u64) -> XferStatus {
        let len = self.max_buffer_size.max(self.packet_size.bytes());
        let data = self.kind.endpoint_mut().read_source(offset, len)?;
        self.window.start_offset = offset;
        self.window.contains_eof = offset + data.len() as u64 >= self.total_size;
        self.window.data = data;
        Ok(())
    }

    pub(crate) fn resend_last_packet<M: MessageSystem>(&mut self, transport: &mut M, now: Instant) {
        self.retries += 1;
        if let (Some(host), Some(packet)) = (self.remote_host, &self.last_sent) {
            tracing::trace!(
                "Xfer {} resending packet {} to {} (retry {})",
                self.id,
                decode_packet_num(packet.packet_number),
                host,
                self.retries
            );
            transport.send_reliable(host, XferMessage::Data(packet.clone()));
        }
        self.ack_timer = now;
    }

    /// Whether `packet_number` confirms the packet most recently sent.
    pub(crate) fn confirms_last_packet(&self, packet_number: u32) -> bool {
        self.last_sent
            .as_ref()
            .is_some_and(|p| decode_packet_num(p.packet_number) as u32 == packet_number)
    }

    pub(crate) fn acknowledge(&mut self) {
        self.waiting_for_ack = false;
    }

    pub(crate) fn is_final_packet_sent(&self) -> bool {
        self.final_packet_sent
    }

    pub(crate) fn complete_send(&mut self) {
        let endpoint = self.kind.endpoint_mut();
        endpoint.close_handle();
        endpoint.finish_send();
        self.state = XferState::Complete;
        self.fire(Ok(()), None);
    }

    // Receiving

    pub(crate) fn start_download<M: MessageSystem>(
        &mut self,
        transport: &mut M,
        now: Instant,
    ) -> XferStatus {
        let Some(host) = self.remote_host else {
            return Err(ErrorCode::CircuitGone);
        };
        self.kind.endpoint_mut().prepare_sink()?;
        self.packet_num = 0;
        self.total_size = 0;
        self.window.reset();

        let source = self.kind.endpoint().request();
        let (object_id, object_type) = match source.object {
            Some(key) => (key.id, key.kind.0),
            None => (Uuid::nil(), ObjectType::NONE.0),
        };
        let request = RequestTransfer {
            transfer_id: self.id.as_u64(),
            filename: source.filename,
            location: source.location.to_u8(),
            delete_on_completion: source.delete_on_completion,
            use_big_packets: self.packet_size.is_large(),
            object_id,
            object_type,
        };
        tracing::info!(
            "Requesting xfer {} ({}) from {}",
            self.id,
            self.describe(),
            host
        );
        transport.send_reliable(host, XferMessage::Request(request));

        self.announced = true;
        self.state = XferState::InProgress;
        self.ack_timer = now;
        Ok(())
    }

    pub(crate) fn set_xfer_size(&mut self, size: u64) {
        self.total_size = size;
        if self.kind.endpoint().buffers_in_memory() {
            let reserve = usize::try_from(size).unwrap_or(usize::MAX).min(self.max_buffer_size);
            self.window.data.reserve(reserve);
        }
    }

    pub(crate) fn receive_data(&mut self, data: &[u8]) -> XferStatus {
        if self.window.end_offset() + data.len() as u64 > self.total_size {
            tracing::warn!(
                "Xfer {} overruns its declared size of {} bytes",
                self.id,
                self.total_size
            );
            return Err(ErrorCode::CannotOpenFile);
        }
        if !self.kind.endpoint().buffers_in_memory()
            && self.window.data.len() + data.len() > self.max_buffer_size
        {
            self.flush()?;
        }
        self.window.data.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> XferStatus {
        if self.window.data.is_empty() {
            return Ok(());
        }
        self.kind.endpoint_mut().write_sink(&self.window.data)?;
        self.window.start_offset = self.window.end_offset();
        self.window.data.clear();
        Ok(())
    }

    pub(crate) fn advance_packet(&mut self) {
        self.packet_num += 1;
    }

    /// Finish a download with `result`, commit or discard the destination and
    /// fire the completion. Returns the final status.
    pub(crate) fn process_eof(&mut self, result: XferStatus) -> XferStatus {
        self.window.contains_eof = true;
        let status = result.and_then(|()| self.finish_sink());
        let data = match status {
            Ok(()) => {
                self.state = XferState::Complete;
                self.kind
                    .endpoint()
                    .buffers_in_memory()
                    .then(|| std::mem::take(&mut self.window.data))
            }
            Err(_) => {
                self.kind.endpoint_mut().discard_sink();
                self.state = XferState::Aborted;
                None
            }
        };
        match status {
            Ok(()) => tracing::info!(
                "Xfer {} ({}) complete, {} bytes",
                self.id,
                self.describe(),
                self.total_size
            ),
            Err(code) => tracing::info!("Xfer {} ({}) ended: {}", self.id, self.describe(), code),
        }
        self.fire(status, data);
        status
    }

    fn finish_sink(&mut self) -> XferStatus {
        if self.kind.endpoint().buffers_in_memory() {
            return Ok(());
        }
        self.flush()?;
        self.kind.endpoint_mut().commit_sink()
    }

    // Either direction

    /// Abort with `code`, telling the remote host when it knows about the
    /// transfer and the circuit is not already gone.
    pub(crate) fn abort<M: MessageSystem>(&mut self, code: ErrorCode, transport: &mut M) {
        tracing::info!(
            "Aborting xfer {} ({}) with {:?} - error: {}",
            self.id,
            self.describe(),
            self.remote_host,
            code
        );
        if self.announced && code != ErrorCode::CircuitGone {
            if let Some(host) = self.remote_host {
                transport.send_message(
                    host,
                    XferMessage::Abort(AbortTransfer {
                        transfer_id: self.id.as_u64(),
                        result_code: code.to_wire(),
                    }),
                );
            }
        }
        self.terminate(code);
    }

    /// Abort with `code` without notifying anyone.
    pub(crate) fn terminate(&mut self, code: ErrorCode) {
        let endpoint = self.kind.endpoint_mut();
        endpoint.close_handle();
        endpoint.discard_sink();
        self.waiting_for_ack = false;
        self.state = XferState::Aborted;
        self.fire(Err(code), None);
    }

    fn fire(&mut self, status: XferStatus, data: Option<Vec<u8>>) {
        if let Some(completion) = self.completion.take() {
            completion.invoke(XferOutcome {
                id: self.id,
                status,
                data,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{is_last_packet, split_size_prefix};
    use xfer_transport::RecordingMessageSystem;

    fn host() -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], 13000))
    }

    fn memory_sender(data: Vec<u8>) -> Xfer {
        Xfer::new(
            TransferId::from_raw(7),
            XferKind::Memory(MemoryXfer::sender(data)),
            PacketSize::Default,
            4096,
            Instant::now(),
        )
    }

    fn sent_packets(sys: &mut RecordingMessageSystem) -> Vec<SendDataPacket> {
        sys.drain_messages()
            .into_iter()
            .filter_map(|(_, msg)| match msg {
                XferMessage::Data(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_send_all_packets() {
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();
        let mut xfer = memory_sender(data.clone());
        let mut sys = RecordingMessageSystem::new();
        let now = Instant::now();

        xfer.start_send(host(), now).unwrap();
        assert_eq!(xfer.state(), XferState::Pending);
        assert_eq!(xfer.total_size(), 2500);

        for _ in 0..3 {
            xfer.send_next_packet(&mut sys, now).unwrap();
        }
        assert!(xfer.is_final_packet_sent());
        assert_eq!(xfer.state(), XferState::InProgress);

        let packets = sent_packets(&mut sys);
        assert_eq!(packets.len(), 3);
        let (size, first) = split_size_prefix(&packets[0].data).unwrap();
        assert_eq!(size, 2500);
        assert_eq!(first, &data[..1000]);
        assert_eq!(packets[1].data, &data[1000..2000]);
        assert_eq!(packets[2].data, &data[2000..]);
        assert!(!is_last_packet(packets[1].packet_number));
        assert!(is_last_packet(packets[2].packet_number));
        assert_eq!(decode_packet_num(packets[2].packet_number), 2);
    }

    #[test]
    fn test_window_refills() {
        // Buffer smaller than the payload forces several source reads
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 7) as u8).collect();
        let mut xfer = Xfer::new(
            TransferId::from_raw(1),
            XferKind::Memory(MemoryXfer::sender(data.clone())),
            PacketSize::Default,
            1500,
            Instant::now(),
        );
        let mut sys = RecordingMessageSystem::new();
        let now = Instant::now();
        xfer.start_send(host(), now).unwrap();
        while !xfer.is_final_packet_sent() {
            xfer.send_next_packet(&mut sys, now).unwrap();
        }
        let mut rebuilt = Vec::new();
        for (i, p) in sent_packets(&mut sys).into_iter().enumerate() {
            if i == 0 {
                rebuilt.extend_from_slice(split_size_prefix(&p.data).unwrap().1);
            } else {
                rebuilt.extend_from_slice(&p.data);
            }
        }
        assert_eq!(rebuilt, data);
    }

    #[test]
    fn test_empty_source() {
        let mut xfer = memory_sender(Vec::new());
        assert_eq!(xfer.start_send(host(), Instant::now()), Err(ErrorCode::FileEmpty));
    }

    #[test]
    fn test_resend_is_verbatim() {
        let mut xfer = memory_sender(vec![1; 1500]);
        let mut sys = RecordingMessageSystem::new();
        let now = Instant::now();
        xfer.start_send(host(), now).unwrap();
        xfer.send_next_packet(&mut sys, now).unwrap();
        xfer.resend_last_packet(&mut sys, now);
        xfer.resend_last_packet(&mut sys, now);
        assert_eq!(xfer.retries(), 2);

        let packets = sent_packets(&mut sys);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0], packets[1]);
        assert_eq!(packets[0], packets[2]);
        assert!(xfer.confirms_last_packet(0));
        assert!(!xfer.confirms_last_packet(1));

        // Moving on resets the retry count
        xfer.send_next_packet(&mut sys, now).unwrap();
        assert_eq!(xfer.retries(), 0);
    }

    #[test]
    fn test_memory_download_and_eof() {
        let (completion, mut rx) = Completion::channel();
        let mut xfer = Xfer::download(
            TransferId::from_raw(3),
            XferKind::Memory(MemoryXfer::receiver("abc.tmp", LocationKind::Cache, false)),
            PacketSize::Default,
            4096,
            host(),
            Some(completion),
            Instant::now(),
        );
        let mut sys = RecordingMessageSystem::new();
        xfer.start_download(&mut sys, Instant::now()).unwrap();
        assert_eq!(xfer.state(), XferState::InProgress);

        let (_, msg) = sys.drain_messages().remove(0);
        let XferMessage::Request(request) = msg else {
            panic!("expected a request");
        };
        assert_eq!(request.filename, "abc.tmp");
        assert_eq!(request.location, 4);
        assert!(request.object_id.is_nil());

        xfer.set_xfer_size(6);
        xfer.receive_data(b"abc").unwrap();
        xfer.receive_data(b"def").unwrap();
        assert_eq!(xfer.process_eof(Ok(())), Ok(()));
        assert_eq!(xfer.state(), XferState::Complete);

        let outcome = rx.try_recv().unwrap();
        assert_eq!(outcome.data.as_deref(), Some(&b"abcdef"[..]));
        // Fired once only
        xfer.terminate(ErrorCode::TcpTimeout);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_download_rejects_bytes_past_declared_size() {
        let (completion, mut rx) = Completion::channel();
        let mut xfer = Xfer::download(
            TransferId::from_raw(4),
            XferKind::Memory(MemoryXfer::receiver("abc.tmp", LocationKind::Cache, false)),
            PacketSize::Default,
            4096,
            host(),
            Some(completion),
            Instant::now(),
        );
        xfer.set_xfer_size(4);
        xfer.receive_data(b"abc").unwrap();
        assert_eq!(xfer.receive_data(b"de"), Err(ErrorCode::CannotOpenFile));

        // Nothing past the declared size was kept
        xfer.receive_data(b"d").unwrap();
        assert_eq!(xfer.process_eof(Ok(())), Ok(()));
        assert_eq!(rx.try_recv().unwrap().data.as_deref(), Some(&b"abcd"[..]));
    }

    #[test]
    fn test_abort_notifies_remote() {
        let mut xfer = memory_sender(vec![1; 10]);
        let mut sys = RecordingMessageSystem::new();
        xfer.start_send(host(), Instant::now()).unwrap();
        xfer.abort(ErrorCode::TcpTimeout, &mut sys);
        assert_eq!(xfer.state(), XferState::Aborted);

        let sent = sys.drain_messages();
        assert_eq!(
            sent,
            vec![(
                host(),
                XferMessage::Abort(AbortTransfer {
                    transfer_id: 7,
                    result_code: -23016,
                })
            )]
        );
    }

    #[test]
    fn test_abort_silent_when_circuit_gone_or_unannounced() {
        let mut sys = RecordingMessageSystem::new();

        let mut started = memory_sender(vec![1; 10]);
        started.start_send(host(), Instant::now()).unwrap();
        started.abort(ErrorCode::CircuitGone, &mut sys);

        let mut registered = memory_sender(vec![1; 10]);
        registered.register(Instant::now());
        registered.abort(ErrorCode::TcpTimeout, &mut sys);

        assert_eq!(sys.pending(), 0);
    }
}
