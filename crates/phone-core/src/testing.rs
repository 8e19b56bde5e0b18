//! In-memory collaborators for tests
//!
//! [`FakeTransport`] and [`FakeSession`] record every side effect as a short
//! operation string (`"hold"`, `"answer(video=false)"`, ...) so tests can
//! assert on ordering and idempotence. Any operation can be made to fail
//! with `fail(op)`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::call::SessionState;
use crate::error::{TransportError, TransportResult};
use crate::media::{DisplayConstraints, MediaStream, MediaTrack};
use crate::transport::{MediaDevices, RemoteIdentity, SipSession, Transport, ANSWER_MODE_HEADER};

#[derive(Debug, Default)]
struct OpLog {
    ops: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
}

impl OpLog {
    fn record(&self, op: impl Into<String>, name: &str) -> TransportResult<()> {
        self.ops.lock().push(op.into());
        if self.failing.lock().contains(name) {
            Err(TransportError::new(name, "injected failure"))
        } else {
            Ok(())
        }
    }

    fn count(&self, op: &str) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|recorded| recorded.as_str() == op || recorded.starts_with(&format!("{op}(")))
            .count()
    }
}

/// Scriptable protocol session
#[derive(Debug)]
pub struct FakeSession {
    id: String,
    identity: RemoteIdentity,
    invitation: bool,
    state: Mutex<SessionState>,
    held: AtomicBool,
    wants_video: AtomicBool,
    video_sender: AtomicBool,
    headers: Mutex<HashMap<String, String>>,
    local_stream: Mutex<Option<MediaStream>>,
    remote_streams: Mutex<Vec<MediaStream>>,
    replaced_tracks: Mutex<Vec<Option<MediaTrack>>>,
    messages: Mutex<Vec<(String, String)>>,
    log: OpLog,
}

impl FakeSession {
    fn new(id: &str, number: &str, invitation: bool, state: SessionState) -> Self {
        Self {
            id: id.to_string(),
            identity: RemoteIdentity::new(number),
            invitation,
            state: Mutex::new(state),
            held: AtomicBool::new(false),
            wants_video: AtomicBool::new(false),
            video_sender: AtomicBool::new(false),
            headers: Mutex::new(HashMap::new()),
            local_stream: Mutex::new(None),
            remote_streams: Mutex::new(Vec::new()),
            replaced_tracks: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            log: OpLog::default(),
        }
    }

    /// A dialog we placed, already in `Establishing`
    pub fn outgoing(id: &str, number: &str) -> Self {
        Self::new(id, number, false, SessionState::Establishing)
    }

    /// A dialog created by a remote invite, in `Initial`
    pub fn incoming(id: &str, number: &str) -> Self {
        Self::new(id, number, true, SessionState::Initial)
    }

    pub fn with_display_name(mut self, name: &str) -> Self {
        self.identity.display_name = Some(name.to_string());
        self
    }

    pub fn with_auto_answer(self) -> Self {
        self.headers
            .lock()
            .insert(ANSWER_MODE_HEADER.to_string(), "Auto".to_string());
        self
    }

    pub fn with_video(self) -> Self {
        self.wants_video.store(true, Ordering::SeqCst);
        self.video_sender.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_local_stream(self, stream: MediaStream) -> Self {
        *self.local_stream.lock() = Some(stream);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }

    pub fn set_held(&self, held: bool) {
        self.held.store(held, Ordering::SeqCst);
    }

    pub fn add_remote_stream(&self, stream: MediaStream) {
        self.remote_streams.lock().push(stream);
    }

    /// Make every later call of `op` fail
    pub fn fail(&self, op: &str) {
        self.log.failing.lock().insert(op.to_string());
    }

    pub fn recover(&self, op: &str) {
        self.log.failing.lock().remove(op);
    }

    pub fn ops(&self) -> Vec<String> {
        self.log.ops.lock().clone()
    }

    /// Number of recorded calls of `op`, with or without arguments
    pub fn count(&self, op: &str) -> usize {
        self.log.count(op)
    }

    pub fn replaced_tracks(&self) -> Vec<Option<MediaTrack>> {
        self.replaced_tracks.lock().clone()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl SipSession for FakeSession {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn is_invitation(&self) -> bool {
        self.invitation
    }

    fn remote_identity(&self) -> RemoteIdentity {
        self.identity.clone()
    }

    fn request_header(&self, name: &str) -> Option<String> {
        self.headers.lock().get(name).cloned()
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    fn wants_video(&self) -> bool {
        self.wants_video.load(Ordering::SeqCst)
    }

    fn has_video(&self) -> bool {
        self.video_sender.load(Ordering::SeqCst)
    }

    fn local_stream(&self) -> Option<MediaStream> {
        self.local_stream.lock().clone()
    }

    fn remote_streams(&self) -> Vec<MediaStream> {
        self.remote_streams.lock().clone()
    }

    async fn answer(&self, with_video: bool) -> TransportResult<()> {
        self.log.record(format!("answer(video={with_video})"), "answer")
    }

    async fn hangup(&self) -> TransportResult<()> {
        self.log.record("hangup", "hangup")
    }

    async fn hold(&self) -> TransportResult<()> {
        self.log.record("hold", "hold")?;
        self.set_held(true);
        Ok(())
    }

    async fn unhold(&self) -> TransportResult<()> {
        self.log.record("unhold", "unhold")?;
        self.set_held(false);
        Ok(())
    }

    async fn mute(&self) -> TransportResult<()> {
        self.log.record("mute", "mute")
    }

    async fn unmute(&self) -> TransportResult<()> {
        self.log.record("unmute", "unmute")
    }

    async fn set_camera(&self, enabled: bool) -> TransportResult<()> {
        self.log.record(format!("camera({enabled})"), "camera")
    }

    async fn send_dtmf(&self, tone: &str) -> TransportResult<()> {
        self.log.record(format!("dtmf({tone})"), "dtmf")
    }

    async fn transfer(&self, target: &str) -> TransportResult<()> {
        self.log.record(format!("transfer({target})"), "transfer")
    }

    async fn refer(&self, other: &dyn SipSession) -> TransportResult<()> {
        self.log.record(format!("refer({})", other.id()), "refer")
    }

    async fn reinvite(&self) -> TransportResult<()> {
        self.log.record("reinvite", "reinvite")
    }

    async fn message(&self, body: &str, content_type: &str) -> TransportResult<()> {
        self.log.record("message", "message")?;
        self.messages
            .lock()
            .push((body.to_string(), content_type.to_string()));
        Ok(())
    }

    async fn replace_video_track(&self, track: Option<MediaTrack>) -> TransportResult<bool> {
        self.log.record("replace_video_track", "replace_video_track")?;
        self.replaced_tracks.lock().push(track);
        Ok(self.video_sender.load(Ordering::SeqCst))
    }
}

/// Scriptable signaling client
#[derive(Debug, Default)]
pub struct FakeTransport {
    registered: AtomicBool,
    heartbeat: AtomicBool,
    prepared: Mutex<VecDeque<Arc<FakeSession>>>,
    dialed: Mutex<Vec<Arc<FakeSession>>>,
    next_id: AtomicU32,
    log: OpLog,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered() -> Self {
        let transport = Self::default();
        transport.registered.store(true, Ordering::SeqCst);
        transport
    }

    /// Hand out `session` on the next `call`
    pub fn prepare_outgoing(&self, session: Arc<FakeSession>) {
        self.prepared.lock().push_back(session);
    }

    pub fn last_dialed(&self) -> Option<Arc<FakeSession>> {
        self.dialed.lock().last().cloned()
    }

    pub fn set_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::SeqCst);
    }

    pub fn fail(&self, op: &str) {
        self.log.failing.lock().insert(op.to_string());
    }

    pub fn recover(&self, op: &str) {
        self.log.failing.lock().remove(op);
    }

    pub fn ops(&self) -> Vec<String> {
        self.log.ops.lock().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.log.count(op)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn register(&self) -> TransportResult<()> {
        self.log.record("register", "register")?;
        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn unregister(&self) -> TransportResult<()> {
        self.log.record("unregister", "unregister")?;
        self.registered.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    fn has_heartbeat(&self) -> bool {
        self.heartbeat.load(Ordering::SeqCst)
    }

    fn start_heartbeat(&self) {
        self.log.ops.lock().push("start_heartbeat".to_string());
        self.heartbeat.store(true, Ordering::SeqCst);
    }

    fn stop_heartbeat(&self) {
        self.log.ops.lock().push("stop_heartbeat".to_string());
        self.heartbeat.store(false, Ordering::SeqCst);
    }

    async fn attempt_reconnection(&self) -> TransportResult<()> {
        self.log.record("reconnect", "reconnect")
    }

    async fn stop(&self) -> TransportResult<()> {
        self.log.record("stop", "stop")
    }

    async fn close(&self) -> TransportResult<()> {
        self.log.record("close", "close")
    }

    async fn call(
        &self,
        number: &str,
        with_video: bool,
        video_only: bool,
    ) -> TransportResult<Arc<dyn SipSession>> {
        self.log.record(
            format!("call({number},video={with_video},video_only={video_only})"),
            "call",
        )?;
        let session = match self.prepared.lock().pop_front() {
            Some(session) => session,
            None => {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                FakeSession::outgoing(&format!("out-{n}"), number).into_arc()
            }
        };
        self.dialed.lock().push(session.clone());
        Ok(session as Arc<dyn SipSession>)
    }

    async fn change_audio_output_device(&self, device_id: &str) -> TransportResult<()> {
        self.log.record(format!("audio_output_device({device_id})"), "audio_output_device")
    }

    async fn change_audio_output_volume(&self, volume: f32) -> TransportResult<()> {
        self.log.record(format!("audio_output_volume({volume})"), "audio_output_volume")
    }

    async fn change_audio_input_device(
        &self,
        device_id: &str,
        session: Option<Arc<dyn SipSession>>,
    ) -> TransportResult<()> {
        let session_id = session.map(|s| s.id()).unwrap_or_default();
        self.log.record(
            format!("audio_input_device({device_id},{session_id})"),
            "audio_input_device",
        )
    }

    async fn change_video_input_device(
        &self,
        device_id: &str,
        session: Option<Arc<dyn SipSession>>,
    ) -> TransportResult<()> {
        let session_id = session.map(|s| s.id()).unwrap_or_default();
        self.log.record(
            format!("video_input_device({device_id},{session_id})"),
            "video_input_device",
        )
    }

    fn user_agent(&self) -> String {
        "fake-transport/1.0".to_string()
    }
}

/// Display capture that returns a canned stream, or `None` to simulate the
/// user cancelling the picker
#[derive(Debug, Default)]
pub struct FakeMediaDevices {
    next: Mutex<Option<MediaStream>>,
    requests: AtomicU32,
}

impl FakeMediaDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn returning(stream: MediaStream) -> Self {
        let devices = Self::default();
        devices.set_next(Some(stream));
        devices
    }

    pub fn set_next(&self, stream: Option<MediaStream>) {
        *self.next.lock() = stream;
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    async fn display_media(&self, _constraints: &DisplayConstraints) -> Option<MediaStream> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.next.lock().take()
    }
}
