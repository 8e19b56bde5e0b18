//! Session registry
//!
//! Two parallel maps keyed by internal call id (protocol session handle and
//! current call snapshot), the ordered queue of unanswered inbound calls and
//! the calls hung up locally that still wait for their terminated
//! notification. Pure storage: all decisions are made by the phone.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::call::{CallId, CallSession};
use crate::transport::SipSession;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<CallId, Arc<dyn SipSession>>,
    calls: DashMap<CallId, CallSession>,
    incoming: Mutex<VecDeque<CallId>>,
    /// Keyed by protocol session id
    terminating: DashMap<String, CallSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, call: CallSession, session: Arc<dyn SipSession>) {
        self.sessions.insert(call.call_id, session);
        self.calls.insert(call.call_id, call);
    }

    /// Replace the snapshot of a tracked call. Untracked calls are ignored.
    pub fn update(&self, call: CallSession) -> bool {
        if !self.sessions.contains_key(&call.call_id) {
            return false;
        }
        self.calls.insert(call.call_id, call);
        true
    }

    pub fn remove(&self, call_id: CallId) -> Option<CallSession> {
        self.sessions.remove(&call_id);
        self.dequeue_incoming(call_id);
        self.calls.remove(&call_id).map(|(_, call)| call)
    }

    pub fn contains(&self, call_id: CallId) -> bool {
        self.sessions.contains_key(&call_id)
    }

    pub fn call(&self, call_id: CallId) -> Option<CallSession> {
        self.calls.get(&call_id).map(|entry| entry.value().clone())
    }

    pub fn session(&self, call_id: CallId) -> Option<Arc<dyn SipSession>> {
        self.sessions.get(&call_id).map(|entry| entry.value().clone())
    }

    pub fn calls(&self) -> Vec<CallSession> {
        let mut calls: Vec<CallSession> = self.calls.iter().map(|entry| entry.value().clone()).collect();
        calls.sort_by_key(|call| call.start_time);
        calls
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Call tracked under the protocol session id `sip_call_id`
    pub fn find_by_sip_id(&self, sip_call_id: &str) -> Option<CallId> {
        self.sessions
            .iter()
            .find(|entry| entry.value().id() == sip_call_id)
            .map(|entry| *entry.key())
    }

    /// Resolve the protocol session a control operation targets.
    ///
    /// An explicit call matches by internal id or protocol session id, and
    /// nothing else. Without one, the current call is used, or the only
    /// tracked call when exactly one exists.
    pub fn resolve(
        &self,
        call: Option<&CallSession>,
        current: Option<CallId>,
    ) -> Option<(CallId, Arc<dyn SipSession>)> {
        let call_id = match call {
            Some(call) if self.contains(call.call_id) => Some(call.call_id),
            Some(call) => self.find_by_sip_id(&call.sip_call_id),
            None => match current.filter(|id| self.contains(*id)) {
                Some(id) => Some(id),
                None if self.sessions.len() == 1 => self.sessions.iter().next().map(|entry| *entry.key()),
                None => None,
            },
        }?;
        self.session(call_id).map(|session| (call_id, session))
    }

    pub fn enqueue_incoming(&self, call_id: CallId) {
        let mut incoming = self.incoming.lock();
        if !incoming.contains(&call_id) {
            incoming.push_back(call_id);
        }
    }

    pub fn dequeue_incoming(&self, call_id: CallId) -> bool {
        let mut incoming = self.incoming.lock();
        let before = incoming.len();
        incoming.retain(|id| *id != call_id);
        incoming.len() != before
    }

    /// Oldest unanswered inbound call
    pub fn oldest_incoming(&self) -> Option<CallId> {
        self.incoming.lock().front().copied()
    }

    pub fn is_incoming(&self, call_id: CallId) -> bool {
        self.incoming.lock().contains(&call_id)
    }

    pub fn incoming_len(&self) -> usize {
        self.incoming.lock().len()
    }

    pub fn park_terminating(&self, call: CallSession) {
        self.terminating.insert(call.sip_call_id.clone(), call);
    }

    pub fn take_terminating(&self, sip_call_id: &str) -> Option<CallSession> {
        self.terminating.remove(sip_call_id).map(|(_, call)| call)
    }

    pub fn clear(&self) {
        self.sessions.clear();
        self.calls.clear();
        self.incoming.lock().clear();
        self.terminating.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{derive_call_session, CallSessionOverrides, LiveSession};
    use crate::testing::FakeSession;

    fn track(registry: &SessionRegistry, sip_id: &str) -> CallSession {
        let session: Arc<dyn SipSession> = FakeSession::incoming(sip_id, "2000").into_arc();
        let call = derive_call_session(
            None,
            &LiveSession::capture(session.as_ref()),
            CallSessionOverrides::none(),
        );
        registry.insert(call.clone(), session);
        call
    }

    #[test]
    fn resolves_explicit_call_by_either_identifier() {
        let registry = SessionRegistry::new();
        let a = track(&registry, "sip-a");
        let b = track(&registry, "sip-b");

        let (id, _) = registry.resolve(Some(&a), Some(b.call_id)).expect("resolves a");
        assert_eq!(id, a.call_id);

        // A snapshot from another phone instance only shares the protocol id
        let mut foreign = b.clone();
        foreign.call_id = uuid::Uuid::new_v4();
        let (id, session) = registry.resolve(Some(&foreign), None).expect("resolves b");
        assert_eq!(id, b.call_id);
        assert_eq!(session.id(), "sip-b");
    }

    #[test]
    fn unknown_explicit_call_does_not_fall_back_to_current() {
        let registry = SessionRegistry::new();
        let a = track(&registry, "sip-a");
        let mut unknown = a.clone();
        unknown.call_id = uuid::Uuid::new_v4();
        unknown.sip_call_id = "sip-zzz".to_string();

        assert!(registry.resolve(Some(&unknown), Some(a.call_id)).is_none());
    }

    #[test]
    fn implicit_resolution_prefers_current_then_sole_entry() {
        let registry = SessionRegistry::new();
        assert!(registry.resolve(None, None).is_none());

        let a = track(&registry, "sip-a");
        assert_eq!(registry.resolve(None, None).map(|(id, _)| id), Some(a.call_id));

        let b = track(&registry, "sip-b");
        assert!(registry.resolve(None, None).is_none());
        assert_eq!(registry.resolve(None, Some(b.call_id)).map(|(id, _)| id), Some(b.call_id));
    }

    #[test]
    fn removal_clears_queue_entry() {
        let registry = SessionRegistry::new();
        let a = track(&registry, "sip-a");
        let b = track(&registry, "sip-b");
        registry.enqueue_incoming(a.call_id);
        registry.enqueue_incoming(b.call_id);
        registry.enqueue_incoming(a.call_id);

        assert_eq!(registry.incoming_len(), 2);
        assert_eq!(registry.oldest_incoming(), Some(a.call_id));

        registry.remove(a.call_id);
        assert!(!registry.contains(a.call_id));
        assert!(registry.call(a.call_id).is_none());
        assert_eq!(registry.oldest_incoming(), Some(b.call_id));
    }
}
