//! Deterministic in-memory gateway for tests.
//!
//! [`StubGateway`] answers directory lookups from seeded maps, records every
//! outbound message, and serves downloads from an in-memory blob table.
//! [`StubFactory`] hands out the paired event sender so tests can inject
//! upstream events into the pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::event::GatewayEvent;
use crate::gateway::{
    Gateway, GatewayError, GatewayFactory, MediaSource, OutgoingMessage, QrEvent, UploadResponse,
};
use crate::jid::Jid;
use crate::media::MediaKind;

#[derive(Default)]
pub struct StubGateway {
    connected: AtomicBool,
    initialized: AtomicBool,
    device: Mutex<Option<Jid>>,
    lid_to_pn: Mutex<HashMap<String, Jid>>,
    pn_to_lid: Mutex<HashMap<String, Jid>>,
    group_names: Mutex<HashMap<String, String>>,
    contact_names: Mutex<HashMap<String, String>>,
    qr_script: Mutex<Vec<QrEvent>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,

    pub sent: Mutex<Vec<(Jid, OutgoingMessage)>>,
    pub fail_connect: AtomicBool,
    pub fail_logout: AtomicBool,
    pub device_cleared: AtomicBool,
}

impl StubGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            initialized: AtomicBool::new(true),
            ..Self::default()
        })
    }

    pub fn linked(device: Jid) -> Arc<Self> {
        let gw = Self::new();
        *gw.device.lock().unwrap() = Some(device);
        gw
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_device(&self, device: Option<Jid>) {
        *self.device.lock().unwrap() = device;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Seed both directions of the LID↔PN index.
    pub fn link_lid_pn(&self, lid: &Jid, pn: &Jid) {
        self.lid_to_pn
            .lock()
            .unwrap()
            .insert(lid.user.clone(), pn.to_non_ad());
        self.pn_to_lid
            .lock()
            .unwrap()
            .insert(pn.user.clone(), lid.to_non_ad());
    }

    pub fn set_group_name(&self, group: &Jid, name: &str) {
        self.group_names
            .lock()
            .unwrap()
            .insert(group.user.clone(), name.to_string());
    }

    pub fn set_contact_name(&self, contact: &Jid, name: &str) {
        self.contact_names
            .lock()
            .unwrap()
            .insert(contact.user.clone(), name.to_string());
    }

    /// Events replayed (in order) when the QR channel is opened.
    pub fn script_qr(&self, events: Vec<QrEvent>) {
        *self.qr_script.lock().unwrap() = events;
    }

    pub fn insert_blob(&self, direct_path: &str, data: Vec<u8>) {
        self.blobs
            .lock()
            .unwrap()
            .insert(direct_path.to_string(), data);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Gateway for StubGateway {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn device_id(&self) -> Option<Jid> {
        self.device.lock().unwrap().clone()
    }

    fn mark_uninitialized(&self) {
        self.initialized.store(false, Ordering::SeqCst);
    }

    async fn connect(&self) -> Result<(), GatewayError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(GatewayError::Upstream("connect refused".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn logout(&self, _deadline: Duration) -> Result<(), GatewayError> {
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(GatewayError::Upstream("remote logout refused".into()));
        }
        *self.device.lock().unwrap() = None;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_device(&self, _deadline: Duration) -> Result<(), GatewayError> {
        *self.device.lock().unwrap() = None;
        self.device_cleared.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn qr_channel(&self) -> Result<mpsc::UnboundedReceiver<QrEvent>, GatewayError> {
        let (tx, rx) = mpsc::unbounded_channel();
        for event in self.qr_script.lock().unwrap().drain(..) {
            let _ = tx.send(event);
        }
        Ok(rx)
    }

    async fn send_message(
        &self,
        to: Jid,
        message: OutgoingMessage,
        _deadline: Duration,
    ) -> Result<(), GatewayError> {
        if !self.is_connected() {
            return Err(GatewayError::NotConnected);
        }
        self.sent.lock().unwrap().push((to, message));
        Ok(())
    }

    async fn upload(&self, data: Vec<u8>, _kind: MediaKind) -> Result<UploadResponse, GatewayError> {
        Ok(UploadResponse {
            url: "https://mmg.whatsapp.net/v/t62.7117-24/upload-stub?ccb=11".into(),
            direct_path: "/v/t62.7117-24/upload-stub".into(),
            media_key: vec![0x11; 32],
            file_sha256: vec![0x22; 32],
            file_enc_sha256: vec![0x33; 32],
            file_length: data.len() as u64,
        })
    }

    async fn download(&self, source: &MediaSource) -> Result<Vec<u8>, GatewayError> {
        self.blobs
            .lock()
            .unwrap()
            .get(&source.direct_path)
            .cloned()
            .ok_or_else(|| GatewayError::Upstream("media object not found".into()))
    }

    async fn pn_for_lid(&self, lid: &Jid) -> Option<Jid> {
        self.lid_to_pn.lock().unwrap().get(&lid.user).cloned()
    }

    async fn lid_for_pn(&self, pn: &Jid) -> Option<Jid> {
        self.pn_to_lid.lock().unwrap().get(&pn.user).cloned()
    }

    async fn group_name(&self, group: &Jid) -> Option<String> {
        self.group_names.lock().unwrap().get(&group.user).cloned()
    }

    async fn contact_name(&self, contact: &Jid) -> Option<String> {
        self.contact_names.lock().unwrap().get(&contact.user).cloned()
    }
}

/// Factory that always hands out the same stub handle.
pub struct StubFactory {
    gateway: Arc<StubGateway>,
    events: Mutex<Option<mpsc::UnboundedSender<GatewayEvent>>>,
    pub fail_create: AtomicBool,
}

impl StubFactory {
    pub fn new(gateway: Arc<StubGateway>) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            events: Mutex::new(None),
            fail_create: AtomicBool::new(false),
        })
    }

    /// Sender for injecting upstream events; available once a handle exists.
    pub fn event_sender(&self) -> Option<mpsc::UnboundedSender<GatewayEvent>> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl GatewayFactory for StubFactory {
    async fn create(
        &self,
    ) -> Result<(Arc<dyn Gateway>, mpsc::UnboundedReceiver<GatewayEvent>), GatewayError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(GatewayError::Upstream("device store unavailable".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events.lock().unwrap() = Some(tx);
        Ok((self.gateway.clone(), rx))
    }
}
