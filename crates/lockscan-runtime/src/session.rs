//! [`ScanSession`] – the capture loop / input driver.
//!
//! ```text
//!            scan()                      record published
//!   Idle ───────────────▶ Scanning ─────────────────────────▶ Done
//!    ▲  ▲                    │  cancel / device fault /          │
//!    │  └────────────────────┘  abort on bad payload             │ reset()
//!    │                                                           │
//!    │ submit() ok / cancel_entry()                              ▼
//!    └──────────────────── FormEntry ◀──── begin_entry() ──── Idle/Done
//! ```
//!
//! A capture session pulls frames until a decoded payload parses into a
//! [`ScanRecord`].  That record is published once, the device is released
//! and the session ends in [`ScanState::Done`].  There is no timeout and no
//! attempt limit: the loop runs until it finds a record, the device fails,
//! or the caller raises the cancel flag.
//!
//! What happens to a payload that fails to parse is governed by
//! [`ParseFailurePolicy`]: `Continue` reports it and moves on, `Abort` ends
//! the session.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use lockscan_hal::ImageSequenceCamera;
//! use lockscan_middleware::{EventBus, MqttConfig, MqttPublisher};
//! use lockscan_perception::QrDecoder;
//! use lockscan_runtime::{ScanSession, SessionConfig};
//!
//! # async fn run() -> Result<(), lockscan_types::ScanError> {
//! let publisher = Arc::new(MqttPublisher::connect(&MqttConfig::default())?);
//! let mut session = ScanSession::new(
//!     SessionConfig::default(),
//!     Box::new(QrDecoder::new()),
//!     publisher,
//!     EventBus::default(),
//! );
//! let camera = ImageSequenceCamera::open("frames/")?;
//! let record = session.scan(Box::new(camera), &AtomicBool::new(false)).await?;
//! println!("published record for {}", record.subject_id);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lockscan_hal::{Camera, CaptureHandle};
use lockscan_middleware::{EventBus, Publisher};
use lockscan_perception::Decoder;
use lockscan_types::{
    ParseFailurePolicy, PublishEnvelope, ScanError, ScanRecord, ScanState, SessionEvent,
    SessionEventPayload, parse_record, validate_topic,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Roughly one display refresh at 30 fps.
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Per-session behaviour.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Broker topic every record is published to.
    pub topic: String,
    /// Add the `"state": true` active flag to published payloads.
    pub include_state: bool,
    pub on_parse_error: ParseFailurePolicy,
    /// Pause between frames.  Zero polls as fast as the device delivers.
    pub frame_interval: Duration,
}

impl SessionConfig {
    /// Reject settings no record could ever be published with.
    ///
    /// # Errors
    ///
    /// [`ScanError::Config`] for an empty or wildcard topic.
    pub fn validate(&self) -> Result<(), ScanError> {
        validate_topic(&self.topic)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            topic: "lockit".to_string(),
            include_state: true,
            on_parse_error: ParseFailurePolicy::Continue,
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

/// The UI-agnostic scan pipeline driver.
pub struct ScanSession {
    id: Uuid,
    state: ScanState,
    config: SessionConfig,
    decoder: Box<dyn Decoder>,
    publisher: Arc<dyn Publisher>,
    bus: EventBus,
}

impl ScanSession {
    pub fn new(
        config: SessionConfig,
        decoder: Box<dyn Decoder>,
        publisher: Arc<dyn Publisher>,
        bus: EventBus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: ScanState::Idle,
            config,
            decoder,
            publisher,
            bus,
        }
    }

    /// Identifier stamped on every event this session emits.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run one capture session on `camera`.
    ///
    /// Returns the published record.  The camera is released exactly once
    /// before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// * [`ScanError::InvalidState`] – called while scanning or in form entry.
    /// * [`ScanError::Config`] – the session config is unusable; nothing is
    ///   captured.
    /// * [`ScanError::Cancelled`] – `cancel` was raised; state is `Idle`.
    /// * [`ScanError::DeviceUnavailable`] – the device stopped delivering
    ///   frames; state is `Idle`.
    /// * [`ScanError::MalformedRecord`] – a payload failed to parse under
    ///   [`ParseFailurePolicy::Abort`]; state is `Idle`.
    /// * [`ScanError::BrokerConnect`] / [`ScanError::BrokerPublish`] – a
    ///   record was found but could not be published; state is `Done`.
    #[instrument(name = "scan_session", skip_all, fields(session_id = %self.id, device = %camera.id()))]
    pub async fn scan(
        &mut self,
        camera: Box<dyn Camera>,
        cancel: &AtomicBool,
    ) -> Result<ScanRecord, ScanError> {
        let mut handle = CaptureHandle::new(camera);
        self.require(&[ScanState::Idle, ScanState::Done], "start scanning")?;
        self.check_config()?;
        self.transition(ScanState::Scanning);

        let found = self.capture_until_record(&mut handle, cancel).await;
        handle.release();

        match found {
            Ok(record) => {
                let published = self.publish_record(record).await;
                self.transition(ScanState::Done);
                published
            }
            Err(e) => {
                self.transition(ScanState::Idle);
                Err(e)
            }
        }
    }

    /// Enter manual form entry.
    pub fn begin_entry(&mut self) -> Result<(), ScanError> {
        self.require(&[ScanState::Idle, ScanState::Done], "begin form entry")?;
        self.check_config()?;
        self.transition(ScanState::FormEntry);
        Ok(())
    }

    /// Submit one manually typed code.
    ///
    /// A malformed code leaves the session in `FormEntry` so the operator can
    /// try again.  A well-formed code is published and the session returns
    /// to `Idle`, whether or not the publish succeeded.
    #[instrument(name = "form_entry_submit", skip_all, fields(session_id = %self.id))]
    pub async fn submit(&mut self, text: &str) -> Result<ScanRecord, ScanError> {
        self.require(&[ScanState::FormEntry], "submit a code")?;

        let record = match parse_record(text) {
            Ok(record) => record,
            Err(e) => {
                self.reject(&e);
                return Err(e);
            }
        };

        let result = self.publish_record(record).await;
        self.transition(ScanState::Idle);
        result
    }

    /// Leave form entry without submitting.
    pub fn cancel_entry(&mut self) -> Result<(), ScanError> {
        self.require(&[ScanState::FormEntry], "leave form entry")?;
        self.transition(ScanState::Idle);
        Ok(())
    }

    /// Return a finished session to `Idle` for a new scan.
    pub fn reset(&mut self) -> Result<(), ScanError> {
        self.require(&[ScanState::Idle, ScanState::Done], "reset")?;
        self.transition(ScanState::Idle);
        Ok(())
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    async fn capture_until_record(
        &self,
        handle: &mut CaptureHandle,
        cancel: &AtomicBool,
    ) -> Result<ScanRecord, ScanError> {
        let mut frames: u64 = 0;
        loop {
            if cancel.load(Ordering::SeqCst) {
                info!(frames, "scan cancelled");
                return Err(ScanError::Cancelled);
            }

            let frame = match handle.capture() {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(frames, error = %e, "capture device failed");
                    let details = match &e {
                        ScanError::DeviceUnavailable { details, .. } => details.clone(),
                        other => other.to_string(),
                    };
                    self.emit(SessionEventPayload::DeviceFault {
                        device: handle.id().to_string(),
                        details,
                    });
                    return Err(e);
                }
            };
            frames += 1;

            for payload in self.decoder.decode(&frame) {
                match parse_record(payload.as_str()) {
                    Ok(record) => {
                        info!(
                            frames,
                            subject_id = %record.subject_id,
                            resource_id = %record.resource_id,
                            "QR code detected"
                        );
                        return Ok(record);
                    }
                    Err(e) => {
                        self.reject(&e);
                        if self.config.on_parse_error == ParseFailurePolicy::Abort {
                            return Err(e);
                        }
                    }
                }
            }

            if self.config.frame_interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.config.frame_interval).await;
            }
        }
    }

    async fn publish_record(&self, record: ScanRecord) -> Result<ScanRecord, ScanError> {
        let envelope =
            match PublishEnvelope::new(record, &self.config.topic, self.config.include_state) {
                Ok(envelope) => envelope,
                Err(e) => return Err(self.publish_failed(e)),
            };

        if let Err(e) = self.publisher.publish(&envelope).await {
            return Err(self.publish_failed(e));
        }

        let record = envelope.record().clone();
        self.emit(SessionEventPayload::RecordPublished {
            topic: envelope.topic().to_string(),
            subject_id: record.subject_id.clone(),
            resource_id: record.resource_id.clone(),
        });
        Ok(record)
    }

    fn publish_failed(&self, error: ScanError) -> ScanError {
        error!(error = %error, "record was not published");
        self.emit(SessionEventPayload::PublishFailed {
            reason: error.to_string(),
        });
        error
    }

    fn reject(&self, error: &ScanError) {
        warn!(error = %error, "rejected payload");
        self.emit(SessionEventPayload::PayloadRejected {
            reason: error.to_string(),
        });
    }

    fn check_config(&self) -> Result<(), ScanError> {
        self.config.validate().inspect_err(|e| {
            warn!(error = %e, "session config rejected");
        })
    }

    fn require(&self, allowed: &[ScanState], operation: &'static str) -> Result<(), ScanError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ScanError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, to: ScanState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!(session_id = %self.id, %from, %to, "state change");
        self.emit(SessionEventPayload::StateChanged { from, to });
    }

    fn emit(&self, payload: SessionEventPayload) {
        self.bus.emit(SessionEvent::new(self.id, payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use lockscan_hal::{CameraFrame, ImageSequenceCamera, SimCamera, SimCameraCounters};
    use lockscan_perception::QrDecoder;
    use lockscan_types::DecodedPayload;
    use serde_json::{Value, json};

    // ── Test doubles ─────────────────────────────────────────────────────────

    /// Returns one scripted batch of payloads per decoded frame, then nothing.
    struct ScriptedDecoder(Mutex<VecDeque<Vec<&'static str>>>);

    impl ScriptedDecoder {
        fn new(script: Vec<Vec<&'static str>>) -> Box<Self> {
            Box::new(Self(Mutex::new(script.into())))
        }
    }

    impl Decoder for ScriptedDecoder {
        fn decode(&self, _frame: &CameraFrame) -> Vec<DecodedPayload> {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default()
                .into_iter()
                .map(DecodedPayload::from)
                .collect()
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<PublishEnvelope>>,
        fail_with: Option<ScanError>,
    }

    impl RecordingPublisher {
        fn failing(error: ScanError) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                fail_with: Some(error),
            })
        }

        fn sent(&self) -> Vec<PublishEnvelope> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, envelope: &PublishEnvelope) -> Result<(), ScanError> {
            self.sent.lock().unwrap().push(envelope.clone());
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    fn fast_config(policy: ParseFailurePolicy) -> SessionConfig {
        SessionConfig {
            on_parse_error: policy,
            frame_interval: Duration::ZERO,
            ..SessionConfig::default()
        }
    }

    fn session_with(
        config: SessionConfig,
        script: Vec<Vec<&'static str>>,
        publisher: Arc<RecordingPublisher>,
    ) -> (ScanSession, EventBus) {
        let bus = EventBus::default();
        let session = ScanSession::new(config, ScriptedDecoder::new(script), publisher, bus.clone());
        (session, bus)
    }

    fn camera(frames: usize) -> (Box<dyn Camera>, SimCameraCounters) {
        let cam = SimCamera::new("sim0").with_blank_frames(frames);
        let counters = cam.counters();
        (Box::new(cam), counters)
    }

    fn not_cancelled() -> AtomicBool {
        AtomicBool::new(false)
    }

    /// Black-on-white QR symbol for `text`, 6 px per module with a 4-module
    /// quiet zone.  Returns the side length and Gray8 pixels.
    fn render_qr(text: &str) -> (u32, Vec<u8>) {
        const SCALE: usize = 6;
        const QUIET: usize = 4;
        let code = qrcode::QrCode::new(text.as_bytes()).expect("encode qr");
        let modules = code.width();
        let side = (modules + 2 * QUIET) * SCALE;
        let mut pixels = vec![255u8; side * side];
        for (i, color) in code.to_colors().into_iter().enumerate() {
            if !matches!(color, qrcode::Color::Dark) {
                continue;
            }
            let (mx, my) = ((i % modules + QUIET) * SCALE, (i / modules + QUIET) * SCALE);
            for y in my..my + SCALE {
                pixels[y * side + mx..y * side + mx + SCALE].fill(0);
            }
        }
        (side as u32, pixels)
    }

    // ── Capture sessions ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn valid_code_is_published_once_and_device_released() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, _bus) = session_with(
            fast_config(ParseFailurePolicy::Continue),
            vec![vec!["u1-box9-4321"]],
            publisher.clone(),
        );
        let (cam, counters) = camera(5);

        let record = session.scan(cam, &not_cancelled()).await.expect("scan");

        assert_eq!(record, ScanRecord::new("u1", "box9", "4321"));
        assert_eq!(session.state(), ScanState::Done);
        assert_eq!(counters.captures(), 1);
        assert_eq!(counters.releases(), 1);

        let sent = publisher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].topic(), "lockit");
        let body: Value = serde_json::from_slice(sent[0].payload()).unwrap();
        assert_eq!(
            body,
            json!({"user_id": "u1", "id": "box9", "pin": "4321", "state": true})
        );
    }

    #[tokio::test]
    async fn two_part_code_is_never_published() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, _bus) = session_with(
            fast_config(ParseFailurePolicy::Continue),
            vec![vec!["onlytwoparts-here"]],
            publisher.clone(),
        );
        let (cam, counters) = camera(3);

        let err = session.scan(cam, &not_cancelled()).await.unwrap_err();

        // The script runs dry after three blank frames.
        assert!(matches!(err, ScanError::DeviceUnavailable { .. }));
        assert!(publisher.sent().is_empty());
        assert_eq!(counters.captures(), 3);
        assert_eq!(counters.releases(), 1);
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn four_part_code_aborts_under_abort_policy() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, _bus) = session_with(
            fast_config(ParseFailurePolicy::Abort),
            vec![vec!["a-b-c-d"], vec!["u1-box9-4321"]],
            publisher.clone(),
        );
        let (cam, counters) = camera(3);

        let err = session.scan(cam, &not_cancelled()).await.unwrap_err();

        assert_eq!(err, ScanError::MalformedRecord { parts: 4, empty_parts: 0 });
        assert!(publisher.sent().is_empty());
        assert_eq!(counters.captures(), 1);
        assert_eq!(counters.releases(), 1);
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn continue_policy_keeps_scanning_after_bad_frame() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, bus) = session_with(
            fast_config(ParseFailurePolicy::Continue),
            vec![vec!["a-b-c-d"], vec![], vec!["u1-box9-4321"]],
            publisher.clone(),
        );
        let mut events = bus.subscribe();
        let (cam, counters) = camera(10);

        let record = session.scan(cam, &not_cancelled()).await.expect("scan");

        assert_eq!(record.resource_id, "box9");
        assert_eq!(publisher.sent().len(), 1);
        assert_eq!(counters.captures(), 3);
        assert_eq!(counters.releases(), 1);

        let mut rejected = 0;
        while let Some(event) = events.try_recv() {
            if matches!(event.payload, SessionEventPayload::PayloadRejected { .. }) {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 1);
    }

    #[tokio::test]
    async fn first_valid_payload_in_frame_wins() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, _bus) = session_with(
            fast_config(ParseFailurePolicy::Continue),
            vec![vec!["garbage", "s1-door2-0000", "s9-door9-9999"]],
            publisher.clone(),
        );
        let (cam, _counters) = camera(1);

        let record = session.scan(cam, &not_cancelled()).await.expect("scan");

        assert_eq!(record, ScanRecord::new("s1", "door2", "0000"));
        assert_eq!(publisher.sent().len(), 1);
    }

    #[tokio::test]
    async fn raised_cancel_flag_stops_before_capturing() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, _bus) = session_with(
            fast_config(ParseFailurePolicy::Continue),
            vec![vec!["u1-box9-4321"]],
            publisher.clone(),
        );
        let (cam, counters) = camera(1);

        let err = session.scan(cam, &AtomicBool::new(true)).await.unwrap_err();

        assert_eq!(err, ScanError::Cancelled);
        assert_eq!(counters.captures(), 0);
        assert_eq!(counters.releases(), 1);
        assert_eq!(session.state(), ScanState::Idle);
        assert!(publisher.sent().is_empty());
    }

    #[tokio::test]
    async fn cancel_interrupts_running_scan() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, _bus) = session_with(
            SessionConfig {
                frame_interval: Duration::from_millis(1),
                ..SessionConfig::default()
            },
            Vec::new(),
            publisher.clone(),
        );
        let cam = SimCamera::new("sim0").with_blank_frames(1).repeat_last();
        let counters = cam.counters();
        let cancel = Arc::new(AtomicBool::new(false));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.store(true, Ordering::SeqCst);
        });

        let err = session.scan(Box::new(cam), &cancel).await.unwrap_err();

        assert_eq!(err, ScanError::Cancelled);
        assert!(counters.captures() > 0);
        assert_eq!(counters.releases(), 1);
    }

    #[tokio::test]
    async fn publish_failure_is_surfaced_and_session_is_done() {
        let publisher = RecordingPublisher::failing(ScanError::BrokerPublish("offline".into()));
        let (mut session, bus) = session_with(
            fast_config(ParseFailurePolicy::Continue),
            vec![vec!["u1-box9-4321"]],
            publisher.clone(),
        );
        let mut events = bus.subscribe();
        let (cam, counters) = camera(2);

        let err = session.scan(cam, &not_cancelled()).await.unwrap_err();

        assert_eq!(err, ScanError::BrokerPublish("offline".into()));
        assert_eq!(publisher.sent().len(), 1);
        assert_eq!(counters.releases(), 1);
        assert_eq!(session.state(), ScanState::Done);

        let mut failed = false;
        while let Some(event) = events.try_recv() {
            failed |= matches!(event.payload, SessionEventPayload::PublishFailed { .. });
        }
        assert!(failed, "PublishFailed must be emitted");
    }

    #[tokio::test]
    async fn device_fault_is_reported_on_bus() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, bus) =
            session_with(fast_config(ParseFailurePolicy::Continue), Vec::new(), publisher);
        let mut events = bus.subscribe();
        let (cam, counters) = camera(0);

        let err = session.scan(cam, &not_cancelled()).await.unwrap_err();

        assert!(matches!(err, ScanError::DeviceUnavailable { .. }));
        assert_eq!(counters.releases(), 1);
        let mut fault_device = None;
        while let Some(event) = events.try_recv() {
            if let SessionEventPayload::DeviceFault { device, .. } = event.payload {
                fault_device = Some(device);
            }
        }
        assert_eq!(fault_device.as_deref(), Some("sim0"));
    }

    #[tokio::test]
    async fn state_transitions_are_emitted_in_order() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, bus) = session_with(
            fast_config(ParseFailurePolicy::Continue),
            vec![vec!["u1-box9-4321"]],
            publisher,
        );
        let mut events = bus.subscribe_session(session.id());
        let (cam, _counters) = camera(1);

        session.scan(cam, &not_cancelled()).await.expect("scan");

        let mut transitions = Vec::new();
        let mut published = None;
        while let Some(event) = events.try_recv() {
            match event.payload {
                SessionEventPayload::StateChanged { from, to } => transitions.push((from, to)),
                SessionEventPayload::RecordPublished {
                    topic, subject_id, ..
                } => published = Some((topic, subject_id)),
                _ => {}
            }
        }
        assert_eq!(
            transitions,
            vec![
                (ScanState::Idle, ScanState::Scanning),
                (ScanState::Scanning, ScanState::Done)
            ]
        );
        assert_eq!(published, Some(("lockit".to_string(), "u1".to_string())));
    }

    #[tokio::test]
    async fn done_session_can_scan_again() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, _bus) = session_with(
            fast_config(ParseFailurePolicy::Continue),
            vec![vec!["a-b-c"], vec!["d-e-f"]],
            publisher.clone(),
        );

        let (cam, _) = camera(1);
        session.scan(cam, &not_cancelled()).await.expect("first scan");
        session.reset().expect("reset");
        assert_eq!(session.state(), ScanState::Idle);

        let (cam, _) = camera(1);
        let record = session.scan(cam, &not_cancelled()).await.expect("second scan");
        assert_eq!(record, ScanRecord::new("d", "e", "f"));
        assert_eq!(publisher.sent().len(), 2);
    }

    #[tokio::test]
    async fn state_flag_can_be_disabled() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, _bus) = session_with(
            SessionConfig {
                include_state: false,
                topic: "doors".to_string(),
                ..fast_config(ParseFailurePolicy::Continue)
            },
            vec![vec!["42-7-1234"]],
            publisher.clone(),
        );
        let (cam, _) = camera(1);

        session.scan(cam, &not_cancelled()).await.expect("scan");

        let sent = publisher.sent();
        assert_eq!(sent[0].topic(), "doors");
        let body: Value = serde_json::from_slice(sent[0].payload()).unwrap();
        assert_eq!(body, json!({"user_id": "42", "id": "7", "pin": "1234"}));
    }

    #[tokio::test]
    async fn bad_topic_fails_before_any_capture() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, bus) = session_with(
            SessionConfig {
                topic: String::new(),
                ..fast_config(ParseFailurePolicy::Continue)
            },
            vec![vec!["u1-box9-4321"]],
            publisher.clone(),
        );
        let mut events = bus.subscribe();
        let (cam, counters) = camera(5);

        let err = session.scan(cam, &not_cancelled()).await.unwrap_err();

        assert!(matches!(err, ScanError::Config(_)));
        assert_eq!(counters.captures(), 0);
        assert_eq!(counters.releases(), 1);
        assert_eq!(session.state(), ScanState::Idle);
        assert!(publisher.sent().is_empty());
        assert!(events.try_recv().is_none(), "no state change for a refused scan");

        assert!(matches!(session.begin_entry(), Err(ScanError::Config(_))));
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn qr_image_on_disk_is_decoded_and_published() {
        let dir = tempfile::tempdir().expect("tmp dir");
        image::GrayImage::from_pixel(64, 64, image::Luma([255]))
            .save(dir.path().join("frame-00.png"))
            .expect("save blank frame");
        let (side, pixels) = render_qr("u1-box9-4321");
        image::GrayImage::from_raw(side, side, pixels)
            .expect("qr image")
            .save(dir.path().join("frame-01.png"))
            .expect("save qr frame");

        let publisher = Arc::new(RecordingPublisher::default());
        let mut session = ScanSession::new(
            fast_config(ParseFailurePolicy::Continue),
            Box::new(QrDecoder::new()),
            publisher.clone(),
            EventBus::default(),
        );
        let cam = ImageSequenceCamera::open(dir.path()).expect("open frames");

        let record = session.scan(Box::new(cam), &not_cancelled()).await.expect("scan");

        assert_eq!(record, ScanRecord::new("u1", "box9", "4321"));
        assert_eq!(session.state(), ScanState::Done);
        let sent = publisher.sent();
        assert_eq!(sent.len(), 1);
        let body: Value = serde_json::from_slice(sent[0].payload()).unwrap();
        assert_eq!(
            body,
            json!({"user_id": "u1", "id": "box9", "pin": "4321", "state": true})
        );
    }

    // ── Form entry ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn malformed_entry_stays_in_form_entry() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, _bus) =
            session_with(fast_config(ParseFailurePolicy::Continue), Vec::new(), publisher.clone());

        session.begin_entry().expect("begin entry");
        let err = session.submit("onlytwoparts-here").await.unwrap_err();

        assert!(matches!(err, ScanError::MalformedRecord { parts: 2, .. }));
        assert_eq!(session.state(), ScanState::FormEntry);
        assert!(publisher.sent().is_empty());

        let record = session.submit("u1-box9-4321").await.expect("submit");
        assert_eq!(record.pin, "4321");
        assert_eq!(session.state(), ScanState::Idle);
        assert_eq!(publisher.sent().len(), 1);
    }

    #[tokio::test]
    async fn submitted_text_is_published_verbatim() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, _bus) =
            session_with(fast_config(ParseFailurePolicy::Continue), Vec::new(), publisher.clone());

        session.begin_entry().expect("begin entry");
        let record = session.submit(" u1-box9-4321 ").await.expect("submit");

        assert_eq!(record, ScanRecord::new(" u1", "box9", "4321 "));
        let body: Value = serde_json::from_slice(publisher.sent()[0].payload()).unwrap();
        assert_eq!(body["user_id"], " u1");
        assert_eq!(body["pin"], "4321 ");
    }

    #[tokio::test]
    async fn entry_publish_failure_returns_to_idle() {
        let publisher = RecordingPublisher::failing(ScanError::BrokerConnect("down".into()));
        let (mut session, _bus) =
            session_with(fast_config(ParseFailurePolicy::Continue), Vec::new(), publisher);

        session.begin_entry().expect("begin entry");
        let err = session.submit("u1-box9-4321").await.unwrap_err();

        assert_eq!(err, ScanError::BrokerConnect("down".into()));
        assert_eq!(session.state(), ScanState::Idle);
    }

    #[tokio::test]
    async fn operations_from_wrong_state_are_rejected() {
        let publisher = Arc::new(RecordingPublisher::default());
        let (mut session, _bus) =
            session_with(fast_config(ParseFailurePolicy::Continue), Vec::new(), publisher);

        let err = session.submit("u1-box9-4321").await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidState { state: ScanState::Idle, .. }));
        assert!(session.cancel_entry().is_err());

        session.begin_entry().expect("begin entry");
        let (cam, counters) = camera(1);
        let err = session.scan(cam, &not_cancelled()).await.unwrap_err();
        assert!(matches!(err, ScanError::InvalidState { state: ScanState::FormEntry, .. }));
        assert_eq!(counters.captures(), 0);
        assert_eq!(counters.releases(), 1);

        session.cancel_entry().expect("cancel entry");
        assert_eq!(session.state(), ScanState::Idle);
    }
}
