//! Listening controller.
//!
//! Owns the session state and the lifecycle of the two exclusively-held
//! resources: the capture stream and the recognition session. All state
//! mutation happens through the operations here; the presentation only ever
//! sees read-only snapshots.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::audio::{CaptureProvider, CaptureStream, FrequencyAnalyser, mean_level};
use crate::session::{Language, SessionSnapshot, SessionState};
use crate::stt::{RecognitionEvent, RecognitionProvider, RecognitionSession, SessionConfig};

pub struct Controller {
    state: SessionState,
    capture: Box<dyn CaptureProvider>,
    recognition: Box<dyn RecognitionProvider>,
    analyser: Arc<Mutex<dyn FrequencyAnalyser>>,
    mic: Option<Box<dyn CaptureStream>>,
    session: Option<Box<dyn RecognitionSession>>,
    // Guard for the level-sampling loop; bumped by start() and stop() so a
    // stale scheduled tick can never mutate the level.
    generation: u64,
}

impl Controller {
    pub fn new(language: Language, capture: Box<dyn CaptureProvider>, recognition: Box<dyn RecognitionProvider>, analyser: Arc<Mutex<dyn FrequencyAnalyser>>) -> Self {
        Self { state: SessionState::new(language), capture, recognition, analyser, mic: None, session: None, generation: 0 }
    }

    /// Begin listening: acquire the microphone, then start a recognition
    /// session for the current language.
    ///
    /// Returns the new level-loop generation on success so the caller can
    /// spawn the sampling task. Acquisition failures are logged and leave the
    /// state Idle; no error reaches the presentation.
    pub fn start(&mut self) -> Option<u64> {
        if self.state.listening {
            return None;
        }

        match self.capture.open() {
            Ok(stream) => {
                self.mic = Some(stream);
                self.state.listening = true;
                self.generation += 1;
                self.start_session();
                info!("Listening started ({})", self.state.language.bcp47());
                Some(self.generation)
            }
            Err(e) => {
                error!("Error accessing microphone: {}", e);
                None
            }
        }
    }

    /// Stop listening: tear down the recognition session, release the
    /// microphone, and clear the level and transcript. Calling while Idle is
    /// a no-op.
    pub fn stop(&mut self) {
        if !self.state.listening {
            return;
        }

        self.stop_session();
        if let Some(mut mic) = self.mic.take() {
            mic.stop();
        }
        self.analyser.lock().reset();

        self.generation += 1;
        self.state.listening = false;
        self.state.audio_level = 0.0;
        self.state.transcript.clear();
        info!("Listening stopped");
    }

    /// Change the recognition language. A changed language is the single
    /// trigger for session teardown/recreate: while listening, the session is
    /// rebuilt for the new language and the microphone is left untouched.
    pub fn set_language(&mut self, language: Language) {
        if language == self.state.language {
            return;
        }

        self.state.language = language;
        info!("Language changed to {} ({})", language.display_name(), language.bcp47());

        if self.state.listening {
            self.start_session();
        }
    }

    /// Dispatch a recognition event.
    ///
    /// Results overwrite the transcript with the latest text; they never
    /// append. A provider-initiated end restarts the session while still
    /// listening, producing the continuous-listening illusion. Events arriving
    /// after `stop()` are ignored.
    pub fn handle_event(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Result { text, .. } => {
                if self.state.listening {
                    self.state.transcript = text;
                }
            }
            RecognitionEvent::Ended => {
                if self.state.listening {
                    debug!("Recognition session ended, restarting");
                    self.start_session();
                }
            }
        }
    }

    /// One iteration of the level-sampling loop: read the frequency bins and
    /// store their mean as the audio level.
    ///
    /// Returns whether the loop should reschedule itself. A tick from a stale
    /// generation, or one arriving after `stop()`, does nothing and does not
    /// reschedule.
    pub fn sample_frame(&mut self, generation: u64) -> bool {
        if !self.state.listening || generation != self.generation {
            return false;
        }

        let bins = self.analyser.lock().sample_frequency_data();
        self.state.audio_level = mean_level(&bins);
        true
    }

    /// Read-only view for the presentation.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    pub fn language(&self) -> Language {
        self.state.language
    }

    pub fn listening(&self) -> bool {
        self.state.listening
    }

    /// Release all resources. Equivalent to `stop()`; run on shutdown.
    pub fn dispose(&mut self) {
        self.stop();
    }

    fn start_session(&mut self) {
        self.stop_session();
        match self.recognition.start_session(SessionConfig::continuous(self.state.language)) {
            Ok(session) => self.session = Some(session),
            Err(e) => error!("Failed to start recognition session: {}", e),
        }
    }

    fn stop_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::CaptureError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Copy)]
    enum CaptureMode {
        Grant,
        DenyPermission,
        NoDevice,
    }

    struct MockCapture {
        mode: CaptureMode,
        opens: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl MockCapture {
        fn new(mode: CaptureMode) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let opens = Arc::new(AtomicUsize::new(0));
            let stops = Arc::new(AtomicUsize::new(0));
            (Self { mode, opens: opens.clone(), stops: stops.clone() }, opens, stops)
        }
    }

    impl CaptureProvider for MockCapture {
        fn open(&mut self) -> Result<Box<dyn CaptureStream>, CaptureError> {
            match self.mode {
                CaptureMode::Grant => {
                    self.opens.fetch_add(1, Ordering::SeqCst);
                    Ok(Box::new(MockStream { stops: self.stops.clone() }))
                }
                CaptureMode::DenyPermission => Err(CaptureError::PermissionDenied),
                CaptureMode::NoDevice => Err(CaptureError::DeviceUnavailable),
            }
        }
    }

    struct MockStream {
        stops: Arc<AtomicUsize>,
    }

    impl CaptureStream for MockStream {
        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum SessionLog {
        Started(Language),
        Stopped(Language),
    }

    struct MockRecognition {
        log: Arc<Mutex<Vec<SessionLog>>>,
    }

    impl MockRecognition {
        fn new() -> (Self, Arc<Mutex<Vec<SessionLog>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            (Self { log: log.clone() }, log)
        }
    }

    impl RecognitionProvider for MockRecognition {
        fn start_session(&mut self, config: SessionConfig) -> anyhow::Result<Box<dyn RecognitionSession>> {
            assert!(config.continuous);
            self.log.lock().push(SessionLog::Started(config.language));
            Ok(Box::new(MockSession { language: config.language, log: self.log.clone(), stopped: false }))
        }
    }

    struct MockSession {
        language: Language,
        log: Arc<Mutex<Vec<SessionLog>>>,
        stopped: bool,
    }

    impl RecognitionSession for MockSession {
        fn stop(&mut self) {
            if !self.stopped {
                self.stopped = true;
                self.log.lock().push(SessionLog::Stopped(self.language));
            }
        }
    }

    struct FakeAnalyser {
        bins: Vec<u8>,
    }

    impl FrequencyAnalyser for FakeAnalyser {
        fn frequency_bin_count(&self) -> usize {
            self.bins.len()
        }

        fn sample_frequency_data(&mut self) -> Vec<u8> {
            self.bins.clone()
        }

        fn reset(&mut self) {}
    }

    fn analyser_with(bins: Vec<u8>) -> Arc<Mutex<dyn FrequencyAnalyser>> {
        Arc::new(Mutex::new(FakeAnalyser { bins }))
    }

    fn controller(mode: CaptureMode, bins: Vec<u8>) -> (Controller, Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<Mutex<Vec<SessionLog>>>) {
        let (capture, opens, stops) = MockCapture::new(mode);
        let (recognition, log) = MockRecognition::new();
        let controller = Controller::new(Language::Bangla, Box::new(capture), Box::new(recognition), analyser_with(bins));
        (controller, opens, stops, log)
    }

    #[test]
    fn test_start_acquires_mic_and_session() {
        let (mut c, opens, _, log) = controller(CaptureMode::Grant, vec![0; 4]);

        let generation = c.start();
        assert!(generation.is_some());
        assert!(c.snapshot().listening);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(*log.lock(), vec![SessionLog::Started(Language::Bangla)]);
    }

    #[test]
    fn test_start_denied_stays_idle() {
        let (mut c, _, _, log) = controller(CaptureMode::DenyPermission, vec![]);

        assert!(c.start().is_none());
        assert!(!c.snapshot().listening);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_start_without_device_stays_idle() {
        let (mut c, _, _, log) = controller(CaptureMode::NoDevice, vec![]);

        assert!(c.start().is_none());
        assert!(!c.snapshot().listening);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_stop_clears_level_and_transcript() {
        let (mut c, _, stops, _) = controller(CaptureMode::Grant, vec![128; 4]);

        let generation = c.start().unwrap();
        assert!(c.sample_frame(generation));
        c.handle_event(RecognitionEvent::Result { text: "hello".into(), is_final: true });

        let snap = c.snapshot();
        assert_eq!(snap.audio_level, 128.0);
        assert_eq!(snap.transcript, "hello");

        c.stop();
        let snap = c.snapshot();
        assert!(!snap.listening);
        assert_eq!(snap.audio_level, 0.0);
        assert_eq!(snap.transcript, "");
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_while_idle_is_noop() {
        let (mut c, opens, stops, log) = controller(CaptureMode::Grant, vec![]);

        let before = c.snapshot();
        c.stop();
        assert_eq!(c.snapshot(), before);
        assert_eq!(opens.load(Ordering::SeqCst), 0);
        assert_eq!(stops.load(Ordering::SeqCst), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_set_language_while_idle_changes_language_only() {
        let (mut c, _, _, log) = controller(CaptureMode::Grant, vec![]);

        c.set_language(Language::English);
        let snap = c.snapshot();
        assert_eq!(snap.language, Language::English);
        assert!(!snap.listening);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_set_language_while_listening_swaps_session_keeps_mic() {
        let (mut c, opens, stops, log) = controller(CaptureMode::Grant, vec![]);

        c.start();
        c.set_language(Language::English);

        assert_eq!(opens.load(Ordering::SeqCst), 1, "microphone must not be reacquired");
        assert_eq!(stops.load(Ordering::SeqCst), 0, "microphone must not be released");
        assert_eq!(
            *log.lock(),
            vec![SessionLog::Started(Language::Bangla), SessionLog::Stopped(Language::Bangla), SessionLog::Started(Language::English)]
        );
        assert!(c.snapshot().listening);
    }

    #[test]
    fn test_set_language_same_value_is_noop() {
        let (mut c, _, _, log) = controller(CaptureMode::Grant, vec![]);

        c.start();
        c.set_language(Language::Bangla);
        assert_eq!(*log.lock(), vec![SessionLog::Started(Language::Bangla)]);
    }

    #[test]
    fn test_results_overwrite_not_append() {
        let (mut c, _, _, _) = controller(CaptureMode::Grant, vec![]);

        c.start();
        c.handle_event(RecognitionEvent::Result { text: "hello".into(), is_final: false });
        assert_eq!(c.snapshot().transcript, "hello");

        c.handle_event(RecognitionEvent::Result { text: "hello world".into(), is_final: true });
        assert_eq!(c.snapshot().transcript, "hello world");
    }

    #[test]
    fn test_result_after_stop_is_ignored() {
        let (mut c, _, _, _) = controller(CaptureMode::Grant, vec![]);

        c.start();
        c.stop();
        c.handle_event(RecognitionEvent::Result { text: "late".into(), is_final: true });
        assert_eq!(c.snapshot().transcript, "");
    }

    #[test]
    fn test_restart_on_provider_initiated_end() {
        let (mut c, _, _, log) = controller(CaptureMode::Grant, vec![]);

        c.start();
        c.handle_event(RecognitionEvent::Ended);

        assert!(c.snapshot().listening);
        assert_eq!(
            *log.lock(),
            vec![SessionLog::Started(Language::Bangla), SessionLog::Stopped(Language::Bangla), SessionLog::Started(Language::Bangla)]
        );
    }

    #[test]
    fn test_end_after_stop_does_not_restart() {
        let (mut c, _, _, log) = controller(CaptureMode::Grant, vec![]);

        c.start();
        c.stop();
        let entries = log.lock().len();
        c.handle_event(RecognitionEvent::Ended);
        assert_eq!(log.lock().len(), entries);
    }

    #[test]
    fn test_stale_generation_is_inert() {
        let (mut c, _, _, _) = controller(CaptureMode::Grant, vec![200; 4]);

        let first = c.start().unwrap();
        c.stop();
        assert!(!c.sample_frame(first), "stale tick must not reschedule");
        assert_eq!(c.snapshot().audio_level, 0.0);

        let second = c.start().unwrap();
        assert_ne!(first, second);
        assert!(!c.sample_frame(first));
        assert!(c.sample_frame(second));
        assert_eq!(c.snapshot().audio_level, 200.0);
    }

    #[test]
    fn test_level_boundaries() {
        let (mut c, _, _, _) = controller(CaptureMode::Grant, vec![0; 128]);
        let generation = c.start().unwrap();
        c.sample_frame(generation);
        assert_eq!(c.snapshot().audio_level, 0.0);

        let (mut c, _, _, _) = controller(CaptureMode::Grant, vec![255; 128]);
        let generation = c.start().unwrap();
        c.sample_frame(generation);
        assert_eq!(c.snapshot().audio_level, 255.0);
    }

    #[test]
    fn test_end_to_end_scenario() {
        // start -> listening; "hello" -> "hello world" overwrites; stop clears.
        let (mut c, _, _, _) = controller(CaptureMode::Grant, vec![10; 8]);

        assert!(c.start().is_some());
        assert!(c.snapshot().listening);

        c.handle_event(RecognitionEvent::Result { text: "hello".into(), is_final: true });
        assert_eq!(c.snapshot().transcript, "hello");

        c.handle_event(RecognitionEvent::Result { text: "hello world".into(), is_final: true });
        assert_eq!(c.snapshot().transcript, "hello world");

        c.stop();
        let snap = c.snapshot();
        assert_eq!(snap.transcript, "");
        assert!(!snap.listening);
        assert_eq!(snap.audio_level, 0.0);
    }
}
