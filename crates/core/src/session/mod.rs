use std::path::{Path, PathBuf};

use crate::{
    AssetHandle, EffectError, EffectName, EffectScheduler, Recorder, RecordingSettings, Result,
};

/// Hands a finished recording to some external target.
pub trait Sharer {
    fn share(&mut self, asset: &AssetHandle, path: &Path) -> Result<()>;
}

/// The single-screen flow of the application: record a take, play it back
/// plain or through an effect, share it, and tear everything down when the
/// app goes to the background.
pub struct VoiceChanger {
    recorder: Box<dyn Recorder>,
    sharer: Box<dyn Sharer>,
    settings: RecordingSettings,
    scheduler: EffectScheduler,
    recording: bool,
    asset: AssetHandle,
}

impl VoiceChanger {
    pub fn new(
        recorder: Box<dyn Recorder>,
        sharer: Box<dyn Sharer>,
        settings: RecordingSettings,
        scheduler: EffectScheduler,
    ) -> Self {
        let asset = settings.asset();
        Self {
            recorder,
            sharer,
            settings,
            scheduler,
            recording: false,
            asset,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// The recording effects are applied to.
    pub fn asset(&self) -> &AssetHandle {
        &self.asset
    }

    pub fn scheduler(&self) -> &EffectScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut EffectScheduler {
        &mut self.scheduler
    }

    /// Starts a take, or finishes the one in progress. Returns whether a take
    /// is in progress afterwards.
    pub fn toggle_recording(&mut self) -> Result<bool> {
        if self.recording {
            let asset = self.recorder.stop_recording();
            self.recording = false;
            self.asset = asset?;
            tracing::info!(asset = %self.asset, "recording stopped");
        } else {
            // Playback of the old take would be captured by the microphone.
            self.scheduler.stop_all();
            self.recorder.start_recording(&self.settings)?;
            self.recording = true;
            tracing::info!(sample_rate = self.settings.sample_rate, "recording started");
        }
        Ok(self.recording)
    }

    pub fn play_normal(&mut self, now_ms: u64) -> Result<()> {
        self.apply_effect(EffectName::Normal, now_ms)
    }

    pub fn apply_effect(&mut self, name: EffectName, now_ms: u64) -> Result<()> {
        let asset = self.asset.clone();
        self.scheduler.apply_effect(name, &asset, now_ms)
    }

    pub fn stop_playback(&mut self) {
        self.scheduler.stop_all();
    }

    /// Where the current recording is stored.
    pub fn saved_location(&self) -> Result<PathBuf> {
        self.scheduler.assets().absolute_path(&self.asset)
    }

    pub fn share(&mut self) -> Result<()> {
        if !self.scheduler.assets().exists(&self.asset) {
            return Err(EffectError::AssetMissing(self.asset.clone()));
        }
        let path = self.saved_location()?;
        self.sharer.share(&self.asset, &path)?;
        tracing::info!(path = %path.display(), "recording shared");
        Ok(())
    }

    /// The app left the foreground: finish any take and release all playback.
    /// Never fails.
    pub fn suspend(&mut self) {
        if self.recording {
            self.recording = false;
            match self.recorder.stop_recording() {
                Ok(asset) => self.asset = asset,
                Err(err) => tracing::warn!(%err, "recording could not be finalised"),
            }
        }
        self.scheduler.stop_all();
        tracing::debug!("session suspended");
    }

    pub fn tick(&mut self, now_ms: u64) {
        self.scheduler.tick(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{EffectCatalog, SimulatedHost};

    #[derive(Default)]
    struct FakeRecorder {
        host: SimulatedHost,
        takes: usize,
        fail_stop: bool,
    }

    impl Recorder for FakeRecorder {
        fn start_recording(&mut self, _settings: &RecordingSettings) -> Result<()> {
            Ok(())
        }

        fn stop_recording(&mut self) -> Result<AssetHandle> {
            if self.fail_stop {
                return Err(EffectError::Record("microphone went away".to_string()));
            }
            self.takes += 1;
            let asset = AssetHandle::new(format!("take-{}.aac", self.takes));
            self.host.add_asset(asset.clone(), 2_000);
            Ok(asset)
        }
    }

    #[derive(Clone, Default)]
    struct FakeSharer(Arc<Mutex<Vec<PathBuf>>>);

    impl Sharer for FakeSharer {
        fn share(&mut self, _asset: &AssetHandle, path: &Path) -> Result<()> {
            self.0.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn session(fail_stop: bool) -> (SimulatedHost, FakeSharer, VoiceChanger) {
        let host = SimulatedHost::new();
        let sharer = FakeSharer::default();
        let recorder = FakeRecorder {
            host: host.clone(),
            takes: 0,
            fail_stop,
        };
        let scheduler = EffectScheduler::new(
            EffectCatalog::builtin(),
            Box::new(host.clone()),
            Box::new(host.clone()),
        );
        let session = VoiceChanger::new(
            Box::new(recorder),
            Box::new(sharer.clone()),
            RecordingSettings::default(),
            scheduler,
        );
        (host, sharer, session)
    }

    #[test]
    fn nothing_to_play_or_share_before_recording() {
        let (_host, sharer, mut session) = session(false);

        assert!(matches!(session.play_normal(0), Err(EffectError::AssetMissing(_))));
        assert!(matches!(session.share(), Err(EffectError::AssetMissing(_))));
        assert!(sharer.0.lock().unwrap().is_empty());
    }

    #[test]
    fn records_then_applies_effects() {
        let (host, _sharer, mut session) = session(false);

        assert!(session.toggle_recording().unwrap());
        assert!(!session.toggle_recording().unwrap());
        assert_eq!(session.asset(), &AssetHandle::new("take-1.aac"));

        session.apply_effect(EffectName::Echo, 0).unwrap();
        host.advance_to(300);
        session.tick(300);
        assert_eq!(session.scheduler().live_instances(), 2);
    }

    #[test]
    fn recording_stops_playback() {
        let (_host, _sharer, mut session) = session(false);
        session.toggle_recording().unwrap();
        session.toggle_recording().unwrap();
        session.play_normal(0).unwrap();

        session.toggle_recording().unwrap();
        assert!(session.scheduler().is_idle());
    }

    #[test]
    fn shares_the_saved_recording() {
        let (_host, sharer, mut session) = session(false);
        session.toggle_recording().unwrap();
        session.toggle_recording().unwrap();

        session.share().unwrap();
        let shared = sharer.0.lock().unwrap().clone();
        assert_eq!(shared, vec![session.saved_location().unwrap()]);
    }

    #[test]
    fn suspend_tears_everything_down_even_on_errors() {
        let (host, _sharer, mut session) = session(true);
        host.add_asset(session.asset().clone(), 2_000);
        session.toggle_recording().unwrap();
        session.apply_effect(EffectName::Ghost, 0).unwrap();

        session.suspend();
        session.suspend();

        assert!(!session.is_recording());
        assert!(session.scheduler().is_idle());
        assert_eq!(host.live_players(), 0);
    }
}
