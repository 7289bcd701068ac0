//! Wrapper around a single host playback primitive.
//!
//! The host does the actual decoding, time stretching and output. This module
//! only commands it and observes it, always from the logical thread that owns
//! the [`InstancePool`](crate::InstancePool).

mod simulated;

pub use simulated::{HostCommand, HostRecord, SimulatedHost};

use serde::{Deserialize, Serialize};

use crate::{AssetHandle, EffectError, InstanceId, Result};

/// Left/right channel gain, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StereoVolume {
    pub left: f32,
    pub right: f32,
}

impl StereoVolume {
    pub const UNITY: Self = Self::new(1.0, 1.0);

    pub const fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    pub const fn uniform(value: f32) -> Self {
        Self::new(value, value)
    }

    pub fn clamped(self) -> Self {
        Self::new(self.left.clamp(0.0, 1.0), self.right.clamp(0.0, 1.0))
    }
}

impl Default for StereoVolume {
    fn default() -> Self {
        Self::UNITY
    }
}

/// Asynchronous outcome reported by the host for a started player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Completed,
    Error(String),
}

/// Native playback handle provided by the host.
///
/// Implementations must report each terminal [`PlayerEvent`] at most once and
/// must tolerate `release` being called repeatedly.
pub trait NativePlayer {
    fn prepare(&mut self, asset: &AssetHandle) -> Result<()>;
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self);
    fn set_volume(&mut self, volume: StereoVolume);
    /// Fails with [`EffectError::UnsupportedRate`] if the host cannot apply
    /// the rate; the previous rate stays in effect.
    fn set_playback_rate(&mut self, speed: f32, pitch: f32) -> Result<()>;
    fn is_playing(&self) -> bool;
    fn poll_event(&mut self) -> Option<PlayerEvent>;
    fn release(&mut self);
}

/// Creates fresh native players on demand.
pub trait PlayerFactory {
    fn create_player(&self) -> Box<dyn NativePlayer>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Idle,
    Prepared,
    Playing,
    Stopped,
    Completed,
    Failed,
    Released,
}

/// Point-in-time view of an instance, safe to hand out of the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSnapshot {
    pub id: InstanceId,
    pub asset: Option<AssetHandle>,
    pub state: InstanceState,
    pub volume: StereoVolume,
    pub speed: f32,
    pub pitch: f32,
}

/// One live binding between an asset and a native player.
pub struct PlaybackInstance {
    id: InstanceId,
    asset: Option<AssetHandle>,
    state: InstanceState,
    volume: StereoVolume,
    speed: f32,
    pitch: f32,
    native: Box<dyn NativePlayer>,
    event_taken: bool,
}

impl PlaybackInstance {
    pub fn new(id: InstanceId, native: Box<dyn NativePlayer>) -> Self {
        Self {
            id,
            asset: None,
            state: InstanceState::Idle,
            volume: StereoVolume::UNITY,
            speed: 1.0,
            pitch: 1.0,
            native,
            event_taken: false,
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn volume(&self) -> StereoVolume {
        self.volume
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn prepare(&mut self, asset: &AssetHandle) -> Result<()> {
        if self.state != InstanceState::Idle {
            return Err(EffectError::Prepare {
                asset: asset.clone(),
                reason: format!("instance {} is {:?}", self.id, self.state),
            });
        }

        self.native.prepare(asset)?;
        self.asset = Some(asset.clone());
        self.state = InstanceState::Prepared;
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        if self.state != InstanceState::Prepared {
            return Err(EffectError::Playback(format!(
                "instance {} cannot start while {:?}",
                self.id, self.state
            )));
        }

        match self.native.start() {
            Ok(()) => {
                self.state = InstanceState::Playing;
                Ok(())
            }
            Err(err) => {
                self.state = InstanceState::Failed;
                Err(err)
            }
        }
    }

    pub fn stop(&mut self) {
        if self.state == InstanceState::Playing {
            self.native.stop();
            self.state = InstanceState::Stopped;
        }
    }

    pub fn set_volume(&mut self, volume: StereoVolume) {
        if self.state == InstanceState::Released {
            return;
        }
        let volume = volume.clamped();
        self.native.set_volume(volume);
        self.volume = volume;
    }

    /// Applies a new rate. On failure the previous speed and pitch are kept and
    /// the non-fatal [`EffectError::UnsupportedRate`] is returned.
    pub fn set_speed_pitch(&mut self, speed: f32, pitch: f32) -> Result<()> {
        if self.state == InstanceState::Released {
            return Ok(());
        }
        if !(speed > 0.0 && pitch > 0.0) {
            return Err(EffectError::UnsupportedRate { speed, pitch });
        }

        self.native.set_playback_rate(speed, pitch)?;
        self.speed = speed;
        self.pitch = pitch;
        Ok(())
    }

    pub fn is_playing(&self) -> bool {
        self.state == InstanceState::Playing && self.native.is_playing()
    }

    /// Returns the terminal event for this instance the first time it is
    /// observed, and `None` on every later call.
    pub fn take_event(&mut self) -> Option<PlayerEvent> {
        if self.event_taken || self.state != InstanceState::Playing {
            return None;
        }

        let event = self.native.poll_event()?;
        self.event_taken = true;
        self.state = match event {
            PlayerEvent::Completed => InstanceState::Completed,
            PlayerEvent::Error(_) => InstanceState::Failed,
        };
        Some(event)
    }

    /// Frees the native player. Safe to call any number of times.
    pub fn release(&mut self) {
        if self.state == InstanceState::Released {
            return;
        }
        self.stop();
        self.native.release();
        self.state = InstanceState::Released;
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            id: self.id,
            asset: self.asset.clone(),
            state: self.state,
            volume: self.volume,
            speed: self.speed,
            pitch: self.pitch,
        }
    }
}

impl Drop for PlaybackInstance {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for PlaybackInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackInstance")
            .field("id", &self.id)
            .field("asset", &self.asset)
            .field("state", &self.state)
            .field("volume", &self.volume)
            .field("speed", &self.speed)
            .field("pitch", &self.pitch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SimulatedHost, AssetHandle, PlaybackInstance) {
        let host = SimulatedHost::new();
        let asset = AssetHandle::new("take.aac");
        host.add_asset(asset.clone(), 1_000);
        let instance = PlaybackInstance::new(InstanceId::new(1), host.create_player());
        (host, asset, instance)
    }

    #[test]
    fn prepares_and_starts() {
        let (_host, asset, mut instance) = setup();
        instance.prepare(&asset).unwrap();
        assert_eq!(instance.state(), InstanceState::Prepared);

        instance.start().unwrap();
        assert!(instance.is_playing());
        assert_eq!(instance.snapshot().asset, Some(asset));
    }

    #[test]
    fn prepare_fails_on_unknown_assets() {
        let (_host, _asset, mut instance) = setup();
        let err = instance.prepare(&AssetHandle::new("other.aac")).unwrap_err();

        assert!(matches!(err, EffectError::Prepare { .. }));
        assert_eq!(instance.state(), InstanceState::Idle);
        assert!(instance.start().is_err());
    }

    #[test]
    fn unsupported_rate_keeps_previous_values() {
        let (host, asset, mut instance) = setup();
        host.set_rate_range(0.5, 1.5);
        instance.prepare(&asset).unwrap();

        instance.set_speed_pitch(0.8, 0.7).unwrap();
        let err = instance.set_speed_pitch(1.5, 2.0).unwrap_err();

        assert!(!err.is_fatal());
        assert_eq!(instance.speed(), 0.8);
        assert_eq!(instance.pitch(), 0.7);
    }

    #[test]
    fn volume_is_clamped() {
        let (_host, asset, mut instance) = setup();
        instance.prepare(&asset).unwrap();
        instance.set_volume(StereoVolume::new(1.4, -0.2));

        assert_eq!(instance.volume(), StereoVolume::new(1.0, 0.0));
    }

    #[test]
    fn completion_is_reported_once() {
        let (host, asset, mut instance) = setup();
        instance.prepare(&asset).unwrap();
        instance.start().unwrap();

        host.advance_to(500);
        assert_eq!(instance.take_event(), None);

        host.advance_to(1_000);
        assert!(!instance.is_playing());
        assert_eq!(instance.take_event(), Some(PlayerEvent::Completed));
        assert_eq!(instance.take_event(), None);
        assert_eq!(instance.state(), InstanceState::Completed);
    }

    #[test]
    fn stop_halts_playback_without_releasing() {
        let (host, asset, mut instance) = setup();
        instance.prepare(&asset).unwrap();
        instance.start().unwrap();

        instance.stop();
        assert_eq!(instance.state(), InstanceState::Stopped);
        assert!(!instance.is_playing());
        assert!(instance.take_event().is_none());
        assert_eq!(host.live_players(), 1);

        instance.release();
        assert_eq!(
            host.commands_for(0)
                .into_iter()
                .map(|(_, command)| command)
                .filter(|command| matches!(command, HostCommand::Stop | HostCommand::Release))
                .collect::<Vec<_>>(),
            vec![HostCommand::Stop, HostCommand::Release]
        );
    }

    #[test]
    fn release_is_idempotent() {
        let (host, asset, mut instance) = setup();
        instance.prepare(&asset).unwrap();
        instance.start().unwrap();

        instance.release();
        instance.release();
        drop(instance);

        let releases = host
            .records()
            .iter()
            .filter(|record| record.command == HostCommand::Release)
            .count();
        assert_eq!(releases, 1);
        assert_eq!(host.live_players(), 0);
    }
}
