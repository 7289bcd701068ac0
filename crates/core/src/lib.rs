//! Core library for the Voice Effects application.
//!
//! A recorded voice is played back through one of a handful of named effects.
//! Each effect is plain data (layers and an optional volume modulation
//! program) and a single scheduler turns it into concurrently playing
//! instances of the recording on top of a host playback primitive. The host
//! does the time stretching; this crate decides what plays, when, at which
//! volume, and makes sure every instance is released exactly once.

pub mod assets;
pub mod catalog;
pub mod config;
pub mod error;
pub mod playback;
pub mod pool;
pub mod record;
pub mod scheduler;
pub mod session;
pub mod timeline;

pub use assets::{AssetHandle, AssetStore, FileAssetStore};
pub use catalog::{
    EffectCatalog, EffectDefinition, EffectName, LayerSpec, ModulationProgram, RateCharacter,
    StopCondition, VolumeRule,
};
pub use config::{AppConfig, PlaybackConfig};
pub use error::{EffectError, Result};
pub use playback::{
    HostCommand, HostRecord, InstanceSnapshot, InstanceState, NativePlayer, PlaybackInstance,
    PlayerEvent, PlayerFactory, SimulatedHost, StereoVolume,
};
pub use pool::{InstanceId, InstancePool};
pub use record::{Recorder, RecordingSettings};
pub use scheduler::{ActiveEffect, EffectListener, EffectScheduler, NullListener};
pub use session::{Sharer, VoiceChanger};
pub use timeline::{PlaybackClock, TaskHandle, TimerQueue};
