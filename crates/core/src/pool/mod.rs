use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    AssetHandle, InstanceSnapshot, LayerSpec, PlaybackInstance, PlayerEvent, PlayerFactory, Result,
    TimerQueue,
};

/// Identifier handed out by the [`InstancePool`]. Ids are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owning arena for every live [`PlaybackInstance`].
///
/// The pool is the only place instances are created or released; everything
/// else refers to them by [`InstanceId`]. Every id present in the pool was
/// created by it and has not been released yet.
pub struct InstancePool {
    factory: Box<dyn PlayerFactory>,
    instances: BTreeMap<InstanceId, PlaybackInstance>,
    next_id: u64,
}

impl InstancePool {
    pub fn new(factory: Box<dyn PlayerFactory>) -> Self {
        Self {
            factory,
            instances: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Binds a new instance to `asset` and starts it with the layer's initial
    /// volume, speed and pitch. An unsupported rate is logged and the host's
    /// default rate is kept; prepare and start failures are returned and leave
    /// the pool unchanged.
    pub fn create(&mut self, asset: &AssetHandle, layer: &LayerSpec) -> Result<InstanceId> {
        let id = InstanceId(self.next_id);
        self.next_id += 1;

        let mut instance = PlaybackInstance::new(id, self.factory.create_player());
        instance.prepare(asset)?;
        instance.set_volume(layer.volume);
        if let Err(err) = instance.set_speed_pitch(layer.speed, layer.pitch) {
            if err.is_fatal() {
                return Err(err);
            }
            tracing::warn!(instance = %id, %err, "keeping default playback rate");
        }
        instance.start()?;

        tracing::debug!(
            instance = %id,
            speed = instance.speed(),
            pitch = instance.pitch(),
            "playback instance started"
        );
        self.instances.insert(id, instance);
        Ok(id)
    }

    /// Releases one instance. Returns `false` if it was already released.
    pub fn release(&mut self, id: InstanceId) -> bool {
        match self.instances.remove(&id) {
            Some(mut instance) => {
                instance.release();
                tracing::debug!(instance = %id, "playback instance released");
                true
            }
            None => false,
        }
    }

    /// Cancels every pending task in `timers` and releases every instance.
    /// Safe to call in any state; returns how many instances were released.
    pub fn release_all<T>(&mut self, timers: &mut TimerQueue<T>) -> usize {
        let cancelled = timers.cancel_all();
        let released = self.instances.len();
        for (_, mut instance) in std::mem::take(&mut self.instances) {
            instance.release();
        }

        if released > 0 || cancelled > 0 {
            tracing::debug!(released, cancelled, "pool torn down");
        }
        released
    }

    pub fn get(&self, id: InstanceId) -> Option<&PlaybackInstance> {
        self.instances.get(&id)
    }

    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut PlaybackInstance> {
        self.instances.get_mut(&id)
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn ids(&self) -> Vec<InstanceId> {
        self.instances.keys().copied().collect()
    }

    pub fn snapshot(&self, id: InstanceId) -> Option<InstanceSnapshot> {
        self.get(id).map(PlaybackInstance::snapshot)
    }

    /// Collects the one-shot terminal events reported since the last call.
    pub fn drain_events(&mut self) -> Vec<(InstanceId, PlayerEvent)> {
        self.instances
            .iter_mut()
            .filter_map(|(id, instance)| instance.take_event().map(|event| (*id, event)))
            .collect()
    }
}

impl fmt::Debug for InstancePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstancePool")
            .field("instances", &self.instances)
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EffectError, HostCommand, SimulatedHost, StereoVolume};

    fn setup() -> (SimulatedHost, AssetHandle, InstancePool) {
        let host = SimulatedHost::new();
        let asset = AssetHandle::new("take.aac");
        host.add_asset(asset.clone(), 2_000);
        let pool = InstancePool::new(Box::new(host.clone()));
        (host, asset, pool)
    }

    fn layer(volume: f32, speed: f32, pitch: f32) -> LayerSpec {
        LayerSpec::new(0, StereoVolume::uniform(volume), speed, pitch)
    }

    #[test]
    fn creates_started_instances_with_layer_parameters() {
        let (host, asset, mut pool) = setup();
        let id = pool.create(&asset, &layer(0.35, 0.8, 0.7)).unwrap();

        let snapshot = pool.snapshot(id).unwrap();
        assert_eq!(snapshot.volume, StereoVolume::uniform(0.35));
        assert_eq!(snapshot.speed, 0.8);
        assert_eq!(snapshot.pitch, 0.7);
        assert!(pool.get(id).unwrap().is_playing());
        assert_eq!(host.start_times(), vec![(0, 0)]);
    }

    #[test]
    fn failed_prepare_leaves_pool_untouched() {
        let (host, _asset, mut pool) = setup();
        let err = pool
            .create(&AssetHandle::new("missing.aac"), &layer(1.0, 1.0, 1.0))
            .unwrap_err();

        assert!(matches!(err, EffectError::Prepare { .. }));
        assert!(pool.is_empty());
        assert_eq!(host.live_players(), 0);
    }

    #[test]
    fn failed_start_releases_the_native_player() {
        let (host, asset, mut pool) = setup();
        host.fail_nth_start(0);

        let err = pool.create(&asset, &layer(1.0, 1.0, 1.0)).unwrap_err();
        assert!(matches!(err, EffectError::Playback(_)));
        assert!(pool.is_empty());
        assert_eq!(host.live_players(), 0);
    }

    #[test]
    fn unsupported_rate_still_plays() {
        let (host, asset, mut pool) = setup();
        host.set_rate_range(0.5, 1.2);

        let id = pool.create(&asset, &layer(1.0, 1.5, 2.0)).unwrap();
        let snapshot = pool.snapshot(id).unwrap();
        assert_eq!((snapshot.speed, snapshot.pitch), (1.0, 1.0));
        assert!(pool.get(id).unwrap().is_playing());
    }

    #[test]
    fn release_tolerates_repeats() {
        let (host, asset, mut pool) = setup();
        let id = pool.create(&asset, &layer(1.0, 1.0, 1.0)).unwrap();

        assert!(pool.release(id));
        assert!(!pool.release(id));
        assert!(!pool.contains(id));
        assert_eq!(host.live_players(), 0);
    }

    #[test]
    fn release_all_cancels_timers_and_is_idempotent() {
        let (host, asset, mut pool) = setup();
        let mut timers = TimerQueue::new();
        pool.create(&asset, &layer(1.0, 1.0, 1.0)).unwrap();
        pool.create(&asset, &layer(0.3, 0.75, 0.65)).unwrap();
        timers.schedule(400, ());
        timers.schedule(800, ());

        assert_eq!(pool.release_all(&mut timers), 2);
        assert!(pool.is_empty());
        assert!(timers.is_empty());
        assert_eq!(host.live_players(), 0);

        assert_eq!(pool.release_all(&mut timers), 0);
    }

    #[test]
    fn ids_are_never_reused() {
        let (_host, asset, mut pool) = setup();
        let first = pool.create(&asset, &layer(1.0, 1.0, 1.0)).unwrap();
        pool.release(first);
        let second = pool.create(&asset, &layer(1.0, 1.0, 1.0)).unwrap();

        assert_ne!(first, second);
        assert_eq!(pool.ids(), vec![second]);
    }

    #[test]
    fn drains_completion_once() {
        let (host, asset, mut pool) = setup();
        let id = pool.create(&asset, &layer(1.0, 1.0, 1.0)).unwrap();

        host.advance_to(2_000);
        assert_eq!(pool.drain_events(), vec![(id, PlayerEvent::Completed)]);
        assert!(pool.drain_events().is_empty());

        // Completed instances stay owned until released.
        assert!(pool.contains(id));
        let releases = host
            .records()
            .iter()
            .filter(|record| record.command == HostCommand::Release)
            .count();
        assert_eq!(releases, 0);
    }
}
