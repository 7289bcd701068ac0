//! Effect orchestration.
//!
//! [`EffectScheduler`] reads an [`EffectDefinition`] and turns it into
//! playback instances started through the [`InstancePool`] at the right
//! logical times, plus the modulation ticks that reshape the primary layer's
//! volume. All of it runs on the caller's thread: `apply_effect`, `stop_all`
//! and `tick` never block and never run concurrently with each other.
//!
//! At most one effect is active. Applying a new effect, or calling
//! `stop_all`, cancels every pending task and releases every live instance
//! before anything new is created.

use rand::{rngs::StdRng, SeedableRng};

use crate::{
    AssetHandle, AssetStore, EffectCatalog, EffectDefinition, EffectError, EffectName,
    InstanceId, InstancePool, InstanceSnapshot, ModulationProgram, PlayerEvent, PlayerFactory,
    Result, TaskHandle, TimerQueue,
};

/// Optional notifications for the presentation layer. Every method defaults
/// to doing nothing.
pub trait EffectListener {
    fn on_effect_started(&mut self, _name: EffectName) {}
    fn on_layer_completed(&mut self, _id: InstanceId) {}
    /// A non-primary layer failed; the effect carries on without it.
    fn on_layer_failed(&mut self, _layer: usize, _error: &EffectError) {}
    fn on_effect_failed(&mut self, _error: &EffectError) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl EffectListener for NullListener {}

#[derive(Debug, Clone, Copy)]
enum Task {
    StartLayer { layer: usize },
    Modulate { instance: InstanceId, tick: u32 },
}

#[derive(Debug, Clone)]
struct ActiveModulation {
    instance: InstanceId,
    program: ModulationProgram,
    task: Option<TaskHandle>,
}

/// Bookkeeping for the effect currently playing.
#[derive(Debug, Clone)]
pub struct ActiveEffect {
    definition: EffectDefinition,
    asset: AssetHandle,
    started: Vec<(usize, InstanceId)>,
    failed: Vec<usize>,
    modulation: Option<ActiveModulation>,
}

impl ActiveEffect {
    pub fn name(&self) -> EffectName {
        self.definition.name
    }

    pub fn asset(&self) -> &AssetHandle {
        &self.asset
    }

    pub fn definition(&self) -> &EffectDefinition {
        &self.definition
    }

    /// Layers that started so far, as `(layer index, instance)`.
    pub fn started_layers(&self) -> &[(usize, InstanceId)] {
        &self.started
    }

    pub fn failed_layers(&self) -> &[usize] {
        &self.failed
    }

    pub fn is_modulating(&self) -> bool {
        self.modulation.is_some()
    }

    fn layer_of(&self, id: InstanceId) -> Option<usize> {
        self.started
            .iter()
            .find(|(_, started)| *started == id)
            .map(|(layer, _)| *layer)
    }
}

pub struct EffectScheduler {
    catalog: EffectCatalog,
    pool: InstancePool,
    timers: TimerQueue<Task>,
    assets: Box<dyn AssetStore>,
    listener: Box<dyn EffectListener>,
    rng: StdRng,
    active: Option<ActiveEffect>,
}

impl EffectScheduler {
    pub fn new(
        catalog: EffectCatalog,
        players: Box<dyn PlayerFactory>,
        assets: Box<dyn AssetStore>,
    ) -> Self {
        Self {
            catalog,
            pool: InstancePool::new(players),
            timers: TimerQueue::new(),
            assets,
            listener: Box::new(NullListener),
            rng: StdRng::from_entropy(),
            active: None,
        }
    }

    pub fn with_listener(mut self, listener: Box<dyn EffectListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Makes random modulation reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn catalog(&self) -> &EffectCatalog {
        &self.catalog
    }

    pub fn assets(&self) -> &dyn AssetStore {
        self.assets.as_ref()
    }

    pub fn active_effect(&self) -> Option<&ActiveEffect> {
        self.active.as_ref()
    }

    pub fn live_instances(&self) -> usize {
        self.pool.len()
    }

    pub fn instance_ids(&self) -> Vec<InstanceId> {
        self.pool.ids()
    }

    pub fn instance(&self, id: InstanceId) -> Option<InstanceSnapshot> {
        self.pool.snapshot(id)
    }

    pub fn pending_tasks(&self) -> usize {
        self.timers.len()
    }

    /// Logical time of the next pending task, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_due()
    }

    /// True once nothing is playing and nothing is scheduled.
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.pool.is_empty() && self.timers.is_empty()
    }

    /// Tears down whatever is playing and starts `name` on `asset` at
    /// `now_ms`.
    ///
    /// The primary layer starts before this returns; its failure fails the
    /// call and leaves nothing behind. Later layers are scheduled relative to
    /// `now_ms` and may fail individually without affecting the rest of the
    /// effect.
    pub fn apply_effect(
        &mut self,
        name: EffectName,
        asset: &AssetHandle,
        now_ms: u64,
    ) -> Result<()> {
        if !self.assets.exists(asset) {
            return Err(self.fail(EffectError::AssetMissing(asset.clone())));
        }

        let definition = match self.catalog.definition_for(name) {
            Ok(definition) => definition.clone(),
            Err(err) => return Err(self.fail(err)),
        };
        let Some(primary) = definition.primary().copied() else {
            return Err(self.fail(EffectError::InvalidCatalog(format!(
                "{name}: at least one layer is required"
            ))));
        };

        self.stop_all();
        self.timers.advance_to(now_ms);

        let primary_id = match self.pool.create(asset, &primary) {
            Ok(id) => id,
            Err(err) => return Err(self.fail(err)),
        };

        for (layer, layer_spec) in definition.layers.iter().enumerate().skip(1) {
            self.timers.schedule(layer_spec.delay_ms, Task::StartLayer { layer });
        }

        let modulation = definition.modulation.map(|program| ActiveModulation {
            instance: primary_id,
            program,
            task: Some(self.timers.schedule(
                0,
                Task::Modulate {
                    instance: primary_id,
                    tick: 0,
                },
            )),
        });

        tracing::info!(
            effect = %name,
            %asset,
            layers = definition.layers.len(),
            modulated = modulation.is_some(),
            character = %primary.character(),
            "effect started"
        );

        self.active = Some(ActiveEffect {
            definition,
            asset: asset.clone(),
            started: vec![(0, primary_id)],
            failed: Vec::new(),
            modulation,
        });
        self.listener.on_effect_started(name);
        Ok(())
    }

    /// Cancels every pending task and releases every instance. Never fails and
    /// may be called in any state, any number of times.
    pub fn stop_all(&mut self) {
        if let Some(mut active) = self.active.take() {
            if let Some(modulation) = active.modulation.take() {
                if let Some(instance) = self.pool.get_mut(modulation.instance) {
                    instance.set_volume(modulation.program.reset);
                }
            }
            tracing::info!(effect = %active.name(), "effect stopped");
        }
        self.pool.release_all(&mut self.timers);
    }

    /// Advances logical time to `now_ms`: fires every due task, then handles
    /// completions and errors reported by the host since the last tick.
    pub fn tick(&mut self, now_ms: u64) {
        while let Some((_, task)) = self.timers.pop_due(now_ms) {
            match task {
                Task::StartLayer { layer } => self.start_layer(layer),
                Task::Modulate { instance, tick } => self.modulate(instance, tick),
            }
        }

        for (id, event) in self.pool.drain_events() {
            self.handle_event(id, event);
        }

        if self.active.is_some() && self.pool.is_empty() && self.timers.is_empty() {
            if let Some(active) = self.active.take() {
                tracing::info!(
                    effect = %active.name(),
                    failed_layers = active.failed.len(),
                    "effect finished"
                );
            }
        }
    }

    fn start_layer(&mut self, layer: usize) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        let Some(layer_spec) = active.definition.layers.get(layer).copied() else {
            return;
        };

        match self.pool.create(&active.asset, &layer_spec) {
            Ok(id) => {
                tracing::debug!(
                    effect = %active.definition.name,
                    layer,
                    instance = %id,
                    "layer started"
                );
                active.started.push((layer, id));
            }
            Err(err) => {
                tracing::warn!(
                    effect = %active.definition.name,
                    layer,
                    %err,
                    "layer failed, continuing with the remaining layers"
                );
                active.failed.push(layer);
                self.listener.on_layer_failed(layer, &err);
            }
        }
    }

    fn modulate(&mut self, instance: InstanceId, tick: u32) {
        let Some(modulation) = self
            .active
            .as_mut()
            .and_then(|active| active.modulation.as_mut())
            .filter(|modulation| modulation.instance == instance)
        else {
            return;
        };
        modulation.task = None;
        let program = modulation.program;

        let playing = self
            .pool
            .get(instance)
            .map(|instance| instance.is_playing())
            .unwrap_or(false);

        if !program.continues(tick, playing) {
            if let Some(target) = self.pool.get_mut(instance) {
                target.set_volume(program.reset);
            }
            if let Some(active) = self.active.as_mut() {
                active.modulation = None;
            }
            tracing::debug!(instance = %instance, ticks = tick, "modulation finished");
            return;
        }

        let volume = program.rule.volume_for(tick, &mut self.rng);
        if let Some(target) = self.pool.get_mut(instance) {
            target.set_volume(volume);
        }
        modulation.task = Some(self.timers.schedule(
            program.tick_interval_ms,
            Task::Modulate {
                instance,
                tick: tick + 1,
            },
        ));
    }

    fn handle_event(&mut self, id: InstanceId, event: PlayerEvent) {
        let layer = self.active.as_ref().and_then(|active| active.layer_of(id));

        match event {
            PlayerEvent::Completed => {
                tracing::debug!(instance = %id, ?layer, "layer completed");
                self.finish_instance(id);
                self.listener.on_layer_completed(id);
            }
            PlayerEvent::Error(reason) => {
                let err = EffectError::Playback(reason);
                self.finish_instance(id);
                match layer {
                    Some(0) => {
                        tracing::error!(instance = %id, %err, "primary layer failed");
                        self.listener.on_effect_failed(&err);
                    }
                    Some(layer) => {
                        tracing::warn!(instance = %id, layer, %err, "layer failed mid-playback");
                        if let Some(active) = self.active.as_mut() {
                            active.failed.push(layer);
                        }
                        self.listener.on_layer_failed(layer, &err);
                    }
                    None => tracing::warn!(instance = %id, %err, "untracked instance failed"),
                }
            }
        }
    }

    /// Ends any modulation bound to `id`, restoring its volume, and releases
    /// the instance.
    fn finish_instance(&mut self, id: InstanceId) {
        let modulation = self.active.as_mut().and_then(|active| {
            if active.modulation.as_ref().map(|m| m.instance) == Some(id) {
                active.modulation.take()
            } else {
                None
            }
        });

        if let Some(modulation) = modulation {
            if let Some(task) = modulation.task {
                self.timers.cancel(task);
            }
            if let Some(instance) = self.pool.get_mut(id) {
                instance.set_volume(modulation.program.reset);
            }
        }
        self.pool.release(id);
    }

    fn fail(&mut self, err: EffectError) -> EffectError {
        tracing::error!(%err, "effect could not be applied");
        self.listener.on_effect_failed(&err);
        err
    }
}

impl Drop for EffectScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for EffectScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectScheduler")
            .field("pool", &self.pool)
            .field("pending_tasks", &self.timers.len())
            .field("active", &self.active.as_ref().map(ActiveEffect::name))
            .finish()
    }
}
