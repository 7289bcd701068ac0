use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{AssetHandle, AssetStore, EffectError, Result};

use super::{NativePlayer, PlayerEvent, PlayerFactory, StereoVolume};

const DEFAULT_RATE_RANGE: (f32, f32) = (0.25, 4.0);

/// Command issued to a simulated player, as recorded in the host log.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Prepare,
    Start,
    Stop,
    Volume(StereoVolume),
    Rate { speed: f32, pitch: f32 },
    Release,
}

/// A command together with the host time and player it was issued to.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRecord {
    pub at_ms: u64,
    pub player: usize,
    pub command: HostCommand,
}

/// Deterministic in-process playback host.
///
/// Registered assets have a fixed duration; a started player finishes once
/// `elapsed * speed` reaches it. Time only moves through [`advance_to`], so
/// the same host can back scenario tests and the command line demo.
///
/// [`advance_to`]: SimulatedHost::advance_to
#[derive(Debug, Clone, Default)]
pub struct SimulatedHost {
    shared: Arc<Mutex<HostState>>,
}

#[derive(Debug)]
struct HostState {
    now_ms: u64,
    assets: HashMap<AssetHandle, u64>,
    rate_range: (f32, f32),
    prepare_calls: usize,
    start_calls: usize,
    failing_prepares: HashSet<usize>,
    failing_starts: HashSet<usize>,
    players: Vec<PlayerSlot>,
    log: Vec<HostRecord>,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            now_ms: 0,
            assets: HashMap::new(),
            rate_range: DEFAULT_RATE_RANGE,
            prepare_calls: 0,
            start_calls: 0,
            failing_prepares: HashSet::new(),
            failing_starts: HashSet::new(),
            players: Vec::new(),
            log: Vec::new(),
        }
    }
}

impl HostState {
    fn record(&mut self, player: usize, command: HostCommand) {
        let at_ms = self.now_ms;
        self.log.push(HostRecord {
            at_ms,
            player,
            command,
        });
    }
}

#[derive(Debug)]
struct PlayerSlot {
    duration_ms: Option<u64>,
    speed: f32,
    started_at: Option<u64>,
    stopped: bool,
    released: bool,
    finished_reported: bool,
    pending_error: Option<String>,
}

impl PlayerSlot {
    fn new() -> Self {
        Self {
            duration_ms: None,
            speed: 1.0,
            started_at: None,
            stopped: false,
            released: false,
            finished_reported: false,
            pending_error: None,
        }
    }

    fn reached_end(&self, now_ms: u64) -> bool {
        match (self.started_at, self.duration_ms) {
            (Some(started), Some(duration)) => {
                now_ms.saturating_sub(started) as f32 * self.speed >= duration as f32
            }
            _ => false,
        }
    }

    fn is_playing(&self, now_ms: u64) -> bool {
        self.started_at.is_some()
            && !self.stopped
            && !self.released
            && !self.finished_reported
            && self.pending_error.is_none()
            && !self.reached_end(now_ms)
    }
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a recording that players can bind to.
    pub fn add_asset(&self, asset: AssetHandle, duration_ms: u64) {
        if let Ok(mut state) = self.lock() {
            state.assets.insert(asset, duration_ms);
        }
    }

    /// Moves host time forward. Earlier times are ignored.
    pub fn advance_to(&self, now_ms: u64) {
        if let Ok(mut state) = self.lock() {
            state.now_ms = state.now_ms.max(now_ms);
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.lock().map(|state| state.now_ms).unwrap_or_default()
    }

    /// Inclusive range of speeds and pitches the host can apply.
    pub fn set_rate_range(&self, min: f32, max: f32) {
        if let Ok(mut state) = self.lock() {
            state.rate_range = (min, max);
        }
    }

    /// Makes the `n`th prepare call (0-based, across all players) fail.
    pub fn fail_nth_prepare(&self, n: usize) {
        if let Ok(mut state) = self.lock() {
            state.failing_prepares.insert(n);
        }
    }

    /// Makes the `n`th start call (0-based, across all players) fail.
    pub fn fail_nth_start(&self, n: usize) {
        if let Ok(mut state) = self.lock() {
            state.failing_starts.insert(n);
        }
    }

    /// Makes a started player report a mid-playback error.
    pub fn inject_error(&self, player: usize, reason: impl Into<String>) {
        if let Ok(mut state) = self.lock() {
            if let Some(slot) = state.players.get_mut(player) {
                slot.pending_error = Some(reason.into());
            }
        }
    }

    /// Number of players ever created by this host.
    pub fn player_count(&self) -> usize {
        self.lock().map(|state| state.players.len()).unwrap_or_default()
    }

    /// Number of players that have not been released.
    pub fn live_players(&self) -> usize {
        self.lock()
            .map(|state| state.players.iter().filter(|slot| !slot.released).count())
            .unwrap_or_default()
    }

    pub fn records(&self) -> Vec<HostRecord> {
        self.lock().map(|state| state.log.clone()).unwrap_or_default()
    }

    /// Commands issued to one player, in order.
    pub fn commands_for(&self, player: usize) -> Vec<(u64, HostCommand)> {
        self.records()
            .into_iter()
            .filter(|record| record.player == player)
            .map(|record| (record.at_ms, record.command))
            .collect()
    }

    /// Volume changes issued to one player, in order.
    pub fn volumes_for(&self, player: usize) -> Vec<(u64, StereoVolume)> {
        self.commands_for(player)
            .into_iter()
            .filter_map(|(at, command)| match command {
                HostCommand::Volume(volume) => Some((at, volume)),
                _ => None,
            })
            .collect()
    }

    /// Host time at which each player started, in creation order.
    pub fn start_times(&self) -> Vec<(usize, u64)> {
        self.records()
            .into_iter()
            .filter(|record| record.command == HostCommand::Start)
            .map(|record| (record.player, record.at_ms))
            .collect()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HostState>> {
        self.shared
            .lock()
            .map_err(|_| EffectError::msg("simulated host state has been poisoned"))
    }
}

impl PlayerFactory for SimulatedHost {
    fn create_player(&self) -> Box<dyn NativePlayer> {
        let index = match self.lock() {
            Ok(mut state) => {
                state.players.push(PlayerSlot::new());
                state.players.len() - 1
            }
            Err(_) => usize::MAX,
        };

        Box::new(SimulatedPlayer {
            shared: self.shared.clone(),
            index,
        })
    }
}

impl AssetStore for SimulatedHost {
    fn exists(&self, asset: &AssetHandle) -> bool {
        self.lock()
            .map(|state| state.assets.contains_key(asset))
            .unwrap_or(false)
    }

    fn absolute_path(&self, asset: &AssetHandle) -> Result<PathBuf> {
        if self.exists(asset) {
            Ok(PathBuf::from("/simulated").join(asset.path()))
        } else {
            Err(EffectError::AssetMissing(asset.clone()))
        }
    }
}

struct SimulatedPlayer {
    shared: Arc<Mutex<HostState>>,
    index: usize,
}

impl SimulatedPlayer {
    fn lock(&self) -> Result<MutexGuard<'_, HostState>> {
        self.shared
            .lock()
            .map_err(|_| EffectError::msg("simulated host state has been poisoned"))
    }

    fn with_slot<R>(&self, f: impl FnOnce(&mut HostState, usize) -> R) -> Option<R> {
        let mut state = self.lock().ok()?;
        if self.index >= state.players.len() {
            return None;
        }
        Some(f(&mut state, self.index))
    }
}

impl NativePlayer for SimulatedPlayer {
    fn prepare(&mut self, asset: &AssetHandle) -> Result<()> {
        let mut state = self.lock()?;
        let call = state.prepare_calls;
        state.prepare_calls += 1;
        state.record(self.index, HostCommand::Prepare);

        let reason = if state.failing_prepares.contains(&call) {
            Some("host rejected the data source".to_string())
        } else if !state.assets.contains_key(asset) {
            Some("no such recording".to_string())
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(EffectError::Prepare {
                asset: asset.clone(),
                reason,
            });
        }

        let duration = state.assets.get(asset).copied();
        let slot = state
            .players
            .get_mut(self.index)
            .ok_or_else(|| EffectError::msg("unknown simulated player"))?;
        slot.duration_ms = duration;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let mut state = self.lock()?;
        let call = state.start_calls;
        state.start_calls += 1;
        if state.failing_starts.contains(&call) {
            return Err(EffectError::Playback("host refused to start".to_string()));
        }

        let now = state.now_ms;
        let slot = state
            .players
            .get_mut(self.index)
            .ok_or_else(|| EffectError::msg("unknown simulated player"))?;
        if slot.duration_ms.is_none() {
            return Err(EffectError::Playback("player was never prepared".to_string()));
        }
        slot.started_at = Some(now);
        state.record(self.index, HostCommand::Start);
        Ok(())
    }

    fn stop(&mut self) {
        self.with_slot(|state, index| {
            let now = state.now_ms;
            let slot = &mut state.players[index];
            if slot.is_playing(now) {
                slot.stopped = true;
                state.record(index, HostCommand::Stop);
            }
        });
    }

    fn set_volume(&mut self, volume: StereoVolume) {
        self.with_slot(|state, index| state.record(index, HostCommand::Volume(volume)));
    }

    fn set_playback_rate(&mut self, speed: f32, pitch: f32) -> Result<()> {
        let mut state = self.lock()?;
        let (min, max) = state.rate_range;
        let supported = |value: f32| value >= min && value <= max;
        if !supported(speed) || !supported(pitch) {
            return Err(EffectError::UnsupportedRate { speed, pitch });
        }

        let slot = state
            .players
            .get_mut(self.index)
            .ok_or_else(|| EffectError::msg("unknown simulated player"))?;
        slot.speed = speed;
        state.record(self.index, HostCommand::Rate { speed, pitch });
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.with_slot(|state, index| state.players[index].is_playing(state.now_ms))
            .unwrap_or(false)
    }

    fn poll_event(&mut self) -> Option<PlayerEvent> {
        self.with_slot(|state, index| {
            let now = state.now_ms;
            let slot = &mut state.players[index];
            if slot.finished_reported || slot.released || slot.stopped {
                return None;
            }
            slot.started_at?;

            if let Some(reason) = slot.pending_error.take() {
                slot.finished_reported = true;
                return Some(PlayerEvent::Error(reason));
            }
            if slot.reached_end(now) {
                slot.finished_reported = true;
                return Some(PlayerEvent::Completed);
            }
            None
        })
        .flatten()
    }

    fn release(&mut self) {
        self.with_slot(|state, index| {
            let slot = &mut state.players[index];
            if !slot.released {
                slot.released = true;
                state.record(index, HostCommand::Release);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared_player(host: &SimulatedHost, duration_ms: u64) -> Box<dyn NativePlayer> {
        let asset = AssetHandle::new("take.aac");
        host.add_asset(asset.clone(), duration_ms);
        let mut player = host.create_player();
        player.prepare(&asset).unwrap();
        player
    }

    #[test]
    fn faster_playback_finishes_sooner() {
        let host = SimulatedHost::new();
        let mut player = prepared_player(&host, 1_500);
        player.set_playback_rate(1.5, 2.0).unwrap();
        player.start().unwrap();

        host.advance_to(990);
        assert!(player.is_playing());
        host.advance_to(1_000);
        assert!(!player.is_playing());
        assert_eq!(player.poll_event(), Some(PlayerEvent::Completed));
        assert_eq!(player.poll_event(), None);
    }

    #[test]
    fn injected_failures_hit_the_requested_call() {
        let host = SimulatedHost::new();
        host.fail_nth_prepare(1);
        let asset = AssetHandle::new("take.aac");
        host.add_asset(asset.clone(), 100);

        assert!(host.create_player().prepare(&asset).is_ok());
        assert!(host.create_player().prepare(&asset).is_err());
        assert!(host.create_player().prepare(&asset).is_ok());
    }

    #[test]
    fn injected_errors_end_playback() {
        let host = SimulatedHost::new();
        let mut player = prepared_player(&host, 1_000);
        player.start().unwrap();

        host.inject_error(0, "decoder underrun");
        assert!(!player.is_playing());
        assert_eq!(
            player.poll_event(),
            Some(PlayerEvent::Error("decoder underrun".to_string()))
        );
        assert_eq!(player.poll_event(), None);
    }

    #[test]
    fn stopped_players_report_nothing() {
        let host = SimulatedHost::new();
        let mut player = prepared_player(&host, 100);
        player.start().unwrap();
        player.stop();

        host.advance_to(1_000);
        assert_eq!(player.poll_event(), None);
        assert_eq!(
            host.commands_for(0)
                .into_iter()
                .map(|(_, command)| command)
                .collect::<Vec<_>>(),
            vec![HostCommand::Prepare, HostCommand::Start, HostCommand::Stop]
        );
    }

    #[test]
    fn acts_as_an_asset_store() {
        let host = SimulatedHost::new();
        let asset = AssetHandle::new("take.aac");
        assert!(!host.exists(&asset));

        host.add_asset(asset.clone(), 10);
        assert!(host.exists(&asset));
        assert!(host.absolute_path(&asset).unwrap().is_absolute());
    }
}
