//! Declarative effect definitions.
//!
//! Every effect is a list of layers plus an optional modulation program bound
//! to the primary layer. The [`EffectScheduler`](crate::EffectScheduler)
//! interprets these definitions; nothing here touches playback.

use std::{collections::BTreeMap, fmt, str::FromStr};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{EffectError, Result, StereoVolume};

const ECHO_SPACING_MS: u64 = 300;
const ECHO_REPEATS: u32 = 3;
const ECHO_GAIN: f32 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectName {
    /// Plain playback of the recording.
    Normal,
    Robot,
    Squirrel,
    Echo,
    Distortion,
    Ghost,
}

impl EffectName {
    pub const ALL: [EffectName; 6] = [
        EffectName::Normal,
        EffectName::Robot,
        EffectName::Squirrel,
        EffectName::Echo,
        EffectName::Distortion,
        EffectName::Ghost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectName::Normal => "normal",
            EffectName::Robot => "robot",
            EffectName::Squirrel => "squirrel",
            EffectName::Echo => "echo",
            EffectName::Distortion => "distortion",
            EffectName::Ghost => "ghost",
        }
    }
}

impl fmt::Display for EffectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectName {
    type Err = EffectError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| EffectError::UnknownEffect(s.to_string()))
    }
}

/// Starting configuration of one playback instance within an effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Delay from effect-apply time before the layer starts.
    pub delay_ms: u64,
    pub volume: StereoVolume,
    pub speed: f32,
    pub pitch: f32,
}

impl LayerSpec {
    pub const fn new(delay_ms: u64, volume: StereoVolume, speed: f32, pitch: f32) -> Self {
        Self {
            delay_ms,
            volume,
            speed,
            pitch,
        }
    }

    pub fn character(&self) -> RateCharacter {
        RateCharacter::of(self.speed, self.pitch)
    }
}

/// Human-readable summary of how a speed/pitch pair changes the voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateCharacter {
    Normal,
    SlowAndLow,
    FastAndHigh,
    Slow,
    Fast,
    Low,
    High,
}

impl RateCharacter {
    pub fn of(speed: f32, pitch: f32) -> Self {
        use std::cmp::Ordering::*;

        let speed = speed.partial_cmp(&1.0).unwrap_or(Equal);
        let pitch = pitch.partial_cmp(&1.0).unwrap_or(Equal);
        match (speed, pitch) {
            (Equal, Equal) => Self::Normal,
            (Less, Less) => Self::SlowAndLow,
            (Greater, Greater) => Self::FastAndHigh,
            (Less, _) => Self::Slow,
            (Greater, _) => Self::Fast,
            (Equal, Less) => Self::Low,
            (Equal, Greater) => Self::High,
        }
    }
}

impl fmt::Display for RateCharacter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RateCharacter::Normal => "normal",
            RateCharacter::SlowAndLow => "slow and low",
            RateCharacter::FastAndHigh => "fast and high",
            RateCharacter::Slow => "slow",
            RateCharacter::Fast => "fast",
            RateCharacter::Low => "low",
            RateCharacter::High => "high",
        };
        f.write_str(text)
    }
}

/// When a modulation program stops ticking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCondition {
    /// Stop after this many ticks, or earlier if playback ends.
    TickCount(u32),
    /// Tick for as long as the instance keeps playing.
    WhilePlaying,
}

/// Volume applied on each modulation tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeRule {
    /// `even` on even ticks, `odd` on odd ticks.
    Alternate { even: StereoVolume, odd: StereoVolume },
    /// Same random gain on both channels, drawn uniformly from `[min, max]`.
    Uniform { min: f32, max: f32 },
}

impl VolumeRule {
    pub fn volume_for<R: Rng>(&self, tick: u32, rng: &mut R) -> StereoVolume {
        match *self {
            VolumeRule::Alternate { even, odd } => {
                if tick % 2 == 0 {
                    even
                } else {
                    odd
                }
            }
            VolumeRule::Uniform { min, max } => StereoVolume::uniform(rng.gen_range(min..=max)),
        }
    }
}

/// Repeating volume update attached to the primary layer while it plays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModulationProgram {
    pub tick_interval_ms: u64,
    pub stop: StopCondition,
    pub rule: VolumeRule,
    /// Volume restored when the program ends for any reason.
    #[serde(default)]
    pub reset: StereoVolume,
}

impl ModulationProgram {
    /// Whether tick number `tick` (0-based) should apply the rule.
    pub fn continues(&self, tick: u32, playing: bool) -> bool {
        playing
            && match self.stop {
                StopCondition::TickCount(count) => tick < count,
                StopCondition::WhilePlaying => true,
            }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDefinition {
    pub name: EffectName,
    /// Layer 0 is the primary layer; it starts immediately.
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub modulation: Option<ModulationProgram>,
}

impl EffectDefinition {
    pub fn primary(&self) -> Option<&LayerSpec> {
        self.layers.first()
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> Result<()> {
            Err(EffectError::InvalidCatalog(format!("{}: {reason}", self.name)))
        };

        let Some(primary) = self.primary() else {
            return invalid("at least one layer is required".to_string());
        };
        if primary.delay_ms != 0 {
            return invalid("the primary layer must start without delay".to_string());
        }

        let in_unit = |value: f32| (0.0..=1.0).contains(&value);
        for (index, layer) in self.layers.iter().enumerate() {
            if !in_unit(layer.volume.left) || !in_unit(layer.volume.right) {
                return invalid(format!("layer {index} volume must lie in [0, 1]"));
            }
            if !(layer.speed > 0.0 && layer.pitch > 0.0) {
                return invalid(format!("layer {index} speed and pitch must be positive"));
            }
        }

        if let Some(program) = &self.modulation {
            if program.tick_interval_ms == 0 {
                return invalid("modulation tick interval must be positive".to_string());
            }
            if let VolumeRule::Uniform { min, max } = program.rule {
                if !(in_unit(min) && in_unit(max) && min <= max) {
                    return invalid(
                        "uniform modulation range must be ordered within [0, 1]".to_string(),
                    );
                }
            }
        }

        Ok(())
    }
}

/// Lookup table from effect name to definition.
#[derive(Debug, Clone)]
pub struct EffectCatalog {
    definitions: BTreeMap<EffectName, EffectDefinition>,
}

impl Default for EffectCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl EffectCatalog {
    pub fn empty() -> Self {
        Self {
            definitions: BTreeMap::new(),
        }
    }

    /// The stock effects shipped with the application.
    pub fn builtin() -> Self {
        let mut definitions = BTreeMap::new();
        for definition in [normal(), robot(), squirrel(), echo(), distortion(), ghost()] {
            definitions.insert(definition.name, definition);
        }
        Self { definitions }
    }

    /// Parses a JSON array of definitions and lays them over the built-ins.
    pub fn from_json(json: &str) -> Result<Self> {
        let overrides: Vec<EffectDefinition> = serde_json::from_str(json)?;
        let mut catalog = Self::builtin();
        for definition in overrides {
            catalog.insert(definition)?;
        }
        Ok(catalog)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let definitions: Vec<&EffectDefinition> = self.definitions.values().collect();
        Ok(serde_json::to_string_pretty(&definitions)?)
    }

    /// Adds or replaces a definition after validating it.
    pub fn insert(&mut self, definition: EffectDefinition) -> Result<()> {
        definition.validate()?;
        self.definitions.insert(definition.name, definition);
        Ok(())
    }

    pub fn definition_for(&self, name: EffectName) -> Result<&EffectDefinition> {
        self.definitions
            .get(&name)
            .ok_or_else(|| EffectError::UnknownEffect(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = EffectName> + '_ {
        self.definitions.keys().copied()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &EffectDefinition> {
        self.definitions.values()
    }
}

fn normal() -> EffectDefinition {
    EffectDefinition {
        name: EffectName::Normal,
        layers: vec![LayerSpec::new(0, StereoVolume::UNITY, 1.0, 1.0)],
        modulation: None,
    }
}

fn robot() -> EffectDefinition {
    EffectDefinition {
        name: EffectName::Robot,
        layers: vec![LayerSpec::new(0, StereoVolume::UNITY, 1.0, 0.6)],
        modulation: Some(ModulationProgram {
            tick_interval_ms: 150,
            stop: StopCondition::TickCount(10),
            rule: VolumeRule::Alternate {
                even: StereoVolume::new(1.0, 0.5),
                odd: StereoVolume::new(0.5, 1.0),
            },
            reset: StereoVolume::UNITY,
        }),
    }
}

fn squirrel() -> EffectDefinition {
    EffectDefinition {
        name: EffectName::Squirrel,
        layers: vec![LayerSpec::new(0, StereoVolume::UNITY, 1.5, 2.0)],
        modulation: None,
    }
}

fn echo() -> EffectDefinition {
    let mut layers = vec![LayerSpec::new(0, StereoVolume::UNITY, 1.0, 1.0)];
    // Each repeat is quieter: 0.7 / (i + 1).
    layers.extend((1..=ECHO_REPEATS).map(|i| {
        let volume = ECHO_GAIN / (i + 1) as f32;
        LayerSpec::new(
            u64::from(i) * ECHO_SPACING_MS,
            StereoVolume::uniform(volume),
            1.0,
            1.0,
        )
    }));

    EffectDefinition {
        name: EffectName::Echo,
        layers,
        modulation: None,
    }
}

fn distortion() -> EffectDefinition {
    EffectDefinition {
        name: EffectName::Distortion,
        layers: vec![LayerSpec::new(0, StereoVolume::UNITY, 1.0, 1.8)],
        modulation: Some(ModulationProgram {
            tick_interval_ms: 50,
            stop: StopCondition::WhilePlaying,
            rule: VolumeRule::Uniform { min: 0.4, max: 1.0 },
            reset: StereoVolume::UNITY,
        }),
    }
}

fn ghost() -> EffectDefinition {
    EffectDefinition {
        name: EffectName::Ghost,
        layers: vec![
            LayerSpec::new(0, StereoVolume::UNITY, 0.8, 0.7),
            LayerSpec::new(400, StereoVolume::uniform(0.3), 0.75, 0.65),
            LayerSpec::new(800, StereoVolume::uniform(0.15), 0.7, 0.6),
        ],
        modulation: None,
    }
}
