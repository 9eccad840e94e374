//! The engine ties the board together: MIDI and the control scan go in, and
//! DAC codes, gate levels, and DCO frequencies come out.

use wmidi::{ControlFunction, MidiMessage};

use crate::calibration::CalibrationTable;
use crate::config::BoardConfig;
use crate::controls::{ControlChange, ControlState};
use crate::notes::{note_to_cv, reference_frequency, velocity_to_cv};
use crate::outputs::{CvChannel, CvSink, Dco, GateLatch};
use crate::storage::Settings;
use crate::util::offset_by_cents;
use crate::voicealloc::{Allocator, KeyboardMode, VoiceAllocator};
use crate::voice::VoiceTable;
use crate::NUM_VOICES;

/// The spread between the outermost voices in unison mode at full detune, in
/// cents either side of the note
pub const MAX_DETUNE_CENTS: f32 = 50.0;

/// An error from one of the output devices
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderError<C, D> {
    /// Writing a CV or the gates failed
    Cv(C),
    /// Setting a DCO frequency failed
    Dco(D),
}

/// The last value sent to each output, so unchanged outputs aren't rewritten
#[derive(Clone, Debug, Default)]
struct OutputCache {
    notes: [Option<u16>; NUM_VOICES],
    velocities: [Option<u16>; NUM_VOICES],
    fm: Option<u16>,
    tm: Option<u16>,
    latch: Option<GateLatch>,
    freqs: [Option<u32>; NUM_VOICES],
}

/// Update a cached output, calling `write` only if the value changed
fn update<T: PartialEq + Copy, E>(
    cached: &mut Option<T>,
    value: T,
    write: impl FnOnce(T) -> Result<(), E>,
) -> Result<(), E> {
    if *cached != Some(value) {
        write(value)?;
        *cached = Some(value);
    }
    Ok(())
}

/// The note-handling core of the board
#[derive(Clone, Debug)]
pub struct Engine {
    config: BoardConfig,
    settings: Settings,
    alloc: Allocator,
    controls: ControlState,
    calibration: CalibrationTable,
    cache: OutputCache,
}

impl Engine {
    /// Create an engine with the given (usually freshly loaded) settings and
    /// calibration
    pub fn new(config: BoardConfig, settings: Settings, calibration: CalibrationTable) -> Self {
        Self {
            config,
            settings,
            alloc: Allocator::new(settings.keyboard_mode),
            controls: ControlState::new(),
            calibration,
            cache: OutputCache::default(),
        }
    }
    /// The board configuration
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }
    /// The current user settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }
    /// The voice table
    pub fn voices(&self) -> &VoiceTable {
        self.alloc.voices()
    }
    /// The modulation state
    pub fn controls(&self) -> &ControlState {
        &self.controls
    }
    /// The calibration table
    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }
    /// The calibration table, mutably (for autotune)
    pub fn calibration_mut(&mut self) -> &mut CalibrationTable {
        &mut self.calibration
    }
    /// Zero every tuning correction
    pub fn reset_calibration(&mut self) {
        self.calibration.clear();
        self.cache.freqs = [None; NUM_VOICES];
    }
    /// Forget what was last written to the outputs, so the next render
    /// rewrites all of them (e.g. after autotune has used the DCOs)
    pub fn invalidate_outputs(&mut self) {
        self.cache = OutputCache::default();
    }
    /// Change the keyboard mode.  All notes are released.
    pub fn set_keyboard_mode(&mut self, mode: KeyboardMode) {
        if mode != self.alloc.mode() {
            self.alloc = Allocator::new(mode);
        }
        self.settings.keyboard_mode = mode;
    }
    /// Set the transpose, in semitones (clamped to +/- 12).  All notes are
    /// released, since held notes would otherwise never see their note off.
    pub fn set_transpose(&mut self, semitones: i8) {
        self.settings.transpose = semitones.clamp(-12, 12);
        self.alloc.reset();
    }
    /// Set the octave shift (clamped to +/- 2).  All notes are released.
    pub fn set_octave(&mut self, octave: i8) {
        self.settings.octave = octave.clamp(-2, 2);
        self.alloc.reset();
    }
    /// Set the MIDI channel (1-16), or 0 to listen on every channel.  Returns
    /// false if the channel is invalid.
    pub fn set_master_channel(&mut self, channel: u8) -> bool {
        if channel > 16 {
            return false;
        }
        self.settings.master_channel = channel;
        self.alloc.reset();
        true
    }
    /// Set the pitch bend range in semitones (clamped to 1-12)
    pub fn set_pitch_bend_range(&mut self, semitones: u8) {
        self.settings.pitch_bend_range = semitones.clamp(1, 12);
    }
    fn accepts(&self, msg: &MidiMessage) -> bool {
        match (self.settings.master_channel, msg.channel()) {
            (_, None) => false,
            (0, Some(_)) => true,
            (master, Some(ch)) => ch.index() + 1 == master,
        }
    }
    fn shift(&self, note: wmidi::Note) -> Option<u8> {
        let shifted = u8::from(note) as i16 + self.settings.note_shift();
        u8::try_from(shifted).ok().filter(|n| *n <= 127)
    }
    /// Handle an incoming MIDI message.  Returns false if the message was
    /// ignored (wrong channel or not something the board responds to).
    pub fn handle_midi(&mut self, msg: &MidiMessage) -> bool {
        if !self.accepts(msg) {
            return false;
        }
        match msg {
            MidiMessage::NoteOn(_, note, vel) if u8::from(*vel) > 0 => {
                if let Some(n) = self.shift(*note) {
                    self.alloc.assign(n, u8::from(*vel));
                }
            }
            MidiMessage::NoteOn(_, note, _) | MidiMessage::NoteOff(_, note, _) => {
                if let Some(n) = self.shift(*note) {
                    self.alloc.release(n);
                }
            }
            MidiMessage::ControlChange(_, cc, value) => {
                let value = u8::from(*value);
                match *cc {
                    ControlFunction::DAMPER_PEDAL => self.alloc.sustain(value >= 64),
                    ControlFunction::MODULATION_WHEEL => {
                        self.controls.mod_wheel = value as f32 / 127.0
                    }
                    ControlFunction::ALL_NOTES_OFF | ControlFunction::ALL_SOUND_OFF => {
                        self.alloc.reset()
                    }
                    _ => return false,
                }
            }
            MidiMessage::PitchBendChange(_, bend) => {
                self.controls.bend = (u16::from(*bend) as f32 - 8192.0) / 8192.0;
            }
            MidiMessage::ChannelPressure(_, pressure) => {
                self.controls.aftertouch = u8::from(*pressure) as f32 / 127.0;
            }
            _ => return false,
        }
        true
    }
    /// Store a reading from the control scan
    pub fn apply_control(&mut self, change: ControlChange) {
        self.controls.apply(change);
    }
    /// The detune of a voice slot, in cents
    fn detune_cents(&self, slot: usize) -> f32 {
        if self.alloc.mode() != KeyboardMode::Unison {
            return 0.0;
        }
        let center = (NUM_VOICES - 1) as f32 / 2.0;
        self.controls.detune * MAX_DETUNE_CENTS * (slot as f32 - center) / center
    }
    /// The frequency the DCO of `slot` should run at, in Hz
    pub fn dco_frequency(&self, slot: usize) -> Option<f32> {
        let voice = self.alloc.voices().get(slot)?;
        let note = voice.pitch();
        let bend = self.controls.bend_semitones(self.settings.pitch_bend_range);
        let cents = bend.to_num::<f32>() * 100.0 + self.detune_cents(slot);
        let freq = offset_by_cents(reference_frequency(note)?, cents);
        Some(self.calibration.correct(slot, note, freq))
    }
    /// Advance the trigger pulses and write the CV, gate, and trigger
    /// outputs.  Only outputs whose value changed are written.
    pub fn render_cv<C: CvSink>(&mut self, now_ms: u32, cv: &mut C) -> Result<(), C::Error> {
        let bend = self.controls.bend_semitones(self.settings.pitch_bend_range);
        let trigger_ms = self.config.trigger_ms;
        let mut latch = GateLatch::new();
        for voice in self.alloc.voices_mut().iter_mut() {
            let trigger = voice.tick_trigger(now_ms, trigger_ms);
            latch.set(voice.slot(), voice.gate(), trigger);
        }
        for voice in self.alloc.voices().iter() {
            let slot = voice.slot();
            update(
                &mut self.cache.notes[slot],
                note_to_cv(voice.pitch(), bend),
                |code| cv.set_cv(CvChannel::Note(slot), code),
            )?;
            update(
                &mut self.cache.velocities[slot],
                velocity_to_cv(voice.velocity()),
                |code| cv.set_cv(CvChannel::Velocity(slot), code),
            )?;
        }
        let fm = (self.controls.fm_amount() * u16::MAX as f32) as u16;
        let tm = (self.controls.tm_amount() * u16::MAX as f32) as u16;
        update(&mut self.cache.fm, fm, |code| cv.set_cv(CvChannel::Fm, code))?;
        update(&mut self.cache.tm, tm, |code| cv.set_cv(CvChannel::Tm, code))?;
        update(&mut self.cache.latch, latch, |latch| cv.set_gates(latch))
    }
    /// Write the DCO frequencies.  Only DCOs whose frequency changed are
    /// written.
    pub fn render_dco<D: Dco>(&mut self, dco: &mut D) -> Result<(), D::Error> {
        for slot in 0..NUM_VOICES {
            let Some(freq) = self.dco_frequency(slot) else {
                continue;
            };
            update(&mut self.cache.freqs[slot], freq.to_bits(), |bits| {
                dco.set_frequency(slot, f32::from_bits(bits))
            })?;
        }
        Ok(())
    }
    /// Write every output: see [Engine::render_cv] and [Engine::render_dco]
    pub fn render<C: CvSink, D: Dco>(
        &mut self,
        now_ms: u32,
        cv: &mut C,
        dco: &mut D,
    ) -> Result<(), RenderError<C::Error, D::Error>> {
        self.render_cv(now_ms, cv).map_err(RenderError::Cv)?;
        self.render_dco(dco).map_err(RenderError::Dco)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(
            BoardConfig::default(),
            Settings::default(),
            CalibrationTable::default(),
        )
    }
}
