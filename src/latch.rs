//! Interrupt-to-main-loop hand-off of raw ADC conversion results.
//!
//! Conversion-complete interrupts store raw codes with [`ConversionLatch::publish`];
//! the main loop converts them to engineering units on read, so no floating
//! point runs in interrupt context.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::calibration::ChannelSet;
use crate::data_types::SensorChannel;
use crate::error::Error;
use crate::hal::Sensors;

#[derive(Clone, Copy)]
struct LatchState {
    codes: [u16; SensorChannel::COUNT],
    /// Channels completed since their group was last triggered.
    ready: ChannelSet,
    /// Channels that have ever produced a sample.
    sampled: ChannelSet,
}

/// Latest raw code per channel, shared between interrupt and main-loop context.
pub struct ConversionLatch {
    state: Mutex<RefCell<LatchState>>,
}

impl ConversionLatch {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(LatchState {
                codes: [0; SensorChannel::COUNT],
                ready: ChannelSet::empty(),
                sampled: ChannelSet::empty(),
            })),
        }
    }

    /// Store a completed conversion. Interrupt-safe.
    pub fn publish(&self, channel: SensorChannel, code: u16) {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            state.codes[channel.index()] = code;
            state.ready.insert(channel.mask());
            state.sampled.insert(channel.mask());
        });
    }

    /// Mark every channel in `group` as pending a new conversion.
    pub fn invalidate(&self, group: ChannelSet) {
        critical_section::with(|cs| {
            self.state.borrow_ref_mut(cs).ready.remove(group);
        });
    }

    pub fn is_ready(&self, group: ChannelSet) -> bool {
        critical_section::with(|cs| self.state.borrow_ref(cs).ready.contains(group))
    }

    /// Raw code of a channel, if it has ever been converted.
    pub fn raw(&self, channel: SensorChannel) -> Option<u16> {
        critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            state
                .sampled
                .contains(channel.mask())
                .then_some(state.codes[channel.index()])
        })
    }

    /// Calibrated value of a channel.
    pub fn read(&self, channel: SensorChannel) -> Result<f32, Error> {
        self.raw(channel)
            .map(|code| channel.calibration().convert(code))
            .ok_or(Error::NoSample(channel))
    }
}

impl Default for ConversionLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts conversions on the ADC.
pub trait ConversionTrigger {
    fn start(&mut self, group: ChannelSet);
}

impl<F> ConversionTrigger for F
where
    F: FnMut(ChannelSet),
{
    fn start(&mut self, group: ChannelSet) {
        self(group)
    }
}

/// [`Sensors`] backed by a [`ConversionLatch`] filled from interrupts.
pub struct LatchedSensors<'a, T> {
    latch: &'a ConversionLatch,
    trigger: T,
}

impl<'a, T> LatchedSensors<'a, T>
where
    T: ConversionTrigger,
{
    pub fn new(latch: &'a ConversionLatch, trigger: T) -> Self {
        Self { latch, trigger }
    }

    pub fn latch(&self) -> &'a ConversionLatch {
        self.latch
    }
}

impl<T> Sensors for LatchedSensors<'_, T>
where
    T: ConversionTrigger,
{
    type Error = Error;

    fn read_sensor(&mut self, channel: SensorChannel) -> Result<f32, Self::Error> {
        self.latch.read(channel)
    }

    fn trigger_conversion(&mut self, group: ChannelSet) {
        // Pending bits must be cleared before the ADC is started.
        self.latch.invalidate(group);
        self.trigger.start(group);
    }

    fn conversion_ready(&mut self, group: ChannelSet) -> bool {
        self.latch.is_ready(group)
    }
}
