//! ADC front-end constants, conversion groups and raw-code conversion helpers.
//! Divider and sensor values follow the charger board schematic.

/// Full-scale code of the 12-bit converter.
pub const ADC_MAX_CODE: u16 = 4095;
/// ADC reference voltage.
pub const ADC_VREF_MV: u32 = 3_300;
pub const ADC_VREF_V: f32 = 3.3;

/// PV input sense divider (top / bottom, ohms).
pub const PV_SENSE_R1: u32 = 7_500;
pub const PV_SENSE_R2: u32 = 1_000;

/// Battery sense divider.
pub const BATT_SENSE_R1: u32 = 100_000;
pub const BATT_SENSE_R2: u32 = 100_000;

/// 5 V buck output feedback divider.
pub const BUCK_5V0_R1: u32 = 5_110;
pub const BUCK_5V0_R2: u32 = 5_110;

/// 3.3 V buck output feedback divider.
pub const BUCK_3V3_R1: u32 = 3_090;
pub const BUCK_3V3_R2: u32 = 7_150;

/// Hall-effect current sensor: output at zero current.
pub const CURRENT_SENSE_QUIESCENT_V: f32 = 0.25;
/// Hall-effect current sensor sensitivity (400 mV/A).
pub const CURRENT_SENSE_V_PER_A: f32 = 0.4;
pub const CURRENT_SENSE_MAX_A: f32 = 5.0;

bitflags::bitflags! {
    /// Set of sensor channels, one bit per channel. Used to name conversion
    /// groups and to track which channels hold a fresh sample.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ChannelSet: u8 {
        const PV1_VOLTAGE     = 1 << 0;
        const PV1_CURRENT     = 1 << 1;
        const PV2_VOLTAGE     = 1 << 2;
        const PV2_CURRENT     = 1 << 3;
        const BUCK_5V0        = 1 << 4;
        const BUCK_3V3        = 1 << 5;
        const BATTERY_VOLTAGE = 1 << 6;
        const BATTERY_CURRENT = 1 << 7;

        const PV1     = Self::PV1_VOLTAGE.bits() | Self::PV1_CURRENT.bits();
        const PV2     = Self::PV2_VOLTAGE.bits() | Self::PV2_CURRENT.bits();
        const BATTERY = Self::BATTERY_VOLTAGE.bits() | Self::BATTERY_CURRENT.bits();
        /// Everything an MPPT pass consumes.
        const MPPT_PASS = Self::PV1.bits() | Self::PV2.bits() | Self::BATTERY.bits();
    }

    /// Pending control passes. Bit positions match [`crate::data_types::Cadence`].
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct DueFlags: u8 {
        const PID  = 1 << 0;
        const MPPT = 1 << 1;
    }
}

/// How a channel's converted voltage maps to engineering units.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Calibration {
    /// Voltage seen through a resistor divider; `r1` is the top leg.
    Divider { r1: u32, r2: u32 },
    /// Hall-effect current sensor with a quiescent offset.
    HallCurrent { quiescent_v: f32, volts_per_amp: f32 },
}

impl Calibration {
    /// Convert a raw ADC code to volts or amps.
    pub fn convert(&self, code: u16) -> f32 {
        let sensed = adc_code_to_volts(code);
        match *self {
            Calibration::Divider { r1, r2 } => undivide(sensed, r1, r2),
            Calibration::HallCurrent {
                quiescent_v,
                volts_per_amp,
            } => (sensed - quiescent_v) / volts_per_amp,
        }
    }
}

/// Convert an ADC code to millivolts at the pin. Codes above full scale clamp.
pub fn adc_code_to_mv(code: u16) -> u32 {
    let code = code.min(ADC_MAX_CODE) as u32;
    (ADC_VREF_MV * code) / ADC_MAX_CODE as u32
}

/// Convert an ADC code to volts at the pin.
pub fn adc_code_to_volts(code: u16) -> f32 {
    let code = code.min(ADC_MAX_CODE);
    (code as f32 * ADC_VREF_V) / ADC_MAX_CODE as f32
}

/// Divider output for a given source voltage.
pub fn divide(v_source: f32, r1: u32, r2: u32) -> f32 {
    (v_source * r2 as f32) / (r1 + r2) as f32
}

/// Source voltage recovered from a divider output.
pub fn undivide(v_out: f32, r1: u32, r2: u32) -> f32 {
    (v_out / r2 as f32) * (r1 + r2) as f32
}

/// Current reported by the hall sensor for a pin voltage.
pub fn hall_current(v_sense: f32) -> f32 {
    (v_sense - CURRENT_SENSE_QUIESCENT_V) / CURRENT_SENSE_V_PER_A
}
