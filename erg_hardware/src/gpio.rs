//! Step/dir stepper driver on Raspberry Pi GPIO.

use std::thread::sleep;
use std::time::Duration;

use erg_traits::{Actuator, BoxError};
use rppal::gpio::{Gpio, OutputPin};

use crate::error::{HwError, Result};
use crate::util::{Direction, steps_between};

#[derive(Debug, Clone, Copy)]
pub struct StepDirPins {
    pub step: u8,
    pub dir: u8,
    /// Active-low driver enable. Driven high to drop holding torque.
    pub enable: Option<u8>,
}

/// Brake stepper driven by step pulses. Position is dead-reckoned from the
/// pulses issued; each `current_position` read moves at most
/// `max_steps_per_poll` steps towards the target.
pub struct StepDirActuator {
    step: OutputPin,
    dir: OutputPin,
    enable: Option<OutputPin>,
    pulse: Duration,
    units_per_step: i32,
    max_steps_per_poll: u32,
    target: i32,
    position: i32,
    min: i32,
    max: i32,
}

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

impl StepDirActuator {
    pub fn new(pins: StepDirPins, step_pulse_us: u64, units_per_step: i32) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut step = gpio.get(pins.step).map_err(gpio_err)?.into_output();
        let dir = gpio.get(pins.dir).map_err(gpio_err)?.into_output();
        let enable = match pins.enable {
            Some(p) => {
                let mut en = gpio.get(p).map_err(gpio_err)?.into_output();
                en.set_low();
                Some(en)
            }
            None => None,
        };
        step.set_low();
        tracing::info!(step = pins.step, dir = pins.dir, "stepper ready");
        Ok(Self {
            step,
            dir,
            enable,
            pulse: Duration::from_micros(step_pulse_us.max(1)),
            units_per_step: units_per_step.max(1),
            max_steps_per_poll: 200,
            target: 0,
            position: 0,
            min: i32::MIN,
            max: i32::MAX,
        })
    }

    pub fn with_max_steps_per_poll(mut self, steps: u32) -> Self {
        self.max_steps_per_poll = steps.max(1);
        self
    }

    fn pulse_steps(&mut self, dir: Direction, steps: u32) {
        match dir {
            Direction::Tighten => self.dir.set_high(),
            Direction::Loosen => self.dir.set_low(),
        }
        if let Some(en) = self.enable.as_mut() {
            en.set_low();
        }
        for _ in 0..steps {
            self.step.set_high();
            sleep(self.pulse);
            self.step.set_low();
            sleep(self.pulse);
        }
        let moved = self.units_per_step.saturating_mul(steps as i32);
        self.position = match dir {
            Direction::Tighten => self.position.saturating_add(moved),
            Direction::Loosen => self.position.saturating_sub(moved),
        };
    }
}

impl Actuator for StepDirActuator {
    fn set_target_position(&mut self, position: i32) -> std::result::Result<(), BoxError> {
        self.target = position.clamp(self.min, self.max);
        Ok(())
    }

    fn target_position(&self) -> i32 {
        self.target
    }

    fn current_position(&mut self) -> std::result::Result<i32, BoxError> {
        let (dir, steps) = steps_between(self.position, self.target, self.units_per_step);
        let steps = steps.min(self.max_steps_per_poll);
        if steps > 0 {
            self.pulse_steps(dir, steps);
        } else {
            // within one step: report arrival
            self.position = self.target;
        }
        tracing::trace!(position = self.position, goal = self.target, "stepper position");
        Ok(self.position)
    }

    fn release_tension(&mut self) -> std::result::Result<(), BoxError> {
        match self.enable.as_mut() {
            Some(en) => en.set_high(),
            None => tracing::warn!("no enable pin; holding torque stays on"),
        }
        Ok(())
    }

    fn set_travel_limits(&mut self, min: i32, max: i32) -> std::result::Result<(), BoxError> {
        if min > max {
            return Err(HwError::InvalidLimits { min, max }.into());
        }
        self.min = min;
        self.max = max;
        Ok(())
    }
}
