//! Piezo tunes over a differential PWM pair
//!
//! [`PwmBuzzer`] is the board binding for [`Feedback`]; the mock hardware
//! sounds through one driving a [`MockPwm`](super::MockPwm).

use std::time::Duration;

use super::{DifferentialPwm, Feedback};

const C6: u32 = 1047;
const E6: u32 = 1319;
const G6: u32 = 1568;
const C7: u32 = 2093;
const A7: u32 = 3520;

/// 50% duty on a 16 bit channel
const ON_DUTY: u16 = 0x8000;

/// Feedback sounds the core can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tune {
    /// Start-up
    Happy,
    /// Shot accepted, menu select
    Bip,
    /// Menu scroll, countdown tick
    Bop,
    /// Anything went wrong
    Sad,
    /// Happy played backwards
    Shutdown,
    /// Three consecutive shots at one target
    TripleShot,
}

impl Tune {
    /// Frequency (Hz) and duration (ms) of each note
    pub fn notes(self) -> &'static [(u32, u64)] {
        match self {
            Tune::Happy => &[(C6, 50), (E6, 50), (G6, 50), (C7, 50)],
            Tune::Bip => &[(A7, 50)],
            Tune::Bop => &[(C7, 50)],
            Tune::Sad => &[(G6, 100), (C6, 200)],
            Tune::Shutdown => &[(C7, 50), (G6, 50), (E6, 50), (C6, 50)],
            Tune::TripleShot => &[(A7, 30), (C7, 30), (A7, 30), (C7, 30), (A7, 30)],
        }
    }

    pub fn duration(self) -> Duration {
        Duration::from_millis(self.notes().iter().map(|(_, ms)| ms).sum())
    }
}

/// Plays tunes on a [`DifferentialPwm`] channel
pub struct PwmBuzzer<P> {
    pwm: P,
}

impl<P: DifferentialPwm> PwmBuzzer<P> {
    pub fn new(pwm: P) -> Self {
        pwm.set_duty_cycle(0);
        Self { pwm }
    }

    pub fn pwm(&self) -> &P {
        &self.pwm
    }
}

impl<P: DifferentialPwm> Feedback for PwmBuzzer<P> {
    async fn play(&self, tune: Tune) {
        for &(hz, ms) in tune.notes() {
            self.pwm.set_frequency(hz);
            self.pwm.set_duty_cycle(ON_DUTY);
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        self.pwm.set_duty_cycle(0);
    }
}
