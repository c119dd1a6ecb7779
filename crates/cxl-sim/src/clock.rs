//! Two-domain rational clock dispatcher.
//!
//! Frequencies are given as decimals (GHz); both are scaled by the same
//! power of ten until integral, then within one LCM period each domain runs
//! exactly its scaled frequency's worth of cycles. No drift accumulates
//! across periods.

use crate::config::ConfigError;

const CLOCK_IO: usize = 0;
const CLOCK_DRAM: usize = 1;

#[derive(Debug)]
pub struct ClockPlan {
    freq: [u64; 2],
    lcm: u64,
    count: [u64; 2],
    next: [u64; 2],
    internal: u64,
}

impl ClockPlan {
    pub fn new(clock_io: f64, clock_dram: f64) -> Result<Self, ConfigError> {
        let freq = scale_frequencies([clock_io, clock_dram])?;
        let lcm = lcm(freq[0], freq[1]);
        Ok(Self {
            freq,
            lcm,
            count: [0; 2],
            next: [0; 2],
            internal: 0,
        })
    }

    /// Advance the IO domain one cycle and return how many DRAM-domain
    /// cycles fall inside it.
    pub fn advance_io_cycle(&mut self) -> u64 {
        self.bump(CLOCK_IO);

        let mut dram_cycles = 0;
        while self.internal <= self.next[CLOCK_DRAM] && self.next[CLOCK_DRAM] < self.next[CLOCK_IO]
        {
            self.bump(CLOCK_DRAM);
            dram_cycles += 1;
        }

        self.internal += self.lcm / self.freq[CLOCK_IO];
        if self.internal >= self.lcm {
            self.internal = 0;
            self.count = [0; 2];
            self.next = [0; 2];
        }
        dram_cycles
    }

    fn bump(&mut self, domain: usize) {
        self.count[domain] += 1;
        self.next[domain] = self.lcm * self.count[domain] / self.freq[domain];
    }
}

/// Multiply by ten until both values are integers. One digit of decimal
/// precision is the supported configuration surface; anything finer is a
/// configuration error.
fn scale_frequencies(freqs: [f64; 2]) -> Result<[u64; 2], ConfigError> {
    let mut scaled = freqs;
    for _ in 0..2 {
        if scaled.iter().all(|f| f.fract() == 0.0 && *f >= 1.0) {
            return Ok([scaled[0] as u64, scaled[1] as u64]);
        }
        scaled = [
            (scaled[0] * 10.0).round(),
            (scaled[1] * 10.0).round(),
        ];
    }
    let bad = freqs
        .into_iter()
        .find(|f| f.fract() != 0.0 || *f < 1.0)
        .unwrap_or(freqs[0]);
    Err(ConfigError::BadFrequency(bad))
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: u64, b: u64) -> u64 {
    a * b / gcd(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_frequencies_scale_together() {
        assert_eq!(scale_frequencies([0.8, 1.2]).unwrap(), [8, 12]);
        assert_eq!(scale_frequencies([2.0, 3.0]).unwrap(), [2, 3]);
    }

    #[test]
    fn each_domain_runs_its_frequency_per_period() {
        // 0.8 GHz IO vs 1.2 GHz DRAM: per LCM period of 8 IO cycles the
        // DRAM domain must run exactly 12 cycles, with no drift across
        // periods.
        let mut clock = ClockPlan::new(0.8, 1.2).unwrap();
        for _ in 0..3 {
            let dram: u64 = (0..8).map(|_| clock.advance_io_cycle()).sum();
            assert_eq!(dram, 12);
        }
    }

    #[test]
    fn equal_frequencies_tick_one_to_one() {
        let mut clock = ClockPlan::new(1.0, 1.0).unwrap();
        for _ in 0..5 {
            assert_eq!(clock.advance_io_cycle(), 1);
        }
    }

    #[test]
    fn slower_dram_skips_io_cycles() {
        // 1.0 GHz IO vs 0.5 GHz DRAM: one DRAM cycle every other IO cycle.
        let mut clock = ClockPlan::new(1.0, 0.5).unwrap();
        let pattern: Vec<u64> = (0..4).map(|_| clock.advance_io_cycle()).collect();
        assert_eq!(pattern.iter().sum::<u64>(), 2);
    }
}
