//! Windowed-sinc resampler for mono PCM.
//!
//! A Blackman window over a 32-tap sinc kernel gives the alias rejection
//! that naive sample dropping lacks, which matters most on the 48 kHz to
//! 16 kHz path feeding wake-word scoring.

pub struct MonoResampler {
    ratio: f32,
    index: f32,
    taps: usize,
    history: Vec<f32>,
}

impl MonoResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        let taps = 32;
        Self {
            ratio: source_rate as f32 / target_rate as f32,
            index: 0.0,
            taps,
            history: vec![0.0; taps],
        }
    }

    pub fn is_passthrough(&self) -> bool {
        (self.ratio - 1.0).abs() < f32::EPSILON
    }

    fn sinc(x: f32) -> f32 {
        if x.abs() < 1e-6 {
            return 1.0;
        }
        let pi_x = std::f32::consts::PI * x;
        pi_x.sin() / pi_x
    }

    fn blackman(n: f32, m: f32) -> f32 {
        let a0 = 0.42;
        let a1 = 0.5;
        let a2 = 0.08;
        let t = 2.0 * std::f32::consts::PI * n / m;
        a0 - a1 * t.cos() + a2 * (2.0 * t).cos()
    }

    /// Resamples `input` and appends the produced samples to `output`.
    /// Keeps filter history across calls, so arbitrary chunk sizes work.
    pub fn process(&mut self, input: &[i16], output: &mut Vec<i16>) {
        let half_taps = (self.taps / 2) as f32;

        for &sample in input {
            self.history.rotate_left(1);
            self.history[self.taps - 1] = sample as f32;

            while self.index < 1.0 {
                let mut sum = 0.0;
                for (i, &h) in self.history.iter().enumerate() {
                    let offset = (i as f32 - half_taps) - self.index;
                    let window = Self::blackman(i as f32, self.taps as f32 - 1.0);
                    sum += h * Self::sinc(offset) * window;
                }
                output.push(sum.clamp(i16::MIN as f32, i16::MAX as f32) as i16);
                self.index += self.ratio;
            }
            self.index -= 1.0;
        }
    }

    pub fn reset(&mut self) {
        self.index = 0.0;
        self.history.fill(0.0);
    }
}
