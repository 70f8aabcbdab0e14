// envelope.rs — the four-phase timing contract every sub-animator runs on.
//
// Timestamps satisfy start ≤ attack_peak ≤ relax ≤ end; the upstream
// scheduler guarantees the ordering. Intro eases 0→1, hold pins 1, outro
// eases 1→0, idle reports inactive. Equal timestamps collapse a phase to an
// instantaneous jump.

use serde::Deserialize;
use std::f32::consts::PI;

const EPS: f32 = 1e-6;

/// Half-cosine ease-in/out remap of t ∈ [0,1].
pub fn ease(t: f32) -> f32 {
    0.5 * (PI * t.clamp(0.0, 1.0) + PI).cos() + 0.5
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Pending,
    Intro,
    Hold,
    Outro,
    Idle,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct TimingEnvelope {
    pub start: f32,
    pub attack_peak: f32,
    pub relax: f32,
    pub end: f32,
    #[serde(default)]
    t: f32,
}

impl TimingEnvelope {
    pub fn new(start: f32, attack_peak: f32, relax: f32, end: f32) -> Self {
        debug_assert!(
            start <= attack_peak && attack_peak <= relax && relax <= end,
            "envelope timestamps out of order"
        );
        Self { start, attack_peak, relax, end, t: 0.0 }
    }

    /// An envelope that is already over. Animators seeded with it sit at
    /// their default value and report inactive.
    pub fn finished() -> Self {
        Self { start: 0.0, attack_peak: 0.0, relax: 0.0, end: 0.0, t: 0.0 }
    }

    pub fn advance(&mut self, dt: f32) {
        self.t += dt;
    }

    pub fn time(&self) -> f32 {
        self.t
    }

    pub fn active(&self) -> bool {
        self.t < self.end
    }

    pub fn phase(&self) -> Phase {
        if self.t >= self.end {
            Phase::Idle
        } else if self.t < self.start {
            Phase::Pending
        } else if self.t < self.attack_peak {
            Phase::Intro
        } else if self.t <= self.relax {
            Phase::Hold
        } else {
            Phase::Outro
        }
    }

    /// 0 before start, eased 0→1 during intro, 1 during hold, eased 1→0
    /// during outro, 0 once idle.
    pub fn weight(&self) -> f32 {
        match self.phase() {
            Phase::Pending | Phase::Idle => 0.0,
            Phase::Hold => 1.0,
            Phase::Intro => {
                let span = self.attack_peak - self.start;
                if span < EPS {
                    1.0
                } else {
                    ease((self.t - self.start) / span)
                }
            }
            Phase::Outro => {
                let span = self.end - self.relax;
                if span < EPS {
                    0.0
                } else {
                    ease((self.end - self.t) / span)
                }
            }
        }
    }
}

// ── Scalar animator ──────────────────────────────────────────────────────────
//
// One interpolator covers elbow-raise, shoulder-raise and shoulder-hunch;
// they differ only in the unit conversion applied to incoming targets.

#[derive(Clone, Copy, Debug)]
pub struct ScalarAnimator {
    env: TimingEnvelope,
    src: f32,
    target: f32,
    default: f32,
    unit: f32,
}

impl ScalarAnimator {
    pub fn new(default: f32, unit: f32) -> Self {
        Self { env: TimingEnvelope::finished(), src: default, target: default, default, unit }
    }

    /// In degrees-in, radians-out configuration.
    pub fn degrees(default_deg: f32) -> Self {
        Self::new(default_deg.to_radians(), std::f32::consts::PI / 180.0)
    }

    pub fn value(&self) -> f32 {
        let w = self.env.weight();
        match self.env.phase() {
            Phase::Pending => self.src,
            Phase::Intro => self.src + (self.target - self.src) * w,
            Phase::Hold => self.target,
            Phase::Outro => self.default + (self.target - self.default) * w,
            Phase::Idle => self.default,
        }
    }

    /// Start a new transition. The live interpolated value becomes the new
    /// source so a retrigger mid-flight never pops. Non-finite targets fall
    /// back to zero.
    pub fn trigger(&mut self, raw_target: f32, env: TimingEnvelope, shift: bool) {
        let raw = if raw_target.is_finite() { raw_target } else { 0.0 };
        self.src = self.value();
        self.target = raw * self.unit;
        if shift {
            self.default = self.target;
        }
        self.env = env;
    }

    pub fn advance(&mut self, dt: f32) {
        self.env.advance(dt);
    }

    pub fn active(&self) -> bool {
        self.env.active()
    }

    pub fn default_value(&self) -> f32 {
        self.default
    }
}
