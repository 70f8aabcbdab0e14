// motion.rs — additive motion overlays: directed and circular paths for the
// wrist target, finger-play oscillation, wrist nod/swing/twist. Each owns a
// TimingEnvelope and is pruned by the orchestrator once inactive.

use glam::{Quat, Vec3};
use std::f32::consts::{PI, TAU};

use crate::envelope::{ease, Phase, TimingEnvelope};
use crate::gesture::{ZigzagSpec, WRIST_NOD, WRIST_SWING, WRIST_TWIST};
use crate::skeleton::ArmMap;

/// Per-finger phase offsets so finger-play never moves in lockstep.
const PLAY_PHASES: [f32; 4] = [0.0, 1.7, 3.2, 4.6];

fn cubic_bezier(p: &[Vec3; 4], t: f32) -> Vec3 {
    let u = 1.0 - t;
    p[0] * (u * u * u) + p[1] * (3.0 * u * u * t) + p[2] * (3.0 * u * t * t) + p[3] * (t * t * t)
}

// ── Directed ─────────────────────────────────────────────────────────────────

/// Cubic Bezier displacement toward a requested direction: straight along
/// the canonical +Z with an optional +Y bulge, rotated into place. Directions
/// pointing into the back hemisphere rotate to the mirrored direction and
/// negate the path's Z instead, so the lateral bulge never flips through an
/// accidental 180°.
pub struct DirectedMotion {
    env: TimingEnvelope,
    rot: Quat,
    points: [Vec3; 4],
    lateral: Vec3,
    zigzag: Option<ZigzagSpec>,
}

impl DirectedMotion {
    pub fn new(dir: Vec3, distance: f32, curve_size: f32, zigzag: Option<ZigzagSpec>, env: TimingEnvelope) -> Self {
        let dir = dir.normalize_or_zero();
        let dir = if dir == Vec3::ZERO { Vec3::Z } else { dir };
        let distance = if distance.is_finite() { distance } else { 0.0 };
        let (rot, flip) = if dir.dot(Vec3::Z) < 0.0 {
            (Quat::from_rotation_arc(Vec3::Z, -dir), -1.0)
        } else {
            (Quat::from_rotation_arc(Vec3::Z, dir), 1.0)
        };
        let c = curve_size;
        let points = [
            Vec3::ZERO,
            Vec3::new(0.0, c, distance / 3.0 * flip),
            Vec3::new(0.0, c, 2.0 * distance / 3.0 * flip),
            Vec3::new(0.0, 0.0, distance * flip),
        ];
        let lateral = rot * Vec3::X;
        Self { env, rot, points, lateral, zigzag }
    }

    pub fn offset(&self) -> Vec3 {
        let w = self.env.weight();
        match self.env.phase() {
            Phase::Pending | Phase::Idle => Vec3::ZERO,
            Phase::Intro => {
                let mut p = self.rot * cubic_bezier(&self.points, w);
                if let Some(z) = &self.zigzag {
                    // windowed so the wiggle dies out at both curve ends
                    let window = (PI * w).sin();
                    p += self.lateral * ((self.env.time() * z.speed * TAU).sin() * z.size * window);
                }
                p
            }
            Phase::Hold => self.rot * self.points[3],
            Phase::Outro => self.rot * self.points[3] * w,
        }
    }

    pub fn active(&self) -> bool {
        self.env.active()
    }
}

// ── Circular ─────────────────────────────────────────────────────────────────

/// Elliptical displacement in the plane normal to a requested direction.
/// The sweep runs from start_angle to end_angle over intro+hold; the offset
/// is measured from the sweep's start point so motion begins at zero.
pub struct CircularMotion {
    env: TimingEnvelope,
    rot: Quat,
    major: f32,
    minor: f32,
    start_angle: f32,
    end_angle: f32,
    zigzag: Option<ZigzagSpec>,
    normal: Vec3,
}

impl CircularMotion {
    pub fn new(
        normal: Vec3,
        radius: f32,
        ellipse_ratio: f32,
        start_angle: f32,
        end_angle: f32,
        zigzag: Option<ZigzagSpec>,
        env: TimingEnvelope,
    ) -> Self {
        let normal = normal.normalize_or_zero();
        let normal = if normal == Vec3::ZERO { Vec3::Z } else { normal };
        let radius = if radius.is_finite() { radius } else { 0.0 };
        Self {
            env,
            rot: Quat::from_rotation_arc(Vec3::Z, normal),
            major: radius,
            minor: radius * ellipse_ratio.clamp(0.0, 1.0),
            start_angle,
            end_angle,
            zigzag,
            normal,
        }
    }

    fn point(&self, angle: f32) -> Vec3 {
        self.rot * Vec3::new(angle.cos() * self.major, angle.sin() * self.minor, 0.0)
    }

    /// Eased sweep fraction over start→relax.
    fn angle(&self) -> f32 {
        let span = self.env.relax - self.env.start;
        let u = if span < 1e-6 { 1.0 } else { ((self.env.time() - self.env.start) / span).clamp(0.0, 1.0) };
        self.start_angle + (self.end_angle - self.start_angle) * ease(u)
    }

    pub fn offset(&self) -> Vec3 {
        let start = self.point(self.start_angle);
        match self.env.phase() {
            Phase::Pending | Phase::Idle => Vec3::ZERO,
            Phase::Intro | Phase::Hold => {
                let mut p = self.point(self.angle()) - start;
                if let Some(z) = &self.zigzag {
                    let w = self.env.weight();
                    p += self.normal * ((self.env.time() * z.speed * TAU).sin() * z.size * (PI * w).sin());
                }
                p
            }
            Phase::Outro => (self.point(self.end_angle) - start) * self.env.weight(),
        }
    }
}

// ── Finger play ──────────────────────────────────────────────────────────────

/// Independent per-finger bend oscillation. A replaced instance hands its
/// live amplitude over so a retrigger ramps instead of popping.
pub struct FingerPlay {
    env: TimingEnvelope,
    intensity: f32,
    speed: f32,
    mask: u8,
    prev_ampl: f32,
}

impl FingerPlay {
    pub fn new(intensity: f32, speed: f32, mask: u8, prev_ampl: f32, env: TimingEnvelope) -> Self {
        let intensity = if intensity.is_finite() { intensity } else { 0.0 };
        Self { env, intensity, speed, mask, prev_ampl }
    }

    pub fn amplitude(&self) -> f32 {
        let w = self.env.weight();
        match self.env.phase() {
            Phase::Pending => self.prev_ampl,
            Phase::Intro => self.prev_ampl + (self.intensity - self.prev_ampl) * w,
            Phase::Hold => self.intensity,
            Phase::Outro => self.intensity * w,
            Phase::Idle => 0.0,
        }
    }

    /// Additive bend per finger, index..pinky, each in 0..amplitude.
    pub fn deltas(&self) -> [f32; 4] {
        let a = self.amplitude();
        let t = self.env.time();
        let mut out = [0.0; 4];
        for (fi, slot) in out.iter_mut().enumerate() {
            let enabled = self.mask == 0 || self.mask & (1 << fi) != 0;
            if enabled {
                *slot = a * 0.5 * (1.0 + (t * self.speed * TAU + PLAY_PHASES[fi]).sin());
            }
        }
        out
    }
}

// ── Wrist motion ─────────────────────────────────────────────────────────────

/// Oscillates the wrist about its bind-derived anatomical axes: nod
/// (flexion), swing (deviation), twist (pronation), bitmask-combinable.
/// Nod+swing run 90° out of phase, tracing the "stir" circle.
pub struct WristMotion {
    env: TimingEnvelope,
    mode: u8,
    intensity: f32,
    speed: f32,
}

impl WristMotion {
    pub fn new(mode: u8, intensity: f32, speed: f32, env: TimingEnvelope) -> Self {
        let intensity = if intensity.is_finite() { intensity } else { 0.0 };
        Self { env, mode, intensity, speed }
    }

    /// Additive rotation in the hand's bind frame.
    pub fn rotation(&self, arm: &ArmMap) -> Quat {
        let a = self.intensity * self.env.weight();
        if a == 0.0 {
            return Quat::IDENTITY;
        }
        let ph = self.env.time() * self.speed * TAU;
        let stir = self.mode & WRIST_NOD != 0 && self.mode & WRIST_SWING != 0;
        let mut q = Quat::IDENTITY;
        if self.mode & WRIST_NOD != 0 {
            q = Quat::from_axis_angle(arm.curl_axis, a * ph.sin()) * q;
        }
        if self.mode & WRIST_SWING != 0 {
            let s = if stir { ph.cos() } else { ph.sin() };
            q = Quat::from_axis_angle(arm.palm_normal, a * s) * q;
        }
        if self.mode & WRIST_TWIST != 0 {
            q = Quat::from_axis_angle(arm.finger_dir, a * ph.sin()) * q;
        }
        q
    }
}

// ── Overlay queue entry ──────────────────────────────────────────────────────

pub enum Motion {
    Directed(DirectedMotion),
    Circular(CircularMotion),
    FingerPlay(FingerPlay),
    Wrist(WristMotion),
}

impl Motion {
    pub fn advance(&mut self, dt: f32) {
        match self {
            Motion::Directed(m) => m.env.advance(dt),
            Motion::Circular(m) => m.env.advance(dt),
            Motion::FingerPlay(m) => m.env.advance(dt),
            Motion::Wrist(m) => m.env.advance(dt),
        }
    }

    pub fn active(&self) -> bool {
        match self {
            Motion::Directed(m) => m.env.active(),
            Motion::Circular(m) => m.env.active(),
            Motion::FingerPlay(m) => m.env.active(),
            Motion::Wrist(m) => m.env.active(),
        }
    }

    /// World-space wrist-target displacement (paths only).
    pub fn offset(&self) -> Vec3 {
        match self {
            Motion::Directed(m) => m.offset(),
            Motion::Circular(m) => m.offset(),
            _ => Vec3::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{reference_rig, BodyMap};

    fn adv(env: &mut TimingEnvelope, t: f32) {
        env.advance(t);
    }

    #[test]
    fn directed_up_scenario() {
        // direction "u", distance 0.1, envelope 0/0.3/0.3/0.6
        let mut m = DirectedMotion::new(Vec3::Y, 0.1, 0.0, None, TimingEnvelope::new(0.0, 0.3, 0.3, 0.6));
        assert!(m.offset().length() < 1e-6, "zero at start");
        adv(&mut m.env, 0.3);
        let peak = m.offset();
        assert!((peak - Vec3::new(0.0, 0.1, 0.0)).length() < 1e-5, "peak {peak:?}");
        adv(&mut m.env, 0.3);
        assert!(m.offset().length() < 1e-6, "back to zero at end");
        assert!(!m.active());
    }

    #[test]
    fn directed_backward_direction_keeps_endpoint() {
        let mut m = DirectedMotion::new(Vec3::NEG_Z, 0.2, 0.05, None, TimingEnvelope::new(0.0, 0.5, 1.0, 1.5));
        adv(&mut m.env, 0.5);
        let peak = m.offset();
        assert!((peak - Vec3::new(0.0, 0.0, -0.2)).length() < 1e-5, "peak {peak:?}");
    }

    #[test]
    fn directed_curve_bulges_mid_path() {
        let mut m = DirectedMotion::new(Vec3::Z, 0.2, 0.05, None, TimingEnvelope::new(0.0, 1.0, 1.5, 2.0));
        adv(&mut m.env, 0.5);
        assert!(m.offset().y > 0.01, "lateral bulge mid-intro");
        adv(&mut m.env, 0.5);
        assert!(m.offset().y.abs() < 1e-5, "no bulge at the endpoint");
    }

    #[test]
    fn circular_full_sweep_closes_loop_with_constant_radius() {
        let mut m = CircularMotion::new(
            Vec3::Z,
            0.08,
            1.0,
            0.0,
            TAU,
            None,
            TimingEnvelope::new(0.0, 0.2, 0.8, 1.0),
        );
        assert!(m.offset().length() < 1e-6, "starts at zero displacement");
        // center of the circle, in offset space
        let center = -m.point(0.0);
        for i in 0..=20 {
            let mut probe = CircularMotion::new(
                Vec3::Z,
                0.08,
                1.0,
                0.0,
                TAU,
                None,
                TimingEnvelope::new(0.0, 0.2, 0.8, 1.0),
            );
            let t = 0.2 + 0.6 * i as f32 / 20.0; // hold phase
            adv(&mut probe.env, t);
            let r = (probe.offset() - center).length();
            assert!((r - 0.08).abs() < 1e-4, "radius {r} at t={t}");
        }
        adv(&mut m.env, 0.8); // end of hold: loop closed
        assert!(m.offset().length() < 1e-4);
        adv(&mut m.env, 0.2);
        assert!(m.offset().length() < 1e-6, "decayed after end");
    }

    #[test]
    fn circular_partial_arc_decays_radially() {
        let mut m = CircularMotion::new(
            Vec3::Y,
            0.1,
            1.0,
            0.0,
            PI,
            None,
            TimingEnvelope::new(0.0, 0.2, 0.5, 1.0),
        );
        adv(&mut m.env, 0.5);
        let held = m.offset();
        assert!(held.length() > 0.1, "half circle ends a diameter away");
        adv(&mut m.env, 0.25);
        let mid = m.offset();
        assert!(mid.length() < held.length() && mid.length() > 0.0);
    }

    #[test]
    fn finger_play_phases_differ_and_blend_from_snapshot() {
        let mut p = FingerPlay::new(0.6, 3.0, 0, 0.0, TimingEnvelope::new(0.0, 0.2, 1.0, 1.2));
        p.env.advance(0.5);
        let d = p.deltas();
        assert!(d.iter().any(|&x| (x - d[0]).abs() > 1e-3), "fingers must not move in lockstep");
        // mask restricts fingers
        let mut p2 = FingerPlay::new(0.6, 3.0, 0b0001, 0.0, TimingEnvelope::new(0.0, 0.2, 1.0, 1.2));
        p2.env.advance(0.5);
        let d2 = p2.deltas();
        assert!(d2[0] > 0.0 && d2[1] == 0.0 && d2[3] == 0.0);
        // amplitude snapshot carries over at t=0
        let p3 = FingerPlay::new(0.1, 3.0, 0, 0.55, TimingEnvelope::new(0.0, 0.4, 1.0, 1.2));
        assert!((p3.amplitude() - 0.55).abs() < 1e-6);
    }

    #[test]
    fn wrist_stir_is_quarter_phase() {
        let sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        let arm = &map.left;
        // speed 1Hz: at t=0.25 sin=1 cos=0 → pure nod; at t=0.5 sin=0 cos=-1 → pure swing
        let mut m = WristMotion::new(WRIST_NOD | WRIST_SWING, 0.3, 1.0, TimingEnvelope::new(0.0, 0.1, 2.0, 2.5));
        m.env.advance(0.25);
        let q = m.rotation(arm);
        let moved = q * arm.finger_dir;
        assert!(moved.y.abs() > 0.05, "nod component present at quarter phase");
        m.env.advance(0.25);
        let q = m.rotation(arm);
        let moved = q * arm.finger_dir;
        assert!(moved.y.abs() < 0.05, "nod silent at half phase");
        assert!((moved - arm.finger_dir).length() > 0.05, "swing takes over");
    }

    #[test]
    fn overlays_report_inactive_after_end() {
        let mut m = Motion::Directed(DirectedMotion::new(
            Vec3::Y,
            0.1,
            0.0,
            None,
            TimingEnvelope::new(0.0, 0.3, 0.3, 0.6),
        ));
        m.advance(1.0);
        assert!(!m.active());
        assert_eq!(m.offset(), Vec3::ZERO);
    }
}
