// handshape.rs — handshape library, pose composer, thumb CCD, and the
// application of a composed pose onto the finger chains.
//
// Shapes and bend presets load once from handshapes.json. A composed
// HandPose is scalar per finger (splay/base/mid/tip in 0..1) plus three
// bind-relative thumb rotations, so it lerps cleanly inside the animator.

use glam::{Quat, Vec3};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::angles::{nlerp, swing_twist};
use crate::envelope::{Phase, TimingEnvelope};
use crate::gesture::HandshapeSpec;
use crate::json_loader;
use crate::skeleton::{ArmMap, Skeleton};

// ── Library ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Fist,
    Flat,
    Finger,
    Pinch,
    Cee,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShapeDef {
    pub kind: ShapeKind,
    /// Digits 2..=5 the shape is about.
    pub selected: Vec<u8>,
    /// index..pinky, each [splay, base, mid, tip].
    pub fingers: [[f32; 4]; 4],
    /// [abduction, base, mid, tip].
    pub thumb: [f32; 4],
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandshapeLibrary {
    pub shapes: HashMap<String, ShapeDef>,
    pub bends: HashMap<String, [f32; 3]>,
}

static LIB: OnceLock<HandshapeLibrary> = OnceLock::new();

pub fn library() -> &'static HandshapeLibrary {
    LIB.get_or_init(|| json_loader::load("handshapes.json").expect("handshapes.json missing or malformed"))
}

fn selection_mask(digits: &[u8]) -> u8 {
    digits.iter().filter(|d| (2..=5).contains(*d)).fold(0u8, |m, d| m | (1u8 << (d - 2)))
}

// ── Hand pose ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Finger {
    pub splay: f32,
    pub base: f32,
    pub mid: f32,
    pub tip: f32,
}

impl Finger {
    fn from_arr(a: [f32; 4]) -> Self {
        Self { splay: a[0], base: a[1], mid: a[2], tip: a[3] }
    }

    fn lerp(a: Self, b: Self, t: f32) -> Self {
        Self {
            splay: a.splay + (b.splay - a.splay) * t,
            base: a.base + (b.base - a.base) * t,
            mid: a.mid + (b.mid - a.mid) * t,
            tip: a.tip + (b.tip - a.tip) * t,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct HandPose {
    pub fingers: [Finger; 4],
    /// Bind-relative local rotations for the three thumb joints.
    pub thumb: [Quat; 3],
}

impl HandPose {
    pub const NEUTRAL: Self =
        Self { fingers: [Finger { splay: 0.0, base: 0.0, mid: 0.0, tip: 0.0 }; 4], thumb: [Quat::IDENTITY; 3] };

    pub fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        let mut fingers = [Finger::default(); 4];
        for i in 0..4 {
            fingers[i] = Finger::lerp(a.fingers[i], b.fingers[i], t);
        }
        Self {
            fingers,
            thumb: [
                nlerp(a.thumb[0], b.thumb[0], t),
                nlerp(a.thumb[1], b.thumb[1], t),
                nlerp(a.thumb[2], b.thumb[2], t),
            ],
        }
    }
}

/// Angle ranges mapping normalized bends onto the finger chains.
#[derive(Clone, Copy, Debug)]
pub struct HandTuning {
    pub base_range: f32,
    pub mid_range: f32,
    pub tip_range: f32,
    pub splay_range: f32,
    /// Per-finger splay direction/scale, index..pinky.
    pub splay_factors: [f32; 4],
    pub thumb_abduction_range: f32,
    pub thumb_bend_ranges: [f32; 3],
}

impl Default for HandTuning {
    fn default() -> Self {
        Self {
            base_range: 90f32.to_radians(),
            mid_range: 100f32.to_radians(),
            tip_range: 80f32.to_radians(),
            splay_range: 20f32.to_radians(),
            splay_factors: [1.0, 0.3, -0.4, -1.0],
            thumb_abduction_range: 50f32.to_radians(),
            thumb_bend_ranges: [55f32.to_radians(), 65f32.to_radians(), 80f32.to_radians()],
        }
    }
}

/// Library thumb scalars → bind-relative joint rotations.
pub fn thumb_rotations(arm: &ArmMap, t: [f32; 4], tuning: &HandTuning) -> [Quat; 3] {
    [
        Quat::from_axis_angle(arm.thumb_splay_axis, t[0] * tuning.thumb_abduction_range)
            * Quat::from_axis_angle(arm.thumb_curl_axis, t[1] * tuning.thumb_bend_ranges[0]),
        Quat::from_axis_angle(arm.thumb_curl_axis, t[2] * tuning.thumb_bend_ranges[1]),
        Quat::from_axis_angle(arm.thumb_curl_axis, t[3] * tuning.thumb_bend_ranges[2]),
    ]
}

// ── Composition ──────────────────────────────────────────────────────────────

/// Scalar output of shape composition; thumb stays scalar here so secondary
/// shapes blend before the rotations are built.
#[derive(Clone, Copy, Debug)]
pub struct ComposedShape {
    pub fingers: [Finger; 4],
    pub thumb: [f32; 4],
    /// Digit (2..=5) the thumb should oppose, from pinch/cee finger remap.
    pub thumb_digit: Option<u8>,
}

fn shape_or_flat(name: &str) -> &'static ShapeDef {
    let lib = library();
    lib.shapes.get(name).unwrap_or_else(|| {
        log::warn!("unknown handshape '{name}', falling back to flat");
        &lib.shapes["flat"]
    })
}

/// Re-read a canonical shape against an explicit finger selection so any
/// shape combines with any finger subset: fist extends the selection out of
/// a fist, flat fills the unselected fingers with fist, pinch/cee keep their
/// curl on the selection and retarget the thumb at it.
fn remap_selection(def: &ShapeDef, mask: u8, out: &mut ComposedShape) {
    const FIST: [f32; 4] = [0.0, 1.0, 1.0, 1.0];
    const STRAIGHT: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
    for fi in 0..4 {
        let on = mask & (1 << fi) != 0;
        let arr = match (def.kind, on) {
            (ShapeKind::Fist | ShapeKind::Flat | ShapeKind::Finger, true) => STRAIGHT,
            (ShapeKind::Fist | ShapeKind::Flat | ShapeKind::Finger, false) => FIST,
            (ShapeKind::Pinch | ShapeKind::Cee, true) => {
                // carry the shape's own curl for the involved finger
                let src = def.selected.first().map(|d| (d - 2) as usize).unwrap_or(0);
                def.fingers[src.min(3)]
            }
            (ShapeKind::Pinch | ShapeKind::Cee, false) => FIST,
        };
        out.fingers[fi] = Finger::from_arr(arr);
    }
    if matches!(def.kind, ShapeKind::Pinch | ShapeKind::Cee) {
        out.thumb_digit = (0..4).find(|fi| mask & (1 << fi) != 0).map(|fi| fi as u8 + 2);
    }
}

pub fn compose(spec: &HandshapeSpec) -> ComposedShape {
    let lib = library();
    let def = shape_or_flat(&spec.shape);
    let mut out = ComposedShape {
        fingers: [
            Finger::from_arr(def.fingers[0]),
            Finger::from_arr(def.fingers[1]),
            Finger::from_arr(def.fingers[2]),
            Finger::from_arr(def.fingers[3]),
        ],
        thumb: def.thumb,
        thumb_digit: None,
    };

    let canonical_mask = selection_mask(&def.selected);
    let mask = spec.selected.map(|m| m & 0x0f).unwrap_or(canonical_mask);
    if spec.selected.is_some() && mask != canonical_mask && mask != 0 {
        remap_selection(def, mask, &mut out);
    }

    // main bend/splay overrides on the selected fingers
    if let Some(bend) = &spec.main_bend {
        if let Some(b) = lib.bends.get(bend) {
            for fi in 0..4 {
                if mask & (1 << fi) != 0 {
                    out.fingers[fi].base = b[0];
                    out.fingers[fi].mid = b[1];
                    out.fingers[fi].tip = b[2];
                }
            }
        } else {
            log::warn!("unknown bend preset '{bend}', ignoring");
        }
    }
    if let Some(splay) = spec.main_splay {
        let splay = if splay.is_finite() { splay } else { 0.0 };
        for fi in 0..4 {
            if mask & (1 << fi) != 0 {
                out.fingers[fi].splay = splay;
            }
        }
    }

    // secondary shape averaged in at half weight
    if let Some(second) = &spec.second_shape {
        let sdef = shape_or_flat(second);
        for fi in 0..4 {
            out.fingers[fi] = Finger::lerp(out.fingers[fi], Finger::from_arr(sdef.fingers[fi]), 0.5);
        }
        for i in 0..4 {
            out.thumb[i] = out.thumb[i] + (sdef.thumb[i] - out.thumb[i]) * 0.5;
        }
    }

    // explicit per-finger overrides win over everything above
    for fi in 0..4 {
        if let Some(bend) = &spec.bends[fi] {
            if let Some(b) = lib.bends.get(bend) {
                out.fingers[fi].base = b[0];
                out.fingers[fi].mid = b[1];
                out.fingers[fi].tip = b[2];
            } else {
                log::warn!("unknown bend preset '{bend}', ignoring");
            }
        }
        if let Some(s) = spec.splays[fi] {
            if s.is_finite() {
                out.fingers[fi].splay = s;
            }
        }
    }

    // a pinch/cee combination opens the uninvolved fingers
    let opening = spec.thumb_combination_opening.clamp(0.0, 1.0);
    if opening > 0.0 && matches!(def.kind, ShapeKind::Pinch | ShapeKind::Cee) {
        for fi in 0..4 {
            if mask & (1 << fi) == 0 {
                let f = &mut out.fingers[fi];
                f.base *= 1.0 - opening;
                f.mid *= 1.0 - opening;
                f.tip *= 1.0 - opening;
            }
        }
    }
    out
}

// ── Animator ─────────────────────────────────────────────────────────────────

pub struct HandShapeAnimator {
    env: TimingEnvelope,
    src: HandPose,
    target: HandPose,
    default: HandPose,
}

impl HandShapeAnimator {
    pub fn new() -> Self {
        Self {
            env: TimingEnvelope::finished(),
            src: HandPose::NEUTRAL,
            target: HandPose::NEUTRAL,
            default: HandPose::NEUTRAL,
        }
    }

    pub fn value(&self) -> HandPose {
        let w = self.env.weight();
        match self.env.phase() {
            Phase::Pending => self.src,
            Phase::Intro => HandPose::lerp(&self.src, &self.target, w),
            Phase::Hold => self.target,
            Phase::Outro => HandPose::lerp(&self.default, &self.target, w),
            Phase::Idle => self.default,
        }
    }

    pub fn trigger(&mut self, target: HandPose, env: TimingEnvelope, shift: bool) {
        self.src = self.value();
        self.target = target;
        if shift {
            self.default = target;
        }
        self.env = env;
    }

    pub fn advance(&mut self, dt: f32) {
        self.env.advance(dt);
    }

    pub fn active(&self) -> bool {
        self.env.active()
    }

    pub fn set_default(&mut self, pose: HandPose) {
        self.default = pose;
    }
}

impl Default for HandShapeAnimator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Application ──────────────────────────────────────────────────────────────

/// Write a composed pose onto the finger and thumb chains. `play` is the
/// finger-play overlay's additive bend per finger.
pub fn apply(sk: &mut Skeleton, arm: &ArmMap, pose: &HandPose, play: [f32; 4], tuning: &HandTuning) {
    for fi in 0..4 {
        let f = pose.fingers[fi];
        let base = (f.base + play[fi]).clamp(-0.2, 1.2);
        let mid = (f.mid + play[fi] * 0.5).clamp(-0.2, 1.2);
        let tip = f.tip.clamp(-0.2, 1.2);
        let splay = f.splay * tuning.splay_factors[fi] * tuning.splay_range;
        let [b0, b1, b2] = arm.fingers[fi];
        let q0 = Quat::from_axis_angle(arm.splay_axis, splay)
            * Quat::from_axis_angle(arm.curl_axis, base * tuning.base_range);
        sk.set_local_rot(b0, sk.bind_rot(b0) * q0);
        let q1 = Quat::from_axis_angle(arm.curl_axis, mid * tuning.mid_range);
        sk.set_local_rot(b1, sk.bind_rot(b1) * q1);
        let q2 = Quat::from_axis_angle(arm.curl_axis, tip * tuning.tip_range);
        sk.set_local_rot(b2, sk.bind_rot(b2) * q2);
    }
    for (i, q) in pose.thumb.iter().enumerate() {
        let b = arm.thumb[i];
        sk.set_local_rot(b, sk.bind_rot(b) * *q);
    }
}

// ── Thumb CCD ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug)]
pub struct ThumbIkTuning {
    pub max_iter: usize,
    /// Stop when the tip is this close to the target, meters.
    pub tolerance: f32,
    /// Automatic post-solve splay response.
    pub splay_gain: f32,
}

impl Default for ThumbIkTuning {
    fn default() -> Self {
        Self { max_iter: 10, tolerance: 0.004, splay_gain: 0.6 }
    }
}

pub fn thumb_tip(sk: &Skeleton, arm: &ArmMap) -> Vec3 {
    sk.world_pos(arm.thumb[2]) + sk.world_rot(arm.thumb[2]) * arm.thumb_tip_vec
}

/// Cyclic coordinate descent re-aiming the thumb tip at `target`. Non-base
/// joints are hinges: the per-joint rotation is projected onto the curl axis
/// and solutions bending past the bind pose's extension limit restore bind.
/// Returns the solved bind-relative joint rotations.
pub fn thumb_ik(sk: &mut Skeleton, arm: &ArmMap, target: Vec3, tuning: &ThumbIkTuning) -> [Quat; 3] {
    let bind_tip = sk.bind_world_pos(arm.thumb[2]) + sk.bind_world_rot(arm.thumb[2]) * arm.thumb_tip_vec;

    for _ in 0..tuning.max_iter {
        if (thumb_tip(sk, arm) - target).length() < tuning.tolerance {
            break;
        }
        for j in (0..3).rev() {
            let bone = arm.thumb[j];
            let jpos = sk.world_pos(bone);
            let to_end = (thumb_tip(sk, arm) - jpos).normalize_or_zero();
            let to_target = (target - jpos).normalize_or_zero();
            if to_end == Vec3::ZERO || to_target == Vec3::ZERO {
                continue;
            }
            let q = Quat::from_rotation_arc(to_end, to_target);
            if j == 0 {
                sk.rotate_world(bone, q);
                continue;
            }
            // hinge joint: keep only the component about the curl axis
            let hinge = sk.bind_axis_now(bone, arm.thumb_curl_axis);
            let (_, about_hinge) = swing_twist(q, hinge);
            sk.rotate_world(bone, about_hinge);
            // reject hyperextension past the bind pose: the accumulated
            // bend's twist must not point against the curl axis
            let q_delta = sk.bind_rot(bone).inverse() * sk.local_rot(bone);
            let (_, bend) = swing_twist(q_delta, arm.thumb_curl_axis);
            let angle = 2.0 * Vec3::new(bend.x, bend.y, bend.z).dot(arm.thumb_curl_axis).atan2(bend.w);
            if angle < -1e-3 {
                sk.reset_to_bind(bone);
            }
        }
    }

    // automatic splay from where the tip ended up relative to the palm
    let disp = thumb_tip(sk, arm) - bind_tip;
    let lateral = disp.dot(arm.finger_dir) / arm.thumb_len;
    let outward = disp.dot(arm.palm_normal) / arm.thumb_len;
    let splay = (lateral * 0.8 + outward * 0.4).clamp(-1.0, 1.0) * tuning.splay_gain;
    let axis = sk.bind_axis_now(arm.thumb[0], arm.thumb_splay_axis);
    sk.rotate_world(arm.thumb[0], Quat::from_axis_angle(axis, splay));

    [
        sk.bind_rot(arm.thumb[0]).inverse() * sk.local_rot(arm.thumb[0]),
        sk.bind_rot(arm.thumb[1]).inverse() * sk.local_rot(arm.thumb[1]),
        sk.bind_rot(arm.thumb[2]).inverse() * sk.local_rot(arm.thumb[2]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::HandshapeSpec;
    use crate::skeleton::{reference_rig, BodyMap};

    fn spec(shape: &str) -> HandshapeSpec {
        HandshapeSpec { shape: shape.into(), ..Default::default() }
    }

    #[test]
    fn plain_shape_round_trips_library_values() {
        let out = compose(&spec("fist"));
        let def = &library().shapes["fist"];
        for fi in 0..4 {
            assert_eq!(out.fingers[fi], Finger::from_arr(def.fingers[fi]));
        }
        assert_eq!(out.thumb, def.thumb);
    }

    #[test]
    fn unknown_shape_falls_back_to_flat() {
        let out = compose(&spec("claw99"));
        for fi in 0..4 {
            assert_eq!(out.fingers[fi].base, 0.0);
        }
    }

    #[test]
    fn fist_with_selection_extends_selected() {
        let mut s = spec("fist");
        s.selected = Some(0b0001); // index only
        let out = compose(&s);
        assert_eq!(out.fingers[0].base, 0.0, "selected finger extends");
        assert_eq!(out.fingers[1].base, 1.0, "others stay fisted");
    }

    #[test]
    fn pinch_retargets_thumb_to_selected_finger() {
        let mut s = spec("pinch12");
        s.selected = Some(0b0100); // ring
        let out = compose(&s);
        assert_eq!(out.thumb_digit, Some(4));
        assert!(out.fingers[2].base > 0.0 && out.fingers[2].base < 1.0, "ring carries the pinch curl");
        assert_eq!(out.fingers[0].base, 1.0, "index folds away");
    }

    #[test]
    fn main_bend_applies_to_selected() {
        let mut s = spec("flat");
        s.main_bend = Some("round".into());
        let out = compose(&s);
        for fi in 0..4 {
            assert_eq!(out.fingers[fi].base, 0.5);
            assert_eq!(out.fingers[fi].mid, 0.5);
        }
    }

    #[test]
    fn second_shape_blends_half() {
        let mut s = spec("fist");
        s.second_shape = Some("flat".into());
        let out = compose(&s);
        for fi in 0..4 {
            assert!((out.fingers[fi].base - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn combination_opening_relaxes_unselected() {
        let mut s = spec("pinch12");
        s.thumb_combination_opening = 0.5;
        let out = compose(&s);
        // middle (unselected) halves its curl; index (selected) keeps it
        assert!((out.fingers[1].base - 0.5).abs() < 1e-6);
        assert!((out.fingers[0].base - 0.6).abs() < 1e-6);
    }

    #[test]
    fn animator_hits_target_at_peak_and_default_at_end() {
        let mut a = HandShapeAnimator::new();
        let target = HandPose {
            fingers: [Finger { splay: 0.0, base: 1.0, mid: 1.0, tip: 1.0 }; 4],
            thumb: [Quat::IDENTITY; 3],
        };
        a.trigger(target, TimingEnvelope::new(0.0, 0.25, 0.75, 1.0), false);
        a.advance(0.25);
        let at_peak = a.value();
        for fi in 0..4 {
            assert!((at_peak.fingers[fi].base - 1.0).abs() < 1e-5);
            assert!((at_peak.fingers[fi].mid - 1.0).abs() < 1e-5);
            assert!((at_peak.fingers[fi].tip - 1.0).abs() < 1e-5);
        }
        a.advance(0.75);
        let done = a.value();
        for fi in 0..4 {
            assert_eq!(done.fingers[fi].base, 0.0, "returns to the identity default");
        }
        assert!(!a.active());
    }

    #[test]
    fn retrigger_is_continuous() {
        let mut a = HandShapeAnimator::new();
        let fist = HandPose {
            fingers: [Finger { splay: 0.0, base: 1.0, mid: 1.0, tip: 1.0 }; 4],
            thumb: [Quat::IDENTITY; 3],
        };
        a.trigger(fist, TimingEnvelope::new(0.0, 1.0, 2.0, 3.0), false);
        a.advance(0.5);
        let live = a.value();
        a.trigger(HandPose::NEUTRAL, TimingEnvelope::new(0.0, 1.0, 2.0, 3.0), false);
        let after = a.value();
        for fi in 0..4 {
            assert!((after.fingers[fi].base - live.fingers[fi].base).abs() < 1e-6);
        }
    }

    #[test]
    fn thumb_ccd_converges_and_error_never_grows() {
        let sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        let arm = map.left.clone();
        // aim at the index pad: a classic pinch target, comfortably reachable
        let target = sk.bind_world_pos(arm.fingers[0][1]) + Vec3::new(0.0, -0.015, 0.0);

        let mut prev_err = f32::MAX;
        for cap in 1..=10 {
            let mut sk = reference_rig();
            let tuning = ThumbIkTuning { max_iter: cap, splay_gain: 0.0, ..Default::default() };
            thumb_ik(&mut sk, &arm, target, &tuning);
            let err = (thumb_tip(&sk, &arm) - target).length();
            assert!(err <= prev_err + 1e-4, "error grew at iteration cap {cap}: {err} > {prev_err}");
            prev_err = err;
        }
        assert!(prev_err < 0.015, "thumb CCD did not converge: residual {prev_err}");
    }

    #[test]
    fn thumb_ccd_respects_hinge_limit() {
        let mut sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        let arm = map.left.clone();
        // a target behind the hand would demand hyperextension
        let target = sk.bind_world_pos(arm.thumb[0]) + arm.palm_normal * -0.1 - arm.thumb_dir * 0.05;
        thumb_ik(&mut sk, &arm, target, &ThumbIkTuning::default());
        for &bone in &arm.thumb[1..] {
            let q_delta = sk.bind_rot(bone).inverse() * sk.local_rot(bone);
            let (_, bend) = swing_twist(q_delta, arm.thumb_curl_axis);
            let angle = 2.0 * Vec3::new(bend.x, bend.y, bend.z).dot(arm.thumb_curl_axis).atan2(bend.w);
            assert!(angle > -1e-2, "hinge hyperextended: {angle}");
        }
    }

    #[test]
    fn apply_writes_finger_chains() {
        let mut sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        let arm = map.left.clone();
        let pose = HandPose {
            fingers: [Finger { splay: 0.0, base: 1.0, mid: 1.0, tip: 1.0 }; 4],
            thumb: [Quat::IDENTITY; 3],
        };
        let tip_before = sk.world_pos(arm.fingers[0][2]);
        apply(&mut sk, &arm, &pose, [0.0; 4], &HandTuning::default());
        let tip_after = sk.world_pos(arm.fingers[0][2]);
        assert!((tip_before - tip_after).length() > 0.02, "curl should move the fingertip");
        // curled toward the palm side
        assert!(tip_after.y < tip_before.y);
    }
}
