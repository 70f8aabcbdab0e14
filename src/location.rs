// location.rs — named body/hand points and the wrist-target animator.
//
// Body locations come from locations.json (bone + local offset, authored on
// the character's left where side matters) and are evaluated against the
// live skeleton so they track torso motion. Hand points are derived from
// the finger chains.

use glam::Vec3;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::envelope::{Phase, TimingEnvelope};
use crate::handshape::thumb_tip;
use crate::json_loader;
use crate::skeleton::{ArmMap, Skeleton};

#[derive(Debug, Clone, Deserialize)]
struct LocationEntry {
    bone: String,
    offset: [f32; 3],
}

#[derive(Debug, Clone, Deserialize)]
struct LocationTable {
    locations: HashMap<String, LocationEntry>,
}

static TABLE: OnceLock<LocationTable> = OnceLock::new();

fn table() -> &'static LocationTable {
    TABLE.get_or_init(|| json_loader::load("locations.json").expect("locations.json missing or malformed"))
}

/// World position of a named body location. `side_sign` picks the side for
/// off-center entries (ear, cheek, shoulder): +1 left, -1 right. Unknown
/// names warn and return None so the caller keeps its previous target.
pub fn body_point(sk: &Skeleton, name: &str, side_sign: f32) -> Option<Vec3> {
    let Some(e) = table().locations.get(name) else {
        log::warn!("unknown body location '{name}', ignoring");
        return None;
    };
    let Some(bone) = sk.index(&e.bone) else {
        log::warn!("body location '{name}' references missing bone '{}'", e.bone);
        return None;
    };
    let local = Vec3::new(e.offset[0] * side_sign, e.offset[1], e.offset[2]);
    Some(sk.world_pos(bone) + sk.world_rot(bone) * local)
}

/// World position of a named point on the hand: "wrist", "palm", "back",
/// "thumbball", or "{tip|pad|mid|base}_{digit}" with digits 1 (thumb) to 5
/// (pinky). Evaluated against the current pose.
pub fn hand_point(sk: &Skeleton, arm: &ArmMap, name: &str) -> Option<Vec3> {
    let palm_now = sk.bind_axis_now(arm.wrist, arm.palm_normal);
    match name {
        "wrist" => return Some(sk.world_pos(arm.wrist)),
        "palm" => {
            let p = (sk.world_pos(arm.wrist) + sk.world_pos(arm.fingers[1][0])) * 0.5;
            return Some(p + palm_now * 0.012);
        }
        "back" => {
            let p = (sk.world_pos(arm.wrist) + sk.world_pos(arm.fingers[1][0])) * 0.5;
            return Some(p - palm_now * 0.015);
        }
        "thumbball" => {
            let p = (sk.world_pos(arm.wrist) + sk.world_pos(arm.thumb[1])) * 0.5;
            return Some(p + palm_now * 0.01);
        }
        _ => {}
    }

    let Some((part, digit)) = name.split_once('_') else {
        log::warn!("unknown hand location '{name}', ignoring");
        return None;
    };
    let digit: u8 = match digit.parse() {
        Ok(d) if (1..=5).contains(&d) => d,
        _ => {
            log::warn!("unknown hand location '{name}', ignoring");
            return None;
        }
    };
    if digit == 1 {
        // thumb: base/mid/tip map onto its three joints
        return Some(match part {
            "tip" => thumb_tip(sk, arm),
            "pad" => {
                let b = arm.thumb[2];
                sk.world_pos(b) + sk.world_rot(b) * (arm.thumb_tip_vec * 0.5)
                    + sk.bind_axis_now(b, arm.palm_normal) * 0.008
            }
            "mid" => sk.world_pos(arm.thumb[1]),
            "base" => sk.world_pos(arm.thumb[0]),
            _ => {
                log::warn!("unknown hand location '{name}', ignoring");
                return None;
            }
        });
    }
    let chain = arm.fingers[(digit - 2) as usize];
    Some(match part {
        "tip" => {
            let b = chain[2];
            sk.world_pos(b) + sk.world_rot(b) * arm.finger_tip_vec
        }
        "pad" => {
            let b = chain[2];
            sk.world_pos(b) + sk.world_rot(b) * (arm.finger_tip_vec * 0.5)
                + sk.bind_axis_now(b, arm.palm_normal) * 0.006
        }
        "mid" => sk.world_pos(chain[1]),
        "base" => sk.world_pos(chain[0]),
        _ => {
            log::warn!("unknown hand location '{name}', ignoring");
            return None;
        }
    })
}

// ── Animator ─────────────────────────────────────────────────────────────────

const HANDOFF_CURVE: f32 = 0.25;
const HANDOFF_MAX: f32 = 0.1;

/// Interpolates the wrist's world target point through the envelope, with a
/// one-shot quadratic bulge along the body's out axis during the intro so
/// long hand-offs arc instead of sliding through the torso.
pub struct LocationAnimator {
    env: TimingEnvelope,
    src: Vec3,
    target: Vec3,
    default: Vec3,
    bulge: f32,
    out_axis: Vec3,
}

impl LocationAnimator {
    pub fn new(default: Vec3) -> Self {
        Self {
            env: TimingEnvelope::finished(),
            src: default,
            target: default,
            default,
            bulge: 0.0,
            out_axis: Vec3::Z,
        }
    }

    pub fn value(&self) -> Vec3 {
        let w = self.env.weight();
        match self.env.phase() {
            Phase::Pending => self.src,
            Phase::Intro => {
                self.src.lerp(self.target, w) + self.out_axis * (self.bulge * 4.0 * w * (1.0 - w))
            }
            Phase::Hold => self.target,
            Phase::Outro => self.default.lerp(self.target, w),
            Phase::Idle => self.default,
        }
    }

    /// `straight` suppresses the curved hand-off; otherwise the bulge scales
    /// with how far the hand has to travel.
    pub fn trigger(&mut self, target: Vec3, env: TimingEnvelope, shift: bool, straight: bool, out_axis: Vec3) {
        self.src = self.value();
        self.target = target;
        if shift {
            self.default = target;
        }
        self.bulge = if straight { 0.0 } else { (HANDOFF_CURVE * (target - self.src).length()).min(HANDOFF_MAX) };
        self.out_axis = out_axis;
        self.env = env;
    }

    pub fn advance(&mut self, dt: f32) {
        self.env.advance(dt);
    }

    pub fn active(&self) -> bool {
        self.env.active()
    }

    pub fn set_default(&mut self, p: Vec3) {
        self.default = p;
        if !self.env.active() {
            self.src = p;
            self.target = p;
        }
    }

    pub fn default_value(&self) -> Vec3 {
        self.default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{reference_rig, BodyMap};

    #[test]
    fn body_points_resolve_and_mirror() {
        let sk = reference_rig();
        let chest = body_point(&sk, "chest", 1.0).unwrap();
        assert!(chest.z > 0.05, "chest point sits in front of the body");
        let le = body_point(&sk, "ear", 1.0).unwrap();
        let re = body_point(&sk, "ear", -1.0).unwrap();
        assert!((le.x + re.x).abs() < 1e-6 && le.x > 0.0);
        assert!(body_point(&sk, "nowhere", 1.0).is_none());
    }

    #[test]
    fn hand_points_resolve() {
        let sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        let arm = map.left.clone();
        let tip = hand_point(&sk, &arm, "tip_2").unwrap();
        let base = hand_point(&sk, &arm, "base_2").unwrap();
        assert!((tip - base).length() > 0.05, "fingertip beyond the base joint");
        assert!(hand_point(&sk, &arm, "palm").is_some());
        assert!(hand_point(&sk, &arm, "tip_1").is_some());
        assert!(hand_point(&sk, &arm, "tip_9").is_none());
        assert!(hand_point(&sk, &arm, "side_2").is_none());
    }

    #[test]
    fn handoff_bulges_mid_intro_only() {
        let mut a = LocationAnimator::new(Vec3::ZERO);
        let target = Vec3::new(0.0, 0.0, 0.4);
        a.trigger(target, TimingEnvelope::new(0.0, 0.4, 0.8, 1.0), false, false, Vec3::Y);
        assert!(a.value().y.abs() < 1e-6, "no bulge at t=0");
        a.advance(0.2);
        assert!(a.value().y > 0.005, "bulge mid-intro");
        a.advance(0.2);
        assert!(a.value().y.abs() < 1e-4, "no bulge at the peak");
        assert!((a.value() - target).length() < 1e-4);
    }

    #[test]
    fn straight_flag_suppresses_bulge() {
        let mut a = LocationAnimator::new(Vec3::ZERO);
        a.trigger(Vec3::new(0.0, 0.0, 0.4), TimingEnvelope::new(0.0, 0.4, 0.8, 1.0), false, true, Vec3::Y);
        a.advance(0.2);
        assert!(a.value().y.abs() < 1e-6);
    }

    #[test]
    fn retrigger_snapshots_live_point() {
        let mut a = LocationAnimator::new(Vec3::ZERO);
        a.trigger(Vec3::new(0.0, 0.0, 0.4), TimingEnvelope::new(0.0, 1.0, 2.0, 3.0), false, true, Vec3::Y);
        a.advance(0.5);
        let live = a.value();
        a.trigger(Vec3::new(0.2, 0.0, 0.0), TimingEnvelope::new(0.0, 1.0, 2.0, 3.0), false, true, Vec3::Y);
        assert!((a.value() - live).length() < 1e-6);
    }

    #[test]
    fn returns_to_default_after_end() {
        let mut a = LocationAnimator::new(Vec3::new(0.1, 0.9, 0.2));
        a.trigger(Vec3::new(0.0, 1.2, 0.4), TimingEnvelope::new(0.0, 0.2, 0.4, 0.6), false, true, Vec3::Y);
        a.advance(5.0);
        assert!((a.value() - Vec3::new(0.1, 0.9, 0.2)).length() < 1e-6);
        assert!(!a.active());
    }
}
