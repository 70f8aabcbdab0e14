// torso.rs — additive torso tilts layered over the spine chain.
//
// Codes: tf/tb tilt forward/back, tl/tr tilt left/right, rl/rr rotate
// left/right. One scalar animator per axis; the summed angles spread over
// the three spine joints with decreasing weight up the chain.

use glam::Quat;

use crate::envelope::{ScalarAnimator, TimingEnvelope};
use crate::gesture::TorsoSpec;
use crate::skeleton::{BodyMap, Skeleton};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TiltAxis {
    Forward,
    Side,
    Rotate,
}

fn parse_code(code: &str) -> Option<(TiltAxis, f32)> {
    match code {
        "tf" => Some((TiltAxis::Forward, 1.0)),
        "tb" => Some((TiltAxis::Forward, -1.0)),
        "tr" => Some((TiltAxis::Side, 1.0)),
        "tl" => Some((TiltAxis::Side, -1.0)),
        "rl" => Some((TiltAxis::Rotate, 1.0)),
        "rr" => Some((TiltAxis::Rotate, -1.0)),
        _ => {
            log::warn!("unknown torso code '{code}', ignoring");
            None
        }
    }
}

/// Bottom-up spine weights; most of the lean comes from the lower joints.
const SPINE_WEIGHTS: [f32; 3] = [0.5, 0.3, 0.2];

struct Tilt {
    axis: TiltAxis,
    anim: ScalarAnimator,
}

#[derive(Default)]
pub struct TorsoAnimator {
    tilts: Vec<Tilt>,
}

impl TorsoAnimator {
    pub fn new() -> Self {
        Self { tilts: Vec::new() }
    }

    pub fn trigger(&mut self, spec: &TorsoSpec, env: TimingEnvelope, shift: bool) {
        let Some((axis, sign)) = parse_code(&spec.code) else { return };
        let amount = if spec.amount.is_finite() { spec.amount } else { 0.0 };
        if let Some(t) = self.tilts.iter_mut().find(|t| t.axis == axis) {
            t.anim.trigger(amount * sign, env, shift);
        } else {
            let mut anim = ScalarAnimator::new(0.0, 1.0);
            anim.trigger(amount * sign, env, shift);
            self.tilts.push(Tilt { axis, anim });
        }
    }

    pub fn advance(&mut self, dt: f32) {
        for t in &mut self.tilts {
            t.anim.advance(dt);
        }
    }

    /// Drop tilts that have finished and settled back on a zero default.
    pub fn prune(&mut self) {
        self.tilts.retain(|t| t.anim.active() || t.anim.default_value() != 0.0);
    }

    pub fn active(&self) -> bool {
        self.tilts.iter().any(|t| t.anim.active() || t.anim.default_value() != 0.0)
    }

    pub fn apply(&self, sk: &mut Skeleton, body: &BodyMap) {
        let mut fwd = 0.0;
        let mut side = 0.0;
        let mut rot = 0.0;
        for t in &self.tilts {
            match t.axis {
                TiltAxis::Forward => fwd += t.anim.value(),
                TiltAxis::Side => side += t.anim.value(),
                TiltAxis::Rotate => rot += t.anim.value(),
            }
        }
        for (i, &joint) in body.spine.iter().enumerate() {
            let w = SPINE_WEIGHTS[i];
            let q = Quat::from_axis_angle(body.lateral, fwd * w)
                * Quat::from_axis_angle(body.forward, side * w)
                * Quat::from_axis_angle(body.up, rot * w);
            sk.set_local_rot(joint, sk.bind_rot(joint) * q);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{reference_rig, BodyMap};

    #[test]
    fn forward_tilt_leans_the_chest() {
        let mut sk = reference_rig();
        let body = BodyMap::from_skeleton(&sk).unwrap();
        let mut torso = TorsoAnimator::new();
        torso.trigger(
            &TorsoSpec { code: "tf".into(), amount: 0.4 },
            TimingEnvelope::new(0.0, 0.2, 1.0, 1.2),
            false,
        );
        torso.advance(0.5);
        let head_before = sk.world_pos(body.head);
        torso.apply(&mut sk, &body);
        let head_after = sk.world_pos(body.head);
        assert!(head_after.z > head_before.z + 0.02, "head moves forward");
        assert!(head_after.y < head_before.y, "and slightly down");
    }

    #[test]
    fn weights_decrease_up_the_chain() {
        let mut sk = reference_rig();
        let body = BodyMap::from_skeleton(&sk).unwrap();
        let mut torso = TorsoAnimator::new();
        torso.trigger(
            &TorsoSpec { code: "rl".into(), amount: 0.6 },
            TimingEnvelope::new(0.0, 0.2, 1.0, 1.2),
            false,
        );
        torso.advance(0.5);
        torso.apply(&mut sk, &body);
        let angle = |j: usize| sk.local_rot(j).to_axis_angle().1;
        assert!(angle(body.spine[0]) > angle(body.spine[1]));
        assert!(angle(body.spine[1]) > angle(body.spine[2]));
    }

    #[test]
    fn unknown_code_is_ignored() {
        let mut torso = TorsoAnimator::new();
        torso.trigger(
            &TorsoSpec { code: "zz".into(), amount: 0.4 },
            TimingEnvelope::new(0.0, 0.2, 1.0, 1.2),
            false,
        );
        assert!(!torso.active());
    }

    #[test]
    fn tilts_prune_after_end() {
        let mut torso = TorsoAnimator::new();
        torso.trigger(
            &TorsoSpec { code: "tl".into(), amount: 0.3 },
            TimingEnvelope::new(0.0, 0.2, 0.4, 0.6),
            false,
        );
        assert!(torso.active());
        torso.advance(1.0);
        torso.prune();
        assert!(!torso.active());
        assert!(torso.tilts.is_empty());
    }
}
