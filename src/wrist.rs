// wrist.rs — extfidir/palmor swing-twist wrist solver.
//
// Orients the hand so its pointing axis (wrist → fingertips) faces a
// requested world direction and the palm is twisted by a requested angle
// about that axis, independent of whatever the arm IK does; the
// orchestrator re-expresses the result against the solved arm afterwards.

use glam::{Quat, Vec3};

use crate::angles::{dir_quat, midpoint_angle, nlerp, wrap_pi};
use crate::envelope::{Phase, TimingEnvelope};
use crate::skeleton::{ArmMap, Skeleton};

/// Resolved orientation request: a world pointing direction plus a twist.
#[derive(Clone, Copy, Debug)]
pub struct OrientationTarget {
    pub dir: Vec3,
    pub palmor: f32,
}

impl OrientationTarget {
    /// Combine primary and optional secondary values: directions average as
    /// vectors, twists take the shortest-arc midpoint (wraps near ±180°).
    pub fn resolve(
        dir: Vec3,
        second_dir: Option<Vec3>,
        palmor: f32,
        second_palmor: Option<f32>,
    ) -> Self {
        let dir = match second_dir {
            Some(d2) => {
                let sum = dir + d2;
                if sum.length_squared() < 1e-8 {
                    dir // opposing pair: keep the primary
                } else {
                    sum.normalize()
                }
            }
            None => dir,
        };
        let palmor = wrap_pi(if palmor.is_finite() { palmor } else { 0.0 });
        let palmor = match second_palmor {
            Some(p2) if p2.is_finite() => midpoint_angle(palmor, p2),
            _ => palmor,
        };
        Self { dir, palmor }
    }
}

/// Wrist local rotation (under bind-pose ancestors) pointing the hand along
/// `target.dir` with `target.palmor` twist.
///
/// Built in world space off the bind pose: align the pointing axis to +Z,
/// align the palm to face down, re-aim by elevation/bearing about locally
/// re-derived axes, then twist about the final pointing axis.
pub fn solve(sk: &Skeleton, arm: &ArmMap, target: &OrientationTarget) -> Quat {
    let bind_world = sk.bind_world_rot(arm.wrist);
    let parent_bind = match sk.parent(arm.wrist) {
        Some(p) => sk.bind_world_rot(p),
        None => Quat::IDENTITY,
    };

    // canonical frame: fingers forward, palm down
    let q1 = Quat::from_rotation_arc(arm.finger_dir, Vec3::Z);
    let q2 = Quat::from_rotation_arc(q1 * arm.palm_normal, Vec3::NEG_Y);
    let canonical = q2 * q1;

    // elevation/bearing re-aim of the requested direction
    let d = target.dir.normalize_or_zero();
    let d = if d == Vec3::ZERO { Vec3::Z } else { d };
    let aim = dir_quat(d);

    let twist = Quat::from_axis_angle(d, target.palmor);
    let world = twist * aim * canonical * bind_world;
    parent_bind.inverse() * world
}

// ── Animator ─────────────────────────────────────────────────────────────────

/// nlerp-blends the wrist's local rotation between source, target and
/// default along the envelope.
pub struct WristAnimator {
    env: TimingEnvelope,
    src: Quat,
    target: Quat,
    default: Quat,
}

impl WristAnimator {
    pub fn new(bind_local: Quat) -> Self {
        Self { env: TimingEnvelope::finished(), src: bind_local, target: bind_local, default: bind_local }
    }

    pub fn value(&self) -> Quat {
        let w = self.env.weight();
        match self.env.phase() {
            Phase::Pending => self.src,
            Phase::Intro => nlerp(self.src, self.target, w),
            Phase::Hold => self.target,
            Phase::Outro => nlerp(self.default, self.target, w),
            Phase::Idle => self.default,
        }
    }

    pub fn trigger(&mut self, target: Quat, env: TimingEnvelope, shift: bool) {
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

    pub fn set_default(&mut self, q: Quat) {
        self.default = q;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{reference_rig, BodyMap, Side};
    use std::f32::consts::{FRAC_PI_2, PI};

    fn hand_axes(sk: &Skeleton, arm: &ArmMap) -> (Vec3, Vec3) {
        let q = sk.world_rot(arm.wrist);
        let bind = sk.bind_world_rot(arm.wrist);
        let delta = q * bind.inverse();
        (delta * arm.finger_dir, delta * arm.palm_normal)
    }

    #[test]
    fn points_hand_along_requested_direction() {
        for side in [Side::Left, Side::Right] {
            let mut sk = reference_rig();
            let map = BodyMap::from_skeleton(&sk).unwrap();
            let arm = map.arm(side).clone();
            for dir in [Vec3::Z, Vec3::Y, Vec3::new(1.0, 1.0, 1.0).normalize()] {
                let local = solve(&sk, &arm, &OrientationTarget { dir, palmor: 0.0 });
                sk.set_local_rot(arm.wrist, local);
                let (point, _) = hand_axes(&sk, &arm);
                assert!(point.dot(dir) > 0.999, "{side:?} dir {dir:?} → pointing {point:?}");
            }
        }
    }

    #[test]
    fn zero_palmor_faces_palm_down_when_pointing_out() {
        let mut sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        let arm = map.left.clone();
        let local = solve(&sk, &arm, &OrientationTarget { dir: Vec3::Z, palmor: 0.0 });
        sk.set_local_rot(arm.wrist, local);
        let (_, palm) = hand_axes(&sk, &arm);
        assert!(palm.dot(Vec3::NEG_Y) > 0.999, "palm {palm:?}");
    }

    #[test]
    fn palmor_twists_about_pointing_axis() {
        let mut sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        let arm = map.left.clone();
        let local = solve(&sk, &arm, &OrientationTarget { dir: Vec3::Z, palmor: FRAC_PI_2 });
        sk.set_local_rot(arm.wrist, local);
        let (point, palm) = hand_axes(&sk, &arm);
        assert!(point.dot(Vec3::Z) > 0.999, "twist must not change the pointing axis");
        // +90° about +Z carries -Y onto +X
        assert!(palm.dot(Vec3::X) > 0.99, "palm {palm:?}");
    }

    #[test]
    fn secondary_values_average() {
        let t = OrientationTarget::resolve(Vec3::Y, Some(Vec3::Z), 0.0, None);
        assert!((t.dir - Vec3::new(0.0, 1.0, 1.0).normalize()).length() < 1e-6);
        // palmor midpoint wraps across ±180°
        let t = OrientationTarget::resolve(Vec3::Z, None, 170f32.to_radians(), Some(-170f32.to_radians()));
        assert!((t.palmor.abs() - PI).abs() < 1e-4);
    }

    #[test]
    fn animator_blends_and_restores_default() {
        let sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        let arm = map.left.clone();
        let bind_local = sk.bind_rot(arm.wrist);
        let mut a = WristAnimator::new(bind_local);
        let target = solve(&sk, &arm, &OrientationTarget { dir: Vec3::Y, palmor: 0.0 });
        a.trigger(target, TimingEnvelope::new(0.0, 0.4, 0.6, 1.0), false);
        a.advance(0.4);
        assert!(a.value().dot(target).abs() > 0.99999);
        a.advance(0.2);
        let mid_live = a.value();
        // retrigger mid-outro: continuity
        a.trigger(bind_local, TimingEnvelope::new(0.0, 0.2, 0.4, 0.6), false);
        assert!(a.value().dot(mid_live).abs() > 0.99999);
        a.advance(10.0);
        assert!(a.value().dot(bind_local).abs() > 0.99999);
    }
}
