// arm_ik.rs — analytic two-bone arm solver.
//
// Places the wrist at a world target by composing, in order: automatic
// shoulder hunch/raise, a law-of-cosines elbow bend, an out-of-plane elbow
// swivel, and a bearing/elevation alignment of the whole arm. Everything is
// measured against the bind pose; inverse-trig arguments are clamped so the
// solver cannot NaN and never rejects a target.

use glam::{Quat, Vec3};

use crate::angles::{acos_safe, asin_safe, swing_twist};
use crate::skeleton::{ArmMap, BodyMap, Skeleton};

/// Empirically tuned ranges and curve knees. The formulas are fixed; these
/// literals are per-rig data.
#[derive(Clone, Copy, Debug)]
pub struct ArmIkTuning {
    /// Max automatic shoulder raise, radians.
    pub shoulder_raise_range: f32,
    /// Vertical target projection where the auto raise starts / saturates.
    pub shoulder_raise_knee: (f32, f32),
    /// Max automatic shoulder hunch, radians.
    pub shoulder_hunch_range: f32,
    /// Inward-lateral projection where the auto hunch starts / saturates.
    pub shoulder_hunch_knee: (f32, f32),
    /// Elbow swivel at full bend, radians; fades as the elbow straightens.
    pub elbow_raise_base: f32,
    /// Minimum target distance, as a fraction of max reach.
    pub min_reach: f32,
}

impl Default for ArmIkTuning {
    fn default() -> Self {
        Self {
            shoulder_raise_range: 15f32.to_radians(),
            shoulder_raise_knee: (0.35, 1.0),
            shoulder_hunch_range: 18f32.to_radians(),
            shoulder_hunch_knee: (0.25, 1.0),
            elbow_raise_base: 32f32.to_radians(),
            min_reach: 0.05,
        }
    }
}

/// Forced deltas layered on top of the automatic shoulder/elbow behavior,
/// radians. Produced by the per-arm scalar animators.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForcedOffsets {
    pub elbow_raise: f32,
    pub shoulder_raise: f32,
    pub shoulder_hunch: f32,
}

/// Clamped quadratic response: 0 below `knee.0`, rising as t² to 1 at `knee.1`.
fn quad_curve(p: f32, knee: (f32, f32)) -> f32 {
    let t = ((p - knee.0) / (knee.1 - knee.0).max(1e-6)).clamp(0.0, 1.0);
    t * t
}

/// Rotation carrying `from` onto `to` through the bearing/elevation frame
/// spanned by `up` and `fwd`: undo the current angles, apply the target
/// angles. Deterministic twist, unlike a minimal-arc rotation.
fn bearing_elevation_align(up: Vec3, fwd: Vec3, from: Vec3, to: Vec3) -> Quat {
    let lateral = up.cross(fwd);
    let frame = |d: Vec3| {
        let bearing = d.dot(lateral).atan2(d.dot(fwd));
        let elev = asin_safe(d.dot(up));
        let qb = Quat::from_axis_angle(up, bearing);
        Quat::from_axis_angle(qb * lateral, -elev) * qb
    };
    frame(to) * frame(from).inverse()
}

/// Solve shoulder/upper-arm/forearm rotations so the wrist lands on
/// `target`. `twist_correction` keeps the upper arm visually untwisted by
/// migrating its twist into the elbow (disabled during the constellation's
/// dry pass). Always succeeds; out-of-reach targets clamp to full extension.
pub fn solve(
    sk: &mut Skeleton,
    body: &BodyMap,
    arm: &ArmMap,
    target: Vec3,
    forced: &ForcedOffsets,
    twist_correction: bool,
    tuning: &ArmIkTuning,
) {
    let sign = arm.side.sign();
    sk.reset_to_bind(arm.clavicle);
    sk.reset_to_bind(arm.arm);
    sk.reset_to_bind(arm.forearm);

    // Automatic shoulder hunch/raise from the target direction.
    let arm_pos = sk.world_pos(arm.arm);
    let dir = (target - arm_pos).normalize_or_zero();
    let vert = dir.dot(body.up);
    let inward = -dir.dot(body.lateral * sign);
    let raise = tuning.shoulder_raise_range * quad_curve(vert, tuning.shoulder_raise_knee)
        + forced.shoulder_raise;
    let hunch = tuning.shoulder_hunch_range * quad_curve(inward, tuning.shoulder_hunch_knee)
        + forced.shoulder_hunch;
    let raise_axis = body.forward * sign;
    let hunch_axis = -body.up * sign;
    sk.rotate_world(
        arm.clavicle,
        Quat::from_axis_angle(raise_axis, raise) * Quat::from_axis_angle(hunch_axis, hunch),
    );

    // Elbow bend: law of cosines against the re-measured distance, relative
    // to the angle the bind pose already carries.
    let arm_pos = sk.world_pos(arm.arm);
    let (u, f) = (arm.upper_len, arm.fore_len);
    let reach = arm.max_reach();
    let dist = (target - arm_pos)
        .length()
        .clamp(tuning.min_reach * reach, reach * 0.9999);
    let beta = acos_safe((u * u + f * f - dist * dist) / (2.0 * u * f));
    let beta_bind = acos_safe((u * u + f * f - arm.tpose_len * arm.tpose_len) / (2.0 * u * f));
    let hinge = sk.bind_axis_now(arm.forearm, arm.elbow_hinge);
    sk.rotate_world(arm.forearm, Quat::from_axis_angle(hinge, beta_bind - beta));

    // Elbow raise: swivel about the shoulder↔wrist axis; the wrist stays put
    // while the elbow swings out of plane. Defaults toward zero as the elbow
    // straightens; mirrored sign on the right arm.
    let wrist_pos = sk.world_pos(arm.wrist);
    let swivel_axis = (wrist_pos - arm_pos).normalize_or_zero();
    let bend_frac = ((beta_bind - beta) / beta_bind.max(1e-6)).clamp(0.0, 1.0);
    let swivel = tuning.elbow_raise_base * bend_frac + forced.elbow_raise;
    sk.rotate_world(arm.arm, Quat::from_axis_angle(swivel_axis, -sign * swivel));

    // Shoulder bearing/elevation: undo the current wrist direction, apply
    // the target direction. Composes after the swivel, which was expressed
    // in bind-relative space.
    let wc = (sk.world_pos(arm.wrist) - arm_pos).normalize_or_zero();
    let wt = (target - arm_pos).normalize_or_zero();
    if wc != Vec3::ZERO && wt != Vec3::ZERO {
        sk.rotate_world(arm.arm, bearing_elevation_align(body.up, body.forward, wc, wt));
    }

    if twist_correction {
        // Move upper-arm twist (about its own long axis) into the elbow
        // joint; end-effector position is unchanged because the axis runs
        // through the elbow.
        let axis = sk.bone(arm.forearm).offset.normalize();
        let q_delta = sk.bind_rot(arm.arm).inverse() * sk.local_rot(arm.arm);
        let (swing, twist) = swing_twist(q_delta, axis);
        sk.set_local_rot(arm.arm, sk.bind_rot(arm.arm) * swing);
        sk.set_local_rot(arm.forearm, twist * sk.local_rot(arm.forearm));

        // Strip the twist this induces in the forearm (about the wrist
        // axis); the wrist solver owns hand roll.
        let waxis = sk.bone(arm.wrist).offset.normalize();
        let q_delta = sk.bind_rot(arm.forearm).inverse() * sk.local_rot(arm.forearm);
        let (swing, _) = swing_twist(q_delta, waxis);
        sk.set_local_rot(arm.forearm, sk.bind_rot(arm.forearm) * swing);
    }
}
