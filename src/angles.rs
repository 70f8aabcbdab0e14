// angles.rs — shared rotation/angle helpers for the solvers.
use glam::{Quat, Vec3};
use std::f32::consts::PI;

/// acos with the argument clamped to [-1,1] so float round-off never NaNs.
pub fn acos_safe(x: f32) -> f32 {
    x.clamp(-1.0, 1.0).acos()
}

/// asin with the argument clamped to [-1,1].
pub fn asin_safe(x: f32) -> f32 {
    x.clamp(-1.0, 1.0).asin()
}

/// Wrap an angle to (-π, π].
pub fn wrap_pi(a: f32) -> f32 {
    let mut a = a % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Shortest-arc midpoint of two angles. Explicit wrap handling so a pair
/// straddling ±180° averages across the seam, not the long way round.
pub fn midpoint_angle(a: f32, b: f32) -> f32 {
    wrap_pi(a + wrap_pi(b - a) * 0.5)
}

/// Decompose `q` into swing * twist, where twist is the rotation about
/// `axis` (unit) and swing the remainder. q == swing * twist.
pub fn swing_twist(q: Quat, axis: Vec3) -> (Quat, Quat) {
    let r = Vec3::new(q.x, q.y, q.z);
    let proj = axis * r.dot(axis);
    let twist = Quat::from_xyzw(proj.x, proj.y, proj.z, q.w);
    if twist.length_squared() < 1e-12 {
        // 180° swing exactly orthogonal to the axis: no twist component.
        return (q, Quat::IDENTITY);
    }
    let twist = twist.normalize();
    (q * twist.inverse(), twist)
}

/// Normalized lerp between quaternions, shortest path. Cheaper than slerp
/// and fine for the small per-frame angular deltas the animators produce.
pub fn nlerp(a: Quat, b: Quat, t: f32) -> Quat {
    let b = if a.dot(b) < 0.0 { -b } else { b };
    Quat::from_xyzw(
        a.x + (b.x - a.x) * t,
        a.y + (b.y - a.y) * t,
        a.z + (b.z - a.z) * t,
        a.w + (b.w - a.w) * t,
    )
    .normalize()
}

/// Rotation carrying world +Z onto `dir` (unit), built as bearing about +Y
/// then elevation about the bearing-rotated lateral axis. Used wherever a
/// direction needs a deterministic twist-free frame.
pub fn dir_quat(dir: Vec3) -> Quat {
    let bearing = dir.x.atan2(dir.z);
    let elev = asin_safe(dir.y);
    let qb = Quat::from_axis_angle(Vec3::Y, bearing);
    let lateral = qb * Vec3::X;
    Quat::from_axis_angle(lateral, -elev) * qb
}
