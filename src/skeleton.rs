// skeleton.rs — bone hierarchy, bind pose, on-demand world transforms, and
// the reference humanoid rig built from rig.json proportions.
//
// Axes: X = character's left, Y = up, Z = forward (the character faces +Z).
// The reference rig binds in a T-pose, palms down, all bind rotations
// identity, so bind-derived axes read the same in world and local frames.

use glam::{Quat, Vec3};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

use crate::json_loader;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// +1 on the character's left (+X), -1 on the right.
    pub fn sign(self) -> f32 {
        match self {
            Side::Left => 1.0,
            Side::Right => -1.0,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Side::Left => "l",
            Side::Right => "r",
        }
    }

    pub fn mirror(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

// ── Rig proportions ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RigConfig {
    pub hips_height: f32,
    pub spine: f32,
    pub neck: f32,
    pub head: f32,
    pub clavicle_out: f32,
    pub clavicle_up: f32,
    pub shoulder_half: f32,
    pub upper_arm: f32,
    pub forearm: f32,
    pub hand: f32,
    pub finger_base: f32,
    pub finger_mid: f32,
    pub finger_tip: f32,
    pub finger_pitch: f32,
    pub thumb_root: [f32; 3],
    pub thumb_dir: [f32; 3],
    pub thumb_base: f32,
    pub thumb_mid: f32,
    pub thumb_tip: f32,
}

static RIG: OnceLock<RigConfig> = OnceLock::new();

pub fn rig() -> &'static RigConfig {
    RIG.get_or_init(|| json_loader::load("rig.json").expect("rig.json missing or malformed"))
}

// ── Bones ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    /// Bind translation relative to the parent.
    pub offset: Vec3,
    /// Bind local rotation.
    pub bind_rot: Quat,
    /// Current local rotation, written every frame by the orchestrator.
    pub rot: Quat,
}

#[derive(Clone, Debug, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
    by_name: HashMap<String, usize>,
}

impl Skeleton {
    pub fn add(&mut self, name: &str, parent: Option<usize>, offset: Vec3) -> usize {
        debug_assert!(parent.map_or(true, |p| p < self.bones.len()));
        let idx = self.bones.len();
        self.bones.push(Bone {
            name: name.to_string(),
            parent,
            offset,
            bind_rot: Quat::IDENTITY,
            rot: Quat::IDENTITY,
        });
        self.by_name.insert(name.to_string(), idx);
        idx
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn bone(&self, i: usize) -> &Bone {
        &self.bones[i]
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn parent(&self, i: usize) -> Option<usize> {
        self.bones[i].parent
    }

    pub fn local_rot(&self, i: usize) -> Quat {
        self.bones[i].rot
    }

    pub fn set_local_rot(&mut self, i: usize, q: Quat) {
        self.bones[i].rot = q.normalize();
    }

    pub fn bind_rot(&self, i: usize) -> Quat {
        self.bones[i].bind_rot
    }

    pub fn reset_to_bind(&mut self, i: usize) {
        self.bones[i].rot = self.bones[i].bind_rot;
    }

    pub fn reset_all(&mut self) {
        for b in &mut self.bones {
            b.rot = b.bind_rot;
        }
    }

    pub fn world_rot(&self, i: usize) -> Quat {
        match self.bones[i].parent {
            Some(p) => (self.world_rot(p) * self.bones[i].rot).normalize(),
            None => self.bones[i].rot,
        }
    }

    pub fn world_pos(&self, i: usize) -> Vec3 {
        match self.bones[i].parent {
            Some(p) => self.world_pos(p) + self.world_rot(p) * self.bones[i].offset,
            None => self.bones[i].offset,
        }
    }

    /// World rotation of the bind pose (ignores current rotations).
    pub fn bind_world_rot(&self, i: usize) -> Quat {
        match self.bones[i].parent {
            Some(p) => (self.bind_world_rot(p) * self.bones[i].bind_rot).normalize(),
            None => self.bones[i].bind_rot,
        }
    }

    pub fn bind_world_pos(&self, i: usize) -> Vec3 {
        match self.bones[i].parent {
            Some(p) => self.bind_world_pos(p) + self.bind_world_rot(p) * self.bones[i].offset,
            None => self.bones[i].offset,
        }
    }

    /// A bind-world axis re-expressed in bone `i`'s current world frame.
    pub fn bind_axis_now(&self, i: usize, axis: Vec3) -> Vec3 {
        self.world_rot(i) * self.bind_world_rot(i).inverse() * axis
    }

    /// Pre-compose a world-space rotation onto bone `i`, leaving its position
    /// fixed (children swing around it).
    pub fn rotate_world(&mut self, i: usize, q: Quat) {
        let pw = match self.bones[i].parent {
            Some(p) => self.world_rot(p),
            None => Quat::IDENTITY,
        };
        let local = self.bones[i].rot;
        self.bones[i].rot = (pw.inverse() * q * pw * local).normalize();
    }
}

// ── Reference humanoid ───────────────────────────────────────────────────────

pub const FINGERS: [&str; 4] = ["index", "middle", "ring", "pinky"];

/// T-pose humanoid with full finger/thumb chains on both hands, proportions
/// from rig.json. Hosts with their own hierarchy build an equivalent
/// `Skeleton` + `BodyMap` instead.
pub fn reference_rig() -> Skeleton {
    let r = rig();
    let mut sk = Skeleton::default();
    let hips = sk.add("hips", None, Vec3::new(0.0, r.hips_height, 0.0));
    let s0 = sk.add("spine0", Some(hips), Vec3::Y * r.spine);
    let s1 = sk.add("spine1", Some(s0), Vec3::Y * r.spine);
    let chest = sk.add("chest", Some(s1), Vec3::Y * r.spine);
    let neck = sk.add("neck", Some(chest), Vec3::Y * r.neck);
    sk.add("head", Some(neck), Vec3::Y * r.head);

    for side in [Side::Left, Side::Right] {
        let sx = side.sign();
        let p = side.prefix();
        let clav = sk.add(
            &format!("{p}_clavicle"),
            Some(chest),
            Vec3::new(sx * r.clavicle_out, r.clavicle_up, 0.0),
        );
        let arm = sk.add(
            &format!("{p}_arm"),
            Some(clav),
            Vec3::new(sx * (r.shoulder_half - r.clavicle_out), 0.0, 0.0),
        );
        let fore = sk.add(&format!("{p}_forearm"), Some(arm), Vec3::new(sx * r.upper_arm, 0.0, 0.0));
        let wrist = sk.add(&format!("{p}_wrist"), Some(fore), Vec3::new(sx * r.forearm, 0.0, 0.0));

        for (fi, fname) in FINGERS.iter().enumerate() {
            let z = r.finger_pitch * (1.5 - fi as f32);
            let base = sk.add(
                &format!("{p}_{fname}0"),
                Some(wrist),
                Vec3::new(sx * r.hand, 0.0, z),
            );
            let mid = sk.add(&format!("{p}_{fname}1"), Some(base), Vec3::new(sx * r.finger_base, 0.0, 0.0));
            sk.add(&format!("{p}_{fname}2"), Some(mid), Vec3::new(sx * r.finger_mid, 0.0, 0.0));
        }

        let troot = Vec3::new(sx * r.thumb_root[0], r.thumb_root[1], r.thumb_root[2]);
        let tdir = Vec3::new(sx * r.thumb_dir[0], r.thumb_dir[1], r.thumb_dir[2]).normalize();
        let t0 = sk.add(&format!("{p}_thumb0"), Some(wrist), troot);
        let t1 = sk.add(&format!("{p}_thumb1"), Some(t0), tdir * r.thumb_base);
        sk.add(&format!("{p}_thumb2"), Some(t1), tdir * r.thumb_mid);
    }
    sk
}

// ── Body map ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RigError {
    #[error("rig is missing bone '{0}'")]
    MissingBone(String),
}

/// Bone indices plus bind-derived geometry for one arm+hand chain.
#[derive(Clone, Debug)]
pub struct ArmMap {
    pub side: Side,
    pub clavicle: usize,
    pub arm: usize,
    pub forearm: usize,
    pub wrist: usize,
    /// index..pinky, base/mid/tip phalanges.
    pub fingers: [[usize; 3]; 4],
    pub thumb: [usize; 3],
    /// Local extension from a tip phalanx to the fingertip point.
    pub finger_tip_vec: Vec3,
    pub thumb_tip_vec: Vec3,
    pub upper_len: f32,
    pub fore_len: f32,
    /// Straight-line shoulder→wrist length in the bind pose.
    pub tpose_len: f32,
    pub hand_len: f32,
    pub thumb_len: f32,
    // Bind-frame hand axes.
    pub finger_dir: Vec3,
    pub palm_normal: Vec3,
    pub curl_axis: Vec3,
    pub splay_axis: Vec3,
    pub elbow_hinge: Vec3,
    pub thumb_dir: Vec3,
    pub thumb_curl_axis: Vec3,
    pub thumb_splay_axis: Vec3,
}

/// Semantic joints of the whole body, resolved once against a skeleton.
#[derive(Clone, Debug)]
pub struct BodyMap {
    pub hips: usize,
    pub spine: [usize; 3],
    pub neck: usize,
    pub head: usize,
    pub left: ArmMap,
    pub right: ArmMap,
    pub up: Vec3,
    pub forward: Vec3,
    /// Character's left.
    pub lateral: Vec3,
    pub shoulder_half: f32,
}

impl BodyMap {
    pub fn from_skeleton(sk: &Skeleton) -> Result<Self, RigError> {
        let find = |name: &str| sk.index(name).ok_or_else(|| RigError::MissingBone(name.to_string()));
        let hips = find("hips")?;
        let spine = [find("spine0")?, find("spine1")?, find("chest")?];
        let neck = find("neck")?;
        let head = find("head")?;
        let up = sk.bind_world_rot(hips) * Vec3::Y;
        let forward = sk.bind_world_rot(hips) * Vec3::Z;
        let lateral = sk.bind_world_rot(hips) * Vec3::X;
        let left = ArmMap::from_skeleton(sk, Side::Left, forward)?;
        let right = ArmMap::from_skeleton(sk, Side::Right, forward)?;
        let shoulder_half = (sk.bind_world_pos(left.arm) - sk.bind_world_pos(right.arm)).length() * 0.5;
        Ok(Self { hips, spine, neck, head, left, right, up, forward, lateral, shoulder_half })
    }

    pub fn arm(&self, side: Side) -> &ArmMap {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

impl ArmMap {
    fn from_skeleton(sk: &Skeleton, side: Side, forward: Vec3) -> Result<Self, RigError> {
        let p = side.prefix();
        let find = |name: String| sk.index(&name).ok_or(RigError::MissingBone(name));
        let clavicle = find(format!("{p}_clavicle"))?;
        let arm = find(format!("{p}_arm"))?;
        let forearm = find(format!("{p}_forearm"))?;
        let wrist = find(format!("{p}_wrist"))?;
        let mut fingers = [[0usize; 3]; 4];
        for (fi, fname) in FINGERS.iter().enumerate() {
            for seg in 0..3 {
                fingers[fi][seg] = find(format!("{p}_{fname}{seg}"))?;
            }
        }
        let thumb = [find(format!("{p}_thumb0"))?, find(format!("{p}_thumb1"))?, find(format!("{p}_thumb2"))?];

        let arm_pos = sk.bind_world_pos(arm);
        let fore_pos = sk.bind_world_pos(forearm);
        let wrist_pos = sk.bind_world_pos(wrist);
        let upper_len = (fore_pos - arm_pos).length();
        let fore_len = (wrist_pos - fore_pos).length();
        let tpose_len = (wrist_pos - arm_pos).length();

        let mid_base = sk.bind_world_pos(fingers[1][0]);
        let finger_dir = (mid_base - wrist_pos).normalize();
        let hand_len = (mid_base - wrist_pos).length()
            + sk.bone(fingers[1][1]).offset.length()
            + sk.bone(fingers[1][2]).offset.length()
            + rig().finger_tip;
        // thumbward across the palm: index sits on the thumb side
        let across = (sk.bind_world_pos(fingers[0][0]) - sk.bind_world_pos(fingers[3][0])).normalize();
        // chirality flips between hands, the palm faces the same way
        let palm_normal = (finger_dir.cross(across) * side.sign()).normalize();
        let curl_axis = finger_dir.cross(palm_normal).normalize();
        let splay_axis = finger_dir.cross(across).normalize();

        let t0 = sk.bind_world_pos(thumb[0]);
        let t1 = sk.bind_world_pos(thumb[1]);
        let t2 = sk.bind_world_pos(thumb[2]);
        let thumb_dir = (t2 - t0).normalize();
        let thumb_tip_vec = sk.bone(thumb[2]).offset.normalize() * rig().thumb_tip;
        let thumb_len = (t1 - t0).length() + (t2 - t1).length() + rig().thumb_tip;
        let thumb_curl_axis = thumb_dir.cross(palm_normal).normalize();
        let thumb_splay_axis = finger_dir.cross(thumb_dir).normalize();

        let elbow_hinge = (fore_pos - arm_pos).normalize().cross(forward).normalize();
        let finger_tip_vec = sk.bone(fingers[1][2]).offset.normalize() * rig().finger_tip;

        Ok(Self {
            side,
            clavicle,
            arm,
            forearm,
            wrist,
            fingers,
            thumb,
            finger_tip_vec,
            thumb_tip_vec,
            upper_len,
            fore_len,
            tpose_len,
            hand_len,
            thumb_len,
            finger_dir,
            palm_normal,
            curl_axis,
            splay_axis,
            elbow_hinge,
            thumb_dir,
            thumb_curl_axis,
            thumb_splay_axis,
        })
    }

    pub fn max_reach(&self) -> f32 {
        self.upper_len + self.fore_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_rig_resolves() {
        let sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        assert!(map.left.upper_len > 0.2 && map.left.fore_len > 0.2);
        // T-pose: straight arm
        assert!((map.left.tpose_len - map.left.max_reach()).abs() < 1e-5);
        // wrists mirror across the body midline
        let lw = sk.bind_world_pos(map.left.wrist);
        let rw = sk.bind_world_pos(map.right.wrist);
        assert!((lw.x + rw.x).abs() < 1e-5);
        assert!((lw.y - rw.y).abs() < 1e-5);
    }

    #[test]
    fn bind_axes_are_anatomical() {
        let sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        // palms face down in the bind pose
        assert!(map.left.palm_normal.dot(Vec3::NEG_Y) > 0.99);
        assert!(map.right.palm_normal.dot(Vec3::NEG_Y) > 0.99);
        // bending about the curl axis moves a left fingertip downward
        let q = Quat::from_axis_angle(map.left.curl_axis, 0.5);
        let moved = q * map.left.finger_dir;
        assert!(moved.y < -0.1);
        let q = Quat::from_axis_angle(map.right.curl_axis, 0.5);
        assert!((q * map.right.finger_dir).y < -0.1);
        // elbow hinge bends the forearm toward the front of the body
        let q = Quat::from_axis_angle(map.left.elbow_hinge, 0.5);
        let fore = (sk.bind_world_pos(map.left.wrist) - sk.bind_world_pos(map.left.forearm)).normalize();
        assert!((q * fore).z > 0.1);
    }

    #[test]
    fn rotate_world_preserves_position() {
        let mut sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        let before = sk.world_pos(map.left.forearm);
        sk.rotate_world(map.left.forearm, Quat::from_rotation_y(0.7));
        let after = sk.world_pos(map.left.forearm);
        assert!((before - after).length() < 1e-5);
        // children moved
        assert!((sk.world_pos(map.left.wrist) - sk.bind_world_pos(map.left.wrist)).length() > 0.05);
    }

    #[test]
    fn rotate_world_composes_in_world_space() {
        let mut sk = reference_rig();
        let map = BodyMap::from_skeleton(&sk).unwrap();
        // pre-rotate an ancestor, then request a world rotation on the child:
        // the child's world rotation must equal q * previous_world
        sk.rotate_world(map.left.arm, Quat::from_rotation_z(0.4));
        let before = sk.world_rot(map.left.forearm);
        let q = Quat::from_rotation_x(0.6);
        sk.rotate_world(map.left.forearm, q);
        let after = sk.world_rot(map.left.forearm);
        assert!(after.dot(q * before).abs() > 0.99999);
    }
}
