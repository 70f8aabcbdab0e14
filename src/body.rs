// body.rs — per-frame orchestrator: owns the skeleton, dispatches gesture
// events to the per-arm animators, and composes handshape → wrist →
// overlays → arm IK → torso in a fixed order every update.
//
// The wrist is solved against bind-pose ancestors (steps 2-5), the arm IK
// then moves those ancestors, and step 9 re-expresses the snapshotted wrist
// world rotation against the solved chain, so hand orientation is
// independent of arm posture.

use glam::{Quat, Vec3};

use crate::angles::swing_twist;
use crate::arm_ik::{self, ArmIkTuning, ForcedOffsets};
use crate::constellation::HandConstellation;
use crate::envelope::ScalarAnimator;
use crate::gesture::{
    direction_vector, GestureEvent, Hand, LocationSpec, MotionSpec, Symmetry,
};
use crate::handshape::{self, HandPose, HandShapeAnimator, HandTuning, ThumbIkTuning};
use crate::location::{self, LocationAnimator};
use crate::motion::{CircularMotion, DirectedMotion, FingerPlay, Motion, WristMotion};
use crate::skeleton::{ArmMap, BodyMap, RigError, Side, Skeleton};
use crate::torso::TorsoAnimator;
use crate::wrist::{self, OrientationTarget, WristAnimator};

/// Hand point standing in for the wrist when a location names a contact.
struct HandContact {
    name: String,
    continuous: bool,
    /// wrist→contact offset captured once at trigger (non-continuous mode).
    frozen: Option<Vec3>,
}

pub struct ArmState {
    map: ArmMap,
    location: LocationAnimator,
    contact: Option<HandContact>,
    orientation: WristAnimator,
    handshape: HandShapeAnimator,
    motions: Vec<Motion>,
    elbow_raise: ScalarAnimator,
    shoulder_raise: ScalarAnimator,
    shoulder_hunch: ScalarAnimator,
}

impl ArmState {
    fn new(sk: &Skeleton, map: ArmMap) -> Self {
        let rest = sk.bind_world_pos(map.wrist);
        let bind_local = sk.bind_rot(map.wrist);
        Self {
            location: LocationAnimator::new(rest),
            contact: None,
            orientation: WristAnimator::new(bind_local),
            handshape: HandShapeAnimator::new(),
            motions: Vec::new(),
            elbow_raise: ScalarAnimator::degrees(0.0),
            shoulder_raise: ScalarAnimator::degrees(0.0),
            shoulder_hunch: ScalarAnimator::degrees(0.0),
            map,
        }
    }

    fn advance(&mut self, dt: f32) {
        self.location.advance(dt);
        self.orientation.advance(dt);
        self.handshape.advance(dt);
        self.elbow_raise.advance(dt);
        self.shoulder_raise.advance(dt);
        self.shoulder_hunch.advance(dt);
        for m in &mut self.motions {
            m.advance(dt);
        }
    }

    fn prune(&mut self) {
        self.motions.retain(|m| m.active());
        if !self.location.active() {
            self.contact = None;
        }
    }

    fn needs_update(&self) -> bool {
        self.location.active()
            || self.orientation.active()
            || self.handshape.active()
            || self.elbow_raise.active()
            || self.shoulder_raise.active()
            || self.shoulder_hunch.active()
            || !self.motions.is_empty()
    }

    fn finger_play_deltas(&self) -> [f32; 4] {
        let mut out = [0.0; 4];
        for m in &self.motions {
            if let Motion::FingerPlay(p) = m {
                let d = p.deltas();
                for i in 0..4 {
                    out[i] += d[i];
                }
            }
        }
        out
    }
}

/// Per-arm scratch carried between the preparation pass and the IK passes.
#[derive(Clone, Copy)]
struct ArmFrame {
    target: Vec3,
    wrist_world: Quat,
    forced: ForcedOffsets,
}

pub struct BodyController {
    pub skeleton: Skeleton,
    body: BodyMap,
    left: ArmState,
    right: ArmState,
    constellation: Option<HandConstellation>,
    torso: TorsoAnimator,
    dominant: Side,
    pub arm_tuning: ArmIkTuning,
    pub hand_tuning: HandTuning,
    pub thumb_tuning: ThumbIkTuning,
    /// Fraction of the wrist's roll migrated into the forearm in step 9.
    pub forearm_twist: f32,
    settled: bool,
}

fn side_index(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

impl BodyController {
    pub fn new(skeleton: Skeleton, dominant: Side) -> Result<Self, RigError> {
        let body = BodyMap::from_skeleton(&skeleton)?;
        let left = ArmState::new(&skeleton, body.left.clone());
        let right = ArmState::new(&skeleton, body.right.clone());
        let mut ctrl = Self {
            skeleton,
            body,
            left,
            right,
            constellation: None,
            torso: TorsoAnimator::new(),
            dominant,
            arm_tuning: ArmIkTuning::default(),
            hand_tuning: HandTuning::default(),
            thumb_tuning: ThumbIkTuning::default(),
            forearm_twist: 0.6,
            settled: false,
        };
        ctrl.reset();
        Ok(ctrl)
    }

    pub fn body(&self) -> &BodyMap {
        &self.body
    }

    pub fn dominant(&self) -> Side {
        self.dominant
    }

    /// Re-seed the rest pose from the bind pose and shift-lock it as every
    /// animator's default.
    pub fn reset(&mut self) {
        self.skeleton.reset_all();
        for side in [Side::Left, Side::Right] {
            let rest = self.skeleton.bind_world_pos(self.body.arm(side).wrist);
            let bind_local = self.skeleton.bind_rot(self.body.arm(side).wrist);
            let st = self.arm_mut(side);
            st.location = LocationAnimator::new(rest);
            st.orientation = WristAnimator::new(bind_local);
            st.handshape = HandShapeAnimator::new();
            st.motions.clear();
            st.contact = None;
            st.elbow_raise = ScalarAnimator::degrees(0.0);
            st.shoulder_raise = ScalarAnimator::degrees(0.0);
            st.shoulder_hunch = ScalarAnimator::degrees(0.0);
        }
        self.constellation = None;
        self.torso = TorsoAnimator::new();
        self.settled = false;
    }

    fn arm(&self, side: Side) -> &ArmState {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    fn arm_mut(&mut self, side: Side) -> &mut ArmState {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    pub fn new_gesture(&mut self, ev: &GestureEvent) {
        let sides: &[(Side, bool)] = match ev.hand {
            Hand::Left => &[(Side::Left, false)],
            Hand::Right => &[(Side::Right, false)],
            Hand::Dominant => match self.dominant {
                Side::Left => &[(Side::Left, false)],
                Side::Right => &[(Side::Right, false)],
            },
            Hand::NonDominant => match self.dominant {
                Side::Left => &[(Side::Right, true)],
                Side::Right => &[(Side::Left, true)],
            },
            Hand::Both => match self.dominant {
                Side::Left => &[(Side::Left, false), (Side::Right, true)],
                Side::Right => &[(Side::Right, false), (Side::Left, true)],
            },
        };
        for &(side, mirrored) in sides {
            let sym = if mirrored { ev.sym } else { Symmetry::default() };
            self.dispatch_arm(ev, side, sym);
        }

        if let Some(t) = &ev.torso {
            self.torso.trigger(t, ev.env, ev.shift);
        }

        if let Some(cs) = &ev.constellation {
            let mut sep = cs
                .direction
                .as_deref()
                .and_then(direction_vector)
                .map(|d| d * if cs.distance.is_finite() { cs.distance } else { 0.0 })
                .unwrap_or(Vec3::ZERO);
            let mut contacts: [Option<String>; 2] = [None, None];
            contacts[side_index(self.dominant)] = Some(cs.hand_a.clone());
            if let Some(b) = &cs.hand_b {
                contacts[side_index(self.dominant.mirror())] = Some(b.clone());
                // stored separation is left-minus-right
                if self.dominant == Side::Right {
                    sep = -sep;
                }
            }
            let mut c = HandConstellation::new(
                contacts,
                cs.body_location.clone(),
                sep,
                cs.keep_updating,
                ev.env,
            );
            if let Some(old) = &self.constellation {
                c.inherit(old);
            }
            self.constellation = Some(c);
        }
        self.settled = false;
    }

    fn dispatch_arm(&mut self, ev: &GestureEvent, side: Side, sym: Symmetry) {
        if let Some(loc) = &ev.location {
            if let Some(point) = self.resolve_location(loc, side, sym) {
                // a fresh arm placement takes this arm out of any running
                // two-hand constellation
                if ev.constellation.is_none() {
                    if let Some(c) = &mut self.constellation {
                        c.cancel_arm(side);
                    }
                }
                let contact = loc.contact.as_ref().map(|name| {
                    // non-continuous contacts capture the wrist→contact
                    // offset once, from the pose at trigger time
                    let frozen = if loc.contact_continuous {
                        None
                    } else {
                        location::hand_point(&self.skeleton, &self.arm(side).map, name)
                            .map(|p| p - self.skeleton.world_pos(self.arm(side).map.wrist))
                    };
                    HandContact { name: name.clone(), continuous: loc.contact_continuous, frozen }
                });
                let out_axis = self.body.forward;
                let st = self.arm_mut(side);
                st.location.trigger(point, ev.env, ev.shift, loc.straight, out_axis);
                st.contact = contact;
            }
        }

        if let Some(o) = &ev.orientation {
            // unknown primary code falls back to pointing front
            let dir = direction_vector(&o.extfidir).unwrap_or(Vec3::Z);
            let dir = sym.apply(dir);
            let second = o
                .second_extfidir
                .as_deref()
                .and_then(direction_vector)
                .map(|d| sym.apply(d));
            let palmor = if sym.lr { -o.palmor } else { o.palmor };
            let second_palmor = o.second_palmor.map(|p| if sym.lr { -p } else { p });
            let target = OrientationTarget::resolve(dir, second, palmor, second_palmor);
            let map = self.arm(side).map.clone();
            let local = wrist::solve(&self.skeleton, &map, &target);
            self.arm_mut(side)
                .orientation
                .trigger(local, ev.env, ev.shift);
        }

        if let Some(h) = &ev.handshape {
            let composed = handshape::compose(h);
            let map = self.arm(side).map.clone();
            let mut pose = HandPose {
                fingers: composed.fingers,
                thumb: handshape::thumb_rotations(&map, composed.thumb, &self.hand_tuning),
            };
            // thumb re-aim: an explicit target wins, otherwise a pinch/cee
            // finger remap opposes the chosen finger's pad
            let thumb_target = h
                .thumb_target
                .clone()
                .or_else(|| composed.thumb_digit.map(|d| format!("pad_{d}")));
            if let Some(name) = thumb_target {
                handshape::apply(&mut self.skeleton, &map, &pose, [0.0; 4], &self.hand_tuning);
                if let Some(target) = location::hand_point(&self.skeleton, &map, &name) {
                    pose.thumb =
                        handshape::thumb_ik(&mut self.skeleton, &map, target, &self.thumb_tuning);
                }
            }
            self.arm_mut(side).handshape.trigger(pose, ev.env, ev.shift);
        }

        for m in &ev.motions {
            match m {
                MotionSpec::Directed(d) => {
                    let Some(dir) = direction_vector(&d.direction) else { continue };
                    let dir = match d.second_direction.as_deref().and_then(direction_vector) {
                        Some(d2) => (dir + d2).normalize_or_zero(),
                        None => dir,
                    };
                    let dir = sym.apply(if dir == Vec3::ZERO { Vec3::Z } else { dir });
                    self.arm_mut(side).motions.push(Motion::Directed(DirectedMotion::new(
                        dir,
                        d.distance,
                        d.curve_size,
                        d.zigzag,
                        d.env,
                    )));
                }
                MotionSpec::Circular(c) => {
                    let Some(dir) = direction_vector(&c.direction) else { continue };
                    let dir = match c.second_direction.as_deref().and_then(direction_vector) {
                        Some(d2) => (dir + d2).normalize_or_zero(),
                        None => dir,
                    };
                    let dir = sym.apply(if dir == Vec3::ZERO { Vec3::Z } else { dir });
                    self.arm_mut(side).motions.push(Motion::Circular(CircularMotion::new(
                        dir,
                        c.distance,
                        c.ellipse_ratio,
                        c.start_angle,
                        c.end_angle,
                        c.zigzag,
                        c.env,
                    )));
                }
                MotionSpec::FingerPlay(f) => {
                    let st = self.arm_mut(side);
                    // replace any running finger-play, inheriting its live
                    // amplitude so the retrigger ramps instead of popping
                    let mut prev_ampl = 0.0;
                    st.motions.retain(|m| match m {
                        Motion::FingerPlay(p) => {
                            prev_ampl = p.amplitude();
                            false
                        }
                        _ => true,
                    });
                    st.motions.push(Motion::FingerPlay(FingerPlay::new(
                        f.intensity,
                        f.speed,
                        f.fingers,
                        prev_ampl,
                        f.env,
                    )));
                }
                MotionSpec::Wrist(w) => {
                    self.arm_mut(side).motions.push(Motion::Wrist(WristMotion::new(
                        w.mode,
                        w.intensity,
                        w.speed,
                        w.env,
                    )));
                }
            }
        }

        let st = self.arm_mut(side);
        if let Some(v) = ev.elbow_raise {
            st.elbow_raise.trigger(v, ev.env, ev.shift);
        }
        if let Some(v) = ev.shoulder_raise {
            st.shoulder_raise.trigger(v, ev.env, ev.shift);
        }
        if let Some(v) = ev.shoulder_hunch {
            st.shoulder_hunch.trigger(v, ev.env, ev.shift);
        }
    }

    fn resolve_location(&self, loc: &LocationSpec, side: Side, sym: Symmetry) -> Option<Vec3> {
        let arm = self.arm(side);
        let base = location::body_point(&self.skeleton, &loc.name, side.sign())?;
        let side_shift = match loc.side.as_deref() {
            None => 0.0,
            Some("l") => 0.5,
            Some("ll") => 1.0,
            Some("r") => -0.5,
            Some("rr") => -1.0,
            Some(other) => {
                log::warn!("unknown location side '{other}', ignoring");
                0.0
            }
        } * self.body.shoulder_half;
        let dist = if loc.distance.is_finite() { loc.distance.clamp(0.0, 1.0) } else { 0.0 };
        let mut offset =
            self.body.lateral * side_shift + self.body.forward * (dist * arm.map.max_reach());
        if let Some(code) = &loc.displace {
            if let Some(d) = direction_vector(code) {
                let mag = if loc.displace_distance.is_finite() { loc.displace_distance } else { 0.0 };
                offset += d * mag;
            }
        }
        Some(base + sym.apply(offset))
    }

    // ── Per-frame update ─────────────────────────────────────────────────────

    pub fn update(&mut self, dt: f32) {
        self.left.advance(dt);
        self.right.advance(dt);
        self.torso.advance(dt);
        if let Some(c) = &mut self.constellation {
            c.advance(dt);
        }

        self.left.prune();
        self.right.prune();
        self.torso.prune();
        if self.constellation.as_ref().is_some_and(|c| !c.active()) {
            self.constellation = None;
        }

        let any_active = self.left.needs_update()
            || self.right.needs_update()
            || self.constellation.is_some()
            || self.torso.active();
        if !any_active && self.settled {
            return;
        }

        // steps 1-7 per arm: reset, hand, wrist, overlays, target, scalars
        let mut frames = [ArmFrame {
            target: Vec3::ZERO,
            wrist_world: Quat::IDENTITY,
            forced: ForcedOffsets::default(),
        }; 2];
        for side in [Side::Left, Side::Right] {
            frames[side_index(side)] = self.prepare_arm(side);
        }

        // dry IK pass feeding live contact points into the constellation
        if let Some(mut c) = self.constellation.take() {
            let mut points = [None, None];
            let mut anchor = None;
            for side in [Side::Left, Side::Right] {
                if !c.participates(side) {
                    continue;
                }
                let i = side_index(side);
                let map = self.arm(side).map.clone();
                arm_ik::solve(
                    &mut self.skeleton,
                    &self.body,
                    &map,
                    frames[i].target,
                    &frames[i].forced,
                    false,
                    &self.arm_tuning,
                );
                // re-express the wrist here too, so the measured contact
                // points carry the hand's final orientation
                let local = self.skeleton.world_rot(map.forearm).inverse() * frames[i].wrist_world;
                self.skeleton.set_local_rot(map.wrist, local);
                if let Some(name) = c.contact_name(side) {
                    points[i] = location::hand_point(&self.skeleton, &map, name);
                }
                if let Some(bn) = c.body_anchor_name() {
                    anchor = location::body_point(&self.skeleton, bn, side.sign());
                }
            }
            c.update(points, anchor);
            for side in [Side::Left, Side::Right] {
                frames[side_index(side)].target += c.offset(side);
            }
            self.constellation = Some(c);
        }

        // final IK (aesthetic twist correction on) + wrist re-expression
        for side in [Side::Left, Side::Right] {
            let i = side_index(side);
            let map = self.arm(side).map.clone();
            arm_ik::solve(
                &mut self.skeleton,
                &self.body,
                &map,
                frames[i].target,
                &frames[i].forced,
                true,
                &self.arm_tuning,
            );
            // step 9: the wrist keeps the world orientation it was given
            // under bind ancestors, regardless of where the IK put the arm
            let local = self.skeleton.world_rot(map.forearm).inverse() * frames[i].wrist_world;
            self.skeleton.set_local_rot(map.wrist, local);
            self.redistribute_forearm_twist(&map);
        }

        self.torso.apply(&mut self.skeleton, &self.body);
        self.settled = !any_active;
    }

    /// Steps 1-7 for one arm; leaves the hand posed (under bind ancestors)
    /// and returns the combined wrist target and forced scalar offsets.
    fn prepare_arm(&mut self, side: Side) -> ArmFrame {
        let map = self.arm(side).map.clone();
        self.skeleton.reset_to_bind(map.clavicle);
        self.skeleton.reset_to_bind(map.arm);
        self.skeleton.reset_to_bind(map.forearm);

        // hand shape + finger play
        let pose = self.arm(side).handshape.value();
        let play = self.arm(side).finger_play_deltas();
        handshape::apply(&mut self.skeleton, &map, &pose, play, &self.hand_tuning);

        // wrist orientation, then additive wrist wiggle in the hand's bind
        // frame, conjugated into the local slot
        let parent_bind = self.skeleton.bind_world_rot(map.forearm);
        let mut wrist_local = self.arm(side).orientation.value();
        for m in &self.arm(side).motions {
            if let Motion::Wrist(wm) = m {
                let q = wm.rotation(&map);
                wrist_local = (parent_bind.inverse() * q * parent_bind * wrist_local).normalize();
            }
        }
        self.skeleton.set_local_rot(map.wrist, wrist_local);
        let wrist_world = parent_bind * wrist_local;

        // wrist target: location, minus the hand-contact offset, plus paths
        let mut target = self.arm(side).location.value();
        if let Some(c) = &self.arm(side).contact {
            let off = match (&c.frozen, c.continuous) {
                (Some(f), false) => Some(*f),
                _ => location::hand_point(&self.skeleton, &map, &c.name)
                    .map(|p| p - self.skeleton.world_pos(map.wrist)),
            };
            if let Some(off) = off {
                target -= off;
            }
        }
        for m in &self.arm(side).motions {
            target += m.offset();
        }

        let forced = ForcedOffsets {
            elbow_raise: self.arm(side).elbow_raise.value(),
            shoulder_raise: self.arm(side).shoulder_raise.value(),
            shoulder_hunch: self.arm(side).shoulder_hunch.value(),
        };
        ArmFrame { target, wrist_world, forced }
    }

    /// Step 9 option: move part of the hand's roll (about the forearm's long
    /// axis) into the forearm, where pronation anatomically lives.
    fn redistribute_forearm_twist(&mut self, map: &ArmMap) {
        if self.forearm_twist <= 0.0 {
            return;
        }
        let axis = self.skeleton.bone(map.wrist).offset.normalize();
        let q_delta = self.skeleton.bind_rot(map.wrist).inverse() * self.skeleton.local_rot(map.wrist);
        let (_, twist) = swing_twist(q_delta, axis);
        let part = Quat::IDENTITY.slerp(twist, self.forearm_twist);
        self.skeleton
            .set_local_rot(map.forearm, self.skeleton.local_rot(map.forearm) * part);
        self.skeleton
            .set_local_rot(map.wrist, part.inverse() * self.skeleton.local_rot(map.wrist));
    }
}
