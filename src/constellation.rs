// constellation.rs — two-hand contact coordinator.
//
// Given live contact points on each hand (measured after the dry IK pass),
// computes the additive per-wrist offset that separates the contacts by a
// requested vector. Continuous mode re-measures every frame; otherwise the
// offset reached at attack_peak is frozen through the hold and decayed
// during the outro. Each arm's participation can be cancelled on its own.

use glam::Vec3;

use crate::envelope::{Phase, TimingEnvelope};
use crate::skeleton::Side;

fn idx(side: Side) -> usize {
    match side {
        Side::Left => 0,
        Side::Right => 1,
    }
}

pub struct HandConstellation {
    env: TimingEnvelope,
    keep_updating: bool,
    /// Requested world separation, left contact minus right contact (or hand
    /// contact minus body anchor in single-hand mode).
    separation: Vec3,
    /// Contact point name per hand; None = that arm does not participate.
    contacts: [Option<String>; 2],
    body_anchor: Option<String>,
    prev: [Vec3; 2],
    cur: [Vec3; 2],
    peak: [Vec3; 2],
    peak_frozen: bool,
}

impl HandConstellation {
    pub fn new(
        contacts: [Option<String>; 2],
        body_anchor: Option<String>,
        separation: Vec3,
        keep_updating: bool,
        env: TimingEnvelope,
    ) -> Self {
        Self {
            env,
            keep_updating,
            separation,
            contacts,
            body_anchor,
            prev: [Vec3::ZERO; 2],
            cur: [Vec3::ZERO; 2],
            peak: [Vec3::ZERO; 2],
            peak_frozen: false,
        }
    }

    /// Seed the "previous" offsets from a replaced instance so a retrigger
    /// ramps from the live offsets instead of popping to zero.
    pub fn inherit(&mut self, old: &HandConstellation) {
        self.prev = old.cur;
    }

    pub fn advance(&mut self, dt: f32) {
        self.env.advance(dt);
    }

    pub fn active(&self) -> bool {
        self.env.active() && (self.contacts[0].is_some() || self.contacts[1].is_some())
    }

    pub fn participates(&self, side: Side) -> bool {
        self.contacts[idx(side)].is_some()
    }

    pub fn contact_name(&self, side: Side) -> Option<&str> {
        self.contacts[idx(side)].as_deref()
    }

    pub fn body_anchor_name(&self) -> Option<&str> {
        self.body_anchor.as_deref()
    }

    /// Drop one arm, clearing only that arm's stored offsets.
    pub fn cancel_arm(&mut self, side: Side) {
        let i = idx(side);
        self.contacts[i] = None;
        self.prev[i] = Vec3::ZERO;
        self.cur[i] = Vec3::ZERO;
        self.peak[i] = Vec3::ZERO;
    }

    /// Recompute offsets from live contact positions (`points`, indexed
    /// left/right) and an optional body anchor for single-hand mode.
    pub fn update(&mut self, points: [Option<Vec3>; 2], anchor: Option<Vec3>) {
        let mut raw = [Vec3::ZERO; 2];
        match (self.participating_point(0, points), self.participating_point(1, points)) {
            (Some(pl), Some(pr)) => {
                let delta = self.separation - (pl - pr);
                raw[0] = delta * 0.5;
                raw[1] = -delta * 0.5;
            }
            (Some(p), None) | (None, Some(p)) => {
                if let Some(b) = anchor {
                    let i = if self.contacts[0].is_some() { 0 } else { 1 };
                    raw[i] = b + self.separation - p;
                }
            }
            (None, None) => {}
        }

        let w = self.env.weight();
        match self.env.phase() {
            Phase::Pending => self.cur = self.prev,
            Phase::Intro => {
                for i in 0..2 {
                    self.cur[i] = self.prev[i].lerp(raw[i], w);
                }
            }
            Phase::Hold => {
                if self.keep_updating {
                    self.cur = raw;
                } else {
                    if !self.peak_frozen {
                        self.peak = raw;
                        self.peak_frozen = true;
                    }
                    self.cur = self.peak;
                }
            }
            Phase::Outro => {
                let base = if self.keep_updating || !self.peak_frozen { raw } else { self.peak };
                for i in 0..2 {
                    self.cur[i] = base[i] * w;
                }
            }
            Phase::Idle => self.cur = [Vec3::ZERO; 2],
        }
    }

    fn participating_point(&self, i: usize, points: [Option<Vec3>; 2]) -> Option<Vec3> {
        self.contacts[i].as_ref().and_then(|_| points[i])
    }

    /// Additive wrist offset for one side at the current time.
    pub fn offset(&self, side: Side) -> Vec3 {
        self.cur[idx(side)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn both_hands(keep_updating: bool) -> HandConstellation {
        HandConstellation::new(
            [Some("pad_2".into()), Some("pad_2".into())],
            None,
            Vec3::new(0.05, 0.0, 0.0),
            keep_updating,
            TimingEnvelope::new(0.0, 0.25, 0.75, 1.0),
        )
    }

    #[test]
    fn offsets_close_the_separation() {
        let mut c = both_hands(true);
        c.advance(0.5); // hold
        let pl = Vec3::new(0.2, 1.0, 0.3);
        let pr = Vec3::new(-0.2, 1.0, 0.3);
        c.update([Some(pl), Some(pr)], None);
        let gap = (pl + c.offset(Side::Left)) - (pr + c.offset(Side::Right));
        assert!((gap - Vec3::new(0.05, 0.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn frozen_offset_ignores_pose_changes_during_hold() {
        let mut c = both_hands(false);
        c.advance(0.3); // into hold
        c.update([Some(Vec3::new(0.2, 1.0, 0.3)), Some(Vec3::new(-0.2, 1.0, 0.3))], None);
        let frozen = c.offset(Side::Left);
        // the underlying pose drifts; the captured offset must not
        c.advance(0.2);
        c.update([Some(Vec3::new(0.35, 1.1, 0.2)), Some(Vec3::new(-0.1, 0.9, 0.4))], None);
        assert!((c.offset(Side::Left) - frozen).length() < 1e-6);
        // continuous mode tracks instead
        let mut c = both_hands(true);
        c.advance(0.3);
        c.update([Some(Vec3::new(0.2, 1.0, 0.3)), Some(Vec3::new(-0.2, 1.0, 0.3))], None);
        let first = c.offset(Side::Left);
        c.advance(0.2);
        c.update([Some(Vec3::new(0.35, 1.0, 0.3)), Some(Vec3::new(-0.2, 1.0, 0.3))], None);
        assert!((c.offset(Side::Left) - first).length() > 1e-3);
    }

    #[test]
    fn outro_decays_to_zero() {
        let mut c = both_hands(false);
        c.advance(0.5);
        let points = [Some(Vec3::new(0.2, 1.0, 0.3)), Some(Vec3::new(-0.2, 1.0, 0.3))];
        c.update(points, None);
        assert!(c.offset(Side::Left).length() > 0.1);
        c.advance(0.6); // past end
        c.update(points, None);
        assert!(c.offset(Side::Left).length() < 1e-6);
        assert!(!c.active());
    }

    #[test]
    fn cancel_clears_only_that_arm() {
        let mut c = both_hands(true);
        c.advance(0.5);
        c.update([Some(Vec3::new(0.2, 1.0, 0.3)), Some(Vec3::new(-0.2, 1.0, 0.3))], None);
        assert!(c.offset(Side::Right).length() > 0.0);
        c.cancel_arm(Side::Right);
        assert_eq!(c.offset(Side::Right), Vec3::ZERO);
        assert!(!c.participates(Side::Right));
        assert!(c.participates(Side::Left));
        assert!(c.offset(Side::Left).length() > 0.0, "left offset untouched");
    }

    #[test]
    fn single_hand_anchors_to_body_point() {
        let mut c = HandConstellation::new(
            [None, Some("tip_2".into())],
            Some("chest".into()),
            Vec3::new(0.0, 0.0, 0.02),
            true,
            TimingEnvelope::new(0.0, 0.25, 0.75, 1.0),
        );
        c.advance(0.5);
        let p = Vec3::new(-0.2, 1.2, 0.25);
        let anchor = Vec3::new(0.0, 1.3, 0.12);
        c.update([None, Some(p)], Some(anchor));
        let reached = p + c.offset(Side::Right);
        assert!((reached - (anchor + Vec3::new(0.0, 0.0, 0.02))).length() < 1e-6);
        assert_eq!(c.offset(Side::Left), Vec3::ZERO);
    }
}
