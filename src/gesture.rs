// gesture.rs — the symbolic gesture event model the engine consumes.
//
// Events arrive fully scheduled (envelope timestamps resolved upstream);
// name fields are validated here with warn-and-fallback semantics, never
// by halting the animation.

use glam::Vec3;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::envelope::TimingEnvelope;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
    Both,
    Dominant,
    NonDominant,
}

/// Mirror bits, applied only to the non-dominant side of a `Both` gesture.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Symmetry {
    pub lr: bool,
    pub ud: bool,
    pub io: bool,
}

impl Symmetry {
    pub fn any(&self) -> bool {
        self.lr || self.ud || self.io
    }

    pub fn apply(&self, v: Vec3) -> Vec3 {
        Vec3::new(
            if self.lr { -v.x } else { v.x },
            if self.ud { -v.y } else { v.y },
            if self.io { -v.z } else { v.z },
        )
    }
}

// ── Sub-specs ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
pub struct LocationSpec {
    /// Named body point ("chest", "chin", ...).
    pub name: String,
    /// Lateral shift: "ll", "l", "r", "rr" relative to the named point.
    #[serde(default)]
    pub side: Option<String>,
    /// Fraction of arm length to stand off from the body, along +forward.
    #[serde(default)]
    pub distance: f32,
    /// Extra displacement: direction code + magnitude in meters.
    #[serde(default)]
    pub displace: Option<String>,
    #[serde(default)]
    pub displace_distance: f32,
    /// Hand point that should reach the location instead of the wrist.
    #[serde(default)]
    pub contact: Option<String>,
    /// Re-measure the contact offset every frame instead of once.
    #[serde(default)]
    pub contact_continuous: bool,
    /// Suppress the curved hand-off and travel in a straight blend.
    #[serde(default)]
    pub straight: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OrientationSpec {
    /// Pointing direction code (extended-finger direction).
    pub extfidir: String,
    #[serde(default)]
    pub second_extfidir: Option<String>,
    /// Twist about the pointing axis, radians.
    #[serde(default)]
    pub palmor: f32,
    #[serde(default)]
    pub second_palmor: Option<f32>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct HandshapeSpec {
    pub shape: String,
    /// Blended in at 50% when present.
    pub second_shape: Option<String>,
    /// Bend preset applied to the selected fingers.
    pub main_bend: Option<String>,
    pub main_splay: Option<f32>,
    /// Per-finger bend preset overrides, index..pinky.
    pub bends: [Option<String>; 4],
    pub splays: [Option<f32>; 4],
    /// Restrict the shape to specific fingers (bit0 = index .. bit3 = pinky).
    pub selected: Option<u8>,
    /// Hand point the thumb should re-aim at (runs the thumb CCD).
    pub thumb_target: Option<String>,
    /// Relaxes non-thumb fingers when a pinch/cee shape is active, 0..1.
    pub thumb_combination_opening: f32,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct ZigzagSpec {
    /// Peak lateral excursion, meters.
    pub size: f32,
    /// Oscillation frequency, Hz.
    pub speed: f32,
}

impl Default for ZigzagSpec {
    fn default() -> Self {
        Self { size: 0.02, speed: 4.0 }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct DirectedSpec {
    pub env: TimingEnvelope,
    pub direction: String,
    #[serde(default)]
    pub second_direction: Option<String>,
    /// Path length, meters.
    pub distance: f32,
    /// Lateral bulge of the path, meters; 0 = straight.
    #[serde(default)]
    pub curve_size: f32,
    #[serde(default)]
    pub zigzag: Option<ZigzagSpec>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CircularSpec {
    pub env: TimingEnvelope,
    /// Plane normal of the sweep.
    pub direction: String,
    #[serde(default)]
    pub second_direction: Option<String>,
    /// Major radius, meters.
    pub distance: f32,
    /// Radians; the sweep runs over intro+hold.
    #[serde(default)]
    pub start_angle: f32,
    #[serde(default = "default_end_angle")]
    pub end_angle: f32,
    /// Minor/major axis ratio; 1 = circle.
    #[serde(default = "one")]
    pub ellipse_ratio: f32,
    #[serde(default)]
    pub zigzag: Option<ZigzagSpec>,
}

fn default_end_angle() -> f32 {
    std::f32::consts::TAU
}

fn one() -> f32 {
    1.0
}

#[derive(Clone, Debug, Deserialize)]
pub struct FingerPlaySpec {
    pub env: TimingEnvelope,
    /// Bend amplitude, 0..1.
    pub intensity: f32,
    /// Hz.
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// bit0 = index .. bit3 = pinky; 0 = all four.
    #[serde(default)]
    pub fingers: u8,
}

fn default_speed() -> f32 {
    3.0
}

pub const WRIST_NOD: u8 = 1;
pub const WRIST_SWING: u8 = 2;
pub const WRIST_TWIST: u8 = 4;
/// Nod + swing 90° out of phase traces a circle: "stir".
pub const WRIST_STIR: u8 = WRIST_NOD | WRIST_SWING;

#[derive(Clone, Debug, Deserialize)]
pub struct WristMotionSpec {
    pub env: TimingEnvelope,
    /// Combination of WRIST_NOD / WRIST_SWING / WRIST_TWIST bits.
    pub mode: u8,
    /// Swing amplitude, radians.
    pub intensity: f32,
    #[serde(default = "default_speed")]
    pub speed: f32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MotionSpec {
    Directed(DirectedSpec),
    Circular(CircularSpec),
    FingerPlay(FingerPlaySpec),
    Wrist(WristMotionSpec),
}

/// Torso tilt codes: "tf"/"tb" tilt forward/back, "tl"/"tr" tilt left/right,
/// "rl"/"rr" rotate left/right.
#[derive(Clone, Debug, Deserialize)]
pub struct TorsoSpec {
    pub code: String,
    /// Radians at full weight.
    pub amount: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ConstellationSpec {
    /// Contact point on the dominant hand.
    pub hand_a: String,
    /// Contact point on the other hand; when absent `body_location` anchors
    /// the single participating hand instead.
    #[serde(default)]
    pub hand_b: Option<String>,
    #[serde(default)]
    pub body_location: Option<String>,
    /// Requested separation: direction code + magnitude in meters.
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub distance: f32,
    /// true: track contact every frame; false: freeze the offset at peak.
    #[serde(default)]
    pub keep_updating: bool,
}

// ── The event ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
pub struct GestureEvent {
    pub hand: Hand,
    pub env: TimingEnvelope,
    /// Also redefine the rest pose of every sub-animator this event touches.
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub sym: Symmetry,
    #[serde(default)]
    pub location: Option<LocationSpec>,
    #[serde(default)]
    pub orientation: Option<OrientationSpec>,
    #[serde(default)]
    pub handshape: Option<HandshapeSpec>,
    #[serde(default)]
    pub motions: Vec<MotionSpec>,
    /// Degrees, matching the notation the events are authored in.
    #[serde(default)]
    pub elbow_raise: Option<f32>,
    #[serde(default)]
    pub shoulder_raise: Option<f32>,
    #[serde(default)]
    pub shoulder_hunch: Option<f32>,
    #[serde(default)]
    pub torso: Option<TorsoSpec>,
    #[serde(default)]
    pub constellation: Option<ConstellationSpec>,
}

impl GestureEvent {
    pub fn new(hand: Hand, env: TimingEnvelope) -> Self {
        Self {
            hand,
            env,
            shift: false,
            sym: Symmetry::default(),
            location: None,
            orientation: None,
            handshape: None,
            motions: Vec::new(),
            elbow_raise: None,
            shoulder_raise: None,
            shoulder_hunch: None,
            torso: None,
            constellation: None,
        }
    }
}

// ── Direction codes ──────────────────────────────────────────────────────────
//
// u/d = up/down, l/r = character's left/right, i/o = inward (toward the
// signer) / outward. Compound codes are the normalized component sum.

static DIRECTIONS: OnceLock<HashMap<&'static str, Vec3>> = OnceLock::new();

fn direction_table() -> &'static HashMap<&'static str, Vec3> {
    DIRECTIONS.get_or_init(|| {
        const CODES: [&str; 26] = [
            "u", "d", "l", "r", "i", "o", "ul", "ur", "dl", "dr", "ui", "uo", "di", "do", "li",
            "lo", "ri", "ro", "uli", "ulo", "uri", "uro", "dli", "dlo", "dri", "dro",
        ];
        let mut map = HashMap::new();
        for code in CODES {
            let mut v = Vec3::ZERO;
            for c in code.chars() {
                v += match c {
                    'u' => Vec3::Y,
                    'd' => Vec3::NEG_Y,
                    'l' => Vec3::X,
                    'r' => Vec3::NEG_X,
                    'o' => Vec3::Z,
                    'i' => Vec3::NEG_Z,
                    _ => unreachable!(),
                };
            }
            map.insert(code, v.normalize());
        }
        map
    })
}

/// World vector for a direction code; `None` (after a warning) for unknown
/// codes so callers can keep their previous target.
pub fn direction_vector(code: &str) -> Option<Vec3> {
    let v = direction_table().get(code).copied();
    if v.is_none() {
        log::warn!("unknown direction code '{code}', ignoring");
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinal_directions() {
        assert_eq!(direction_vector("u"), Some(Vec3::Y));
        assert_eq!(direction_vector("o"), Some(Vec3::Z));
        assert_eq!(direction_vector("r"), Some(Vec3::NEG_X));
        assert!(direction_vector("sideways").is_none());
    }

    #[test]
    fn compound_directions_normalized() {
        let v = direction_vector("uo").unwrap();
        assert!((v.length() - 1.0).abs() < 1e-6);
        assert!(v.y > 0.0 && v.z > 0.0 && v.x.abs() < 1e-6);
        let v = direction_vector("dri").unwrap();
        assert!(v.y < 0.0 && v.x < 0.0 && v.z < 0.0);
    }

    #[test]
    fn symmetry_mirrors_components() {
        let s = Symmetry { lr: true, ud: false, io: true };
        let v = s.apply(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(v, Vec3::new(-1.0, 2.0, -3.0));
    }

    #[test]
    fn gesture_event_from_json() {
        let ev: GestureEvent = serde_json::from_str(
            r#"{
                "hand": "right",
                "env": { "start": 0.0, "attack_peak": 0.25, "relax": 0.75, "end": 1.0 },
                "handshape": { "shape": "fist" },
                "motions": [
                    { "type": "directed", "direction": "u", "distance": 0.1,
                      "env": { "start": 0.0, "attack_peak": 0.3, "relax": 0.3, "end": 0.6 } }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(ev.hand, Hand::Right);
        assert_eq!(ev.motions.len(), 1);
    }
}
