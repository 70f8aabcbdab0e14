//! signpose — procedural sign-gesture and arm-posing engine.
//!
//! Consumes symbolic gesture events (location, orientation, handshape,
//! motion, two-hand contact — HamNoSys-style) and writes per-frame local
//! rotations onto a bone hierarchy: analytic two-bone arm IK, a handshape
//! composer with a cyclic thumb solver, a wrist swing-twist solver, motion
//! overlays and a two-hand constellation coordinator, all sequenced by one
//! per-frame orchestrator.
//!
//! ```no_run
//! use signpose::{reference_rig, BodyController, GestureEvent, Hand, Side, TimingEnvelope};
//!
//! let mut ctrl = BodyController::new(reference_rig(), Side::Right).unwrap();
//! let mut ev = GestureEvent::new(Hand::Right, TimingEnvelope::new(0.0, 0.3, 0.8, 1.2));
//! ev.handshape = Some(signpose::gesture::HandshapeSpec { shape: "fist".into(), ..Default::default() });
//! ctrl.new_gesture(&ev);
//! loop {
//!     ctrl.update(1.0 / 60.0);
//!     // hand the skeleton's local rotations to the hosting engine here
//! }
//! ```

pub mod angles;
pub mod arm_ik;
pub mod body;
pub mod constellation;
pub mod envelope;
pub mod gesture;
pub mod handshape;
pub mod json_loader;
pub mod location;
pub mod motion;
pub mod skeleton;
pub mod torso;
pub mod wrist;

pub use body::BodyController;
pub use envelope::TimingEnvelope;
pub use gesture::{GestureEvent, Hand};
pub use skeleton::{reference_rig, BodyMap, Side, Skeleton};
