// viewer.rs — orthographic stick-figure viewer running a scripted gesture
// loop through the engine. Drag empty space to orbit, scroll to zoom.

use eframe::egui;
use egui::{Color32, Pos2, Rect, Sense, Stroke, Vec2};
use glam::Vec3;

use signpose::envelope::TimingEnvelope;
use signpose::gesture::{
    CircularSpec, ConstellationSpec, DirectedSpec, GestureEvent, Hand, HandshapeSpec,
    LocationSpec, MotionSpec, OrientationSpec, Symmetry, TorsoSpec, WristMotionSpec, ZigzagSpec,
    WRIST_STIR,
};
use signpose::{reference_rig, BodyController, Side};

const LOOP_LEN: f32 = 12.0;

#[derive(Clone, Debug)]
struct Camera {
    yaw: f32,
    pitch: f32,
    scale: f32,
    focus: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self { yaw: 0.0, pitch: 0.1, scale: 320.0, focus: Vec3::new(0.0, 1.2, 0.0) }
    }
}

impl Camera {
    // Orthographic: project onto the camera's right/up plane. World is Y-up,
    // the screen is Y-down, so the up component flips.
    fn project(&self, p: Vec3, r: Rect) -> (Pos2, f32) {
        let ((sy, cy), (sp, cp)) = (self.yaw.sin_cos(), self.pitch.sin_cos());
        let fwd = Vec3::new(-cp * sy, -sp, -cp * cy);
        let right = Vec3::new(cy, 0.0, -sy);
        let up = Vec3::new(sp * sy, cp, sp * cy);
        let d = p - self.focus;
        let (x, y, z) = (d.dot(right), d.dot(up), d.dot(fwd));
        (Pos2::new(r.center().x + x * self.scale, r.center().y - y * self.scale), z)
    }
}

fn loc(name: &str, distance: f32, side: Option<&str>) -> LocationSpec {
    LocationSpec {
        name: name.into(),
        side: side.map(Into::into),
        distance,
        displace: None,
        displace_distance: 0.0,
        contact: None,
        contact_continuous: false,
        straight: false,
    }
}

fn script() -> Vec<(f32, GestureEvent)> {
    let mut out = Vec::new();

    // raise a fist to the chest, fingers up
    let mut ev = GestureEvent::new(Hand::Right, TimingEnvelope::new(0.0, 0.5, 1.3, 2.0));
    ev.location = Some(loc("chest", 0.45, None));
    ev.handshape = Some(HandshapeSpec { shape: "fist".into(), ..Default::default() });
    ev.orientation = Some(OrientationSpec {
        extfidir: "u".into(),
        second_extfidir: None,
        palmor: 0.0,
        second_palmor: None,
    });
    out.push((0.3, ev));

    // both index fingertips meet in front of the chest
    let mut ev = GestureEvent::new(Hand::Both, TimingEnvelope::new(0.0, 0.6, 1.6, 2.4));
    ev.sym = Symmetry { lr: true, ud: false, io: false };
    ev.location = Some(loc("chest", 0.5, Some("r")));
    ev.handshape = Some(HandshapeSpec { shape: "finger2".into(), ..Default::default() });
    ev.constellation = Some(ConstellationSpec {
        hand_a: "tip_2".into(),
        hand_b: Some("tip_2".into()),
        body_location: None,
        direction: None,
        distance: 0.0,
        keep_updating: true,
    });
    out.push((2.6, ev));

    // a forward poke with a zigzag
    let mut ev = GestureEvent::new(Hand::Right, TimingEnvelope::new(0.0, 0.4, 1.2, 1.8));
    ev.location = Some(loc("chest", 0.55, None));
    ev.handshape = Some(HandshapeSpec { shape: "finger2".into(), ..Default::default() });
    ev.motions.push(MotionSpec::Directed(DirectedSpec {
        env: TimingEnvelope::new(0.4, 0.9, 1.0, 1.6),
        direction: "o".into(),
        second_direction: None,
        distance: 0.12,
        curve_size: 0.0,
        zigzag: Some(ZigzagSpec { size: 0.015, speed: 5.0 }),
    }));
    out.push((5.4, ev));

    // flat hands stirring circles while the torso leans in
    let mut ev = GestureEvent::new(Hand::Both, TimingEnvelope::new(0.0, 0.6, 2.2, 3.0));
    ev.sym = Symmetry { lr: true, ud: false, io: false };
    ev.location = Some(loc("stomach", 0.5, Some("r")));
    ev.handshape = Some(HandshapeSpec { shape: "flat".into(), ..Default::default() });
    ev.motions.push(MotionSpec::Circular(CircularSpec {
        env: TimingEnvelope::new(0.6, 0.9, 2.2, 2.8),
        direction: "o".into(),
        second_direction: None,
        distance: 0.07,
        start_angle: 0.0,
        end_angle: 2.0 * std::f32::consts::TAU,
        ellipse_ratio: 1.0,
        zigzag: None,
    }));
    ev.torso = Some(TorsoSpec { code: "tf".into(), amount: 0.18 });
    out.push((7.6, ev));

    // a wave goodbye: open hand up, wrist stirring
    let mut ev = GestureEvent::new(Hand::Right, TimingEnvelope::new(0.0, 0.4, 1.6, 2.2));
    ev.location = Some(loc("shoulder", 0.5, None));
    ev.handshape = Some(HandshapeSpec { shape: "finger2345".into(), ..Default::default() });
    ev.orientation = Some(OrientationSpec {
        extfidir: "u".into(),
        second_extfidir: None,
        palmor: 0.0,
        second_palmor: None,
    });
    ev.motions.push(MotionSpec::Wrist(WristMotionSpec {
        env: TimingEnvelope::new(0.4, 0.7, 1.4, 1.8),
        mode: WRIST_STIR,
        intensity: 0.25,
        speed: 2.5,
    }));
    out.push((10.2, ev));

    out
}

struct ViewerApp {
    ctrl: BodyController,
    cam: Camera,
    t: f32,
    next: usize,
    script: Vec<(f32, GestureEvent)>,
}

impl ViewerApp {
    fn new() -> Self {
        let ctrl = BodyController::new(reference_rig(), Side::Right)
            .expect("reference rig is always complete");
        Self { ctrl, cam: Camera::default(), t: 0.0, next: 0, script: script() }
    }

    fn step(&mut self, dt: f32) {
        self.t += dt;
        if self.t >= LOOP_LEN {
            self.t = 0.0;
            self.next = 0;
            self.ctrl.reset();
        }
        while self.next < self.script.len() && self.script[self.next].0 <= self.t {
            let ev = self.script[self.next].1.clone();
            self.ctrl.new_gesture(&ev);
            self.next += 1;
        }
        self.ctrl.update(dt);
    }

    fn draw(&mut self, ui: &mut egui::Ui) {
        let (resp, p) = ui.allocate_painter(ui.available_size(), Sense::click_and_drag());
        p.rect_filled(resp.rect, 0.0, if ui.visuals().dark_mode { Color32::from_gray(18) } else { Color32::from_gray(80) });

        if resp.dragged() {
            self.cam.yaw -= resp.drag_delta().x * 0.008;
            self.cam.pitch = (self.cam.pitch + resp.drag_delta().y * 0.006).clamp(-1.2, 1.2);
        }
        if resp.hovered() {
            let s = ui.input(|i| i.smooth_scroll_delta.y);
            if s != 0.0 {
                self.cam.scale = (self.cam.scale * (1.0 + s * 0.001)).clamp(50.0, 2000.0);
            }
        }

        struct Seg {
            a: Pos2,
            b: Pos2,
            z: f32,
            w: f32,
            c: Color32,
        }
        let sk = &self.ctrl.skeleton;
        let mut segs: Vec<Seg> = Vec::new();
        for (i, bone) in sk.bones().iter().enumerate() {
            let Some(parent) = bone.parent else { continue };
            let (a, za) = self.cam.project(sk.world_pos(parent), resp.rect);
            let (b, zb) = self.cam.project(sk.world_pos(i), resp.rect);
            // finger bones draw thinner
            let slim = bone.offset.length() < 0.06;
            segs.push(Seg {
                a,
                b,
                z: (za + zb) * 0.5,
                w: if slim { 1.5 } else { 3.5 },
                c: if slim { Color32::from_rgb(230, 190, 120) } else { Color32::from_rgb(120, 180, 240) },
            });
        }
        // far-to-near so closer limbs paint over farther ones
        segs.sort_by(|a, b| b.z.partial_cmp(&a.z).unwrap_or(std::cmp::Ordering::Equal));
        for s in segs {
            p.line_segment([s.a + Vec2::new(1.0, 1.5), s.b + Vec2::new(1.0, 1.5)], Stroke::new(s.w + 1.0, Color32::from_black_alpha(60)));
            p.line_segment([s.a, s.b], Stroke::new(s.w, s.c));
        }
        // head
        if let Some(head) = sk.index("head") {
            let (c, _) = self.cam.project(sk.world_pos(head) + Vec3::new(0.0, 0.06, 0.0), resp.rect);
            p.circle_filled(c, 0.09 * self.cam.scale, Color32::from_rgb(120, 180, 240));
        }

        p.text(
            resp.rect.min + Vec2::new(8.0, 6.0),
            egui::Align2::LEFT_TOP,
            format!("t = {:4.1}s   drag: orbit   scroll: zoom", self.t),
            egui::FontId::proportional(11.0),
            Color32::from_rgba_premultiplied(200, 200, 200, 120),
        );
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let dt = ctx.input(|i| i.stable_dt).min(0.05);
        self.step(dt);
        egui::CentralPanel::default().show(ctx, |ui| self.draw(ui));
        ctx.request_repaint();
    }
}

fn main() -> Result<(), eframe::Error> {
    env_logger::init();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([900.0, 760.0]),
        centered: true,
        ..Default::default()
    };
    eframe::run_native(
        "signpose viewer",
        options,
        Box::new(|_cc| Ok(Box::new(ViewerApp::new()))),
    )
}
