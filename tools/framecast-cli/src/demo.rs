//! Built-in demo composition.
//!
//! A square sweeps left to right along a sine path while a progress bar
//! fills underneath. The timeline and the card share one playhead cell:
//! seeking writes it, drawing only reads it.

use std::cell::Cell;
use std::f64::consts::TAU;
use std::rc::Rc;

use framecast_composition::{FrameBuffer, RenderTarget, SeekableTimeline, SurfaceBounds};

pub const DEMO_SURFACE_ID: &str = "demo";

const BACKGROUND: [u8; 4] = [18, 18, 24, 255];
const TRACK: [u8; 4] = [48, 48, 64, 255];
const ACCENT: [u8; 4] = [255, 112, 67, 255];
const BAR: [u8; 4] = [80, 200, 160, 255];

pub struct DemoTimeline {
    duration_secs: f64,
    playhead: Rc<Cell<f64>>,
}

impl SeekableTimeline for DemoTimeline {
    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    fn seek(&mut self, progress: f64) {
        self.playhead.set(progress);
    }
}

pub struct DemoCard {
    bounds: SurfaceBounds,
    playhead: Rc<Cell<f64>>,
}

impl RenderTarget for DemoCard {
    fn id(&self) -> &str {
        DEMO_SURFACE_ID
    }

    fn bounds(&self) -> SurfaceBounds {
        self.bounds
    }

    fn draw(&self, frame: &mut FrameBuffer) {
        let (w, h) = (self.bounds.width, self.bounds.height);
        let p = self.playhead.get();
        let size = (w.min(h) * 0.15).max(1.0);
        let bar_h = (h * 0.04).max(1.0);

        frame.clear(BACKGROUND);
        frame.fill_rect(0.0, h - bar_h, w, bar_h, TRACK);
        frame.fill_rect(0.0, h - bar_h, w * p, bar_h, BAR);

        let travel_y = (h - bar_h - size).max(0.0);
        let x = p * (w - size).max(0.0);
        let y = travel_y * (0.5 - 0.5 * (p * TAU).sin());
        frame.fill_rect(x, y, size, size, ACCENT);
    }
}

/// A timeline/card pair sharing one playhead.
pub fn scene(duration_secs: f64, width: f64, height: f64) -> (DemoTimeline, DemoCard) {
    let playhead = Rc::new(Cell::new(0.0));
    (
        DemoTimeline {
            duration_secs,
            playhead: playhead.clone(),
        },
        DemoCard {
            bounds: SurfaceBounds::new(width, height),
            playhead,
        },
    )
}
