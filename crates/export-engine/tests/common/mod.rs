#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use framecast_capture_engine::testing::MemoryHost;
use framecast_export_engine::{CaptureSlot, ExportController};
use framecast_composition::{FrameBuffer, RenderTarget, SeekableTimeline, SurfaceBounds};

/// Timeline that records every seek and publishes the playhead to its card.
pub struct ScriptedTimeline {
    pub duration_secs: f64,
    pub seeks: Arc<Mutex<Vec<f64>>>,
    playhead: Arc<Mutex<f64>>,
}

impl SeekableTimeline for ScriptedTimeline {
    fn duration_secs(&self) -> f64 {
        self.duration_secs
    }

    fn seek(&mut self, progress: f64) {
        self.seeks.lock().unwrap().push(progress);
        *self.playhead.lock().unwrap() = progress;
    }
}

/// Render target that draws a bar whose width follows the playhead.
pub struct Card {
    pub id: String,
    pub bounds: Arc<Mutex<SurfaceBounds>>,
    playhead: Arc<Mutex<f64>>,
}

impl RenderTarget for Card {
    fn id(&self) -> &str {
        &self.id
    }

    fn bounds(&self) -> SurfaceBounds {
        *self.bounds.lock().unwrap()
    }

    fn draw(&self, frame: &mut FrameBuffer) {
        let bounds = self.bounds();
        let p = *self.playhead.lock().unwrap();
        frame.clear([16, 16, 16, 255]);
        frame.fill_rect(0.0, 0.0, bounds.width * p, bounds.height, [0, 200, 120, 255]);
    }
}

/// A timeline bound to a 64x36 card called `card`.
pub fn scene(duration_secs: f64) -> (ScriptedTimeline, Card) {
    let playhead = Arc::new(Mutex::new(0.0));
    let timeline = ScriptedTimeline {
        duration_secs,
        seeks: Arc::new(Mutex::new(Vec::new())),
        playhead: playhead.clone(),
    };
    let card = Card {
        id: "card".to_string(),
        bounds: Arc::new(Mutex::new(SurfaceBounds::new(64.0, 36.0))),
        playhead,
    };
    (timeline, card)
}

/// Controller on a private slot so tests never contend for the global one.
pub fn controller(host: &MemoryHost) -> ExportController {
    ExportController::new(Arc::new(host.clone())).with_slot(CaptureSlot::new())
}

/// Shared, cloneable log for values seen inside callbacks.
#[derive(Clone, Default)]
pub struct Log<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> Log<T> {
    pub fn push(&self, value: T) {
        self.0.lock().unwrap().push(value);
    }

    pub fn items(&self) -> Vec<T> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }
}
