use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use image::RgbImage;
use parking_lot::Mutex;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, RawBox};

/// One scripted reply.
#[derive(Clone, Debug)]
pub enum Script {
    /// Return these boxes (in the coordinates of the image received).
    Boxes(Vec<RawBox>),
    /// One box covering the middle half of whatever image is received.
    Centered { class_index: usize, confidence: f32 },
    /// Fail the call with this message.
    Fail(String),
    /// Panic inside the call.
    Panic(String),
}

/// What a scripted backend has been asked to do so far.
#[derive(Clone, Default)]
pub struct ScriptProbe {
    seen: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl ScriptProbe {
    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    /// Dimensions of every image handed to `predict`, in call order.
    pub fn seen_dims(&self) -> Vec<(u32, u32)> {
        self.seen.lock().clone()
    }
}

/// Deterministic backend replaying a script of replies.
///
/// Used for `stub://` models and tests. Once the script runs out the
/// fallback reply is repeated.
pub struct ScriptedBackend {
    names: Vec<String>,
    script: VecDeque<Script>,
    fallback: Script,
    probe: ScriptProbe,
}

impl ScriptedBackend {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            script: VecDeque::new(),
            fallback: Script::Boxes(Vec::new()),
            probe: ScriptProbe::default(),
        }
    }

    /// Backend that finds one centered leaf lesion in every image.
    pub fn demo(names: Vec<String>) -> Self {
        Self::new(names).otherwise(Script::Centered {
            class_index: 0,
            confidence: 0.82,
        })
    }

    pub fn then(mut self, reply: Script) -> Self {
        self.script.push_back(reply);
        self
    }

    pub fn otherwise(mut self, reply: Script) -> Self {
        self.fallback = reply;
        self
    }

    pub fn probe(&self) -> ScriptProbe {
        self.probe.clone()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn class_names(&self) -> &[String] {
        &self.names
    }

    fn predict(&mut self, image: &RgbImage, min_confidence: f32) -> Result<Vec<RawBox>> {
        self.probe.seen.lock().push(image.dimensions());
        let reply = self
            .script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        let boxes = match reply {
            Script::Boxes(boxes) => boxes,
            Script::Centered {
                class_index,
                confidence,
            } => {
                let (w, h) = (image.width() as f32, image.height() as f32);
                vec![RawBox {
                    class_index,
                    confidence,
                    bbox: BoundingBox::new(w * 0.25, h * 0.25, w * 0.75, h * 0.75),
                }]
            }
            Script::Fail(msg) => return Err(anyhow!(msg)),
            Script::Panic(msg) => panic!("{}", msg),
        };
        Ok(boxes
            .into_iter()
            .filter(|b| b.confidence >= min_confidence)
            .collect())
    }
}
