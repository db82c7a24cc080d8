use anyhow::{anyhow, Result};

use super::FrameSource;
use crate::frame::{PixelFormat, RawFrame};

/// Settings for a `stub://` source.
///
/// Query parameters: `frames=N` stops after N frames, `alt=WxH` makes every
/// second frame use the alternate size, `format=nv12|bgr24|rgb24` picks the
/// emitted layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntheticConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub frame_limit: Option<u64>,
    pub alternate: Option<(u32, u32)>,
    pub format: PixelFormat,
}

impl SyntheticConfig {
    pub fn new(url: &str, width: u32, height: u32) -> Self {
        Self {
            url: url.to_string(),
            width,
            height,
            frame_limit: None,
            alternate: None,
            format: PixelFormat::Rgb24,
        }
    }

    pub fn parse(url: &str, width: u32, height: u32) -> Result<Self> {
        let mut config = Self::new(url, width, height);
        let Some((_, query)) = url.split_once('?') else {
            return Ok(config);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter {:?}", pair))?;
            match key {
                "frames" => {
                    config.frame_limit = Some(
                        value
                            .parse()
                            .map_err(|_| anyhow!("frames must be an integer, got {:?}", value))?,
                    )
                }
                "alt" => config.alternate = Some(parse_dims(value)?),
                "format" => {
                    config.format = match value {
                        "rgb24" => PixelFormat::Rgb24,
                        "bgr24" => PixelFormat::Bgr24,
                        "nv12" => PixelFormat::Nv12,
                        other => return Err(anyhow!("unknown stub pixel format {:?}", other)),
                    }
                }
                other => return Err(anyhow!("unknown stub parameter {:?}", other)),
            }
        }
        Ok(config)
    }
}

fn parse_dims(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once('x')
        .ok_or_else(|| anyhow!("expected WxH, got {:?}", value))?;
    let w = w.parse().map_err(|_| anyhow!("bad width in {:?}", value))?;
    let h = h.parse().map_err(|_| anyhow!("bad height in {:?}", value))?;
    if w == 0 || h == 0 {
        return Err(anyhow!("zero-sized frame {:?}", value));
    }
    Ok((w, h))
}

/// Generates a moving green gradient, standing in for a webcam.
pub struct SyntheticSource {
    config: SyntheticConfig,
    frame_count: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        log::info!("synthetic source {} ready", config.url);
        Self {
            config,
            frame_count: 0,
        }
    }

    fn dims_for(&self, index: u64) -> (u32, u32) {
        match self.config.alternate {
            Some(alt) if index % 2 == 0 => alt,
            _ => (self.config.width, self.config.height),
        }
    }

    fn pixels(&self, width: u32, height: u32) -> Vec<u8> {
        let shift = self.frame_count as u32;
        match self.config.format {
            PixelFormat::Nv12 => {
                let luma = (width * height) as usize;
                let mut data = Vec::with_capacity(luma + luma / 2);
                for y in 0..height {
                    for x in 0..width {
                        data.push(((x + y + shift) % 256) as u8);
                    }
                }
                data.resize(luma + luma / 2, 128);
                data
            }
            format => {
                let mut data = Vec::with_capacity((width * height * 3) as usize);
                for y in 0..height {
                    for x in 0..width {
                        let r = ((x + shift) % 64) as u8;
                        let g = (96 + (y + shift) % 128) as u8;
                        let b = ((x + y) % 48) as u8;
                        match format {
                            PixelFormat::Bgr24 => data.extend_from_slice(&[b, g, r]),
                            _ => data.extend_from_slice(&[r, g, b]),
                        }
                    }
                }
                data
            }
        }
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frame_count
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("{} (synthetic)", self.config.url)
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if let Some(limit) = self.config.frame_limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        self.frame_count += 1;
        let (width, height) = self.dims_for(self.frame_count);
        let data = self.pixels(width, height);
        Ok(Some(RawFrame::new(data, width, height, self.config.format)))
    }
}
