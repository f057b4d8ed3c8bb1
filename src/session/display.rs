//! Video layer controls: visibility, picture adjustments, window placement.

use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::device::{paths, ControlSurface};
use crate::error::Result;

/// A destination rectangle in display pixels, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    /// Left edge.
    pub x1: f32,
    /// Top edge.
    pub y1: f32,
    /// Right edge, exclusive.
    pub x2: f32,
    /// Bottom edge, exclusive.
    pub y2: f32,
}

impl Rect {
    /// A rectangle from its edges.
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Width in pixels.
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    /// Height in pixels.
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// The inclusive `x1 y1 x2 y2` string the video layer takes.
    pub fn axis(&self) -> String {
        format!(
            "{} {} {} {}",
            self.x1 as i32,
            self.y1 as i32,
            (self.x2 - 1.0) as i32,
            (self.y2 - 1.0) as i32
        )
    }
}

/// User picture settings applied along with each window update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoSettings {
    /// Zoom factor, 0.5..=2.0.
    pub zoom: f32,
    /// Contrast, 0..=100 with 50 neutral.
    pub contrast: i32,
    /// Brightness, 0..=100 with 50 neutral.
    pub brightness: i32,
    /// Player view mode; a change forces the window to be rewritten.
    pub view_mode: i32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            contrast: 50,
            brightness: 50,
            view_mode: 0,
        }
    }
}

/// Adjustments the video layer performs itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum RenderFeature {
    Zoom,
    Contrast,
    Brightness,
    Stretch,
    PixelRatio,
}

#[derive(Debug, Default)]
struct Latches {
    disable_video: Option<bool>,
    zoom_milli: Option<i32>,
    contrast: Option<i32>,
    brightness: Option<i32>,
    dst_rect: Option<Rect>,
    view_mode: Option<i32>,
}

/// Writes video layer settings, skipping ones already applied.
pub struct DisplayControl {
    control: Arc<dyn ControlSurface>,
    latches: Mutex<Latches>,
}

impl DisplayControl {
    /// Controls backed by `control`.
    pub fn new(control: Arc<dyn ControlSurface>) -> Self {
        Self {
            control,
            latches: Mutex::new(Latches::default()),
        }
    }

    /// Forgets the applied picture settings and window so the next update
    /// writes them all. Visibility stays latched.
    pub fn reset_latches(&self) {
        let mut latches = self.latches.lock();
        let disable_video = latches.disable_video;
        *latches = Latches {
            disable_video,
            ..Latches::default()
        };
    }

    /// Shows or hides the video layer.
    pub fn show_main_video(&self, show: bool) -> Result<()> {
        let disable = !show;
        let mut latches = self.latches.lock();
        if latches.disable_video == Some(disable) {
            return Ok(());
        }
        self.control.set_int(paths::DISABLE_VIDEO, disable as i64)?;
        latches.disable_video = Some(disable);
        Ok(())
    }

    /// Sets zoom from a 0.5..=2.0 factor.
    pub fn set_zoom(&self, zoom: f32) -> Result<()> {
        self.control.set_int(paths::ZOOM, (100.0 * zoom) as i64)
    }

    /// Sets contrast from the 0..=100 user scale.
    pub fn set_contrast(&self, contrast: i32) -> Result<()> {
        self.control
            .set_int(paths::CONTRAST, (255 * (contrast - 50) / 50) as i64)
    }

    /// Sets brightness from the 0..=100 user scale.
    pub fn set_brightness(&self, brightness: i32) -> Result<()> {
        self.control
            .set_int(paths::BRIGHTNESS, (127 * (brightness - 50) / 50) as i64)
    }

    /// Sets saturation, -127..=127, as is.
    pub fn set_saturation(&self, saturation: i32) -> Result<()> {
        self.control.set_int(paths::SATURATION, saturation as i64)
    }

    /// Applies changed picture settings and moves the video window to
    /// `dest`. Called per rendered frame, so unchanged values write nothing.
    pub fn set_video_rect(&self, dest: Rect, settings: &VideoSettings) -> Result<()> {
        let zoom_milli = (settings.zoom * 1000.0) as i32;
        if self.latches.lock().zoom_milli != Some(zoom_milli) {
            self.set_zoom(settings.zoom)?;
            self.latches.lock().zoom_milli = Some(zoom_milli);
        }
        if self.latches.lock().contrast != Some(settings.contrast) {
            self.set_contrast(settings.contrast)?;
            self.latches.lock().contrast = Some(settings.contrast);
        }
        if self.latches.lock().brightness != Some(settings.brightness) {
            self.set_brightness(settings.brightness)?;
            self.latches.lock().brightness = Some(settings.brightness);
        }

        {
            let mut latches = self.latches.lock();
            if latches.dst_rect == Some(dest) && latches.view_mode == Some(settings.view_mode) {
                drop(latches);
                return self.show_main_video(true);
            }
            latches.dst_rect = Some(dest);
            latches.view_mode = Some(settings.view_mode);
        }

        self.show_main_video(false)?;
        let axis = dest.axis();
        debug!(
            "video window {},{} {}x{}",
            dest.x1 as i32,
            dest.y1 as i32,
            dest.width() as i32,
            dest.height() as i32
        );
        self.control.set_str(paths::AXIS, &axis)?;
        self.show_main_video(true)
    }

    /// Adjustments handled by the video layer rather than the renderer.
    pub fn render_features(&self) -> Vec<RenderFeature> {
        vec![
            RenderFeature::Zoom,
            RenderFeature::Contrast,
            RenderFeature::Brightness,
            RenderFeature::Stretch,
            RenderFeature::PixelRatio,
        ]
    }
}

impl std::fmt::Debug for DisplayControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayControl")
            .field("latches", &*self.latches.lock())
            .finish_non_exhaustive()
    }
}
