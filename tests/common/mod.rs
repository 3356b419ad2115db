//! Synthetic rasters and a recording host shared by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use stroketrace::{Host, PipelineRunner, RasterView, Stage, StageRecord, TracingConfig};

pub const INK: Rgb<u8> = Rgb([0, 0, 0]);
pub const PAPER: Rgb<u8> = Rgb([255, 255, 255]);

pub fn canvas(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, PAPER)
}

pub fn ink_rect(img: &mut RgbImage, x: i32, y: i32, w: u32, h: u32) {
    draw_filled_rect_mut(img, Rect::at(x, y).of_size(w, h), INK);
}

pub fn erase_rect(img: &mut RgbImage, x: i32, y: i32, w: u32, h: u32) {
    draw_filled_rect_mut(img, Rect::at(x, y).of_size(w, h), PAPER);
}

pub fn ink_circle(img: &mut RgbImage, cx: i32, cy: i32, radius: i32) {
    draw_filled_circle_mut(img, (cx, cy), radius, INK);
}

pub fn raster(img: RgbImage) -> RasterView {
    RasterView::from_image(&DynamicImage::ImageRgb8(img)).expect("rgb8 is supported")
}

pub fn runner(img: RgbImage) -> PipelineRunner {
    PipelineRunner::new(TracingConfig::default()).with_raster(raster(img))
}

/// Remembers every commit and completion.
#[derive(Default)]
pub struct Recorder {
    pub records: Mutex<Vec<StageRecord>>,
    pub finished: Mutex<Vec<(Stage, bool)>>,
}

impl Host for Recorder {
    fn commit(&self, record: StageRecord) {
        self.records.lock().unwrap().push(record);
    }

    fn finished(&self, stage: Stage, success: bool) {
        self.finished.lock().unwrap().push((stage, success));
    }
}
