//! Colour-fuzzy block scan of a raster into boundary paths.
//!
//! 1. Classify the raster (unsupported encodings fail before any work)
//! 2. Tile the restricted image into blocks and test pixels per block
//! 3. Trace the accumulated cells on the pixel-corner grid

pub mod decompose;

use kurbo::{Point, Rect};
use log::debug;

use crate::config::ScanParams;
use crate::error::TraceError;
use crate::path::{Join, TracePath, WindingRule};
use crate::pipeline::PipelineRun;
use crate::raster::{ColorMatcher, RasterView};
use crate::region::Region;

use decompose::CellMask;

/// Pixel block `[x, x + w) × [y, y + h)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    x: u32,
    y: u32,
    w: u32,
    h: u32,
}

impl Block {
    fn rect(self) -> Rect {
        Rect::new(
            self.x as f64,
            self.y as f64,
            (self.x + self.w) as f64,
            (self.y + self.h) as f64,
        )
    }

    fn quarters(self) -> [Block; 4] {
        let hw = self.w / 2;
        let hh = self.h / 2;
        [
            Block { x: self.x, y: self.y, w: hw, h: hh },
            Block { x: self.x + hw, y: self.y, w: self.w - hw, h: hh },
            Block { x: self.x, y: self.y + hh, w: hw, h: self.h - hh },
            Block { x: self.x + hw, y: self.y + hh, w: self.w - hw, h: self.h - hh },
        ]
    }
}

struct Scanner<'a> {
    raster: &'a RasterView,
    matcher: ColorMatcher,
    restrict: Option<&'a Region>,
    mask: CellMask,
}

impl Scanner<'_> {
    fn scan_block(&mut self, block: Block) {
        let Some(region) = self.restrict else {
            self.test_pixels(block);
            return;
        };
        let rect = block.rect();
        if !region.intersects_rect(rect) {
            return;
        }
        if region.contains_rect(rect) {
            self.test_pixels(block);
            return;
        }
        if block.w / 2 == 0 || block.h / 2 == 0 {
            // Too small to split: resolve per pixel centre.
            for y in block.y..block.y + block.h {
                for x in block.x..block.x + block.w {
                    let centre = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                    if region.contains_point(centre) {
                        self.test_pixel(x, y);
                    }
                }
            }
            return;
        }
        for quarter in block.quarters() {
            self.scan_block(quarter);
        }
    }

    fn test_pixels(&mut self, block: Block) {
        for y in block.y..block.y + block.h {
            for x in block.x..block.x + block.w {
                self.test_pixel(x, y);
            }
        }
    }

    fn test_pixel(&mut self, x: u32, y: u32) {
        if self.matcher.matches(self.raster.pixel(x, y)) {
            self.mask.set(x, y);
        }
    }
}

/// Pixel rectangle to scan: the image, cut down to the restriction bounds.
fn scan_area(raster: &RasterView, restrict: Option<&Region>) -> Option<Block> {
    let (w, h) = (raster.width(), raster.height());
    let mut area = Rect::new(0.0, 0.0, w as f64, h as f64);
    if let Some(region) = restrict {
        area = area.intersect(region.bounds()?);
    }
    let x0 = area.x0.floor().max(0.0) as u32;
    let y0 = area.y0.floor().max(0.0) as u32;
    let x1 = (area.x1.ceil().max(0.0) as u32).min(w);
    let y1 = (area.y1.ceil().max(0.0) as u32).min(h);
    (x1 > x0 && y1 > y0).then_some(Block { x: x0, y: y0, w: x1 - x0, h: y1 - y0 })
}

/// Scan `raster` for pixels close to the foreground colour.
///
/// Returns one filled non-zero path holding every boundary loop, or no path
/// when nothing matched.
pub fn scan_region(
    raster: &RasterView,
    params: &ScanParams,
    restrict: Option<&Region>,
    run: &PipelineRun,
) -> Result<Vec<TracePath>, TraceError> {
    let Some(area) = scan_area(raster, restrict) else {
        return Ok(Vec::new());
    };
    let bw = params.block_width.max(1);
    let bh = params.block_height.max(1);

    let mut blocks = Vec::new();
    for y in (area.y..area.y + area.h).step_by(bh as usize) {
        for x in (area.x..area.x + area.w).step_by(bw as usize) {
            blocks.push(Block {
                x,
                y,
                w: bw.min(area.x + area.w - x),
                h: bh.min(area.y + area.h - y),
            });
        }
    }

    let mut scanner = Scanner {
        raster,
        matcher: ColorMatcher::new(params.foreground, params.fuzz),
        restrict,
        mask: CellMask::new(raster.width(), raster.height()),
    };
    let total = blocks.len();
    for (i, block) in blocks.into_iter().enumerate() {
        scanner.scan_block(block);
        run.report(i + 1, total);
        run.checkpoint()?;
    }

    let matched = scanner.mask.count();
    debug!("scan: {matched} matching pixels in {total} blocks");
    if matched == 0 {
        return Ok(Vec::new());
    }

    let loops = decompose::trace_boundaries(&scanner.mask)?;
    let mut path = TracePath::new().with_style(WindingRule::NonZero, true, 1.0);
    for ring in &loops {
        path.append(&TracePath::from_polyline(ring, true), Join::Move)?;
    }
    run.message(&format!("{} boundary loops from {matched} pixels", loops.len()));
    Ok(vec![path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;
    use image::{DynamicImage, Rgb, RgbImage};

    fn image_with_square(size: u32, x0: u32, y0: u32, side: u32) -> RasterView {
        let mut img = RgbImage::from_pixel(size, size, Rgb([255, 255, 255]));
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        RasterView::from_image(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    #[test]
    fn quarters_cover_the_block() {
        let b = Block { x: 0, y: 0, w: 5, h: 3 };
        let area: u32 = b.quarters().iter().map(|q| q.w * q.h).sum();
        assert_eq!(area, 15);
    }

    #[test]
    fn blank_image_yields_nothing() {
        let raster = image_with_square(8, 0, 0, 0);
        let run = PipelineRun::detached(Stage::Scan);
        let paths = scan_region(&raster, &ScanParams::default(), None, &run).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn restriction_clips_the_scan() {
        let raster = image_with_square(20, 2, 2, 16);
        let region = Region::from_rect(Rect::new(0.0, 0.0, 10.0, 20.0));
        let params = ScanParams {
            block_width: 4,
            block_height: 4,
            ..ScanParams::default()
        };
        let run = PipelineRun::detached(Stage::Scan);
        let paths = scan_region(&raster, &params, Some(&region), &run).unwrap();
        assert_eq!(paths.len(), 1);
        let bounds = paths[0].bounds().unwrap();
        assert_eq!(bounds, Rect::new(2.0, 2.0, 10.0, 18.0));
        assert_eq!(run.progress(), 100);
    }

    #[test]
    fn triangular_restriction_resolves_per_pixel() {
        let raster = image_with_square(8, 0, 0, 8);
        let region = Region::from_polygon(&[
            Point::new(0.0, 0.0),
            Point::new(8.0, 0.0),
            Point::new(0.0, 8.0),
        ]);
        let run = PipelineRun::detached(Stage::Scan);
        let params = ScanParams {
            block_width: 8,
            block_height: 8,
            ..ScanParams::default()
        };
        let paths = scan_region(&raster, &params, Some(&region), &run).unwrap();
        let area = paths[0].signed_area();
        // Pixels whose centre lies under the diagonal: 7 + 6 + ... + 0.
        assert_eq!(area, 28.0);
    }

    #[test]
    fn cancellation_aborts_the_scan() {
        let raster = image_with_square(16, 2, 2, 8);
        let run = PipelineRun::detached(Stage::Scan);
        run.cancel_token().cancel();
        let err = scan_region(&raster, &ScanParams::default(), None, &run).unwrap_err();
        assert_eq!(err, TraceError::Cancelled);
    }
}
