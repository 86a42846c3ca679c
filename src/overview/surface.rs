//! Composite surface the overview grid is drawn onto

use std::convert::Infallible;
use std::path::Path;

use embedded_graphics::{
    mono_font::{MonoTextStyle, ascii::FONT_6X10},
    pixelcolor::Rgb888,
    prelude::*,
    text::{Baseline, Text},
};
use image::{ImageBuffer, Rgba, RgbaImage, imageops};

use crate::pdf::Pixmap;

const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 0xFF]);

/// Opaque RGBA image, black until something is drawn on it.
#[derive(Clone, Debug)]
pub struct GridSurface {
    image: RgbaImage,
}

impl GridSurface {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, BACKGROUND),
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.image.get_pixel_checked(x, y).map(|px| px.0)
    }

    /// Scale `pixmap` to fit `bounds` (keeping its aspect ratio), centred
    /// horizontally, and draw it at `origin`. Returns the rectangle drawn,
    /// or `None` if the raster is unusable.
    pub fn draw_thumbnail(
        &mut self,
        pixmap: &Pixmap,
        origin: (f64, f64),
        bounds: (f64, f64),
    ) -> Option<(i64, i64, u32, u32)> {
        if pixmap.width == 0 || pixmap.height == 0 {
            return None;
        }
        let source: ImageBuffer<Rgba<u8>, &[u8]> =
            ImageBuffer::from_raw(pixmap.width, pixmap.height, pixmap.pixels.as_slice())?;

        let fit = (bounds.0 / f64::from(pixmap.width)).min(bounds.1 / f64::from(pixmap.height));
        let width = (f64::from(pixmap.width) * fit) as u32;
        let height = (f64::from(pixmap.height) * fit) as u32;
        if width == 0 || height == 0 {
            return None;
        }

        let thumbnail = imageops::resize(&source, width, height, imageops::FilterType::Triangle);
        let x = (origin.0 + (bounds.0 - f64::from(width)) / 2.0) as i64;
        let y = origin.1 as i64;
        imageops::overlay(&mut self.image, &thumbnail, x, y);
        Some((x, y, width, height))
    }

    /// Draw `label` white on a black outline with its bottom-right corner at
    /// `anchor`.
    pub fn draw_label(&mut self, label: &str, anchor: (f64, f64)) {
        let outline = MonoTextStyle::new(&FONT_6X10, Rgb888::BLACK);
        let fill = MonoTextStyle::new(&FONT_6X10, Rgb888::WHITE);
        let text_width = label.chars().count() as i32 * fill.font.character_size.width as i32;
        let origin = Point::new(anchor.0 as i32 - text_width, anchor.1 as i32);

        for offset in [Point::new(-1, 0), Point::new(1, 0), Point::new(0, -1), Point::new(0, 1)] {
            let _ = Text::with_baseline(label, origin + offset, outline, Baseline::Bottom).draw(self);
        }
        let _ = Text::with_baseline(label, origin, fill, Baseline::Bottom).draw(self);
    }

    pub fn save_png(&self, path: &Path) -> Result<(), image::ImageError> {
        self.image.save_with_format(path, image::ImageFormat::Png)
    }
}

impl OriginDimensions for GridSurface {
    fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }
}

impl DrawTarget for GridSurface {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            let (Ok(x), Ok(y)) = (u32::try_from(point.x), u32::try_from(point.y)) else {
                continue;
            };
            if let Some(px) = self.image.get_pixel_mut_checked(x, y) {
                *px = Rgba([color.r(), color.g(), color.b(), 0xFF]);
            }
        }
        Ok(())
    }
}
