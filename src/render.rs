use crate::cache::CacheEntry;
use crate::error::Error;
use crate::frame::FrameStore;
use crate::possession::control_share;
use crate::track::{ObjectClass, Track};

use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_ellipse_mut, draw_polygon_mut, draw_text_mut,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use rayon::prelude::*;
use rusttype::{Font, Scale};
use std::path::Path;
use tracing::debug;

const RED: Rgb<u8> = Rgb([255, 0, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

const PANEL_SIZE: (u32, u32) = (320, 70);
const PANEL_OPACITY: f32 = 0.4;

/// Loads a TrueType font for labels.
pub fn load_font<P: AsRef<Path>>(path: P) -> Result<Font<'static>, Error> {
    let bytes = std::fs::read(path.as_ref())?;

    Font::try_from_vec(bytes).ok_or_else(|| {
        Error::InvalidConfig(format!("{} is not a usable font", path.as_ref().display()))
    })
}

/// Draws analytics onto copies of the frames.
pub struct AnnotationRenderer {
    font: Option<Font<'static>>,
    scale: f32,
}

impl Default for AnnotationRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationRenderer {
    pub fn new() -> Self {
        Self {
            font: None,
            scale: 18.0,
        }
    }

    /// Enables text; without a font only shapes are drawn.
    pub fn with_font(mut self, font: Font<'static>) -> Self {
        self.font = Some(font);
        self
    }

    pub fn render(&self, frames: &FrameStore, entry: &CacheEntry) -> Vec<RgbImage> {
        let rendered: Vec<RgbImage> = frames
            .as_slice()
            .par_iter()
            .map(|frame| {
                let mut img = frame.image.clone();
                if frame.index < entry.tracks.len() {
                    self.render_frame(&mut img, frame.index, entry);
                }
                img
            })
            .collect();

        debug!(frames = rendered.len(), text = self.font.is_some(), "frames annotated");
        rendered
    }

    fn render_frame(&self, img: &mut RgbImage, index: usize, entry: &CacheEntry) {
        let tracks = entry.tracks.frame(index);

        for track in tracks {
            match track.class {
                ObjectClass::Player => {
                    let color = track.team_color.map(Rgb).unwrap_or(RED);
                    draw_feet_ellipse(img, track, color);
                    self.draw_id_label(img, track, color);

                    if track.has_ball {
                        draw_marker(img, track, RED);
                    }

                    self.draw_speed(img, track);
                }
                ObjectClass::Referee => draw_feet_ellipse(img, track, YELLOW),
                ObjectClass::Ball => draw_marker(img, track, GREEN),
            }
        }

        let (w, h) = img.dimensions();

        let movement = entry
            .camera_movement_per_frame
            .get(index)
            .copied()
            .unwrap_or([0.0, 0.0]);
        shade(img, Rect::at(0, 0).of_size(PANEL_SIZE.0.min(w), PANEL_SIZE.1.min(h)));
        self.text(img, 10, 10, &format!("Camera Movement X: {:.2}", movement[0]));
        self.text(img, 10, 40, &format!("Camera Movement Y: {:.2}", movement[1]));

        let px = w.saturating_sub(PANEL_SIZE.0);
        let py = h.saturating_sub(PANEL_SIZE.1);
        shade(
            img,
            Rect::at(px as i32, py as i32).of_size(w - px, h - py),
        );

        let share = control_share(&entry.team_ball_control, index).unwrap_or([0.0, 0.0]);
        self.text(
            img,
            px as i32 + 10,
            py as i32 + 10,
            &format!("Team 1 Ball Control: {:.2}%", share[0] * 100.0),
        );
        self.text(
            img,
            px as i32 + 10,
            py as i32 + 40,
            &format!("Team 2 Ball Control: {:.2}%", share[1] * 100.0),
        );
    }

    fn draw_id_label(&self, img: &mut RgbImage, track: &Track, color: Rgb<u8>) {
        let (cx, bottom) = feet(track);
        let rect = Rect::at(cx - 20, bottom + 8).of_size(40, 20);
        draw_filled_rect_mut(img, rect, color);

        let x = if track.track_id > 99 { cx - 18 } else { cx - 12 };
        self.text_colored(img, x, bottom + 9, &track.track_id.to_string(), BLACK);
    }

    fn draw_speed(&self, img: &mut RgbImage, track: &Track) {
        let (Some(speed), Some(distance)) = (track.speed, track.distance) else {
            return;
        };

        let (cx, bottom) = feet(track);
        self.text(img, cx - 30, bottom + 32, &format!("{:.2} km/h", speed));
        self.text(img, cx - 30, bottom + 52, &format!("{:.2} m", distance));
    }

    fn text(&self, img: &mut RgbImage, x: i32, y: i32, text: &str) {
        self.text_colored(img, x, y, text, BLACK);
    }

    fn text_colored(&self, img: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
        if let Some(font) = &self.font {
            draw_text_mut(img, color, x, y, Scale::uniform(self.scale), font, text);
        }
    }
}

#[inline]
fn feet(track: &Track) -> (i32, i32) {
    let p = track.bbox.bottom_center();
    (p.x.round() as i32, p.y.round() as i32)
}

fn draw_feet_ellipse(img: &mut RgbImage, track: &Track, color: Rgb<u8>) {
    let (cx, bottom) = feet(track);
    let rx = (track.bbox.width() / 2.0).round().max(1.0) as i32;
    let ry = (rx as f32 * 0.35).round().max(1.0) as i32;

    for t in 0..2 {
        draw_hollow_ellipse_mut(img, (cx, bottom), rx + t, ry + t, color);
    }
}

/// Downward triangle above the box.
fn draw_marker(img: &mut RgbImage, track: &Track, color: Rgb<u8>) {
    let x = track.bbox.center().x.round() as i32;
    let y = track.bbox.top().round() as i32;

    let poly = [
        Point::new(x, y),
        Point::new(x - 10, y - 20),
        Point::new(x + 10, y - 20),
    ];
    draw_polygon_mut(img, &poly, color);
}

/// Blends a translucent white panel into `rect`.
fn shade(img: &mut RgbImage, rect: Rect) {
    let (w, h) = img.dimensions();
    let x0 = rect.left().max(0) as u32;
    let y0 = rect.top().max(0) as u32;
    let x1 = ((rect.right() + 1).max(0) as u32).min(w);
    let y1 = ((rect.bottom() + 1).max(0) as u32).min(h);

    for y in y0..y1 {
        for x in x0..x1 {
            let p = img.get_pixel_mut(x, y);
            for c in 0..3 {
                let v = p.0[c] as f32 * (1.0 - PANEL_OPACITY) + WHITE.0[c] as f32 * PANEL_OPACITY;
                p.0[c] = v.round() as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::BBox;
    use crate::possession::Possession;
    use crate::track::{TrackTable, BALL_ID};

    fn entry() -> CacheEntry {
        let mut tracks = TrackTable::with_frames(2);
        for f in 0..2 {
            let mut p = Track::new(1, ObjectClass::Player, BBox::ltrb(100.0, 240.0, 120.0, 300.0));
            p.team = Some(2);
            p.team_color = Some([0, 0, 255]);
            p.has_ball = f == 1;
            tracks.insert(f, p);
        }
        tracks.insert(
            1,
            Track::new(BALL_ID, ObjectClass::Ball, BBox::ltrb(400.0, 200.0, 410.0, 210.0)),
        );

        CacheEntry::new(
            tracks,
            vec![[0.0, 0.0], [1.0, 0.5]],
            vec![Possession::Unassigned, Possession::Team(2)],
        )
    }

    #[test]
    fn shapes_are_drawn_on_copies() {
        let store = FrameStore::new(vec![RgbImage::new(640, 480); 2]).unwrap();
        let out = AnnotationRenderer::new().render(&store, &entry());

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].dimensions(), (640, 480));
        assert!(store[0].image.pixels().all(|p| p.0 == [0, 0, 0]));

        // rightmost point of the feet ellipse in team color
        assert_eq!(*out[0].get_pixel(120, 300), Rgb([0, 0, 255]));

        // possession marker only when holding the ball
        assert_eq!(*out[0].get_pixel(110, 235), Rgb([0, 0, 0]));
        assert_eq!(*out[1].get_pixel(110, 235), RED);

        // ball marker
        assert_eq!(*out[1].get_pixel(405, 195), GREEN);
    }

    #[test]
    fn panels_are_translucent() {
        let store = FrameStore::new(vec![RgbImage::new(640, 480); 2]).unwrap();
        let out = AnnotationRenderer::new().render(&store, &entry());

        assert_eq!(*out[0].get_pixel(5, 5), Rgb([102, 102, 102]));
        assert_eq!(*out[0].get_pixel(635, 475), Rgb([102, 102, 102]));
        assert_eq!(*out[0].get_pixel(320, 240), Rgb([0, 0, 0]));
    }
}
