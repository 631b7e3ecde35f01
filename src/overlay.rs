//! Landmark overlay rendering: hand skeletons drawn onto a transparent
//! canvas sized to the source frame.

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::recognizer::Landmark;

/// Hand skeleton edges over the standard 21-point landmark set.
pub const HAND_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4), // thumb
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8), // index
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12), // middle
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16), // ring
    (13, 17),
    (17, 18),
    (18, 19),
    (19, 20), // pinky
    (0, 17),  // palm edge
];

pub struct LandmarkPainter {
    pub connector_color: Rgba<u8>,
    pub landmark_color: Rgba<u8>,
    pub landmark_radius: i32,
}

impl Default for LandmarkPainter {
    fn default() -> Self {
        Self {
            connector_color: Rgba([0, 255, 0, 255]),
            landmark_color: Rgba([255, 0, 0, 255]),
            landmark_radius: 3,
        }
    }
}

impl LandmarkPainter {
    /// Renders every hand's connectors and points. Landmarks are in
    /// normalized coordinates and are scaled to the given pixel size.
    pub fn render(&self, width: u32, height: u32, hands: &[Vec<Landmark>]) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(width.max(1), height.max(1), Rgba([0, 0, 0, 0]));
        for hand in hands {
            for &(a, b) in HAND_CONNECTIONS {
                if let (Some(from), Some(to)) = (hand.get(a), hand.get(b)) {
                    draw_line_segment_mut(
                        &mut canvas,
                        to_pixel(from, width, height),
                        to_pixel(to, width, height),
                        self.connector_color,
                    );
                }
            }
            for landmark in hand {
                let (x, y) = to_pixel(landmark, width, height);
                draw_filled_circle_mut(
                    &mut canvas,
                    (x as i32, y as i32),
                    self.landmark_radius,
                    self.landmark_color,
                );
            }
        }
        canvas
    }
}

fn to_pixel(landmark: &Landmark, width: u32, height: u32) -> (f32, f32) {
    (landmark.x * width as f32, landmark.y * height as f32)
}
