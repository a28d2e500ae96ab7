//! Shelf rectangle packing.

/// A rectangle placed in atlas pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PackedRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Map a local UV coordinate (0-1) of this rectangle's texture into the atlas.
    pub fn transform_uv(&self, uv: [f32; 2], atlas_size: u32) -> [f32; 2] {
        let size = atlas_size as f32;
        [
            uv[0] * (self.width as f32 / size) + self.x as f32 / size,
            uv[1] * (self.height as f32 / size) + self.y as f32 / size,
        ]
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Unscaled packing result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackLayout {
    /// Placement of every input box, in input order.
    pub rects: Vec<PackedRect>,
    /// Bounding width of all placed boxes.
    pub width: u32,
    /// Bounding height of all placed boxes.
    pub height: u32,
}

/// Pack boxes into horizontal shelves.
///
/// Boxes are placed tallest first (ties keep input order) into shelves whose width
/// is the larger of the widest box and the square root of the total area. Zero-sized
/// boxes are treated as 1x1. The result depends only on the input sequence.
pub fn pack(sizes: &[(u32, u32)]) -> PackLayout {
    if sizes.is_empty() {
        return PackLayout::default();
    }

    let sizes: Vec<(u32, u32)> = sizes.iter().map(|&(w, h)| (w.max(1), h.max(1))).collect();

    let total_area: u64 = sizes.iter().map(|&(w, h)| w as u64 * h as u64).sum();
    let widest = sizes.iter().map(|&(w, _)| w).max().unwrap_or(1);
    let shelf_width = widest.max((total_area as f64).sqrt().ceil() as u32);

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| sizes[b].1.cmp(&sizes[a].1));

    let mut rects = vec![PackedRect::default(); sizes.len()];
    let mut current_x = 0u32;
    let mut current_y = 0u32;
    let mut row_height = 0u32;
    let mut width = 0u32;

    for index in order {
        let (w, h) = sizes[index];

        // Start a new shelf when this box would overflow the current one
        if current_x > 0 && current_x + w > shelf_width {
            current_x = 0;
            current_y += row_height;
            row_height = 0;
        }

        rects[index] = PackedRect::new(current_x, current_y, w, h);

        current_x += w;
        row_height = row_height.max(h);
        width = width.max(current_x);
    }

    PackLayout {
        rects,
        width,
        height: current_y + row_height,
    }
}

/// Uniformly scale a layout so it fits a square atlas of `atlas_size` pixels.
///
/// `scale = min(atlas / width, atlas / height)`; positions and sizes are floored to
/// whole pixels and sizes never drop below one pixel. Boxes that scale below one
/// pixel next to a much larger one can therefore land on the same pixel, and the
/// later blit wins there.
pub fn fit_to_atlas(layout: &PackLayout, atlas_size: u32) -> Vec<PackedRect> {
    if layout.width == 0 || layout.height == 0 || atlas_size == 0 {
        return vec![PackedRect::default(); layout.rects.len()];
    }

    let scale = (atlas_size as f64 / layout.width as f64).min(atlas_size as f64 / layout.height as f64);
    let floor = |value: u32| (value as f64 * scale).floor() as u32;

    layout
        .rects
        .iter()
        .map(|rect| {
            let x = floor(rect.x).min(atlas_size - 1);
            let y = floor(rect.y).min(atlas_size - 1);
            PackedRect {
                x,
                y,
                width: floor(rect.width).max(1).min(atlas_size - x),
                height: floor(rect.height).max(1).min(atlas_size - y),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlaps(a: &PackedRect, b: &PackedRect) -> bool {
        a.x < b.x + b.width && b.x < a.x + a.width && a.y < b.y + b.height && b.y < a.y + a.height
    }

    #[test]
    fn test_empty_input() {
        let layout = pack(&[]);
        assert!(layout.rects.is_empty());
        assert_eq!((layout.width, layout.height), (0, 0));
        assert!(fit_to_atlas(&layout, 512).is_empty());
    }

    #[test]
    fn test_single_box_fills_atlas() {
        let layout = pack(&[(1, 1)]);
        let rects = fit_to_atlas(&layout, 256);
        assert_eq!(rects, vec![PackedRect::new(0, 0, 256, 256)]);
    }

    #[test]
    fn test_no_overlap_and_within_bounds() {
        let sizes = [(64, 32), (16, 16), (128, 128), (32, 64), (8, 100), (50, 50)];
        let layout = pack(&sizes);

        for (i, rect) in layout.rects.iter().enumerate() {
            assert_eq!((rect.width, rect.height), sizes[i]);
            assert!(rect.x + rect.width <= layout.width);
            assert!(rect.y + rect.height <= layout.height);
            for other in &layout.rects[i + 1..] {
                assert!(!overlaps(rect, other), "{:?} overlaps {:?}", rect, other);
            }
        }
    }

    #[test]
    fn test_tallest_first() {
        let layout = pack(&[(10, 5), (10, 20)]);
        assert_eq!(layout.rects[1].x, 0);
        assert_eq!(layout.rects[1].y, 0);
    }

    #[test]
    fn test_packing_is_deterministic() {
        let sizes = [(30, 30), (30, 30), (12, 40), (64, 8), (5, 5), (30, 30)];
        let first = pack(&sizes);
        for _ in 0..10 {
            assert_eq!(pack(&sizes), first);
        }
        assert_eq!(fit_to_atlas(&first, 1024), fit_to_atlas(&pack(&sizes), 1024));
    }

    #[test]
    fn test_fit_scales_uniformly() {
        let layout = pack(&[(2, 2), (2, 2)]);
        assert_eq!((layout.width, layout.height), (2, 4));

        let rects = fit_to_atlas(&layout, 8);
        assert_eq!(rects[0], PackedRect::new(0, 0, 4, 4));
        assert_eq!(rects[1], PackedRect::new(0, 4, 4, 4));
    }

    #[test]
    fn test_transform_uv() {
        let rect = PackedRect::new(64, 128, 64, 64);
        let [u, v] = rect.transform_uv([0.0, 0.0], 256);
        assert!((u - 0.25).abs() < 1e-6);
        assert!((v - 0.5).abs() < 1e-6);

        let [u, v] = rect.transform_uv([1.0, 1.0], 256);
        assert!((u - 0.5).abs() < 1e-6);
        assert!((v - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_sub_pixel_boxes_may_share_a_pixel() {
        let layout = pack(&[(1000, 1000), (1, 1), (1, 1), (1, 1)]);
        for (i, rect) in layout.rects.iter().enumerate() {
            for other in &layout.rects[i + 1..] {
                assert!(!overlaps(rect, other));
            }
        }

        let rects = fit_to_atlas(&layout, 16);
        assert_eq!(rects[0], PackedRect::new(0, 0, 15, 15));
        assert_eq!(rects[1], PackedRect::new(15, 0, 1, 1));
        assert_eq!(rects[2], PackedRect::new(0, 15, 1, 1));
        assert_eq!(rects[3], PackedRect::new(0, 15, 1, 1));
        for rect in &rects {
            assert!(rect.width >= 1 && rect.height >= 1);
            assert!(rect.x + rect.width <= 16 && rect.y + rect.height <= 16);
        }
    }
}
