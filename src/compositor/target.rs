/// CPU-side RGBA8 render target.
#[derive(Debug, Clone, Default)]
pub struct RenderTarget {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Resize, keeping the allocation when the size is unchanged.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = height;
        self.pixels.clear();
        self.pixels.resize(width as usize * height as usize * 4, 0);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.width as usize * 4;
        let start = y as usize * stride;
        &self.pixels[start..start + stride]
    }

    /// Copy this target into `dst` with its left edge at column `x`.
    ///
    /// Rows beyond either height and columns beyond `dst`'s width are cut.
    pub fn copy_into(&self, dst: &mut RenderTarget, x: u32) {
        if x >= dst.width {
            return;
        }
        let cols = self.width.min(dst.width - x) as usize;
        let dst_stride = dst.width as usize * 4;
        for y in 0..self.height.min(dst.height) {
            let src = &self.row(y)[..cols * 4];
            let start = y as usize * dst_stride + x as usize * 4;
            dst.pixels[start..start + cols * 4].copy_from_slice(src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_into_offsets_columns() {
        let mut src = RenderTarget::new(2, 2);
        src.fill([1, 2, 3, 4]);
        let mut dst = RenderTarget::new(4, 2);

        src.copy_into(&mut dst, 2);
        assert_eq!(dst.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(dst.pixel(2, 1), Some([1, 2, 3, 4]));
        assert_eq!(dst.pixel(3, 0), Some([1, 2, 3, 4]));
    }

    #[test]
    fn test_resize_same_size_keeps_contents() {
        let mut target = RenderTarget::new(2, 2);
        target.fill([9, 9, 9, 9]);
        target.resize(2, 2);
        assert_eq!(target.pixel(1, 1), Some([9, 9, 9, 9]));

        target.resize(3, 1);
        assert_eq!(target.pixels().len(), 12);
        assert_eq!(target.pixel(0, 0), Some([0, 0, 0, 0]));
    }
}
