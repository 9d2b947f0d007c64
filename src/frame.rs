use crate::error::Error;
use image::RgbImage;

pub struct Frame {
    pub index: usize,
    pub image: RgbImage,
}

impl Frame {
    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Decoded frames of one video, in order. Read-only for every stage.
pub struct FrameStore {
    frames: Vec<Frame>,
}

impl FrameStore {
    pub fn new(images: Vec<RgbImage>) -> Result<Self, Error> {
        let first = images.first().ok_or(Error::EmptyVideo)?.dimensions();
        if first.0 == 0 || first.1 == 0 {
            return Err(Error::EmptyVideo);
        }

        for (index, img) in images.iter().enumerate() {
            if img.dimensions() != first {
                return Err(Error::FrameSizeMismatch {
                    index,
                    expected: first,
                    found: img.dimensions(),
                });
            }
        }

        let frames = images
            .into_iter()
            .enumerate()
            .map(|(index, image)| Frame { index, image })
            .collect();

        Ok(Self { frames })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        self.frames[0].dims()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    #[inline]
    pub fn as_slice(&self) -> &[Frame] {
        &self.frames
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
}

impl std::ops::Index<usize> for FrameStore {
    type Output = Frame;

    #[inline]
    fn index(&self, index: usize) -> &Frame {
        &self.frames[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_mixed_sizes() {
        assert!(matches!(FrameStore::new(vec![]), Err(Error::EmptyVideo)));

        let res = FrameStore::new(vec![RgbImage::new(4, 4), RgbImage::new(4, 5)]);
        assert!(matches!(
            res,
            Err(Error::FrameSizeMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn frames_are_indexed_in_order() {
        let store = FrameStore::new(vec![RgbImage::new(2, 2); 3]).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store[2].index, 2);
        assert_eq!(store.dims(), (2, 2));
    }
}
