//! Incremental JPEG frame counter for `multipart/x-mixed-replace` bodies.
//!
//! Multipart boundaries and part headers are skipped; a frame is an SOI
//! (`FF D8`) matched by its EOI (`FF D9`).  Chunks may split markers.

const MARKER: u8 = 0xFF;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;

#[derive(Debug, Default)]
pub struct MjpegScanner {
    /// SOI/EOI nesting; EXIF thumbnails embed a full JPEG.
    depth: u32,
    prev_marker: bool,
    frames: u64,
}

impl MjpegScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns how many frames it completed.
    pub fn push(&mut self, chunk: &[u8]) -> u64 {
        let before = self.frames;
        for &b in chunk {
            if self.prev_marker {
                match b {
                    SOI => self.depth += 1,
                    EOI if self.depth > 0 => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            self.frames += 1;
                        }
                    }
                    _ => {}
                }
            }
            self.prev_marker = b == MARKER;
        }
        self.frames - before
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    #[cfg(test)]
    fn in_frame(&self) -> bool {
        self.depth > 0
    }
}
