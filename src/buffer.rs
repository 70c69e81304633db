use crate::frame::MAX_FRAME_LEN;

/// Receive buffer for bytes arriving from the bus.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    start: usize,
}

impl Buffer {
    pub fn new() -> Buffer {
        Buffer {
            data: Vec::with_capacity(2 * MAX_FRAME_LEN),
            start: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    pub fn consume(&mut self, len: usize) {
        assert!(len <= self.len());
        self.start += len;
    }

    pub fn write(&mut self, bytes: &[u8]) {
        if self.start == self.data.len() {
            self.clear();
        } else if self.start > MAX_FRAME_LEN {
            // keep the unread tail at the front
            self.data.drain(..self.start);
            self.start = 0;
        }
        self.data.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.start = 0;
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.data[self.start..]
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Buffer::new()
    }
}
