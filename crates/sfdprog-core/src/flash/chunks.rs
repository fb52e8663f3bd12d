//! Page segmentation

/// Iterator over `(offset, len)` program chunks
///
/// The first chunk ends on the next page boundary (or earlier if the data
/// runs out); every later chunk is a full page except possibly the last.
#[derive(Debug, Clone)]
pub struct PageChunks {
    offset: u32,
    remaining: usize,
    page_size: u32,
}

/// Split `len` bytes starting at `offset` into page-bounded chunks
pub fn page_chunks(offset: u32, len: usize, page_size: u32) -> PageChunks {
    PageChunks {
        offset,
        remaining: len,
        page_size: page_size.max(1),
    }
}

impl Iterator for PageChunks {
    type Item = (u32, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let room = (self.page_size - self.offset % self.page_size) as usize;
        let len = room.min(self.remaining);
        let chunk = (self.offset, len);

        self.offset = self.offset.wrapping_add(len as u32);
        self.remaining -= len;
        Some(chunk)
    }
}
