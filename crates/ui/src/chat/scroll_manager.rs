use gpui::{Bounds, Pixels, point};
use gpui_component::VirtualListScrollHandle;

/// Distance from the tail, in pixels, that still counts as "at the bottom".
const TAIL_THRESHOLD: f32 = 24.0;
/// Scroll jitter below this is ignored.
const JITTER: f32 = 1.0;

/// One observation of the list: gpui reports scroll offsets as negative y.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct ScrollSample {
    offset: f32,
    max: f32,
}

impl ScrollSample {
    fn near_tail(self) -> bool {
        self.max <= 0.0 || (self.offset + self.max).abs() <= TAIL_THRESHOLD
    }
}

/// Decides whether the feed keeps following new rows after one frame.
fn next_follow(following: bool, pending: bool, previous: ScrollSample, current: ScrollSample) -> bool {
    let grew = (current.max - previous.max).abs() > JITTER;
    let moved = current.offset - previous.offset;

    if pending || (grew && previous.near_tail()) {
        true
    } else if grew {
        following
    } else if following {
        moved <= JITTER
    } else {
        moved < -JITTER && current.near_tail()
    }
}

/// Keeps the feed pinned to its newest row unless the user scrolled up.
pub struct ScrollManager {
    scroll_handle: VirtualListScrollHandle,
    pending: bool,
    following: bool,
    last: ScrollSample,
}

impl ScrollManager {
    pub fn new() -> Self {
        Self {
            scroll_handle: VirtualListScrollHandle::new(),
            pending: false,
            following: true,
            last: ScrollSample::default(),
        }
    }

    pub fn handle(&self) -> &VirtualListScrollHandle {
        &self.scroll_handle
    }

    pub fn bounds(&self) -> Bounds<Pixels> {
        self.scroll_handle.bounds()
    }

    pub fn request_scroll_to_bottom(&mut self) {
        self.pending = true;
        self.following = true;
    }

    pub fn update_follow_state(&mut self) {
        let current = self.sample();
        self.following = next_follow(self.following, self.pending, self.last, current);
        self.last = current;
    }

    /// Jumps to the tail when following. Returns whether it scrolled.
    pub fn apply_pending_scroll(&mut self) -> bool {
        let scroll = self.following || self.pending;
        if scroll {
            let max = self.scroll_handle.max_offset().height;
            let target = if max > Pixels::ZERO { -max } else { Pixels::ZERO };
            let x = self.scroll_handle.offset().x;
            self.scroll_handle.set_offset(point(x, target));
        }
        self.pending = false;
        scroll
    }

    fn sample(&self) -> ScrollSample {
        ScrollSample {
            offset: f32::from(self.scroll_handle.offset().y),
            max: f32::from(self.scroll_handle.max_offset().height),
        }
    }
}

impl Default for ScrollManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(offset: f32, max: f32) -> ScrollSample {
        ScrollSample { offset, max }
    }

    #[test]
    fn new_rows_keep_following_at_the_tail() {
        assert!(next_follow(true, false, at(-100., 100.), at(-100., 160.)));
    }

    #[test]
    fn scrolling_up_pauses_following() {
        assert!(!next_follow(true, false, at(-100., 100.), at(-40., 100.)));
    }

    #[test]
    fn new_rows_do_not_yank_a_reader_scrolled_up() {
        assert!(!next_follow(false, false, at(-40., 100.), at(-40., 160.)));
    }

    #[test]
    fn returning_to_the_tail_resumes_following() {
        assert!(next_follow(false, false, at(-40., 100.), at(-90., 100.)));
        assert!(!next_follow(false, false, at(-10., 100.), at(-40., 100.)));
    }

    #[test]
    fn explicit_request_always_follows() {
        assert!(next_follow(false, true, at(-40., 100.), at(-40., 100.)));
    }
}
