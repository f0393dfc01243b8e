use std::ops::Range;

/// # Description
/// A run of `len` elements starting `offset` elements away from a `pivot`
/// inside a buffer of known capacity. The offset may be negative, so one
/// window type covers both the spectrum ahead of a band and the folding
/// source behind it.
/// ## Comments
/// - bounds are checked once in `new`, `view` and `view_mut` never fail
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Window {
    start: usize,
    len: usize,
}

impl Window {
    /// returns `None` when the window would leave `0..capacity`
    pub fn new(pivot: usize, offset: isize, len: usize, capacity: usize) -> Option<Self> {
        let start = pivot as isize + offset;
        if start < 0 || start as usize + len > capacity {
            return None;
        }
        Some(Self {
            start: start as usize,
            len,
        })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.len
    }

    pub fn view<'a, T>(&self, buf: &'a [T]) -> &'a [T] {
        &buf[self.range()]
    }

    pub fn view_mut<'a, T>(&self, buf: &'a mut [T]) -> &'a mut [T] {
        &mut buf[self.range()]
    }
}

#[cfg(test)]
mod test {
    #[allow(unused_imports)]
    use super::*;

    #[test]
    fn sanity() {
        let buf = (0..10).collect::<Vec<i32>>();
        let w = Window::new(6, -4, 3, buf.len()).unwrap();
        assert_eq!(w.view(&buf), &[2, 3, 4]);
        assert_eq!(w.range(), 2..5);
        assert!(Window::new(2, -3, 1, 10).is_none());
        assert!(Window::new(8, 0, 3, 10).is_none());
        assert!(Window::new(8, 0, 2, 10).is_some());
    }

    #[test]
    fn view_mut_writes_through() {
        let mut buf = vec![0.0f32; 8];
        let w = Window::new(4, 0, 4, buf.len()).unwrap();
        w.view_mut(&mut buf).iter_mut().for_each(|v| *v = 1.0);
        assert_eq!(buf.iter().sum::<f32>(), 4.0);
        assert_eq!(buf[3], 0.0);
    }
}
