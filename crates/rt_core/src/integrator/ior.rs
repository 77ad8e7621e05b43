/// Media stored per path, ambient base included.
pub const IOR_STACK_CAPACITY: usize = 16;

/// Indices of refraction of the media a path is currently inside.
///
/// Always holds the ambient entry `1.0` at the bottom. Nesting deeper than
/// the capacity is still counted so every exit balances its entry, but only
/// the outermost entries are stored; untracked levels report the innermost
/// stored medium.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IorStack {
    entries: [f32; IOR_STACK_CAPACITY],
    len: usize,
}

impl Default for IorStack {
    fn default() -> Self {
        Self::new()
    }
}

impl IorStack {
    pub const AMBIENT: f32 = 1.0;

    pub fn new() -> Self {
        let mut entries = [0.0; IOR_STACK_CAPACITY];
        entries[0] = Self::AMBIENT;
        Self { entries, len: 1 }
    }

    pub fn push(&mut self, ior: f32) {
        if self.len < IOR_STACK_CAPACITY {
            self.entries[self.len] = ior;
        }
        self.len += 1;
    }

    /// Remove the innermost medium. The ambient entry is never removed.
    pub fn pop(&mut self) -> Option<f32> {
        if self.len <= 1 {
            return None;
        }
        let top = self.entry(self.len);
        self.len -= 1;
        Some(top)
    }

    pub fn top(&self) -> f32 {
        self.entry(self.len)
    }

    /// The medium surrounding the innermost one, or ambient at the base.
    pub fn second(&self) -> f32 {
        self.entry(self.len.saturating_sub(1).max(1))
    }

    /// Entries including the ambient base, counting untracked levels.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Never true; the ambient entry is always present.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Media entered on top of the ambient base.
    pub fn depth(&self) -> usize {
        self.len - 1
    }

    /// Stored entry for the 1-based level `level`.
    fn entry(&self, level: usize) -> f32 {
        self.entries[level.min(IOR_STACK_CAPACITY) - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_entry() {
        let stack = IorStack::new();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.top(), 1.0);
        assert_eq!(stack.second(), 1.0);
    }

    #[test]
    fn test_pop_never_underflows() {
        let mut stack = IorStack::new();
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.top(), IorStack::AMBIENT);
    }

    #[test]
    fn test_nesting() {
        let mut stack = IorStack::new();
        stack.push(1.5);
        stack.push(1.33);
        assert_eq!(stack.top(), 1.33);
        assert_eq!(stack.second(), 1.5);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pop(), Some(1.33));
        assert_eq!(stack.pop(), Some(1.5));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_nesting_past_capacity_stays_balanced() {
        let mut stack = IorStack::new();
        for i in 0..20 {
            stack.push(1.1 + i as f32 * 0.01);
        }
        assert_eq!(stack.depth(), 20);
        assert_eq!(stack.top(), 1.1 + (IOR_STACK_CAPACITY - 2) as f32 * 0.01);

        for _ in 0..19 {
            assert!(stack.pop().is_some());
        }
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.top(), 1.1);
        assert_eq!(stack.second(), IorStack::AMBIENT);

        assert_eq!(stack.pop(), Some(1.1));
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.depth(), 0);
    }
}
