/// A value with a dirty flag, set on every write and cleared when consumed.
///
/// Any write marks the value changed, even when the new value equals the old one,
/// so a transform that moves and returns within a frame is still reported once.
#[derive(Debug, Clone)]
pub struct Tracked<T> {
    value: T,
    changed: bool,
}

impl<T> Tracked<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            changed: false,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.changed = true;
    }

    /// Mutate in place; marks the value changed.
    pub fn modify<F: FnOnce(&mut T)>(&mut self, f: F) {
        f(&mut self.value);
        self.changed = true;
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Return whether the value changed since the last call, clearing the flag.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}

impl<T> std::ops::Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}
