use serde::{Deserialize, Serialize};

/// Cached copy of a value that also lives on a native body.
///
/// `assign` reports whether the native side must be written: always while the owner is being
/// (re)built, otherwise only when the value actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shadowed<T> {
    value: T,
}

impl<T: PartialEq + Copy> Shadowed<T> {
    pub const fn new(value: T) -> Self {
        Self { value }
    }

    pub fn get(&self) -> T {
        self.value
    }

    pub fn assign(&mut self, value: T, force: bool) -> bool {
        if !force && self.value == value {
            return false;
        }
        self.value = value;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn equal_values_are_skipped_unless_forced() {
        let mut mass = Shadowed::new(1.0_f32);
        assert!(!mass.assign(1.0, false));
        assert!(mass.assign(1.0, true));
        assert!(mass.assign(2.0, false));
        assert_eq!(mass.get(), 2.0);
    }

    #[test]
    fn serializes_as_the_bare_value() {
        let factor = Shadowed::new(Vec3::new(1.0, 0.0, 1.0));
        let json = serde_json::to_string(&factor).expect("serialize");
        assert_eq!(json, "[1.0,0.0,1.0]");
    }
}
