//! Planar vectors in lon/lat space.

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k)
    }

    /// Linear interpolation, `t = 0` at `self` and `t = 1` at `other`.
    pub fn lerp(self, other: Self, t: f64) -> Self {
        self + (other - self).scale(t)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

#[cfg(test)]
mod tests {
    use super::Vec2;

    #[test]
    fn lerp_walks_a_segment() {
        let start = Vec2::new(-105.5, 41.0);
        let end = Vec2::new(-105.0, 41.0);
        let third = start.lerp(end, 1.0 / 3.0);
        assert!((third.x - (-105.5 + 0.5 / 3.0)).abs() < 1e-12);
        assert_eq!(third.y, 41.0);
        assert_eq!(start.lerp(end, 0.0), start);
    }

    #[test]
    fn chord_length() {
        let chord = Vec2::new(6.0, 1.0) - Vec2::new(3.0, -3.0);
        assert_eq!(chord, Vec2::new(3.0, 4.0));
        assert_eq!(chord.length(), 5.0);
        assert_eq!(chord.scale(2.0).length(), 10.0);
        assert_eq!(Vec2::default() + chord, chord);
    }
}
