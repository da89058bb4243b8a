//! Coordinate system conversions
//!
//! Angles are stored in radians; the `degrees` constructors and accessors do the conversion.
//! Polar and cylindrical angles are measured from the x axis toward the y axis,
//! the spherical elevation is measured from the xy plane toward z.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rectangular {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Polar {
    pub angle: f64,
    pub radius: f64,
}
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cylindrical {
    pub angle: f64,
    pub radius: f64,
    pub z: f64,
}
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Spherical {
    pub azimuth: f64,
    pub elevation: f64,
    pub radius: f64,
}

impl Rectangular {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
    pub fn xy(&self) -> [f64; 2] {
        [self.x, self.y]
    }
}
impl Polar {
    pub fn new(angle: f64, radius: f64) -> Self {
        Self { angle, radius }
    }
    pub fn degrees(angle: f64, radius: f64) -> Self {
        Self {
            angle: angle.to_radians(),
            radius,
        }
    }
    pub fn angle_degrees(&self) -> f64 {
        self.angle.to_degrees()
    }
}
impl Cylindrical {
    pub fn new(angle: f64, radius: f64, z: f64) -> Self {
        Self { angle, radius, z }
    }
    pub fn degrees(angle: f64, radius: f64, z: f64) -> Self {
        Self::new(angle.to_radians(), radius, z)
    }
}
impl Spherical {
    pub fn new(azimuth: f64, elevation: f64, radius: f64) -> Self {
        Self {
            azimuth,
            elevation,
            radius,
        }
    }
    pub fn degrees(azimuth: f64, elevation: f64, radius: f64) -> Self {
        Self::new(azimuth.to_radians(), elevation.to_radians(), radius)
    }
}

impl From<Polar> for Rectangular {
    fn from(Polar { angle, radius }: Polar) -> Self {
        let (s, c) = angle.sin_cos();
        Self::new(radius * c, radius * s, 0.)
    }
}
impl From<Rectangular> for Polar {
    fn from(Rectangular { x, y, .. }: Rectangular) -> Self {
        Self::new(y.atan2(x), x.hypot(y))
    }
}
impl From<Cylindrical> for Rectangular {
    fn from(Cylindrical { angle, radius, z }: Cylindrical) -> Self {
        let Rectangular { x, y, .. } = Polar::new(angle, radius).into();
        Self::new(x, y, z)
    }
}
impl From<Rectangular> for Cylindrical {
    fn from(rect: Rectangular) -> Self {
        let Polar { angle, radius } = rect.into();
        Self::new(angle, radius, rect.z)
    }
}
impl From<Polar> for Cylindrical {
    fn from(Polar { angle, radius }: Polar) -> Self {
        Self::new(angle, radius, 0.)
    }
}
impl From<Cylindrical> for Polar {
    fn from(Cylindrical { angle, radius, .. }: Cylindrical) -> Self {
        Self::new(angle, radius)
    }
}
impl From<Spherical> for Rectangular {
    fn from(
        Spherical {
            azimuth,
            elevation,
            radius,
        }: Spherical,
    ) -> Self {
        let (se, ce) = elevation.sin_cos();
        let (sa, ca) = azimuth.sin_cos();
        Self::new(radius * ce * ca, radius * ce * sa, radius * se)
    }
}
impl From<Rectangular> for Spherical {
    fn from(Rectangular { x, y, z }: Rectangular) -> Self {
        let rho = x.hypot(y);
        Self::new(y.atan2(x), z.atan2(rho), rho.hypot(z))
    }
}
impl From<Cylindrical> for Spherical {
    fn from(Cylindrical { angle, radius, z }: Cylindrical) -> Self {
        Self::new(angle, z.atan2(radius), radius.hypot(z))
    }
}
impl From<Spherical> for Cylindrical {
    fn from(
        Spherical {
            azimuth,
            elevation,
            radius,
        }: Spherical,
    ) -> Self {
        let (se, ce) = elevation.sin_cos();
        Self::new(azimuth, radius * ce, radius * se)
    }
}
impl From<Polar> for Spherical {
    fn from(Polar { angle, radius }: Polar) -> Self {
        Self::new(angle, 0., radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn polar_rect() {
        let Rectangular { x, y, .. } = Polar::degrees(90., 2.).into();
        assert!(close(x, 0.) && close(y, 2.));
        let p: Polar = Rectangular::new(-1., 0., 0.).into();
        assert!(close(p.angle_degrees(), 180.) && close(p.radius, 1.));
    }

    #[test]
    fn spherical_cylindrical() {
        let s = Spherical::degrees(30., 45., 2f64.sqrt());
        let c: Cylindrical = s.into();
        assert!(close(c.radius, 1.) && close(c.z, 1.));
        let r: Rectangular = s.into();
        let rc: Rectangular = c.into();
        assert!(close(r.x, rc.x) && close(r.y, rc.y) && close(r.z, rc.z));
        let back: Spherical = r.into();
        assert!(close(back.azimuth, s.azimuth) && close(back.elevation, s.elevation));
    }
}
