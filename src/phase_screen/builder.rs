use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{Builder, RsaoError};

use super::{
    ab_from_positions, ft_phase_screen, InfinitePhaseScreen, PhaseScreenError, RingScreen,
    Stencil,
};

/// [InfinitePhaseScreen] builder
///
/// Default properties:
///  * size         : 64px
///  * pixel scale  : 5cm
///  * r0           : 15cm
///  * outer scale  : 25m
///  * inner scale  : 5mm
///  * seed         : 1
///  * stencil size factor : 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfinitePhaseScreenBuilder {
    size: usize,
    pixel_scale: f64,
    r0: f64,
    outer_scale: f64,
    inner_scale: f64,
    seed: u64,
    stencil_size_factor: usize,
}
impl Default for InfinitePhaseScreenBuilder {
    fn default() -> Self {
        Self {
            size: 64,
            pixel_scale: 0.05,
            r0: 0.15,
            outer_scale: 25.,
            inner_scale: 0.005,
            seed: 1,
            stencil_size_factor: 1,
        }
    }
}
impl InfinitePhaseScreenBuilder {
    /// Sets the size of the phase screen window in pixels
    pub fn size(self, size: usize) -> Self {
        Self { size, ..self }
    }
    /// Sets the pixel size in meters
    pub fn pixel_scale(self, pixel_scale: f64) -> Self {
        Self {
            pixel_scale,
            ..self
        }
    }
    /// Sets the Fried parameter in meters
    pub fn r0(self, r0: f64) -> Self {
        Self { r0, ..self }
    }
    /// Sets the outer scale in meters
    pub fn outer_scale(self, outer_scale: f64) -> Self {
        Self {
            outer_scale,
            ..self
        }
    }
    /// Sets the inner scale in meters
    pub fn inner_scale(self, inner_scale: f64) -> Self {
        Self {
            inner_scale,
            ..self
        }
    }
    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }
    /// Sets the number of `mx_size` blocks in the screen buffer
    pub fn stencil_size_factor(self, stencil_size_factor: usize) -> Self {
        Self {
            stencil_size_factor: stencil_size_factor.max(1),
            ..self
        }
    }
    /// Builds the phase screen with the phase screen error type
    pub fn try_build(self) -> std::result::Result<InfinitePhaseScreen, PhaseScreenError> {
        if self.size < 2 {
            return Err(PhaseScreenError::Size(self.size));
        }
        for (name, value) in [
            ("pixel scale", self.pixel_scale),
            ("r0", self.r0),
            ("outer scale", self.outer_scale),
            ("inner scale", self.inner_scale),
        ] {
            if !(value.is_finite() && value > 0.) {
                return Err(PhaseScreenError::Parameter(name, value));
            }
        }
        let mx_size = self.size.next_power_of_two() + 1;
        let stencil_size = self.stencil_size_factor * mx_size;
        let stencil = Stencil::new(stencil_size, mx_size, self.stencil_size_factor);
        log::debug!(
            "phase screen {}px: buffer {}px, {} stencil points",
            self.size,
            stencil_size,
            stencil.len()
        );
        let (a_mat, b_mat) = ab_from_positions(
            &stencil.positions(),
            stencil.len(),
            self.pixel_scale,
            self.r0,
            self.outer_scale,
        )?;
        let mut rng = StdRng::seed_from_u64(self.seed);
        let initial = ft_phase_screen(
            self.r0,
            stencil_size,
            self.pixel_scale,
            self.outer_scale,
            self.inner_scale,
            &mut rng,
        );
        Ok(InfinitePhaseScreen {
            requested_size: self.size,
            mx_size,
            stencil_size,
            pixel_scale: self.pixel_scale,
            r0: self.r0,
            outer_scale: self.outer_scale,
            inner_scale: self.inner_scale,
            stencil,
            a_mat,
            b_mat,
            screen: RingScreen::new(initial),
            rng,
        })
    }
}
impl Builder for InfinitePhaseScreenBuilder {
    type Component = InfinitePhaseScreen;
    fn build(self) -> std::result::Result<InfinitePhaseScreen, RsaoError> {
        Ok(self.try_build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameters() {
        assert!(matches!(
            InfinitePhaseScreenBuilder::default().size(1).try_build(),
            Err(PhaseScreenError::Size(1))
        ));
        assert!(matches!(
            InfinitePhaseScreenBuilder::default().r0(0.).try_build(),
            Err(PhaseScreenError::Parameter("r0", _))
        ));
    }
}
