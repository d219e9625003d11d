use std::fmt;

use serde::{Deserialize, Serialize};

use crate::series::{RegistrationId, SeriesId};

/// Identity of one fused overlay: a secondary resampled onto a primary
/// through a particular registration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FusionKey {
    pub primary: SeriesId,
    pub secondary: SeriesId,
    pub registration: RegistrationId,
}

impl FusionKey {
    pub fn new(primary: SeriesId, secondary: SeriesId, registration: RegistrationId) -> Self {
        Self {
            primary,
            secondary,
            registration,
        }
    }

    /// Key using the default registration for the pair.
    pub fn pair(primary: SeriesId, secondary: SeriesId) -> Self {
        Self::new(primary, secondary, RegistrationId::Default)
    }
}

impl fmt::Display for FusionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({})",
            self.secondary.0, self.primary.0, self.registration
        )
    }
}
