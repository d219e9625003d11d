use crate::error::Result;
use crate::series::{RegistrationId, SeriesId, SliceDescriptor};

/// Image-fetch collaborator: ordered per-slice records of a series.
pub trait ImageSource: Send + Sync {
    fn load_series(&self, series: SeriesId) -> Result<Vec<SliceDescriptor>>;
}

/// A secondary series registered onto a primary.
#[derive(Clone, Debug, PartialEq)]
pub struct RegistrationAssociation {
    pub secondary: SeriesId,
    pub registration: RegistrationId,
    pub modality: String,
}

/// Registration-association collaborator: which secondaries can be fused
/// onto a primary, and through which registration.
pub trait RegistrationCatalog: Send + Sync {
    fn associations(&self, primary: SeriesId) -> Result<Vec<RegistrationAssociation>>;
}
