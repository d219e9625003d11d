mod events;
mod session;
mod sources;
mod viewer;

pub use events::{FusionDisplay, ViewerListener};
pub use session::SessionContext;
pub use sources::{ImageSource, RegistrationAssociation, RegistrationCatalog};
pub use viewer::{Orchestrator, OrchestratorPhase, PreloadObserver, PrimarySeries};
