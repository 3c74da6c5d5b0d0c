// Data types shared by the engine, its handles, and callers.

pub mod outcome;
pub mod progress;
pub mod resources;
pub mod run;
pub mod settings;

pub use outcome::Outcome;
pub use progress::{ProgressSignal, ProgressUpdate};
pub use resources::ContextResources;
pub use run::{OutcomeKind, RunId, RunPhase};
pub use settings::{EngineSettings, SettingsError};
