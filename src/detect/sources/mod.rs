pub mod jsonl;
pub mod scripted;
pub mod simulated;

pub use jsonl::JsonLinesSource;
pub use scripted::ScriptedSource;
pub use simulated::{PlantedObject, SimulatedSource, SimulationConfig};
