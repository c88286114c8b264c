//! Detection types and sources.
//!
//! The object detector itself is an external collaborator. This module only
//! defines what its output looks like and how it is pulled into a run:
//! - Scripted source (detections already in memory)
//! - Simulated source (seeded mock generator)
//! - JSON-lines source (detector output written to a local file)
//!
//! Sources hand out `RawDetection` values. Validation into `Detection` happens
//! in the pipeline so a malformed sample is dropped without ending the run.

mod result;
mod source;
mod sources;

pub use result::{BoundingBox, Detection, RawDetection};
pub use source::DetectionSource;
pub use sources::{JsonLinesSource, PlantedObject, ScriptedSource, SimulatedSource, SimulationConfig};
