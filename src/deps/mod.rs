//! Dependency tracking between SCSS partials and the blocks that use them.
//!
//! - **usage**: partial → blocks lookups, derived from selected-partials lists
//! - **resolver**: global-partial detection and affected-block computation
//! - **input**: ordered compiler input assembly for one block slot
//!
//! # Data Flow
//!
//! ```text
//! partial saved ──► DependencyResolver::affected_blocks()
//!                          │
//!            ┌─────────────┴─────────────┐
//!            ▼                           ▼
//!     global: every block        selected: PartialsUsageIndex
//!                                 (blocks listing the partial)
//! ```

pub mod input;
pub mod resolver;
pub mod usage;

pub use input::{CompileInput, CompileInputs};
pub use resolver::{DependencyResolver, ImpactReport};
pub use usage::PartialsUsageIndex;
