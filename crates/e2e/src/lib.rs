//! Rubric E2E Grading Framework
//!
//! This crate grades a running web application against a rubric of
//! black-box scenarios:
//! - Drives the application through a cookie-keeping HTTP session
//! - Creates fixture records directly in the application's database
//! - Evaluates declarative expectations against pages and records
//! - Runs scenarios concurrently and aggregates a weighted score
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Runner (Rust)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Runner                                                     │
//! │    ├── start_target() -> TargetHandle                       │
//! │    ├── probe(group.requires) -> GateVerdict                 │
//! │    ├── run_scenario(scenario) -> ScenarioResult             │
//! │    └── aggregate(results) -> ScoreReport                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (Rust builders or YAML)                           │
//! │    ├── name, points, precondition, tags                     │
//! │    ├── setup: [actor | photo | comment]                     │
//! │    ├── steps: [Step]                                        │
//! │    │     ├── navigate { path }                              │
//! │    │     ├── fill { label, value }                          │
//! │    │     ├── click_button { label }                         │
//! │    │     ├── click_link { label }                           │
//! │    │     └── sign_out                                       │
//! │    ├── expect: has_element | lacks_element | current_path   │
//! │    │           | status | actor_column                      │
//! │    │           | comment_count_delta | all                  │
//! │    └── diagnostic                                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod catalog;
pub mod driver;
pub mod engine;
pub mod error;
pub mod form;
pub mod probe;
pub mod rubric;
pub mod runner;
pub mod scenario;
pub mod selector;
pub mod target;
pub mod template;

pub use catalog::{Catalog, CatalogFilter, ScenarioGroup};
pub use driver::{DriverConfig, Session};
pub use engine::{run_scenario, ScenarioContext, ScenarioEnv, Timeouts};
pub use error::{E2eError, E2eResult};
pub use probe::{Capability, GateVerdict};
pub use runner::{RunOutcome, Runner, RunnerConfig};
pub use scenario::{Expectation, Fixture, Precondition, Scenario, Step};
pub use selector::SelectorSpec;
pub use target::{TargetConfig, TargetHandle};
