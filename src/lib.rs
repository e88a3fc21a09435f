//! A constraint-solver model of MMU address translation and page permissions.
//!
//! The model relates the read-only and non-executable bits declared by one or two translation
//! stages to the protection state of the physical frame an address resolves to. Scenarios ask the
//! solver whether a configuration is reachable: a satisfiable answer comes with a witness, an
//! unsatisfiable one is a proof that no page table realizing the model can reach it.
//!
//! Translation stages and permission bits are uninterpreted, so every verdict holds for *any*
//! page table consistent with the asserted constraints, not just one concrete layout.
//!
//! Solving is delegated to Z3 through [`SolverBackend`]. Repeated identical queries are expected,
//! but not guaranteed, to produce the same verdict; the backend pins the solver's random seeds.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, info};

pub mod address;
pub mod alias;
pub mod constraint;
pub mod direct;
pub mod evaluator;
pub mod invariant;
pub mod model;
pub mod nested;
pub mod permission;
pub mod scenario;
pub mod solver;
pub mod translation;

pub use address::{Address, Literal, Space};
pub use constraint::{ConstraintSet, PairRelation};
pub use evaluator::{AccessIntent, Bindings, Evaluation, Query};
pub use invariant::AccessQuery;
pub use model::{Model, Paging};
pub use permission::{Flag, Layer, PermissionView};
pub use scenario::{Scenario, SuiteEntry, SuiteReport};
pub use solver::{SolverBackend, Verdict, VerdictKind, Witness, WitnessValue, Z3Backend};
pub use translation::{Stage, Translation};

pub const DEFAULT_ADDRESS_BITS: u32 = 32;
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

#[derive(Error, Debug, Diagnostic)]
pub enum CheckError {
    #[error("invalid model configuration: {reason}")]
    #[diagnostic(
        code(wxcheck::config),
        help("the address width must be 1..=64 bits and the page size a power of two that fits in it")
    )]
    Config { reason: String },

    #[error("malformed constraint composition: {reason}")]
    #[diagnostic(code(wxcheck::model_construction))]
    ModelConstruction { reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    InputDomain(#[from] InputDomainError),
}

impl CheckError {
    pub(crate) fn construction(reason: impl Into<String>) -> Self {
        CheckError::ModelConstruction {
            reason: reason.into(),
        }
    }
}

/// A concrete address literal rejected before any constraint is built.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum InputDomainError {
    #[error("address {value:#x} does not fit in a {bits}-bit address space")]
    #[diagnostic(code(wxcheck::input::out_of_range))]
    OutOfRange { value: u64, bits: u32 },

    #[error("address {value:#x} is not aligned to a {page_size:#x}-byte page")]
    #[diagnostic(
        code(wxcheck::input::misaligned),
        help("page addresses must have their low offset bits clear")
    )]
    Misaligned { value: u64, page_size: u64 },

    #[error("alias {value:#x} is the address it is meant to alias")]
    #[diagnostic(
        code(wxcheck::input::coincident),
        help("an alias pair needs two different addresses")
    )]
    Coincident { value: u64 },
}

/// Shape of the address spaces and the solver budget shared by every scenario of a model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelConfig {
    pub address_bits: u32,
    pub page_size: u64,
    /// Upper bound on a single solver call. Expiry yields [`Verdict::Unknown`].
    pub timeout: Option<Duration>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            address_bits: DEFAULT_ADDRESS_BITS,
            page_size: DEFAULT_PAGE_SIZE,
            timeout: None,
        }
    }
}

impl ModelConfig {
    pub fn with_address_bits(mut self, bits: u32) -> Self {
        self.address_bits = bits;
        self
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), CheckError> {
        if !(1..=64).contains(&self.address_bits) {
            return Err(CheckError::Config {
                reason: format!("address width of {} bits", self.address_bits),
            });
        }
        if !self.page_size.is_power_of_two() {
            return Err(CheckError::Config {
                reason: format!("page size {:#x} is not a power of two", self.page_size),
            });
        }
        if self.address_bits < 64 && (self.page_size - 1) >> self.address_bits != 0 {
            return Err(CheckError::Config {
                reason: format!(
                    "page size {:#x} exceeds a {}-bit address space",
                    self.page_size, self.address_bits
                ),
            });
        }
        Ok(())
    }

    /// Mask selecting the in-page offset bits. Only meaningful once [`ModelConfig::validate`]
    /// has accepted the page size.
    pub fn offset_mask(&self) -> u64 {
        self.page_size.saturating_sub(1)
    }
}

/// Run `scenarios` one after another, with one model per paging mode.
///
/// The two models declare the same symbol names (`stage1`, `va`, `pa`) with different
/// meanings, so each lives in a solver context of its own.
pub fn run_suite(config: &ModelConfig, scenarios: &[Scenario]) -> Result<SuiteReport, CheckError> {
    config.validate()?;
    let direct_ctx = z3::Context::new(&z3::Config::new());
    let nested_ctx = z3::Context::new(&z3::Config::new());
    let direct = Model::direct(&direct_ctx, *config)?;
    let nested = Model::nested(&nested_ctx, *config)?;

    let entries = scenarios
        .iter()
        .map(|scenario| {
            let model = match scenario.paging() {
                Paging::Direct => &direct,
                Paging::Nested => &nested,
            };
            SuiteEntry {
                scenario: *scenario,
                outcome: scenario.run(model),
            }
        })
        .collect();
    let report = SuiteReport { entries };
    info!(
        scenarios = scenarios.len(),
        mismatches = report.mismatches().count(),
        "suite finished"
    );
    Ok(report)
}

/// Run `scenarios` concurrently, each on its own thread with its own solver context and model.
///
/// Results come back in input order.
pub fn evaluate_parallel(
    config: &ModelConfig,
    scenarios: &[Scenario],
) -> Result<SuiteReport, CheckError> {
    config.validate()?;
    let entries = std::thread::scope(|s| {
        let handles: Vec<_> = scenarios
            .iter()
            .map(|scenario| {
                let config = *config;
                s.spawn(move || {
                    debug!(%scenario, "evaluating on a dedicated context");
                    let ctx = z3::Context::new(&z3::Config::new());
                    let outcome = Model::new(&ctx, scenario.paging(), config)
                        .and_then(|model| scenario.run(&model));
                    SuiteEntry {
                        scenario: *scenario,
                        outcome,
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });
    Ok(SuiteReport { entries })
}
