//! External collaborators the experts consume: requirement parsing, reference-data
//! lookups and compatibility checking.
//!
//! Each is a trait so a deployment can swap in its own service; the defaults are
//! self-contained.

pub mod checker;
pub mod parser;
pub mod query;

use std::sync::Arc;

pub use checker::{
    CompatibilityChecker, CompatibilityReport, RuleCompatibilityChecker, Violation, ViolationKind,
};
pub use parser::{
    keys, Constraint, ConstraintCategory, ConstraintValue, ParsedRequirement,
    PatternRequirementParser, RequirementParser,
};
pub use query::{DataQuery, JsonDataQuery};

/// The collaborators shared by every expert.
#[derive(Clone)]
pub struct Toolkit {
    pub parser: Arc<dyn RequirementParser>,
    pub query: Arc<dyn DataQuery>,
    pub checker: Arc<dyn CompatibilityChecker>,
}

impl Default for Toolkit {
    fn default() -> Self {
        Self {
            parser: Arc::new(PatternRequirementParser),
            query: Arc::new(JsonDataQuery::default()),
            checker: Arc::new(RuleCompatibilityChecker::default()),
        }
    }
}

impl std::fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolkit").finish_non_exhaustive()
    }
}

impl Toolkit {
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn RequirementParser>) -> Self {
        self.parser = parser;
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: Arc<dyn DataQuery>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_checker(mut self, checker: Arc<dyn CompatibilityChecker>) -> Self {
        self.checker = checker;
        self
    }
}
