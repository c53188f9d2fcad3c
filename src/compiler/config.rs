//! Configuration for the optimizer.
//!
//! This module provides the settings that decide which passes the scheduler runs and how
//! often it repeats them.

/// Configuration for a [`PassScheduler`](crate::compiler::PassScheduler) run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// Maximum number of times the pass list is repeated (default: 5).
    pub max_iterations: usize,

    /// Process methods on the rayon thread pool instead of one after another.
    pub parallel: bool,

    /// Enable local dead code elimination.
    pub enable_local_dce: bool,

    /// Extra side-effect free methods, as `Lowner;.name:(args)ret` signatures.
    pub pure_methods: Vec<String>,

    /// Enable inlining of small static and direct callees.
    pub enable_inlining: bool,

    /// Maximum instruction count of an inlining candidate.
    pub inline_threshold: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            parallel: true,
            enable_local_dce: true,
            pure_methods: Vec::new(),
            enable_inlining: false,
            inline_threshold: 20,
        }
    }
}

impl OptimizerConfig {
    /// Creates a new configuration with default settings.
    ///
    /// # Returns
    ///
    /// A new `OptimizerConfig` with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single sequential sweep of DCE, for quick runs and tests.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_iterations: 1,
            parallel: false,
            ..Self::default()
        }
    }

    /// Creates an "aggressive" configuration.
    ///
    /// This configuration uses:
    /// - More iterations (20 max)
    /// - Inlining of callees up to 50 instructions
    ///
    /// # Returns
    ///
    /// A new `OptimizerConfig` optimized for thoroughness over speed.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            max_iterations: 20,
            enable_inlining: true,
            inline_threshold: 50,
            ..Self::default()
        }
    }

    /// Sets the maximum number of iterations.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Chooses between parallel and sequential execution.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enables or disables local dead code elimination.
    #[must_use]
    pub fn with_local_dce(mut self, enable: bool) -> Self {
        self.enable_local_dce = enable;
        self
    }

    /// Adds side-effect free method signatures.
    ///
    /// # Arguments
    ///
    /// * `methods` - Signatures of the form `Lowner;.name:(args)ret`.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_pure_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pure_methods.extend(methods.into_iter().map(Into::into));
        self
    }

    /// Enables or disables method inlining.
    ///
    /// # Arguments
    ///
    /// * `enable` - Whether to enable method inlining.
    /// * `threshold` - Maximum instruction count for inlining candidates.
    ///
    /// # Returns
    ///
    /// The modified configuration (builder pattern).
    #[must_use]
    pub fn with_inlining(mut self, enable: bool, threshold: usize) -> Self {
        self.enable_inlining = enable;
        self.inline_threshold = threshold;
        self
    }

    /// Returns `true` if at least one pass is enabled.
    #[must_use]
    pub fn any_pass_enabled(&self) -> bool {
        self.enable_local_dce || self.enable_inlining
    }
}
