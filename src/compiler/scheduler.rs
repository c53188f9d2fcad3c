//! Pass scheduler for running graph passes over many methods.
//!
//! The `PassScheduler` runs its pass list over every method, repeating the list until an
//! iteration changes nothing or the iteration limit is hit. Methods are independent, so
//! each pass fans out over them on the rayon thread pool.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use rayon::prelude::*;
use tracing::debug;

use crate::{
    analysis::ControlFlowGraph,
    compiler::{
        config::OptimizerConfig,
        inliner::InliningPass,
        pass::{CfgPass, MethodBody},
        passes::LocalDcePass,
        purity::AssumeNoSideEffects,
        EventLog,
    },
    ir::{MethodRef, RefPool},
    Result,
};

/// Runs an ordered list of passes to a fixpoint.
pub struct PassScheduler {
    /// Maximum number of times the pass list is repeated.
    max_iterations: usize,
    /// Process methods on the rayon thread pool.
    parallel: bool,
    /// Passes in execution order.
    passes: Vec<Box<dyn CfgPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(5, true)
    }
}

impl PassScheduler {
    /// Creates a scheduler without passes.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum number of sweeps over the pass list.
    /// * `parallel` - Whether methods are processed on the rayon thread pool.
    ///
    /// # Returns
    ///
    /// A new `PassScheduler`.
    #[must_use]
    pub fn new(max_iterations: usize, parallel: bool) -> Self {
        Self {
            max_iterations,
            parallel,
            passes: Vec::new(),
        }
    }

    /// Builds the scheduler described by `config`.
    ///
    /// Inlining (when enabled) runs before DCE so that DCE can clean up after it. The
    /// DCE pass treats the `java.lang` defaults and `config.pure_methods` as side-effect
    /// free.
    ///
    /// # Arguments
    ///
    /// * `config` - Which passes to enable and how often to run them.
    /// * `pool` - Interner used to resolve the configured method signatures.
    /// * `callees` - Graphs available to the inliner, by method.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a configured pure method is not a valid
    /// signature.
    pub fn from_config(
        config: &OptimizerConfig,
        pool: &RefPool,
        callees: HashMap<MethodRef, ControlFlowGraph>,
    ) -> Result<Self> {
        let mut scheduler = Self::new(config.max_iterations, config.parallel);

        if config.enable_inlining {
            scheduler.add_pass(Box::new(InliningPass::new(
                Arc::new(callees),
                config.inline_threshold,
            )));
        }
        if config.enable_local_dce {
            let pure_methods = config
                .pure_methods
                .iter()
                .map(|signature| pool.method_from_signature(signature))
                .collect::<Result<HashSet<_>>>()?;
            scheduler.add_pass(Box::new(LocalDcePass::new(
                Arc::new(AssumeNoSideEffects::java_lang_defaults(pool)),
                pure_methods,
            )));
        }
        Ok(scheduler)
    }

    /// Appends a pass to the list.
    pub fn add_pass(&mut self, pass: Box<dyn CfgPass>) {
        self.passes.push(pass);
    }

    /// The passes in execution order.
    #[must_use]
    pub fn passes(&self) -> &[Box<dyn CfgPass>] {
        &self.passes
    }

    /// Maximum number of sweeps over the pass list.
    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Runs every pass over every method until nothing changes.
    ///
    /// # Arguments
    ///
    /// * `methods` - The methods to optimize, edited in place.
    /// * `events` - Receives one event per change.
    ///
    /// # Returns
    ///
    /// The number of sweeps performed, including the final one that found nothing to do.
    ///
    /// # Errors
    ///
    /// Returns the first error reported by a pass. Methods processed before the error
    /// keep their changes.
    pub fn run(&self, methods: &mut [MethodBody], events: &EventLog) -> Result<usize> {
        let mut iterations = 0;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;
            let mut iteration_changed = false;

            for pass in &self.passes {
                let changed = self.run_pass(pass.as_ref(), methods, events)?;
                debug!(
                    target: "dexflow::scheduler",
                    pass = pass.name(),
                    iteration,
                    changed,
                    "pass finished"
                );
                iteration_changed |= changed;
            }

            if !iteration_changed {
                break;
            }
        }

        Ok(iterations)
    }

    fn run_pass(
        &self,
        pass: &dyn CfgPass,
        methods: &mut [MethodBody],
        events: &EventLog,
    ) -> Result<bool> {
        let any_changed = AtomicBool::new(false);

        let run_one = |body: &mut MethodBody| -> Result<()> {
            if !pass.should_run(body) {
                return Ok(());
            }
            if pass.run_on_method(body, events)? {
                any_changed.store(true, Ordering::Relaxed);
            }
            Ok(())
        };

        if self.parallel {
            methods.par_iter_mut().try_for_each(&run_one)?;
        } else {
            methods.iter_mut().try_for_each(&run_one)?;
        }

        Ok(any_changed.load(Ordering::Relaxed))
    }
}
