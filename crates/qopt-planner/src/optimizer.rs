//! The optimizer driver.

use qopt_core::config::OptimizerConfig;
use qopt_core::context::PlanContext;
use qopt_core::error::Result;
use qopt_core::plan::{LogicalPlan, PlanId};

use crate::rules::{registry, RuleFlags};
use crate::trace::{OptimizeTrace, TraceStep};

/// Result of one optimization.
#[derive(Debug, Clone)]
pub struct Optimized {
    pub plan: LogicalPlan,
    /// `Some` exactly when tracing was enabled.
    pub trace: Option<OptimizeTrace>,
}

/// State handed to a rule for one invocation.
pub struct RuleContext<'a> {
    pub plan_ctx: &'a mut PlanContext,
    pub config: &'a OptimizerConfig,
    steps: Option<Vec<TraceStep>>,
    fired: usize,
}

impl<'a> RuleContext<'a> {
    pub fn new(plan_ctx: &'a mut PlanContext, config: &'a OptimizerConfig, trace: bool) -> Self {
        Self {
            plan_ctx,
            config,
            steps: trace.then(Vec::new),
            fired: 0,
        }
    }

    pub fn tracing(&self) -> bool {
        self.steps.is_some()
    }

    pub fn next_plan_id(&mut self) -> PlanId {
        self.plan_ctx.next_plan_id()
    }

    /// Record a rewrite. The texts are only rendered when tracing is on.
    pub fn record<A, R>(&mut self, action: A, reason: R)
    where
        A: FnOnce() -> String,
        R: FnOnce() -> String,
    {
        self.fired += 1;
        if let Some(steps) = self.steps.as_mut() {
            steps.push(TraceStep::new(action(), reason()));
        }
    }

    /// Append an already rendered step.
    pub fn push_step(&mut self, step: TraceStep) {
        self.fired += 1;
        if let Some(steps) = self.steps.as_mut() {
            steps.push(step);
        }
    }

    /// Rewrites recorded so far, counted with tracing on or off.
    pub fn fired(&self) -> usize {
        self.fired
    }

    fn take_steps(&mut self) -> Vec<TraceStep> {
        self.steps.take().unwrap_or_default()
    }
}

pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Flags named by the configuration, or every rule when none are named.
    pub fn configured_flags(&self) -> Result<RuleFlags> {
        match &self.config.rules {
            Some(names) => RuleFlags::from_names(names),
            None => Ok(RuleFlags::all()),
        }
    }

    /// Run every enabled rule over `plan` in registry order.
    pub fn run(&self, ctx: &mut PlanContext, flags: RuleFlags, plan: LogicalPlan) -> Result<Optimized> {
        self.config.validate()?;
        plan.validate()?;

        let mut trace = self.config.trace.then(OptimizeTrace::new);
        let mut plan = plan;
        for entry in registry() {
            if !flags.contains(entry.flag) {
                continue;
            }
            let rule = entry.rule;
            let mut rule_ctx = RuleContext::new(ctx, &self.config, trace.is_some());
            plan = rule
                .optimize(plan, &mut rule_ctx)
                .map_err(|e| e.with_context(format!("rule {}", rule.name())))?;
            let fired = rule_ctx.fired();
            let steps = rule_ctx.take_steps();

            #[cfg(feature = "tracing")]
            tracing::debug!(rule = rule.name(), key = entry.key, steps = fired, "applied rule");
            #[cfg(not(feature = "tracing"))]
            let _ = fired;

            plan.validate()
                .map_err(|e| e.with_context(format!("plan produced by rule {}", rule.name())))?;
            if let Some(trace) = trace.as_mut() {
                trace.append(rule.name(), steps);
            }
        }
        Ok(Optimized { plan, trace })
    }
}

/// Optimize `plan` with the rules in `flags`, collecting a trace when
/// `trace_enabled` is set. Ids minted by rules continue `ctx`'s counters.
pub fn optimize(
    ctx: &mut PlanContext,
    flags: RuleFlags,
    plan: LogicalPlan,
    trace_enabled: bool,
) -> Result<Optimized> {
    Optimizer::new(OptimizerConfig::default().with_trace(trace_enabled)).run(ctx, flags, plan)
}
