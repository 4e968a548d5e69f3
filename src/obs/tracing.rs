// self
use crate::{
	_prelude::*,
	obs::{FlowKind, FlowOutcome},
};

/// Future returned by [`FlowSpan::instrument`]; a plain passthrough without `tracing`.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Future returned by [`FlowSpan::instrument`]; a plain passthrough without `tracing`.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// Span named `cas_broker.flow` around a protocol step, broker operation, or cookie load.
///
/// `flow` and `stage` are set on creation. `principal` and `outcome` start empty and are
/// filled through [`FlowSpan::with_principal`] and [`FlowSpan::record_outcome`]. Secrets are
/// never recorded.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Opens a span for `kind` at call site `stage`.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			Self {
				span: tracing::info_span!(
					"cas_broker.flow",
					flow = kind.as_str(),
					stage,
					principal = tracing::field::Empty,
					outcome = tracing::field::Empty,
				),
			}
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Records the name of the principal the flow runs for.
	pub fn with_principal(self, principal: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			self.span.record("principal", principal);
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = principal;
		}

		self
	}

	/// Records how the flow ended.
	pub fn record_outcome(&self, outcome: FlowOutcome) {
		#[cfg(feature = "tracing")]
		{
			self.span.record("outcome", outcome.as_str());
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = outcome;
		}
	}

	/// Enters the span for a blocking section such as a cookie-cache load.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { _entered: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
		}
	}

	/// Attaches the span to `fut` so no guard is held across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			tracing::Instrument::instrument(fut, self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Keeps a [`FlowSpan`] entered until dropped.
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	_entered: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FlowSpanGuard").finish_non_exhaustive()
	}
}
