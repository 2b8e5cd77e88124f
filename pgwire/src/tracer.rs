//! Caller-supplied lifecycle hooks, independent of the `verbose`/`log` features.
//!
//! [`Tracer`] is a trait object the caller implements and installs on a
//! [`Connection`][crate::Connection] (see [`Config::with_tracer`][crate::connection::Config::with_tracer]).
//! Every `*_start` hook returns an opaque context; the matching `*_end` hook
//! receives it back, so a caller can correlate the pair (e.g. stash a timer
//! or span guard in the context) without this crate knowing what it is.
use std::any::Any;

use crate::Error;

/// Opaque correlation context threaded from a `*_start` hook to its `*_end` hook.
pub type TraceContext = Option<Box<dyn Any + Send>>;

/// Lifecycle hooks for connect, prepare, query, batch, and copy operations.
///
/// All methods have a no-op default, so implementors only override what they
/// need. `&self` must be safe to call concurrently across connections sharing
/// one tracer.
pub trait Tracer: Send + Sync {
    /// Called before opening the socket and sending `Startup`.
    fn connect_start(&self) -> TraceContext {
        None
    }
    /// Called once the startup/authentication phase resolves, successfully or not.
    fn connect_end(&self, _ctx: TraceContext, _err: Option<&Error>) {}

    /// Called before a statement's `Parse` is queued.
    fn prepare_start(&self, _sql: &str) -> TraceContext {
        None
    }
    /// Called once that statement's `ParseComplete` (or a cache hit) is resolved.
    fn prepare_end(&self, _ctx: TraceContext, _err: Option<&Error>) {}

    /// Called when a [`Query`][crate::query::Query] begins driving its `FetchStream`.
    fn query_start(&self, _sql: &str) -> TraceContext {
        None
    }
    /// Called once the query's stream reaches completion, successfully or not.
    fn query_end(&self, _ctx: TraceContext, _err: Option<&Error>) {}

    /// Called before a [`Batch`][crate::batch::Batch] sends its composite request.
    fn batch_start(&self, _len: usize) -> TraceContext {
        None
    }
    /// Called once for every queued statement in the batch, in submission order.
    fn batch_query(&self, _ctx: &TraceContext, _index: usize, _err: Option<&Error>) {}
    /// Called once the whole batch reaches `ReadyForQuery`.
    fn batch_end(&self, _ctx: TraceContext, _err: Option<&Error>) {}

    /// Called before a `COPY ... FROM STDIN`/`COPY ... TO STDOUT` statement is sent.
    fn copy_start(&self, _sql: &str) -> TraceContext {
        None
    }
    /// Called once the copy completes, successfully or not.
    fn copy_end(&self, _ctx: TraceContext, _err: Option<&Error>) {}
}

/// The default [`Tracer`]: every hook is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTracer {
        starts: AtomicUsize,
        ends: AtomicUsize,
    }

    impl Tracer for CountingTracer {
        fn query_start(&self, _sql: &str) -> TraceContext {
            self.starts.fetch_add(1, Ordering::SeqCst);
            None
        }
        fn query_end(&self, _ctx: TraceContext, _err: Option<&Error>) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_tracer_returns_no_context() {
        let tracer = NoopTracer;
        assert!(tracer.connect_start().is_none());
        assert!(tracer.query_start("select 1").is_none());
    }

    #[test]
    fn hooks_fire_in_pairs() {
        let tracer = CountingTracer::default();
        let ctx = tracer.query_start("select 1");
        tracer.query_end(ctx, None);
        assert_eq!(tracer.starts.load(Ordering::SeqCst), 1);
        assert_eq!(tracer.ends.load(Ordering::SeqCst), 1);
    }
}
