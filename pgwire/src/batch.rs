//! Composite batch execution.
//!
//! A [`Batch`] queues several `(sql, args, callback)` triples, sends one `Sync`
//! after all of them, then walks the results back in queue order invoking each
//! query's callback. Unlike [`Pipeline`][crate::pipeline::Pipeline] a batch has a
//! single error-recovery boundary: on the first `ErrorResponse`, every remaining
//! queued query is reported with that same error.
use bytes::Buf;
use std::{fmt, mem};

use crate::{
    Error, Result, Row,
    common::span,
    encode::Encoded,
    ext::UsizeExt,
    fetch::{self, PrepareData, command_complete},
    postgres::{PgFormat, backend, frontend},
    row::RowResult,
    statement::PortalName,
    transport::{PgTransport, PgTransportExt},
};

/// A mid-batch error, carrying the [`RowResult`]s of every query that
/// completed before it in queue order.
///
/// Per the batch's single error-recovery boundary, postgres stops processing
/// queued steps after the first `ErrorResponse` and never answers the rest;
/// `completed` is therefore exactly the prefix of the queue that actually ran.
pub struct BatchError {
    pub completed: Vec<RowResult>,
    pub source: Box<Error>,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "batch aborted after {} of its queries completed: {}",
            self.completed.len(),
            self.source
        )
    }
}

impl fmt::Debug for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for BatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

/// A queue of statements to run as a single composite request.
#[must_use = "a batch does nothing until `execute` is called"]
pub struct Batch<'io, IO> {
    io: &'io mut IO,
    queue: Vec<BatchItem>,
}

struct BatchItem {
    sql: String,
    params: Vec<Encoded<'static>>,
    on_row: Option<Box<dyn FnMut(Row) -> Result<()>>>,
}

impl<'io, IO: PgTransport> Batch<'io, IO> {
    /// Create an empty batch over `io`.
    pub fn new(io: &'io mut IO) -> Self {
        Self { io, queue: Vec::new() }
    }

    /// Queue a statement whose rows, if any, are discarded.
    pub fn exec(&mut self, sql: impl Into<String>, params: Vec<Encoded<'static>>) -> &mut Self {
        self.queue.push(BatchItem { sql: sql.into(), params, on_row: None });
        self
    }

    /// Queue a statement, invoking `on_row` for every row it returns.
    pub fn query(
        &mut self,
        sql: impl Into<String>,
        params: Vec<Encoded<'static>>,
        on_row: impl FnMut(Row) -> Result<()> + 'static,
    ) -> &mut Self {
        self.queue.push(BatchItem { sql: sql.into(), params, on_row: Some(Box::new(on_row)) });
        self
    }

    /// Send every queued statement as one composite request and collect each
    /// query's [`RowResult`] in submission order.
    ///
    /// On the first `ErrorResponse`, a [`BatchError`] is returned carrying the
    /// [`RowResult`]s of every query that completed before it — the batch's
    /// single error-recovery boundary means postgres never answers the
    /// queries queued after the one that failed.
    pub async fn execute(self) -> Result<Vec<RowResult>> {
        let Self { io, queue } = self;

        io.enter_pipeline();
        let results = run(io, queue).await;
        io.exit_pipeline();

        results
    }
}

async fn run(io: &mut impl PgTransport, queue: Vec<BatchItem>) -> Result<Vec<RowResult>> {
    span!("batch");

    let mut queue = queue;
    let batch_trace = io.tracer().batch_start(queue.len());

    let mut prepared: Vec<PrepareData> = Vec::with_capacity(queue.len());
    for item in &mut queue {
        let data = fetch::prepare(&item.sql.as_str(), &item.params, &mut *io);
        bind_describe_execute(&data, &mut item.params, &mut *io);
        prepared.push(data);
    }
    io.send(frontend::Sync);
    io.flush().await?;

    let mut results = Vec::with_capacity(queue.len());
    let mut first_error = None;

    // Once a step errors, postgres skips straight to `ReadyForQuery` for the
    // remaining steps in this `Sync` boundary: it never answers them, so we
    // must stop reading rather than block waiting for responses that never come.
    for (index, (mut item, data)) in queue.into_iter().zip(prepared).enumerate() {
        if first_error.is_some() {
            break;
        }

        let step: Result<RowResult> = async {
            if !data.cache_hit {
                io.recv::<backend::ParseComplete>().await?;
                io.add_stmt(data.sqlid, data.stmt.clone());
            }
            io.recv::<backend::BindComplete>().await?;
            read_one(&mut *io, item.on_row.as_deref_mut()).await
        }
        .await;

        io.tracer().batch_query(&batch_trace, index, step.as_ref().err());

        match step {
            Ok(result) => results.push(result),
            Err(err) => first_error = Some(err),
        }
    }

    let ready = io.recv::<backend::ReadyForQuery>().await;

    match (first_error, ready) {
        (Some(err), _) => {
            io.tracer().batch_end(batch_trace, Some(&err));
            Err(BatchError { completed: results, source: Box::new(err) }.into())
        },
        (None, Ok(_)) => {
            io.tracer().batch_end(batch_trace, None);
            Ok(results)
        },
        (None, Err(err)) => {
            io.tracer().batch_end(batch_trace, Some(&err));
            Err(err)
        },
    }
}

/// Same wire shape as [`fetch::portal`], but without the trailing `Sync`: the
/// batch sends exactly one `Sync` after every queued statement instead of one per statement.
fn bind_describe_execute(data: &PrepareData, params: &mut Vec<Encoded<'static>>, mut io: impl PgTransport) {
    let portal = PortalName::unnamed();

    io.send(frontend::Bind {
        portal_name: portal.as_str(),
        stmt_name: data.stmt.as_str(),
        param_formats_len: 1,
        param_formats: [PgFormat::Binary],
        params_len: params.len().to_u16(),
        params_size_hint: params
            .iter()
            .fold(0, |acc, n| acc + 4 + n.remaining().to_u32()),
        params: mem::take(params).into_iter(),
        result_formats_len: 1,
        result_formats: [PgFormat::Binary],
    });
    io.send(frontend::Describe { kind: b'P', name: portal.as_str() });
    io.send(frontend::Execute { portal_name: portal.as_str(), max_row: 0 });
}

async fn read_one(
    io: &mut impl PgTransport,
    mut on_row: Option<&mut (dyn FnMut(Row) -> Result<()>)>,
) -> Result<RowResult> {
    use backend::BackendMessage::*;

    match io.recv().await? {
        NoData(_) => {},
        RowDescription(rd) => {
            let template = Row::new(rd.body);
            loop {
                match io.recv().await? {
                    DataRow(dr) => {
                        let row = template.inner_clone(dr.body);
                        if let Some(cb) = on_row.as_deref_mut() {
                            cb(row)?;
                        }
                    },
                    CommandComplete(cmd) => {
                        return Ok(RowResult { rows_affected: command_complete(cmd) });
                    },
                    PortalSuspended(_) => continue,
                    EmptyQueryResponse(_) => return Ok(RowResult { rows_affected: 0 }),
                    f => return Err(f.unexpected("batch data row").into()),
                }
            }
        },
        f => return Err(f.unexpected("batch row description").into()),
    }

    match io.recv().await? {
        CommandComplete(cmd) => Ok(RowResult { rows_affected: command_complete(cmd) }),
        EmptyQueryResponse(_) => Ok(RowResult { rows_affected: 0 }),
        f => Err(f.unexpected("batch command complete").into()),
    }
}
