//! Pipelined extended-query execution.
//!
//! A [`Pipeline`] lets a caller enqueue several `Parse`/`Bind`/`Describe`/`Execute`
//! requests before reading back any of their responses, so the round trips overlap
//! on the wire instead of waiting for each `ReadyForQuery` in turn. Results are
//! still delivered in submission order.
use std::any::Any;

use crate::{
    FromRow, Result, Row,
    encode::Encoded,
    fetch::{self, PrepareData},
    postgres::backend,
    transport::{PgTransport, PgTransportExt},
};

/// A queue of extended-query requests against a single [`PgTransport`].
///
/// Nothing is written to the socket until [`Pipeline::execute`] is called.
#[must_use = "a pipeline does nothing until `execute` is called"]
pub struct Pipeline<'io, IO> {
    io: &'io mut IO,
    queue: Vec<Queued>,
}

struct Queued {
    sql: String,
    params: Vec<Encoded<'static>>,
    decode: Box<dyn FnMut(Row) -> Result<Box<dyn Any>>>,
}

impl<'io, IO: PgTransport> Pipeline<'io, IO> {
    /// Create an empty pipeline over `io`.
    pub fn new(io: &'io mut IO) -> Self {
        Self { io, queue: Vec::new() }
    }

    /// Queue a statement, decoding each of its rows into `T`.
    ///
    /// The statement is cached across connection lifetime the same as
    /// [`query_as`][crate::query::query_as], keyed by its SQL text.
    pub fn query_as<T>(&mut self, sql: impl Into<String>, params: Vec<Encoded<'static>>) -> &mut Self
    where
        T: FromRow + 'static,
    {
        self.queue.push(Queued {
            sql: sql.into(),
            params,
            decode: Box::new(|row| T::from_row(row).map(|v| Box::new(v) as Box<dyn Any>).map_err(Into::into)),
        });
        self
    }

    /// Send every queued statement and collect their decoded rows in submission order.
    pub async fn execute(self) -> Result<PipelineResults> {
        let Self { io, queue } = self;

        io.enter_pipeline();
        let results = run(io, queue).await;
        io.exit_pipeline();

        results.map(PipelineResults)
    }
}

async fn run(io: &mut impl PgTransport, queue: Vec<Queued>) -> Result<Vec<Vec<Box<dyn Any>>>> {
    crate::common::span!("pipeline");

    let mut prepared: Vec<PrepareData> = Vec::with_capacity(queue.len());
    for q in &queue {
        prepared.push(fetch::prepare(&q.sql.as_str(), &q.params, &mut *io));
    }
    io.flush().await?;

    let mut results = Vec::with_capacity(queue.len());
    for (mut q, data) in queue.into_iter().zip(prepared) {
        if !data.cache_hit {
            io.recv::<backend::ParseComplete>().await?;
            io.add_stmt(data.sqlid, data.stmt.clone());
        }
        fetch::portal(&data, &mut q.params, &mut *io);
        io.flush().await?;
        io.recv::<backend::BindComplete>().await?;

        results.push(read_result(&mut *io, &mut q.decode).await?);
    }

    io.recv::<backend::ReadyForQuery>().await?;
    Ok(results)
}

async fn read_result(
    io: &mut impl PgTransport,
    decode: &mut dyn FnMut(Row) -> Result<Box<dyn Any>>,
) -> Result<Vec<Box<dyn Any>>> {
    use backend::BackendMessage::*;

    let template = match io.recv().await? {
        NoData(_) => None,
        RowDescription(rd) => Some(Row::new(rd.body)),
        f => return Err(f.unexpected("pipeline row description").into()),
    };

    let mut rows = Vec::new();
    let Some(template) = template else {
        return match io.recv().await? {
            CommandComplete(_) | EmptyQueryResponse(_) => Ok(rows),
            f => Err(f.unexpected("pipeline command complete").into()),
        };
    };

    loop {
        match io.recv().await? {
            DataRow(dr) => rows.push(decode(template.inner_clone(dr.body))?),
            CommandComplete(_) | PortalSuspended(_) | EmptyQueryResponse(_) => break,
            f => return Err(f.unexpected("pipeline data row").into()),
        }
    }
    Ok(rows)
}

/// The decoded rows of every statement queued on a [`Pipeline`], in submission order.
pub struct PipelineResults(Vec<Vec<Box<dyn Any>>>);

impl PipelineResults {
    /// Number of statements that were queued.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no statement was queued.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the `index`-th statement's rows, downcast to `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T` does not match the type the statement at `index` was queued with.
    pub fn take<T: 'static>(&mut self, index: usize) -> Vec<T> {
        std::mem::take(&mut self.0[index])
            .into_iter()
            .map(|row| *row.downcast::<T>().expect("pipeline result type mismatch"))
            .collect()
    }
}

impl std::fmt::Debug for PipelineResults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineResults")
            .field("len", &self.0.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_downcasts_queued_rows() {
        let mut results = PipelineResults(vec![vec![Box::new(1_i32) as Box<dyn Any>]]);
        let rows: Vec<i32> = results.take(0);
        assert_eq!(rows, vec![1]);
    }
}
