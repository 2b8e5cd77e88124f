//! Low level streaming/collecting machinery backing the [`query`][crate::query] API.
use bytes::Buf;
use futures_core::Stream;
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    marker::PhantomData,
    mem,
    pin::Pin,
    task::{Context, Poll, ready},
};

use crate::{
    Error, Result, Row,
    common::unit_error,
    encode::Encoded,
    ext::UsizeExt,
    postgres::{
        PgFormat,
        backend::{self, CommandComplete},
        frontend,
    },
    sql::Sql,
    statement::{PortalName, StatementName},
    tracer::TraceContext,
    transport::PgTransport,
};

unit_error! {
    /// Statement contained no SQL commands, e.g. an empty string or all whitespace.
    pub struct EmptyQueryError("empty query");
}

#[derive(Debug)]
pub struct PrepareData {
    pub sqlid: u64,
    pub stmt: StatementName,
    pub cache_hit: bool,
    /// this field intended to be edited by called for `portal` params.
    pub max_row: u32,
}

/// Write Prepare statement to `io`.
///
/// If cache hit, no further action is required.
///
/// If cache miss, flushing is required, with responses possible:
/// - `ParseComplete` from `Parse`
///
/// Also caller might want to cache the returned statement.
pub(crate) fn prepare(
    sql: &impl Sql,
    params: &[Encoded],
    mut io: impl PgTransport,
) -> PrepareData {
    crate::common::span!("prepare");

    let persist = sql.persistent();
    let sql = sql.sql().trim();

    let trace_ctx = io.tracer().prepare_start(sql);

    let sqlid = {
        let mut buf = DefaultHasher::new();
        sql.hash(&mut buf);
        buf.finish()
    };

    if persist {
        if let Some(stmt) = io.get_stmt(sqlid) {
            io.tracer().prepare_end(trace_ctx, None);
            return PrepareData { sqlid, stmt, cache_hit: true, max_row: 0 };
        }
    }

    let stmt = match persist {
        true => StatementName::next(),
        false => StatementName::unnamed(),
    };

    io.send(frontend::Parse {
        prepare_name: stmt.as_str(),
        sql,
        oids_len: params.len() as _,
        oids: params.iter().map(Encoded::oid),
    });
    io.send(frontend::Flush);

    // `ParseComplete` is only confirmed once the caller awaits it; this hook
    // covers the synchronous enqueue, the query/batch/pipeline-level hook
    // around it reports the eventual outcome.
    io.tracer().prepare_end(trace_ctx, None);

    PrepareData { sqlid, stmt, cache_hit: false, max_row: 0 }
}

/// Write Prepare statement to `io`.
///
/// Flushing is required after call.
///
/// Responses possible:
/// - `BindComplete` from `Bind`
/// - `RowDescription` or `NoData` from `Describe`
/// - `DataRow` from `Execute`
/// - `Execute` phase is always terminated by the appearance of exactly one of these messages:
///   - `CommandComplete`
///   - `EmptyQueryResponse`
///   - `ErrorResponse`
///   - `PortalSuspended`
/// - `ReadyForQuery` from `Sync`
pub(crate) fn portal(data: &PrepareData, params: &mut Vec<Encoded>, mut io: impl PgTransport) {
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
    io.send(frontend::Describe {
        kind: b'P',
        name: portal.as_str(),
    });
    io.send(frontend::Execute {
        portal_name: portal.as_str(),
        max_row: data.max_row,
    });
    io.send(frontend::Sync);
}

/// Decode the rows-affected count from a [`CommandComplete`][1] message.
///
/// [1]: backend::CommandComplete
pub(crate) fn command_complete(cmd: backend::CommandComplete) -> u64 {
    let mut whs = cmd.tag.split_whitespace();
    let Some(tag) = whs.next() else {
        return 0;
    };
    let Some(rows) = whs.next() else {
        return 0;
    };
    match tag {
        "INSERT" => whs.next().unwrap_or_default(),
        "SELECT" => rows,
        "UPDATE" => rows,
        "DELETE" => rows,
        "MERGE" => rows,
        "FETCH" => rows,
        "MOVE" => rows,
        "COPY" => rows,
        _ => return 0,
    }
    .parse()
    .unwrap_or_default()
}

/// Maps a decoded [`Row`] into the type a [`Query`][crate::query::Query] ultimately yields.
///
/// Implemented by [`StreamRow`][crate::query::StreamRow] and
/// [`StreamScalar`][crate::query::StreamScalar].
pub trait StreamMap {
    type Output;

    fn map(row: Row) -> Result<Self::Output>;
}

/// Accumulates the items of a [`FetchStream`] into a final output.
///
/// Implemented by the `Collect*` adapters in [`crate::query`].
pub trait FetchCollect<R> {
    type Output;

    fn value(&mut self, input: R);

    fn finish(&mut self, cmd: Option<CommandComplete>) -> Result<Self::Output>;
}

#[must_use = "streams do nothing unless you `.await` or poll them"]
pub struct FetchStream<'val, SQL, ExeFut, IO, M> {
    sql: SQL,
    io: Option<IO>,
    data: Option<PrepareData>,
    phase: Phase<ExeFut>,
    params: Vec<Encoded<'val>>,
    max_row: u32,
    cmd: Option<CommandComplete>,
    /// `Some` while a `query_start`/`query_end` pair is outstanding.
    trace: Option<TraceContext>,
    _p: PhantomData<M>,
}

impl<SQL: std::fmt::Debug, ExeFut: std::fmt::Debug, IO: std::fmt::Debug, M> std::fmt::Debug
    for FetchStream<'_, SQL, ExeFut, IO, M>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStream")
            .field("sql", &self.sql)
            .field("io", &self.io)
            .field("data", &self.data)
            .field("phase", &self.phase)
            .field("max_row", &self.max_row)
            .field("cmd", &self.cmd)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Phase<ExeFut> {
    Connect { f: ExeFut },
    Prepare,
    PrepareComplete,
    Portal,
    BindComplete,
    Complete,
    RowDescription,
    DataRow(Row),
    ReadyForQuery,
}

impl<'val, SQL, ExeFut, IO, M> FetchStream<'val, SQL, ExeFut, IO, M> {
    pub fn new(
        sql: SQL,
        exe: ExeFut,
        params: Vec<Encoded<'val>>,
        max_row: u32,
    ) -> Self {
        Self {
            sql,
            io: None,
            data: None,
            phase: Phase::Connect { f: exe },
            params,
            max_row,
            cmd: None,
            trace: None,
            _p: PhantomData,
        }
    }

    /// Take the [`CommandComplete`] tag seen at the end of the stream, if any.
    pub fn take_cmd(&mut self) -> Option<CommandComplete> {
        self.cmd.take()
    }
}

impl<SQL, ExeFut, IO, M> FetchStream<'_, SQL, ExeFut, IO, M>
where
    SQL: Sql,
    IO: PgTransport,
{
    fn start_trace(&mut self) {
        if let Some(io) = &self.io {
            self.trace = Some(io.tracer().query_start(self.sql.sql()));
        }
    }

    fn finish_trace(&mut self, err: Option<&Error>) {
        if let Some(ctx) = self.trace.take() {
            if let Some(io) = &self.io {
                io.tracer().query_end(ctx, err);
            }
        }
    }
}

/// Safety net: guarantees `query_end` fires even if the stream is dropped
/// before reaching a phase that calls [`finish_trace`][Self::finish_trace] explicitly
/// (e.g. the caller drops the stream without polling it to completion).
impl<SQL, ExeFut, IO, M> Drop for FetchStream<'_, SQL, ExeFut, IO, M>
where
    SQL: Sql,
    IO: PgTransport,
{
    fn drop(&mut self) {
        self.finish_trace(None);
    }
}

impl<SQL, ExeFut, IO, M> Stream for FetchStream<'_, SQL, ExeFut, IO, M>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
    M: StreamMap + Unpin,
{
    type Item = Result<M::Output>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();

        loop {
            match &mut me.phase {
                Phase::Connect { f } => {
                    let io = ready!(Pin::new(f).poll(cx)?);
                    me.io = Some(io);
                    me.start_trace();
                    me.phase = Phase::Prepare;
                },
                Phase::Prepare => {
                    me.data = Some(prepare(&me.sql, &me.params, me.io.as_mut().unwrap()));
                    me.phase = match me.data.as_ref().unwrap().cache_hit {
                        true => Phase::Portal,
                        false => Phase::PrepareComplete,
                    };
                },
                Phase::PrepareComplete => {
                    if let Err(err) = ready!(me.io.as_mut().unwrap().poll_recv::<backend::ParseComplete>(cx)) {
                        me.finish_trace(Some(&err));
                        return Poll::Ready(Some(Err(err)));
                    }
                    let data = me.data.as_ref().unwrap();
                    me.io.as_mut().unwrap().add_stmt(data.sqlid, data.stmt.clone());
                    me.phase = Phase::Portal;
                },
                Phase::Portal => {
                    let data = me.data.as_mut().unwrap();
                    data.max_row = me.max_row;
                    portal(data, &mut me.params, me.io.as_mut().unwrap());
                    me.phase = Phase::BindComplete;
                },
                Phase::BindComplete => {
                    if let Err(err) = ready!(me.io.as_mut().unwrap().poll_recv::<backend::BindComplete>(cx)) {
                        me.finish_trace(Some(&err));
                        return Poll::Ready(Some(Err(err)));
                    }
                    me.phase = Phase::RowDescription;
                }
                Phase::RowDescription => {
                    use backend::BackendMessage::*;
                    match ready!(me.io.as_mut().unwrap().poll_recv(cx)?) {
                        NoData(_) => { },
                        // Received after `NoData`
                        CommandComplete(cmd) => {
                            me.cmd = Some(cmd);
                            me.phase = Phase::ReadyForQuery;
                        },

                        RowDescription(rd) => {
                            me.phase = Phase::DataRow(Row::new(rd.body));
                        },
                        f => {
                            let err: Error = f.unexpected("description recv").into();
                            me.finish_trace(Some(&err));
                            me.phase = Phase::Complete;
                            return Poll::Ready(Some(Err(err)));
                        },
                    }
                },
                Phase::DataRow(row) => {
                    use backend::BackendMessage::*;
                    match ready!(me.io.as_mut().unwrap().poll_recv(cx)?) {
                        DataRow(dr) => {
                            let row = row.inner_clone(dr.body);
                            let result = M::map(row);
                            if let Err(err) = &result {
                                me.finish_trace(Some(err));
                                me.io.as_mut().unwrap().ready_request();
                                me.phase = Phase::Complete;
                            }
                            return Poll::Ready(Some(result));
                        },

                        // `Execute` phase terminations:
                        CommandComplete(cmd) => {
                            me.cmd = Some(cmd);
                        },
                        PortalSuspended(_) => { },
                        EmptyQueryResponse(_) => {
                            let err = Error::empty_query();
                            me.finish_trace(Some(&err));
                            me.phase = Phase::Complete;
                            return Poll::Ready(Some(Err(err)));
                        },
                        f => {
                            let err: Error = f.unexpected("fetching data rows").into();
                            me.finish_trace(Some(&err));
                            me.phase = Phase::Complete;
                            return Poll::Ready(Some(Err(err)));
                        },
                    }

                    me.phase = Phase::ReadyForQuery;
                },
                Phase::ReadyForQuery => {
                    if let Err(err) = ready!(me.io.as_mut().unwrap().poll_recv::<backend::ReadyForQuery>(cx)) {
                        me.finish_trace(Some(&err));
                        return Poll::Ready(Some(Err(err)));
                    }
                    me.phase = Phase::Complete;
                },
                Phase::Complete => {
                    me.finish_trace(None);
                    return Poll::Ready(None);
                },
            }
        }
    }
}

/// Drives a [`FetchStream`] to completion, folding every item into a [`FetchCollect`] adapter.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Fetch<'val, SQL, ExeFut, IO, M, C> {
    stream: FetchStream<'val, SQL, ExeFut, IO, M>,
    collect: C,
}

impl<'val, SQL, ExeFut, IO, M, C> Fetch<'val, SQL, ExeFut, IO, M, C> {
    pub fn new(
        sql: SQL,
        exe: ExeFut,
        params: Vec<Encoded<'val>>,
        collect: C,
        max_row: u32,
    ) -> Self {
        Self {
            stream: FetchStream::new(sql, exe, params, max_row),
            collect,
        }
    }
}

impl<SQL, ExeFut, IO, M, C> Future for Fetch<'_, SQL, ExeFut, IO, M, C>
where
    SQL: Sql + Unpin,
    ExeFut: Future<Output = Result<IO>> + Unpin,
    IO: PgTransport + Unpin,
    M: StreamMap + Unpin,
    C: FetchCollect<M::Output> + Unpin,
{
    type Output = Result<C::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(item) = ready!(Pin::new(&mut me.stream).poll_next(cx)) {
            me.collect.value(item?);
        }

        Poll::Ready(me.collect.finish(me.stream.take_cmd()))
    }
}
