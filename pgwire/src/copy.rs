//! `COPY` streaming.
//!
//! `COPY TO` (out of the server) and `COPY FROM` (into the server) bypass the
//! row-at-a-time `DataRow` path entirely once the server answers with
//! `CopyOutResponse`/`CopyInResponse`; both directions move raw `CopyData`
//! frames until the transfer completes.
use crate::{
    Result,
    common::span,
    postgres::{backend, frontend},
    row::RowResult,
    transport::{PgTransport, PgTransportExt},
};

/// Soft upper bound on a single outgoing `CopyData` frame, matching the chunk
/// size the server itself uses for `COPY TO STDOUT`.
const FRAME_SIZE: usize = 8 * 1024;

/// Run a `COPY <table> (<columns>) FROM STDIN` against `table`, streaming
/// `source`'s bytes (already in the server's expected `COPY` data format,
/// e.g. CSV or text) as the row data.
///
/// This is a thin convenience wrapper over [`copy_in`] that builds the `COPY`
/// statement text itself, quoting `table` and each of `columns` as postgres
/// identifiers so names containing spaces or mixed case round-trip correctly.
pub async fn copy_from_table(
    io: &mut impl PgTransport,
    table: &str,
    columns: &[&str],
    source: &mut (impl tokio::io::AsyncRead + Unpin),
) -> Result<RowResult> {
    let sql = build_copy_from_sql(table, columns);
    copy_in(io, &sql, source).await
}

fn build_copy_from_sql(table: &str, columns: &[&str]) -> String {
    let mut sql = String::with_capacity(32 + table.len());
    sql.push_str("COPY ");
    quote_ident(&mut sql, table);

    if !columns.is_empty() {
        sql.push_str(" (");
        for (i, col) in columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            quote_ident(&mut sql, col);
        }
        sql.push(')');
    }

    sql.push_str(" FROM STDIN");
    sql
}

/// Quotes a postgres identifier, doubling any embedded `"`.
fn quote_ident(out: &mut String, ident: &str) {
    out.push('"');
    for ch in ident.chars() {
        if ch == '"' {
            out.push('"');
        }
        out.push(ch);
    }
    out.push('"');
}

/// Run `sql` (which must be a `COPY ... TO STDOUT` statement) and stream the
/// server's output into `sink`.
///
/// Returns once `CommandComplete` and `ReadyForQuery` have both been consumed.
pub async fn copy_out(
    io: &mut impl PgTransport,
    sql: &str,
    sink: &mut (impl tokio::io::AsyncWrite + Unpin),
) -> Result<RowResult> {
    span!("copy_out");
    let trace_ctx = io.tracer().copy_start(sql);

    let result = copy_out_inner(io, sql, sink).await;

    io.tracer().copy_end(trace_ctx, result.as_ref().err());
    result
}

async fn copy_out_inner(
    io: &mut impl PgTransport,
    sql: &str,
    sink: &mut (impl tokio::io::AsyncWrite + Unpin),
) -> Result<RowResult> {
    use tokio::io::AsyncWriteExt;

    io.send(frontend::Query { sql });
    io.flush().await?;

    io.recv::<backend::CopyOutResponse>().await?;
    io.enter_copy_out();

    loop {
        use backend::BackendMessage::*;
        match io.recv().await? {
            CopyData(data) => sink.write_all(&data.data).await?,
            CopyDone(_) => break,
            f => return Err(f.unexpected("copy out").into()),
        }
    }
    io.leave_copy();

    let cmd = io.recv::<backend::CommandComplete>().await?;
    io.recv::<backend::ReadyForQuery>().await?;
    sink.flush().await?;

    Ok(RowResult { rows_affected: crate::fetch::command_complete(cmd) })
}

/// Run `sql` (which must be a `COPY ... FROM STDIN` statement), reading frames
/// from `source` until EOF and forwarding them as `CopyData`.
///
/// A read error from `source` aborts the copy with `CopyFail` and is
/// returned to the caller as-is; the server's resulting `ErrorResponse`
/// is left for the connection to absorb on its next recv.
pub async fn copy_in(
    io: &mut impl PgTransport,
    sql: &str,
    source: &mut (impl tokio::io::AsyncRead + Unpin),
) -> Result<RowResult> {
    span!("copy_in");
    let trace_ctx = io.tracer().copy_start(sql);

    let result = copy_in_inner(io, sql, source).await;

    io.tracer().copy_end(trace_ctx, result.as_ref().err());
    result
}

async fn copy_in_inner(
    io: &mut impl PgTransport,
    sql: &str,
    source: &mut (impl tokio::io::AsyncRead + Unpin),
) -> Result<RowResult> {
    use tokio::io::AsyncReadExt;

    io.send(frontend::Query { sql });
    io.flush().await?;

    io.recv::<backend::CopyInResponse>().await?;
    io.enter_copy_in();

    let mut buf = vec![0u8; FRAME_SIZE];
    loop {
        match source.read(&mut buf).await {
            Ok(0) => {
                io.send(frontend::CopyDone);
                break;
            },
            Ok(n) => io.send(frontend::CopyData { data: &buf[..n] }),
            Err(e) => {
                io.send(frontend::CopyFail { message: &e.to_string() });
                io.flush().await?;
                // the server's ErrorResponse to CopyFail is left unread here; it
                // surfaces (and self-heals sync_pending) on the connection's next recv.
                return Err(e.into());
            },
        }
        io.flush().await?;
    }
    io.flush().await?;
    io.leave_copy();

    let cmd = io.recv::<backend::CommandComplete>().await?;
    io.recv::<backend::ReadyForQuery>().await?;

    Ok(RowResult { rows_affected: crate::fetch::command_complete(cmd) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_copy_from_with_columns() {
        let sql = build_copy_from_sql("users", &["id", "name"]);
        assert_eq!(sql, r#"COPY "users" ("id", "name") FROM STDIN"#);
    }

    #[test]
    fn builds_copy_from_without_columns() {
        let sql = build_copy_from_sql("users", &[]);
        assert_eq!(sql, r#"COPY "users" FROM STDIN"#);
    }

    #[test]
    fn quotes_identifiers_with_embedded_double_quotes() {
        let sql = build_copy_from_sql("weird\"table", &[]);
        assert_eq!(sql, r#"COPY "weird""table" FROM STDIN"#);
    }
}
