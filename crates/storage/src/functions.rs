use rusqlite::{
    functions::{Context, FunctionFlags},
    Connection, Error,
};
use stele_primitives::distance::{Metric, XorMetric};

/// Registers the distance predicates on a connection.
///
/// Both functions are deterministic, so SQLite is free to use them in indexed
/// expressions and to cache their results. They exist only on the connection;
/// nothing is persisted into the database file.
///
/// - `xor_distance(a, b)` returns the 32 byte big-endian XOR distance between
///   two 32 byte keys.
/// - `in_radius(origin, key, radius)` returns 1 iff
///   `xor_distance(origin, key) <= radius`, else 0.
pub fn register_distance_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "xor_distance",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let origin = blob32(ctx, 0)?;
            let key = blob32(ctx, 1)?;
            Ok(XorMetric::distance(&origin, &key).big_endian().to_vec())
        },
    )?;
    conn.create_scalar_function(
        "in_radius",
        3,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let origin = blob32(ctx, 0)?;
            let key = blob32(ctx, 1)?;
            let radius = blob32(ctx, 2)?;
            let distance = XorMetric::distance(&origin, &key).big_endian();
            // Big-endian byte order makes the slice comparison an unsigned
            // 256-bit comparison.
            Ok((distance <= radius) as i64)
        },
    )
}

fn blob32(ctx: &Context<'_>, index: usize) -> rusqlite::Result<[u8; 32]> {
    let blob: Vec<u8> = ctx.get(index)?;
    <[u8; 32]>::try_from(blob.as_slice()).map_err(|_| {
        Error::UserFunctionError(
            format!("expected a 32 byte blob, got {} bytes", blob.len()).into(),
        )
    })
}
