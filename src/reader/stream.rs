use super::decode_piece;
use crate::{Error, GeoTable, Result, storage::Storage};

/// Async variant of [`read_piece`](super::read_piece).
///
/// The piece is fetched from the store asynchronously and decoded on the
/// blocking pool.
pub(crate) async fn read_piece_async(
    storage: &Storage,
    path: &str,
    columns: Option<Vec<String>>,
) -> Result<GeoTable> {
    let bytes = storage.read_async(path).await?;
    tokio::task::spawn_blocking(move || decode_piece(bytes, columns.as_deref()))
        .await
        .map_err(|e| Error::Task(e.to_string()))?
}
