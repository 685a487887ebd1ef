//! Newline-delimited reading of (possibly compressed) objects.
use anyhow::{anyhow, Result};
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec};

/// Compression schemes understood by the line reader
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    /// Uncompressed.
    None,
    /// GZIP.
    Gzip,
    // ZSTD.
    Zstd,
}

/// Infers the compression scheme from the object key's extension.
pub fn infer_compression(key: &str) -> Compression {
    let extension = std::path::Path::new(key)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("gz") | Some("gzip") => Compression::Gzip,
        Some("zst") | Some("zstd") => Compression::Zstd,
        _ => Compression::None,
    }
}

/// Streams the lines of `reader`, decompressing first if needed.
///
/// Trailing `\r` is stripped. Invalid UTF-8 anywhere in the object surfaces as an
/// error item, as does any decompression failure.
pub fn decode_lines<R>(reader: R, compression: Compression) -> BoxStream<'static, Result<String>>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let reader = tokio::io::BufReader::new(reader);

    let reader: Box<dyn AsyncRead + Send + Unpin> = match compression {
        Compression::None => Box::new(reader),
        Compression::Gzip => Box::new({
            let mut decoder = GzipDecoder::new(reader);
            decoder.multiple_members(true);
            decoder
        }),
        Compression::Zstd => Box::new({
            let mut decoder = ZstdDecoder::new(reader);
            decoder.multiple_members(true);
            decoder
        }),
    };

    FramedRead::new(reader, LinesCodec::new())
        .map_err(|e| anyhow!(e))
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_compression::tokio::bufread::{GzipEncoder, ZstdEncoder};
    use tokio::io::AsyncReadExt;

    async fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzipEncoder::new(data);
        let mut out = vec![];
        encoder.read_to_end(&mut out).await.unwrap();
        out
    }

    async fn zstd(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZstdEncoder::new(data);
        let mut out = vec![];
        encoder.read_to_end(&mut out).await.unwrap();
        out
    }

    #[test]
    fn test_infer_compression() {
        assert_eq!(infer_compression("a/b/events.json.gz"), Compression::Gzip);
        assert_eq!(infer_compression("a/b/events.GZ"), Compression::Gzip);
        assert_eq!(infer_compression("events.gzip"), Compression::Gzip);
        assert_eq!(infer_compression("events.json.zst"), Compression::Zstd);
        assert_eq!(infer_compression("events.json"), Compression::None);
        assert_eq!(infer_compression("events"), Compression::None);
    }

    #[tokio::test]
    async fn test_plain_lines() {
        let data = b"one\r\ntwo\n\nthree".to_vec();
        let lines = decode_lines(std::io::Cursor::new(data), Compression::None)
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        assert_eq!(lines, vec!["one", "two", "", "three"]);
    }

    #[tokio::test]
    async fn test_gzip_lines() {
        let data = gzip(b"{\"a\":1}\n{\"a\":2}\n").await;
        let lines = decode_lines(std::io::Cursor::new(data), Compression::Gzip)
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        assert_eq!(lines, vec!["{\"a\":1}", "{\"a\":2}"]);
    }

    #[tokio::test]
    async fn test_zstd_lines() {
        let data = zstd(b"{\"a\":1}\r\n{\"a\":2}\n").await;
        let lines = decode_lines(std::io::Cursor::new(data), infer_compression("a.json.zst"))
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        assert_eq!(lines, vec!["{\"a\":1}", "{\"a\":2}"]);
    }

    #[tokio::test]
    async fn test_concatenated_zstd_frames() {
        let mut data = zstd(b"one\n").await;
        data.extend(zstd(b"two\n").await);
        let lines = decode_lines(std::io::Cursor::new(data), Compression::Zstd)
            .try_collect::<Vec<_>>()
            .await
            .unwrap();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_an_error() {
        let data = b"fine\n\xff\xfe broken\nafter\n".to_vec();
        let result = decode_lines(std::io::Cursor::new(data), Compression::None)
            .try_collect::<Vec<_>>()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_gzip_is_an_error() {
        let data = b"definitely not gzip".to_vec();
        let result = decode_lines(std::io::Cursor::new(data), Compression::Gzip)
            .try_collect::<Vec<_>>()
            .await;
        assert!(result.is_err());
    }
}
