//! Utility functions for blocksync

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped so a value stays one URL path segment
const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'%')
    .add(b' ')
    .add(b'?')
    .add(b'#')
    .add(b'&');

/// Default block size used when splitting files
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Encode an arbitrary value as a single URL path segment
pub fn encode_path_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT_ENCODE_SET).to_string()
}

/// Encode a filename for use as a single URL path segment
pub fn encode_filename(name: &str) -> String {
    encode_path_segment(name)
}

/// Validate filename (must be non-empty, reasonable length)
pub fn validate_filename(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidRequest("filename cannot be empty".into()));
    }

    if name.len() > 1024 {
        return Err(crate::Error::InvalidRequest(
            "filename too long (max 1024 bytes)".into(),
        ));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(crate::Error::InvalidRequest(
            "filename contains invalid characters".into(),
        ));
    }

    Ok(())
}

/// Split a byte buffer into fixed-size blocks (last one may be shorter)
pub fn split_blocks(data: &[u8], block_size: usize) -> Vec<&[u8]> {
    if data.is_empty() || block_size == 0 {
        return Vec::new();
    }
    data.chunks(block_size).collect()
}

/// Retry with exponential backoff
pub async fn retry_with_backoff<F, Fut, T>(
    mut f: F,
    max_retries: usize,
    initial_delay: std::time::Duration,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = crate::Result<T>>,
{
    let mut delay = initial_delay;

    for attempt in 0..max_retries {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries - 1 => {
                tracing::warn!(
                    "Retry attempt {} failed: {}, retrying in {:?}",
                    attempt + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }

    Err(crate::Error::Internal("Max retries exceeded".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_filename_single_segment() {
        assert_eq!(encode_filename("photos/cat 1.txt"), "photos%2Fcat%201.txt");
        assert_eq!(encode_filename("a?b#c"), "a%3Fb%23c");
        assert_eq!(encode_filename("plain.txt"), "plain.txt");
        assert_eq!(encode_path_segment("ab/exists?"), "ab%2Fexists%3F");
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("cat.txt").is_ok());
        assert!(validate_filename("dir/cat.txt").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename(&"x".repeat(2000)).is_err());
        assert!(matches!(
            validate_filename("bad\nname"),
            Err(crate::Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_split_blocks() {
        let data = vec![7u8; 10];
        let blocks = split_blocks(&data, 4);
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].len(), 2);
        assert!(split_blocks(&[], 4).is_empty());
    }

    #[tokio::test]
    async fn test_retry_gives_up_on_fatal_error() {
        let mut calls = 0;
        let res: crate::Result<()> = retry_with_backoff(
            || {
                calls += 1;
                async { Err(crate::Error::InvalidRequest("nope".into())) }
            },
            3,
            std::time::Duration::from_millis(1),
        )
        .await;
        assert!(res.is_err());
        assert_eq!(calls, 1);
    }
}
