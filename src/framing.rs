use crate::error::ScopeError;

/// Parse an IEEE-488.2 definite-length arbitrary block.
///
/// The instrument frames binary waveform payloads as
/// `#<p><n-digit byte count><payload>`: one marker byte, one ASCII digit `p`
/// giving the width of the byte-count field, `p` ASCII digits giving the
/// payload length `n`, then exactly `n` payload bytes. Anything after the
/// declared length (typically a trailing newline) is discarded.
///
/// Returns the payload slice, or [`ScopeError::Format`] for any malformed
/// header or a payload shorter than declared. Parsing is exact; there is no
/// best-effort recovery.
pub fn parse_definite_block(raw: &[u8]) -> Result<&[u8], ScopeError> {
    let marker = raw
        .first()
        .ok_or_else(|| ScopeError::Format("empty block response".to_string()))?;
    if *marker != b'#' {
        return Err(ScopeError::Format(format!(
            "block marker '#' missing, got 0x{marker:02x}"
        )));
    }

    let width_digit = raw
        .get(1)
        .ok_or_else(|| ScopeError::Format("block header truncated after marker".to_string()))?;
    let width = (*width_digit as char)
        .to_digit(10)
        .ok_or_else(|| {
            ScopeError::Format(format!(
                "block count width is not a digit: 0x{width_digit:02x}"
            ))
        })? as usize;
    if width == 0 {
        // '#0' announces an indefinite-length block, which curve? never sends
        return Err(ScopeError::Format(
            "indefinite-length block not supported".to_string(),
        ));
    }

    let count_end = 2 + width;
    let count_field = raw
        .get(2..count_end)
        .ok_or_else(|| ScopeError::Format("block byte-count field truncated".to_string()))?;
    let count_text = std::str::from_utf8(count_field)
        .map_err(|_| ScopeError::Format("block byte count is not ASCII".to_string()))?;
    let length: usize = count_text.parse().map_err(|_| {
        ScopeError::Format(format!("block byte count is not a number: {count_text:?}"))
    })?;

    raw.get(count_end..count_end + length).ok_or_else(|| {
        ScopeError::Format(format!(
            "block payload shorter than declared: have {}, declared {length}",
            raw.len().saturating_sub(count_end)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_digit_count() {
        let raw = b"#15hello";
        assert_eq!(parse_definite_block(raw).unwrap(), b"hello");
    }

    #[test]
    fn discards_trailing_bytes() {
        // declared length wins over whatever follows, newline or garbage
        let raw = b"#15hello\nGARBAGE";
        assert_eq!(parse_definite_block(raw).unwrap(), b"hello");
    }

    #[test]
    fn parses_multi_digit_count() {
        let mut raw = b"#210".to_vec();
        raw.extend_from_slice(&[0xAB; 10]);
        raw.push(b'\n');
        assert_eq!(parse_definite_block(&raw).unwrap(), &[0xAB; 10][..]);
    }

    #[test]
    fn payload_may_contain_arbitrary_bytes() {
        let raw = b"#14\x00\n#\xff\n";
        assert_eq!(parse_definite_block(raw).unwrap(), b"\x00\n#\xff");
    }

    #[test]
    fn rejects_missing_marker() {
        assert!(matches!(
            parse_definite_block(b"15hello"),
            Err(ScopeError::Format(_))
        ));
    }

    #[test]
    fn rejects_non_digit_width() {
        assert!(matches!(
            parse_definite_block(b"#xhello"),
            Err(ScopeError::Format(_))
        ));
    }

    #[test]
    fn rejects_non_digit_count() {
        assert!(matches!(
            parse_definite_block(b"#2a5hello"),
            Err(ScopeError::Format(_))
        ));
    }

    #[test]
    fn rejects_short_payload() {
        assert!(matches!(
            parse_definite_block(b"#19abc"),
            Err(ScopeError::Format(_))
        ));
    }

    #[test]
    fn rejects_indefinite_length() {
        assert!(matches!(
            parse_definite_block(b"#0data\n"),
            Err(ScopeError::Format(_))
        ));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            parse_definite_block(b""),
            Err(ScopeError::Format(_))
        ));
    }
}
