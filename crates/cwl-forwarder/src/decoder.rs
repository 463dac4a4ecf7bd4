// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Transport decoding of subscription payloads: base64, then gzip, then JSON.

use crate::batch::LogBatch;
use crate::error::DecodeError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Decodes one encoded subscription payload into a batch.
///
/// Any stage failing is fatal for the whole batch.
pub fn decode_batch(encoded: &str) -> Result<LogBatch, DecodeError> {
    let compressed = STANDARD.decode(encoded.trim())?;

    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw).map_err(DecodeError::Gzip)?;

    let text = String::from_utf8(raw)?;
    Ok(serde_json::from_str(&text)?)
}

/// Inverse of [`decode_batch`]; produces the payload a log subscription would deliver.
pub fn encode_batch(batch: &LogBatch) -> Result<String, std::io::Error> {
    let json = serde_json::to_vec(batch)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{LogEvent, MessageType};
    use std::collections::BTreeMap;

    fn sample_batch() -> LogBatch {
        LogBatch {
            message_type: MessageType::Data,
            owner: "123456789012".to_string(),
            log_group: "/aws/lambda/service-env-funcName".to_string(),
            log_stream: "2016/08/17/[76]afe5c000d5344c33b5d88be7a4c55816".to_string(),
            subscription_filters: vec!["ship-logs".to_string()],
            log_events: vec![
                LogEvent {
                    id: "33020419148298496".to_string(),
                    timestamp: 1_471_392_000_000,
                    message: "2016-08-17T00:00:00.000Z\tabc\tloading index.html...\n"
                        .to_string(),
                    extracted_fields: None,
                },
                LogEvent {
                    id: "33020419148298497".to_string(),
                    timestamp: 1_471_392_000_001,
                    message: "END RequestId: abc\n".to_string(),
                    extracted_fields: Some(BTreeMap::from([(
                        "event".to_string(),
                        "{\"a\":1}".to_string(),
                    )])),
                },
            ],
        }
    }

    #[test]
    fn test_round_trip() {
        let batch = sample_batch();
        let encoded = encode_batch(&batch).unwrap();
        let decoded = decode_batch(&encoded).unwrap();
        assert_eq!(decoded, batch);
    }

    #[test]
    fn test_invalid_base64() {
        let result = decode_batch("not base64 at all!");
        assert!(matches!(result, Err(DecodeError::Base64(_))));
    }

    #[test]
    fn test_corrupt_gzip() {
        let encoded = STANDARD.encode(b"plain bytes, no gzip header");
        let result = decode_batch(&encoded);
        assert!(matches!(result, Err(DecodeError::Gzip(_))));
    }

    #[test]
    fn test_invalid_json() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"messageType\": ").unwrap();
        let encoded = STANDARD.encode(encoder.finish().unwrap());
        let result = decode_batch(&encoded);
        assert!(matches!(result, Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[0xff, 0xfe, 0xfd]).unwrap();
        let encoded = STANDARD.encode(encoder.finish().unwrap());
        let result = decode_batch(&encoded);
        assert!(matches!(result, Err(DecodeError::Utf8(_))));
    }
}
