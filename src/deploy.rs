//! # Deployment encoding (C10)
//!
//! Parses the raw bytes submitted as a `Create`'s `code` argument into
//! `(code, input)`. Grounded on §4.10/§6.1: a deployment blob either carries
//! an explicit `"XLTC"`-framed init-args prefix after the WASM magic, or is
//! treated as bare code deployed with the default `Init|{}` payload.

const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];
const XLTC_MAGIC: [u8; 4] = *b"XLTC";

/// Splits a deployment blob into `(code, init_input)`.
///
/// If the blob starts with the WASM magic immediately followed by `"XLTC"`,
/// the next two bytes (big-endian `u16`) name the length of an init-args
/// segment that follows; the remaining bytes are the module's code, and the
/// init call's input is `"Init|" ‖ args`. Any other prefix (including a
/// bare WASM module with no framing) is taken as-is for `code`, with the
/// init call defaulting to `Init|{}`.
#[must_use]
pub fn parse_deployment_blob(blob: &[u8]) -> (Vec<u8>, Vec<u8>) {
    if blob.len() >= 10 && blob[0..4] == WASM_MAGIC && blob[4..8] == XLTC_MAGIC {
        let args_len = u16::from_be_bytes([blob[8], blob[9]]) as usize;
        let args_start = 10;
        let args_end = args_start + args_len;
        if args_end <= blob.len() {
            let args = &blob[args_start..args_end];
            let code = &blob[args_end..];
            let mut input = b"Init|".to_vec();
            input.extend_from_slice(args);
            return (code.to_vec(), input);
        }
    }
    (blob.to_vec(), b"Init|{}".to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_wasm_blob_defaults_to_init_empty_object() {
        let blob = b"\0asm\x01\0\0\0rest-of-code".to_vec();
        let (code, input) = parse_deployment_blob(&blob);
        assert_eq!(code, blob);
        assert_eq!(input, b"Init|{}");
    }

    #[test]
    fn xltc_framed_blob_splits_args_and_code() {
        let args = br#"{"num":100,"name":"xxxx"}"#;
        let mut blob = Vec::new();
        blob.extend_from_slice(&WASM_MAGIC);
        blob.extend_from_slice(&XLTC_MAGIC);
        blob.extend_from_slice(&(args.len() as u16).to_be_bytes());
        blob.extend_from_slice(args);
        blob.extend_from_slice(b"<code...>");

        let (code, input) = parse_deployment_blob(&blob);
        assert_eq!(code, b"<code...>");
        let mut expected_input = b"Init|".to_vec();
        expected_input.extend_from_slice(args);
        assert_eq!(input, expected_input);
    }

    #[test]
    fn truncated_args_length_falls_back_to_whole_blob_as_code() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&WASM_MAGIC);
        blob.extend_from_slice(&XLTC_MAGIC);
        blob.extend_from_slice(&500u16.to_be_bytes());
        blob.extend_from_slice(b"short");

        let (code, input) = parse_deployment_blob(&blob);
        assert_eq!(code, blob);
        assert_eq!(input, b"Init|{}");
    }

    #[test]
    fn empty_args_is_valid() {
        let mut blob = Vec::new();
        blob.extend_from_slice(&WASM_MAGIC);
        blob.extend_from_slice(&XLTC_MAGIC);
        blob.extend_from_slice(&0u16.to_be_bytes());
        blob.extend_from_slice(b"code-bytes");

        let (code, input) = parse_deployment_blob(&blob);
        assert_eq!(code, b"code-bytes");
        assert_eq!(input, b"Init|");
    }
}
